//! Graph traversal and evaluation flags for scene nodes.

use crate::error::{GraphError, Result};
use crate::node::Node;
use crate::scene::Scene;
use crate::serializable::Serializable;
use std::collections::{HashSet, VecDeque};

/// Ids of the nodes fed by the outputs of `node_id`, in output and wire
/// order, each listed once.
fn child_ids(scene: &Scene, node_id: &str) -> Vec<String> {
    let Some(node) = scene.node(node_id) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for output in node.outputs() {
        for wire in output.wires().iter().filter_map(|w| scene.wire(w)) {
            let other = [wire.start(), wire.end()]
                .into_iter()
                .flatten()
                .find(|s| *s != output.id());
            if let Some(owner) = other.and_then(|s| scene.socket(s)).map(|s| s.node())
                && seen.insert(owner.to_string())
            {
                ids.push(owner.to_string());
            }
        }
    }
    ids
}

/// Nodes wired directly to the outputs of `node_id`.
///
/// # Examples
///
/// ```
/// use nodegraph::v1::{Scene, Serializable, SocketType, WireType, query};
///
/// let mut scene = Scene::new();
/// let a = scene.create_node("A", &[], &[SocketType::Type1]).unwrap();
/// let b = scene.create_node("B", &[SocketType::Type1], &[]).unwrap();
/// let out = scene.node(&a).unwrap().outputs()[0].id().to_string();
/// let inp = scene.node(&b).unwrap().inputs()[0].id().to_string();
/// scene.connect(&out, &inp, WireType::Bezier).unwrap();
///
/// let children = query::children(&scene, &a);
/// assert_eq!(children.len(), 1);
/// assert_eq!(children[0].title, "B");
/// assert!(query::children(&scene, &b).is_empty());
/// ```
pub fn children<'a>(scene: &'a Scene, node_id: &str) -> Vec<&'a Node> {
    child_ids(scene, node_id)
        .iter()
        .filter_map(|id| scene.node(id))
        .collect()
}

/// Every node reachable downstream of `node_id`, nearest first.
///
/// The start node is excluded, even when a cycle leads back to it.
pub fn descendants(scene: &Scene, node_id: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::from([node_id.to_string()]);
    let mut queue = VecDeque::from([node_id.to_string()]);
    let mut result = Vec::new();

    while let Some(id) = queue.pop_front() {
        for child in child_ids(scene, &id) {
            if seen.insert(child.clone()) {
                result.push(child.clone());
                queue.push_back(child);
            }
        }
    }

    result
}

fn node_mut<'a>(scene: &'a mut Scene, id: &str) -> Result<&'a mut Node> {
    scene
        .node_mut(id)
        .ok_or_else(|| GraphError::UnknownEntity(id.to_string()))
}

fn set_flags(scene: &mut Scene, ids: &[String], apply: impl Fn(&mut Node)) -> Result<()> {
    for id in ids {
        apply(node_mut(scene, id)?);
    }
    Ok(())
}

pub fn mark_dirty(scene: &mut Scene, node_id: &str, dirty: bool) -> Result<()> {
    node_mut(scene, node_id)?.set_dirty(dirty);
    Ok(())
}

pub fn mark_children_dirty(scene: &mut Scene, node_id: &str, dirty: bool) -> Result<()> {
    node_mut(scene, node_id)?;
    let ids = child_ids(scene, node_id);
    set_flags(scene, &ids, |n| n.set_dirty(dirty))
}

/// Mark every downstream node of `node_id`, not only its children.
pub fn mark_descendants_dirty(scene: &mut Scene, node_id: &str, dirty: bool) -> Result<()> {
    node_mut(scene, node_id)?;
    let ids = descendants(scene, node_id);
    set_flags(scene, &ids, |n| n.set_dirty(dirty))
}

pub fn mark_invalid(scene: &mut Scene, node_id: &str, invalid: bool) -> Result<()> {
    node_mut(scene, node_id)?.set_invalid(invalid);
    Ok(())
}

pub fn mark_children_invalid(scene: &mut Scene, node_id: &str, invalid: bool) -> Result<()> {
    node_mut(scene, node_id)?;
    let ids = child_ids(scene, node_id);
    set_flags(scene, &ids, |n| n.set_invalid(invalid))
}

pub fn mark_descendants_invalid(scene: &mut Scene, node_id: &str, invalid: bool) -> Result<()> {
    node_mut(scene, node_id)?;
    let ids = descendants(scene, node_id);
    set_flags(scene, &ids, |n| n.set_invalid(invalid))
}

/// Evaluate a node. The default evaluation clears its dirty and invalid
/// flags.
pub fn eval(scene: &mut Scene, node_id: &str) -> Result<()> {
    let node = node_mut(scene, node_id)?;
    node.set_dirty(false);
    node.set_invalid(false);
    Ok(())
}

/// Evaluate the direct children of `node_id`.
pub fn eval_children(scene: &mut Scene, node_id: &str) -> Result<()> {
    node_mut(scene, node_id)?;
    for id in child_ids(scene, node_id) {
        eval(scene, &id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SocketType, WireType};

    /// a → b → c, a → d, plus an isolated e.
    fn chain() -> (Scene, [String; 5]) {
        let mut scene = Scene::new();
        let t = SocketType::Type1;
        let a = scene.create_node("a", &[], &[t, t]).unwrap();
        let b = scene.create_node("b", &[t], &[t]).unwrap();
        let c = scene.create_node("c", &[t], &[]).unwrap();
        let d = scene.create_node("d", &[t], &[]).unwrap();
        let e = scene.create_node("e", &[t], &[]).unwrap();
        let wire = |scene: &mut Scene, from: &str, out: usize, to: &str| {
            let o = scene.node(from).unwrap().outputs()[out].id().to_string();
            let i = scene.node(to).unwrap().inputs()[0].id().to_string();
            scene.connect(&i, &o, WireType::Direct).unwrap();
        };
        wire(&mut scene, &a, 0, &b);
        wire(&mut scene, &b, 0, &c);
        wire(&mut scene, &a, 1, &d);
        (scene, [a, b, c, d, e])
    }

    // ── traversal ─────────────────────────────────────────────────────

    #[test]
    fn test_children_follow_outputs() {
        let (scene, [a, b, c, d, _]) = chain();
        let ids: Vec<_> = children(&scene, &a).iter().map(|n| n.id().to_string()).collect();
        assert_eq!(ids, vec![b.clone(), d]);
        assert_eq!(child_ids(&scene, &b), vec![c.clone()]);
        assert!(children(&scene, &c).is_empty());
        assert!(children(&scene, "missing").is_empty());
    }

    #[test]
    fn test_descendants_are_transitive() {
        let (scene, [a, b, c, d, e]) = chain();
        let desc = descendants(&scene, &a);
        assert_eq!(desc.len(), 3);
        assert_eq!(desc[2], c);
        assert!(desc.contains(&b) && desc.contains(&d));
        assert!(!desc.contains(&e));
    }

    #[test]
    fn test_descendants_survive_cycles() {
        let mut scene = Scene::new();
        let t = SocketType::Type1;
        let x = scene.create_node("x", &[t], &[t]).unwrap();
        let y = scene.create_node("y", &[t], &[t]).unwrap();
        let xo = scene.node(&x).unwrap().outputs()[0].id().to_string();
        let xi = scene.node(&x).unwrap().inputs()[0].id().to_string();
        let yo = scene.node(&y).unwrap().outputs()[0].id().to_string();
        let yi = scene.node(&y).unwrap().inputs()[0].id().to_string();
        scene.connect(&xo, &yi, WireType::Bezier).unwrap();
        scene.connect(&yo, &xi, WireType::Bezier).unwrap();
        assert_eq!(descendants(&scene, &x), vec![y]);
    }

    // ── flags ─────────────────────────────────────────────────────────

    #[test]
    fn test_mark_children_only_touches_direct_children() {
        let (mut scene, [a, b, c, d, _]) = chain();
        mark_children_dirty(&mut scene, &a, true).unwrap();
        assert!(!scene.node(&a).unwrap().is_dirty());
        assert!(scene.node(&b).unwrap().is_dirty());
        assert!(scene.node(&d).unwrap().is_dirty());
        assert!(!scene.node(&c).unwrap().is_dirty());
    }

    #[test]
    fn test_mark_descendants_reaches_every_level() {
        let (mut scene, [a, b, c, d, e]) = chain();
        mark_descendants_invalid(&mut scene, &a, true).unwrap();
        for id in [&b, &c, &d] {
            assert!(scene.node(id).unwrap().is_invalid());
        }
        assert!(!scene.node(&e).unwrap().is_invalid());
        mark_descendants_invalid(&mut scene, &a, false).unwrap();
        assert!(!scene.node(&c).unwrap().is_invalid());
    }

    #[test]
    fn test_eval_clears_both_flags() {
        let (mut scene, [a, b, _, d, _]) = chain();
        mark_dirty(&mut scene, &a, true).unwrap();
        mark_invalid(&mut scene, &a, true).unwrap();
        mark_children_invalid(&mut scene, &a, true).unwrap();
        eval(&mut scene, &a).unwrap();
        let node = scene.node(&a).unwrap();
        assert!(!node.is_dirty() && !node.is_invalid());

        eval_children(&mut scene, &a).unwrap();
        assert!(!scene.node(&b).unwrap().is_invalid());
        assert!(!scene.node(&d).unwrap().is_invalid());
    }

    #[test]
    fn test_unknown_node_is_an_error() {
        let (mut scene, _) = chain();
        assert!(matches!(
            mark_dirty(&mut scene, "nope", true),
            Err(GraphError::UnknownEntity(_))
        ));
        assert!(eval(&mut scene, "nope").is_err());
    }
}
