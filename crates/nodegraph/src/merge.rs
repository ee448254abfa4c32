//! Structural merger: fold change and removal records into snapshot
//! documents.
//!
//! [`Direction::Redo`] moves a snapshot forward across an increment,
//! [`Direction::Undo`] moves it back. Both orders mirror the live replay in
//! [`Scene::deserialize_incremental`](crate::scene::Scene::deserialize_incremental),
//! so the snapshot a history computes always matches the scene it drives.
//!
//! Re-applying a record is harmless: overwrites are idempotent, deletions
//! ignore missing ids and insertions replace by id.

use crate::doc::{
    self, Direction, Document, ID, INPUTS, MODIFIED, NODES, OUTPUTS, REMOVED, RemovalKind, WIRES,
};
use crate::diff::SCENE_FIELDS;
use serde_json::Value;

/// Keys of a change record that are not `[old, new]` pairs.
const STRUCTURAL_KEYS: [&str; 5] = [ID, MODIFIED, REMOVED, INPUTS, OUTPUTS];

/// Overwrite every paired field of `change` on `target`.
pub fn merge_fields(target: &mut Value, change: &Value, direction: Direction) {
    let Some(fields) = change.as_object() else {
        return;
    };
    for (key, pair) in fields {
        if STRUCTURAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let (Some(value), Some(obj)) = (direction.pick(pair), target.as_object_mut()) {
            obj.insert(key.clone(), value.clone());
        }
    }
}

/// A removed document as it appeared in the snapshot.
pub fn strip_removal_tag(doc: &Value) -> Value {
    let mut doc = doc.clone();
    if let Some(obj) = doc.as_object_mut() {
        obj.remove(REMOVED);
    }
    doc
}

/// Insert a socket document keeping the side ordered by `index`, replacing
/// any socket with the same id.
fn insert_socket_sorted(side: &mut Vec<Value>, socket: Value) {
    if let Some(id) = doc::id_of(&socket) {
        doc::remove_by_id(side, &id.to_string());
    }
    let index = socket.get("index").and_then(Value::as_u64).unwrap_or(u64::MAX);
    let at = side
        .iter()
        .position(|s| s.get("index").and_then(Value::as_u64).unwrap_or(0) > index)
        .unwrap_or(side.len());
    side.insert(at, socket);
}

fn sort_side(node: &mut Value, key: &str) {
    doc::array_mut(node, key)
        .sort_by_key(|s| s.get("index").and_then(Value::as_u64).unwrap_or(0));
}

/// Apply a node change record to the node document `target`.
pub fn merge_node(target: &mut Value, change: &Value, direction: Direction) {
    merge_fields(target, change, direction);
    for key in [INPUTS, OUTPUTS] {
        let children = doc::items(change, key);
        let ordered: Box<dyn Iterator<Item = &Value> + '_> = match direction {
            Direction::Redo => Box::new(children.iter()),
            Direction::Undo => Box::new(children.iter().rev()),
        };
        for child in ordered {
            let Some(id) = doc::id_of(child) else { continue };
            let side = doc::array_mut(target, key);
            if doc::is_modified(child) {
                if let Some(socket) = doc::find_by_id_mut(side, id) {
                    merge_fields(socket, child, direction);
                }
            } else if direction.is_undo() {
                doc::remove_by_id(side, id);
            } else {
                insert_socket_sorted(side, child.clone());
            }
        }
        if !children.is_empty() {
            sort_side(target, key);
        }
    }
}

/// Apply a socket-removal carrier to the node document `target`.
pub fn merge_socket_removal(target: &mut Value, carrier: &Value, direction: Direction) {
    for key in [INPUTS, OUTPUTS] {
        let sockets = doc::items(carrier, key);
        let side = doc::array_mut(target, key);
        match direction {
            Direction::Redo => {
                for s in sockets {
                    if let Some(id) = doc::id_of(s) {
                        doc::remove_by_id(side, id);
                    }
                }
            }
            Direction::Undo => {
                for s in sockets.iter().rev() {
                    insert_socket_sorted(side, s.clone());
                }
            }
        }
    }
}

fn apply_node_removal(target: &mut Document, record: &Value, direction: Direction) {
    let Some(id) = doc::id_of(record) else { return };
    let nodes = doc::array_mut(target, NODES);
    match (RemovalKind::of(record), direction) {
        (RemovalKind::Node, Direction::Redo) => {
            doc::remove_by_id(nodes, id);
        }
        (RemovalKind::Node, Direction::Undo) => {
            doc::upsert_by_id(nodes, strip_removal_tag(record));
        }
        (RemovalKind::Sockets, _) => {
            if let Some(node) = doc::find_by_id_mut(nodes, id) {
                merge_socket_removal(node, record, direction);
            }
        }
    }
}

fn apply_node_change(target: &mut Document, record: &Value, direction: Direction) {
    let Some(id) = doc::id_of(record) else { return };
    let nodes = doc::array_mut(target, NODES);
    if doc::is_modified(record) {
        if let Some(node) = doc::find_by_id_mut(nodes, id) {
            merge_node(node, record, direction);
        }
    } else if direction.is_undo() {
        doc::remove_by_id(nodes, id);
    } else {
        doc::upsert_by_id(nodes, record.clone());
    }
}

fn apply_wire_change(target: &mut Document, record: &Value, direction: Direction) {
    let Some(id) = doc::id_of(record) else { return };
    let wires = doc::array_mut(target, WIRES);
    if doc::is_modified(record) {
        if let Some(wire) = doc::find_by_id_mut(wires, id) {
            merge_fields(wire, record, direction);
        }
    } else if direction.is_undo() {
        doc::remove_by_id(wires, id);
    } else {
        doc::upsert_by_id(wires, record.clone());
    }
}

fn apply_wire_removal(target: &mut Document, record: &Value, direction: Direction) {
    let Some(id) = doc::id_of(record) else { return };
    let wires = doc::array_mut(target, WIRES);
    match direction {
        Direction::Redo => {
            doc::remove_by_id(wires, id);
        }
        Direction::Undo => doc::upsert_by_id(wires, record.clone()),
    }
}

fn apply_scene_fields(target: &mut Document, change: &Document, direction: Direction) {
    for key in SCENE_FIELDS {
        if let Some(value) = change.get(key).and_then(|p| direction.pick(p)) {
            target[key] = value.clone();
        }
    }
}

/// Move a full scene snapshot across one `(change, removal)` increment.
pub fn apply_scene_increment(
    target: &mut Document,
    change: &Document,
    removal: &Document,
    direction: Direction,
) {
    match direction {
        Direction::Redo => {
            for w in doc::items(removal, WIRES) {
                apply_wire_removal(target, w, direction);
            }
            for n in doc::items(removal, NODES) {
                apply_node_removal(target, n, direction);
            }
            apply_scene_fields(target, change, direction);
            for n in doc::items(change, NODES) {
                apply_node_change(target, n, direction);
            }
            for w in doc::items(change, WIRES) {
                apply_wire_change(target, w, direction);
            }
        }
        Direction::Undo => {
            for w in doc::items(change, WIRES).iter().rev() {
                apply_wire_change(target, w, direction);
            }
            for n in doc::items(change, NODES).iter().rev() {
                apply_node_change(target, n, direction);
            }
            apply_scene_fields(target, change, direction);
            for n in doc::items(removal, NODES).iter().rev() {
                apply_node_removal(target, n, direction);
            }
            for w in doc::items(removal, WIRES).iter().rev() {
                apply_wire_removal(target, w, direction);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{diff_scene, is_unchanged};
    use serde_json::json;

    fn socket(id: &str, index: u64) -> Value {
        json!({"id": id, "index": index, "position": 3, "socket_type": 0})
    }

    fn node(id: &str, x: f64, inputs: Vec<Value>) -> Value {
        json!({
            "id": id, "title": id, "pos_x": x, "pos_y": 0.0,
            "inputs": inputs, "outputs": [], "selected": false, "content": {}
        })
    }

    fn wire(id: &str, start: &str, end: &str) -> Value {
        json!({"id": id, "wire_type": 1, "start": start, "end": end, "selected": false})
    }

    fn scene(nodes: Vec<Value>, wires: Vec<Value>) -> Value {
        json!({"id": "s", "scene_width": 64000, "scene_height": 64000, "nodes": nodes, "wires": wires})
    }

    fn before_after() -> (Value, Value) {
        let a = scene(
            vec![
                node("n1", 0.0, vec![socket("a", 0), socket("b", 1), socket("c", 2)]),
                node("n2", 0.0, vec![]),
                node("gone", 0.0, vec![socket("g", 0)]),
            ],
            vec![wire("w1", "x", "a"), wire("w2", "y", "g")],
        );
        let mut b = scene(
            vec![
                node("n1", 40.0, vec![socket("a", 0), socket("c", 1), socket("d", 2)]),
                node("n2", 0.0, vec![]),
                node("fresh", 7.0, vec![]),
            ],
            vec![wire("w1", "x", "c"), wire("w3", "y", "a")],
        );
        b["scene_height"] = json!(100);
        (a, b)
    }

    // ── inverse ───────────────────────────────────────────────────────

    #[test]
    fn test_redo_reaches_current() {
        let (a, b) = before_after();
        let (change, removal) = diff_scene(&a, &b);
        let mut target = a.clone();
        apply_scene_increment(&mut target, &change, &removal, Direction::Redo);
        assert!(is_unchanged(&target, &b));
        assert_eq!(target["scene_height"], 100);
    }

    #[test]
    fn test_undo_reaches_previous() {
        let (a, b) = before_after();
        let (change, removal) = diff_scene(&a, &b);
        let mut target = b.clone();
        apply_scene_increment(&mut target, &change, &removal, Direction::Undo);
        assert!(is_unchanged(&target, &a));
        let n1 = doc::find_by_id(doc::items(&target, NODES), "n1").unwrap();
        let ids: Vec<_> = doc::items(n1, INPUTS).iter().filter_map(doc::id_of).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let gone = doc::find_by_id(doc::items(&target, NODES), "gone").unwrap();
        assert!(gone.get(REMOVED).is_none());
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let (a, b) = before_after();
        let (change, removal) = diff_scene(&a, &b);
        let mut once = a.clone();
        apply_scene_increment(&mut once, &change, &removal, Direction::Redo);
        let mut twice = once.clone();
        apply_scene_increment(&mut twice, &change, &removal, Direction::Redo);
        assert_eq!(once, twice);
    }

    // ── pieces ────────────────────────────────────────────────────────

    #[test]
    fn test_merge_fields_skips_structural_keys() {
        let mut target = json!({"id": "n", "title": "old"});
        let change = json!({"id": "n", "title": ["old", "new"], "modified": true});
        merge_fields(&mut target, &change, Direction::Redo);
        assert_eq!(target, json!({"id": "n", "title": "new"}));
    }

    #[test]
    fn test_socket_carrier_undo_restores_order() {
        let mut target = node("n", 0.0, vec![socket("a", 0), socket("c", 2)]);
        let carrier = json!({"id": "n", "removed": "sockets", "inputs": [socket("b", 1)], "outputs": []});
        merge_socket_removal(&mut target, &carrier, Direction::Undo);
        let ids: Vec<_> = doc::items(&target, INPUTS).iter().filter_map(doc::id_of).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        merge_socket_removal(&mut target, &carrier, Direction::Redo);
        assert_eq!(doc::items(&target, INPUTS).len(), 2);
    }

    #[test]
    fn test_missing_ids_are_tolerated() {
        let mut target = scene(vec![], vec![]);
        let change = json!({"nodes": [{"id": "ghost", "pos_x": [0, 1], "modified": true}], "wires": []});
        let removal = json!({"nodes": [{"id": "ghost", "removed": "node"}], "wires": [{"id": "w"}]});
        apply_scene_increment(&mut target, &change, &removal, Direction::Redo);
        assert_eq!(target, scene(vec![], vec![]));
    }
}
