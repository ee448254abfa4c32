//! Copy, cut, delete and paste of the selected sub-graph.
//!
//! Clipboard data is a `{nodes, wires}` document. The OS clipboard itself is
//! the caller's business.

use crate::doc::{self, Document, INPUTS, NODES, OUTPUTS, WIRES};
use crate::error::{GraphError, Result};
use crate::history::SceneHistory;
use crate::ids::{ItemKind, ItemRef};
use crate::scene::Scene;
use crate::serializable::Serializable;
use crate::types::HistoryFlags;
use serde_json::{Value, json};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const DELETE_DESC: &str = "Delete selected";
pub const CUT_DESC: &str = "Cut out elements from scene";
pub const PASTE_DESC: &str = "Pasted elements in scene";

/// Serialize the selected nodes and the selected wires running between them.
pub fn serialize_selected(scene: &Scene) -> Document {
    let mut nodes = Vec::new();
    let mut sockets = HashSet::new();
    let mut wires = Vec::new();

    for item in scene.selected_items() {
        match item.kind {
            ItemKind::Node => {
                if let Some(node) = scene.node(&item.id) {
                    nodes.push(node.serialize());
                    sockets.extend(node.sockets().map(|s| s.id().to_string()));
                }
            }
            ItemKind::Wire => {
                if let Some(wire) = scene.wire(&item.id).filter(|w| w.is_bound()) {
                    wires.push(wire);
                }
            }
            _ => {}
        }
    }

    let wires: Vec<Value> = wires
        .into_iter()
        .filter(|w| {
            let inside = |s: Option<&str>| s.is_some_and(|s| sockets.contains(s));
            inside(w.start()) && inside(w.end())
        })
        .map(Serializable::serialize)
        .collect();

    json!({ NODES: nodes, WIRES: wires })
}

/// Remove the selected wires and nodes, recording one history step.
/// Returns false, without recording anything, when nothing is selected.
pub fn delete_selected(scene: &mut Scene, history: &mut SceneHistory) -> Result<bool> {
    remove_selection(scene, history, DELETE_DESC, HistoryFlags::DELETE_ITEMS)
}

/// Serialize the selection, then remove it as one history step.
pub fn cut(scene: &mut Scene, history: &mut SceneHistory) -> Result<Document> {
    let data = serialize_selected(scene);
    remove_selection(scene, history, CUT_DESC, HistoryFlags::CUT_ITEMS)?;
    Ok(data)
}

fn remove_selection(
    scene: &mut Scene,
    history: &mut SceneHistory,
    desc: &str,
    op: HistoryFlags,
) -> Result<bool> {
    let selected = scene.selected_items();
    if selected.is_empty() {
        return Ok(false);
    }
    for item in selected.iter().filter(|i| i.kind == ItemKind::Wire) {
        if scene.wire(&item.id).is_some() {
            scene.remove_wire(&item.id)?;
        }
    }
    for item in selected.iter().filter(|i| i.kind == ItemKind::Node) {
        scene.remove_node(&item.id)?;
    }
    debug!(items = selected.len(), desc, "removed selection");
    history.store_history(scene, desc, op, true, false)?;
    Ok(true)
}

/// Centre of the bounding box of the node positions in `nodes`.
fn bbox_centre(nodes: &[Value]) -> Result<(f64, f64)> {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for node in nodes {
        let coord = |key: &str| {
            node.get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| GraphError::malformed(format!("pasted node without {}", key)))
        };
        let (x, y) = (coord("pos_x")?, coord("pos_y")?);
        min = (min.0.min(x), min.1.min(y));
        max = (max.0.max(x), max.1.max(y));
    }
    if nodes.is_empty() {
        return Ok((0.0, 0.0));
    }
    Ok(((min.0 + max.0) / 2.0, (min.1 + max.1) / 2.0))
}

/// Insert clipboard `data` centred on `pointer` with fresh ids and record
/// one history step. The pasted items become the selection.
///
/// Wires whose endpoints are not among the pasted sockets are dropped.
/// Malformed data is an error and leaves both scene and history unchanged.
pub fn paste(
    scene: &mut Scene,
    history: &mut SceneHistory,
    data: &Document,
    pointer: (f64, f64),
) -> Result<Vec<ItemRef>> {
    let nodes = data
        .get(NODES)
        .and_then(Value::as_array)
        .ok_or_else(|| GraphError::malformed("clipboard data without nodes"))?;
    let centre = bbox_centre(nodes)?;
    let offset = (pointer.0 - centre.0, pointer.1 - centre.1);

    let pasted_sockets: HashSet<&str> = nodes
        .iter()
        .flat_map(|n| doc::items(n, INPUTS).iter().chain(doc::items(n, OUTPUTS)))
        .filter_map(doc::id_of)
        .collect();
    let wires: Vec<Value> = doc::items(data, WIRES)
        .iter()
        .filter(|w| {
            let inside = ["start", "end"].iter().all(|k| {
                w.get(*k)
                    .and_then(Value::as_str)
                    .is_some_and(|s| pasted_sockets.contains(s))
            });
            if !inside {
                warn!(wire = ?doc::id_of(w), "dropping pasted wire leaving the pasted nodes");
            }
            inside
        })
        .cloned()
        .collect();

    let fragment = json!({ NODES: nodes, WIRES: wires });
    let previous = scene.selected_items();
    let items = scene.insert_fragment(&fragment, false, offset)?;
    for item in previous {
        scene.set_selected_silently(&item.id, false)?;
    }
    debug!(items = items.len(), ?offset, "pasted fragment");
    history.store_history(scene, PASTE_DESC, HistoryFlags::PASTE_ITEMS, true, false)?;
    Ok(items)
}
