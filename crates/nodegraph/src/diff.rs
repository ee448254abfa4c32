//! Structural differ: reduce two snapshots to a change record and a removal
//! record.
//!
//! Every function takes a `candidate` from the previous snapshot and the
//! array it should be looked up in from the current snapshot. Matching is by
//! id only.

use crate::doc::{
    self, Document, ID, INPUTS, MODIFIED, NODES, OUTPUTS, REMOVED, RemovalKind, WIRES,
};
use crate::node::NODE_FIELDS;
use crate::socket::SOCKET_FIELDS;
use crate::wire::WIRE_FIELDS;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Scene-level fields compared on their own.
pub const SCENE_FIELDS: [&str; 2] = ["scene_width", "scene_height"];

/// Result of diffing one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Changed fields as `[old, new]` pairs, child records, `id` and
    /// `modified`. `None` when nothing changed.
    pub change: Option<Document>,
    /// The candidate itself when it is gone, or a socket-removal carrier.
    pub removal: Option<Document>,
    /// The matching element of the current snapshot.
    pub found: Option<Document>,
}

fn field_changes(candidate: &Value, found: &Value, fields: &[&str]) -> Map<String, Value> {
    let mut change = Map::new();
    for &key in fields {
        let old = candidate.get(key).unwrap_or(&Value::Null);
        let new = found.get(key).unwrap_or(&Value::Null);
        if old != new {
            change.insert(key.to_string(), doc::pair(old, new));
        }
    }
    change
}

/// Diff a leaf entity: any differing field marks the record modified.
fn diff_leaf(candidate: &Value, search: &[Value], fields: &[&str]) -> Diff {
    let Some(found) = doc::id_of(candidate).and_then(|id| doc::find_by_id(search, id)) else {
        return Diff {
            removal: Some(candidate.clone()),
            ..Diff::default()
        };
    };
    let mut change = field_changes(candidate, found, fields);
    let change = if change.is_empty() {
        None
    } else {
        change.insert(MODIFIED.into(), Value::Bool(true));
        change.insert(ID.into(), found[ID].clone());
        Some(Value::Object(change))
    };
    Diff {
        change,
        removal: None,
        found: Some(found.clone()),
    }
}

pub fn diff_socket(candidate: &Value, search: &[Value]) -> Diff {
    diff_leaf(candidate, search, &SOCKET_FIELDS)
}

pub fn diff_wire(candidate: &Value, search: &[Value]) -> Diff {
    diff_leaf(candidate, search, &WIRE_FIELDS)
}

/// Diff a node, recursing into both socket sides.
///
/// A vanished node yields its full document tagged `"removed": "node"`.
/// Vanished sockets of a surviving node are collected into a carrier tagged
/// `"removed": "sockets"`. New sockets are appended raw to the change record.
pub fn diff_node(candidate: &Value, search: &[Value]) -> Diff {
    let Some(found) = doc::id_of(candidate).and_then(|id| doc::find_by_id(search, id)) else {
        let mut removal = candidate.clone();
        removal[REMOVED] = Value::from(RemovalKind::Node.as_str());
        return Diff {
            removal: Some(removal),
            ..Diff::default()
        };
    };

    let mut change = field_changes(candidate, found, &NODE_FIELDS);
    let mut carrier = json!({
        ID: found[ID],
        REMOVED: RemovalKind::Sockets.as_str(),
        INPUTS: [],
        OUTPUTS: [],
    });
    let mut sockets_removed = false;

    for key in [INPUTS, OUTPUTS] {
        let previous = doc::items(candidate, key);
        let current = doc::items(found, key);
        let mut children = Vec::new();
        let mut seen = HashSet::new();

        for socket in previous {
            let d = diff_socket(socket, current);
            if let Some(c) = d.change {
                children.push(c);
            }
            if let Some(r) = d.removal {
                doc::array_mut(&mut carrier, key).push(r);
                sockets_removed = true;
            }
            if let Some(f) = d.found.as_ref().and_then(doc::id_of) {
                seen.insert(f.to_string());
            }
        }
        for socket in current {
            if doc::id_of(socket).is_some_and(|id| !seen.contains(id)) {
                children.push(socket.clone());
            }
        }
        if !children.is_empty() {
            change.insert(key.to_string(), Value::Array(children));
        }
    }

    let change = if change.is_empty() {
        None
    } else {
        change.insert(MODIFIED.into(), Value::Bool(true));
        change.insert(ID.into(), found[ID].clone());
        Some(Value::Object(change))
    };
    Diff {
        change,
        removal: sockets_removed.then_some(carrier),
        found: Some(found.clone()),
    }
}

/// Diff one entity array, appending additions raw.
fn diff_array(
    previous: &[Value],
    current: &[Value],
    differ: fn(&Value, &[Value]) -> Diff,
    change: &mut Vec<Value>,
    removal: &mut Vec<Value>,
) {
    let mut seen = HashSet::new();
    for candidate in previous {
        let d = differ(candidate, current);
        if let Some(c) = d.change {
            change.push(c);
        }
        if let Some(r) = d.removal {
            removal.push(r);
        }
        if let Some(id) = doc::id_of(candidate) {
            seen.insert(id.to_string());
        }
    }
    for item in current {
        if doc::id_of(item).is_some_and(|id| !seen.contains(id)) {
            change.push(item.clone());
        }
    }
}

/// Reduce two scene snapshots to `(change, removal)`.
///
/// `change = {nodes, wires, scene_width?, scene_height?}` and
/// `removal = {nodes, wires}`.
pub fn diff_scene(previous: &Document, current: &Document) -> (Document, Document) {
    let mut change_nodes = Vec::new();
    let mut change_wires = Vec::new();
    let mut removal_nodes = Vec::new();
    let mut removal_wires = Vec::new();

    diff_array(
        doc::items(previous, NODES),
        doc::items(current, NODES),
        diff_node,
        &mut change_nodes,
        &mut removal_nodes,
    );
    diff_array(
        doc::items(previous, WIRES),
        doc::items(current, WIRES),
        diff_wire,
        &mut change_wires,
        &mut removal_wires,
    );

    let mut change = field_changes(previous, current, &SCENE_FIELDS);
    change.insert(NODES.into(), Value::Array(change_nodes));
    change.insert(WIRES.into(), Value::Array(change_wires));
    let removal = json!({ NODES: removal_nodes, WIRES: removal_wires });
    (Value::Object(change), removal)
}

/// True when a `(change, removal)` pair records nothing.
pub fn is_empty_increment(change: &Document, removal: &Document) -> bool {
    let scene_fields_unchanged = SCENE_FIELDS.iter().all(|k| change.get(*k).is_none());
    scene_fields_unchanged
        && doc::items(change, NODES).is_empty()
        && doc::items(change, WIRES).is_empty()
        && doc::items(removal, NODES).is_empty()
        && doc::items(removal, WIRES).is_empty()
}

/// Structural equality: same ids with the same diffed fields, regardless of
/// array order.
pub fn is_unchanged(previous: &Document, current: &Document) -> bool {
    let (change, removal) = diff_scene(previous, current);
    is_empty_increment(&change, &removal)
}
