//! Semi-structured documents and the helpers the diff engine shares.
//!
//! Every entity serializes to a [`Document`] (a `serde_json::Value` object).
//! Arrays of entity documents are matched by their `"id"` field only; there
//! is no positional or fuzzy matching anywhere in the engine.
//!
//! A changed scalar field is recorded as a two-element array `[old, new]`.
//! [`Direction`] picks one side of such a pair when a record is replayed.

use serde_json::{Map, Value};

/// A structured document: a JSON object of named fields.
pub type Document = Value;

pub const ID: &str = "id";
pub const MODIFIED: &str = "modified";
pub const REMOVED: &str = "removed";
pub const NODES: &str = "nodes";
pub const WIRES: &str = "wires";
pub const INPUTS: &str = "inputs";
pub const OUTPUTS: &str = "outputs";

/// Index of the previous value inside a change pair.
pub const PAIR_OLD: usize = 0;
/// Index of the current value inside a change pair.
pub const PAIR_NEW: usize = 1;

/// Which side of a change pair a replay moves towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Move backward: use the old side, delete additions, restore removals.
    Undo,
    /// Move forward: use the new side, insert additions, apply removals.
    Redo,
}

impl Direction {
    pub fn is_undo(self) -> bool {
        self == Direction::Undo
    }

    fn index(self) -> usize {
        match self {
            Direction::Undo => PAIR_OLD,
            Direction::Redo => PAIR_NEW,
        }
    }

    /// Select this direction's side of a `[old, new]` pair.
    pub fn pick(self, pair: &Value) -> Option<&Value> {
        pair.get(self.index())
    }
}

/// What a node removal record stands for.
///
/// Whole-node removals carry the full prior node document; socket carriers
/// carry only `id`, `inputs` and `outputs` with the removed socket documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    Node,
    Sockets,
}

impl RemovalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalKind::Node => "node",
            RemovalKind::Sockets => "sockets",
        }
    }

    /// Read the discriminant of a node removal record. Records without one
    /// are treated as whole-node removals.
    pub fn of(record: &Value) -> RemovalKind {
        match record.get(REMOVED).and_then(Value::as_str) {
            Some("sockets") => RemovalKind::Sockets,
            _ => RemovalKind::Node,
        }
    }
}

/// Build a `[old, new]` change pair.
pub fn pair(old: &Value, new: &Value) -> Value {
    Value::Array(vec![old.clone(), new.clone()])
}

pub fn id_of(doc: &Value) -> Option<&str> {
    doc.get(ID).and_then(Value::as_str)
}

/// A record is an edit when `modified` is present and true; otherwise it is
/// a pure addition.
pub fn is_modified(record: &Value) -> bool {
    record.get(MODIFIED).and_then(Value::as_bool).unwrap_or(false)
}

pub fn find_by_id<'a>(array: &'a [Value], id: &str) -> Option<&'a Value> {
    array.iter().find(|d| id_of(d) == Some(id))
}

pub fn find_by_id_mut<'a>(array: &'a mut [Value], id: &str) -> Option<&'a mut Value> {
    array.iter_mut().find(|d| id_of(d) == Some(id))
}

pub fn position_by_id(array: &[Value], id: &str) -> Option<usize> {
    array.iter().position(|d| id_of(d) == Some(id))
}

/// Delete the element with `id`. Returns whether anything was removed; an
/// absent id is not an error.
pub fn remove_by_id(array: &mut Vec<Value>, id: &str) -> bool {
    match position_by_id(array, id) {
        Some(pos) => {
            array.remove(pos);
            true
        }
        None => false,
    }
}

/// Insert `doc`, replacing an existing element with the same id in place.
pub fn upsert_by_id(array: &mut Vec<Value>, doc: Value) {
    let existing = id_of(&doc).and_then(|id| position_by_id(array, id));
    match existing {
        Some(pos) => array[pos] = doc,
        None => array.push(doc),
    }
}

/// Elements of `doc[key]`, or an empty slice when the key is missing or not
/// an array.
pub fn items<'a>(doc: &'a Value, key: &str) -> &'a [Value] {
    doc.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Mutable access to `doc[key]` as an array, creating it when missing.
///
/// `doc` must be an object (or null, which is turned into one).
pub fn array_mut<'a>(doc: &'a mut Value, key: &str) -> &'a mut Vec<Value> {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let Value::Object(obj) = doc else {
        unreachable!("doc was just set to an object")
    };
    let slot = obj
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    let Value::Array(arr) = slot else {
        unreachable!("slot was just set to an array")
    };
    arr
}

/// True for null, empty objects, and empty arrays.
pub fn is_empty(doc: &Value) -> bool {
    match doc {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// An empty `{nodes: [], wires: []}` record.
pub fn empty_record() -> Value {
    serde_json::json!({ NODES: [], WIRES: [] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_and_position_by_id() {
        let arr = vec![json!({"id": "a"}), json!({"id": "b", "x": 1})];
        assert_eq!(find_by_id(&arr, "b").unwrap()["x"], 1);
        assert_eq!(position_by_id(&arr, "a"), Some(0));
        assert!(find_by_id(&arr, "zzz").is_none());
    }

    #[test]
    fn test_remove_by_id_tolerates_absent() {
        let mut arr = vec![json!({"id": "a"})];
        assert!(remove_by_id(&mut arr, "a"));
        assert!(!remove_by_id(&mut arr, "a"));
        assert!(arr.is_empty());
    }

    #[test]
    fn test_upsert_is_last_wins() {
        let mut arr = vec![json!({"id": "a", "v": 1}), json!({"id": "b"})];
        upsert_by_id(&mut arr, json!({"id": "a", "v": 2}));
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["v"], 2);
        upsert_by_id(&mut arr, json!({"id": "c"}));
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn test_direction_pick() {
        let p = pair(&json!(1), &json!(2));
        assert_eq!(Direction::Undo.pick(&p), Some(&json!(1)));
        assert_eq!(Direction::Redo.pick(&p), Some(&json!(2)));
    }

    #[test]
    fn test_is_modified() {
        assert!(is_modified(&json!({"modified": true})));
        assert!(!is_modified(&json!({"modified": false})));
        assert!(!is_modified(&json!({"id": "x"})));
    }

    #[test]
    fn test_removal_kind() {
        assert_eq!(RemovalKind::of(&json!({"removed": "sockets"})), RemovalKind::Sockets);
        assert_eq!(RemovalKind::of(&json!({"removed": "node"})), RemovalKind::Node);
        assert_eq!(RemovalKind::of(&json!({"id": "n"})), RemovalKind::Node);
    }

    #[test]
    fn test_array_mut_creates_missing() {
        let mut doc = json!({});
        array_mut(&mut doc, "nodes").push(json!({"id": "n"}));
        assert_eq!(items(&doc, "nodes").len(), 1);
        assert!(items(&doc, "wires").is_empty());
    }
}
