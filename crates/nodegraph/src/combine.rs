//! Change-record combiner.
//!
//! Folds consecutive history entries into one entry that replays exactly
//! like the sequence it replaces, in both directions. Pairs keep the oldest
//! old value and the newest new value. Records that interact across the
//! interval are folded:
//!
//! - an addition later modified becomes the addition of the final document
//! - an addition later removed disappears together with the removal
//! - a modification later removed disappears, and the removal document is
//!   rolled back to its state at the start of the interval
//! - a repeated addition of one id keeps the last document
//!
//! Removals are unioned by id and removal kind, the first occurrence wins.

use crate::diff::SCENE_FIELDS;
use crate::doc::{
    self, Direction, Document, ID, INPUTS, MODIFIED, NODES, OUTPUTS, REMOVED, RemovalKind, WIRES,
};
use crate::history::{EntryRecord, HistoryEntry};
use crate::merge::{self, merge_fields, merge_node, merge_socket_removal};
use crate::types::HistoryFlags;
use serde_json::{Value, json};

/// Prefix of every combined entry description.
pub const COMBINED_PREFIX: &str = "<COMBINED>";

const STRUCTURAL_KEYS: [&str; 5] = [ID, MODIFIED, REMOVED, INPUTS, OUTPUTS];

/// Combine `entries`, oldest first, into one entry.
///
/// A snapshot entry absorbs the increments after it; a snapshot appearing
/// later replaces whatever came before it.
pub fn combine(entries: &[HistoryEntry]) -> HistoryEntry {
    let mut desc = String::from(COMBINED_PREFIX);
    let mut op = HistoryFlags::empty();
    let mut record: Option<EntryRecord> = None;

    for entry in entries {
        let own = entry
            .desc
            .strip_prefix(COMBINED_PREFIX)
            .map(|rest| rest.trim_start_matches(" - ").to_string())
            .unwrap_or_else(|| entry.desc.clone());
        if !own.is_empty() {
            desc.push_str(" - ");
            desc.push_str(&own);
        }
        op |= entry.op;

        record = Some(match (record, &entry.record) {
            (_, EntryRecord::Snapshot { snapshot }) => EntryRecord::Snapshot {
                snapshot: snapshot.clone(),
            },
            (None, next) => next.clone(),
            (Some(EntryRecord::Snapshot { mut snapshot }), EntryRecord::Increment { change, remove }) => {
                merge::apply_scene_increment(&mut snapshot, change, remove, Direction::Redo);
                EntryRecord::Snapshot { snapshot }
            }
            (
                Some(EntryRecord::Increment {
                    mut change,
                    remove: mut removal,
                }),
                EntryRecord::Increment {
                    change: next_change,
                    remove: next_removal,
                },
            ) => {
                combine_increments(&mut change, &mut removal, next_change, next_removal);
                EntryRecord::Increment {
                    change,
                    remove: removal,
                }
            }
        });
    }

    HistoryEntry {
        desc,
        op,
        record: record.unwrap_or_else(|| EntryRecord::Increment {
            change: doc::empty_record(),
            remove: doc::empty_record(),
        }),
    }
}

/// Fold the increment `(next_change, next_removal)` into `(change, removal)`.
pub fn combine_increments(
    change: &mut Document,
    removal: &mut Document,
    next_change: &Document,
    next_removal: &Document,
) {
    for key in SCENE_FIELDS {
        if let Some(pair) = next_change.get(key) {
            combine_pair(change, key, pair);
        }
    }
    for w in doc::items(next_removal, WIRES) {
        fold_wire_removal(change, removal, w);
    }
    for n in doc::items(next_removal, NODES) {
        match RemovalKind::of(n) {
            RemovalKind::Node => fold_node_removal(change, removal, n),
            RemovalKind::Sockets => fold_socket_carrier(change, removal, n),
        }
    }
    for n in doc::items(next_change, NODES) {
        fold_change(doc::array_mut(change, NODES), n);
    }
    for w in doc::items(next_change, WIRES) {
        fold_change(doc::array_mut(change, WIRES), w);
    }
}

/// Merge one `[old, new]` pair into `record[key]`, keeping the older old.
fn combine_pair(record: &mut Value, key: &str, pair: &Value) {
    let new = pair.get(doc::PAIR_NEW).cloned().unwrap_or(Value::Null);
    match record.get_mut(key).and_then(Value::as_array_mut) {
        Some(existing) if existing.len() == 2 => existing[doc::PAIR_NEW] = new,
        _ => {
            if let Some(obj) = record.as_object_mut() {
                obj.insert(key.to_string(), pair.clone());
            }
        }
    }
}

/// Combine two modification records of the same entity.
fn combine_records(first: &mut Value, next: &Value) {
    if let Some(fields) = next.as_object() {
        for (key, pair) in fields {
            if !STRUCTURAL_KEYS.contains(&key.as_str()) {
                combine_pair(first, key, pair);
            }
        }
    }
    first[MODIFIED] = Value::Bool(true);
    for key in [INPUTS, OUTPUTS] {
        for child in doc::items(next, key) {
            fold_change(doc::array_mut(first, key), child);
        }
    }
    prune_children(first);
}

/// Fold one change record (modification or addition) into a record list.
fn fold_change(records: &mut Vec<Value>, next: &Value) {
    let Some(id) = doc::id_of(next) else { return };
    if !doc::is_modified(next) {
        doc::upsert_by_id(records, next.clone());
        return;
    }
    match doc::find_by_id_mut(records, id) {
        Some(added) if !doc::is_modified(added) => merge_node(added, next, Direction::Redo),
        Some(first) => combine_records(first, next),
        None => records.push(next.clone()),
    }
}

/// Push a removal unless one with the same id and kind is already recorded.
fn union_removal(removals: &mut Vec<Value>, record: Value) {
    let Some(id) = doc::id_of(&record) else { return };
    let kind = RemovalKind::of(&record);
    let present = removals
        .iter()
        .any(|r| doc::id_of(r) == Some(id) && RemovalKind::of(r) == kind);
    if !present {
        removals.push(record);
    }
}

fn fold_wire_removal(change: &mut Document, removal: &mut Document, next: &Value) {
    let Some(id) = doc::id_of(next) else { return };
    let records = doc::array_mut(change, WIRES);
    let mut rolled = next.clone();
    if let Some(pos) = doc::position_by_id(records, id) {
        let first = records.remove(pos);
        if !doc::is_modified(&first) {
            return;
        }
        merge_fields(&mut rolled, &first, Direction::Undo);
    }
    union_removal(doc::array_mut(removal, WIRES), rolled);
}

/// Take the socket carrier recorded for `node` out of `removal`.
fn take_carrier(removal: &mut Document, node: &str) -> Option<Value> {
    let removals = doc::array_mut(removal, NODES);
    let pos = removals
        .iter()
        .position(|r| doc::id_of(r) == Some(node) && RemovalKind::of(r) == RemovalKind::Sockets)?;
    Some(removals.remove(pos))
}

fn fold_node_removal(change: &mut Document, removal: &mut Document, next: &Value) {
    let Some(id) = doc::id_of(next) else { return };
    let id = id.to_string();
    let records = doc::array_mut(change, NODES);
    let mut rolled = next.clone();
    if let Some(pos) = doc::position_by_id(records, &id) {
        let first = records.remove(pos);
        if !doc::is_modified(&first) {
            return;
        }
        merge_node(&mut rolled, &first, Direction::Undo);
    }
    if let Some(carrier) = take_carrier(removal, &id) {
        merge_socket_removal(&mut rolled, &carrier, Direction::Undo);
    }
    union_removal(doc::array_mut(removal, NODES), rolled);
}

fn fold_socket_carrier(change: &mut Document, removal: &mut Document, next: &Value) {
    let Some(id) = doc::id_of(next) else { return };
    let id = id.to_string();
    let records = doc::array_mut(change, NODES);
    let mut carrier = json!({ ID: id, REMOVED: RemovalKind::Sockets.as_str(), INPUTS: [], OUTPUTS: [] });

    match doc::find_by_id_mut(records, &id) {
        Some(added) if !doc::is_modified(added) => {
            merge_socket_removal(added, next, Direction::Redo);
            return;
        }
        Some(first) => {
            for key in [INPUTS, OUTPUTS] {
                for socket in doc::items(next, key) {
                    let Some(sid) = doc::id_of(socket) else { continue };
                    let children = doc::array_mut(first, key);
                    let mut rolled = socket.clone();
                    if let Some(pos) = doc::position_by_id(children, sid) {
                        let child = children.remove(pos);
                        if !doc::is_modified(&child) {
                            continue;
                        }
                        merge_fields(&mut rolled, &child, Direction::Undo);
                    }
                    doc::array_mut(&mut carrier, key).push(rolled);
                }
            }
            prune_children(first);
        }
        None => carrier = next.clone(),
    }
    if let Some(pos) = doc::position_by_id(records, &id) {
        if is_hollow(&records[pos]) {
            records.remove(pos);
        }
    }

    let removals = doc::array_mut(removal, NODES);
    let existing = removals
        .iter_mut()
        .find(|r| doc::id_of(r) == Some(id.as_str()) && RemovalKind::of(r) == RemovalKind::Sockets);
    match existing {
        Some(present) => {
            for key in [INPUTS, OUTPUTS] {
                let side = doc::array_mut(present, key);
                for socket in doc::items(&carrier, key) {
                    if let Some(sid) = doc::id_of(socket) {
                        if doc::find_by_id(side, sid).is_none() {
                            side.push(socket.clone());
                        }
                    }
                }
            }
        }
        None => {
            if !doc::items(&carrier, INPUTS).is_empty() || !doc::items(&carrier, OUTPUTS).is_empty() {
                removals.push(carrier);
            }
        }
    }
}

/// Drop empty child lists from a modification record.
fn prune_children(record: &mut Value) {
    if let Some(obj) = record.as_object_mut() {
        for key in [INPUTS, OUTPUTS] {
            if obj.get(key).and_then(Value::as_array).is_some_and(Vec::is_empty) {
                obj.remove(key);
            }
        }
    }
}

/// A modification record that no longer changes anything.
fn is_hollow(record: &Value) -> bool {
    doc::is_modified(record)
        && record
            .as_object()
            .is_some_and(|obj| obj.keys().all(|k| k == ID || k == MODIFIED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{diff_scene, is_unchanged};
    use crate::merge::apply_scene_increment;

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

    fn entry(desc: &str, op: HistoryFlags, from: &Value, to: &Value) -> HistoryEntry {
        let (change, remove) = diff_scene(from, to);
        HistoryEntry {
            desc: desc.into(),
            op,
            record: EntryRecord::Increment { change, remove },
        }
    }

    fn increment(e: &HistoryEntry) -> (&Value, &Value) {
        match &e.record {
            EntryRecord::Increment { change, remove } => (change, remove),
            EntryRecord::Snapshot { .. } => panic!("expected an increment"),
        }
    }

    /// Combining `states[0] -> states[1] -> ...` must replay exactly as the
    /// whole sequence, forward from the first state and back from the last.
    fn assert_replays(states: &[Value]) {
        let entries: Vec<_> = states
            .windows(2)
            .map(|w| entry("step", HistoryFlags::MOVE_ITEMS, &w[0], &w[1]))
            .collect();
        let combined = combine(&entries);
        let (change, remove) = increment(&combined);

        let first = &states[0];
        let last = &states[states.len() - 1];
        let mut forward = first.clone();
        apply_scene_increment(&mut forward, change, remove, Direction::Redo);
        assert!(is_unchanged(&forward, last), "redo: {forward:#}");
        let mut back = last.clone();
        apply_scene_increment(&mut back, change, remove, Direction::Undo);
        assert!(is_unchanged(&back, first), "undo: {back:#}");
    }

    // ── descriptions & flags ──────────────────────────────────────────

    #[test]
    fn test_desc_and_flags() {
        let a = scene(vec![node("n", 0.0, vec![])], vec![]);
        let b = scene(vec![node("n", 1.0, vec![])], vec![]);
        let e1 = entry("Selection Changed", HistoryFlags::SELECT_ITEMS, &a, &b);
        let e2 = entry("Node Moved", HistoryFlags::MOVE_ITEMS, &b, &a);
        let combined = combine(&[e1.clone(), e2]);
        assert_eq!(combined.desc, "<COMBINED> - Selection Changed - Node Moved");
        assert_eq!(combined.op, HistoryFlags::SELECT_ITEMS | HistoryFlags::MOVE_ITEMS);

        let again = combine(&[combined, e1]);
        assert_eq!(
            again.desc,
            "<COMBINED> - Selection Changed - Node Moved - Selection Changed"
        );
    }

    // ── pairs ─────────────────────────────────────────────────────────

    #[test]
    fn test_pairs_keep_first_old_and_last_new() {
        let s0 = scene(vec![node("n", 0.0, vec![])], vec![]);
        let s1 = scene(vec![node("n", 10.0, vec![])], vec![]);
        let mut s2 = scene(vec![node("n", 25.0, vec![])], vec![]);
        s2["nodes"][0]["title"] = json!("renamed");
        let combined = combine(&[
            entry("a", HistoryFlags::MOVE_ITEMS, &s0, &s1),
            entry("b", HistoryFlags::MOVE_ITEMS, &s1, &s2),
        ]);
        let (change, _) = increment(&combined);
        let rec = &doc::items(change, NODES)[0];
        assert_eq!(rec["pos_x"], json!([0.0, 25.0]));
        assert_eq!(rec["title"], json!(["n", "renamed"]));
        assert_eq!(rec["modified"], true);
    }

    // ── folding ───────────────────────────────────────────────────────

    #[test]
    fn test_addition_then_modification() {
        let s0 = scene(vec![], vec![]);
        let s1 = scene(vec![node("n", 0.0, vec![socket("a", 0)])], vec![]);
        let s2 = scene(vec![node("n", 30.0, vec![socket("a", 0), socket("b", 1)])], vec![]);
        assert_replays(&[s0, s1, s2]);
    }

    #[test]
    fn test_addition_then_removal_cancels() {
        let s0 = scene(vec![node("keep", 0.0, vec![])], vec![]);
        let s1 = scene(
            vec![node("keep", 0.0, vec![]), node("tmp", 0.0, vec![socket("o", 0)])],
            vec![wire("w", "o", "x")],
        );
        let entries = [
            entry("add", HistoryFlags::CREATE_ITEMS, &s0, &s1),
            entry("del", HistoryFlags::DELETE_ITEMS, &s1, &s0),
        ];
        let combined = combine(&entries);
        let (change, remove) = increment(&combined);
        assert!(crate::diff::is_empty_increment(change, remove));
    }

    #[test]
    fn test_modification_then_removal_rolls_back() {
        let s0 = scene(
            vec![node("n", 0.0, vec![socket("a", 0), socket("b", 1)])],
            vec![wire("w", "a", "z")],
        );
        let mut s1 = scene(
            vec![node("n", 40.0, vec![socket("a", 0)])],
            vec![wire("w", "a", "y")],
        );
        s1["nodes"][0]["selected"] = json!(true);
        let s2 = scene(vec![], vec![]);
        assert_replays(&[s0.clone(), s1, s2]);

        let moved = scene(
            vec![node("n", 40.0, vec![socket("a", 0), socket("b", 1)])],
            vec![wire("w", "a", "z")],
        );
        let combined = combine(&[
            entry("m", HistoryFlags::MOVE_ITEMS, &s0, &moved),
            entry("d", HistoryFlags::DELETE_ITEMS, &moved, &scene(vec![], vec![])),
        ]);
        let (change, remove) = increment(&combined);
        assert!(doc::items(change, NODES).is_empty());
        let removed = &doc::items(remove, NODES)[0];
        assert_eq!(removed["pos_x"], 0.0);
        assert_eq!(removed["removed"], "node");
    }

    #[test]
    fn test_socket_changes_across_entries() {
        let s0 = scene(vec![node("n", 0.0, vec![socket("a", 0), socket("b", 1), socket("c", 2)])], vec![]);
        let s1 = scene(vec![node("n", 0.0, vec![socket("a", 0), socket("c", 1)])], vec![]);
        let s2 = scene(vec![node("n", 0.0, vec![socket("a", 0), socket("c", 1), socket("d", 2)])], vec![]);
        let s3 = scene(vec![node("n", 5.0, vec![socket("c", 0)])], vec![]);
        assert_replays(&[s0, s1, s2, s3]);
    }

    #[test]
    fn test_wire_retarget_then_remove() {
        let s0 = scene(vec![], vec![wire("w", "o", "a")]);
        let s1 = scene(vec![], vec![wire("w", "o", "b")]);
        let s2 = scene(vec![], vec![]);
        assert_replays(&[s0, s1, s2]);
    }

    #[test]
    fn test_removal_union_first_wins() {
        let s0 = scene(vec![node("n", 0.0, vec![socket("a", 0), socket("b", 1)])], vec![]);
        let s1 = scene(vec![node("n", 0.0, vec![socket("b", 1)])], vec![]);
        let s2 = scene(vec![node("n", 0.0, vec![])], vec![]);
        assert_replays(&[s0.clone(), s1.clone(), s2.clone()]);

        let combined = combine(&[
            entry("x", HistoryFlags::DELETE_ITEMS, &s0, &s1),
            entry("y", HistoryFlags::DELETE_ITEMS, &s1, &s2),
        ]);
        let (_, remove) = increment(&combined);
        let carriers = doc::items(remove, NODES);
        assert_eq!(carriers.len(), 1);
        assert_eq!(doc::items(&carriers[0], INPUTS).len(), 2);
    }

    #[test]
    fn test_snapshot_absorbs_increments() {
        let s0 = scene(vec![node("n", 0.0, vec![])], vec![]);
        let s1 = scene(vec![node("n", 9.0, vec![])], vec![]);
        let base = HistoryEntry {
            desc: "Initial State".into(),
            op: HistoryFlags::INIT_VIEW,
            record: EntryRecord::Snapshot { snapshot: s0.clone() },
        };
        let combined = combine(&[base, entry("m", HistoryFlags::MOVE_ITEMS, &s0, &s1)]);
        match combined.record {
            EntryRecord::Snapshot { snapshot } => assert!(is_unchanged(&snapshot, &s1)),
            EntryRecord::Increment { .. } => panic!("expected a snapshot"),
        }
    }
}
