//! Bounded undo/redo history of scene increments.
//!
//! Entry 0 holds a full snapshot (the baseline); every later entry holds the
//! `(change, remove)` increment from the previous state. `cur_step` points at
//! the entry describing the live scene, `None` before anything is stored.

use crate::combine::combine;
use crate::config::{DEFAULT_HISTORY_LIMIT, EditorConfig};
use crate::diff::diff_scene;
use crate::doc::{Direction, Document};
use crate::error::{GraphError, Result};
use crate::merge::apply_scene_increment;
use crate::scene::Scene;
use crate::serializable::Serializable;
use crate::types::HistoryFlags;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const INITIAL_STATE: &str = "Initial State";

/// Payload of a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryRecord {
    Snapshot { snapshot: Document },
    Increment { change: Document, remove: Document },
}

/// One undo step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub desc: String,
    #[serde(rename = "type")]
    pub op: HistoryFlags,
    #[serde(flatten)]
    pub record: EntryRecord,
}

impl HistoryEntry {
    pub fn is_snapshot(&self) -> bool {
        matches!(self.record, EntryRecord::Snapshot { .. })
    }
}

type HistoryListener = Box<dyn FnMut()>;

#[derive(Serialize, Deserialize)]
#[serde(try_from = "StoredHistory")]
pub struct SceneHistory {
    stack: Vec<HistoryEntry>,
    cur_step: Option<usize>,
    limit: usize,
    /// Baseline snapshot, kept equal to entry 0.
    head: Document,
    /// Snapshot at the top of the stack.
    tail: Document,
    #[serde(skip)]
    listeners: Vec<HistoryListener>,
}

/// The persisted fields, checked before they become a live history.
#[derive(Deserialize)]
struct StoredHistory {
    stack: Vec<HistoryEntry>,
    cur_step: Option<usize>,
    limit: usize,
    head: Document,
    tail: Document,
}

impl TryFrom<StoredHistory> for SceneHistory {
    type Error = GraphError;

    fn try_from(stored: StoredHistory) -> Result<Self> {
        match (stored.cur_step, stored.stack.first()) {
            (None, None) => {}
            (Some(cur), Some(first)) if cur < stored.stack.len() => {
                if !first.is_snapshot() {
                    return Err(GraphError::malformed("history baseline is not a snapshot"));
                }
            }
            (cur, _) => {
                return Err(GraphError::malformed(format!(
                    "history step {:?} out of range for {} entries",
                    cur,
                    stored.stack.len()
                )));
            }
        }
        Ok(Self {
            limit: stored.limit.max(2).max(stored.stack.len()),
            stack: stored.stack,
            cur_step: stored.cur_step,
            head: stored.head,
            tail: stored.tail,
            listeners: Vec::new(),
        })
    }
}

impl std::fmt::Debug for SceneHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHistory")
            .field("len", &self.stack.len())
            .field("cur_step", &self.cur_step)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl Default for SceneHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SceneHistory {
    /// A history holding at most `limit` entries. The baseline plus one
    /// increment is the smallest useful history, so smaller limits are
    /// raised to 2.
    pub fn new(limit: usize) -> Self {
        Self {
            stack: Vec::new(),
            cur_step: None,
            limit: limit.max(2),
            head: Value::Null,
            tail: Value::Null,
            listeners: Vec::new(),
        }
    }

    pub fn with_config(config: &EditorConfig) -> Self {
        Self::new(config.history_limit)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn cur_step(&self) -> Option<usize> {
        self.cur_step
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn head(&self) -> &Document {
        &self.head
    }

    pub fn tail(&self) -> &Document {
        &self.tail
    }

    pub fn can_undo(&self) -> bool {
        self.cur_step.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cur_step.is_some_and(|c| c + 1 < self.stack.len())
    }

    /// Register a callback run after every store, undo, redo and clear.
    pub fn add_modified_listener(&mut self, listener: impl FnMut() + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self) {
        for listener in &mut self.listeners {
            listener();
        }
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.cur_step = None;
        self.head = Value::Null;
        self.tail = Value::Null;
        self.notify();
    }

    /// Reset the history to a single baseline entry of the current scene.
    pub fn store_initial_history(&mut self, scene: &mut Scene) -> Result<()> {
        self.clear();
        self.store_history(scene, INITIAL_STATE, HistoryFlags::INIT_VIEW, false, false)
    }

    /// Record the current scene as a new step.
    ///
    /// Redo entries above the current step are discarded first. With
    /// `merge_last`, the step is combined into the top entry unless that
    /// entry is the baseline.
    pub fn store_history(
        &mut self,
        scene: &mut Scene,
        desc: &str,
        op: HistoryFlags,
        set_modified: bool,
        merge_last: bool,
    ) -> Result<()> {
        if set_modified {
            scene.set_modified(true);
        }
        let current = scene.serialize();

        let Some(cur) = self.cur_step else {
            self.stack.clear();
            self.stack.push(HistoryEntry {
                desc: desc.to_string(),
                op,
                record: EntryRecord::Snapshot {
                    snapshot: current.clone(),
                },
            });
            self.head = current.clone();
            self.tail = current;
            self.cur_step = Some(0);
            debug!(desc, "stored baseline");
            self.notify();
            return Ok(());
        };

        if cur + 1 < self.stack.len() {
            self.stack.truncate(cur + 1);
            self.tail = self.composite()?;
        }

        let (change, remove) = diff_scene(&self.tail, &current);
        let entry = HistoryEntry {
            desc: desc.to_string(),
            op,
            record: EntryRecord::Increment { change, remove },
        };

        if merge_last && cur > 0 {
            let top = self.stack.pop().ok_or_else(|| GraphError::malformed("empty history stack"))?;
            let combined = combine(&[top, entry]);
            debug!(desc = %combined.desc, step = cur, "merged into last entry");
            self.stack.push(combined);
        } else {
            if self.stack.len() >= self.limit {
                self.evict_oldest()?;
            }
            self.stack.push(entry);
            debug!(desc, step = self.stack.len() - 1, "stored history");
        }
        self.cur_step = Some(self.stack.len() - 1);
        self.tail = current;
        self.notify();
        Ok(())
    }

    /// Drop entry 1 and fold it into the baseline, so the remaining entries
    /// still replay from an exact starting point.
    fn evict_oldest(&mut self) -> Result<()> {
        if self.stack.len() < 2 {
            return Ok(());
        }
        let evicted = self.stack.remove(1);
        if let EntryRecord::Increment { change, remove } = &evicted.record {
            apply_scene_increment(&mut self.head, change, remove, Direction::Redo);
        }
        let baseline = self
            .stack
            .first_mut()
            .ok_or_else(|| GraphError::malformed("history without baseline"))?;
        baseline.record = EntryRecord::Snapshot {
            snapshot: self.head.clone(),
        };
        self.cur_step = self.cur_step.map(|c| c.saturating_sub(1));
        debug!(desc = %evicted.desc, "evicted oldest history entry");
        Ok(())
    }

    /// Snapshot reached after replaying entries `1..=step` over the baseline.
    pub fn snapshot_at(&self, step: usize) -> Result<Document> {
        if step >= self.stack.len() {
            return Err(GraphError::UnknownEntity(format!("history step {}", step)));
        }
        let mut snapshot = self.head.clone();
        for entry in self.stack.iter().take(step + 1).skip(1) {
            match &entry.record {
                EntryRecord::Increment { change, remove } => {
                    apply_scene_increment(&mut snapshot, change, remove, Direction::Redo)
                }
                EntryRecord::Snapshot { snapshot: s } => snapshot = s.clone(),
            }
        }
        Ok(snapshot)
    }

    /// The baseline with every stored increment folded in.
    pub fn composite(&self) -> Result<Document> {
        match self.stack.len() {
            0 => Ok(Value::Null),
            n => self.snapshot_at(n - 1),
        }
    }

    pub fn undo(&mut self, scene: &mut Scene) -> Result<bool> {
        let Some(cur) = self.cur_step.filter(|_| self.can_undo()) else {
            return Ok(false);
        };
        let entry = self
            .stack
            .get(cur)
            .ok_or_else(|| GraphError::UnknownEntity(format!("history step {}", cur)))?;
        if let EntryRecord::Increment { change, remove } = &entry.record {
            scene.deserialize_incremental(change, remove, Direction::Undo)?;
        }
        debug!(desc = %entry.desc, step = cur - 1, "undo");
        self.cur_step = Some(cur - 1);
        self.refresh_modified(scene);
        self.notify();
        Ok(true)
    }

    pub fn redo(&mut self, scene: &mut Scene) -> Result<bool> {
        let Some(next) = self.cur_step.filter(|_| self.can_redo()).map(|c| c + 1) else {
            return Ok(false);
        };
        let entry = self
            .stack
            .get(next)
            .ok_or_else(|| GraphError::UnknownEntity(format!("history step {}", next)))?;
        if let EntryRecord::Increment { change, remove } = &entry.record {
            scene.deserialize_incremental(change, remove, Direction::Redo)?;
        }
        debug!(desc = %entry.desc, step = next, "redo");
        self.cur_step = Some(next);
        self.refresh_modified(scene);
        self.notify();
        Ok(true)
    }

    /// Rebuild the scene wholesale from the snapshot at the current step.
    pub fn restore_current(&self, scene: &mut Scene) -> Result<()> {
        let Some(cur) = self.cur_step else {
            return Ok(());
        };
        let snapshot = self.snapshot_at(cur)?;
        scene.load_document(&snapshot, true)?;
        self.refresh_modified(scene);
        Ok(())
    }

    /// The scene is modified when any step up to the current one changed the
    /// document rather than just the selection.
    fn refresh_modified(&self, scene: &mut Scene) {
        let modified = self
            .cur_step
            .and_then(|cur| self.stack.get(1..=cur))
            .is_some_and(|steps| steps.iter().any(|e| e.op.modifies_document()));
        scene.set_modified(modified);
    }
}
