use crate::config::EditorConfig;
use crate::error::Result;
use crate::history::SceneHistory;
use crate::ids::ItemRef;
use crate::scene::Scene;
use crate::types::HistoryFlags;
use chrono::{DateTime, Duration, Utc};

pub const SELECTION_CHANGED: &str = "Selection Changed";
pub const DESELECTION: &str = "Deselection Something";

/// Turns selection changes into history entries.
///
/// Clicking from one item straight to another emits a deselection followed
/// almost immediately by a selection. When the reselection lands within the
/// jump window, it is merged into the deselection entry so one undo step
/// covers the whole jump.
#[derive(Debug, Clone)]
pub struct SelectionTracker {
    last_selected: Vec<ItemRef>,
    last_deselected_at: Option<DateTime<Utc>>,
    window: Duration,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::with_config(&EditorConfig::default())
    }
}

impl SelectionTracker {
    pub fn with_config(config: &EditorConfig) -> Self {
        Self {
            last_selected: Vec::new(),
            last_deselected_at: None,
            window: config.jump_select_window(),
        }
    }

    /// Resume tracking from a known selection, e.g. one restored from disk.
    pub fn with_selection(mut self, items: Vec<ItemRef>) -> Self {
        self.last_selected = items;
        self
    }

    pub fn last_selected(&self) -> &[ItemRef] {
        &self.last_selected
    }

    /// Compare the scene's selection with the last one seen and record the
    /// difference. Returns whether an entry was stored.
    pub fn on_selection_changed(
        &mut self,
        scene: &mut Scene,
        history: &mut SceneHistory,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let current = scene.selected_items();
        if current == self.last_selected {
            return Ok(false);
        }

        if current.is_empty() {
            self.last_selected.clear();
            self.last_deselected_at = Some(now);
            history.store_history(scene, DESELECTION, HistoryFlags::DESELECT_ITEMS, false, false)?;
        } else {
            let jump = self
                .last_deselected_at
                .is_some_and(|at| now - at < self.window);
            self.last_selected = current;
            history.store_history(scene, SELECTION_CHANGED, HistoryFlags::SELECT_ITEMS, false, jump)?;
        }
        Ok(true)
    }
}
