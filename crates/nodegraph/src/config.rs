use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_HISTORY_LIMIT: usize = 32;
pub const DEFAULT_SCENE_SIZE: u32 = 64000;
pub const DEFAULT_JUMP_SELECT_WINDOW_MS: i64 = 50;

/// Editor tunables. Every field is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of history entries, baseline included.
    pub history_limit: usize,
    pub scene_width: u32,
    pub scene_height: u32,
    /// A reselection this soon after a deselection is folded into the
    /// previous selection entry.
    pub jump_select_window_ms: i64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            scene_width: DEFAULT_SCENE_SIZE,
            scene_height: DEFAULT_SCENE_SIZE,
            jump_select_window_ms: DEFAULT_JUMP_SELECT_WINDOW_MS,
        }
    }
}

impl EditorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn jump_select_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.jump_select_window_ms)
    }
}
