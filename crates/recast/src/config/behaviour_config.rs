use crate::config::{default_countdown_seconds, default_true};

use serde::{Deserialize, Serialize};

/// Application behavior configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviourConfig {
    /// Seconds counted down between setup and the first frame.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,

    /// Remove the output files when a recording is cancelled.
    #[serde(default = "default_true")]
    pub delete_on_cancel: bool,

    /// Put the finished video's path on the clipboard.
    #[serde(default = "default_true")]
    pub copy_path_to_clipboard: bool,

    /// Show a desktop notification when a recording is saved.
    #[serde(default = "default_true")]
    pub notify_on_finish: bool,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: default_countdown_seconds(),
            delete_on_cancel: true,
            copy_path_to_clipboard: true,
            notify_on_finish: true,
        }
    }
}
