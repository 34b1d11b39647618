use crate::config::default_video_codec;

use std::path::PathBuf;

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

/// Where and how recordings are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the video and audio files. Created on demand.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// ffmpeg encoder name for the video file.
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            video_codec: default_video_codec(),
        }
    }
}

/// `<Videos>/recast`, falling back to the app data dir.
pub(crate) fn default_output_dir() -> PathBuf {
    if let Some(videos) = UserDirs::new().and_then(|dirs| dirs.video_dir().map(|d| d.join("recast")))
    {
        return videos;
    }

    ProjectDirs::from("com", "recast", "Recast")
        .map(|dirs| dirs.data_dir().join("recordings"))
        .unwrap_or_else(|| PathBuf::from("recordings"))
}
