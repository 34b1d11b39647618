use crate::{audio::AudioSummary, coordinator::RecorderState};

use std::path::PathBuf;

use uuid::Uuid;

/// What a finished session left on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutput {
    /// Session that produced the files.
    pub session_id: Uuid,
    /// Video path if its sink was opened, then audio path if the audio loop started.
    pub files: Vec<PathBuf>,
    /// Frames appended to the video sink.
    pub frames_written: u64,
    /// Audio loop counters, when audio was recorded.
    pub audio: Option<AudioSummary>,
    /// Session ended through `cancel` rather than `stop`.
    pub cancelled: bool,
}

/// Notifications from the coordinator to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    /// The coordinator moved to a new state.
    StateChanged(RecorderState),
    /// Something failed. The session may continue (audio) or be stopping (video).
    Error {
        /// Rendered error.
        message: String,
    },
    /// Both sinks are closed.
    Finished(RecordingOutput),
}
