use recast_core::{RecordingEvent, VideoEvent};

use uuid::Uuid;

/// Commands delivered to the main application loop.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Start a recording, or stop the live one.
    StartStop,
    /// Pause or resume the live recording.
    TogglePause,
    /// Abandon the live recording.
    Cancel,
    /// Save a still image of the configured target.
    Screenshot,
    /// One countdown second elapsed.
    CountdownTick {
        /// Session the countdown belongs to.
        session_id: Uuid,
        /// Seconds left.
        remaining: u32,
    },
    /// The countdown for `session_id` reached zero.
    CountdownFinished {
        /// Session the countdown belongs to.
        session_id: Uuid,
    },
    /// Raw video loop event to feed back into the coordinator.
    Video(VideoEvent),
    /// Outward coordinator notification.
    Recording(RecordingEvent),
    /// Request application shutdown.
    Shutdown,
}
