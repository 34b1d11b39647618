use std::fmt;

/// Recording lifecycle.
///
/// `Idle → Initializing → AwaitingCountdown → Recording ⇄ Paused → Stopping → Finished`.
/// A new session may start from `Idle` or `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    /// No session has run yet.
    #[default]
    Idle,
    /// Video loop is opening the screen and sink.
    Initializing,
    /// Setup finished; waiting for the caller's countdown.
    AwaitingCountdown,
    /// Frames and samples are being written.
    Recording,
    /// Loops are running but discarding input.
    Paused,
    /// Stop requested; waiting for the video loop to finish.
    Stopping,
    /// Outputs closed and reported.
    Finished,
}

impl RecorderState {
    /// A new session may be started.
    pub fn can_start(self) -> bool {
        matches!(self, RecorderState::Idle | RecorderState::Finished)
    }

    /// A session is live and may be stopped or cancelled.
    pub fn can_stop(self) -> bool {
        matches!(
            self,
            RecorderState::Initializing
                | RecorderState::AwaitingCountdown
                | RecorderState::Recording
                | RecorderState::Paused
        )
    }

    /// Capture has begun and pause may be toggled.
    pub fn is_capturing(self) -> bool {
        matches!(self, RecorderState::Recording | RecorderState::Paused)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Initializing => "initializing",
            RecorderState::AwaitingCountdown => "awaiting countdown",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopping => "stopping",
            RecorderState::Finished => "finished",
        };
        f.write_str(name)
    }
}
