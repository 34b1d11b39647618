use recast_core::RecorderState;

/// Tray icon states corresponding to the recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayIconState {
    /// Ready to start recording.
    Idle,
    /// Setting up capture or counting down to the first frame.
    Countdown {
        /// Seconds left, or 0 while the capture is still being set up.
        remaining: u32,
    },
    /// Frames and samples are being written.
    Recording,
    /// Recording is paused.
    Paused,
    /// Closing the output files.
    Saving,
}

impl TrayIconState {
    /// Tray state for a coordinator state.
    ///
    /// `AwaitingCountdown` maps to a zero countdown; the countdown task
    /// replaces it with the real seconds as it ticks.
    pub fn from_recorder(state: RecorderState) -> Self {
        match state {
            RecorderState::Idle | RecorderState::Finished => TrayIconState::Idle,
            RecorderState::Initializing | RecorderState::AwaitingCountdown => {
                TrayIconState::Countdown { remaining: 0 }
            }
            RecorderState::Recording => TrayIconState::Recording,
            RecorderState::Paused => TrayIconState::Paused,
            RecorderState::Stopping => TrayIconState::Saving,
        }
    }

    /// Tooltip shown on hover.
    pub fn tooltip(self) -> String {
        match self {
            TrayIconState::Idle => "Recast - Ready".to_string(),
            TrayIconState::Countdown { remaining: 0 } => "Recast - Preparing...".to_string(),
            TrayIconState::Countdown { remaining } => format!("Recast - Starting in {remaining}..."),
            TrayIconState::Recording => "Recast - Recording".to_string(),
            TrayIconState::Paused => "Recast - Paused".to_string(),
            TrayIconState::Saving => "Recast - Saving...".to_string(),
        }
    }
}
