use std::{any::Any, panic::Location};

use error_location::ErrorLocation;
use thiserror::Error;

/// Capture pipeline errors with source location tracking.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No audio input device found.
    #[error("No microphone found {location}")]
    NoMicrophoneFound {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Capture region is empty once forced to even dimensions.
    #[error("Invalid capture region {width}x{height} {location}")]
    InvalidRegion {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Frame rate is not a positive finite number.
    #[error("Invalid frame rate: {fps} {location}")]
    InvalidFrameRate {
        /// The rejected frame rate.
        fps: f64,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A video or audio sink could not be opened.
    #[error("Failed to open sink {path:?}: {reason} {location}")]
    SinkOpenFailed {
        /// Output path of the sink.
        path: std::path::PathBuf,
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Writing to or finalizing a sink failed.
    #[error("Sink write failed: {reason} {location}")]
    SinkWriteFailed {
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Screen, cursor or audio device operation failed.
    #[error("Device error: {reason} {location}")]
    DeviceError {
        /// Description of the device error.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Webcam could not be opened or read.
    #[error("Webcam unavailable: {reason} {location}")]
    WebcamUnavailable {
        /// Description of the webcam error.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Audio resampling failed.
    #[error("Resampling error: {reason} {location}")]
    ResamplingError {
        /// Description of the resampling error.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Operation not valid in the coordinator's current state.
    #[error("Cannot {action} while {state} {location}")]
    InvalidTransition {
        /// Requested operation.
        action: &'static str,
        /// State the coordinator was in.
        state: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A session request enabled neither video nor audio.
    #[error("Nothing to record: video and audio are both disabled {location}")]
    NothingToRecord {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A capture thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source} {location}")]
    ThreadSpawnFailed {
        /// Thread name.
        name: &'static str,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A capture loop panicked; the panic was caught at the loop boundary.
    #[error("{name} loop panicked: {message} {location}")]
    LoopPanicked {
        /// Loop name.
        name: &'static str,
        /// Panic payload, when it was a string.
        message: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

impl CaptureError {
    /// Build a [`CaptureError::LoopPanicked`] from a caught panic payload.
    #[track_caller]
    pub(crate) fn from_panic(name: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        CaptureError::LoopPanicked {
            name,
            message,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

/// Result type alias using [`CaptureError`].
pub type Result<T> = std::result::Result<T, CaptureError>;
