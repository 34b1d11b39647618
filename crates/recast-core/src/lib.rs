//! Recast Core Library
//!
//! Screen and microphone capture kept in sync with wall-clock time: a paced
//! video loop that duplicates frames to catch up after stalls, an audio
//! writer loop fed by a lock-free sample queue, and a coordinator that
//! drives both through setup, countdown, pause and stop. Single still
//! images go through [`capture_screenshot`].
//!
//! # Example
//!
//! ```no_run
//! use recast_core::{
//!     CaptureTarget, CoreResult, RecordingCoordinator, RecordingEvent, RecorderState,
//!     SessionRequest, SystemBackend, VideoRequest,
//! };
//!
//! use std::{path::PathBuf, sync::Arc, thread::sleep, time::Duration};
//!
//! fn main() -> CoreResult<()> {
//!     let mut coordinator = RecordingCoordinator::new(Arc::new(SystemBackend::new()));
//!     let events = coordinator.events();
//!
//!     coordinator.start(SessionRequest {
//!         video: Some(VideoRequest {
//!             target: CaptureTarget::AllScreens,
//!             fps: 30.0,
//!             cursor: true,
//!             webcam: false,
//!             catch_up_limit: None,
//!             output: PathBuf::from("capture.mp4"),
//!         }),
//!         audio: None,
//!     })?;
//!
//!     while coordinator.state() == RecorderState::Initializing {
//!         coordinator.pump(Duration::from_millis(100));
//!     }
//!     coordinator.begin_capture()?;
//!     sleep(Duration::from_secs(5));
//!     coordinator.stop()?;
//!
//!     while coordinator.state() != RecorderState::Finished {
//!         coordinator.pump(Duration::from_millis(100));
//!     }
//!     for event in events.try_iter() {
//!         if let RecordingEvent::Finished(output) = event {
//!             println!("Wrote {:?}", output.files);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod audio;
mod backend;
mod coordinator;
mod error;
mod screenshot;
mod session;
mod video;

pub use {
    audio::{
        AudioCaptureLoop, AudioLoopConfig, AudioSummary, SampleBlock, SampleConsumer,
        SampleProducer, sample_queue,
    },
    backend::{
        AudioInput, AudioSink, CaptureBackend, CursorProbe, FfmpegVideoSink, InputFormat,
        ScreenSource, SystemBackend, VideoSink, WavFileSink, WebcamSource,
    },
    coordinator::{RecorderState, RecordingCoordinator, RecordingEvent, RecordingOutput},
    error::{CaptureError, Result as CoreResult},
    screenshot::capture_screenshot,
    session::{
        AudioRequest, CaptureRegion, CaptureSession, CaptureTarget, DEFAULT_FPS, SessionRequest,
        VideoRequest, resolve_frame_rate,
    },
    video::{FrameBuffer, FramePacer, VideoCaptureLoop, VideoEvent, VideoLoopConfig, overlay},
};
