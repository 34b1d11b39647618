//! Platform seam for the capture loops.
//!
//! Every resource is opened through [`CaptureBackend`] on the thread that
//! will use it, so none of the returned trait objects need to be `Send`.
//! Screen grabbers, input-simulation handles and camera streams are
//! thread-affine on several platforms.

mod cursor;
mod ffmpeg;
mod microphone;
#[cfg(feature = "screen")]
mod screen;
mod system;
#[cfg(feature = "webcam")]
mod webcam;
mod wav;

pub use {ffmpeg::FfmpegVideoSink, system::SystemBackend, wav::WavFileSink};

pub(crate) use cursor::EnigoCursor;
#[cfg(test)]
pub(crate) use microphone::to_f32_samples;
pub(crate) use microphone::CpalMicrophone;
#[cfg(feature = "screen")]
pub(crate) use screen::XcapScreen;
#[cfg(feature = "webcam")]
pub(crate) use webcam::NokhwaWebcam;

use crate::{
    CoreResult,
    audio::SampleProducer,
    session::{CaptureRegion, CaptureTarget},
};

use std::path::Path;

use image::{RgbImage, RgbaImage};

/// Sample format reported by a started audio input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    /// Device sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

/// Screen grab primitive.
pub trait ScreenSource {
    /// Resolve a capture target to a concrete desktop rectangle.
    fn resolve(&mut self, target: &CaptureTarget) -> CoreResult<CaptureRegion>;

    /// Grab the pixels of `region`.
    fn capture(&mut self, region: &CaptureRegion) -> CoreResult<RgbaImage>;
}

/// Cursor position probe.
pub trait CursorProbe {
    /// Cursor position in desktop coordinates.
    fn position(&mut self) -> CoreResult<(i32, i32)>;
}

/// Best-effort webcam.
pub trait WebcamSource {
    /// Most recent frame, without blocking. `None` when no frame is ready.
    fn latest_frame(&mut self) -> Option<RgbaImage>;
}

/// Append-only video output.
pub trait VideoSink {
    /// Append one RGB frame at the sink's fixed dimensions.
    fn write_frame(&mut self, frame: &RgbImage) -> CoreResult<()>;

    /// Flush and close the output.
    fn finish(self: Box<Self>) -> CoreResult<()>;
}

/// Microphone input. Capture stops when the value is dropped.
pub trait AudioInput {
    /// Start delivering sample blocks to `producer` from the driver context.
    fn start(&mut self, producer: SampleProducer) -> CoreResult<InputFormat>;
}

/// Append-only audio output.
pub trait AudioSink {
    /// Append interleaved samples in the sink's channel layout.
    fn write_samples(&mut self, samples: &[f32]) -> CoreResult<()>;

    /// Flush and close the output. Returns the number of frames written.
    fn finalize(self: Box<Self>) -> CoreResult<u64>;
}

/// Opens the platform resources used by a recording session.
pub trait CaptureBackend: Send + Sync {
    /// Open the screen grabber.
    fn open_screen(&self) -> CoreResult<Box<dyn ScreenSource>>;

    /// Open the cursor position probe.
    fn open_cursor(&self) -> CoreResult<Box<dyn CursorProbe>>;

    /// Open the default camera.
    fn open_webcam(&self) -> CoreResult<Box<dyn WebcamSource>>;

    /// Open a video sink with fixed dimensions and frame rate.
    fn open_video_sink(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> CoreResult<Box<dyn VideoSink>>;

    /// Open the default microphone.
    fn open_microphone(&self) -> CoreResult<Box<dyn AudioInput>>;

    /// Open an audio sink.
    fn open_audio_sink(
        &self,
        path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> CoreResult<Box<dyn AudioSink>>;

    /// Refresh rate of the primary display, if known.
    fn display_refresh_rate(&self) -> Option<f64> {
        None
    }
}
