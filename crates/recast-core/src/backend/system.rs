use crate::{
    CaptureError, CoreResult,
    backend::{
        AudioInput, AudioSink, CaptureBackend, CpalMicrophone, CursorProbe, EnigoCursor,
        FfmpegVideoSink, ScreenSource, VideoSink, WavFileSink, WebcamSource,
        ffmpeg::DEFAULT_VIDEO_CODEC,
    },
};

use std::{panic::Location, path::Path};

use error_location::ErrorLocation;

/// Real devices: xcap screen grab, enigo cursor, nokhwa webcam, ffmpeg video,
/// CPAL microphone and hound WAV output.
#[derive(Debug, Clone)]
pub struct SystemBackend {
    video_codec: String,
}

impl SystemBackend {
    /// Backend using the default video codec.
    pub fn new() -> Self {
        Self {
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
        }
    }

    /// Use `codec` (an ffmpeg encoder name) for the video sink.
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }
}

impl Default for SystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SystemBackend {
    #[track_caller]
    fn open_screen(&self) -> CoreResult<Box<dyn ScreenSource>> {
        #[cfg(feature = "screen")]
        {
            Ok(Box::new(crate::backend::XcapScreen::new()?))
        }
        #[cfg(not(feature = "screen"))]
        {
            Err(CaptureError::DeviceError {
                reason: "Screen capture support not compiled in".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
        }
    }

    fn open_cursor(&self) -> CoreResult<Box<dyn CursorProbe>> {
        Ok(Box::new(EnigoCursor::new()?))
    }

    #[track_caller]
    fn open_webcam(&self) -> CoreResult<Box<dyn WebcamSource>> {
        #[cfg(feature = "webcam")]
        {
            Ok(Box::new(crate::backend::NokhwaWebcam::open()?))
        }
        #[cfg(not(feature = "webcam"))]
        {
            Err(CaptureError::WebcamUnavailable {
                reason: "Webcam support not compiled in".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
        }
    }

    fn open_video_sink(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> CoreResult<Box<dyn VideoSink>> {
        Ok(Box::new(FfmpegVideoSink::open(
            path,
            width,
            height,
            fps,
            &self.video_codec,
        )?))
    }

    fn open_microphone(&self) -> CoreResult<Box<dyn AudioInput>> {
        Ok(Box::new(CpalMicrophone::new()?))
    }

    fn open_audio_sink(
        &self,
        path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> CoreResult<Box<dyn AudioSink>> {
        Ok(Box::new(WavFileSink::create(path, sample_rate, channels)?))
    }

    fn display_refresh_rate(&self) -> Option<f64> {
        #[cfg(feature = "screen")]
        {
            crate::backend::XcapScreen::primary_refresh_rate()
        }
        #[cfg(not(feature = "screen"))]
        {
            None
        }
    }
}
