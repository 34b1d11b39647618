//! Session inputs: what to capture, at what rate, and where to write it.
//!
//! Everything here is treated as an opaque input by the core. Output paths,
//! timestamps and the configured frame rate are produced by the caller.

use crate::{CaptureError, CoreResult};

use std::{panic::Location, path::PathBuf, time::Instant};

use error_location::ErrorLocation;
use uuid::Uuid;

/// Frame rate used when neither the caller nor the display provides one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Pixel rectangle in virtual desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CaptureRegion {
    /// Create a region from its origin and size.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Round width and height down to even values.
    ///
    /// Most video codecs reject odd frame dimensions (4:2:0 chroma
    /// subsampling). Fails if either dimension ends up zero.
    #[track_caller]
    pub fn to_even(self) -> CoreResult<Self> {
        let width = self.width & !1;
        let height = self.height & !1;

        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidRegion {
                width: self.width,
                height: self.height,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Self {
            width,
            height,
            ..self
        })
    }

    /// Translate a desktop point into region-relative coordinates.
    ///
    /// Returns `None` when the point falls outside the region.
    pub fn relative(&self, x: i32, y: i32) -> Option<(u32, u32)> {
        let rel_x = i64::from(x) - i64::from(self.x);
        let rel_y = i64::from(y) - i64::from(self.y);

        if rel_x < 0 || rel_y < 0 || rel_x >= i64::from(self.width) || rel_y >= i64::from(self.height)
        {
            return None;
        }

        Some((rel_x as u32, rel_y as u32))
    }

    /// Smallest region covering both `self` and `other`.
    pub fn union(&self, other: &CaptureRegion) -> CaptureRegion {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        CaptureRegion {
            x: left,
            y: top,
            width: (right - i64::from(left)) as u32,
            height: (bottom - i64::from(top)) as u32,
        }
    }

    /// Overlapping part of two regions, if any.
    pub fn intersect(&self, other: &CaptureRegion) -> Option<CaptureRegion> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= i64::from(left) || bottom <= i64::from(top) {
            return None;
        }

        Some(CaptureRegion {
            x: left,
            y: top,
            width: (right - i64::from(left)) as u32,
            height: (bottom - i64::from(top)) as u32,
        })
    }

    fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
}

/// What the video loop records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// A fixed rectangle of the desktop.
    Region(CaptureRegion),
    /// One monitor by enumeration index. Out-of-range indices fall back to
    /// the first monitor.
    Monitor(usize),
    /// The bounding box of every monitor.
    AllScreens,
}

/// Pick the recording frame rate.
///
/// Prefers the configured rate, then the display refresh rate, then
/// [`DEFAULT_FPS`]. Non-positive or non-finite candidates are skipped.
pub fn resolve_frame_rate(configured: Option<f64>, detected: Option<f64>) -> f64 {
    configured
        .into_iter()
        .chain(detected)
        .find(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(DEFAULT_FPS)
}

/// Video half of a session request.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// Area to record.
    pub target: CaptureTarget,
    /// Target frame rate.
    pub fps: f64,
    /// Draw a marker at the cursor position.
    pub cursor: bool,
    /// Composite the default webcam into the bottom-right corner.
    pub webcam: bool,
    /// Maximum duplicate frames written for a single stall. `None` is uncapped.
    pub catch_up_limit: Option<u32>,
    /// Output file for the video sink.
    pub output: PathBuf,
}

/// Audio half of a session request.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    /// Output file for the WAV sink.
    pub output: PathBuf,
    /// Sink sample rate in Hz.
    pub sample_rate: u32,
    /// Sink channel count.
    pub channels: u16,
}

/// Everything needed to start one recording.
///
/// At least one of `video` and `audio` must be present.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Screen recording, if enabled.
    pub video: Option<VideoRequest>,
    /// Microphone recording, if enabled.
    pub audio: Option<AudioRequest>,
}

/// One recording attempt, from start request until both sinks are closed.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: Uuid,
    request: SessionRequest,
    capture_started_at: Option<Instant>,
}

impl CaptureSession {
    pub(crate) fn new(request: SessionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            capture_started_at: None,
        }
    }

    /// Unique id used to correlate logs and loop events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The request this session was started with.
    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    /// When capture truly began (after the countdown), if it has.
    pub fn capture_started_at(&self) -> Option<Instant> {
        self.capture_started_at
    }

    pub(crate) fn mark_capture_started(&mut self, at: Instant) {
        self.capture_started_at = Some(at);
    }
}
