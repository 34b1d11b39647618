//! Screen capture loop.
//!
//! Runs on its own thread. Setup (screen, sink, optional overlays) happens
//! as soon as the loop is spawned so the caller can run a countdown while
//! the expensive parts are already open; frames are only written once
//! [`VideoCaptureLoop::begin_capture`] is called.

use crate::{
    CaptureError, CoreResult,
    backend::{CaptureBackend, CursorProbe, ScreenSource, VideoSink, WebcamSource},
    session::{CaptureRegion, CaptureTarget},
    video::{
        FramePacer,
        overlay::{composite_webcam, draw_cursor},
    },
};

use std::{
    panic::{self, AssertUnwindSafe, Location},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use error_location::ErrorLocation;
use image::{
    DynamicImage, RgbImage, RgbaImage,
    imageops::{self, FilterType},
};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

/// Poll interval while waiting for the begin flag.
const BEGIN_POLL: Duration = Duration::from_millis(5);
/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(10);
/// Longest sleep when ahead of schedule.
const AHEAD_SLEEP_MAX: Duration = Duration::from_millis(5);

/// What the video loop records and where.
#[derive(Debug, Clone)]
pub struct VideoLoopConfig {
    /// Session the loop belongs to. Stamped on every event.
    pub session_id: Uuid,
    /// MP4 output path.
    pub output: PathBuf,
    /// Area to record.
    pub target: CaptureTarget,
    /// Target frame rate.
    pub fps: f64,
    /// Draw a ring at the cursor position.
    pub cursor: bool,
    /// Composite the webcam into the bottom-right corner.
    pub webcam: bool,
    /// Maximum copies written for a single stall. `None` is uncapped.
    pub catch_up_limit: Option<u32>,
}

/// Lifecycle notifications from the video loop.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoEvent {
    /// Sink and overlays are open; the loop now waits for the begin flag.
    SetupReady {
        /// Emitting session.
        session_id: Uuid,
        /// Frame width after rounding to even.
        width: u32,
        /// Frame height after rounding to even.
        height: u32,
    },
    /// Setup or capture failed. Always followed by `Finished`.
    Error {
        /// Emitting session.
        session_id: Uuid,
        /// Rendered error.
        message: String,
    },
    /// The loop exited and released every resource.
    Finished {
        /// Emitting session.
        session_id: Uuid,
        /// Frames appended to the sink.
        frames_written: u64,
        /// Whether the output file was created.
        sink_opened: bool,
    },
}

impl VideoEvent {
    /// Session that emitted the event.
    pub fn session_id(&self) -> Uuid {
        match self {
            VideoEvent::SetupReady { session_id, .. }
            | VideoEvent::Error { session_id, .. }
            | VideoEvent::Finished { session_id, .. } => *session_id,
        }
    }
}

/// One grabbed and composited frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    image: RgbaImage,
    captured_at: Instant,
}

impl FrameBuffer {
    /// Wrap a grabbed image.
    pub fn new(image: RgbaImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    /// Composited RGBA pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// When the grab returned.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Drop the alpha channel for the sink.
    pub fn into_rgb(self) -> RgbImage {
        DynamicImage::ImageRgba8(self.image).into_rgb8()
    }
}

#[derive(Debug, Default)]
struct VideoControl {
    running: AtomicBool,
    paused: AtomicBool,
    begin: AtomicBool,
    frames_written: AtomicU64,
}

/// Handle to a running video loop.
///
/// All control methods are non-blocking. Completion is reported through
/// [`VideoEvent::Finished`].
pub struct VideoCaptureLoop {
    session_id: Uuid,
    output: PathBuf,
    control: Arc<VideoControl>,
    handle: Option<JoinHandle<()>>,
}

impl VideoCaptureLoop {
    /// Spawn the loop thread. Setup starts immediately.
    #[track_caller]
    #[instrument(skip(backend, events), fields(session_id = %config.session_id))]
    pub fn spawn(
        backend: Arc<dyn CaptureBackend>,
        config: VideoLoopConfig,
        events: Sender<VideoEvent>,
    ) -> CoreResult<Self> {
        let control = Arc::new(VideoControl::default());
        control.running.store(true, Ordering::Release);

        let session_id = config.session_id;
        let output = config.output.clone();
        let thread_control = Arc::clone(&control);

        let handle = std::thread::Builder::new()
            .name("video-capture".to_string())
            .spawn(move || run(backend.as_ref(), &config, &thread_control, &events))
            .map_err(|e| CaptureError::ThreadSpawnFailed {
                name: "video-capture",
                source: e,
                location: ErrorLocation::from(Location::caller()),
            })?;

        Ok(Self {
            session_id,
            output,
            control,
            handle: Some(handle),
        })
    }

    /// Session the loop belongs to.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// MP4 output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Release the loop from its post-setup wait.
    pub fn begin_capture(&self) {
        self.control.begin.store(true, Ordering::Release);
    }

    /// Freeze or resume pacing.
    pub fn set_paused(&self, paused: bool) {
        self.control.paused.store(paused, Ordering::Release);
    }

    /// True while pacing is frozen.
    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::Acquire)
    }

    /// Ask the loop to exit. Returns immediately.
    pub fn request_stop(&self) {
        self.control.running.store(false, Ordering::Release);
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.control.frames_written.load(Ordering::Acquire)
    }

    /// True once the loop thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Reap the thread. Call after `Finished` was received; blocks otherwise.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                // Panics are caught inside the thread; this only fires if the
                // event send itself unwound.
                error!(session_id = %self.session_id, "Video thread exited abnormally");
            }
        }
    }
}

impl Drop for VideoCaptureLoop {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn run(
    backend: &dyn CaptureBackend,
    config: &VideoLoopConfig,
    control: &VideoControl,
    events: &Sender<VideoEvent>,
) {
    let session_id = config.session_id;
    let mut sink_opened = false;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        record(backend, config, control, events, &mut sink_opened)
    }))
    .unwrap_or_else(|payload| Err(CaptureError::from_panic("video", payload)));

    if let Err(e) = outcome {
        error!(session_id = %session_id, error = ?e, "Video loop failed");
        let _ = events.send(VideoEvent::Error {
            session_id,
            message: e.to_string(),
        });
    }

    let frames_written = control.frames_written.load(Ordering::Acquire);
    info!(session_id = %session_id, frames_written, sink_opened, "Video loop finished");

    let _ = events.send(VideoEvent::Finished {
        session_id,
        frames_written,
        sink_opened,
    });
}

fn record(
    backend: &dyn CaptureBackend,
    config: &VideoLoopConfig,
    control: &VideoControl,
    events: &Sender<VideoEvent>,
    sink_opened: &mut bool,
) -> CoreResult<()> {
    if !config.fps.is_finite() || config.fps <= 0.0 {
        return Err(CaptureError::InvalidFrameRate {
            fps: config.fps,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let mut screen = backend.open_screen()?;
    let region = screen.resolve(&config.target)?.to_even()?;

    let sink = backend.open_video_sink(&config.output, region.width, region.height, config.fps)?;
    *sink_opened = true;

    let mut frames = FrameSource {
        screen,
        region,
        cursor: config.cursor.then(|| open_cursor(backend)).flatten(),
        webcam: config.webcam.then(|| open_webcam(backend)).flatten(),
    };
    let mut writer = FrameWriter { sink, control };

    info!(
        width = region.width,
        height = region.height,
        fps = config.fps,
        cursor = frames.cursor.is_some(),
        webcam = frames.webcam.is_some(),
        "Video setup ready"
    );
    let _ = events.send(VideoEvent::SetupReady {
        session_id: config.session_id,
        width: region.width,
        height: region.height,
    });

    // Panics are caught here as well as at the thread boundary so the sink
    // below is still finished.
    let outcome = if wait_for_begin(control) {
        panic::catch_unwind(AssertUnwindSafe(|| {
            capture_frames(&mut frames, &mut writer, config)
        }))
        .unwrap_or_else(|payload| Err(CaptureError::from_panic("video", payload)))
    } else {
        info!("Stopped before capture began");
        Ok(())
    };

    // Release the camera before closing the file.
    drop(frames);
    let finished = writer.sink.finish();

    match (outcome, finished) {
        (Ok(()), finished) => finished,
        (Err(e), finished) => {
            if let Err(finish_error) = finished {
                warn!(error = ?finish_error, "Failed to finish video after capture error");
            }
            Err(e)
        }
    }
}

fn open_cursor(backend: &dyn CaptureBackend) -> Option<Box<dyn CursorProbe>> {
    backend
        .open_cursor()
        .inspect_err(|e| warn!(error = ?e, "Cursor overlay disabled"))
        .ok()
}

fn open_webcam(backend: &dyn CaptureBackend) -> Option<Box<dyn WebcamSource>> {
    backend
        .open_webcam()
        .inspect_err(|e| warn!(error = ?e, "Webcam overlay disabled"))
        .ok()
}

/// Returns `false` if a stop arrived first.
fn wait_for_begin(control: &VideoControl) -> bool {
    loop {
        if !control.running.load(Ordering::Acquire) {
            return false;
        }
        if control.begin.load(Ordering::Acquire) {
            return true;
        }
        std::thread::sleep(BEGIN_POLL);
    }
}

fn capture_frames(
    frames: &mut FrameSource,
    writer: &mut FrameWriter<'_>,
    config: &VideoLoopConfig,
) -> CoreResult<()> {
    let mut pacer = FramePacer::new(config.fps, Instant::now());
    let limit = config.catch_up_limit.map(|l| u64::from(l.max(1)));
    debug!(fps = config.fps, catch_up_limit = ?limit, "Capture started");

    while writer.control.running.load(Ordering::Acquire) {
        let now = Instant::now();

        if writer.control.paused.load(Ordering::Acquire) {
            pacer.pause(now);
            std::thread::sleep(PAUSE_POLL);
            continue;
        }
        if pacer.is_paused() {
            let span = pacer.resume(now);
            debug!(paused_ms = span.as_millis() as u64, "Capture resumed");
        }

        let due = pacer.frames_due(now);
        if due == 0 {
            std::thread::sleep(pacer.until_next_frame(now).min(AHEAD_SLEEP_MAX));
            continue;
        }

        let buffer = frames.grab()?;
        trace!(
            grab_ms = buffer.captured_at().saturating_duration_since(now).as_millis() as u64,
            "Frame grabbed"
        );
        let frame = buffer.into_rgb();

        let copies = match limit {
            Some(limit) if due > limit => {
                let skipped = due - limit;
                warn!(due, written = limit, skipped, "Capture stalled; skipping frames");
                pacer.skip(skipped);
                limit
            }
            _ => due,
        };
        if copies > 1 {
            trace!(copies, "Duplicating frame to catch up");
        }

        for _ in 0..copies {
            writer.write(&frame)?;
            pacer.record_written(1);
        }
    }

    debug!(
        frames_written = pacer.frames_written(),
        frames_skipped = pacer.frames_skipped(),
        "Capture ended"
    );

    Ok(())
}

struct FrameSource {
    screen: Box<dyn ScreenSource>,
    region: CaptureRegion,
    cursor: Option<Box<dyn CursorProbe>>,
    webcam: Option<Box<dyn WebcamSource>>,
}

impl FrameSource {
    fn grab(&mut self) -> CoreResult<FrameBuffer> {
        let mut image = self.screen.capture(&self.region)?;
        let captured_at = Instant::now();

        if image.dimensions() != (self.region.width, self.region.height) {
            trace!(
                got_width = image.width(),
                got_height = image.height(),
                "Resizing grabbed frame"
            );
            image = imageops::resize(
                &image,
                self.region.width,
                self.region.height,
                FilterType::Triangle,
            );
        }

        if let Some(cursor) = self.cursor.as_mut() {
            match cursor.position() {
                Ok((x, y)) => {
                    if let Some((rel_x, rel_y)) = self.region.relative(x, y) {
                        draw_cursor(&mut image, rel_x, rel_y);
                    }
                }
                Err(e) => trace!(error = ?e, "Cursor probe failed"),
            }
        }

        if let Some(webcam) = self.webcam.as_mut() {
            if let Some(camera) = webcam.latest_frame() {
                composite_webcam(&mut image, &camera);
            }
        }

        Ok(FrameBuffer::new(image, captured_at))
    }
}

struct FrameWriter<'a> {
    sink: Box<dyn VideoSink>,
    control: &'a VideoControl,
}

impl FrameWriter<'_> {
    fn write(&mut self, frame: &RgbImage) -> CoreResult<()> {
        self.sink.write_frame(frame)?;
        self.control.frames_written.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
