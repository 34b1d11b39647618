//! Scripted in-memory backend for loop and coordinator tests.
//!
//! Screen grabs are solid images produced after a configurable delay, the
//! video sink records what it was given, the microphone is either driven by
//! the test or by a real-time feeder thread, and audio goes to a real WAV
//! file so it can be read back with `hound`.

use crate::{
    AudioInput, AudioSink, CaptureBackend, CaptureError, CaptureRegion, CaptureTarget,
    CoreResult, CursorProbe, InputFormat, SampleBlock, SampleProducer, ScreenSource, VideoSink,
    WavFileSink, WebcamSource,
};

use std::{
    panic::Location,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use error_location::ErrorLocation;
use image::{Rgb, RgbImage, Rgba, RgbaImage};

pub const SCREEN_FILL: Rgba<u8> = Rgba([40, 40, 40, 255]);
pub const WEBCAM_FILL: Rgba<u8> = Rgba([0, 200, 0, 255]);

/// What the fake video sink saw.
#[derive(Debug, Default)]
pub struct VideoLog {
    pub opened: Option<(PathBuf, u32, u32, f64)>,
    pub frames: u64,
    pub last_frame: Option<RgbImage>,
    pub finished: bool,
}

/// How the fake microphone produces samples.
#[derive(Debug, Clone, Copy)]
pub enum MicMode {
    /// `open_microphone` fails with `NoMicrophoneFound`.
    Missing,
    /// The test pushes blocks through [`FakeBackend::mic_producer`].
    Manual { sample_rate: u32, channels: u16 },
    /// A thread pushes a sine wave in real time, one block every 10 ms.
    Realtime { sample_rate: u32, channels: u16 },
}

#[derive(Debug, Default)]
struct Shared {
    video: Mutex<VideoLog>,
    captures: Mutex<u64>,
    mic_producer: Mutex<Option<SampleProducer>>,
}

pub struct FakeBackend {
    pub desktop: (u32, u32),
    pub capture_delay: Duration,
    pub grab_size: Option<(u32, u32)>,
    pub panic_on_capture: Option<u64>,
    pub fail_sink_open: bool,
    pub fail_write_after: Option<u64>,
    pub cursor: Option<(i32, i32)>,
    pub webcam_available: bool,
    pub mic: MicMode,
    pub mic_open_delay: Duration,
    pub refresh_rate: Option<f64>,
    shared: Arc<Shared>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            desktop: (640, 480),
            capture_delay: Duration::ZERO,
            grab_size: None,
            panic_on_capture: None,
            fail_sink_open: false,
            fail_write_after: None,
            cursor: None,
            webcam_available: false,
            mic: MicMode::Missing,
            mic_open_delay: Duration::ZERO,
            refresh_rate: None,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_mic(mut self, mic: MicMode) -> Self {
        self.mic = mic;
        self
    }

    /// Make `open_microphone` block for `delay`, like a slow driver.
    pub fn with_mic_open_delay(mut self, delay: Duration) -> Self {
        self.mic_open_delay = delay;
        self
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn with_cursor(mut self, x: i32, y: i32) -> Self {
        self.cursor = Some((x, y));
        self
    }

    pub fn with_webcam(mut self, available: bool) -> Self {
        self.webcam_available = available;
        self
    }

    pub fn video_frames(&self) -> u64 {
        self.shared.video.lock().unwrap_or_else(|e| e.into_inner()).frames
    }

    pub fn video_finished(&self) -> bool {
        self.shared.video.lock().unwrap_or_else(|e| e.into_inner()).finished
    }

    pub fn video_opened(&self) -> Option<(PathBuf, u32, u32, f64)> {
        self.shared
            .video
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .opened
            .clone()
    }

    pub fn last_frame(&self) -> Option<RgbImage> {
        self.shared
            .video
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_frame
            .clone()
    }

    pub fn captures(&self) -> u64 {
        *self.shared.captures.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Producer handed to the microphone by the audio loop (manual mode).
    pub fn mic_producer(&self) -> Option<SampleProducer> {
        self.shared
            .mic_producer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CaptureBackend for FakeBackend {
    fn open_screen(&self) -> CoreResult<Box<dyn ScreenSource>> {
        Ok(Box::new(FakeScreen {
            desktop: self.desktop,
            delay: self.capture_delay,
            grab_size: self.grab_size,
            panic_on_capture: self.panic_on_capture,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_cursor(&self) -> CoreResult<Box<dyn CursorProbe>> {
        match self.cursor {
            Some(position) => Ok(Box::new(FakeCursor { position })),
            None => Err(device_error("no cursor")),
        }
    }

    fn open_webcam(&self) -> CoreResult<Box<dyn WebcamSource>> {
        if self.webcam_available {
            Ok(Box::new(FakeWebcam))
        } else {
            Err(CaptureError::WebcamUnavailable {
                reason: "no camera attached".to_string(),
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
        if self.fail_sink_open {
            return Err(CaptureError::SinkOpenFailed {
                path: path.to_path_buf(),
                reason: "scripted failure".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.shared.video.lock().unwrap_or_else(|e| e.into_inner()).opened =
            Some((path.to_path_buf(), width, height, fps));

        Ok(Box::new(FakeVideoSink {
            width,
            height,
            fail_after: self.fail_write_after,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_microphone(&self) -> CoreResult<Box<dyn AudioInput>> {
        if !self.mic_open_delay.is_zero() {
            std::thread::sleep(self.mic_open_delay);
        }
        match self.mic {
            MicMode::Missing => Err(CaptureError::NoMicrophoneFound {
                location: ErrorLocation::from(Location::caller()),
            }),
            MicMode::Manual {
                sample_rate,
                channels,
            } => Ok(Box::new(ManualMic {
                format: InputFormat {
                    sample_rate,
                    channels,
                },
                shared: Arc::clone(&self.shared),
            })),
            MicMode::Realtime {
                sample_rate,
                channels,
            } => Ok(Box::new(RealtimeMic {
                format: InputFormat {
                    sample_rate,
                    channels,
                },
                shutdown: Arc::new(AtomicBool::new(false)),
                feeder: None,
            })),
        }
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
        self.refresh_rate
    }
}

#[track_caller]
fn device_error(reason: &str) -> CaptureError {
    CaptureError::DeviceError {
        reason: reason.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

struct FakeScreen {
    desktop: (u32, u32),
    delay: Duration,
    grab_size: Option<(u32, u32)>,
    panic_on_capture: Option<u64>,
    shared: Arc<Shared>,
}

impl ScreenSource for FakeScreen {
    fn resolve(&mut self, target: &CaptureTarget) -> CoreResult<CaptureRegion> {
        Ok(match target {
            CaptureTarget::Region(region) => *region,
            CaptureTarget::Monitor(_) | CaptureTarget::AllScreens => {
                CaptureRegion::new(0, 0, self.desktop.0, self.desktop.1)
            }
        })
    }

    fn capture(&mut self, region: &CaptureRegion) -> CoreResult<RgbaImage> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let count = {
            let mut captures = self.shared.captures.lock().unwrap_or_else(|e| e.into_inner());
            *captures += 1;
            *captures
        };
        if self.panic_on_capture == Some(count) {
            panic!("scripted capture panic");
        }

        let (width, height) = self.grab_size.unwrap_or((region.width, region.height));
        Ok(RgbaImage::from_pixel(width, height, SCREEN_FILL))
    }
}

struct FakeCursor {
    position: (i32, i32),
}

impl CursorProbe for FakeCursor {
    fn position(&mut self) -> CoreResult<(i32, i32)> {
        Ok(self.position)
    }
}

struct FakeWebcam;

impl WebcamSource for FakeWebcam {
    fn latest_frame(&mut self) -> Option<RgbaImage> {
        Some(RgbaImage::from_pixel(160, 120, WEBCAM_FILL))
    }
}

struct FakeVideoSink {
    width: u32,
    height: u32,
    fail_after: Option<u64>,
    shared: Arc<Shared>,
}

impl VideoSink for FakeVideoSink {
    fn write_frame(&mut self, frame: &RgbImage) -> CoreResult<()> {
        let mut log = self.shared.video.lock().unwrap_or_else(|e| e.into_inner());

        if frame.dimensions() != (self.width, self.height) {
            return Err(CaptureError::SinkWriteFailed {
                reason: format!("frame is {:?}", frame.dimensions()),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        if self.fail_after == Some(log.frames) {
            return Err(CaptureError::SinkWriteFailed {
                reason: "scripted write failure".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        log.frames += 1;
        log.last_frame = Some(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> CoreResult<()> {
        self.shared.video.lock().unwrap_or_else(|e| e.into_inner()).finished = true;
        Ok(())
    }
}

struct ManualMic {
    format: InputFormat,
    shared: Arc<Shared>,
}

impl AudioInput for ManualMic {
    fn start(&mut self, producer: SampleProducer) -> CoreResult<InputFormat> {
        *self.shared.mic_producer.lock().unwrap_or_else(|e| e.into_inner()) = Some(producer);
        Ok(self.format)
    }
}

impl Drop for ManualMic {
    fn drop(&mut self) {
        // Like a real driver: once capture stops, nothing more arrives.
        *self.shared.mic_producer.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

struct RealtimeMic {
    format: InputFormat,
    shutdown: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl AudioInput for RealtimeMic {
    fn start(&mut self, producer: SampleProducer) -> CoreResult<InputFormat> {
        let format = self.format;
        let shutdown = Arc::clone(&self.shutdown);

        self.feeder = Some(std::thread::spawn(move || {
            let started = Instant::now();
            let mut pushed: u64 = 0;
            let channels = usize::from(format.channels);

            while !shutdown.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(10));
                let due = (started.elapsed().as_secs_f64() * f64::from(format.sample_rate)) as u64;
                let frames = due.saturating_sub(pushed);

                let samples: Vec<f32> = (pushed..pushed + frames)
                    .flat_map(|n| {
                        let t = n as f64 / f64::from(format.sample_rate);
                        let value = (0.25 * (t * 440.0 * std::f64::consts::TAU).sin()) as f32;
                        std::iter::repeat_n(value, channels)
                    })
                    .collect();

                pushed += frames;
                producer.push(SampleBlock::new(samples, format.channels, format.sample_rate));
            }
        }));

        Ok(format)
    }
}

impl Drop for RealtimeMic {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
    }
}

/// Poll `condition` every 5 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Pixel of an RGB frame.
pub fn pixel(frame: &RgbImage, x: u32, y: u32) -> Rgb<u8> {
    *frame.get_pixel(x, y)
}
