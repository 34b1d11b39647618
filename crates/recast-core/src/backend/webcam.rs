//! Default camera through `nokhwa`.
//!
//! `Camera::frame` blocks until the device delivers, so a reader thread owns
//! the camera and publishes the latest decoded frame. The capture loop only
//! ever takes a copy of that slot.

use crate::{CaptureError, CoreResult, backend::WebcamSource};

use std::{
    panic::Location,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::bounded;
use error_location::ErrorLocation;
use image::{DynamicImage, RgbImage, RgbaImage};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
};
use tracing::{debug, info, instrument, warn};

const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

pub struct NokhwaWebcam {
    latest: Arc<Mutex<Option<RgbaImage>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl NokhwaWebcam {
    #[track_caller]
    #[instrument]
    pub fn open() -> CoreResult<Self> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        let slot = Arc::clone(&latest);
        let keep_reading = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("webcam-reader".to_string())
            .spawn(move || {
                let format =
                    RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

                let mut camera = match Camera::new(CameraIndex::Index(0), format) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                if let Err(e) = camera.open_stream() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }

                // Warm-up read: an opened device that cannot deliver is unusable.
                match read_frame(&mut camera) {
                    Ok(frame) => store(&slot, frame),
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        let _ = camera.stop_stream();
                        return;
                    }
                }

                let _ = ready_tx.send(Ok(()));

                while keep_reading.load(Ordering::Acquire) {
                    match read_frame(&mut camera) {
                        Ok(frame) => store(&slot, frame),
                        Err(e) => {
                            debug!(error = %e, "Webcam read failed");
                            std::thread::sleep(READ_RETRY_DELAY);
                        }
                    }
                }

                let _ = camera.stop_stream();
                debug!("Webcam reader stopped");
            })
            .map_err(|e| CaptureError::ThreadSpawnFailed {
                name: "webcam-reader",
                source: e,
                location: ErrorLocation::from(Location::caller()),
            })?;

        let mut webcam = Self {
            latest,
            running,
            handle: Some(handle),
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                info!("Webcam opened");
                Ok(webcam)
            }
            Ok(Err(reason)) => {
                webcam.shutdown();
                Err(CaptureError::WebcamUnavailable {
                    reason,
                    location: ErrorLocation::from(Location::caller()),
                })
            }
            Err(_) => {
                // Leave the reader to exit on its own; joining could hang on a stuck device.
                webcam.running.store(false, Ordering::Release);
                webcam.handle = None;
                Err(CaptureError::WebcamUnavailable {
                    reason: "Timed out opening camera".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        }
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Webcam reader thread panicked");
            }
        }
    }
}

impl WebcamSource for NokhwaWebcam {
    fn latest_frame(&mut self) -> Option<RgbaImage> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for NokhwaWebcam {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_frame(camera: &mut Camera) -> Result<RgbaImage, String> {
    let buffer = camera.frame().map_err(|e| e.to_string())?;
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| e.to_string())?;

    let (width, height) = (decoded.width(), decoded.height());
    let rgb = RgbImage::from_raw(width, height, decoded.into_raw())
        .ok_or_else(|| "Webcam frame buffer has unexpected size".to_string())?;

    Ok(DynamicImage::ImageRgb8(rgb).to_rgba8())
}

fn store(slot: &Mutex<Option<RgbaImage>>, frame: RgbaImage) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
}
