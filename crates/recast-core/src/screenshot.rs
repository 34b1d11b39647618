//! Single still image of a capture target.

use crate::{CaptureError, CaptureTarget, CoreResult, backend::CaptureBackend};

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    panic::Location,
    path::Path,
};

use error_location::ErrorLocation;
use image::ImageFormat;
use tracing::{info, instrument, warn};

/// Grab `target` once and write it to `path` as PNG.
///
/// The file is created exclusively; an existing file is never overwritten.
/// Returns the saved image dimensions.
#[track_caller]
#[instrument(skip(backend))]
pub fn capture_screenshot(
    backend: &dyn CaptureBackend,
    target: &CaptureTarget,
    path: &Path,
) -> CoreResult<(u32, u32)> {
    let mut screen = backend.open_screen()?;
    let region = screen.resolve(target)?;
    if region.width == 0 || region.height == 0 {
        return Err(CaptureError::InvalidRegion {
            width: region.width,
            height: region.height,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let image = screen.capture(&region)?;

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| CaptureError::SinkOpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let mut writer = BufWriter::new(file);
    let written = image
        .write_to(&mut writer, ImageFormat::Png)
        .map_err(|e| e.to_string())
        .and_then(|()| writer.flush().map_err(|e| e.to_string()));

    if let Err(reason) = written {
        drop(writer);
        if let Err(e) = fs::remove_file(path) {
            warn!(error = ?e, path = ?path, "Failed to remove partial screenshot");
        }
        return Err(CaptureError::SinkWriteFailed {
            reason: format!("Failed to encode screenshot: {}", reason),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    info!(path = ?path, width = image.width(), height = image.height(), "Screenshot saved");

    Ok(image.dimensions())
}
