//! What happens to a recording once both files are closed.
//!
//! Cancelled recordings are deleted. Saved ones are announced with a
//! desktop notification and the video path is put on the clipboard.

use crate::{AppError, AppResult, config::BehaviourConfig};

use std::{
    fs, io,
    panic::Location,
    path::{Path, PathBuf},
};

use arboard::Clipboard;
use error_location::ErrorLocation;
use notify_rust::Notification;
use recast_core::RecordingOutput;
use tracing::{debug, info, instrument, warn};

const APP_NAME: &str = "Recast";

/// Output handler for clipboard, notification and folder operations.
pub struct OutputHandler {
    pub(crate) clipboard: Clipboard,
}

impl OutputHandler {
    /// Create a new output handler.
    #[track_caller]
    #[instrument]
    pub fn new() -> AppResult<Self> {
        let clipboard = Clipboard::new().map_err(|e| AppError::ClipboardError {
            reason: format!("Failed to initialize clipboard: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!("OutputHandler initialized");

        Ok(Self { clipboard })
    }

    /// Handle a finished recording according to `behavior`.
    ///
    /// Notification and clipboard failures are logged, not returned; the
    /// files are already safely on disk at that point.
    #[instrument(skip(self, output, behavior), fields(session_id = %output.session_id, cancelled = output.cancelled))]
    pub fn finish(
        &mut self,
        output: &RecordingOutput,
        behavior: &BehaviourConfig,
    ) -> AppResult<()> {
        if output.cancelled {
            if behavior.delete_on_cancel {
                let removed = discard_files(&output.files)?;
                info!(removed, "Cancelled recording discarded");
            } else {
                info!(files = ?output.files, "Cancelled recording kept");
            }
            return Ok(());
        }

        if output.files.is_empty() {
            warn!("Recording finished without writing any files");
            return Ok(());
        }

        info!(files = ?output.files, frames_written = output.frames_written, "Recording saved");

        if behavior.notify_on_finish {
            if let Err(e) = Self::notify("Recording saved", &describe(output)) {
                warn!(error = ?e, "Failed to show notification");
            }
        }

        if behavior.copy_path_to_clipboard {
            if let Some(primary) = output.files.first() {
                if let Err(e) = self.copy_path(primary) {
                    warn!(error = ?e, "Failed to copy recording path");
                }
            }
        }

        Ok(())
    }

    /// Announce a saved screenshot the same way as a recording.
    #[instrument(skip(self, behavior))]
    pub fn screenshot_saved(&mut self, path: &Path, behavior: &BehaviourConfig) {
        if behavior.notify_on_finish {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Err(e) = Self::notify("Screenshot saved", &name) {
                warn!(error = ?e, "Failed to show notification");
            }
        }

        if behavior.copy_path_to_clipboard {
            if let Err(e) = self.copy_path(path) {
                warn!(error = ?e, "Failed to copy screenshot path");
            }
        }
    }

    /// Put `path` on the clipboard as text.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn copy_path(&mut self, path: &Path) -> AppResult<()> {
        self.clipboard
            .set_text(path.display().to_string())
            .map_err(|e| AppError::ClipboardError {
                reason: format!("Failed to set clipboard: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!("Recording path copied to clipboard");

        Ok(())
    }

    /// Show a desktop notification.
    #[track_caller]
    #[instrument]
    pub fn notify(summary: &str, body: &str) -> AppResult<()> {
        Notification::new()
            .appname(APP_NAME)
            .summary(summary)
            .body(body)
            .show()
            .map(|_| ())
            .map_err(|e| AppError::NotificationFailed {
                reason: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Open `directory` in the platform file browser, creating it first.
    #[track_caller]
    #[instrument]
    pub fn open_folder(directory: &Path) -> AppResult<()> {
        fs::create_dir_all(directory)?;
        open::that(directory)?;
        info!("Opened recordings folder");
        Ok(())
    }
}

/// Delete every file in `files`, returning how many existed.
#[track_caller]
pub(crate) fn discard_files(files: &[PathBuf]) -> AppResult<usize> {
    let mut removed = 0;

    for file in files {
        match fs::remove_file(file) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = ?file, "Output already gone");
            }
            Err(e) => return Err(AppError::from(e)),
        }
    }

    Ok(removed)
}

/// Notification body for a saved recording.
pub(crate) fn describe(output: &RecordingOutput) -> String {
    let names: Vec<String> = output
        .files
        .iter()
        .map(|f| {
            f.file_name()
                .map_or_else(|| f.display().to_string(), |n| n.to_string_lossy().into_owned())
        })
        .collect();

    format!(
        "{} ({} frames)",
        names.join(", "),
        output.frames_written
    )
}
