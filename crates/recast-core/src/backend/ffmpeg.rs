use crate::{CaptureError, CoreResult, backend::VideoSink};

use std::{
    fs::OpenOptions,
    io::{BufRead, BufReader, Write},
    panic::Location,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Stdio},
    time::Duration,
};

use error_location::ErrorLocation;
use ffmpeg_sidecar::{command::FfmpegCommand, paths};
use image::RgbImage;
use tracing::{debug, info, instrument, warn};

/// Codec used when the caller does not pick one. Native to every ffmpeg build.
pub const DEFAULT_VIDEO_CODEC: &str = "mpeg4";

/// How long to wait for ffmpeg to reject its arguments or output file.
const STARTUP_PROBE: Duration = Duration::from_millis(150);

/// MP4 sink backed by an ffmpeg child process reading raw RGB frames on stdin.
pub struct FfmpegVideoSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl FfmpegVideoSink {
    /// Spawn ffmpeg writing `path` at fixed dimensions and frame rate.
    ///
    /// The output file is created exclusively before ffmpeg starts so that
    /// permission problems and name clashes surface here, not mid-recording.
    /// The file is removed again if ffmpeg fails to start.
    #[track_caller]
    pub fn open(path: &Path, width: u32, height: u32, fps: f64, codec: &str) -> CoreResult<Self> {
        Self::open_with_binary(&paths::ffmpeg_path(), path, width, height, fps, codec)
    }

    /// [`open`](Self::open) with an explicit ffmpeg executable.
    #[track_caller]
    #[instrument]
    pub(crate) fn open_with_binary(
        binary: &Path,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        codec: &str,
    ) -> CoreResult<Self> {
        let open_failed = |reason: String| CaptureError::SinkOpenFailed {
            path: path.to_path_buf(),
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| open_failed(e.to_string()))?;

        match spawn_encoder(binary, path, width, height, fps, codec) {
            Ok((child, stdin)) => {
                info!(path = ?path, width, height, fps, codec, "Video sink opened");
                Ok(Self {
                    child: Some(child),
                    stdin: Some(stdin),
                    path: path.to_path_buf(),
                    width,
                    height,
                    frames_written: 0,
                })
            }
            Err(reason) => {
                remove_placeholder(path);
                Err(open_failed(reason))
            }
        }
    }
}

/// Start ffmpeg on `path` and wait out the startup window.
///
/// On failure the child, if any, has exited or been killed.
fn spawn_encoder(
    binary: &Path,
    path: &Path,
    width: u32,
    height: u32,
    fps: f64,
    codec: &str,
) -> Result<(Child, ChildStdin), String> {
    let mut command = FfmpegCommand::new_with_path(binary);
    command
        .args(["-loglevel", "error"])
        .args(["-f", "rawvideo"])
        .args(["-pix_fmt", "rgb24"])
        .args(["-s", &format!("{}x{}", width, height)])
        .args(["-r", &format!("{}", fps)])
        .args(["-i", "-"])
        .args(["-c:v", codec])
        .args(["-pix_fmt", "yuv420p"])
        .args(["-y"])
        .arg(path.to_string_lossy().to_string());

    let inner = command.as_inner_mut();
    inner.stdin(Stdio::piped());
    inner.stdout(Stdio::null());
    inner.stderr(Stdio::piped());

    let mut child = inner
        .spawn()
        .map_err(|e| format!("Failed to start ffmpeg: {}", e))?;

    let Some(stdin) = child.stdin.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err("ffmpeg stdin unavailable".to_string());
    };

    if let Some(stderr) = child.stderr.take() {
        let spawned = std::thread::Builder::new()
            .name("ffmpeg-stderr".to_string())
            .spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    warn!(target: "ffmpeg", "{}", line);
                }
            });
        if let Err(e) = spawned {
            warn!(error = ?e, "Failed to spawn ffmpeg stderr reader");
        }
    }

    std::thread::sleep(STARTUP_PROBE);
    if let Ok(Some(status)) = child.try_wait() {
        return Err(format!("ffmpeg exited during startup: {}", status));
    }

    Ok((child, stdin))
}

/// Remove the empty file reserved by `open` when ffmpeg never took it over.
fn remove_placeholder(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = ?path, "Removed unused video file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = ?e, path = ?path, "Failed to remove unused video file"),
    }
}

impl VideoSink for FfmpegVideoSink {
    #[track_caller]
    fn write_frame(&mut self, frame: &RgbImage) -> CoreResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(CaptureError::SinkWriteFailed {
                reason: format!(
                    "Frame is {}x{}, sink expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CaptureError::SinkWriteFailed {
                reason: "ffmpeg stdin already closed".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        stdin
            .write_all(frame.as_raw())
            .map_err(|e| CaptureError::SinkWriteFailed {
                reason: format!("Failed to write frame: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;
        self.frames_written += 1;

        Ok(())
    }

    #[track_caller]
    fn finish(mut self: Box<Self>) -> CoreResult<()> {
        // Closing stdin is ffmpeg's end-of-stream.
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().map_err(|e| CaptureError::SinkWriteFailed {
            reason: format!("Failed to wait for ffmpeg: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if !status.success() {
            return Err(CaptureError::SinkWriteFailed {
                reason: format!("ffmpeg exited with {}", status),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        debug!(
            path = ?self.path,
            frames_written = self.frames_written,
            "Video sink finalized"
        );

        Ok(())
    }
}

impl Drop for FfmpegVideoSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
