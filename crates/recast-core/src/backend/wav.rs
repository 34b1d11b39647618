use crate::{CaptureError, CoreResult, backend::AudioSink};

use std::{
    fs::{File, OpenOptions},
    io::BufWriter,
    panic::Location,
    path::{Path, PathBuf},
};

use error_location::ErrorLocation;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info, instrument};

/// 16-bit PCM WAV file.
///
/// The file is created exclusively: an existing recording is never
/// overwritten.
pub struct WavFileSink {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
    channels: u16,
    samples_written: u64,
}

impl WavFileSink {
    /// Create the WAV file at `path`.
    #[track_caller]
    #[instrument]
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> CoreResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| CaptureError::SinkOpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::new(BufWriter::new(file), spec).map_err(|e| {
            CaptureError::SinkOpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

        info!(path = ?path, sample_rate, channels, "WAV sink opened");

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            channels,
            samples_written: 0,
        })
    }
}

impl AudioSink for WavFileSink {
    #[track_caller]
    fn write_samples(&mut self, samples: &[f32]) -> CoreResult<()> {
        for &sample in samples {
            self.writer
                .write_sample(to_pcm16(sample))
                .map_err(|e| CaptureError::SinkWriteFailed {
                    reason: format!("Failed to write WAV sample: {}", e),
                    location: ErrorLocation::from(Location::caller()),
                })?;
        }
        self.samples_written += samples.len() as u64;

        Ok(())
    }

    #[track_caller]
    fn finalize(self: Box<Self>) -> CoreResult<u64> {
        let WavFileSink {
            writer,
            path,
            channels,
            samples_written,
        } = *self;
        let frames = samples_written / u64::from(channels.max(1));

        writer.finalize().map_err(|e| CaptureError::SinkWriteFailed {
            reason: format!("Failed to finalize WAV: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        debug!(path = ?path, frames, "WAV sink finalized");

        Ok(frames)
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}
