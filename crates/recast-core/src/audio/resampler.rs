use crate::{CaptureError, CoreResult};

use std::panic::Location;

use audioadapter_buffers::direct::InterleavedSlice;
use error_location::ErrorLocation;
use rubato::{Fft, FixedSync, Resampler as RubatoResampler};
use tracing::{debug, instrument};

/// Frames per FFT chunk.
const CHUNK_FRAMES: usize = 1024;

/// Streaming sample-rate converter for interleaved audio.
///
/// Blocks of any size are accepted; only whole chunks are converted and the
/// remainder waits for the next call. `flush` pads and converts the tail.
pub struct StreamResampler {
    resampler: Fft<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    pending: Vec<f32>,
}

impl StreamResampler {
    #[track_caller]
    #[instrument]
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> CoreResult<Self> {
        let channels = usize::from(channels.max(1));
        let sub_chunks = 2;

        let resampler = Fft::<f32>::new(
            input_rate as usize,  // sample_rate_input
            output_rate as usize, // sample_rate_output
            CHUNK_FRAMES,         // chunk_size
            sub_chunks,           // sub_chunks
            channels,             // nbr_channels
            FixedSync::Input,     // fixed
        )
        .map_err(|e| CaptureError::ResamplingError {
            reason: format!("Failed to create resampler: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        debug!(input_rate, output_rate, channels, "Resampler initialized");

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            pending: Vec::with_capacity(CHUNK_FRAMES * channels * 2),
        })
    }

    /// Queue `samples` and return whatever whole chunks could be converted.
    #[track_caller]
    pub fn push(&mut self, samples: &[f32]) -> CoreResult<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let chunk_len = CHUNK_FRAMES * self.channels;
        let whole = self.pending.len() / chunk_len * chunk_len;
        if whole == 0 {
            return Ok(Vec::new());
        }

        let ready: Vec<f32> = self.pending.drain(..whole).collect();
        let mut output = Vec::with_capacity(self.estimate(ready.len()));
        for chunk in ready.chunks(chunk_len) {
            self.process_chunk(chunk, &mut output)?;
        }

        Ok(output)
    }

    /// Convert the buffered tail, zero-padded to a full chunk and trimmed
    /// back to its proportional length.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> CoreResult<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let tail: Vec<f32> = std::mem::take(&mut self.pending);
        let expected = self.estimate(tail.len());

        let mut padded = tail;
        padded.resize(CHUNK_FRAMES * self.channels, 0.0);

        let mut output = Vec::with_capacity(expected);
        self.process_chunk(&padded, &mut output)?;
        output.truncate(expected);

        debug!(output_len = output.len(), "Resampler flushed");

        Ok(output)
    }

    fn estimate(&self, input_len: usize) -> usize {
        let frames = input_len / self.channels;
        let out_frames =
            (frames as f64 * f64::from(self.output_rate) / f64::from(self.input_rate)) as usize;
        out_frames * self.channels
    }

    #[track_caller]
    fn process_chunk(&mut self, chunk: &[f32], output: &mut Vec<f32>) -> CoreResult<()> {
        let input_adapter = InterleavedSlice::new(chunk, self.channels, CHUNK_FRAMES).map_err(
            |e| CaptureError::ResamplingError {
                reason: format!("Failed to create input adapter: {}", e),
                location: ErrorLocation::from(Location::caller()),
            },
        )?;

        let output_frames = self.resampler.output_frames_max();
        let mut output_chunk = vec![0.0f32; output_frames * self.channels];

        let mut output_adapter =
            InterleavedSlice::new_mut(&mut output_chunk, self.channels, output_frames).map_err(
                |e| CaptureError::ResamplingError {
                    reason: format!("Failed to create output adapter: {}", e),
                    location: ErrorLocation::from(Location::caller()),
                },
            )?;

        let (_input_frames, output_frames_written) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, None)
            .map_err(|e| CaptureError::ResamplingError {
                reason: format!("Resampling failed: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        output.extend_from_slice(&output_chunk[..output_frames_written * self.channels]);

        Ok(())
    }
}
