//! Microphone writer loop.
//!
//! The driver callback enqueues [`SampleBlock`]s; a dedicated writer thread
//! pops them and appends to the sink. Paused blocks are dropped, not
//! buffered, so the file has a gap rather than out-of-order audio.

use crate::{
    CaptureError, CoreResult,
    audio::{SampleBlock, SampleConsumer, StreamResampler, sample_queue},
    backend::{AudioInput, AudioSink, CaptureBackend, InputFormat},
};

use std::{
    panic::Location,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{Sender, bounded};
use error_location::ErrorLocation;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Bounded wait on the sample queue. Also bounds how long `stop` waits for
/// the writer to notice the stop flag.
pub(crate) const QUEUE_POLL: Duration = Duration::from_millis(100);

/// How long `start` waits for the writer to open the microphone and sink.
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how the audio loop writes.
#[derive(Debug, Clone)]
pub struct AudioLoopConfig {
    /// Session the loop belongs to, for log correlation.
    pub session_id: Uuid,
    /// WAV output path.
    pub output: PathBuf,
    /// Sink sample rate in Hz.
    pub sample_rate: u32,
    /// Sink channel count.
    pub channels: u16,
}

/// Counters reported when the audio loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioSummary {
    /// Blocks appended to the sink.
    pub blocks_written: u64,
    /// Blocks dequeued while paused and dropped.
    pub blocks_discarded: u64,
    /// Sample frames in the finalized file.
    pub frames_written: u64,
}

#[derive(Debug, Default)]
struct AudioControl {
    running: AtomicBool,
    paused: AtomicBool,
    /// Set when `start` gave up waiting; the writer must not leave a file.
    abandoned: AtomicBool,
}

/// Audio capture loop handle.
///
/// `stop` is blocking: when it returns, the WAV file is finalized and safe
/// to read.
pub struct AudioCaptureLoop {
    config: AudioLoopConfig,
    control: Arc<AudioControl>,
    handle: Option<JoinHandle<CoreResult<AudioSummary>>>,
    start_timeout: Duration,
}

impl AudioCaptureLoop {
    /// Prepare a loop. Nothing is opened until [`start`](Self::start).
    pub fn new(config: AudioLoopConfig) -> Self {
        Self {
            config,
            control: Arc::new(AudioControl::default()),
            handle: None,
            start_timeout: START_TIMEOUT,
        }
    }

    /// Override how long `start` waits for the device to open.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Output path of the WAV sink.
    pub fn output(&self) -> &Path {
        &self.config.output
    }

    /// True once `start` succeeded and until `stop` returns.
    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the writer thread and wait until it has opened the input and sink.
    #[track_caller]
    #[instrument(skip(self, backend), fields(session_id = %self.config.session_id))]
    pub fn start(&mut self, backend: Arc<dyn CaptureBackend>) -> CoreResult<()> {
        if self.handle.is_some() {
            return Err(CaptureError::InvalidTransition {
                action: "start audio",
                state: "already started".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.control.running.store(true, Ordering::Release);

        let (ready_tx, ready_rx) = bounded::<CoreResult<InputFormat>>(1);
        let config = self.config.clone();
        let control = Arc::clone(&self.control);

        let handle = std::thread::Builder::new()
            .name("audio-writer".to_string())
            .spawn(move || run_writer(backend.as_ref(), &config, &control, ready_tx))
            .map_err(|e| CaptureError::ThreadSpawnFailed {
                name: "audio-writer",
                source: e,
                location: ErrorLocation::from(Location::caller()),
            })?;

        match ready_rx.recv_timeout(self.start_timeout) {
            Ok(Ok(format)) => {
                info!(
                    input_rate = format.sample_rate,
                    input_channels = format.channels,
                    sink_rate = self.config.sample_rate,
                    sink_channels = self.config.channels,
                    "Audio loop started"
                );
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.control.running.store(false, Ordering::Release);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Ordered before `running` so the writer sees it once it
                // observes the stop.
                self.control.abandoned.store(true, Ordering::Release);
                self.control.running.store(false, Ordering::Release);
                warn!(timeout = ?self.start_timeout, "Audio device did not open in time");
                Err(CaptureError::DeviceError {
                    reason: "Timed out starting audio capture".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        }
    }

    /// Drop (rather than write) blocks while `paused` is set.
    pub fn set_paused(&self, paused: bool) {
        self.control.paused.store(paused, Ordering::Release);
    }

    /// True while blocks are being discarded.
    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::Acquire)
    }

    /// Stop capturing and wait for the writer to finalize the sink.
    ///
    /// A loop that was never started returns an empty summary.
    #[track_caller]
    #[instrument(skip(self), fields(session_id = %self.config.session_id))]
    pub fn stop(&mut self) -> CoreResult<AudioSummary> {
        self.control.running.store(false, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return Ok(AudioSummary::default());
        };

        let summary = handle
            .join()
            .map_err(|payload| CaptureError::from_panic("audio", payload))??;

        info!(
            blocks_written = summary.blocks_written,
            blocks_discarded = summary.blocks_discarded,
            frames_written = summary.frames_written,
            "Audio loop stopped"
        );

        Ok(summary)
    }
}

impl Drop for AudioCaptureLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                error!(error = ?e, "Audio loop failed while dropping");
            }
        }
    }
}

fn run_writer(
    backend: &dyn CaptureBackend,
    config: &AudioLoopConfig,
    control: &AudioControl,
    ready_tx: Sender<CoreResult<InputFormat>>,
) -> CoreResult<AudioSummary> {
    let (input, consumer, mut writer, format) = match open_pipeline(backend, config, control) {
        Ok(Some(parts)) => parts,
        Ok(None) => {
            debug!("Audio start abandoned before the sink was created");
            return Ok(AudioSummary::default());
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return Ok(AudioSummary::default());
        }
    };
    let _ = ready_tx.send(Ok(format));

    let outcome = pump(&consumer, &mut writer, control);

    // Dropping the input stops the driver; whatever it queued before that
    // still belongs to the recording.
    drop(input);
    let outcome = outcome.and_then(|()| {
        let queued = consumer.len();
        for block in consumer.drain() {
            writer.accept(block, control.paused.load(Ordering::Acquire))?;
        }
        debug!(queued, "Drained audio queue");
        Ok(())
    });

    let finished = writer.finish();
    if control.abandoned.load(Ordering::Acquire) {
        discard_unreported(&config.output);
        return Ok(AudioSummary::default());
    }
    match (outcome, finished) {
        (Ok(()), finished) => finished,
        (Err(e), finished) => {
            if let Err(finalize_error) = finished {
                warn!(error = ?finalize_error, "Failed to finalize audio after write error");
            }
            Err(e)
        }
    }
}

type Pipeline = (Box<dyn AudioInput>, SampleConsumer, BlockWriter, InputFormat);

/// Open the microphone before the sink so a missing device leaves no file behind.
///
/// Returns `None` when `start` stopped waiting while the device was opening.
fn open_pipeline(
    backend: &dyn CaptureBackend,
    config: &AudioLoopConfig,
    control: &AudioControl,
) -> CoreResult<Option<Pipeline>> {
    let mut input = backend.open_microphone()?;
    if !control.running.load(Ordering::Acquire) {
        return Ok(None);
    }
    let sink = backend.open_audio_sink(&config.output, config.sample_rate, config.channels)?;
    let (producer, consumer) = sample_queue();

    let writer = input
        .start(producer)
        .and_then(|format| {
            BlockWriter::new(sink, format, config.sample_rate, config.channels)
                .map(|writer| (writer, format))
        });
    match writer {
        Ok((writer, format)) => Ok(Some((input, consumer, writer, format))),
        Err(e) => {
            discard_unreported(&config.output);
            Err(e)
        }
    }
}

/// Remove a WAV file that no summary will ever report.
fn discard_unreported(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!(path = ?path, "Removed unreported audio file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(error = ?e, path = ?path, "Failed to remove unreported audio file"),
    }
}

fn pump(consumer: &SampleConsumer, writer: &mut BlockWriter, control: &AudioControl) -> CoreResult<()> {
    while control.running.load(Ordering::Acquire) {
        let Some(block) = consumer.pop_timeout(QUEUE_POLL) else {
            continue;
        };
        writer.accept(block, control.paused.load(Ordering::Acquire))?;
    }
    Ok(())
}

/// Converts device blocks to the sink layout and appends them.
struct BlockWriter {
    sink: Box<dyn AudioSink>,
    resampler: Option<StreamResampler>,
    channels: u16,
    summary: AudioSummary,
    max_queue_delay: Duration,
}

impl BlockWriter {
    fn new(
        sink: Box<dyn AudioSink>,
        input: InputFormat,
        sample_rate: u32,
        channels: u16,
    ) -> CoreResult<Self> {
        let resampler = if input.sample_rate != sample_rate {
            Some(StreamResampler::new(input.sample_rate, sample_rate, channels)?)
        } else {
            None
        };

        Ok(Self {
            sink,
            resampler,
            channels,
            summary: AudioSummary::default(),
            max_queue_delay: Duration::ZERO,
        })
    }

    fn accept(&mut self, block: SampleBlock, paused: bool) -> CoreResult<()> {
        self.max_queue_delay = self.max_queue_delay.max(block.arrived_at().elapsed());
        if paused {
            self.summary.blocks_discarded += 1;
            return Ok(());
        }

        let mixed = remix(block.samples(), block.channels(), self.channels);
        let ready = match self.resampler.as_mut() {
            Some(resampler) => resampler.push(&mixed)?,
            None => mixed,
        };

        self.sink.write_samples(&ready)?;
        self.summary.blocks_written += 1;

        Ok(())
    }

    fn finish(mut self) -> CoreResult<AudioSummary> {
        if let Some(resampler) = self.resampler.as_mut() {
            let tail = resampler.flush()?;
            self.sink.write_samples(&tail)?;
        }

        self.summary.frames_written = self.sink.finalize()?;
        debug!(max_queue_delay = ?self.max_queue_delay, "Audio sink finalized");

        Ok(self.summary)
    }
}

/// Convert interleaved samples from `from` channels to `to` channels.
///
/// Mono output averages every input channel; mono input is replicated;
/// other layouts map output channel `c` to input channel `c % from`.
pub(crate) fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = usize::from(from);
    let to = usize::from(to);

    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.chunks_exact(from);
    let mut out = Vec::with_capacity(frames.len() * to);

    for frame in frames {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }

    out
}
