mod queue;
pub(crate) mod recorder;
mod resampler;

pub(crate) use resampler::StreamResampler;

pub use {
    queue::{SampleBlock, SampleConsumer, SampleProducer, sample_queue},
    recorder::{AudioCaptureLoop, AudioLoopConfig, AudioSummary},
};
