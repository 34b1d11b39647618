//! Hand-off between the driver callback and the audio writer loop.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

/// One chunk of interleaved samples as delivered by the driver.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    arrived_at: Instant,
}

impl SampleBlock {
    /// Stamp a block with the current instant.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
            arrived_at: Instant::now(),
        }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate the block was captured at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// When the driver handed the block over.
    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// Create a connected producer/consumer pair.
///
/// The channel is unbounded: blocks are never dropped on the producer side.
pub fn sample_queue() -> (SampleProducer, SampleConsumer) {
    let (tx, rx) = unbounded();
    (SampleProducer { tx }, SampleConsumer { rx })
}

/// Driver-side end of the queue. Cheap to call from a real-time callback.
#[derive(Debug, Clone)]
pub struct SampleProducer {
    tx: Sender<SampleBlock>,
}

impl SampleProducer {
    /// Enqueue a block. Returns `false` once the consumer is gone.
    pub fn push(&self, block: SampleBlock) -> bool {
        self.tx.send(block).is_ok()
    }
}

/// Writer-side end of the queue.
#[derive(Debug)]
pub struct SampleConsumer {
    rx: Receiver<SampleBlock>,
}

impl SampleConsumer {
    /// Wait up to `timeout` for the next block.
    ///
    /// `None` on timeout or when every producer has been dropped; both are
    /// routine and the caller simply polls again.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SampleBlock> {
        match self.rx.recv_timeout(timeout) {
            Ok(block) => Some(block),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // Avoid a hot loop when the input is already gone.
                std::thread::sleep(timeout.min(Duration::from_millis(10)));
                None
            }
        }
    }

    /// Take every block currently queued, in arrival order.
    pub fn drain(&self) -> impl Iterator<Item = SampleBlock> + '_ {
        self.rx.try_iter()
    }

    /// Blocks currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
