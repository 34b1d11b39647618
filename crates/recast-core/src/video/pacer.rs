use std::time::{Duration, Instant};

/// Wall-clock frame scheduler.
///
/// Frame `n` belongs at `virtual_start + n / fps`. After a write the pacer
/// holds `frames_written == floor(elapsed * fps) + 1`, i.e. the frame for the
/// current instant is on disk. Pausing freezes the clock and resuming moves
/// `virtual_start` forward by the paused span, so a pause never accrues
/// frames.
#[derive(Debug, Clone)]
pub struct FramePacer {
    fps: f64,
    virtual_start: Instant,
    paused_at: Option<Instant>,
    frames_written: u64,
    frames_skipped: u64,
}

impl FramePacer {
    /// Start the schedule at `start`. `fps` must be positive and finite.
    pub fn new(fps: f64, start: Instant) -> Self {
        Self {
            fps,
            virtual_start: start,
            paused_at: None,
            frames_written: 0,
            frames_skipped: 0,
        }
    }

    /// Reference instant for frame zero.
    pub fn virtual_start(&self) -> Instant {
        self.virtual_start
    }

    /// Frames recorded through [`record_written`](Self::record_written).
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Frames given up by [`skip`](Self::skip).
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// True between `pause` and `resume`.
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Freeze the schedule. Repeated calls keep the first pause instant.
    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Unfreeze and shift the virtual start by the paused span. Returns that span.
    pub fn resume(&mut self, now: Instant) -> Duration {
        match self.paused_at.take() {
            Some(paused_at) => {
                let span = now.saturating_duration_since(paused_at);
                self.virtual_start += span;
                span
            }
            None => Duration::ZERO,
        }
    }

    /// Index of the frame scheduled for `now`.
    pub fn expected_index(&self, now: Instant) -> u64 {
        let now = self.paused_at.unwrap_or(now);
        let elapsed = now.saturating_duration_since(self.virtual_start);
        (elapsed.as_secs_f64() * self.fps).floor() as u64
    }

    /// Copies of the next captured frame needed to catch up with `now`.
    ///
    /// Zero means the pacer is ahead of schedule (or paused).
    pub fn frames_due(&self, now: Instant) -> u64 {
        if self.is_paused() {
            return 0;
        }
        (self.expected_index(now) + 1).saturating_sub(self.frames_written)
    }

    /// Time until the next unwritten frame is due.
    pub fn until_next_frame(&self, now: Instant) -> Duration {
        let offset = Duration::from_secs_f64(self.frames_written as f64 / self.fps);
        (self.virtual_start + offset).saturating_duration_since(now)
    }

    /// Count frames appended to the sink.
    pub fn record_written(&mut self, frames: u64) {
        self.frames_written += frames;
    }

    /// Give up on `frames` scheduled frames without writing them.
    ///
    /// The virtual start moves forward by their duration so they are not
    /// due again.
    pub fn skip(&mut self, frames: u64) {
        self.frames_skipped += frames;
        self.virtual_start += Duration::from_secs_f64(frames as f64 / self.fps);
    }
}
