mod events;
mod state;

pub use {
    events::{RecordingEvent, RecordingOutput},
    state::RecorderState,
};

use crate::{
    CaptureError, CoreResult,
    audio::{AudioCaptureLoop, AudioLoopConfig, AudioSummary},
    backend::CaptureBackend,
    session::{CaptureSession, SessionRequest},
    video::{VideoCaptureLoop, VideoEvent, VideoLoopConfig},
};

use std::{
    panic::Location,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use error_location::ErrorLocation;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Drives one recording session at a time through [`RecorderState`].
///
/// The coordinator owns both capture loops. Video loop events arrive on
/// [`video_events`](Self::video_events) and must be fed back through
/// [`handle_video_event`](Self::handle_video_event) (or [`pump`](Self::pump));
/// outward notifications are published on [`events`](Self::events).
///
/// # Thread Safety
///
/// Methods take `&mut self`. Share it behind a mutex and forward video
/// events from a separate task that locks only to handle each event.
/// `stop` blocks until the WAV file is finalized, so expect that lock to
/// be held for up to one audio poll interval plus the drain.
pub struct RecordingCoordinator {
    backend: Arc<dyn CaptureBackend>,
    state: RecorderState,
    session: Option<CaptureSession>,
    video: Option<VideoCaptureLoop>,
    audio: Option<AudioCaptureLoop>,
    audio_summary: Option<AudioSummary>,
    cancelled: bool,
    events_tx: Sender<RecordingEvent>,
    events_rx: Receiver<RecordingEvent>,
    video_tx: Sender<VideoEvent>,
    video_rx: Receiver<VideoEvent>,
}

impl RecordingCoordinator {
    /// Create an idle coordinator over `backend`.
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        let (events_tx, events_rx) = unbounded();
        let (video_tx, video_rx) = unbounded();

        Self {
            backend,
            state: RecorderState::Idle,
            session: None,
            video: None,
            audio: None,
            audio_summary: None,
            cancelled: false,
            events_tx,
            events_rx,
            video_tx,
            video_rx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// The current (or most recent) session.
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Outward notifications. Every clone observes the same queue.
    pub fn events(&self) -> Receiver<RecordingEvent> {
        self.events_rx.clone()
    }

    /// Raw video loop events, to be passed to [`handle_video_event`](Self::handle_video_event).
    pub fn video_events(&self) -> Receiver<VideoEvent> {
        self.video_rx.clone()
    }

    /// Live frame count of the running video loop.
    pub fn frames_written(&self) -> u64 {
        self.video.as_ref().map_or(0, VideoCaptureLoop::frames_written)
    }

    /// Start a new session.
    ///
    /// With a video request the video loop is spawned and the state becomes
    /// `Initializing`; `SetupReady` will move it to `AwaitingCountdown`.
    /// An audio-only session starts the microphone at once and goes
    /// straight to `Recording`.
    ///
    /// # Errors
    ///
    /// Returns error if a session is already live, the request is empty,
    /// the video thread cannot be spawned, or (audio-only) the microphone
    /// cannot be started. The state is unchanged on error.
    #[track_caller]
    #[instrument(skip(self, request), fields(state = %self.state))]
    pub fn start(&mut self, request: SessionRequest) -> CoreResult<Uuid> {
        self.require(self.state.can_start(), "start a recording")?;

        if request.video.is_none() && request.audio.is_none() {
            return Err(CaptureError::NothingToRecord {
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.release();
        let mut session = CaptureSession::new(request);
        let session_id = session.id();

        match session.request().video.clone() {
            Some(video) => {
                let config = VideoLoopConfig {
                    session_id,
                    output: video.output,
                    target: video.target,
                    fps: video.fps,
                    cursor: video.cursor,
                    webcam: video.webcam,
                    catch_up_limit: video.catch_up_limit,
                };
                let video_loop = VideoCaptureLoop::spawn(
                    Arc::clone(&self.backend),
                    config,
                    self.video_tx.clone(),
                )?;

                self.video = Some(video_loop);
                self.session = Some(session);
                self.set_state(RecorderState::Initializing);
            }
            None => {
                let mut audio_loop =
                    audio_loop(&session).ok_or_else(|| CaptureError::NothingToRecord {
                        location: ErrorLocation::from(Location::caller()),
                    })?;
                audio_loop.start(Arc::clone(&self.backend))?;
                session.mark_capture_started(Instant::now());

                self.audio = Some(audio_loop);
                self.session = Some(session);
                self.set_state(RecorderState::Recording);
            }
        }

        info!(session_id = %session_id, "Session started");

        Ok(session_id)
    }

    /// Apply one video loop event. Events from other sessions are ignored.
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn handle_video_event(&mut self, event: VideoEvent) {
        let current = self.session.as_ref().map(CaptureSession::id);
        if current != Some(event.session_id()) || self.video.is_none() {
            debug!(event_session = %event.session_id(), "Ignoring stale video event");
            return;
        }

        match event {
            VideoEvent::SetupReady { width, height, .. } => {
                if self.state == RecorderState::Initializing {
                    info!(width, height, "Video setup ready");
                    self.set_state(RecorderState::AwaitingCountdown);
                }
            }
            VideoEvent::Error { message, .. } => {
                error!(%message, "Video loop reported an error");
                self.emit(RecordingEvent::Error { message });

                if self.state.can_stop() {
                    self.stop_audio();
                    self.set_state(RecorderState::Stopping);
                }
            }
            VideoEvent::Finished {
                frames_written,
                sink_opened,
                ..
            } => {
                if let Some(mut video) = self.video.take() {
                    video.join();
                    self.complete(frames_written, sink_opened.then(|| video.output().to_path_buf()));
                }
            }
        }
    }

    /// Wait up to `timeout` for one video event and handle it.
    ///
    /// Returns `true` if an event was handled.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.video_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_video_event(event);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Countdown finished: start audio, then release the video loop.
    ///
    /// Audio start blocks until the input is live, so the two virtual starts
    /// are separated by the video loop's begin poll at most. An audio
    /// failure is reported as an [`RecordingEvent::Error`] and the session
    /// continues with video only.
    ///
    /// # Errors
    ///
    /// Returns error unless the state is `AwaitingCountdown`.
    #[track_caller]
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn begin_capture(&mut self) -> CoreResult<()> {
        self.require(
            self.state == RecorderState::AwaitingCountdown,
            "begin capture",
        )?;

        let Some(session) = self.session.as_mut() else {
            return Err(self.invalid("begin capture"));
        };

        let mut audio = audio_loop(session);

        if let Some(audio_loop) = audio.as_mut() {
            if let Err(e) = audio_loop.start(Arc::clone(&self.backend)) {
                warn!(error = ?e, "Audio unavailable; recording video only");
                audio = None;
                let _ = self.events_tx.send(RecordingEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        if let Some(video) = self.video.as_ref() {
            video.begin_capture();
        }
        session.mark_capture_started(Instant::now());

        self.audio = audio;
        self.set_state(RecorderState::Recording);

        Ok(())
    }

    /// Pause or resume both loops.
    ///
    /// Setting the current value again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error unless the state is `Recording` or `Paused`.
    #[track_caller]
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn set_paused(&mut self, paused: bool) -> CoreResult<()> {
        self.require(self.state.is_capturing(), "change pause")?;

        if let Some(video) = self.video.as_ref() {
            video.set_paused(paused);
        }
        if let Some(audio) = self.audio.as_ref() {
            audio.set_paused(paused);
        }

        let next = if paused {
            RecorderState::Paused
        } else {
            RecorderState::Recording
        };
        if next != self.state {
            self.set_state(next);
        }

        Ok(())
    }

    /// Stop the session, keeping its output.
    ///
    /// Blocks until the audio file is finalized. The video loop is only
    /// asked to stop; `Finished` follows its `Finished` event.
    ///
    /// # Errors
    ///
    /// Returns error if no session is live.
    #[track_caller]
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn stop(&mut self) -> CoreResult<()> {
        self.require(self.state.can_stop(), "stop")?;
        self.shut_down(false);
        Ok(())
    }

    /// Stop the session and mark its output as cancelled.
    ///
    /// Files are kept; deleting them is the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns error if no session is live.
    #[track_caller]
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn cancel(&mut self) -> CoreResult<()> {
        self.require(self.state.can_stop(), "cancel")?;
        self.shut_down(true);
        Ok(())
    }

    fn shut_down(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.set_state(RecorderState::Stopping);

        // Video must not keep writing frames during the audio drain.
        if let Some(video) = self.video.as_ref() {
            video.request_stop();
        }
        self.stop_audio();

        if self.video.is_none() {
            self.complete(0, None);
        }
    }

    /// Blocking audio stop. The loop handle is kept so its path can be reported.
    fn stop_audio(&mut self) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        if !audio.is_started() {
            return;
        }

        match audio.stop() {
            Ok(summary) => self.audio_summary = Some(summary),
            Err(e) => {
                error!(error = ?e, "Audio loop failed");
                self.emit(RecordingEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn complete(&mut self, frames_written: u64, video_file: Option<PathBuf>) {
        // Covers a video loop that finished on its own.
        self.stop_audio();

        let Some(session_id) = self.session.as_ref().map(CaptureSession::id) else {
            return;
        };

        let mut files: Vec<PathBuf> = video_file.into_iter().collect();
        if let Some(audio) = self.audio.take() {
            files.push(audio.output().to_path_buf());
        }

        let output = RecordingOutput {
            session_id,
            files,
            frames_written,
            audio: self.audio_summary.take(),
            cancelled: self.cancelled,
        };

        info!(
            session_id = %session_id,
            frames_written,
            files = output.files.len(),
            cancelled = output.cancelled,
            "Session finished"
        );

        self.set_state(RecorderState::Finished);
        self.emit(RecordingEvent::Finished(output));
    }

    /// Drop leftovers of the previous session.
    fn release(&mut self) {
        self.video = None;
        self.audio = None;
        self.audio_summary = None;
        self.cancelled = false;
    }

    fn set_state(&mut self, state: RecorderState) {
        debug!(from = %self.state, to = %state, "State transition");
        self.state = state;
        self.emit(RecordingEvent::StateChanged(state));
    }

    fn emit(&self, event: RecordingEvent) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.events_tx.send(event);
    }

    #[track_caller]
    fn require(&self, allowed: bool, action: &'static str) -> CoreResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    #[track_caller]
    fn invalid(&self, action: &'static str) -> CaptureError {
        CaptureError::InvalidTransition {
            action,
            state: self.state.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

/// Unstarted audio loop for the session's audio request, if any.
fn audio_loop(session: &CaptureSession) -> Option<AudioCaptureLoop> {
    let request = session.request().audio.as_ref()?;

    Some(AudioCaptureLoop::new(AudioLoopConfig {
        session_id: session.id(),
        output: request.output.clone(),
        sample_rate: request.sample_rate,
        channels: request.channels,
    }))
}

impl Drop for RecordingCoordinator {
    fn drop(&mut self) {
        if let Some(video) = self.video.as_ref() {
            video.request_stop();
        }
        self.stop_audio();
    }
}
