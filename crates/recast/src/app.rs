use crate::{
    AppCommand, AppResult, OutputHandler, TrayCommand, TrayIconState,
    config::Config,
    countdown::{COUNTDOWN_TICK, run_countdown},
};

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use recast_core::{
    CaptureBackend, RecorderState, RecordingCoordinator, RecordingEvent, RecordingOutput,
    capture_screenshot,
};
use tao::event_loop::EventLoopProxy;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};
use tray_icon::menu::MenuEvent;
use uuid::Uuid;

/// How often the core event forwarders check whether the app has gone away.
const FORWARD_POLL: Duration = Duration::from_millis(250);

/// Main application state.
///
/// Runs on the async runtime thread. Tray icon updates go back to the main
/// thread through `tray_proxy` because `TrayIcon` is `!Send` and must
/// remain on the UI thread. Coordinator calls can block (joining threads,
/// finalizing the WAV file), so they run on the blocking pool.
pub struct App {
    pub(crate) coordinator: Arc<Mutex<RecordingCoordinator>>,
    pub(crate) backend: Arc<dyn CaptureBackend>,
    pub(crate) output_handler: Arc<Mutex<OutputHandler>>,
    pub(crate) tray_proxy: EventLoopProxy<TrayCommand>,
    pub(crate) config: Config,
    pub(crate) command_tx: mpsc::Sender<AppCommand>,
    pub(crate) command_rx: mpsc::Receiver<AppCommand>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) open_folder_menu_id: tray_icon::menu::MenuId,
    pub(crate) exit_menu_id: tray_icon::menu::MenuId,
    pub(crate) session_id: Option<Uuid>,
    pub(crate) exit_pending: bool,
}

impl App {
    /// Run the main application event loop.
    #[instrument(skip(self))]
    pub(crate) async fn run(mut self) -> AppResult<()> {
        info!("Recast starting");

        // MenuEvent::receiver() is a crossbeam receiver with a blocking
        // recv(), so one blocking task forwards every menu click. It exits
        // on the first blocking_send() after tray_event_rx is dropped.
        let (tray_event_tx, mut tray_event_rx) = mpsc::channel(32);
        let tray_handle = tokio::task::spawn_blocking(move || {
            let receiver = MenuEvent::receiver();
            while let Ok(event) = receiver.recv() {
                if tray_event_tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });

        let (video_rx, events_rx) = {
            let coordinator = self.coordinator.lock().unwrap_or_else(|e| e.into_inner());
            (coordinator.video_events(), coordinator.events())
        };
        forward(video_rx, self.command_tx.clone(), AppCommand::Video);
        forward(events_rx, self.command_tx.clone(), AppCommand::Recording);

        loop {
            tokio::select! {
                Some(event) = tray_event_rx.recv() => {
                    self.handle_tray_event(event).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match self.handle_command(cmd).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => error!(error = ?e, "Failed to handle command"),
                    }
                }

                else => {
                    info!("All channels closed, shutting down");
                    break;
                }
            }
        }

        drop(tray_event_rx);

        match tokio::time::timeout(Duration::from_secs(1), tray_handle).await {
            Ok(Ok(())) => info!("Tray event forwarder stopped cleanly"),
            Ok(Err(e)) => error!(error = ?e, "Tray event forwarder task panicked"),
            Err(_) => info!(
                "Tray event forwarder did not stop within timeout, \
                     will be cleaned up on exit"
            ),
        }

        let _ = self.shutdown_tx.send(true);
        let _ = self.tray_proxy.send_event(TrayCommand::Shutdown);
        info!("Recast shut down successfully");

        Ok(())
    }

    /// Handle one command. Returns `false` when the app should exit.
    #[instrument(skip(self))]
    async fn handle_command(&mut self, cmd: AppCommand) -> AppResult<bool> {
        match cmd {
            AppCommand::StartStop => {
                let state = self.state().await?;
                if state.can_start() {
                    self.start_recording().await?;
                } else if state.can_stop() {
                    self.with_coordinator(|c| c.stop()).await??;
                } else {
                    debug!(state = %state, "Start/stop ignored");
                }
            }
            AppCommand::TogglePause => {
                self.with_coordinator(|c| {
                    let state = c.state();
                    if state.is_capturing() {
                        c.set_paused(state == RecorderState::Recording)
                    } else {
                        debug!(state = %state, "Pause ignored");
                        Ok(())
                    }
                })
                .await??;
            }
            AppCommand::Cancel => {
                self.with_coordinator(|c| {
                    if c.state().can_stop() {
                        c.cancel()
                    } else {
                        Ok(())
                    }
                })
                .await??;
            }
            AppCommand::Screenshot => self.take_screenshot().await?,
            AppCommand::CountdownTick {
                session_id,
                remaining,
            } => {
                if self.session_id == Some(session_id)
                    && self.state().await? == RecorderState::AwaitingCountdown
                {
                    self.set_tray(TrayIconState::Countdown { remaining });
                }
            }
            AppCommand::CountdownFinished { session_id } => {
                let began = self
                    .with_coordinator(move |c| {
                        let current = c.session().map(|s| s.id());
                        if c.state() == RecorderState::AwaitingCountdown
                            && current == Some(session_id)
                        {
                            c.begin_capture().map(|()| true)
                        } else {
                            Ok(false)
                        }
                    })
                    .await??;

                if !began {
                    debug!(session_id = %session_id, "Stale countdown ignored");
                }
            }
            AppCommand::Video(event) => {
                self.with_coordinator(move |c| c.handle_video_event(event))
                    .await?;
            }
            AppCommand::Recording(event) => return self.handle_recording_event(event).await,
            AppCommand::Shutdown => return self.request_exit().await,
        }

        Ok(true)
    }

    #[instrument(skip(self))]
    async fn start_recording(&mut self) -> AppResult<()> {
        let paths = self.config.output_paths(Local::now());
        let config = self.config.clone();
        let backend = Arc::clone(&self.backend);

        let session_id = self
            .with_coordinator(move |c| -> AppResult<Uuid> {
                let request = config.session_request(&paths, backend.display_refresh_rate())?;
                Ok(c.start(request)?)
            })
            .await??;

        self.session_id = Some(session_id);
        info!(session_id = %session_id, "Recording requested");

        Ok(())
    }

    /// Grab the configured target once. Independent of any live recording.
    #[instrument(skip(self))]
    async fn take_screenshot(&self) -> AppResult<()> {
        let path = self.config.screenshot_path(Local::now())?;
        let target = self.config.capture.target.to_target();
        let backend = Arc::clone(&self.backend);
        let output_handler = Arc::clone(&self.output_handler);
        let behavior = self.config.behavior.clone();

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            capture_screenshot(backend.as_ref(), &target, &path)?;
            let mut handler = output_handler.lock().unwrap_or_else(|e| e.into_inner());
            handler.screenshot_saved(&path, &behavior);
            Ok(())
        })
        .await?
    }

    #[instrument(skip(self))]
    async fn handle_recording_event(&mut self, event: RecordingEvent) -> AppResult<bool> {
        match event {
            RecordingEvent::StateChanged(state) => {
                self.set_tray(TrayIconState::from_recorder(state));

                if state == RecorderState::AwaitingCountdown {
                    if let Some(session_id) = self.session_id {
                        self.spawn_countdown(session_id);
                    }
                }
            }
            RecordingEvent::Error { message } => {
                error!(message = %message, "Recording error");
                if self.config.behavior.notify_on_finish {
                    if let Err(e) = OutputHandler::notify("Recording problem", &message) {
                        warn!(error = ?e, "Failed to show notification");
                    }
                }
            }
            RecordingEvent::Finished(output) => {
                self.finish_recording(output).await?;
                if self.exit_pending {
                    info!("Recording saved, exiting");
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    fn spawn_countdown(&self, session_id: Uuid) {
        let seconds = self.config.behavior.countdown_seconds;
        let command_tx = self.command_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = run_countdown(session_id, seconds, COUNTDOWN_TICK, command_tx).await {
                debug!(error = ?e, "Countdown abandoned");
            }
        });
    }

    async fn finish_recording(&mut self, output: RecordingOutput) -> AppResult<()> {
        if self.session_id == Some(output.session_id) {
            self.session_id = None;
        }

        let output_handler = Arc::clone(&self.output_handler);
        let behavior = self.config.behavior.clone();

        tokio::task::spawn_blocking(move || {
            let mut handler = output_handler.lock().unwrap_or_else(|e| e.into_inner());
            handler.finish(&output, &behavior)
        })
        .await?
    }

    /// Exit now, or once the live recording has been saved.
    async fn request_exit(&mut self) -> AppResult<bool> {
        let state = self.state().await?;

        if state.can_stop() {
            info!(state = %state, "Exit requested, saving recording first");
            self.exit_pending = true;
            self.with_coordinator(|c| c.stop()).await??;
            Ok(true)
        } else if state == RecorderState::Stopping {
            info!("Exit requested, waiting for recording to finish");
            self.exit_pending = true;
            Ok(true)
        } else {
            info!("Shutdown requested");
            Ok(false)
        }
    }

    /// Handle tray menu events.
    #[instrument(skip(self))]
    async fn handle_tray_event(&mut self, event: MenuEvent) {
        let event_id = &event.id;

        if *event_id == self.open_folder_menu_id {
            if let Err(e) = OutputHandler::open_folder(&self.config.output.directory) {
                error!(error = ?e, "Failed to open recordings folder");
            }
        } else if *event_id == self.exit_menu_id {
            info!("Exit requested from tray menu");
            if let Err(e) = self.command_tx.send(AppCommand::Shutdown).await {
                error!(error = ?e, "Failed to send shutdown command");
            }
        }
    }

    async fn state(&self) -> AppResult<RecorderState> {
        self.with_coordinator(|c| c.state()).await
    }

    /// Run `f` against the coordinator on the blocking pool.
    async fn with_coordinator<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut RecordingCoordinator) -> T + Send + 'static,
        T: Send + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);

        Ok(tokio::task::spawn_blocking(move || {
            let mut guard = coordinator.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await?)
    }

    fn set_tray(&self, state: TrayIconState) {
        if self
            .tray_proxy
            .send_event(TrayCommand::SetState(state))
            .is_err()
        {
            debug!("Tray event loop closed");
        }
    }
}

/// Move events from a core channel onto the command channel.
///
/// Stops when either side disconnects.
fn forward<E: Send + 'static>(
    rx: Receiver<E>,
    command_tx: mpsc::Sender<AppCommand>,
    wrap: fn(E) -> AppCommand,
) {
    tokio::task::spawn_blocking(move || {
        loop {
            match rx.recv_timeout(FORWARD_POLL) {
                Ok(event) => {
                    if command_tx.blocking_send(wrap(event)).is_err() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if command_tx.is_closed() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });
}
