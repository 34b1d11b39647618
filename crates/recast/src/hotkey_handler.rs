//! Global hotkeys for recording control.
//!
//! Registers four hotkeys and turns presses into [`AppCommand`]s. The
//! recording state lives in the coordinator, so this handler is a plain
//! mapping from hotkey id to command.

use crate::{AppCommand, AppError, AppResult};

use std::{panic::Location, time::Duration};

use error_location::ErrorLocation;
use global_hotkey::{
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
    hotkey::{Code, HotKey, Modifiers},
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// The recording and screenshot hotkeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    /// Start a recording or stop the live one.
    pub start_stop: HotKey,
    /// Pause or resume.
    pub pause: HotKey,
    /// Cancel and discard.
    pub cancel: HotKey,
    /// Save a still image of the capture target.
    pub screenshot: HotKey,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        let mods = Some(Modifiers::CONTROL | Modifiers::SHIFT);
        Self {
            start_stop: HotKey::new(mods, Code::KeyR),
            pause: HotKey::new(mods, Code::KeyP),
            cancel: HotKey::new(mods, Code::KeyX),
            screenshot: HotKey::new(mods, Code::KeyS),
        }
    }
}

impl HotkeyBindings {
    /// Command bound to hotkey `id`, if any.
    pub fn command_for(&self, id: u32) -> Option<AppCommand> {
        if id == self.start_stop.id() {
            Some(AppCommand::StartStop)
        } else if id == self.pause.id() {
            Some(AppCommand::TogglePause)
        } else if id == self.cancel.id() {
            Some(AppCommand::Cancel)
        } else if id == self.screenshot.id() {
            Some(AppCommand::Screenshot)
        } else {
            None
        }
    }

    fn labelled(&self) -> [(HotKey, &'static str); 4] {
        [
            (self.start_stop, "CTRL+SHIFT+R"),
            (self.pause, "CTRL+SHIFT+P"),
            (self.cancel, "CTRL+SHIFT+X"),
            (self.screenshot, "CTRL+SHIFT+S"),
        ]
    }
}

/// Forwards global hotkey presses to the application.
pub struct HotkeyHandler {
    bindings: HotkeyBindings,
    command_tx: mpsc::Sender<AppCommand>,
}

impl HotkeyHandler {
    /// Register every hotkey in `bindings`.
    ///
    /// Must be called on a thread with a message pump (e.g. the main thread
    /// running a `tao`/`winit` event loop) so that `WM_HOTKEY` messages are
    /// dispatched on Windows. The returned [`GlobalHotKeyManager`] must be
    /// kept alive on that thread for the hotkeys to remain registered.
    #[track_caller]
    #[instrument]
    pub fn register_hotkeys(bindings: &HotkeyBindings) -> AppResult<GlobalHotKeyManager> {
        let manager =
            GlobalHotKeyManager::new().map_err(|e| AppError::HotkeyRegistrationFailed {
                reason: format!("Failed to create manager: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        for (hotkey, label) in bindings.labelled() {
            manager
                .register(hotkey)
                .map_err(|e| AppError::HotkeyRegistrationFailed {
                    reason: format!("Failed to register {}: {}", label, e),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            info!(hotkey = label, "Global hotkey registered");
        }

        Ok(manager)
    }

    /// Create a handler for previously registered `bindings`.
    ///
    /// This struct is `Send` and can live on any thread. It only listens on
    /// the global [`GlobalHotKeyEvent`] channel.
    pub fn new(bindings: HotkeyBindings, command_tx: mpsc::Sender<AppCommand>) -> Self {
        Self {
            bindings,
            command_tx,
        }
    }

    /// Run the hotkey handler event loop until a shutdown signal is received.
    #[instrument(skip(self))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> AppResult<()> {
        let receiver = GlobalHotKeyEvent::receiver().clone();
        let (event_tx, mut event_rx) = mpsc::channel(32);

        // GlobalHotKeyEvent::receiver() is a crossbeam receiver with a
        // blocking recv(), so one blocking task forwards every press.
        // It exits on the first blocking_send() after event_rx is dropped.
        let handle = tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                if event_tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Hotkey handler shutting down");
                    break;
                }
                Some(event) = event_rx.recv() => {
                    self.handle_event(event).await?;
                }
            }
        }

        drop(event_rx);

        // The blocking task may sit in recv() until another hotkey arrives.
        // The runtime cleans it up on exit.
        match tokio::time::timeout(Duration::from_secs(1), handle).await {
            Ok(Ok(())) => debug!("Hotkey event forwarder stopped cleanly"),
            Ok(Err(e)) => warn!(error = ?e, "Hotkey event forwarder task panicked"),
            Err(_) => debug!(
                "Hotkey event forwarder did not stop within timeout, \
                   will be cleaned up on exit"
            ),
        }

        Ok(())
    }

    /// Send the command bound to `event`, ignoring key releases.
    #[instrument(skip(self))]
    pub async fn handle_event(&self, event: GlobalHotKeyEvent) -> AppResult<()> {
        if !matches!(event.state, HotKeyState::Pressed) {
            return Ok(());
        }

        let Some(command) = self.bindings.command_for(event.id) else {
            return Ok(());
        };

        debug!(command = ?command, "Hotkey pressed");

        self.command_tx
            .send(command)
            .await
            .map_err(|e| AppError::ChannelSendFailed {
                message: format!("Failed to send hotkey command: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}
