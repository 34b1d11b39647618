//! Recast: screen recording with a synchronized microphone track, driven
//! from the system tray and global hotkeys.

mod app;
mod app_command;
mod config;
mod countdown;
mod error;
mod hotkey_handler;
mod logging;
mod output_handler;
#[cfg(test)]
mod tests;
mod tray_command;
mod tray_icon_state;
mod tray_manager;

pub(crate) use {
    app::App,
    app_command::AppCommand,
    error::{AppError, Result as AppResult},
    hotkey_handler::{HotkeyBindings, HotkeyHandler},
    output_handler::OutputHandler,
    tray_command::TrayCommand,
    tray_icon_state::TrayIconState,
    tray_manager::TrayManager,
};

use crate::config::Config;

use std::sync::{Arc, Mutex};

use global_hotkey::GlobalHotKeyManager;
use recast_core::{CaptureBackend, RecordingCoordinator, SystemBackend};
use tao::{
    event::{Event, StartCause},
    event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy},
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument};

/// Application entry point.
fn main() {
    let log_guard = logging::init(Config::log_dir().as_deref());

    let event_loop = EventLoopBuilder::<TrayCommand>::with_user_event().build();
    let tray_proxy = event_loop.create_proxy();

    // TrayIcon is !Send on all platforms, so the tray stays on the main thread.
    let mut tray_manager = match TrayManager::new() {
        Ok(tm) => tm,
        Err(e) => {
            error!(error = ?e, "Failed to create tray icon");
            std::process::exit(1);
        }
    };

    // Dropping the manager unregisters the hotkeys, so it lives in the closure.
    let mut hotkey_manager: Option<GlobalHotKeyManager> = None;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::UserEvent(TrayCommand::SetState(state)) => {
                if let Err(e) = tray_manager.update_state(state) {
                    error!(error = ?e, "Failed to update tray icon");
                }
            }
            Event::UserEvent(TrayCommand::Shutdown) => {
                *control_flow = ControlFlow::ExitWithCode(0);
            }
            Event::NewEvents(StartCause::Init) => {
                match launch(&tray_manager, tray_proxy.clone()) {
                    Ok(manager) => hotkey_manager = Some(manager),
                    Err(e) => {
                        error!(error = ?e, "Failed to start recast");
                        std::process::exit(1);
                    }
                }
            }
            _ => {}
        }

        // Keep the hotkey manager and log writer alive for the app's lifetime.
        let _ = (&hotkey_manager, &log_guard);
    });
}

/// Load config, register hotkeys on this (main) thread and start the async
/// runtime thread that runs [`App`].
#[instrument(skip_all)]
fn launch(
    tray_manager: &TrayManager,
    tray_proxy: EventLoopProxy<TrayCommand>,
) -> AppResult<GlobalHotKeyManager> {
    let config = Config::load()?;
    let output_handler = Arc::new(Mutex::new(OutputHandler::new()?));

    let backend: Arc<dyn CaptureBackend> =
        Arc::new(SystemBackend::new().with_video_codec(config.output.video_codec.clone()));
    let coordinator = Arc::new(Mutex::new(RecordingCoordinator::new(Arc::clone(&backend))));

    #[cfg(target_os = "macos")]
    unsafe {
        use core_foundation::runloop::{CFRunLoopGetMain, CFRunLoopWakeUp};
        CFRunLoopWakeUp(CFRunLoopGetMain());
    }

    // tao's event loop pumps the Windows messages WM_HOTKEY needs.
    let bindings = HotkeyBindings::default();
    let hotkey_manager = HotkeyHandler::register_hotkeys(&bindings)?;

    let (command_tx, command_rx) = mpsc::channel(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        output_dir = ?config.output.directory,
        countdown_seconds = config.behavior.countdown_seconds,
        "Configuration ready"
    );

    let app = App {
        coordinator,
        backend,
        output_handler,
        tray_proxy,
        config,
        command_tx: command_tx.clone(),
        command_rx,
        shutdown_tx,
        open_folder_menu_id: tray_manager.open_folder_item_id().clone(),
        exit_menu_id: tray_manager.exit_item_id().clone(),
        session_id: None,
        exit_pending: false,
    };
    let hotkey_handler = HotkeyHandler::new(bindings, command_tx);

    let _runtime_thread = std::thread::Builder::new()
        .name("recast-runtime".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = ?e, "Failed to create tokio runtime");
                    std::process::exit(1);
                }
            };

            rt.block_on(async {
                tokio::join!(
                    async {
                        if let Err(e) = hotkey_handler.run(shutdown_rx).await {
                            error!(error = ?e, "Hotkey handler error");
                        }
                    },
                    async {
                        if let Err(e) = app.run().await {
                            error!(error = ?e, "App error");
                        }
                    }
                );
            });
        })?;

    Ok(hotkey_manager)
}
