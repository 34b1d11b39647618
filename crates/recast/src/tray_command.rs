use crate::TrayIconState;

/// Requests from the runtime thread to the UI thread.
///
/// `TrayIcon` is `!Send`, so the main thread owns the tray and applies
/// these as tao user events.
#[derive(Debug, Clone, Copy)]
pub enum TrayCommand {
    /// Show `state` in the tray.
    SetState(TrayIconState),
    /// Leave the event loop and exit.
    Shutdown,
}
