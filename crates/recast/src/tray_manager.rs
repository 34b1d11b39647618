//! System tray icon with state-based updates.
//!
//! Manages a system tray icon that follows the recording lifecycle and a
//! context menu for opening the recordings folder and exiting.

use crate::{AppError, AppResult, TrayIconState};

use std::panic::Location;

use error_location::ErrorLocation;
use image::{Rgba, RgbaImage};
use tracing::{info, instrument};
use tray_icon::menu::{Menu, MenuId, MenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

/// Edge length of the generated tray icons.
pub(crate) const ICON_SIZE: u32 = 32;

const DISC_RADIUS: f32 = 13.0;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// System tray icon manager.
pub struct TrayManager {
    tray_icon: TrayIcon,
    open_folder_item_id: MenuId,
    exit_item_id: MenuId,
}

impl TrayManager {
    /// Create a new tray manager in the idle state.
    #[track_caller]
    #[instrument]
    pub fn new() -> AppResult<Self> {
        let menu = Menu::new();

        let open_folder_item = MenuItem::new("Open recordings folder", true, None);
        let exit_item = MenuItem::new("Exit", true, None);

        let open_folder_id = open_folder_item.id().clone();
        let exit_id = exit_item.id().clone();

        menu.append(&open_folder_item)
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to add open folder menu: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        menu.append(&exit_item).map_err(|e| AppError::TrayError {
            reason: format!("Failed to add exit menu: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let state = TrayIconState::Idle;
        let tray_icon = TrayIconBuilder::new()
            .with_tooltip(state.tooltip())
            .with_menu(Box::new(menu))
            .with_icon(Self::load_icon(state)?)
            .build()
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to create tray icon: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("System tray icon initialized");

        Ok(Self {
            tray_icon,
            open_folder_item_id: open_folder_id,
            exit_item_id: exit_id,
        })
    }

    /// Update the tray icon state with new icon and tooltip.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn update_state(&mut self, state: TrayIconState) -> AppResult<()> {
        self.tray_icon
            .set_icon(Some(Self::load_icon(state)?))
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to update icon: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        self.tray_icon
            .set_tooltip(Some(state.tooltip()))
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to update tooltip: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        Ok(())
    }

    /// Get the "Open recordings folder" menu item ID.
    pub fn open_folder_item_id(&self) -> &MenuId {
        &self.open_folder_item_id
    }

    /// Get the exit menu item ID.
    pub fn exit_item_id(&self) -> &MenuId {
        &self.exit_item_id
    }

    #[track_caller]
    fn load_icon(state: TrayIconState) -> AppResult<Icon> {
        let rgba = render_icon(state);
        let (width, height) = (rgba.width(), rgba.height());

        Icon::from_rgba(rgba.into_raw(), width, height).map_err(|e| AppError::TrayError {
            reason: format!("Failed to create icon from RGBA: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

/// Draw the tray icon for `state`: a coloured disc, with pause bars when paused.
pub(crate) fn render_icon(state: TrayIconState) -> RgbaImage {
    let fill = match state {
        TrayIconState::Idle => Rgba([128, 128, 128, 255]),
        TrayIconState::Countdown { .. } => Rgba([245, 166, 35, 255]),
        TrayIconState::Recording | TrayIconState::Paused => Rgba([220, 38, 38, 255]),
        TrayIconState::Saving => Rgba([37, 99, 235, 255]),
    };
    let centre = (ICON_SIZE as f32 - 1.0) / 2.0;

    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        let dx = x as f32 - centre;
        let dy = y as f32 - centre;
        if dx.hypot(dy) > DISC_RADIUS {
            return TRANSPARENT;
        }

        let in_bar = (11..=13).contains(&x) || (18..=20).contains(&x);
        if state == TrayIconState::Paused && in_bar && (9..=22).contains(&y) {
            WHITE
        } else {
            fill
        }
    })
}
