use crate::{CaptureError, CoreResult, backend::CursorProbe};

use std::panic::Location;

use enigo::{Enigo, Mouse, Settings};
use error_location::ErrorLocation;

/// Cursor position read through enigo.
pub struct EnigoCursor {
    enigo: Enigo,
}

impl EnigoCursor {
    #[track_caller]
    pub fn new() -> CoreResult<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| CaptureError::DeviceError {
            reason: format!("Failed to create cursor probe: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(Self { enigo })
    }
}

impl CursorProbe for EnigoCursor {
    #[track_caller]
    fn position(&mut self) -> CoreResult<(i32, i32)> {
        self.enigo
            .location()
            .map_err(|e| CaptureError::DeviceError {
                reason: format!("Failed to read cursor position: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}
