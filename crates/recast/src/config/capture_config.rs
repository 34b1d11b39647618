use crate::config::default_true;

use recast_core::{CaptureRegion, CaptureTarget};

use serde::{Deserialize, Serialize};

/// Area of the desktop to record, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetConfig {
    /// The first monitor.
    Primary,
    /// A monitor by enumeration index.
    Monitor {
        /// Zero-based monitor index.
        index: usize,
    },
    /// A fixed rectangle in desktop coordinates.
    Region {
        /// Left edge.
        x: i32,
        /// Top edge.
        y: i32,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Every monitor at once.
    All,
}

impl TargetConfig {
    /// Core capture target for this selection.
    pub fn to_target(self) -> CaptureTarget {
        match self {
            TargetConfig::Primary => CaptureTarget::Monitor(0),
            TargetConfig::Monitor { index } => CaptureTarget::Monitor(index),
            TargetConfig::Region {
                x,
                y,
                width,
                height,
            } => CaptureTarget::Region(CaptureRegion::new(x, y, width, height)),
            TargetConfig::All => CaptureTarget::AllScreens,
        }
    }
}

/// Screen recording configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// What to record.
    #[serde(default = "default_target")]
    pub target: TargetConfig,

    /// Frames per second. The display refresh rate is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    /// Draw a marker where the cursor is.
    #[serde(default = "default_true")]
    pub cursor: bool,

    /// Overlay the default webcam in the bottom-right corner.
    #[serde(default)]
    pub webcam: bool,

    /// Most duplicate frames written after one stall. 0 means uncapped.
    #[serde(default)]
    pub catch_up_limit: u32,
}

fn default_target() -> TargetConfig {
    TargetConfig::Primary
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            fps: None,
            cursor: true,
            webcam: false,
            catch_up_limit: 0,
        }
    }
}
