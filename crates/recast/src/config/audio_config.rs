use crate::config::{default_channels, default_sample_rate, default_true};

use serde::{Deserialize, Serialize};

/// Microphone recording configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Record the default microphone alongside the screen.
    #[serde(default = "default_true")]
    pub microphone: bool,

    /// WAV sample rate in Hz. Device audio is resampled to this.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// WAV channel count (1 or 2).
    #[serde(default = "default_channels")]
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            microphone: true,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}
