mod audio_config;
mod behaviour_config;
mod capture_config;
#[allow(clippy::module_inception)]
mod config;
mod output_config;

pub(crate) use {
    audio_config::AudioConfig,
    behaviour_config::BehaviourConfig,
    capture_config::{CaptureConfig, TargetConfig},
    config::Config,
    output_config::OutputConfig,
};

pub(crate) const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub(crate) const DEFAULT_CHANNELS: u16 = 1;
pub(crate) const DEFAULT_VIDEO_CODEC: &str = "mpeg4";
pub(crate) const DEFAULT_COUNTDOWN_SECONDS: u32 = 3;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

pub(crate) fn default_channels() -> u16 {
    DEFAULT_CHANNELS
}

pub(crate) fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}

pub(crate) fn default_countdown_seconds() -> u32 {
    DEFAULT_COUNTDOWN_SECONDS
}
