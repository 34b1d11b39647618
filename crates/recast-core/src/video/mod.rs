pub mod overlay;
mod pacer;
mod recorder;

pub use {
    pacer::FramePacer,
    recorder::{FrameBuffer, VideoCaptureLoop, VideoEvent, VideoLoopConfig},
};
