use crate::{
    CaptureError, CoreResult,
    audio::{SampleBlock, SampleProducer},
    backend::{AudioInput, InputFormat},
};

use std::{
    panic::Location,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use error_location::ErrorLocation;
use tracing::{error, info, instrument};

/// Default input device via CPAL.
///
/// The driver callback only enqueues blocks; it never touches the sink.
pub struct CpalMicrophone {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Set before the stream is dropped so a late callback does not enqueue.
    shutdown: Arc<AtomicBool>,
}

impl CpalMicrophone {
    #[track_caller]
    #[instrument]
    pub fn new() -> CoreResult<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoMicrophoneFound {
                location: ErrorLocation::from(Location::caller()),
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceError {
                reason: format!("Failed to get input config: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!(
            device_id = ?device.id(),
            sample_rate = config.sample_rate(),
            channels = config.channels(),
            sample_format = ?config.sample_format(),
            "Microphone initialized"
        );

        Ok(Self {
            device,
            sample_format: config.sample_format(),
            config: config.into(),
            stream: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl AudioInput for CpalMicrophone {
    #[track_caller]
    #[instrument(skip(self, producer))]
    fn start(&mut self, producer: SampleProducer) -> CoreResult<InputFormat> {
        let shutdown = Arc::clone(&self.shutdown);
        let channels = self.config.channels;
        let sample_rate = self.config.sample_rate;

        self.shutdown.store(false, Ordering::Release);

        let (device, config) = (&self.device, &self.config);
        let stream = match self.sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, config, producer, shutdown),
            SampleFormat::I16 => build_stream::<i16>(device, config, producer, shutdown),
            SampleFormat::U16 => build_stream::<u16>(device, config, producer, shutdown),
            SampleFormat::I32 => build_stream::<i32>(device, config, producer, shutdown),
            other => {
                return Err(CaptureError::DeviceError {
                    reason: format!("Unsupported sample format: {:?}", other),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
        .map_err(|e| CaptureError::DeviceError {
            reason: format!("Failed to build input stream: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        stream.play().map_err(|e| CaptureError::DeviceError {
            reason: format!("Failed to start input stream: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        self.stream = Some(stream);
        info!(sample_rate, channels, "Microphone capture started");

        Ok(InputFormat {
            sample_rate,
            channels,
        })
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    producer: SampleProducer,
    shutdown: Arc<AtomicBool>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let sample_rate = config.sample_rate;

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            producer.push(SampleBlock::new(to_f32_samples(data), channels, sample_rate));
        },
        |err| {
            error!("Audio stream error: {}", err);
        },
        None,
    )
}

/// Convert device samples to normalized `f32`.
pub(crate) fn to_f32_samples<T>(data: &[T]) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    data.iter().map(|&s| f32::from_sample(s)).collect()
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        if self.stream.take().is_some() {
            info!("Microphone capture stopped");
        }
    }
}
