use crate::{
    AudioCaptureLoop, AudioLoopConfig, CaptureBackend, CaptureError, SampleBlock,
    audio::recorder::remix,
    tests::support::{FakeBackend, MicMode},
};

use std::{path::Path, sync::Arc, thread::sleep, time::Duration};

use hound::WavReader;
use tempfile::tempdir;
use uuid::Uuid;

const SETTLE: Duration = Duration::from_millis(200);

fn config(output: &Path, sample_rate: u32, channels: u16) -> AudioLoopConfig {
    AudioLoopConfig {
        session_id: Uuid::new_v4(),
        output: output.to_path_buf(),
        sample_rate,
        channels,
    }
}

fn manual_backend(sample_rate: u32, channels: u16) -> Arc<FakeBackend> {
    Arc::new(FakeBackend::new().with_mic(MicMode::Manual {
        sample_rate,
        channels,
    }))
}

/// WHAT: Stereo is downmixed to mono by averaging
/// WHY: The default sink is mono and must not drop one channel
#[test]
fn given_stereo_frames_when_remixed_to_mono_then_channels_averaged() {
    let mixed = remix(&[0.2, 0.4, -1.0, 1.0], 2, 1);

    assert_eq!(mixed.len(), 2);
    assert!((mixed[0] - 0.3).abs() < 1e-6);
    assert!(mixed[1].abs() < 1e-6);
}

/// WHAT: Mono is replicated to every output channel
/// WHY: A stereo sink fed from a mono mic must be centred
#[test]
fn given_mono_frames_when_remixed_to_stereo_then_replicated() {
    assert_eq!(remix(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
}

/// WHAT: Matching layouts pass through
/// WHY: The common case should not reshuffle samples
#[test]
fn given_same_channel_count_when_remixed_then_unchanged() {
    assert_eq!(remix(&[0.1, 0.2, 0.3, 0.4], 2, 2), vec![0.1, 0.2, 0.3, 0.4]);
}

/// WHAT: Blocks dequeued while paused never reach the file
/// WHY: The paused interval must contain zero samples
#[test]
fn given_paused_loop_when_blocks_arrive_then_discarded() {
    // Given: A started loop with a test-driven microphone
    let dir = tempdir().unwrap();
    let path = dir.path().join("paused.wav");
    let backend = manual_backend(44_100, 1);
    let mut audio = AudioCaptureLoop::new(config(&path, 44_100, 1));
    audio.start(backend.clone()).unwrap();
    let producer = backend.mic_producer().unwrap();

    // When: 2 blocks arrive live, 3 while paused, 1 after resume
    for _ in 0..2 {
        producer.push(SampleBlock::new(vec![0.5; 441], 1, 44_100));
    }
    sleep(SETTLE);
    audio.set_paused(true);
    for _ in 0..3 {
        producer.push(SampleBlock::new(vec![0.9; 441], 1, 44_100));
    }
    sleep(SETTLE);
    audio.set_paused(false);
    producer.push(SampleBlock::new(vec![0.5; 441], 1, 44_100));
    sleep(SETTLE);
    let summary = audio.stop().unwrap();

    // Then: Only the 3 unpaused blocks were written
    assert_eq!(summary.blocks_written, 3);
    assert_eq!(summary.blocks_discarded, 3);
    assert_eq!(summary.frames_written, 3 * 441);

    let mut reader = WavReader::open(&path).unwrap();
    assert_eq!(reader.duration(), 3 * 441);
    let loud = reader
        .samples::<i16>()
        .map(|s| s.unwrap())
        .filter(|&s| s > 20_000)
        .count();
    assert_eq!(loud, 0, "paused samples leaked into the file");
}

/// WHAT: Stop returns only after the file is finalized, with queued blocks drained
/// WHY: Callers read or move the WAV right after stop
#[test]
fn given_queued_blocks_when_stopping_then_file_complete_on_return() {
    // Given: A started loop and ten blocks pushed just before stop
    let dir = tempdir().unwrap();
    let path = dir.path().join("drain.wav");
    let backend = manual_backend(48_000, 1);
    let mut audio = AudioCaptureLoop::new(config(&path, 48_000, 1));
    audio.start(backend.clone()).unwrap();
    let producer = backend.mic_producer().unwrap();
    for _ in 0..10 {
        producer.push(SampleBlock::new(vec![0.1; 480], 1, 48_000));
    }

    // When: Stopping immediately
    let summary = audio.stop().unwrap();

    // Then: Every block is in a readable file
    assert_eq!(summary.blocks_written, 10);
    assert!(!audio.is_started());
    let reader = WavReader::open(&path).unwrap();
    assert_eq!(reader.duration(), 4_800);
}

/// WHAT: A device rate different from the sink rate is resampled
/// WHY: The WAV header rate must describe the samples it holds
#[test]
fn given_stereo_48k_input_when_written_to_mono_44k1_sink_then_resampled() {
    // Given: A stereo 48 kHz microphone and a mono 44.1 kHz sink
    let dir = tempdir().unwrap();
    let path = dir.path().join("resampled.wav");
    let backend = manual_backend(48_000, 2);
    let mut audio = AudioCaptureLoop::new(config(&path, 44_100, 1));
    audio.start(backend.clone()).unwrap();
    let producer = backend.mic_producer().unwrap();

    // When: One second of audio arrives in 10 ms blocks
    for _ in 0..100 {
        producer.push(SampleBlock::new(vec![0.2; 960], 2, 48_000));
    }
    audio.stop().unwrap();

    // Then: The file holds about one second at 44.1 kHz mono
    let reader = WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 1);
    let seconds = f64::from(reader.duration()) / 44_100.0;
    assert!((seconds - 1.0).abs() < 0.02, "duration {seconds}");
}

/// WHAT: A missing microphone fails start and leaves no file
/// WHY: The microphone is opened before the sink
#[test]
fn given_no_microphone_when_starting_then_error_and_no_file() {
    // Given: A backend without a microphone
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.wav");
    let backend: Arc<dyn CaptureBackend> = Arc::new(FakeBackend::new());
    let mut audio = AudioCaptureLoop::new(config(&path, 44_100, 1));

    // When: Starting
    let result = audio.start(backend);

    // Then: NoMicrophoneFound, nothing on disk, stop is a no-op
    assert!(matches!(result, Err(CaptureError::NoMicrophoneFound { .. })));
    assert!(!path.exists());
    assert!(!audio.is_started());
    assert_eq!(audio.stop().unwrap().blocks_written, 0);
}

/// WHAT: A microphone that opens after the start timeout leaves no file
/// WHY: The caller was told audio failed, so nothing may appear on disk later
#[test]
fn given_slow_microphone_when_start_times_out_then_no_file_left_behind() {
    // Given: A microphone that takes longer to open than start waits
    let dir = tempdir().unwrap();
    let path = dir.path().join("late.wav");
    let backend: Arc<dyn CaptureBackend> = Arc::new(
        FakeBackend::new()
            .with_mic(MicMode::Realtime {
                sample_rate: 44_100,
                channels: 1,
            })
            .with_mic_open_delay(Duration::from_millis(300)),
    );
    let mut audio =
        AudioCaptureLoop::new(config(&path, 44_100, 1)).with_start_timeout(Duration::from_millis(50));

    // When: Starting, then waiting well past the device delay
    let result = audio.start(backend);
    sleep(Duration::from_millis(600));

    // Then: DeviceError, and the late writer created nothing
    assert!(matches!(result, Err(CaptureError::DeviceError { .. })));
    assert!(!audio.is_started());
    assert!(!path.exists());
    assert_eq!(audio.stop().unwrap().blocks_written, 0);
}

/// WHAT: Starting twice is rejected
/// WHY: A second writer thread would race on the same file
#[test]
fn given_started_loop_when_starting_again_then_invalid_transition() {
    let dir = tempdir().unwrap();
    let backend = manual_backend(44_100, 1);
    let mut audio = AudioCaptureLoop::new(config(&dir.path().join("twice.wav"), 44_100, 1));
    audio.start(backend.clone()).unwrap();

    let result = audio.start(backend);

    assert!(matches!(result, Err(CaptureError::InvalidTransition { .. })));
    audio.stop().unwrap();
}
