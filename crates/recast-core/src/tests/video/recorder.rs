use crate::{
    CaptureBackend, CaptureRegion, CaptureTarget, VideoCaptureLoop, VideoEvent, VideoLoopConfig,
    overlay::CURSOR_COLOR,
    tests::support::{FakeBackend, SCREEN_FILL, pixel, wait_until},
};

use std::{
    path::PathBuf,
    sync::Arc,
    thread::sleep,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, unbounded};
use uuid::Uuid;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn config(fps: f64) -> VideoLoopConfig {
    VideoLoopConfig {
        session_id: Uuid::new_v4(),
        output: PathBuf::from("video.mp4"),
        target: CaptureTarget::Region(CaptureRegion::new(0, 0, 320, 240)),
        fps,
        cursor: false,
        webcam: false,
        catch_up_limit: None,
    }
}

fn spawn(backend: &Arc<FakeBackend>, config: VideoLoopConfig) -> (VideoCaptureLoop, Receiver<VideoEvent>) {
    let (tx, rx) = unbounded();
    let dyn_backend: Arc<dyn CaptureBackend> = backend.clone();
    let video = VideoCaptureLoop::spawn(dyn_backend, config, tx).unwrap();
    (video, rx)
}

fn expect_setup(rx: &Receiver<VideoEvent>) -> (u32, u32) {
    match rx.recv_timeout(EVENT_TIMEOUT).unwrap() {
        VideoEvent::SetupReady { width, height, .. } => (width, height),
        other => panic!("expected SetupReady, got {other:?}"),
    }
}

/// Collect events until `Finished`, returning everything seen.
fn until_finished(rx: &Receiver<VideoEvent>) -> Vec<VideoEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv_timeout(EVENT_TIMEOUT).unwrap();
        let done = matches!(event, VideoEvent::Finished { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

fn finished_frames(events: &[VideoEvent]) -> (u64, bool) {
    match events.last() {
        Some(VideoEvent::Finished {
            frames_written,
            sink_opened,
            ..
        }) => (*frames_written, *sink_opened),
        other => panic!("expected Finished last, got {other:?}"),
    }
}

/// WHAT: Setup reports the even frame size and waits for the begin flag
/// WHY: The countdown runs between setup and capture; no frames before it ends
#[test]
fn given_spawned_loop_when_not_begun_then_setup_ready_and_no_frames() {
    // Given: A loop over an odd-sized region
    let backend = Arc::new(FakeBackend::new());
    let mut cfg = config(30.0);
    cfg.target = CaptureTarget::Region(CaptureRegion::new(0, 0, 321, 241));
    let session_id = cfg.session_id;
    let (video, rx) = spawn(&backend, cfg);

    // When: Setup completes and we wait a little without beginning
    let size = expect_setup(&rx);
    sleep(Duration::from_millis(100));

    // Then: The sink was opened at the even size and nothing was written
    assert_eq!(size, (320, 240));
    let (path, width, height, _) = backend.video_opened().unwrap();
    assert_eq!((path, width, height), (PathBuf::from("video.mp4"), 320, 240));
    assert_eq!(video.frames_written(), 0);

    // When: Stopped before begin
    video.request_stop();
    let events = until_finished(&rx);

    // Then: Finished with zero frames, sink released, events carry the session id
    assert_eq!(finished_frames(&events), (0, true));
    assert!(backend.video_finished());
    assert!(events.iter().all(|e| e.session_id() == session_id));
}

/// WHAT: A sink that cannot be opened ends the loop with Error then Finished
/// WHY: Setup failure must prevent the countdown from ever starting
#[test]
fn given_failing_sink_when_spawned_then_error_then_finished_without_setup() {
    // Given: A backend whose video sink fails to open
    let mut fake = FakeBackend::new();
    fake.fail_sink_open = true;
    let backend = Arc::new(fake);

    // When: Spawning the loop
    let (_video, rx) = spawn(&backend, config(30.0));
    let events = until_finished(&rx);

    // Then: Error followed by Finished with no sink; no SetupReady
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], VideoEvent::Error { message, .. } if message.contains("scripted failure")));
    assert_eq!(finished_frames(&events), (0, false));
}

/// WHAT: A non-positive frame rate is rejected at setup
/// WHY: The pacer divides by the frame rate
#[test]
fn given_zero_fps_when_spawned_then_error_before_sink_opened() {
    let backend = Arc::new(FakeBackend::new());

    let (_video, rx) = spawn(&backend, config(0.0));
    let events = until_finished(&rx);

    assert!(matches!(&events[0], VideoEvent::Error { .. }));
    assert_eq!(finished_frames(&events), (0, false));
    assert!(backend.video_opened().is_none());
}

/// WHAT: request_stop returns immediately and completion arrives as an event
/// WHY: The UI thread must never block on the video loop
#[test]
fn given_running_loop_when_stop_requested_then_returns_immediately() {
    // Given: A loop capturing at 30 fps
    let backend = Arc::new(FakeBackend::new());
    let (video, rx) = spawn(&backend, config(30.0));
    expect_setup(&rx);
    video.begin_capture();
    assert!(wait_until(EVENT_TIMEOUT, || video.frames_written() > 0));

    // When: Requesting stop
    let started = Instant::now();
    video.request_stop();
    let elapsed = started.elapsed();

    // Then: The call did not wait and Finished follows
    assert!(elapsed < Duration::from_millis(5), "request_stop took {elapsed:?}");
    let events = until_finished(&rx);
    let (frames, sink_opened) = finished_frames(&events);
    assert!(sink_opened);
    assert_eq!(frames, backend.video_frames());
    assert!(backend.video_finished());
}

/// WHAT: Frame count tracks wall time at the target rate
/// WHY: Video duration must equal recording duration
#[test]
fn given_fast_capture_when_run_for_one_second_then_frames_match_rate() {
    // Given: A 20 fps loop with instant capture
    let backend = Arc::new(FakeBackend::new());
    let (mut video, rx) = spawn(&backend, config(20.0));
    expect_setup(&rx);

    // When: Capturing for one second
    video.begin_capture();
    sleep(Duration::from_millis(1000));
    video.request_stop();
    let events = until_finished(&rx);
    video.join();

    // Then: About 20 frames were written
    let (frames, _) = finished_frames(&events);
    assert!((19..=22).contains(&frames), "wrote {frames} frames");
    assert!(video.is_finished());
}

/// WHAT: A slow capture is compensated by duplicate writes
/// WHY: Stalls must not shorten the video
#[test]
fn given_capture_slower_than_frame_period_when_running_then_frames_duplicated() {
    // Given: A 20 fps loop whose capture takes 120 ms (2.4 periods)
    let backend = Arc::new(FakeBackend::new().with_capture_delay(Duration::from_millis(120)));
    let (video, rx) = spawn(&backend, config(20.0));
    expect_setup(&rx);

    // When: Capturing for one second
    video.begin_capture();
    sleep(Duration::from_millis(1000));
    video.request_stop();
    let events = until_finished(&rx);

    // Then: Frame count still follows wall time, with fewer grabs than frames
    let (frames, _) = finished_frames(&events);
    assert!((17..=26).contains(&frames), "wrote {frames} frames");
    assert!(backend.captures() < frames, "{} grabs for {frames} frames", backend.captures());
}

/// WHAT: A catch-up limit bounds duplicate writes per stall
/// WHY: Long freezes must not produce bursts of identical frames
#[test]
fn given_catch_up_limit_when_capture_stalls_then_one_write_per_grab() {
    // Given: A 20 fps loop with 150 ms captures and a limit of one copy
    let backend = Arc::new(FakeBackend::new().with_capture_delay(Duration::from_millis(150)));
    let mut cfg = config(20.0);
    cfg.catch_up_limit = Some(1);
    let (video, rx) = spawn(&backend, cfg);
    expect_setup(&rx);

    // When: Capturing for one second
    video.begin_capture();
    sleep(Duration::from_millis(1000));
    video.request_stop();
    let events = until_finished(&rx);

    // Then: Every frame corresponds to a grab, well short of wall-time count
    let (frames, _) = finished_frames(&events);
    assert_eq!(frames, backend.captures());
    assert!(frames <= 10, "wrote {frames} frames");
}

/// WHAT: Pausing stops frames from accruing
/// WHY: Paused time must not appear in the video
#[test]
fn given_pause_mid_recording_when_resumed_then_paused_span_excluded() {
    // Given: A 20 fps loop
    let backend = Arc::new(FakeBackend::new());
    let (video, rx) = spawn(&backend, config(20.0));
    expect_setup(&rx);
    video.begin_capture();

    // When: 500 ms live, 600 ms paused, 500 ms live
    sleep(Duration::from_millis(500));
    video.set_paused(true);
    sleep(Duration::from_millis(50));
    let at_pause = video.frames_written();
    sleep(Duration::from_millis(550));
    let during_pause = video.frames_written();
    video.set_paused(false);
    sleep(Duration::from_millis(500));
    video.request_stop();
    let events = until_finished(&rx);

    // Then: Nothing was written while paused and the total covers ~1 s
    assert_eq!(at_pause, during_pause);
    let (frames, _) = finished_frames(&events);
    assert!((19..=24).contains(&frames), "wrote {frames} frames");
}

/// WHAT: An unavailable webcam disables the overlay, not the recording
/// WHY: Webcam failure is a recoverable device error
#[test]
fn given_webcam_unavailable_when_recording_then_frames_without_error() {
    // Given: Webcam requested but not attached
    let backend = Arc::new(FakeBackend::new().with_webcam(false));
    let mut cfg = config(20.0);
    cfg.webcam = true;
    let (video, rx) = spawn(&backend, cfg);
    expect_setup(&rx);

    // When: Recording briefly
    video.begin_capture();
    sleep(Duration::from_millis(300));
    video.request_stop();
    let events = until_finished(&rx);

    // Then: Frames were written and no Error was reported
    assert!(events.iter().all(|e| !matches!(e, VideoEvent::Error { .. })));
    assert!(finished_frames(&events).0 > 0);
}

/// WHAT: Cursor and webcam overlays appear in written frames
/// WHY: Both overlays are composited before the RGB conversion
#[test]
fn given_cursor_and_webcam_when_recording_then_overlays_in_frame() {
    // Given: Cursor at desktop (60, 40) and a webcam, region at the origin
    let backend = Arc::new(
        FakeBackend::new()
            .with_cursor(60, 40)
            .with_webcam(true),
    );
    let mut cfg = config(20.0);
    cfg.cursor = true;
    cfg.webcam = true;
    let (video, rx) = spawn(&backend, cfg);
    expect_setup(&rx);

    // When: One frame has been written
    video.begin_capture();
    assert!(wait_until(EVENT_TIMEOUT, || backend.video_frames() > 0));
    video.request_stop();
    until_finished(&rx);

    // Then: The ring and the green thumbnail are visible
    let frame = backend.last_frame().unwrap();
    let red = pixel(&frame, 65, 40);
    assert_eq!([red[0], red[1], red[2]], [CURSOR_COLOR[0], CURSOR_COLOR[1], CURSOR_COLOR[2]]);
    let background = pixel(&frame, 10, 10);
    assert_eq!(background[0], SCREEN_FILL[0]);
    let thumb = pixel(&frame, 320 - 20 - 32, 240 - 20 - 24);
    assert!(thumb[1] > 150, "thumbnail pixel {thumb:?}");
}

/// WHAT: Grabs at an unexpected size are resized before writing
/// WHY: The sink has fixed dimensions
#[test]
fn given_grab_size_mismatch_when_recording_then_frames_resized() {
    let mut fake = FakeBackend::new();
    fake.grab_size = Some((640, 480));
    let backend = Arc::new(fake);
    let (video, rx) = spawn(&backend, config(20.0));
    expect_setup(&rx);

    video.begin_capture();
    assert!(wait_until(EVENT_TIMEOUT, || backend.video_frames() > 0));
    video.request_stop();
    let events = until_finished(&rx);

    assert!(events.iter().all(|e| !matches!(e, VideoEvent::Error { .. })));
    assert_eq!(backend.last_frame().unwrap().dimensions(), (320, 240));
}

/// WHAT: A panic in the loop body is reported and the sink still closed
/// WHY: Partial output must be kept, never lost to a crash
#[test]
fn given_capture_panics_when_recording_then_error_and_sink_finished() {
    // Given: A screen that panics on its third grab
    let mut fake = FakeBackend::new();
    fake.panic_on_capture = Some(3);
    let backend = Arc::new(fake);
    let (video, rx) = spawn(&backend, config(20.0));
    expect_setup(&rx);

    // When: Capturing until the loop dies
    video.begin_capture();
    let events = until_finished(&rx);

    // Then: Error mentions the panic, earlier frames survive, the sink was finished
    assert!(events.iter().any(
        |e| matches!(e, VideoEvent::Error { message, .. } if message.contains("scripted capture panic"))
    ));
    let (frames, sink_opened) = finished_frames(&events);
    assert!(sink_opened);
    assert!(frames >= 2, "wrote {frames} frames");
    assert_eq!(frames, backend.video_frames());
    assert!(backend.video_finished());
}
