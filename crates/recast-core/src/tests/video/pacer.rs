use crate::FramePacer;

use std::time::{Duration, Instant};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Run an ideal loop (instant capture) from `from` to `to` in 1 ms steps.
fn run_ideal(pacer: &mut FramePacer, from: Instant, to: Instant) {
    let mut now = from;
    while now <= to {
        let due = pacer.frames_due(now);
        pacer.record_written(due);
        now += ms(1);
    }
}

/// WHAT: The first iteration writes frame zero
/// WHY: Recording must start with a frame, not wait a full period
#[test]
fn given_fresh_pacer_when_checking_at_start_then_one_frame_due() {
    // Given: A pacer started now
    let start = Instant::now();
    let pacer = FramePacer::new(10.0, start);

    // When / Then: Exactly one frame is due at the start instant
    assert_eq!(pacer.frames_due(start), 1);
}

/// WHAT: Frames written track floor(T x F) within one frame
/// WHY: Video duration must match real elapsed time
#[test]
fn given_steady_loop_when_time_elapses_then_frame_count_tracks_wall_clock() {
    for fps in [10.0, 24.0, 30.0, 60.0] {
        // Given: A pacer driven by an instant-capture loop for 2 seconds
        let start = Instant::now();
        let mut pacer = FramePacer::new(fps, start);
        let end = start + ms(2000);

        // When: The loop runs to the end instant
        run_ideal(&mut pacer, start, end);

        // Then: Written count is floor(T x F) + 1
        let expected = (2.0 * fps).floor() as u64;
        let written = pacer.frames_written();
        assert!(
            written.abs_diff(expected) <= 1,
            "fps {fps}: wrote {written}, expected about {expected}"
        );
    }
}

/// WHAT: Once caught up, nothing is due until the next frame boundary
/// WHY: The loop must sleep when ahead instead of writing extra frames
#[test]
fn given_caught_up_pacer_when_before_next_boundary_then_zero_due() {
    // Given: A 10 fps pacer that has written frame zero
    let start = Instant::now();
    let mut pacer = FramePacer::new(10.0, start);
    pacer.record_written(pacer.frames_due(start));

    // When / Then: Nothing is due 50 ms in, one frame is due at 100 ms
    assert_eq!(pacer.frames_due(start + ms(50)), 0);
    assert_eq!(pacer.until_next_frame(start + ms(50)), ms(50));
    assert_eq!(pacer.frames_due(start + ms(100)), 1);
}

/// WHAT: A pause does not accrue frames
/// WHY: The paused span must not appear in the video
#[test]
fn given_paused_interval_when_resumed_then_no_frames_accrue() {
    // Given: A 10 fps pacer that ran for 1 second
    let start = Instant::now();
    let mut pacer = FramePacer::new(10.0, start);
    run_ideal(&mut pacer, start, start + ms(1000));
    let at_pause = pacer.frames_written();

    // When: Paused for 3 seconds, then resumed
    pacer.pause(start + ms(1000));
    assert_eq!(pacer.frames_due(start + ms(2500)), 0);
    let span = pacer.resume(start + ms(4000));

    // Then: The virtual start moved by the pause and nothing new is due
    assert_eq!(span, ms(3000));
    assert_eq!(pacer.virtual_start(), start + ms(3000));
    assert_eq!(pacer.frames_due(start + ms(4000)), 0);
    assert_eq!(pacer.frames_written(), at_pause);
}

/// WHAT: Repeated pause calls keep the first pause instant
/// WHY: The video loop calls pause on every paused iteration
#[test]
fn given_repeated_pause_calls_when_resumed_then_span_measured_from_first() {
    // Given: A pacer paused at 1 s and again at 1.5 s
    let start = Instant::now();
    let mut pacer = FramePacer::new(30.0, start);
    pacer.pause(start + ms(1000));
    pacer.pause(start + ms(1500));

    // When: Resumed at 2 s
    let span = pacer.resume(start + ms(2000));

    // Then: The span covers the whole pause
    assert_eq!(span, ms(1000));
}

/// WHAT: A slow capture makes several frames due at once
/// WHY: Duplicate writes keep the video as long as real time
#[test]
fn given_stalled_capture_when_checking_then_multiple_frames_due() {
    // Given: A 10 fps pacer that wrote frame zero and then stalled 350 ms
    let start = Instant::now();
    let mut pacer = FramePacer::new(10.0, start);
    pacer.record_written(pacer.frames_due(start));

    // When: Checking after the stall
    let due = pacer.frames_due(start + ms(350));

    // Then: Frames 1, 2 and 3 are all due
    assert_eq!(due, 3);
    pacer.record_written(due);
    assert_eq!(pacer.frames_due(start + ms(350)), 0);
}

/// WHAT: Skipped frames are not retried on the next iteration
/// WHY: A capped catch-up must move the schedule forward, not fall further behind
#[test]
fn given_capped_catch_up_when_frames_skipped_then_next_iteration_not_behind() {
    // Given: A 10 fps pacer that stalled for 1 second after frame zero
    let start = Instant::now();
    let mut pacer = FramePacer::new(10.0, start);
    pacer.record_written(pacer.frames_due(start));
    let now = start + ms(1000);
    let due = pacer.frames_due(now);
    assert_eq!(due, 10);

    // When: Writing only 2 copies and skipping the rest
    let limit = 2;
    pacer.record_written(limit);
    pacer.skip(due - limit);

    // Then: Nothing is due at the same instant and the skip is counted
    assert_eq!(pacer.frames_due(now), 0);
    assert_eq!(pacer.frames_skipped(), 8);
    assert_eq!(pacer.frames_due(now + ms(100)), 1);
}
