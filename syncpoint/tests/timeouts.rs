mod common;

use std::time::{Duration, Instant};

use common::{setup, test_region};
use syncpoint::Error;

#[test]
fn wait_times_out_after_bound() {
    setup();
    let region = test_region("timeout_wait");

    let start = Instant::now();
    let err = region.wait(0, Some(Duration::from_secs(1))).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(8), "wait overshot: {elapsed:?}");
}

#[test]
fn wake_without_waiter_times_out() {
    setup();
    let region = test_region("timeout_wake");

    let start = Instant::now();
    let err = region.wake(0, 1, Some(Duration::from_secs(1))).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(8), "wake overshot: {elapsed:?}");
}

#[test]
fn timeout_report_names_operation_and_checkpoint() {
    setup();
    let region = test_region("timeout_report");

    let err = region.wait(7, Some(Duration::from_millis(100))).unwrap_err();
    let report = err.to_string();

    assert!(report.contains("wait"), "no operation in: {report}");
    assert!(report.contains('7'), "no checkpoint id in: {report}");
}

#[test]
fn out_of_range_id_is_rejected_before_blocking() {
    setup();
    let region = test_region("timeout_bounds");
    let nr_slots = region.nr_slots();

    let start = Instant::now();
    assert!(matches!(
        region.wait(nr_slots, None),
        Err(Error::InvalidCheckpoint { .. })
    ));
    assert!(matches!(
        region.wake(nr_slots, 1, None),
        Err(Error::InvalidCheckpoint { .. })
    ));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn checkpoints_are_independent() {
    setup();
    let region = test_region("timeout_independent");

    // A signal on one slot must not release a waiter on another.
    let _ = region.wake(1, 1, Some(Duration::from_millis(100)));

    let err = region.wait(2, Some(Duration::from_millis(300))).unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
}
