mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{expect_child_success, fork_child, setup, test_region};

#[test]
fn child_wakes_parent() {
    setup();
    let region = test_region("rendezvous_basic");

    let child = fork_child(|| match region.wake(0, 1, None) {
        Ok(()) => 0,
        Err(_) => 1,
    });

    region.wait(0, None).unwrap();
    expect_child_success(child);
}

#[test]
fn parent_wakes_child() {
    setup();
    let region = test_region("rendezvous_reverse");

    let child = fork_child(|| match region.wait(0, None) {
        Ok(()) => 0,
        Err(_) => 1,
    });

    region.wake(0, 1, None).unwrap();
    expect_child_success(child);
}

#[test]
fn wake_before_wait_returns_immediately() {
    setup();
    let region = test_region("rendezvous_early_wake");

    // No waiter yet: the wake itself times out but leaves the signal
    // behind for the late waiter.
    assert!(region
        .wake(0, 1, Some(Duration::from_millis(100)))
        .unwrap_err()
        .is_timeout());

    let start = Instant::now();
    region.wait(0, Some(Duration::from_secs(10))).unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn wake_releases_batch_of_waiters() {
    setup();
    let region = test_region("rendezvous_batch");

    let blocking = fork_child(|| match region.wait(0, None) {
        Ok(()) => 0,
        Err(_) => 1,
    });
    let timed = fork_child(|| match region.wait(0, Some(Duration::from_millis(1000))) {
        Ok(()) => 0,
        Err(_) => 1,
    });

    // Give both children a moment to register.
    thread::sleep(Duration::from_millis(50));

    region.wake(0, 2, None).unwrap();
    expect_child_success(blocking);
    expect_child_success(timed);
}

#[test]
fn wake_and_wait_handshake() {
    setup();
    let region = test_region("rendezvous_handshake");

    let child = fork_child(|| match region.wake_and_wait(0) {
        Ok(()) => 0,
        Err(_) => 1,
    });

    region.wait(0, None).unwrap();
    region.wake(0, 1, None).unwrap();
    expect_child_success(child);
}

#[test]
fn rendezvous_works_on_high_slot_ids() {
    setup();
    let region = test_region("rendezvous_high_slot");
    let id = region.nr_slots() - 1;

    let child = fork_child(|| match region.wake(id, 1, None) {
        Ok(()) => 0,
        Err(_) => 1,
    });

    region.wait(id, None).unwrap();
    expect_child_success(child);
}
