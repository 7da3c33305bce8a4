use std::sync::Once;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use syncpoint::{CheckpointRegion, RegionOptionsBuilder};

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

pub fn test_region(tag: &str) -> CheckpointRegion {
    CheckpointRegion::create(
        RegionOptionsBuilder::default()
            .tag(tag.to_string())
            .build()
            .unwrap(),
    )
    .unwrap()
}

/// Fork and run `f` in the child, which exits with its return value. The
/// child shares the parent's checkpoint mappings and skips destructors on
/// exit, so it never tears a region down.
pub fn fork_child(f: impl FnOnce() -> i32) -> Pid {
    match unsafe { fork().unwrap() } {
        ForkResult::Parent { child } => child,
        ForkResult::Child => {
            let code = f();
            std::process::exit(code);
        }
    }
}

pub fn expect_child_success(pid: Pid) {
    assert_eq!(waitpid(pid, None).unwrap(), WaitStatus::Exited(pid, 0));
}
