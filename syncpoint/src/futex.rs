use std::ptr;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

use nix::errno::Errno;

use crate::error::Result;

/// Outcome of a futex wait that did not fail at the OS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A wake call released us.
    Woken,
    /// The word no longer held the expected value when the kernel checked.
    ValueChanged,
    /// The timeout elapsed.
    TimedOut,
    /// A signal interrupted the wait.
    Interrupted,
}

fn sys_futex(
    word: &AtomicU32,
    op: libc::c_int,
    val: u32,
    timeout: *const libc::timespec,
) -> nix::Result<libc::c_long> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            op,
            val,
            timeout,
            ptr::null::<u32>(),
            0u32,
        )
    };

    Errno::result(ret)
}

/// Block until `word` changes away from `expected`, a wake arrives, or the
/// timeout elapses.
///
/// The words live in memory shared between processes, so the calls must not
/// carry `FUTEX_PRIVATE_FLAG`.
pub fn wait(word: &AtomicU32, expected: u32, timeout: Duration) -> Result<WaitOutcome> {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as _,
    };

    match sys_futex(word, libc::FUTEX_WAIT, expected, &ts) {
        Ok(_) => Ok(WaitOutcome::Woken),
        Err(Errno::EAGAIN) => Ok(WaitOutcome::ValueChanged),
        Err(Errno::EINTR) => Ok(WaitOutcome::Interrupted),
        Err(Errno::ETIMEDOUT) => Ok(WaitOutcome::TimedOut),
        Err(errno) => Err(errno.into()),
    }
}

/// Wake up to `nr` waiters blocked on `word`, returning how many were
/// actually released.
pub fn wake(word: &AtomicU32, nr: i32) -> Result<usize> {
    Ok(sys_futex(word, libc::FUTEX_WAKE, nr as u32, ptr::null())? as usize)
}
