use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use scopeguard::defer;
use strum::Display;

use crate::error::{Error, Result};
use crate::futex::{self, WaitOutcome};

/// Interval between wake retries while the signal has not been consumed yet.
const WAKE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Operation names used in timeout reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Op {
    Wait,
    Wake,
}

/// Per-checkpoint storage inside the shared region.
///
/// `futex` is the word the kernel blocks on; its value counts signals
/// recorded by `wake` and not yet consumed by a waiter, so a signal that
/// races ahead of the corresponding wait stays visible until someone
/// claims it. `waiters` tracks callers currently inside `wait`. `seq`
/// counts consumed signals over the lifetime of the slot and lets a waker
/// observe that its signals reached someone, including waiters that took
/// the already-signaled fast path and never blocked.
///
/// All fields are mutated through atomic RMW operations only; the slot is
/// mapped shared-write into every cooperating process.
#[repr(C)]
pub(crate) struct Slot {
    futex: AtomicU32,
    waiters: AtomicU32,
    seq: AtomicU32,
    _reserved: u32,
}

pub(crate) const SLOT_SIZE: usize = std::mem::size_of::<Slot>();

impl Slot {
    /// Block until the checkpoint is signaled or `timeout` elapses.
    ///
    /// Consumes exactly one recorded signal on success. The waiter count is
    /// restored on every exit path so later cycles on the same slot start
    /// from a consistent state.
    pub(crate) fn wait(&self, id: u32, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        self.waiters.fetch_add(1, Ordering::AcqRel);
        defer! {
            self.waiters.fetch_sub(1, Ordering::AcqRel);
        }

        loop {
            let pending = self.futex.load(Ordering::Acquire);

            if pending > 0 {
                if self
                    .futex
                    .compare_exchange(pending, pending - 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.seq.fetch_add(1, Ordering::AcqRel);
                    return Ok(());
                }

                // Lost the claim to a concurrent waiter, re-inspect.
                continue;
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Timeout {
                    op: Op::Wait,
                    id,
                    bound: timeout,
                })?;

            match futex::wait(&self.futex, 0, remaining)? {
                WaitOutcome::TimedOut => {
                    return Err(Error::Timeout {
                        op: Op::Wait,
                        id,
                        bound: timeout,
                    })
                }
                WaitOutcome::Woken | WaitOutcome::ValueChanged | WaitOutcome::Interrupted => {}
            }
        }
    }

    /// Record `nr_wake` signals and retry the OS wake call until that many
    /// waiters have consumed them or `timeout` elapses.
    ///
    /// A wake can run ahead of the corresponding wait, so the signals are
    /// recorded up front; a timed-out wake leaves them behind for late
    /// waiters to observe immediately.
    pub(crate) fn wake(&self, id: u32, nr_wake: u32, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let start_seq = self.seq.load(Ordering::Acquire);
        let mut seen_no_waiter = false;

        self.futex.fetch_add(nr_wake, Ordering::AcqRel);

        loop {
            let released = self.seq.load(Ordering::Acquire).wrapping_sub(start_seq);
            if released >= nr_wake {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    op: Op::Wake,
                    id,
                    bound: timeout,
                });
            }

            if !seen_no_waiter && self.waiters.load(Ordering::Acquire) == 0 {
                debug!("checkpoint {id}: signal recorded before any waiter arrived");
                seen_no_waiter = true;
            }

            futex::wake(&self.futex, i32::MAX)?;

            thread::sleep(WAKE_RETRY_INTERVAL);
        }
    }
}
