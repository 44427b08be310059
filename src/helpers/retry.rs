//! Bounded retry with a recovery action, driven by fault classification.
//!
//! Hardware drivers distinguish faults that need the handle reopened (bus
//! NACK, serial I/O errors) from faults where simply asking again is enough
//! (checksum mismatch, frame not yet assembled). Anything else is returned
//! to the caller immediately.

use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Recover (close and reopen the handle) before retrying
    Transient,
    /// Retry as-is
    Integrity,
    /// Give up
    Fatal,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of recovery actions for transient faults
    pub recoveries: u32,
    /// Maximum number of plain retries for integrity faults
    pub retries: u32,
    /// Pause before a plain retry
    pub pause: Duration,
}

impl RetryPolicy {
    pub const fn new(recoveries: u32, retries: u32) -> Self {
        RetryPolicy {
            recoveries,
            retries,
            pause: Duration::ZERO,
        }
    }

    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// Run `op` against `ctx`, retrying according to `policy`.
///
/// Both closures receive the same context so that the operation and the
/// recovery can share one exclusively-borrowed handle owner.
pub fn retry_with_recovery<C, T, E, Op, Cl, Rec>(
    ctx: &mut C,
    policy: RetryPolicy,
    mut op: Op,
    classify: Cl,
    mut recover: Rec,
) -> Result<T, E>
where
    Op: FnMut(&mut C) -> Result<T, E>,
    Cl: Fn(&E) -> Fault,
    Rec: FnMut(&mut C) -> Result<(), E>,
    E: std::fmt::Display,
{
    let mut recoveries_left = policy.recoveries;
    let mut retries_left = policy.retries;
    loop {
        let err = match op(ctx) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        match classify(&err) {
            Fault::Transient if recoveries_left > 0 => {
                recoveries_left -= 1;
                log::debug!("Transient fault ({err}); recovering before retry");
                recover(ctx)?;
            }
            Fault::Integrity if retries_left > 0 => {
                retries_left -= 1;
                log::debug!("Integrity fault ({err}); retrying");
                if !policy.pause.is_zero() {
                    thread::sleep(policy.pause);
                }
            }
            _ => return Err(err),
        }
    }
}
