use std::fmt::Display;
use std::time::Duration;

use backoff::{retry_notify, Error, ExponentialBackoff};

pub fn backoff_retry<F, T, E>(fn_to_try: F, max_elapsed: Option<Duration>) -> Result<T, Error<E>>
where
    F: FnMut() -> Result<T, Error<E>>,
    E: Display,
{
    let notify = |err, dur: Duration| {
        log::error!(
            "Temporary error after {:.1}s: {}",
            dur.as_secs_f32(),
            err
        );
    };

    let policy = ExponentialBackoff {
        max_elapsed_time: max_elapsed,
        ..ExponentialBackoff::default()
    };
    retry_notify(policy, fn_to_try, notify)
}

/// Wrap `err` for [`backoff_retry`]: transient errors are retried, others end the loop
pub fn retry_if<E>(err: E, transient: bool) -> Error<E> {
    if transient {
        Error::transient(err)
    } else {
        Error::permanent(err)
    }
}
