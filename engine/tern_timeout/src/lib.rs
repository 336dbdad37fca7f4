//! Execution timeout for the Tern engine.
//!
//! A [`Timeout`] owns a timer thread, started on first [`Timeout::arm`].
//! When the armed budget elapses the thread sets an atomic flag and does
//! nothing else. The interpreter polls that flag at safe checkpoints
//! ([`Timeout::check`] or an [`InterruptFlag`]) and unwinds the request
//! from there.
//!
//! ```text
//!  Disarmed --arm--> Armed --budget elapses--> Fired
//!      ^               |                         |
//!      +----disarm-----+-------------disarm------+
//! ```

mod timer;

pub use timer::{InterruptFlag, Timeout, TimeoutState};

use thiserror::Error;

/// The armed budget elapsed. Request-fatal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("Maximum execution time of {seconds} second{} exceeded", plural(.seconds))]
pub struct TimedOut {
    pub seconds: u64,
}

fn plural(n: &u64) -> &'static str {
    if *n == 1 {
        ""
    } else {
        "s"
    }
}

#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("failed to start timer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_pluralises() {
        assert_eq!(
            TimedOut { seconds: 1 }.to_string(),
            "Maximum execution time of 1 second exceeded"
        );
        assert_eq!(
            TimedOut { seconds: 30 }.to_string(),
            "Maximum execution time of 30 seconds exceeded"
        );
    }
}
