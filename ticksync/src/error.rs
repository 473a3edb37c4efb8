// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use std::io;

use thiserror::Error;

/// Returned by [`LocalScheduler::block_on`](crate::LocalScheduler::block_on)
/// when the scheduler runs dry while the future is still pending.
#[derive(Debug, Error)]
#[error("scheduler ran out of work after {ticks} ticks while the future was still pending")]
pub struct Stalled {
    pub ticks: u64,
}

/// Returned by a [`Timeout`](crate::Timeout) whose deadline passed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline has elapsed")]
pub struct Elapsed(pub(crate) ());

impl From<Elapsed> for io::Error {
    fn from(value: Elapsed) -> Self {
        io::Error::new(io::ErrorKind::TimedOut, value)
    }
}

impl From<Stalled> for io::Error {
    fn from(value: Stalled) -> Self {
        io::Error::other(value)
    }
}
