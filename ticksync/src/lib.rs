// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! A single-threaded cooperative runtime whose work only advances when it is
//! explicitly ticked.
//!
//! - [`LocalScheduler`] - run queue and timers, advanced one task per tick
//! - [`Promise`] / [`Deferred`] - settle-once results of scheduled work
//! - [`stream`] - capability-tagged async streams and a few implementations
//!
//! # Example
//!
//! ```
//! use ticksync::{LocalScheduler, Scheduler};
//!
//! let scheduler = LocalScheduler::new();
//! let mut promise = scheduler.spawn_promise(async { Ok(1 + 1) });
//! while promise.is_pending() && scheduler.has_pending_work() {
//!     scheduler.tick(true);
//! }
//! assert_eq!(promise.try_take().unwrap().unwrap(), 2);
//! ```
//!
//! Whole programs can run on a scheduler through the `main` attribute:
//!
//! ```
//! #[ticksync::main]
//! async fn main() {
//!     let scheduler = ticksync::LocalScheduler::current().unwrap();
//!     let answer = scheduler.spawn_promise(async { Ok(42) }).await;
//!     assert_eq!(answer.unwrap(), 42);
//! }
//! ```

use std::future::Future;

pub mod error;
pub mod promise;
pub mod scheduler;
pub mod stream;

pub use error::{Elapsed, Stalled};
pub use promise::{Deferred, Promise, PromiseState};
pub use scheduler::{LocalScheduler, Scheduler, Sleep, TaskId, Timeout, yield_now};
pub use ticksync_macros::{main, test};

/// Run `future` to completion on a fresh [`LocalScheduler`].
pub fn run<F: Future>(future: F) -> Result<F::Output, Stalled> {
    LocalScheduler::new().block_on(future)
}
