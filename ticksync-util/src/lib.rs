// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! Utility types for working with ticksync async streams.
//!
//! This crate provides adapters that let blocking code consume ticksync's
//! cooperatively scheduled streams.
//!
//! # Stream Adaptor
//!
//! The [`stream_adapt`] module provides [`SyncStream`], a blocking wrapper
//! around any [`AsyncStream`](ticksync::stream::AsyncStream). Each call
//! forwards to the wrapped stream and ticks the scheduler until the returned
//! promise settles. It also implements `std::io::{Read, Write, Seek}`.
//!
//! # Example
//!
//! ```
//! use ticksync::LocalScheduler;
//! use ticksync::stream::MemoryStream;
//! use ticksync_util::SyncStream;
//!
//! let scheduler = LocalScheduler::new();
//! let stream = MemoryStream::with_contents(&scheduler, b"Hello".to_vec());
//! let mut sync_stream = SyncStream::new(stream, scheduler);
//!
//! assert_eq!(&sync_stream.read(5).unwrap()[..], b"Hello");
//! assert!(sync_stream.eof());
//! ```

pub mod error;
pub mod stream_adapt;

pub use error::{Capability, Error, Operation, Result};
pub use stream_adapt::{DEFAULT_CHUNK_SIZE, SyncStream, SyncStreamOptions};
