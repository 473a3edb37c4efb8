// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! Capability-tagged async streams.
//!
//! An [`AsyncStream`] advertises what it can do through accessor methods that
//! return `Some` for each capability the concrete type implements:
//!
//! - [`Readable`] - `read(len)` returns a promise of the next chunk
//! - [`Writable`] - `write(bytes)` returns a promise of the bytes accepted
//! - [`Seekable`] - `seek`, `tell` and `length`
//! - [`ResourceBacked`] - the stream sits on an OS descriptor with metadata
//!
//! Capabilities are discovered at runtime, so a `Box<dyn AsyncStream>` can be
//! inspected without knowing the concrete type behind it.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::os::fd::{BorrowedFd, OwnedFd};

use bytes::Bytes;

use crate::promise::Promise;

mod file;
mod memory;
mod pipe;

pub use file::FileStream;
pub use memory::MemoryStream;
pub use pipe::{BufferPipe, PipeReader, PipeWriter};

/// Key/value description of the resource behind a stream.
pub type Metadata = BTreeMap<String, String>;

/// Base trait for every async stream.
pub trait AsyncStream {
    /// Close the stream. Pending and future operations fail afterwards.
    fn close(&mut self);

    fn as_readable(&self) -> Option<&dyn Readable> {
        None
    }

    fn as_readable_mut(&mut self) -> Option<&mut dyn Readable> {
        None
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        None
    }

    fn as_writable_mut(&mut self) -> Option<&mut dyn Writable> {
        None
    }

    fn as_seekable(&self) -> Option<&dyn Seekable> {
        None
    }

    fn as_seekable_mut(&mut self) -> Option<&mut dyn Seekable> {
        None
    }

    fn as_resource(&self) -> Option<&dyn ResourceBacked> {
        None
    }

    /// Give up the stream and hand back its descriptor, if it has one.
    fn into_owned_fd(self: Box<Self>) -> Option<OwnedFd> {
        None
    }
}

pub trait Readable {
    /// Read up to `len` bytes. An empty chunk means end of stream.
    fn read(&mut self, len: usize) -> Promise<Bytes>;

    /// Whether more data may still be read.
    fn is_readable(&self) -> bool;
}

pub trait Writable {
    fn write(&mut self, data: Bytes) -> Promise<usize>;

    fn is_writable(&self) -> bool;
}

pub trait Seekable {
    fn seek(&mut self, pos: SeekFrom) -> Promise<()>;

    /// Current position.
    fn tell(&self) -> std::io::Result<u64>;

    /// Total length of the stream in bytes.
    fn length(&self) -> Promise<u64>;
}

pub trait ResourceBacked {
    fn as_fd(&self) -> BorrowedFd<'_>;

    fn metadata(&self) -> Metadata;
}

/// Resolve `pos` against the current `position` and total `len`.
pub(crate) fn resolve_seek(pos: SeekFrom, position: u64, len: u64) -> std::io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
        SeekFrom::Current(delta) => position.checked_add_signed(delta),
    };
    target.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "stream is closed")
}
