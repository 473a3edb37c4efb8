// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use std::cell::RefCell;
use std::io::{self, Cursor, Read, SeekFrom, Write};
use std::rc::Rc;

use bytes::Bytes;

use super::{AsyncStream, Readable, Seekable, Writable, closed_error, resolve_seek};
use crate::promise::Promise;
use crate::scheduler::LocalScheduler;

struct MemoryState {
    cursor: Cursor<Vec<u8>>,
    closed: bool,
}

impl MemoryState {
    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

/// A readable, writable and seekable stream over an in-memory buffer.
///
/// Every operation settles on a later scheduler tick, the way a stream
/// backed by real I/O would.
pub struct MemoryStream {
    state: Rc<RefCell<MemoryState>>,
    scheduler: LocalScheduler,
}

impl MemoryStream {
    pub fn new(scheduler: &LocalScheduler) -> Self {
        Self::with_contents(scheduler, Vec::new())
    }

    /// A stream positioned at the start of `contents`.
    pub fn with_contents(scheduler: &LocalScheduler, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryState {
                cursor: Cursor::new(contents.into()),
                closed: false,
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Copy of the whole buffer, independent of the current position.
    pub fn to_vec(&self) -> Vec<u8> {
        self.state.borrow().cursor.get_ref().clone()
    }

    fn defer<T, F>(&self, op: F) -> Promise<T>
    where
        T: 'static,
        F: FnOnce(&mut MemoryState) -> io::Result<T> + 'static,
    {
        let state = self.state.clone();
        self.scheduler.spawn_promise(async move {
            let mut state = state.borrow_mut();
            state.check_open()?;
            op(&mut *state)
        })
    }
}

impl Readable for MemoryStream {
    fn read(&mut self, len: usize) -> Promise<Bytes> {
        self.defer(move |state| {
            let total = state.cursor.get_ref().len() as u64;
            let remaining = total.saturating_sub(state.cursor.position());
            let mut buf = vec![0; len.min(remaining as usize)];
            let n = state.cursor.read(&mut buf)?;
            buf.truncate(n);
            Ok(Bytes::from(buf))
        })
    }

    fn is_readable(&self) -> bool {
        let state = self.state.borrow();
        !state.closed && state.cursor.position() < state.cursor.get_ref().len() as u64
    }
}

impl Writable for MemoryStream {
    fn write(&mut self, data: Bytes) -> Promise<usize> {
        self.defer(move |state| {
            state.cursor.write_all(&data)?;
            Ok(data.len())
        })
    }

    fn is_writable(&self) -> bool {
        !self.state.borrow().closed
    }
}

impl Seekable for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> Promise<()> {
        self.defer(move |state| {
            let len = state.cursor.get_ref().len() as u64;
            let target = resolve_seek(pos, state.cursor.position(), len)?;
            state.cursor.set_position(target);
            Ok(())
        })
    }

    fn tell(&self) -> io::Result<u64> {
        let state = self.state.borrow();
        state.check_open()?;
        Ok(state.cursor.position())
    }

    fn length(&self) -> Promise<u64> {
        self.defer(|state| Ok(state.cursor.get_ref().len() as u64))
    }
}

impl AsyncStream for MemoryStream {
    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        Some(self)
    }

    fn as_readable_mut(&mut self) -> Option<&mut dyn Readable> {
        Some(self)
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        Some(self)
    }

    fn as_writable_mut(&mut self) -> Option<&mut dyn Writable> {
        Some(self)
    }

    fn as_seekable(&self) -> Option<&dyn Seekable> {
        Some(self)
    }

    fn as_seekable_mut(&mut self) -> Option<&mut dyn Seekable> {
        Some(self)
    }
}
