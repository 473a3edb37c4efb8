// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::task::{Poll, Waker};

use bytes::{Bytes, BytesMut};

use super::{AsyncStream, Readable, Writable, closed_error};
use crate::promise::Promise;
use crate::scheduler::LocalScheduler;

#[derive(Default)]
struct PipeState {
    buffer: BytesMut,
    write_closed: bool,
    read_closed: bool,
    reader: Option<Waker>,
}

impl PipeState {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

/// An in-memory, unbounded pipe.
///
/// Bytes written to the [`PipeWriter`] become readable from the
/// [`PipeReader`]. Reads wait until data arrives or the writer is closed;
/// once the writer is gone and the buffer is drained, reads return an empty
/// chunk.
pub struct BufferPipe;

impl BufferPipe {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(scheduler: &LocalScheduler) -> (PipeReader, PipeWriter) {
        let state = Rc::new(RefCell::new(PipeState::default()));
        (
            PipeReader {
                state: state.clone(),
                scheduler: scheduler.clone(),
            },
            PipeWriter {
                state,
                scheduler: scheduler.clone(),
            },
        )
    }
}

pub struct PipeReader {
    state: Rc<RefCell<PipeState>>,
    scheduler: LocalScheduler,
}

impl PipeReader {
    /// Bytes written but not read yet.
    pub fn buffered(&self) -> usize {
        self.state.borrow().buffer.len()
    }
}

impl Readable for PipeReader {
    fn read(&mut self, len: usize) -> Promise<Bytes> {
        let state = self.state.clone();
        let (promise, deferred) = Promise::pending();
        self.scheduler.spawn(async move {
            let chunk = std::future::poll_fn(|cx| {
                // Nobody holds the promise any more; leave the buffer for the next read.
                if deferred.is_abandoned() {
                    return Poll::Ready(None);
                }
                let mut state = state.borrow_mut();
                if state.read_closed {
                    return Poll::Ready(Some(Err(closed_error())));
                }
                if !state.buffer.is_empty() {
                    let take = len.min(state.buffer.len());
                    return Poll::Ready(Some(Ok(state.buffer.split_to(take).freeze())));
                }
                if state.write_closed {
                    return Poll::Ready(Some(Ok(Bytes::new())));
                }
                state.reader = Some(cx.waker().clone());
                Poll::Pending
            })
            .await;
            if let Some(result) = chunk {
                deferred.settle(result);
            }
        });
        promise
    }

    fn is_readable(&self) -> bool {
        let state = self.state.borrow();
        !state.read_closed && !(state.write_closed && state.buffer.is_empty())
    }
}

impl AsyncStream for PipeReader {
    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.read_closed = true;
        state.buffer.clear();
        state.wake_reader();
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        Some(self)
    }

    fn as_readable_mut(&mut self) -> Option<&mut dyn Readable> {
        Some(self)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct PipeWriter {
    state: Rc<RefCell<PipeState>>,
    scheduler: LocalScheduler,
}

impl PipeWriter {
    /// Write `data` without going through the scheduler.
    pub fn write_now(&self, data: &[u8]) -> io::Result<usize> {
        Self::write_into(&self.state, data)
    }

    fn write_into(state: &RefCell<PipeState>, data: &[u8]) -> io::Result<usize> {
        let mut state = state.borrow_mut();
        if state.read_closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe reader is closed",
            ));
        }
        if state.write_closed {
            return Err(closed_error());
        }
        state.buffer.extend_from_slice(data);
        state.wake_reader();
        Ok(data.len())
    }
}

impl Writable for PipeWriter {
    fn write(&mut self, data: Bytes) -> Promise<usize> {
        let state = self.state.clone();
        self.scheduler
            .spawn_promise(async move { PipeWriter::write_into(&state, &data) })
    }

    fn is_writable(&self) -> bool {
        let state = self.state.borrow();
        !state.write_closed && !state.read_closed
    }
}

impl AsyncStream for PipeWriter {
    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.write_closed = true;
        state.wake_reader();
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        Some(self)
    }

    fn as_writable_mut(&mut self) -> Option<&mut dyn Writable> {
        Some(self)
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}
