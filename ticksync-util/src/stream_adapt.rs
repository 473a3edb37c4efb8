// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! Stream adaptor that exposes ticksync async streams through a blocking API.
//!
//! [`SyncStream`] owns one [`AsyncStream`] and a handle to the scheduler that
//! drives it. Every blocking call checks that the wrapped stream has the
//! needed capability, forwards the call, and then ticks the scheduler one
//! step at a time until the returned promise settles:
//!
//! - fulfilled promises hand their value back to the caller
//! - rejected promises surface as [`Error::Failed`] carrying the cause
//! - a scheduler with nothing left to run while the promise is still pending
//!   surfaces as [`Error::Starved`] instead of spinning forever
//!
//! Calls take `&mut self`, so only one operation is ever in flight.
//!
//! # Example
//!
//! ```
//! use std::io::SeekFrom;
//! use ticksync::LocalScheduler;
//! use ticksync::stream::MemoryStream;
//! use ticksync_util::SyncStream;
//!
//! let scheduler = LocalScheduler::new();
//! let mut stream = SyncStream::new(MemoryStream::new(&scheduler), scheduler);
//!
//! stream.write(b"hello world").unwrap();
//! stream.seek(SeekFrom::Start(6)).unwrap();
//! assert_eq!(stream.to_string(), "world");
//! ```

use std::io::{self, SeekFrom};
use std::os::fd::OwnedFd;

use bytes::{Bytes, BytesMut};
use ticksync::stream::{AsyncStream, Metadata, Readable, Seekable, Writable};
use ticksync::{LocalScheduler, Promise, Scheduler};

use crate::error::{Capability, Error, Operation, Result};

/// Default chunk size used by [`SyncStream::get_contents`].
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Tunables for a [`SyncStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStreamOptions {
    chunk_size: usize,
    blocking_ticks: bool,
}

impl Default for SyncStreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            blocking_ticks: true,
        }
    }
}

impl SyncStreamOptions {
    /// Size of each read issued by [`SyncStream::get_contents`]. Clamped to at
    /// least one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Whether ticks may sleep until the scheduler's next timer.
    pub fn with_blocking_ticks(mut self, blocking: bool) -> Self {
        self.blocking_ticks = blocking;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn blocking_ticks(&self) -> bool {
        self.blocking_ticks
    }
}

/// Wraps a ticksync async stream behind blocking calls.
///
/// The adapter starts out attached to its stream. [`close`](Self::close)
/// closes it and [`detach`](Self::detach) releases it; after either, every
/// capability query returns `false` and every operation fails with
/// [`Error::Unsupported`].
pub struct SyncStream<T = LocalScheduler> {
    inner: Option<Box<dyn AsyncStream>>,
    closed: bool,
    scheduler: T,
    options: SyncStreamOptions,
}

impl<T: Scheduler> SyncStream<T> {
    /// Create a new `SyncStream` with default options.
    pub fn new(stream: impl AsyncStream + 'static, scheduler: T) -> Self {
        Self::with_options(SyncStreamOptions::default(), stream, scheduler)
    }

    /// Create a new `SyncStream` that reads `chunk_size` bytes at a time when
    /// collecting the whole stream.
    pub fn with_chunk_size(
        chunk_size: usize,
        stream: impl AsyncStream + 'static,
        scheduler: T,
    ) -> Self {
        Self::with_options(
            SyncStreamOptions::default().with_chunk_size(chunk_size),
            stream,
            scheduler,
        )
    }

    pub fn with_options(
        options: SyncStreamOptions,
        stream: impl AsyncStream + 'static,
        scheduler: T,
    ) -> Self {
        Self::from_boxed(options, Box::new(stream), scheduler)
    }

    /// Create a `SyncStream` around an already boxed stream.
    pub fn from_boxed(
        options: SyncStreamOptions,
        stream: Box<dyn AsyncStream>,
        scheduler: T,
    ) -> Self {
        Self {
            inner: Some(stream),
            closed: false,
            scheduler,
            options,
        }
    }

    pub fn options(&self) -> &SyncStreamOptions {
        &self.options
    }

    pub fn scheduler(&self) -> &T {
        &self.scheduler
    }

    /// Get a reference to the inner stream, unless detached.
    pub fn get_ref(&self) -> Option<&dyn AsyncStream> {
        self.inner.as_deref()
    }

    /// Get a mutable reference to the inner stream, unless detached.
    pub fn get_mut(&mut self) -> Option<&mut (dyn AsyncStream + 'static)> {
        self.inner.as_deref_mut()
    }

    /// Consume this wrapper and return the inner stream, unless detached.
    pub fn into_inner(self) -> Option<Box<dyn AsyncStream>> {
        self.inner
    }

    pub fn is_detached(&self) -> bool {
        self.inner.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_readable(&self) -> bool {
        self.readable().is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.usable()
            .and_then(|stream| stream.as_writable())
            .is_some()
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable().is_some()
    }

    /// Read up to `len` bytes. An empty result means the stream is exhausted.
    pub fn read(&mut self, len: usize) -> Result<Bytes> {
        let promise = self.readable_mut(Operation::Read)?.read(len);
        self.wait(Operation::Read, promise)
    }

    /// Write `data`, returning how many bytes the stream accepted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let promise = self
            .writable_mut(Operation::Write)?
            .write(Bytes::copy_from_slice(data));
        self.wait(Operation::Write, promise)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<()> {
        let promise = self.seekable_mut(Operation::Seek)?.seek(pos);
        self.wait(Operation::Seek, promise)
    }

    /// Seek back to the start of the stream.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0))
    }

    /// Current position of the stream.
    pub fn tell(&self) -> Result<u64> {
        let stream = self.seekable().ok_or(Error::Unsupported {
            op: Operation::Tell,
            capability: Capability::Seekable,
        })?;
        stream.tell().map_err(|source| Error::Failed {
            op: Operation::Tell,
            source,
        })
    }

    /// Total size of the stream, or `None` when it is not seekable.
    pub fn get_size(&self) -> Result<Option<u64>> {
        match self.seekable() {
            Some(stream) => {
                let promise = stream.length();
                self.wait(Operation::Length, promise).map(Some)
            }
            None => Ok(None),
        }
    }

    /// `true` once nothing more can be read: either the adapter cannot read
    /// at all, or the wrapped stream says it is exhausted.
    pub fn eof(&self) -> bool {
        match self.readable() {
            Some(stream) => !stream.is_readable(),
            None => true,
        }
    }

    /// Read everything that remains in the stream.
    ///
    /// This consumes the stream: a second call returns an empty buffer.
    pub fn get_contents(&mut self) -> Result<Bytes> {
        let mut contents = BytesMut::new();
        while !self.eof() {
            let chunk = self.read(self.options.chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            contents.extend_from_slice(&chunk);
        }
        Ok(contents.freeze())
    }

    /// The remaining contents as text, or an empty string if reading fails.
    #[allow(clippy::inherent_to_string)]
    pub fn to_string(&mut self) -> String {
        match self.get_contents() {
            Ok(contents) => String::from_utf8_lossy(&contents).into_owned(),
            Err(error) => {
                tracing::debug!(%error, "discarding stream error while reading contents");
                String::new()
            }
        }
    }

    /// Metadata of the resource behind the stream, empty when there is none.
    pub fn metadata(&self) -> Metadata {
        self.inner
            .as_deref()
            .and_then(|stream| stream.as_resource())
            .map(|resource| resource.metadata())
            .unwrap_or_default()
    }

    /// A single metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<String> {
        self.metadata().remove(key)
    }

    /// Release the wrapped stream.
    ///
    /// Returns the stream's descriptor when it is resource backed. The
    /// adapter is unusable afterwards.
    pub fn detach(&mut self) -> Option<OwnedFd> {
        let stream = self.inner.take()?;
        tracing::debug!("detached stream");
        if stream.as_resource().is_some() {
            stream.into_owned_fd()
        } else {
            None
        }
    }

    /// Close the wrapped stream. Only the first call reaches the stream, and
    /// nothing happens once detached.
    pub fn close(&mut self) {
        if let Some(stream) = self.usable_mut() {
            tracing::debug!("closing stream");
            stream.close();
            self.closed = true;
        }
    }

    /// The wrapped stream while it is attached and not closed.
    fn usable(&self) -> Option<&dyn AsyncStream> {
        if self.closed { None } else { self.inner.as_deref() }
    }

    fn usable_mut(&mut self) -> Option<&mut (dyn AsyncStream + 'static)> {
        if self.closed {
            None
        } else {
            self.inner.as_deref_mut()
        }
    }

    fn readable(&self) -> Option<&dyn Readable> {
        self.usable().and_then(|stream| stream.as_readable())
    }

    fn seekable(&self) -> Option<&dyn Seekable> {
        self.usable().and_then(|stream| stream.as_seekable())
    }

    fn readable_mut(&mut self, op: Operation) -> Result<&mut dyn Readable> {
        self.usable_mut()
            .and_then(|stream| stream.as_readable_mut())
            .ok_or(Error::Unsupported {
                op,
                capability: Capability::Readable,
            })
    }

    fn writable_mut(&mut self, op: Operation) -> Result<&mut dyn Writable> {
        self.usable_mut()
            .and_then(|stream| stream.as_writable_mut())
            .ok_or(Error::Unsupported {
                op,
                capability: Capability::Writable,
            })
    }

    fn seekable_mut(&mut self, op: Operation) -> Result<&mut dyn Seekable> {
        self.usable_mut()
            .and_then(|stream| stream.as_seekable_mut())
            .ok_or(Error::Unsupported {
                op,
                capability: Capability::Seekable,
            })
    }

    /// Tick the scheduler until `promise` settles.
    fn wait<R>(&self, op: Operation, mut promise: Promise<R>) -> Result<R> {
        let mut ticks = 0;
        while promise.is_pending() {
            if !self.scheduler.has_pending_work() {
                tracing::warn!(%op, ticks, "scheduler emptied before the operation settled");
                return Err(Error::Starved { op, ticks });
            }
            self.scheduler.tick(self.options.blocking_ticks);
            ticks += 1;
            tracing::trace!(%op, ticks, "ticked scheduler");
        }

        match promise.try_take() {
            Some(Ok(value)) => {
                tracing::debug!(%op, ticks, "operation settled");
                Ok(value)
            }
            Some(Err(source)) => {
                tracing::debug!(%op, ticks, error = %source, "operation rejected");
                Err(Error::Failed { op, source })
            }
            None => Err(Error::Failed {
                op,
                source: io::Error::other("promise outcome was already taken"),
            }),
        }
    }
}

impl<T: Scheduler> io::Read for SyncStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || (self.is_readable() && self.eof()) {
            return Ok(0);
        }
        let chunk = SyncStream::read(self, buf.len())?;
        let len = chunk.len().min(buf.len());
        buf[..len].copy_from_slice(&chunk[..len]);
        Ok(len)
    }
}

impl<T: Scheduler> io::Write for SyncStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(SyncStream::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing is buffered on this side; every write has already settled.
        Ok(())
    }
}

impl<T: Scheduler> io::Seek for SyncStream<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        SyncStream::seek(self, pos)?;
        Ok(self.tell()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use ticksync::Deferred;
    use ticksync::stream::MemoryStream;

    /// A scheduler that runs one scripted step per tick.
    #[derive(Default)]
    struct ScriptedScheduler {
        steps: RefCell<VecDeque<Box<dyn FnOnce()>>>,
        ticks: Cell<usize>,
        queries: Cell<usize>,
    }

    impl ScriptedScheduler {
        fn push(&self, step: impl FnOnce() + 'static) {
            self.steps.borrow_mut().push_back(Box::new(step));
        }

        fn idle(&self) {
            self.push(|| {});
        }

        fn untouched(&self) -> bool {
            self.ticks.get() == 0 && self.queries.get() == 0
        }
    }

    impl Scheduler for ScriptedScheduler {
        fn tick(&self, _blocking: bool) {
            self.ticks.set(self.ticks.get() + 1);
            let step = self.steps.borrow_mut().pop_front();
            if let Some(step) = step {
                step();
            }
        }

        fn has_pending_work(&self) -> bool {
            self.queries.set(self.queries.get() + 1);
            !self.steps.borrow().is_empty()
        }
    }

    /// An async stream whose answers are queued up front.
    #[derive(Default)]
    struct ScriptedStream {
        readable: bool,
        writable: bool,
        seekable: bool,
        reads: VecDeque<Promise<Bytes>>,
        writes: VecDeque<(Promise<usize>, Rc<RefCell<Vec<u8>>>)>,
        seeks: VecDeque<Promise<()>>,
        seek_log: Rc<RefCell<Vec<SeekFrom>>>,
        position: u64,
        length: u64,
        closed: Rc<Cell<usize>>,
    }

    impl ScriptedStream {
        fn readable() -> Self {
            Self {
                readable: true,
                ..Default::default()
            }
        }

        fn writable() -> Self {
            Self {
                writable: true,
                ..Default::default()
            }
        }

        fn seekable() -> Self {
            Self {
                seekable: true,
                ..Default::default()
            }
        }

        fn with_read(mut self, promise: Promise<Bytes>) -> Self {
            self.reads.push_back(promise);
            self
        }

        fn with_chunk(self, chunk: &'static [u8]) -> Self {
            self.with_read(Promise::fulfilled(Bytes::from_static(chunk)))
        }
    }

    fn unexpected(op: &str) -> io::Error {
        io::Error::other(format!("unexpected {op}"))
    }

    impl Readable for ScriptedStream {
        fn read(&mut self, _len: usize) -> Promise<Bytes> {
            self.reads
                .pop_front()
                .unwrap_or_else(|| Promise::rejected(unexpected("read")))
        }

        fn is_readable(&self) -> bool {
            !self.reads.is_empty()
        }
    }

    impl Writable for ScriptedStream {
        fn write(&mut self, data: Bytes) -> Promise<usize> {
            match self.writes.pop_front() {
                Some((promise, sink)) => {
                    sink.borrow_mut().extend_from_slice(&data);
                    promise
                }
                None => Promise::rejected(unexpected("write")),
            }
        }

        fn is_writable(&self) -> bool {
            true
        }
    }

    impl Seekable for ScriptedStream {
        fn seek(&mut self, pos: SeekFrom) -> Promise<()> {
            self.seek_log.borrow_mut().push(pos);
            self.seeks
                .pop_front()
                .unwrap_or_else(|| Promise::rejected(unexpected("seek")))
        }

        fn tell(&self) -> io::Result<u64> {
            Ok(self.position)
        }

        fn length(&self) -> Promise<u64> {
            Promise::fulfilled(self.length)
        }
    }

    impl AsyncStream for ScriptedStream {
        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }

        fn as_readable(&self) -> Option<&dyn Readable> {
            self.readable.then_some(self as &dyn Readable)
        }

        fn as_readable_mut(&mut self) -> Option<&mut dyn Readable> {
            if self.readable { Some(self) } else { None }
        }

        fn as_writable(&self) -> Option<&dyn Writable> {
            self.writable.then_some(self as &dyn Writable)
        }

        fn as_writable_mut(&mut self) -> Option<&mut dyn Writable> {
            if self.writable { Some(self) } else { None }
        }

        fn as_seekable(&self) -> Option<&dyn Seekable> {
            self.seekable.then_some(self as &dyn Seekable)
        }

        fn as_seekable_mut(&mut self) -> Option<&mut dyn Seekable> {
            if self.seekable { Some(self) } else { None }
        }
    }

    fn adapter(
        stream: ScriptedStream,
    ) -> (SyncStream<Rc<ScriptedScheduler>>, Rc<ScriptedScheduler>) {
        let scheduler = Rc::new(ScriptedScheduler::default());
        (SyncStream::new(stream, scheduler.clone()), scheduler)
    }

    #[test]
    fn test_read_returns_data_from_async_stream() {
        let scripted = ScriptedStream::readable().with_chunk(b"ABCDEFGHIJ");
        let (mut stream, scheduler) = adapter(scripted);
        assert_eq!(&stream.read(10).unwrap()[..], b"ABCDEFGHIJ");
        assert_eq!(scheduler.ticks.get(), 0);
    }

    #[test]
    fn test_read_ticks_until_settled() {
        let (promise, deferred) = Promise::pending();
        let (mut stream, scheduler) = adapter(ScriptedStream::readable().with_read(promise));
        scheduler.idle();
        scheduler.push(move || deferred.resolve(Bytes::from_static(b"late")));
        scheduler.idle();

        assert_eq!(&stream.read(4).unwrap()[..], b"late");
        assert_eq!(scheduler.ticks.get(), 2);
        assert_eq!(scheduler.steps.borrow().len(), 1);
    }

    #[test]
    fn test_missing_capability_never_touches_scheduler() {
        let (mut stream, scheduler) = adapter(ScriptedStream::writable());

        let err = stream.read(10).unwrap_err();
        assert!(matches!(
            err,
            Error::Unsupported {
                op: Operation::Read,
                capability: Capability::Readable
            }
        ));
        assert!(matches!(
            stream.seek(SeekFrom::Start(110)).unwrap_err(),
            Error::Unsupported {
                capability: Capability::Seekable,
                ..
            }
        ));
        assert!(matches!(
            stream.tell().unwrap_err(),
            Error::Unsupported {
                op: Operation::Tell,
                ..
            }
        ));

        assert!(scheduler.untouched());

        let (mut stream, scheduler) = adapter(ScriptedStream::readable());
        assert!(matches!(
            stream.write(b"XYZ").unwrap_err(),
            Error::Unsupported {
                capability: Capability::Writable,
                ..
            }
        ));
        assert!(scheduler.untouched());
    }

    #[test]
    fn test_starvation_is_reported_once() {
        let (promise, deferred) = Promise::pending();
        let (mut stream, scheduler) = adapter(ScriptedStream::readable().with_read(promise));
        scheduler.idle();

        let err = stream.read(10).unwrap_err();
        assert!(matches!(
            err,
            Error::Starved {
                op: Operation::Read,
                ticks: 1
            }
        ));
        assert_eq!(scheduler.ticks.get(), 1);
        assert_eq!(scheduler.queries.get(), 2);
        drop(deferred);
    }

    #[test]
    fn test_starvation_on_write_and_seek() {
        let (write, _write_deferred) = Promise::<usize>::pending();
        let (seek, _seek_deferred) = Promise::<()>::pending();
        let mut scripted = ScriptedStream {
            writable: true,
            seekable: true,
            ..Default::default()
        };
        scripted.writes.push_back((write, Rc::default()));
        scripted.seeks.push_back(seek);
        let (mut stream, _scheduler) = adapter(scripted);

        assert!(matches!(
            stream.write(b"data").unwrap_err(),
            Error::Starved { ticks: 0, .. }
        ));
        assert!(matches!(
            stream.seek(SeekFrom::Start(1)).unwrap_err(),
            Error::Starved { ticks: 0, .. }
        ));
    }

    #[test]
    fn test_rejection_wraps_cause() {
        let cause = io::Error::new(io::ErrorKind::ConnectionAborted, "peer went away");
        let (mut stream, _) =
            adapter(ScriptedStream::readable().with_read(Promise::rejected(cause)));

        let err = stream.read(10).unwrap_err();
        assert_eq!(err.op(), Operation::Read);
        let cause = err.cause().unwrap();
        assert_eq!(cause.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(cause.to_string(), "peer went away");

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "peer went away");
    }

    #[test]
    fn test_write_sends_data_to_async_stream() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let mut scripted = ScriptedStream::writable();
        scripted.writes.push_back((Promise::fulfilled(10), sink.clone()));
        let (mut stream, _) = adapter(scripted);

        assert_eq!(stream.write(b"ABCDEFGHIJ").unwrap(), 10);
        assert_eq!(&sink.borrow()[..], b"ABCDEFGHIJ");
    }

    #[test]
    fn test_write_failure_surfaces() {
        let mut scripted = ScriptedStream::writable();
        scripted.writes.push_back((
            Promise::rejected(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
            Rc::default(),
        ));
        let (mut stream, _) = adapter(scripted);

        let err = stream.write(b"ABCDEFGHIJ").unwrap_err();
        assert_eq!(err.op(), Operation::Write);
        assert_eq!(err.cause().unwrap().kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_seek_forwards_to_async_stream() {
        let mut scripted = ScriptedStream::seekable();
        scripted.seeks.push_back(Promise::fulfilled(()));
        scripted
            .seeks
            .push_back(Promise::rejected(io::Error::other("bad seek")));
        let log = scripted.seek_log.clone();
        let (mut stream, _) = adapter(scripted);

        stream.seek(SeekFrom::Start(10)).unwrap();
        let err = stream.seek(SeekFrom::Start(110)).unwrap_err();
        assert_eq!(err.op(), Operation::Seek);
        assert_eq!(*log.borrow(), vec![SeekFrom::Start(10), SeekFrom::Start(110)]);
    }

    #[test]
    fn test_rewind_matches_seek_to_start() {
        let run = |rewind: bool| {
            let (promise, deferred) = Promise::pending();
            let mut scripted = ScriptedStream::seekable();
            scripted.seeks.push_back(promise);
            let log = scripted.seek_log.clone();
            let (mut stream, scheduler) = adapter(scripted);
            scheduler.idle();
            scheduler.push(move || deferred.resolve(()));

            if rewind {
                stream.rewind().unwrap();
            } else {
                stream.seek(SeekFrom::Start(0)).unwrap();
            }
            let calls = log.borrow().clone();
            (calls, scheduler.ticks.get(), scheduler.queries.get())
        };

        assert_eq!(run(true), run(false));
        assert_eq!(run(true).0, vec![SeekFrom::Start(0)]);
    }

    #[test]
    fn test_get_contents_consumes_stream() {
        let (mut stream, _) =
            adapter(ScriptedStream::readable().with_chunk(b"AB").with_chunk(b"CD"));

        assert_eq!(&stream.get_contents().unwrap()[..], b"ABCD");
        assert!(stream.eof());
        assert!(stream.get_contents().unwrap().is_empty());
    }

    #[test]
    fn test_to_string_never_fails() {
        let (mut stream, _) = adapter(
            ScriptedStream::readable()
                .with_chunk(b"partial")
                .with_read(Promise::rejected(io::Error::other("boom"))),
        );
        assert_eq!(stream.to_string(), "");

        let (mut stream, _) = adapter(ScriptedStream::writable());
        assert_eq!(stream.to_string(), "");

        let (mut stream, _) = adapter(ScriptedStream::readable().with_chunk(b"text"));
        assert_eq!(stream.to_string(), "text");
    }

    #[test]
    fn test_eof_policy() {
        let (stream, _) = adapter(ScriptedStream::writable());
        assert!(stream.eof());

        let (stream, _) = adapter(ScriptedStream::readable());
        assert!(stream.eof());

        let (stream, _) = adapter(ScriptedStream::readable().with_chunk(b"x"));
        assert!(!stream.eof());
    }

    #[test]
    fn test_detach_severs_stream() {
        let scripted = ScriptedStream {
            readable: true,
            writable: true,
            seekable: true,
            ..Default::default()
        }
        .with_chunk(b"never read");
        let closed = scripted.closed.clone();
        let (mut stream, scheduler) = adapter(scripted);
        assert!(stream.is_readable() && stream.is_writable() && stream.is_seekable());

        assert!(stream.detach().is_none());
        assert!(stream.is_detached());
        assert!(!stream.is_readable());
        assert!(!stream.is_writable());
        assert!(!stream.is_seekable());
        assert!(stream.eof());

        assert!(matches!(stream.read(1), Err(Error::Unsupported { .. })));
        assert!(matches!(stream.write(b"x"), Err(Error::Unsupported { .. })));
        assert!(matches!(
            stream.seek(SeekFrom::Start(0)),
            Err(Error::Unsupported { .. })
        ));
        assert!(matches!(stream.tell(), Err(Error::Unsupported { .. })));
        assert_eq!(stream.get_size().unwrap(), None);

        stream.close();
        stream.close();
        assert_eq!(closed.get(), 0);
        assert!(stream.detach().is_none());
        assert!(scheduler.untouched());
    }

    #[test]
    fn test_close_forwards_to_stream() {
        let scripted = ScriptedStream::writable();
        let closed = scripted.closed.clone();
        let (mut stream, _) = adapter(scripted);
        stream.close();
        stream.close();
        assert_eq!(closed.get(), 1);
        assert!(stream.is_closed());
    }

    #[test]
    fn test_close_disables_capabilities() {
        let scheduler = LocalScheduler::new();
        let memory = MemoryStream::with_contents(&scheduler, b"contents".to_vec());
        let mut stream = SyncStream::new(memory, scheduler.clone());
        assert!(stream.is_readable() && stream.is_writable() && stream.is_seekable());

        stream.close();
        assert!(!stream.is_detached());
        assert!(!stream.is_readable());
        assert!(!stream.is_writable());
        assert!(!stream.is_seekable());
        assert!(stream.eof());

        assert!(matches!(
            stream.write(b"more"),
            Err(Error::Unsupported {
                op: Operation::Write,
                capability: Capability::Writable,
            })
        ));
        assert!(matches!(
            stream.read(4),
            Err(Error::Unsupported {
                capability: Capability::Readable,
                ..
            })
        ));
        assert!(matches!(
            stream.rewind(),
            Err(Error::Unsupported {
                capability: Capability::Seekable,
                ..
            })
        ));
        assert!(matches!(stream.tell(), Err(Error::Unsupported { .. })));
        assert_eq!(stream.get_size().unwrap(), None);
        assert_eq!(stream.to_string(), "");
        assert!(!scheduler.has_pending_work());
    }

    #[test]
    fn test_inner_access() {
        let (mut stream, _) = adapter(ScriptedStream::readable().with_chunk(b"x"));
        assert!(stream.get_ref().unwrap().as_readable().is_some());
        stream.get_mut().unwrap().close();

        let inner = stream.into_inner().unwrap();
        assert!(inner.as_writable().is_none());

        let (mut stream, _) = adapter(ScriptedStream::readable());
        stream.detach();
        assert!(stream.get_ref().is_none());
        assert!(stream.into_inner().is_none());
    }

    #[test]
    fn test_get_size() {
        let scripted = ScriptedStream {
            seekable: true,
            length: 250,
            position: 125,
            ..Default::default()
        };
        let (stream, _) = adapter(scripted);
        assert_eq!(stream.get_size().unwrap(), Some(250));
        assert_eq!(stream.tell().unwrap(), 125);

        let (stream, _) = adapter(ScriptedStream::readable());
        assert_eq!(stream.get_size().unwrap(), None);
    }

    #[test]
    fn test_metadata_without_resource() {
        let (stream, _) = adapter(ScriptedStream::writable());
        assert!(stream.metadata().is_empty());
        assert_eq!(stream.metadata_value("uri"), None);
    }

    #[test]
    fn test_options() {
        let options = SyncStreamOptions::default();
        assert_eq!(options.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert!(options.blocking_ticks());

        let options = options.with_chunk_size(0).with_blocking_ticks(false);
        assert_eq!(options.chunk_size(), 1);
        assert!(!options.blocking_ticks());
    }

    #[test]
    fn test_std_io_over_local_scheduler() {
        use std::io::{Read, Seek, Write};

        let scheduler = LocalScheduler::new();
        let memory = MemoryStream::new(&scheduler);
        let mut stream = SyncStream::with_chunk_size(3, memory, scheduler.clone());

        stream.write_all(b"cooperative").unwrap();
        assert_eq!(Seek::seek(&mut stream, SeekFrom::Start(4)).unwrap(), 4);

        let mut rest = String::new();
        stream.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "erative");
        assert_eq!(stream.get_size().unwrap(), Some(11));
        assert!(!scheduler.has_pending_work());
    }

    #[test]
    fn test_unsettled_local_promise_starves() {
        struct Stuck(Option<Deferred<Bytes>>);

        impl Readable for Stuck {
            fn read(&mut self, _len: usize) -> Promise<Bytes> {
                let (promise, deferred) = Promise::pending();
                self.0 = Some(deferred);
                promise
            }

            fn is_readable(&self) -> bool {
                true
            }
        }

        impl AsyncStream for Stuck {
            fn close(&mut self) {}

            fn as_readable(&self) -> Option<&dyn Readable> {
                Some(self)
            }

            fn as_readable_mut(&mut self) -> Option<&mut dyn Readable> {
                Some(self)
            }
        }

        let scheduler = LocalScheduler::new();
        scheduler.spawn(async {});
        let mut stream = SyncStream::new(Stuck(None), scheduler);

        let err = stream.read(1).unwrap_err();
        assert!(matches!(err, Error::Starved { ticks: 1, .. }));
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::Other);
    }
}
