// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bytes::Bytes;
use rustix::fs::OFlags;

use super::{AsyncStream, Metadata, Readable, ResourceBacked, Seekable, Writable, closed_error};
use crate::promise::Promise;
use crate::scheduler::LocalScheduler;

#[derive(Clone, Copy)]
struct Access {
    read: bool,
    write: bool,
    append: bool,
}

impl Access {
    fn of(file: &File) -> io::Result<Self> {
        let flags = rustix::fs::fcntl_getfl(file)?;
        let read = !flags.contains(OFlags::WRONLY);
        let write = flags.intersects(OFlags::WRONLY | OFlags::RDWR);
        Ok(Self {
            read,
            write,
            append: flags.contains(OFlags::APPEND),
        })
    }

    fn mode(&self) -> &'static str {
        match (self.read, self.write, self.append) {
            (true, true, true) => "a+",
            (false, _, true) => "a",
            (true, true, false) => "r+",
            (false, _, false) => "w",
            (true, false, _) => "r",
        }
    }
}

struct FileState {
    file: File,
    closed: Cell<bool>,
    eof: Cell<bool>,
}

impl FileState {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.get() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

/// A file exposed as an async stream.
///
/// The file is accessed with ordinary blocking calls from inside scheduler
/// tasks, so each operation completes on the tick that runs it.
pub struct FileStream {
    state: Rc<FileState>,
    path: PathBuf,
    access: Access,
    scheduler: LocalScheduler,
}

impl FileStream {
    /// Open `path` for reading.
    pub fn open(scheduler: &LocalScheduler, path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        Self::from_std(scheduler, File::open(path)?, path)
    }

    /// Create (or truncate) `path` and open it for reading and writing.
    pub fn create(scheduler: &LocalScheduler, path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_std(scheduler, file, path)
    }

    /// Wrap an already opened file. `path` is only reported in metadata.
    pub fn from_std(
        scheduler: &LocalScheduler,
        file: File,
        path: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        let access = Access::of(&file)?;
        Ok(Self {
            state: Rc::new(FileState {
                file,
                closed: Cell::new(false),
                eof: Cell::new(false),
            }),
            path: path.into(),
            access,
            scheduler: scheduler.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn defer<T, F>(&self, op: F) -> Promise<T>
    where
        T: 'static,
        F: FnOnce(&FileState) -> io::Result<T> + 'static,
    {
        let state = self.state.clone();
        self.scheduler.spawn_promise(async move {
            state.check_open()?;
            op(&state)
        })
    }
}

impl Readable for FileStream {
    fn read(&mut self, len: usize) -> Promise<Bytes> {
        self.defer(move |state| {
            let mut buf = vec![0; len];
            let n = (&state.file).read(&mut buf)?;
            if n < len {
                state.eof.set(true);
            }
            buf.truncate(n);
            Ok(Bytes::from(buf))
        })
    }

    fn is_readable(&self) -> bool {
        self.access.read && !self.state.closed.get() && !self.state.eof.get()
    }
}

impl Writable for FileStream {
    fn write(&mut self, data: Bytes) -> Promise<usize> {
        self.defer(move |state| {
            (&state.file).write_all(&data)?;
            Ok(data.len())
        })
    }

    fn is_writable(&self) -> bool {
        self.access.write && !self.state.closed.get()
    }
}

impl Seekable for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> Promise<()> {
        self.defer(move |state| {
            (&state.file).seek(pos)?;
            state.eof.set(false);
            Ok(())
        })
    }

    fn tell(&self) -> io::Result<u64> {
        self.state.check_open()?;
        (&self.state.file).stream_position()
    }

    fn length(&self) -> Promise<u64> {
        self.defer(|state| Ok(state.file.metadata()?.len()))
    }
}

impl ResourceBacked for FileStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.state.file.as_fd()
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("wrapper_type".into(), "plainfile".into());
        metadata.insert("stream_type".into(), "STDIO".into());
        metadata.insert("mode".into(), self.access.mode().into());
        metadata.insert("seekable".into(), "true".into());
        metadata.insert("uri".into(), self.path.display().to_string());
        metadata.insert("eof".into(), self.state.eof.get().to_string());
        if let Ok(stat) = self.state.file.metadata() {
            metadata.insert("size".into(), stat.len().to_string());
        }
        metadata
    }
}

impl AsyncStream for FileStream {
    fn close(&mut self) {
        self.state.closed.set(true);
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        self.access.read.then_some(self as &dyn Readable)
    }

    fn as_readable_mut(&mut self) -> Option<&mut dyn Readable> {
        if self.access.read { Some(self) } else { None }
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        self.access.write.then_some(self as &dyn Writable)
    }

    fn as_writable_mut(&mut self) -> Option<&mut dyn Writable> {
        if self.access.write { Some(self) } else { None }
    }

    fn as_seekable(&self) -> Option<&dyn Seekable> {
        Some(self)
    }

    fn as_seekable_mut(&mut self) -> Option<&mut dyn Seekable> {
        Some(self)
    }

    fn as_resource(&self) -> Option<&dyn ResourceBacked> {
        Some(self)
    }

    fn into_owned_fd(self: Box<Self>) -> Option<OwnedFd> {
        match Rc::try_unwrap(self.state) {
            Ok(state) => Some(OwnedFd::from(state.file)),
            // A task still holds the file; hand out a duplicate instead.
            Err(state) => state.file.try_clone().ok().map(OwnedFd::from),
        }
    }
}
