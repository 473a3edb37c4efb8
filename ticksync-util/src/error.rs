// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use std::fmt;
use std::io;

use thiserror::Error;

/// The blocking operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Seek,
    Tell,
    Length,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Seek => "seek",
            Operation::Tell => "tell",
            Operation::Length => "length",
        })
    }
}

/// A capability an async stream may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Readable,
    Writable,
    Seekable,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Readable => "readable",
            Capability::Writable => "writable",
            Capability::Seekable => "seekable",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The wrapped stream lacks the capability, or the adapter is detached.
    #[error("stream is not {capability}")]
    Unsupported {
        op: Operation,
        capability: Capability,
    },

    /// The scheduler ran out of work while the operation was still pending.
    #[error("scheduler emptied without resolving the {op} operation after {ticks} ticks")]
    Starved { op: Operation, ticks: u64 },

    /// The wrapped stream rejected the operation.
    #[error("error during stream {op}")]
    Failed {
        op: Operation,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn op(&self) -> Operation {
        match self {
            Error::Unsupported { op, .. } => *op,
            Error::Starved { op, .. } => *op,
            Error::Failed { op, .. } => *op,
        }
    }

    /// The error the wrapped stream rejected with, if any.
    pub fn cause(&self) -> Option<&io::Error> {
        match self {
            Error::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        let kind = match &value {
            Error::Unsupported { .. } => io::ErrorKind::Unsupported,
            Error::Starved { .. } => io::ErrorKind::Other,
            Error::Failed { source, .. } => source.kind(),
        };
        io::Error::new(kind, value)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
