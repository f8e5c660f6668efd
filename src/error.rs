//! Error type shared by every codec in the crate.
//!
//! # Error classes
//!
//! | Class      | Variants                                              | Caller action |
//! |------------|-------------------------------------------------------|---------------|
//! | `Usage`    | [`Error::Usage`]                                      | fix the calling code |
//! | `Resource` | [`Error::BufferTooSmall`], [`Error::Io`]              | retry with more space |
//! | `Data`     | [`Error::FormatNotRecognized`], [`Error::Corrupt`], [`Error::UnsupportedOptions`] | reject the container |
//!
//! Multi-call codecs never report "need more input" or "output full" as an
//! error; they return a [`Status`] instead.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The caller broke an API contract (bad argument, wrong state).
    #[error("Programming error: {0}")]
    Usage(&'static str),
    /// Single-call encoding did not fit in the output buffer.
    #[error("Output buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
    /// Magic bytes did not match.  For the first Stream of a file this means
    /// "not .xz at all"; anywhere else it is corruption.
    #[error("File format not recognized")]
    FormatNotRecognized,
    #[error("Data is corrupt: {0}")]
    Corrupt(String),
    #[error("Unsupported options: {0}")]
    UnsupportedOptions(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse grouping of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Usage,
    Resource,
    Data,
}

impl Error {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedOptions(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Usage(_) => ErrorClass::Usage,
            Error::BufferTooSmall { .. } | Error::Io(_) => ErrorClass::Resource,
            Error::FormatNotRecognized
            | Error::Corrupt(_)
            | Error::UnsupportedOptions(_) => ErrorClass::Data,
        }
    }

    pub fn is_usage(&self) -> bool {
        self.class() == ErrorClass::Usage
    }
}

/// Outcome of one call into a multi-call codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Progress was made; call again with more input or output space.
    Pending,
    /// The value or field is complete.
    Done,
    /// Nothing could be done: the input was empty or the output was full.
    NoProgress,
}
