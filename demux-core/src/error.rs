//! Error types shared by every demuxer, parser, and bitstream filter in the workspace.

use std::fmt;

/// The reason a seek operation could not be completed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// The target timestamp is before the start of the stream.
    OutOfRange,
    /// The reader does not support seeking at all.
    Unseekable,
    /// The reader supports seeking, but not to the requested accuracy.
    NotAccurate,
}

impl fmt::Display for SeekErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SeekErrorKind::OutOfRange => "seek target is out of range",
            SeekErrorKind::Unseekable => "the input does not support seeking",
            SeekErrorKind::NotAccurate => "the seek could not be performed to the requested accuracy",
        };
        write!(f, "{}", msg)
    }
}

/// The error type returned by every fallible operation in this workspace.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),

    #[error("io operation interrupted")]
    IoInterrupted(#[source] std::io::Error),

    #[error("malformed stream: {0}")]
    Decode(String),

    #[error("seek error: {0}")]
    Seek(SeekErrorKind),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("limit reached: {0}")]
    Limit(&'static str),

    #[error("parser state was reset and must be reinitialized before further use")]
    ResetRequired,

    #[error("end of stream")]
    EndOfStream,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::Interrupted => Error::IoInterrupted(err),
            std::io::ErrorKind::UnexpectedEof => Error::EndOfStream,
            _ => Error::Io(err),
        }
    }
}

/// A specialized `Result` type used throughout this workspace.
pub type Result<T> = std::result::Result<T, Error>;

pub fn decode_error<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::Decode(msg.into()))
}

pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::Seek(kind))
}

pub fn unsupported_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Unsupported(msg))
}

pub fn limit_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Limit(msg))
}

pub fn reset_error<T>() -> Result<T> {
    Err(Error::ResetRequired)
}

pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::EndOfStream)
}
