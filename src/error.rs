//! Error types for source pipeline operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes of the source protocol, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Errors
//! are also recorded on the source that produced them, so a caller holding a
//! source can inspect the most recent failure via
//! [`Source::error`](crate::Source::error) after the fact.
//!
//! Sources latch fatal read errors: once a read has failed, every further
//! read on the same reader returns the original error without touching the
//! underlying layer. To make that possible, `Error` is [`Clone`]; I/O
//! payloads are shared behind an [`Arc`].
//!
//! ```rust
//! use zipsource::{Error, Source};
//!
//! let mut source = Source::buffer(b"hello".to_vec());
//! match source.open() {
//!     Ok(()) => {}
//!     Err(Error::Deleted) => eprintln!("entry was removed from the archive"),
//!     Err(e) => eprintln!("open failed: {}", e),
//! }
//! ```

use std::io;
use std::sync::Arc;

use crate::codec::CompressionMethod;

/// A convenient `Result` alias for source pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Detail attached to [`Error::Inconsistent`], pinpointing what part of the
/// archive data contradicts itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Inconsistency {
    /// A central directory entry describes data that cannot exist, e.g. an
    /// entry whose offset plus length overflows the zip64 limits.
    #[error("central directory entry {index} is invalid")]
    CdirEntryInvalid {
        /// The index of the offending entry in the central directory.
        index: u64,
    },
}

/// The main error type for source pipeline operations.
///
/// Most variants correspond to one protocol-level failure mode; [`Io`]
/// wraps errors from leaf sources backed by real files or readers.
///
/// [`Io`]: Error::Io
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An allocation failed or a requested capacity is not representable.
    #[error("memory allocation failed")]
    Memory,

    /// An argument violated the preconditions of the operation, e.g. reading
    /// from a source that is not open, or seeking outside a window.
    #[error("invalid argument")]
    Invalid,

    /// The pipeline reached a state that should be impossible; typically a
    /// lower layer misbehaved during cleanup.
    #[error("internal inconsistency")]
    Internal,

    /// The source is already open and does not support being restarted.
    ///
    /// Only seekable sources may be opened while an earlier open is still
    /// active (the new open rewinds the stream).
    #[error("source already in use")]
    InUse,

    /// The archive entry backing this source was deleted.
    #[error("underlying archive entry was deleted")]
    Deleted,

    /// The archive owning this source was discarded; the source and all of
    /// its layers are permanently unusable.
    #[error("archive was closed")]
    ArchiveClosed,

    /// The source ran out of data before the announced end.
    ///
    /// A bounded window reports this when the backing file yields fewer
    /// bytes than the archive claims.
    #[error("premature end of data")]
    UnexpectedEof,

    /// A layer failed to produce its per-stream state while opening a
    /// stream.
    #[error("source could not be opened")]
    Open,

    /// The current read position is too large to report.
    #[error("read position not representable")]
    Tell,

    /// The layer does not implement the requested command.
    #[error("operation not supported")]
    NotSupported,

    /// No algorithm for the requested compression method is built into this
    /// binary.
    #[error("compression method not supported: {method:?}")]
    CompressionNotSupported {
        /// The method that has no registered algorithm.
        method: CompressionMethod,
    },

    /// Compressed data is damaged and cannot be decoded.
    #[error("compressed data invalid")]
    CompressedData,

    /// The archive data contradicts itself.
    #[error("inconsistent archive data: {0}")]
    Inconsistent(Inconsistency),

    /// An I/O error from a leaf source.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => io::Error::new(inner.kind(), Error::Io(inner)),
            Error::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::other(other),
        }
    }
}
