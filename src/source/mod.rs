//! The source protocol: layered, stream-capable producers of bytes.
//!
//! A [`Source`] is a stack of [`Layer`]s. The bottom layer is a leaf that
//! produces bytes on its own (an in-memory buffer, a file, an arbitrary
//! reader); every layer above transforms the one below it (a window over a
//! sub-range, on-the-fly compression or decompression). The `Source` itself
//! owns all state the protocol shares between layers: the open count, the
//! EOF and error latches, the byte counters, and the table of concurrent
//! streams.
//!
//! Two reading modes coexist on every source:
//!
//! * **primary mode** — the unique reader driven by [`open`](Source::open),
//!   [`read`](Source::read), [`tell`](Source::tell), [`close`](Source::close);
//! * **stream mode** — any number of concurrent readers, each identified by
//!   an ID from [`open_stream`](Source::open_stream) and driven with the
//!   `*_stream` twins. Streams on the same source are independent; a layered
//!   source transparently opens a parent stream on its lower source for each
//!   of its own streams.

mod buffer;
mod command;
mod file;
mod layer;
mod primary;
mod reader;
mod seek;
mod stream;

pub use command::{Capabilities, Command};
pub use layer::{Layer, Lower, UserStream};

pub(crate) use seek::compute_offset;
pub(crate) use stream::StreamRecord;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Error, Result};

/// Whether the archive entry backing a source still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteState {
    /// The entry is live.
    Normal,
    /// The entry was deleted; opening the source fails.
    Removed,
}

/// A stateful producer of bytes, built as a stack of layers.
///
/// See the [module docs](self) for the protocol; see
/// [`Source::buffer`], [`Source::file`], [`Source::from_reader`],
/// [`Source::window`], [`Source::compress`] and [`Source::decompress`]
/// for ways to build one.
pub struct Source {
    layer: Box<dyn Layer>,
    lower: Option<Box<Source>>,
    supports: Capabilities,
    write_state: WriteState,
    /// Shared with the owning archive's registry so that discarding the
    /// archive invalidates the source without holding a reference to it.
    closed: Arc<AtomicBool>,
    error: Option<Error>,

    // Primary-mode state.
    open_count: u64,
    eof: bool,
    had_read_error: bool,
    bytes_read: u64,

    // Stream-mode state. `streams.len()` is the table extent: live IDs are
    // exactly the `Some` slots, free IDs the `None` slots recorded below.
    streams: Vec<Option<StreamRecord>>,
    free_stream_ids: Vec<usize>,
}

impl Source {
    /// Creates a leaf source from a layer with nothing below it.
    ///
    /// The layer's capability bitmap is queried once and cached for the
    /// source's lifetime.
    pub fn from_layer(layer: impl Layer + 'static) -> Source {
        let layer: Box<dyn Layer> = Box::new(layer);
        let supports = layer.supports();
        Source {
            layer,
            lower: None,
            supports,
            write_state: WriteState::Normal,
            closed: Arc::new(AtomicBool::new(false)),
            error: None,
            open_count: 0,
            eof: false,
            had_read_error: false,
            bytes_read: 0,
            streams: Vec::new(),
            free_stream_ids: Vec::new(),
        }
    }

    /// Creates a source layered on top of `lower`, taking ownership of it.
    pub fn layered(lower: Source, layer: impl Layer + 'static) -> Source {
        let mut source = Source::from_layer(layer);
        source.lower = Some(Box::new(lower));
        source
    }

    /// The capability bitmap of this source.
    pub fn supports(&self) -> Capabilities {
        self.supports
    }

    /// The source below this one, if any.
    pub fn lower(&self) -> Option<&Source> {
        self.lower.as_deref()
    }

    /// The most recent error recorded on this source, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the primary reader has reached end of data.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Whether the primary reader is currently open.
    pub fn is_open(&self) -> bool {
        self.open_count > 0
    }

    /// The number of concurrent streams currently open on this source.
    pub fn open_stream_count(&self) -> usize {
        self.streams.len() - self.free_stream_ids.len()
    }

    /// Marks this source as belonging to a discarded archive.
    ///
    /// Every subsequent operation fails with [`Error::ArchiveClosed`].
    pub fn invalidate(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
        if self.error.is_none() {
            self.error = Some(Error::ArchiveClosed);
        }
    }

    /// Marks the archive entry backing this source as deleted; any further
    /// open attempt fails with [`Error::Deleted`].
    ///
    /// Called by the archive's write path when the entry a pending source
    /// was created for is removed.
    pub fn mark_removed(&mut self) {
        self.write_state = WriteState::Removed;
    }

    /// The invalidation flag shared with the archive registry.
    pub(crate) fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub(crate) fn source_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Fails with [`Error::ArchiveClosed`] once the owning archive is gone,
    /// recording the error the first time it is observed.
    fn check_closed(&mut self) -> Result<()> {
        if self.source_closed() {
            if self.error.is_none() {
                self.error = Some(Error::ArchiveClosed);
            }
            return Err(Error::ArchiveClosed);
        }
        Ok(())
    }

    /// Records a failed result as the source's last error.
    fn remember<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.error = Some(err.clone());
        }
        result
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("supports", &self.supports)
            .field("open_count", &self.open_count)
            .field("open_streams", &self.open_stream_count())
            .field("layered", &self.lower.is_some())
            .finish_non_exhaustive()
    }
}
