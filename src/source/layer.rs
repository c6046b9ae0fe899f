//! The per-layer command handler and the handle layers use to reach their
//! lower source.
//!
//! A [`Layer`] is the behavior of one level of a source stack: a leaf
//! producing bytes out of thin air (a buffer, a file), or a transformation
//! over the level below (a window, a compressor). The generic lifecycle —
//! open counting, read loops, stream ID bookkeeping — lives in
//! [`Source`](crate::Source); the layer only answers individual commands.
//!
//! Layers never hold a reference to the source that owns them. When a
//! command needs the level below, the dispatcher passes a [`Lower`] handle
//! already bound to the right parent stream, so the same layer code serves
//! the primary reader and every concurrent reader.

use std::any::Any;
use std::io::SeekFrom;

use crate::source::Source;
use crate::stat::{FileAttributes, Stat};
use crate::{Capabilities, Error, Result};

/// Opaque per-stream state established by [`Layer::open_stream`].
///
/// Each layer downcasts this back to its own stream type.
pub type UserStream = Box<dyn Any + Send>;

/// One level of a source stack.
///
/// Methods default to failing with [`Error::NotSupported`]; a layer
/// implements exactly the commands it advertises in [`Layer::supports`].
/// Private state is released by dropping the layer.
pub trait Layer: Send {
    /// The capability bitmap of this layer, including whatever lower-side
    /// capabilities it forwards.
    fn supports(&self) -> Capabilities;

    /// Prepares the primary reader.
    fn open(&mut self, lower: Lower<'_>) -> Result<()> {
        let _ = lower;
        Ok(())
    }

    /// Produces bytes for the primary reader. Returns the number of bytes
    /// written into `buf`; zero means end of data.
    fn read(&mut self, lower: Lower<'_>, buf: &mut [u8]) -> Result<usize> {
        let _ = (lower, buf);
        Err(Error::NotSupported)
    }

    /// Tears down the primary reader.
    fn close(&mut self, lower: Lower<'_>) -> Result<()> {
        let _ = lower;
        Ok(())
    }

    /// Repositions the primary reader.
    fn seek(&mut self, lower: Lower<'_>, pos: SeekFrom) -> Result<()> {
        let _ = (lower, pos);
        Err(Error::NotSupported)
    }

    /// Reports the primary reader's position.
    fn tell(&mut self, lower: Lower<'_>) -> Result<u64> {
        let _ = lower;
        Err(Error::NotSupported)
    }

    /// Overlays this layer's metadata onto `stat`.
    fn stat(&mut self, lower: Lower<'_>, stat: &mut Stat) -> Result<()> {
        let _ = (lower, stat);
        Err(Error::NotSupported)
    }

    /// Overlays this layer's directory attributes onto `attributes`.
    fn file_attributes(
        &mut self,
        lower: Lower<'_>,
        attributes: &mut FileAttributes,
    ) -> Result<()> {
        let _ = (lower, attributes);
        Err(Error::NotSupported)
    }

    /// Allocates the per-stream state for one new concurrent reader.
    fn open_stream(&mut self, lower: Lower<'_>) -> Result<UserStream> {
        let _ = lower;
        Err(Error::NotSupported)
    }

    /// Produces bytes for the concurrent reader owning `stream`.
    fn read_stream(
        &mut self,
        lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        buf: &mut [u8],
    ) -> Result<usize> {
        let _ = (lower, stream, buf);
        Err(Error::NotSupported)
    }

    /// Repositions the concurrent reader owning `stream`.
    fn seek_stream(
        &mut self,
        lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        pos: SeekFrom,
    ) -> Result<()> {
        let _ = (lower, stream, pos);
        Err(Error::NotSupported)
    }

    /// Reports the position of the concurrent reader owning `stream`.
    fn tell_stream(&mut self, lower: Lower<'_>, stream: &mut (dyn Any + Send)) -> Result<u64> {
        let _ = (lower, stream);
        Err(Error::NotSupported)
    }

    /// Tears down one concurrent reader, consuming its state.
    fn close_stream(&mut self, lower: Lower<'_>, stream: UserStream) -> Result<()> {
        let _ = (lower, stream);
        Ok(())
    }
}

/// A layer's handle to the source below it, bound to one reader.
///
/// For commands issued on the primary reader the handle routes to the
/// lower's primary entry points; for commands issued on a concurrent reader
/// it routes to the parent stream that was opened for it. Leaf layers
/// receive an empty handle.
pub struct Lower<'a> {
    source: Option<&'a mut Source>,
    stream_id: Option<usize>,
}

impl<'a> Lower<'a> {
    pub(crate) fn new(source: Option<&'a mut Source>, stream_id: Option<usize>) -> Self {
        Self { source, stream_id }
    }

    /// Whether this layer actually has a source below it.
    pub fn is_present(&self) -> bool {
        self.source.is_some()
    }

    fn source(&mut self) -> Result<&mut Source> {
        self.source.as_deref_mut().ok_or(Error::Internal)
    }

    /// Reads from the lower source.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream_id = self.stream_id;
        let source = self.source()?;
        match stream_id {
            None => source.read(buf),
            Some(id) => source.read_stream(id, buf),
        }
    }

    /// Repositions the lower source.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<()> {
        let stream_id = self.stream_id;
        let source = self.source()?;
        match stream_id {
            None => source.seek(pos),
            Some(id) => source.seek_stream(id, pos),
        }
    }

    /// Reports the lower source's position.
    pub fn tell(&mut self) -> Result<u64> {
        let stream_id = self.stream_id;
        let source = self.source()?;
        match stream_id {
            None => source.tell(),
            Some(id) => source.tell_stream(id),
        }
    }

    /// Queries the lower source's metadata.
    pub fn stat(&mut self) -> Result<Stat> {
        self.source()?.stat()
    }

    /// Queries the lower source's directory attributes.
    pub fn file_attributes(&mut self) -> Result<FileAttributes> {
        self.source()?.file_attributes()
    }
}
