//! std::io integration: reading a source through [`Read`] and [`Seek`].

use std::io::{self, Read, Seek, SeekFrom};

use crate::source::Source;
use crate::{Error, Result};

/// An opened source wrapped for use with `std::io` consumers.
///
/// [`SourceReader::open`] drives the source's primary reader;
/// [`SourceReader::open_independent`] opens a concurrent stream instead,
/// leaving the primary reader untouched — the mode the archive layer uses
/// when a caller asks for an entry handle that does not interfere with
/// other readers. Dropping the reader closes whichever reader it opened.
pub struct SourceReader {
    source: Source,
    stream_id: Option<usize>,
}

impl SourceReader {
    /// Opens the source's primary reader.
    pub fn open(mut source: Source) -> Result<SourceReader> {
        source.open()?;
        Ok(SourceReader {
            source,
            stream_id: None,
        })
    }

    /// Opens an independent stream on the source.
    ///
    /// Fails with [`Error::NotSupported`] when the source cannot host
    /// streams.
    pub fn open_independent(mut source: Source) -> Result<SourceReader> {
        if !source.supports().has_readable_streams() {
            return Err(Error::NotSupported);
        }
        let stream_id = source.open_stream()?;
        Ok(SourceReader {
            source,
            stream_id: Some(stream_id),
        })
    }

    /// The wrapped source.
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Whether this reader can seek.
    pub fn is_seekable(&self) -> bool {
        match self.stream_id {
            None => self.source.supports().is_seekable(),
            Some(_) => self.source.supports().has_seekable_streams(),
        }
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match self.stream_id {
            None => self.source.read(buf),
            Some(id) => self.source.read_stream(id, buf),
        };
        result.map_err(io::Error::from)
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.is_seekable() {
            return Err(io::Error::from(Error::NotSupported));
        }
        match self.stream_id {
            None => {
                self.source.seek(pos)?;
                Ok(self.source.tell()?)
            }
            Some(id) => {
                self.source.seek_stream(id, pos)?;
                Ok(self.source.tell_stream(id)?)
            }
        }
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        let result = match self.stream_id {
            None => self.source.close(),
            Some(id) => self.source.close_stream(id),
        };
        if let Err(err) = result {
            log::warn!("closing source reader failed: {err}");
        }
    }
}
