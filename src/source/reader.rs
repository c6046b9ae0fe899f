//! Forward-only leaf source over an arbitrary reader.

use std::io::Read;

use crate::source::layer::{Layer, Lower};
use crate::source::{Capabilities, Command, Source};
use crate::Result;

/// Leaf layer pulling bytes from any [`Read`] implementation.
///
/// Advertises reading only: no seek, no reopen, no streams. Position
/// queries therefore fall back to the source's byte counter.
struct ReaderLayer<R> {
    reader: R,
}

impl<R: Read + Send + 'static> Layer for ReaderLayer<R> {
    fn supports(&self) -> Capabilities {
        Capabilities::READABLE.with(Command::Supports)
    }

    fn read(&mut self, _lower: Lower<'_>, buf: &mut [u8]) -> Result<usize> {
        Ok(self.reader.read(buf)?)
    }
}

impl Source {
    /// Creates a forward-only source pulling from `reader`.
    ///
    /// The source cannot seek, host streams, or rewind on reopen; it is the
    /// minimal leaf, useful for piping data that only exists once (sockets,
    /// process output, decompressed upstreams).
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Source {
        Source::from_layer(ReaderLayer { reader })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reader_source_is_forward_only() {
        let source = Source::from_reader(Cursor::new(b"data".to_vec()));
        let caps = source.supports();
        assert!(caps.is_readable());
        assert!(!caps.is_seekable());
        assert!(!caps.has_readable_streams());
        assert!(!caps.supports(Command::Reopen));
    }

    #[test]
    fn test_reader_source_reads_through() {
        let mut source = Source::from_reader(Cursor::new(b"stream of bytes".to_vec()));
        source.open().unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(source.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"stream");
        source.close().unwrap();
    }
}
