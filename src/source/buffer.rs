//! In-memory leaf source.

use std::any::Any;
use std::io::SeekFrom;

use crate::source::layer::{Layer, Lower, UserStream};
use crate::source::{Capabilities, Command, Source, compute_offset};
use crate::stat::Stat;
use crate::{Error, Result};

/// Leaf layer serving bytes from an owned buffer.
///
/// Fully seekable, reopenable, and able to host any number of seekable
/// streams: every reader is just a cursor into the shared bytes.
struct BufferLayer {
    data: Vec<u8>,
    crc: u32,
    position: u64,
}

/// One concurrent reader: an independent cursor into the layer's buffer.
struct BufferStream {
    position: u64,
}

impl BufferLayer {
    fn read_at(data: &[u8], position: &mut u64, buf: &mut [u8]) -> usize {
        let start = (*position).min(data.len() as u64) as usize;
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        *position += n as u64;
        n
    }
}

impl Layer for BufferLayer {
    fn supports(&self) -> Capabilities {
        Capabilities::SEEKABLE
            .union(Capabilities::SEEKABLE_STREAMS)
            .with(Command::Reopen)
    }

    fn open(&mut self, _lower: Lower<'_>) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn read(&mut self, _lower: Lower<'_>, buf: &mut [u8]) -> Result<usize> {
        Ok(Self::read_at(&self.data, &mut self.position, buf))
    }

    fn seek(&mut self, _lower: Lower<'_>, pos: SeekFrom) -> Result<()> {
        self.position = compute_offset(self.position, self.data.len() as u64, pos)?;
        Ok(())
    }

    fn tell(&mut self, _lower: Lower<'_>) -> Result<u64> {
        Ok(self.position)
    }

    fn stat(&mut self, _lower: Lower<'_>, stat: &mut Stat) -> Result<()> {
        stat.size = Some(self.data.len() as u64);
        stat.crc = Some(self.crc);
        Ok(())
    }

    fn open_stream(&mut self, _lower: Lower<'_>) -> Result<UserStream> {
        Ok(Box::new(BufferStream { position: 0 }))
    }

    fn read_stream(
        &mut self,
        _lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        buf: &mut [u8],
    ) -> Result<usize> {
        let stream = downcast_stream(stream)?;
        Ok(Self::read_at(&self.data, &mut stream.position, buf))
    }

    fn seek_stream(
        &mut self,
        _lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        pos: SeekFrom,
    ) -> Result<()> {
        let stream = downcast_stream(stream)?;
        stream.position = compute_offset(stream.position, self.data.len() as u64, pos)?;
        Ok(())
    }

    fn tell_stream(&mut self, _lower: Lower<'_>, stream: &mut (dyn Any + Send)) -> Result<u64> {
        Ok(downcast_stream(stream)?.position)
    }
}

fn downcast_stream(stream: &mut (dyn Any + Send)) -> Result<&mut BufferStream> {
    stream.downcast_mut().ok_or(Error::Internal)
}

impl Source {
    /// Creates a source serving the given bytes.
    ///
    /// The source is seekable, may be reopened, and hosts seekable streams.
    /// Its [`Stat`] reports the buffer length and CRC-32.
    pub fn buffer(data: impl Into<Vec<u8>>) -> Source {
        let data = data.into();
        let crc = crc32fast::hash(&data);
        Source::from_layer(BufferLayer {
            data,
            crc,
            position: 0,
        })
    }
}
