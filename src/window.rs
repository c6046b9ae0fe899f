//! Window layer: a read-only view of a sub-range of a lower source.
//!
//! A window exposes `[start, start + length)` of the source below it (or
//! `[start, ..)` when no length is given) as if it were the whole stream.
//! On a seekable lower the window repositions before every read, so many
//! windows can share one file handle; on a forward-only lower it emulates
//! the initial seek by draining and discarding bytes up to `start`.
//!
//! A bounded window treats running out of lower-level data as corruption:
//! the archive directory claimed more bytes than the backing file holds, so
//! the read fails with [`Error::UnexpectedEof`] rather than reporting a
//! clean end of stream.

use std::any::Any;
use std::io::SeekFrom;

use crate::archive::Archive;
use crate::source::{Capabilities, Command, Layer, Lower, Source, UserStream, compute_offset};
use crate::stat::{FileAttributes, Stat};
use crate::{BUFSIZE, Error, Inconsistency, Result};

/// Reader state: the absolute position in the lower source for the next
/// read.
struct WindowStream {
    offset: u64,
}

struct WindowLayer {
    start: u64,
    /// One past the last readable byte; `None` reads until lower EOF.
    end: Option<u64>,

    /// Primary-mode reader state.
    stream: WindowStream,

    stat: Stat,
    attributes: FileAttributes,
    supports: Capabilities,
    needs_seek: bool,
    needs_stream_seek: bool,
}

impl WindowLayer {
    /// Positions a fresh reader at the window start, draining a
    /// forward-only lower up to it.
    fn open_reader(
        start: u64,
        needs_seek: bool,
        lower: &mut Lower<'_>,
        stream: &mut WindowStream,
    ) -> Result<()> {
        if !needs_seek {
            let mut scratch = vec![0u8; BUFSIZE];
            let mut drained = 0;
            while drained < start {
                let chunk = ((start - drained).min(BUFSIZE as u64)) as usize;
                let n = lower.read(&mut scratch[..chunk])?;
                if n == 0 {
                    // The lower source ended before the window even starts.
                    return Err(Error::UnexpectedEof);
                }
                drained += n as u64;
            }
        }

        stream.offset = start;
        Ok(())
    }

    fn read_reader(
        end: Option<u64>,
        needs_seek: bool,
        lower: &mut Lower<'_>,
        stream: &mut WindowStream,
        buf: &mut [u8],
    ) -> Result<usize> {
        let mut len = buf.len() as u64;
        if let Some(end) = end {
            len = len.min(end - stream.offset);
        }
        if len == 0 {
            return Ok(0);
        }

        if needs_seek {
            lower.seek(SeekFrom::Start(stream.offset))?;
        }

        match lower.read(&mut buf[..len as usize]) {
            Err(_) => Err(Error::UnexpectedEof),
            Ok(0) => {
                if end.is_some_and(|end| stream.offset < end) {
                    Err(Error::UnexpectedEof)
                } else {
                    Ok(0)
                }
            }
            Ok(n) => {
                stream.offset += n as u64;
                Ok(n)
            }
        }
    }

    fn seek_reader(
        start: u64,
        end: Option<u64>,
        lower: &mut Lower<'_>,
        stream: &mut WindowStream,
        pos: SeekFrom,
    ) -> Result<()> {
        match end {
            Some(end) => {
                let new = compute_offset(stream.offset - start, end - start, pos)?;
                stream.offset = start + new;
                Ok(())
            }
            None => match pos {
                // No known end of our own: let the lower source resolve it,
                // then verify the result still lies inside the window.
                SeekFrom::End(delta) => {
                    lower.seek(SeekFrom::End(delta))?;
                    let new = lower.tell()?;
                    if new < start {
                        let _ = lower.seek(SeekFrom::Start(stream.offset));
                        return Err(Error::Invalid);
                    }
                    stream.offset = new;
                    Ok(())
                }
                SeekFrom::Start(offset) => {
                    let new = start.checked_add(offset).ok_or(Error::Invalid)?;
                    stream.offset = new;
                    Ok(())
                }
                SeekFrom::Current(delta) => {
                    let new = stream.offset.checked_add_signed(delta).ok_or(Error::Invalid)?;
                    if new < start {
                        return Err(Error::Invalid);
                    }
                    stream.offset = new;
                    Ok(())
                }
            },
        }
    }
}

impl Layer for WindowLayer {
    fn supports(&self) -> Capabilities {
        self.supports
    }

    fn open(&mut self, mut lower: Lower<'_>) -> Result<()> {
        Self::open_reader(self.start, self.needs_seek, &mut lower, &mut self.stream)
    }

    fn read(&mut self, mut lower: Lower<'_>, buf: &mut [u8]) -> Result<usize> {
        Self::read_reader(self.end, self.needs_seek, &mut lower, &mut self.stream, buf)
    }

    fn seek(&mut self, mut lower: Lower<'_>, pos: SeekFrom) -> Result<()> {
        Self::seek_reader(self.start, self.end, &mut lower, &mut self.stream, pos)
    }

    fn tell(&mut self, _lower: Lower<'_>) -> Result<u64> {
        Ok(self.stream.offset - self.start)
    }

    fn stat(&mut self, _lower: Lower<'_>, stat: &mut Stat) -> Result<()> {
        stat.merge_from(&self.stat);
        Ok(())
    }

    fn file_attributes(
        &mut self,
        _lower: Lower<'_>,
        attributes: &mut FileAttributes,
    ) -> Result<()> {
        *attributes = self.attributes.clone();
        Ok(())
    }

    fn open_stream(&mut self, mut lower: Lower<'_>) -> Result<UserStream> {
        let mut stream = WindowStream { offset: 0 };
        Self::open_reader(self.start, self.needs_stream_seek, &mut lower, &mut stream)?;
        Ok(Box::new(stream))
    }

    fn read_stream(
        &mut self,
        mut lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        buf: &mut [u8],
    ) -> Result<usize> {
        let stream = downcast_stream(stream)?;
        Self::read_reader(self.end, self.needs_stream_seek, &mut lower, stream, buf)
    }

    fn seek_stream(
        &mut self,
        mut lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        pos: SeekFrom,
    ) -> Result<()> {
        let stream = downcast_stream(stream)?;
        Self::seek_reader(self.start, self.end, &mut lower, stream, pos)
    }

    fn tell_stream(&mut self, _lower: Lower<'_>, stream: &mut (dyn Any + Send)) -> Result<u64> {
        Ok(downcast_stream(stream)?.offset - self.start)
    }
}

fn downcast_stream(stream: &mut (dyn Any + Send)) -> Result<&mut WindowStream> {
    stream.downcast_mut().ok_or(Error::Internal)
}

/// Builds a window source, optionally pre-filled with entry metadata and
/// translated by the entry's data offset inside `archive`.
pub(crate) fn window_new(
    lower: Source,
    start: u64,
    length: Option<u64>,
    stat: Option<Stat>,
    attributes: Option<FileAttributes>,
    archive: Option<(&Archive, u64)>,
) -> Result<Source> {
    if let Some(length) = length {
        start.checked_add(length).ok_or(Error::Invalid)?;
    }

    let mut offset = 0;
    if let Some((archive, index)) = archive {
        offset = archive.file_offset(index)?;
        let invalid = Error::Inconsistent(Inconsistency::CdirEntryInvalid { index });
        if let Some(length) = length {
            // The directory entry claims data past the zip64 limits.
            (start + length).checked_add(offset).ok_or(invalid)?;
        } else {
            start.checked_add(offset).ok_or(invalid)?;
        }
    }

    let start = start + offset;
    let end = length.map(|length| start + length);

    let lower_supports = lower.supports();
    let mut supports = lower_supports
        .intersect(Capabilities::SEEKABLE.with(Command::Reopen))
        .union(
            Capabilities::NONE
                .with(Command::GetFileAttributes)
                .with(Command::Supports)
                .with(Command::Tell),
        );
    let needs_seek = supports.supports(Command::Seek);
    let needs_stream_seek = lower_supports.has_seekable_streams();
    if needs_stream_seek {
        supports = supports.union(Capabilities::SEEKABLE_STREAMS);
    } else if lower_supports.has_readable_streams() {
        supports = supports.union(Capabilities::READABLE_STREAMS);
    }

    let mut merged = Stat::new();
    if let Some(stat) = stat {
        merged.merge_from(&stat);
    }

    let layer = WindowLayer {
        start,
        end,
        stream: WindowStream { offset: 0 },
        stat: merged,
        attributes: attributes.unwrap_or_default(),
        supports,
        needs_seek,
        needs_stream_seek,
    };

    Ok(Source::layered(lower, layer))
}

impl Source {
    /// Creates a read-only view of `[start, start + length)` of `lower`;
    /// with `length` of `None` the view extends to the lower's end.
    ///
    /// The window seeks the lower source before each read when it can, and
    /// drains bytes up to `start` at open time when it cannot. Fails with
    /// [`Error::Invalid`] when `start + length` overflows.
    pub fn window(lower: Source, start: u64, length: Option<u64>) -> Result<Source> {
        window_new(lower, start, length, None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_over_seekable_lower() {
        let lower = Source::buffer(b"0123456789".to_vec());
        let mut window = Source::window(lower, 2, Some(5)).unwrap();
        window.open().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(window.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"23456");
        assert_eq!(window.read(&mut buf).unwrap(), 0);
        window.close().unwrap();
    }

    #[test]
    fn test_window_overflow_rejected() {
        let lower = Source::buffer(Vec::new());
        assert!(matches!(
            Source::window(lower, u64::MAX, Some(2)),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn test_window_tell_is_window_relative() {
        let lower = Source::buffer(b"0123456789".to_vec());
        let mut window = Source::window(lower, 4, Some(4)).unwrap();
        window.open().unwrap();
        assert_eq!(window.tell().unwrap(), 0);
        let mut buf = [0u8; 2];
        window.read(&mut buf).unwrap();
        assert_eq!(window.tell().unwrap(), 2);
        window.close().unwrap();
    }

    #[test]
    fn test_window_seek_within_bounds() {
        let lower = Source::buffer(b"abcdefghij".to_vec());
        let mut window = Source::window(lower, 2, Some(6)).unwrap();
        window.open().unwrap();
        window.seek(SeekFrom::End(-2)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(window.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"gh");
        assert!(matches!(window.seek(SeekFrom::Start(7)), Err(Error::Invalid)));
        window.close().unwrap();
    }

    #[test]
    fn test_unbounded_window_seek_end_via_lower() {
        let lower = Source::buffer(b"0123456789".to_vec());
        let mut window = Source::window(lower, 4, None).unwrap();
        window.open().unwrap();
        window.seek(SeekFrom::End(-3)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(window.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"789");

        // Seeking before the window start through the lower end is refused.
        assert!(matches!(
            window.seek(SeekFrom::End(-9)),
            Err(Error::Invalid)
        ));
        window.close().unwrap();
    }

    #[test]
    fn test_window_stat_overlays_entry_metadata() {
        let lower = Source::buffer(b"0123456789".to_vec());
        let entry_stat = Stat {
            size: Some(4),
            comp_size: Some(4),
            ..Stat::default()
        };
        let mut window = window_new(lower, 3, Some(4), Some(entry_stat), None, None).unwrap();
        let stat = window.stat().unwrap();
        assert_eq!(stat.size, Some(4));
        assert_eq!(stat.comp_size, Some(4));
        // CRC of the whole lower buffer leaks through only when the entry
        // stat does not override it.
        assert!(stat.crc.is_some());
    }

    #[test]
    fn test_window_with_archive_offset() {
        let mut archive = Archive::new();
        let index = archive.add_entry(4);
        let lower = Source::buffer(b"....data....".to_vec());
        let mut window =
            window_new(lower, 0, Some(4), None, None, Some((&archive, index))).unwrap();
        window.open().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(window.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"data");
        window.close().unwrap();
    }

    #[test]
    fn test_window_with_archive_offset_overflow() {
        let mut archive = Archive::new();
        let index = archive.add_entry(u64::MAX - 5);
        let lower = Source::buffer(Vec::new());
        let err = window_new(lower, 2, Some(4), None, None, Some((&archive, index))).unwrap_err();
        assert!(matches!(
            err,
            Error::Inconsistent(Inconsistency::CdirEntryInvalid { index: i }) if i == index
        ));
    }
}
