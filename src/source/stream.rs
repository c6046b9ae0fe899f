//! Stream-mode lifecycle: concurrent readers multiplexed over one source.
//!
//! Each reader is identified by a small integer ID. IDs are allocated from
//! a free list of previously closed slots before the table grows, so the
//! table never exceeds the maximum number of simultaneously open streams.
//! Closing the highest live ID contracts the table instead, swallowing any
//! free IDs that become trailing.
//!
//! On a layered source every stream owns a parent stream on the lower
//! source; the pair is opened and closed together, exactly once each.

use std::io::SeekFrom;

use crate::grow::grow_by;
use crate::source::layer::{Lower, UserStream};
use crate::source::{Source, WriteState};
use crate::{Error, Result};

/// Per-stream state kept by the source that issued the ID.
pub(crate) struct StreamRecord {
    /// ID of the paired stream on the lower source; `None` on a leaf.
    parent_stream_id: Option<usize>,
    /// The layer's private state for this stream.
    user_stream: UserStream,
    eof: bool,
    had_read_error: bool,
    /// The error that tripped `had_read_error`, re-returned by later reads.
    error: Option<Error>,
    bytes_read: u64,
}

impl Source {
    /// Opens a new concurrent reader and returns its stream ID.
    ///
    /// On a layered source a parent stream is first opened on the lower
    /// source; any later failure closes it again before returning. Fails
    /// with [`Error::NotSupported`] when the layer does not host streams.
    pub fn open_stream(&mut self) -> Result<usize> {
        self.check_closed()?;
        if self.write_state == WriteState::Removed {
            return self.remember(Err(Error::Deleted));
        }

        let parent_stream_id = match self.lower.as_deref_mut() {
            Some(lower) => match lower.open_stream() {
                Ok(id) => Some(id),
                Err(err) => return self.remember(Err(err)),
            },
            None => None,
        };

        let opened = {
            let Source { layer, lower, .. } = self;
            layer.open_stream(Lower::new(lower.as_deref_mut(), parent_stream_id))
        };
        let user_stream = match opened {
            Ok(user_stream) => user_stream,
            Err(err) => {
                self.close_parent_stream(parent_stream_id);
                return self.remember(Err(err));
            }
        };

        let record = StreamRecord {
            parent_stream_id,
            user_stream,
            eof: false,
            had_read_error: false,
            error: None,
            bytes_read: 0,
        };

        let id = match self.free_stream_ids.pop() {
            Some(id) => {
                debug_assert!(self.streams[id].is_none());
                self.streams[id] = Some(record);
                id
            }
            None => {
                if self.streams.len() == self.streams.capacity() {
                    let half = self.streams.capacity() / 2;
                    if let Err(err) = grow_by(&mut self.streams, half) {
                        let StreamRecord { user_stream, .. } = record;
                        let closed = {
                            let Source { layer, lower, .. } = self;
                            layer.close_stream(
                                Lower::new(lower.as_deref_mut(), parent_stream_id),
                                user_stream,
                            )
                        };
                        if let Err(close_err) = closed {
                            log::warn!("stream teardown after failed allocation: {close_err}");
                        }
                        self.close_parent_stream(parent_stream_id);
                        return self.remember(Err(err));
                    }
                }
                self.streams.push(Some(record));
                self.streams.len() - 1
            }
        };

        log::debug!("stream {id} opened ({} live)", self.open_stream_count());
        Ok(id)
    }

    /// Reads up to `buf.len()` bytes from the stream identified by `id`.
    ///
    /// Per-stream EOF and error latches mirror the primary-mode behavior;
    /// the primary reader's counters are unaffected.
    pub fn read_stream(&mut self, id: usize, buf: &mut [u8]) -> Result<usize> {
        self.check_closed()?;
        if !self.is_valid_stream_id(id) {
            return self.remember(Err(Error::Invalid));
        }

        let Source {
            streams,
            layer,
            lower,
            error,
            ..
        } = self;
        let record = streams[id].as_mut().expect("validated stream id");

        if record.had_read_error {
            return Err(record.error.clone().unwrap_or(Error::Internal));
        }
        if record.eof || buf.is_empty() {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            let result = layer.read_stream(
                Lower::new(lower.as_deref_mut(), record.parent_stream_id),
                record.user_stream.as_mut(),
                &mut buf[filled..],
            );
            match result {
                Err(err) => {
                    record.had_read_error = true;
                    record.error = Some(err.clone());
                    *error = Some(err.clone());
                    if filled == 0 {
                        return Err(err);
                    }
                    break;
                }
                Ok(0) => {
                    record.eof = true;
                    break;
                }
                Ok(n) => filled += n,
            }
        }

        record.bytes_read = record.bytes_read.saturating_add(filled as u64);
        Ok(filled)
    }

    /// Repositions the stream identified by `id`.
    ///
    /// Only meaningful on sources with seekable streams; a successful seek
    /// clears the stream's EOF latch.
    pub fn seek_stream(&mut self, id: usize, pos: SeekFrom) -> Result<()> {
        self.check_closed()?;
        if !self.is_valid_stream_id(id) {
            return self.remember(Err(Error::Invalid));
        }

        let result = {
            let Source {
                streams,
                layer,
                lower,
                ..
            } = self;
            let record = streams[id].as_mut().expect("validated stream id");
            layer.seek_stream(
                Lower::new(lower.as_deref_mut(), record.parent_stream_id),
                record.user_stream.as_mut(),
                pos,
            )
        };
        match result {
            Ok(()) => {
                let record = self.streams[id].as_mut().expect("validated stream id");
                record.eof = false;
                Ok(())
            }
            Err(err) => self.remember(Err(err)),
        }
    }

    /// Reports the position of the stream identified by `id`.
    ///
    /// Sources without seekable streams report the stream's byte counter,
    /// failing with [`Error::Tell`] once it exceeds `i64::MAX`.
    pub fn tell_stream(&mut self, id: usize) -> Result<u64> {
        self.check_closed()?;
        if !self.is_valid_stream_id(id) {
            return self.remember(Err(Error::Invalid));
        }

        if !self.supports.has_seekable_streams() {
            let record = self.streams[id].as_ref().expect("validated stream id");
            if record.bytes_read > i64::MAX as u64 {
                return self.remember(Err(Error::Tell));
            }
            return Ok(record.bytes_read);
        }

        let result = {
            let Source {
                streams,
                layer,
                lower,
                ..
            } = self;
            let record = streams[id].as_mut().expect("validated stream id");
            layer.tell_stream(
                Lower::new(lower.as_deref_mut(), record.parent_stream_id),
                record.user_stream.as_mut(),
            )
        };
        self.remember(result)
    }

    /// Closes the stream identified by `id`.
    ///
    /// The layer's per-stream state is torn down and, on a layered source,
    /// the parent stream is closed exactly once. The freed ID is recorded
    /// for reuse (or the table contracts when the highest ID closes); the
    /// bookkeeping happens even when teardown reports a failure, so the ID
    /// set stays consistent.
    pub fn close_stream(&mut self, id: usize) -> Result<()> {
        if !self.is_valid_stream_id(id) {
            return self.remember(Err(Error::Invalid));
        }

        let record = self.streams[id].take().expect("validated stream id");
        let StreamRecord {
            parent_stream_id,
            user_stream,
            ..
        } = record;

        let mut result = {
            let Source { layer, lower, .. } = self;
            layer.close_stream(
                Lower::new(lower.as_deref_mut(), parent_stream_id),
                user_stream,
            )
        };

        if let Some(parent_id) = parent_stream_id {
            if let Some(lower) = self.lower.as_deref_mut() {
                if let Err(err) = lower.close_stream(parent_id) {
                    if result.is_ok() {
                        result = Err(Error::Internal);
                    } else {
                        log::warn!("parent stream {parent_id} close failed: {err}");
                    }
                }
            }
        }

        if id + 1 == self.streams.len() {
            self.streams.pop();
            // Contract past any free slots that are now trailing.
            while matches!(self.streams.last(), Some(None)) {
                let trailing = self.streams.len() - 1;
                if let Some(at) = self.free_stream_ids.iter().rposition(|&f| f == trailing) {
                    self.free_stream_ids.swap_remove(at);
                }
                self.streams.pop();
            }
        } else {
            if self.free_stream_ids.len() == self.free_stream_ids.capacity() {
                let half = self.free_stream_ids.capacity() / 2;
                if let Err(err) = grow_by(&mut self.free_stream_ids, half) {
                    return self.remember(Err(err));
                }
            }
            self.free_stream_ids.push(id);
        }

        log::debug!("stream {id} closed ({} live)", self.open_stream_count());
        self.remember(result)
    }

    fn is_valid_stream_id(&self, id: usize) -> bool {
        id < self.streams.len() && self.streams[id].is_some()
    }

    fn close_parent_stream(&mut self, parent_stream_id: Option<usize>) {
        if let Some(parent_id) = parent_stream_id {
            if let Some(lower) = self.lower.as_deref_mut() {
                if let Err(err) = lower.close_stream(parent_id) {
                    log::warn!("parent stream {parent_id} close failed: {err}");
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn stream_table_extent(&self) -> usize {
        self.streams.len()
    }

    #[cfg(test)]
    pub(crate) fn free_stream_id_count(&self) -> usize {
        self.free_stream_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_source() -> Source {
        Source::buffer(b"0123456789abcdef".to_vec())
    }

    #[test]
    fn test_stream_ids_are_sequential() {
        let mut source = streaming_source();
        assert_eq!(source.open_stream().unwrap(), 0);
        assert_eq!(source.open_stream().unwrap(), 1);
        assert_eq!(source.open_stream().unwrap(), 2);
        assert_eq!(source.open_stream_count(), 3);
    }

    #[test]
    fn test_closed_id_is_reused_before_growth() {
        let mut source = streaming_source();
        for _ in 0..3 {
            source.open_stream().unwrap();
        }
        source.close_stream(1).unwrap();
        assert_eq!(source.free_stream_id_count(), 1);
        assert_eq!(source.open_stream().unwrap(), 1);
        assert_eq!(source.free_stream_id_count(), 0);
        assert_eq!(source.stream_table_extent(), 3);
    }

    #[test]
    fn test_table_contracts_when_tail_closes() {
        let mut source = streaming_source();
        for _ in 0..3 {
            source.open_stream().unwrap();
        }
        source.close_stream(1).unwrap();
        assert_eq!(source.open_stream().unwrap(), 1);

        // Closing in ascending order leaves holes that the final tail close
        // swallows.
        source.close_stream(0).unwrap();
        source.close_stream(1).unwrap();
        source.close_stream(2).unwrap();
        assert_eq!(source.open_stream_count(), 0);
        assert_eq!(source.stream_table_extent(), 0);
        assert_eq!(source.free_stream_id_count(), 0);
    }

    #[test]
    fn test_tail_close_contracts_immediately() {
        let mut source = streaming_source();
        source.open_stream().unwrap();
        source.open_stream().unwrap();
        source.close_stream(1).unwrap();
        assert_eq!(source.stream_table_extent(), 1);
        assert_eq!(source.free_stream_id_count(), 0);
        assert_eq!(source.open_stream().unwrap(), 1);
    }

    #[test]
    fn test_invalid_stream_id_rejected() {
        let mut source = streaming_source();
        let mut buf = [0u8; 1];
        assert!(matches!(source.read_stream(0, &mut buf), Err(Error::Invalid)));
        let id = source.open_stream().unwrap();
        source.close_stream(id).unwrap();
        assert!(matches!(source.close_stream(id), Err(Error::Invalid)));
    }

    #[test]
    fn test_streams_are_independent() {
        let mut source = streaming_source();
        let a = source.open_stream().unwrap();
        let b = source.open_stream().unwrap();

        let mut buf = [0u8; 4];
        source.read_stream(a, &mut buf).unwrap();
        assert_eq!(&buf, b"0123");
        source.read_stream(b, &mut buf).unwrap();
        assert_eq!(&buf, b"0123");
        source.read_stream(a, &mut buf).unwrap();
        assert_eq!(&buf, b"4567");

        assert_eq!(source.tell_stream(a).unwrap(), 8);
        assert_eq!(source.tell_stream(b).unwrap(), 4);
    }

    #[test]
    fn test_streams_do_not_touch_primary_counters() {
        let mut source = streaming_source();
        source.open().unwrap();
        let id = source.open_stream().unwrap();
        let mut buf = [0u8; 8];
        source.read_stream(id, &mut buf).unwrap();
        assert_eq!(source.tell().unwrap(), 0);
        source.close_stream(id).unwrap();
        source.close().unwrap();
    }

    #[test]
    fn test_stream_seek_clears_eof() {
        let mut source = streaming_source();
        let id = source.open_stream().unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(source.read_stream(id, &mut buf).unwrap(), 16);
        assert_eq!(source.read_stream(id, &mut buf).unwrap(), 0);

        source.seek_stream(id, SeekFrom::Start(10)).unwrap();
        assert_eq!(source.read_stream(id, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"abcdef");
    }

    #[test]
    fn test_open_stream_without_stream_support_fails() {
        let mut source = Source::from_reader(std::io::empty());
        assert!(matches!(source.open_stream(), Err(Error::NotSupported)));
    }

    #[test]
    fn test_open_stream_on_removed_source_fails() {
        let mut source = streaming_source();
        source.mark_removed();
        assert!(matches!(source.open_stream(), Err(Error::Deleted)));
    }
}
