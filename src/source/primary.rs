//! Primary-mode lifecycle: the unique single reader of a source.
//!
//! Opens are reference counted: siblings that share a seekable source may
//! each open it, and the layer sees exactly one `open` and one `close` for
//! the whole group. Reads drain the layer until the request is filled or
//! the layer reports end of data; errors and EOF latch on the source so
//! later calls short-circuit without touching the layer again.

use std::io::SeekFrom;

use crate::source::layer::Lower;
use crate::source::{Command, Source, WriteState};
use crate::stat::{FileAttributes, Stat};
use crate::{Error, Result};

impl Source {
    /// Opens the primary reader.
    ///
    /// Opening an already-open source succeeds only when the source is
    /// seekable (the reader restarts); otherwise it fails with
    /// [`Error::InUse`]. On a layered source the lower source is opened
    /// first and closed again if this layer's open fails.
    pub fn open(&mut self) -> Result<()> {
        self.check_closed()?;
        if self.write_state == WriteState::Removed {
            return self.remember(Err(Error::Deleted));
        }

        if self.is_open() {
            if !self.supports.supports(Command::Seek) {
                return self.remember(Err(Error::InUse));
            }
        } else {
            if let Some(lower) = self.lower.as_deref_mut() {
                let opened = lower.open();
                if let Err(err) = opened {
                    return self.remember(Err(err));
                }
            }

            let result = {
                let Source { layer, lower, .. } = self;
                layer.open(Lower::new(lower.as_deref_mut(), None))
            };
            if let Err(err) = result {
                if let Some(lower) = self.lower.as_deref_mut() {
                    let _ = lower.close();
                }
                return self.remember(Err(err));
            }
        }

        self.eof = false;
        self.had_read_error = false;
        self.error = None;
        self.bytes_read = 0;
        self.open_count += 1;
        log::debug!("source opened (open_count={})", self.open_count);
        Ok(())
    }

    /// Reads up to `buf.len()` bytes into `buf`, returning the number of
    /// bytes read. Zero means end of data.
    ///
    /// The layer is drained until the buffer is full or it reports EOF. If
    /// the layer fails after some bytes were already produced, the partial
    /// count is returned and the error is latched for the next call.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_closed()?;
        if !self.is_open() || !self.supports.is_readable() {
            return self.remember(Err(Error::Invalid));
        }
        if self.had_read_error {
            return Err(self.error.clone().unwrap_or(Error::Internal));
        }
        if self.eof || buf.is_empty() {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            let result = {
                let Source { layer, lower, .. } = self;
                layer.read(Lower::new(lower.as_deref_mut(), None), &mut buf[filled..])
            };
            match result {
                Err(err) => {
                    self.had_read_error = true;
                    self.error = Some(err.clone());
                    if filled == 0 {
                        return Err(err);
                    }
                    break;
                }
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
            }
        }

        self.bytes_read = self.bytes_read.saturating_add(filled as u64);
        Ok(filled)
    }

    /// Repositions the primary reader.
    ///
    /// Only valid on an open, seekable source. A successful seek clears the
    /// EOF latch.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<()> {
        self.check_closed()?;
        if !self.is_open() || !self.supports.supports(Command::Seek) {
            return self.remember(Err(Error::Invalid));
        }

        let result = {
            let Source { layer, lower, .. } = self;
            layer.seek(Lower::new(lower.as_deref_mut(), None), pos)
        };
        match result {
            Ok(()) => {
                self.eof = false;
                Ok(())
            }
            Err(err) => self.remember(Err(err)),
        }
    }

    /// Reports the primary reader's position.
    ///
    /// Layers that support neither `Tell` nor `Seek` report the number of
    /// bytes read so far; that count fails with [`Error::Tell`] once it
    /// exceeds `i64::MAX`.
    pub fn tell(&mut self) -> Result<u64> {
        self.check_closed()?;
        if !self.is_open() {
            return self.remember(Err(Error::Invalid));
        }

        if !self.supports.supports(Command::Tell) && !self.supports.supports(Command::Seek) {
            if self.bytes_read > i64::MAX as u64 {
                return self.remember(Err(Error::Tell));
            }
            return Ok(self.bytes_read);
        }

        let result = {
            let Source { layer, lower, .. } = self;
            layer.tell(Lower::new(lower.as_deref_mut(), None))
        };
        self.remember(result)
    }

    /// Closes the primary reader.
    ///
    /// The layer (and, below it, the whole stack) is torn down when the
    /// open count reaches zero. Closing a source that is not open fails
    /// with [`Error::Invalid`].
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return self.remember(Err(Error::Invalid));
        }

        self.open_count -= 1;
        if self.open_count == 0 {
            let result = {
                let Source { layer, lower, .. } = self;
                layer.close(Lower::new(lower.as_deref_mut(), None))
            };
            if let Err(err) = result {
                log::warn!("layer close failed: {err}");
            }

            if let Some(lower) = self.lower.as_deref_mut() {
                if lower.close().is_err() {
                    return self.remember(Err(Error::Internal));
                }
            }
            log::debug!("source closed");
        }

        Ok(())
    }

    /// Queries the metadata of the data this source produces.
    ///
    /// The query starts at the leaf; every layer that advertises `Stat`
    /// overlays the fields it knows about.
    pub fn stat(&mut self) -> Result<Stat> {
        self.check_closed()?;
        let mut stat = Stat::new();
        self.stat_into(&mut stat)?;
        Ok(stat)
    }

    fn stat_into(&mut self, stat: &mut Stat) -> Result<()> {
        if let Some(lower) = self.lower.as_deref_mut() {
            lower.stat_into(stat)?;
        }
        if self.supports.supports(Command::Stat) {
            let result = {
                let Source { layer, lower, .. } = self;
                layer.stat(Lower::new(lower.as_deref_mut(), None), stat)
            };
            return self.remember(result);
        }
        Ok(())
    }

    /// Queries the ZIP directory attributes for the data this source
    /// produces, composed bottom-up like [`stat`](Source::stat).
    pub fn file_attributes(&mut self) -> Result<FileAttributes> {
        self.check_closed()?;
        let mut attributes = FileAttributes::new();
        self.file_attributes_into(&mut attributes)?;
        Ok(attributes)
    }

    fn file_attributes_into(&mut self, attributes: &mut FileAttributes) -> Result<()> {
        if let Some(lower) = self.lower.as_deref_mut() {
            lower.file_attributes_into(attributes)?;
        }
        if self.supports.supports(Command::GetFileAttributes) {
            let result = {
                let Source { layer, lower, .. } = self;
                layer.file_attributes(Lower::new(lower.as_deref_mut(), None), attributes)
            };
            return self.remember(result);
        }
        Ok(())
    }
}
