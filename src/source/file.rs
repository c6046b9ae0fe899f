//! File-backed leaf source.

use std::any::Any;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::source::layer::{Layer, Lower, UserStream};
use crate::source::{Capabilities, Command, Source};
use crate::stat::Stat;
use crate::{Error, Result};

/// Leaf layer serving bytes from a file on disk.
///
/// The file is opened lazily at `open`; every concurrent stream gets its
/// own handle on the same path, so streams seek independently.
struct FileLayer {
    path: PathBuf,
    file: Option<File>,
}

struct FileStream {
    file: File,
}

impl FileLayer {
    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::Internal)
    }
}

impl Layer for FileLayer {
    fn supports(&self) -> Capabilities {
        Capabilities::SEEKABLE
            .union(Capabilities::SEEKABLE_STREAMS)
            .with(Command::Reopen)
    }

    fn open(&mut self, _lower: Lower<'_>) -> Result<()> {
        self.file = Some(File::open(&self.path)?);
        Ok(())
    }

    fn read(&mut self, _lower: Lower<'_>, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buf)?)
    }

    fn seek(&mut self, _lower: Lower<'_>, pos: SeekFrom) -> Result<()> {
        self.file()?.seek(pos)?;
        Ok(())
    }

    fn tell(&mut self, _lower: Lower<'_>) -> Result<u64> {
        Ok(self.file()?.stream_position()?)
    }

    fn close(&mut self, _lower: Lower<'_>) -> Result<()> {
        self.file = None;
        Ok(())
    }

    fn stat(&mut self, _lower: Lower<'_>, stat: &mut Stat) -> Result<()> {
        let metadata = std::fs::metadata(&self.path)?;
        stat.size = Some(metadata.len());
        if let Ok(mtime) = metadata.modified() {
            stat.mtime = Some(mtime);
        }
        Ok(())
    }

    fn open_stream(&mut self, _lower: Lower<'_>) -> Result<UserStream> {
        let file = File::open(&self.path)?;
        Ok(Box::new(FileStream { file }))
    }

    fn read_stream(
        &mut self,
        _lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        buf: &mut [u8],
    ) -> Result<usize> {
        Ok(downcast_stream(stream)?.file.read(buf)?)
    }

    fn seek_stream(
        &mut self,
        _lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        pos: SeekFrom,
    ) -> Result<()> {
        downcast_stream(stream)?.file.seek(pos)?;
        Ok(())
    }

    fn tell_stream(&mut self, _lower: Lower<'_>, stream: &mut (dyn Any + Send)) -> Result<u64> {
        Ok(downcast_stream(stream)?.file.stream_position()?)
    }
}

fn downcast_stream(stream: &mut (dyn Any + Send)) -> Result<&mut FileStream> {
    stream.downcast_mut().ok_or(Error::Internal)
}

impl Source {
    /// Creates a source serving the contents of the file at `path`.
    ///
    /// The file is opened when the source is; a missing file surfaces as an
    /// [`Error::Io`] from [`open`](Source::open). Each concurrent stream
    /// opens its own handle, so streams never disturb each other's
    /// position.
    pub fn file(path: impl Into<PathBuf>) -> Source {
        Source::from_layer(FileLayer {
            path: path.into(),
            file: None,
        })
    }
}
