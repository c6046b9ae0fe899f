//! Minimal archive host: the entry offset table windows consult, and the
//! registry of sources that must die with the archive.
//!
//! The full ZIP container (directory parsing, names, saving) lives outside
//! this crate; sources only need two services from their archive. A window
//! built for an entry asks where that entry's data starts, and every source
//! handed out to callers registers itself so that discarding the archive
//! invalidates it — the caller may still hold the source, but every
//! operation on it fails with [`ArchiveClosed`](crate::Error::ArchiveClosed)
//! from then on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::grow::grow_by;
use crate::source::Source;
use crate::{Error, Inconsistency, Result};

/// Grow step for the open-source registry.
const REGISTRY_CHUNK: usize = 10;

/// The archive-side collaborator of the source pipeline.
#[derive(Default)]
pub struct Archive {
    /// Data offset of each entry inside the archive file.
    entry_offsets: Vec<u64>,
    /// Invalidation flags of the sources registered with this archive.
    open_sources: Vec<Arc<AtomicBool>>,
}

impl Archive {
    /// Creates an archive host with no entries.
    pub fn new() -> Archive {
        Archive::default()
    }

    /// Records an entry whose data starts at `data_offset` and returns its
    /// index.
    pub fn add_entry(&mut self, data_offset: u64) -> u64 {
        self.entry_offsets.push(data_offset);
        (self.entry_offsets.len() - 1) as u64
    }

    /// The archive-file offset of the entry's data.
    ///
    /// A missing entry or a zero offset means the central directory is
    /// lying about the entry.
    pub(crate) fn file_offset(&self, index: u64) -> Result<u64> {
        match self.entry_offsets.get(index as usize) {
            Some(&offset) if offset > 0 => Ok(offset),
            _ => Err(Error::Inconsistent(Inconsistency::CdirEntryInvalid {
                index,
            })),
        }
    }

    /// Registers `source` to be invalidated when this archive is
    /// discarded.
    pub fn register_source(&mut self, source: &Source) -> Result<()> {
        if self.open_sources.len() == self.open_sources.capacity() {
            grow_by(&mut self.open_sources, REGISTRY_CHUNK)?;
        }
        self.open_sources.push(source.closed_handle());
        Ok(())
    }

    /// Removes `source` from the registry; it will survive
    /// [`discard`](Archive::discard).
    pub fn deregister_source(&mut self, source: &Source) {
        let handle = source.closed_handle();
        if let Some(at) = self
            .open_sources
            .iter()
            .position(|registered| Arc::ptr_eq(registered, &handle))
        {
            self.open_sources.swap_remove(at);
        }
    }

    /// Discards the archive, invalidating every registered source.
    pub fn discard(mut self) {
        for handle in self.open_sources.drain(..) {
            handle.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_invalidates_registered_sources() {
        let mut archive = Archive::new();
        let mut source = Source::buffer(b"data".to_vec());
        archive.register_source(&source).unwrap();

        source.open().unwrap();
        archive.discard();

        let mut buf = [0u8; 4];
        assert!(matches!(source.read(&mut buf), Err(Error::ArchiveClosed)));
        assert!(matches!(source.open(), Err(Error::ArchiveClosed)));
        assert!(matches!(source.error(), Some(Error::ArchiveClosed)));
    }

    #[test]
    fn test_deregistered_source_survives_discard() {
        let mut archive = Archive::new();
        let mut source = Source::buffer(b"data".to_vec());
        archive.register_source(&source).unwrap();
        archive.deregister_source(&source);
        archive.discard();

        source.open().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        source.close().unwrap();
    }

    #[test]
    fn test_registry_grows_past_chunk_size() {
        let mut archive = Archive::new();
        let sources: Vec<Source> = (0..25).map(|_| Source::buffer(vec![0u8; 1])).collect();
        for source in &sources {
            archive.register_source(source).unwrap();
        }
        archive.discard();
        for mut source in sources {
            assert!(matches!(source.open(), Err(Error::ArchiveClosed)));
        }
    }

    #[test]
    fn test_file_offset_of_unknown_entry_fails() {
        let archive = Archive::new();
        assert!(matches!(
            archive.file_offset(3),
            Err(Error::Inconsistent(Inconsistency::CdirEntryInvalid { index: 3 }))
        ));
    }
}
