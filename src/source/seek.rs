//! Shared offset arithmetic for seekable layers.

use std::io::SeekFrom;

use crate::{Error, Result};

/// Computes the new position for a seek within a region of `size` bytes,
/// given the `current` position (both relative to the region's start).
///
/// Fails with [`Error::Invalid`] when the target lands outside `[0, size]`
/// or the arithmetic overflows.
pub(crate) fn compute_offset(current: u64, size: u64, pos: SeekFrom) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => size.checked_add_signed(delta),
    };
    match target {
        Some(offset) if offset <= size => Ok(offset),
        _ => Err(Error::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whence_variants() {
        assert_eq!(compute_offset(5, 100, SeekFrom::Start(7)).unwrap(), 7);
        assert_eq!(compute_offset(5, 100, SeekFrom::Current(-3)).unwrap(), 2);
        assert_eq!(compute_offset(5, 100, SeekFrom::End(-10)).unwrap(), 90);
    }

    #[test]
    fn test_seek_to_exact_end_allowed() {
        assert_eq!(compute_offset(0, 100, SeekFrom::End(0)).unwrap(), 100);
        assert_eq!(compute_offset(0, 100, SeekFrom::Start(100)).unwrap(), 100);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        assert!(compute_offset(0, 100, SeekFrom::Start(101)).is_err());
        assert!(compute_offset(0, 100, SeekFrom::Current(-1)).is_err());
        assert!(compute_offset(0, 100, SeekFrom::End(1)).is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(compute_offset(u64::MAX, u64::MAX, SeekFrom::Current(1)).is_err());
    }
}
