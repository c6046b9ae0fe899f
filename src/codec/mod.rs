//! Compression algorithm plug-ins for the compression layer.
//!
//! Each supported method provides a pair of [`Algorithm`] factories, one
//! per direction, registered in a compile-time table keyed by the ZIP
//! method number. Optional methods are feature-gated; `Store` never appears
//! in the table because stored data bypasses the compression layer
//! entirely.

mod deflate;

#[cfg(feature = "bzip2")]
mod bzip2;

#[cfg(feature = "zstd")]
mod zstd;

use crate::stat::{FileAttributes, Stat};
use crate::Result;

/// A ZIP compression method.
///
/// `Default` stands for "whatever the archive prefers" and resolves to
/// Deflate; it is also the only method for which the compression layer may
/// fall back to storing small inputs verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CompressionMethod {
    /// The archive's preferred method (resolves to Deflate).
    Default,
    /// No compression.
    Store,
    /// Deflate (method 8).
    Deflate,
    /// BZip2 (method 12).
    Bzip2,
    /// Zstandard (method 93).
    Zstd,
    /// Any other method number.
    Other(u16),
}

impl CompressionMethod {
    /// Resolves `Default` to the concrete method that will be used;
    /// everything else is already concrete.
    pub fn actual(self) -> CompressionMethod {
        match self {
            CompressionMethod::Default => CompressionMethod::Deflate,
            method => method,
        }
    }

    /// The ZIP method number recorded in the central directory.
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Store => 0,
            CompressionMethod::Default | CompressionMethod::Deflate => 8,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Other(code) => code,
        }
    }
}

/// Outcome of one [`Algorithm::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStep {
    /// `n` bytes were written to the output buffer; call again.
    Produced(usize),
    /// `n` bytes were written and the transformed stream is complete.
    End(usize),
    /// No progress without another chunk of input.
    NeedData,
}

/// One direction of one compression method.
///
/// The compression layer drives the algorithm in a strict pull loop: it
/// calls [`process`](Algorithm::process) until the algorithm asks for input
/// (fed via [`input`](Algorithm::input), or
/// [`end_of_input`](Algorithm::end_of_input) when the lower source is
/// exhausted) or reports the end of the transformed stream.
pub trait Algorithm: Send {
    /// Prepares for a fresh stream, given the lower source's metadata.
    fn start(&mut self, stat: &Stat, attributes: &FileAttributes) -> Result<()>;

    /// Finishes the stream; called at close time.
    fn end(&mut self) -> Result<()>;

    /// Supplies the next chunk of input. Only called after
    /// [`ProcessStep::NeedData`], with the previous chunk fully consumed.
    fn input(&mut self, data: &[u8]);

    /// Announces that no further input exists.
    fn end_of_input(&mut self);

    /// Writes transformed bytes into `out`.
    fn process(&mut self, out: &mut [u8]) -> Result<ProcessStep>;

    /// The general-purpose bits this algorithm wants recorded for the
    /// entry (e.g. the Deflate compression-option bits).
    fn general_purpose_bit_flags(&self) -> u16;

    /// The ZIP specification version needed to extract data produced by
    /// this algorithm.
    fn version_needed(&self) -> u16;
}

/// Creates the algorithm state for one reader.
pub(crate) type AlgorithmFactory = fn(method: CompressionMethod, flags: u32) -> Result<Box<dyn Algorithm>>;

/// Looks up the factory for `method` in the given direction, resolving
/// `Default` first. Returns `None` for methods not built in — including
/// `Store`, which has no algorithm.
pub(crate) fn find_algorithm(method: CompressionMethod, compress: bool) -> Option<AlgorithmFactory> {
    match method.actual() {
        CompressionMethod::Deflate => Some(if compress {
            deflate::new_compressor
        } else {
            deflate::new_decompressor
        }),

        #[cfg(feature = "bzip2")]
        CompressionMethod::Bzip2 => Some(if compress {
            bzip2::new_compressor
        } else {
            bzip2::new_decompressor
        }),

        #[cfg(feature = "zstd")]
        CompressionMethod::Zstd => Some(if compress {
            zstd::new_compressor
        } else {
            zstd::new_decompressor
        }),

        _ => None,
    }
}

/// Whether `method` can be processed in the given direction.
///
/// Always true for `Store` (stored data needs no algorithm); otherwise the
/// algorithm table decides.
pub fn compression_method_supported(method: CompressionMethod, compress: bool) -> bool {
    if method == CompressionMethod::Store {
        return true;
    }
    find_algorithm(method, compress).is_some()
}
