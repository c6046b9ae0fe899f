//! Deflate algorithm pair, backed by flate2's raw streaming interface.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::codec::{Algorithm, CompressionMethod, ProcessStep};
use crate::stat::{FileAttributes, Stat};
use crate::{Error, Result};

/// ZIP version 2.0 can extract Deflate.
const VERSION_NEEDED: u16 = 20;

pub(crate) fn new_compressor(
    _method: CompressionMethod,
    flags: u32,
) -> Result<Box<dyn Algorithm>> {
    let level = match flags {
        0 => Compression::default(),
        level => Compression::new(level.min(9)),
    };
    Ok(Box::new(DeflateCompressor {
        stream: Compress::new(level, false),
        level: level.level(),
        input: Vec::new(),
        consumed: 0,
        eof: false,
    }))
}

pub(crate) fn new_decompressor(
    _method: CompressionMethod,
    _flags: u32,
) -> Result<Box<dyn Algorithm>> {
    Ok(Box::new(DeflateDecompressor {
        stream: Decompress::new(false),
        input: Vec::new(),
        consumed: 0,
        eof: false,
    }))
}

struct DeflateCompressor {
    stream: Compress,
    level: u32,
    input: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl Algorithm for DeflateCompressor {
    fn start(&mut self, _stat: &Stat, _attributes: &FileAttributes) -> Result<()> {
        self.stream.reset();
        self.input.clear();
        self.consumed = 0;
        self.eof = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }

    fn input(&mut self, data: &[u8]) {
        self.input.clear();
        self.input.extend_from_slice(data);
        self.consumed = 0;
    }

    fn end_of_input(&mut self) {
        self.eof = true;
    }

    fn process(&mut self, out: &mut [u8]) -> Result<ProcessStep> {
        let flush = if self.eof {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let before_in = self.stream.total_in();
        let before_out = self.stream.total_out();
        let status = self
            .stream
            .compress(&self.input[self.consumed..], out, flush)
            .map_err(|_| Error::Internal)?;
        self.consumed += (self.stream.total_in() - before_in) as usize;
        let produced = (self.stream.total_out() - before_out) as usize;

        match status {
            Status::StreamEnd => Ok(ProcessStep::End(produced)),
            Status::BufError => Ok(ProcessStep::NeedData),
            Status::Ok => Ok(ProcessStep::Produced(produced)),
        }
    }

    fn general_purpose_bit_flags(&self) -> u16 {
        // Compression-option bits: 01 = maximum, 10 = fast, 11 = super fast.
        match self.level {
            8..=9 => 1 << 1,
            2 => 1 << 2,
            1 => (1 << 1) | (1 << 2),
            _ => 0,
        }
    }

    fn version_needed(&self) -> u16 {
        VERSION_NEEDED
    }
}

struct DeflateDecompressor {
    stream: Decompress,
    input: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl Algorithm for DeflateDecompressor {
    fn start(&mut self, _stat: &Stat, _attributes: &FileAttributes) -> Result<()> {
        self.stream.reset(false);
        self.input.clear();
        self.consumed = 0;
        self.eof = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }

    fn input(&mut self, data: &[u8]) {
        self.input.clear();
        self.input.extend_from_slice(data);
        self.consumed = 0;
    }

    fn end_of_input(&mut self) {
        self.eof = true;
    }

    fn process(&mut self, out: &mut [u8]) -> Result<ProcessStep> {
        // Inflate finds the end of the stream on its own; the Finish hint
        // is only for single-call inflation.
        let flush = FlushDecompress::None;
        let before_in = self.stream.total_in();
        let before_out = self.stream.total_out();
        let status = self
            .stream
            .decompress(&self.input[self.consumed..], out, flush)
            .map_err(|_| Error::CompressedData)?;
        self.consumed += (self.stream.total_in() - before_in) as usize;
        let produced = (self.stream.total_out() - before_out) as usize;

        match status {
            Status::StreamEnd => Ok(ProcessStep::End(produced)),
            // No progress possible: either we need more input, or the
            // stream was truncated.
            Status::BufError if self.eof => Err(Error::UnexpectedEof),
            Status::BufError => Ok(ProcessStep::NeedData),
            Status::Ok => Ok(ProcessStep::Produced(produced)),
        }
    }

    fn general_purpose_bit_flags(&self) -> u16 {
        0
    }

    fn version_needed(&self) -> u16 {
        VERSION_NEEDED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_end(algorithm: &mut dyn Algorithm, mut input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            match algorithm.process(&mut chunk).unwrap() {
                ProcessStep::Produced(n) => out.extend_from_slice(&chunk[..n]),
                ProcessStep::End(n) => {
                    out.extend_from_slice(&chunk[..n]);
                    return out;
                }
                ProcessStep::NeedData => {
                    if input.is_empty() {
                        algorithm.end_of_input();
                    } else {
                        let take = input.len().min(37);
                        algorithm.input(&input[..take]);
                        input = &input[take..];
                    }
                }
            }
        }
    }

    #[test]
    fn test_deflate_roundtrip_through_plugin_contract() {
        let data: Vec<u8> = b"deflate me ".repeat(100);

        let mut compressor = new_compressor(CompressionMethod::Deflate, 0).unwrap();
        compressor
            .start(&Stat::default(), &FileAttributes::default())
            .unwrap();
        let compressed = run_to_end(compressor.as_mut(), &data);
        assert!(compressed.len() < data.len());

        let mut decompressor = new_decompressor(CompressionMethod::Deflate, 0).unwrap();
        decompressor
            .start(&Stat::default(), &FileAttributes::default())
            .unwrap();
        let restored = run_to_end(decompressor.as_mut(), &compressed);
        assert_eq!(restored, data);
    }

    #[test]
    fn test_corrupt_deflate_data_fails() {
        let mut decompressor = new_decompressor(CompressionMethod::Deflate, 0).unwrap();
        decompressor
            .start(&Stat::default(), &FileAttributes::default())
            .unwrap();
        decompressor.input(&[0xFF; 32]);
        let mut out = [0u8; 64];
        let mut failed = false;
        for _ in 0..4 {
            match decompressor.process(&mut out) {
                Err(Error::CompressedData) => {
                    failed = true;
                    break;
                }
                Ok(ProcessStep::NeedData) => decompressor.end_of_input(),
                Ok(_) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(failed);
    }

    #[test]
    fn test_level_maps_to_general_purpose_bits() {
        let max = new_compressor(CompressionMethod::Deflate, 9).unwrap();
        assert_eq!(max.general_purpose_bit_flags(), 1 << 1);
        let fast = new_compressor(CompressionMethod::Deflate, 2).unwrap();
        assert_eq!(fast.general_purpose_bit_flags(), 1 << 2);
        let normal = new_compressor(CompressionMethod::Deflate, 6).unwrap();
        assert_eq!(normal.general_purpose_bit_flags(), 0);
    }
}
