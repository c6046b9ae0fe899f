//! BZip2 algorithm pair, backed by the bzip2 crate's raw streams.

use bzip2::{Action, Compress, Compression, Decompress, Status};

use crate::codec::{Algorithm, CompressionMethod, ProcessStep};
use crate::stat::{FileAttributes, Stat};
use crate::{Error, Result};

/// ZIP version 4.6 can extract BZip2.
const VERSION_NEEDED: u16 = 46;

fn level(flags: u32) -> Compression {
    match flags {
        1..=9 => Compression::new(flags),
        _ => Compression::best(),
    }
}

pub(crate) fn new_compressor(
    _method: CompressionMethod,
    flags: u32,
) -> Result<Box<dyn Algorithm>> {
    Ok(Box::new(Bzip2Compressor {
        stream: Compress::new(level(flags), 0),
        flags,
        input: Vec::new(),
        consumed: 0,
        eof: false,
    }))
}

pub(crate) fn new_decompressor(
    _method: CompressionMethod,
    _flags: u32,
) -> Result<Box<dyn Algorithm>> {
    Ok(Box::new(Bzip2Decompressor {
        stream: Decompress::new(false),
        input: Vec::new(),
        consumed: 0,
        eof: false,
    }))
}

struct Bzip2Compressor {
    stream: Compress,
    flags: u32,
    input: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl Algorithm for Bzip2Compressor {
    fn start(&mut self, _stat: &Stat, _attributes: &FileAttributes) -> Result<()> {
        // The bzip2 stream has no reset; recreate it for each open.
        self.stream = Compress::new(level(self.flags), 0);
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
        let action = if self.eof { Action::Finish } else { Action::Run };
        let before_in = self.stream.total_in();
        let before_out = self.stream.total_out();
        let status = self
            .stream
            .compress(&self.input[self.consumed..], out, action)
            .map_err(|_| Error::Internal)?;
        self.consumed += (self.stream.total_in() - before_in) as usize;
        let produced = (self.stream.total_out() - before_out) as usize;

        match status {
            Status::StreamEnd => Ok(ProcessStep::End(produced)),
            Status::MemNeeded => Err(Error::Memory),
            _ => {
                if produced == 0 && self.consumed == self.input.len() && !self.eof {
                    Ok(ProcessStep::NeedData)
                } else {
                    Ok(ProcessStep::Produced(produced))
                }
            }
        }
    }

    fn general_purpose_bit_flags(&self) -> u16 {
        0
    }

    fn version_needed(&self) -> u16 {
        VERSION_NEEDED
    }
}

struct Bzip2Decompressor {
    stream: Decompress,
    input: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl Algorithm for Bzip2Decompressor {
    fn start(&mut self, _stat: &Stat, _attributes: &FileAttributes) -> Result<()> {
        self.stream = Decompress::new(false);
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
        let before_in = self.stream.total_in();
        let before_out = self.stream.total_out();
        let status = self
            .stream
            .decompress(&self.input[self.consumed..], out)
            .map_err(|_| Error::CompressedData)?;
        self.consumed += (self.stream.total_in() - before_in) as usize;
        let produced = (self.stream.total_out() - before_out) as usize;

        match status {
            Status::StreamEnd => Ok(ProcessStep::End(produced)),
            Status::MemNeeded => Err(Error::Memory),
            _ => {
                if produced == 0 && self.consumed == self.input.len() {
                    if self.eof {
                        Err(Error::UnexpectedEof)
                    } else {
                        Ok(ProcessStep::NeedData)
                    }
                } else {
                    Ok(ProcessStep::Produced(produced))
                }
            }
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

    #[test]
    fn test_bzip2_roundtrip_through_plugin_contract() {
        let data: Vec<u8> = b"squash this text with bzip2 ".repeat(64);

        let mut compressor = new_compressor(CompressionMethod::Bzip2, 0).unwrap();
        compressor
            .start(&Stat::default(), &FileAttributes::default())
            .unwrap();
        let mut compressed = Vec::new();
        let mut chunk = [0u8; 128];
        let mut remaining: &[u8] = &data;
        loop {
            match compressor.process(&mut chunk).unwrap() {
                ProcessStep::Produced(n) => compressed.extend_from_slice(&chunk[..n]),
                ProcessStep::End(n) => {
                    compressed.extend_from_slice(&chunk[..n]);
                    break;
                }
                ProcessStep::NeedData => {
                    if remaining.is_empty() {
                        compressor.end_of_input();
                    } else {
                        let take = remaining.len().min(100);
                        compressor.input(&remaining[..take]);
                        remaining = &remaining[take..];
                    }
                }
            }
        }

        let mut decompressor = new_decompressor(CompressionMethod::Bzip2, 0).unwrap();
        decompressor
            .start(&Stat::default(), &FileAttributes::default())
            .unwrap();
        let mut restored = Vec::new();
        let mut remaining: &[u8] = &compressed;
        loop {
            match decompressor.process(&mut chunk).unwrap() {
                ProcessStep::Produced(n) => restored.extend_from_slice(&chunk[..n]),
                ProcessStep::End(n) => {
                    restored.extend_from_slice(&chunk[..n]);
                    break;
                }
                ProcessStep::NeedData => {
                    let take = remaining.len().min(100);
                    decompressor.input(&remaining[..take]);
                    remaining = &remaining[take..];
                }
            }
        }
        assert_eq!(restored, data);
    }
}
