//! Zstandard algorithm pair, backed by zstd's raw streaming contexts.

use zstd::stream::raw::{Decoder, Encoder, InBuffer, Operation, OutBuffer};

use crate::codec::{Algorithm, CompressionMethod, ProcessStep};
use crate::stat::{FileAttributes, Stat};
use crate::{Error, Result};

/// ZIP version 6.3 can extract Zstandard.
const VERSION_NEEDED: u16 = 63;

fn level(flags: u32) -> i32 {
    // 0 lets the library pick its default level.
    flags.min(21) as i32
}

pub(crate) fn new_compressor(
    _method: CompressionMethod,
    flags: u32,
) -> Result<Box<dyn Algorithm>> {
    let encoder = Encoder::new(level(flags)).map_err(|_| Error::Memory)?;
    Ok(Box::new(ZstdCompressor {
        encoder,
        level: level(flags),
        input: Vec::new(),
        consumed: 0,
        eof: false,
    }))
}

pub(crate) fn new_decompressor(
    _method: CompressionMethod,
    _flags: u32,
) -> Result<Box<dyn Algorithm>> {
    let decoder = Decoder::new().map_err(|_| Error::Memory)?;
    Ok(Box::new(ZstdDecompressor {
        decoder,
        input: Vec::new(),
        consumed: 0,
        eof: false,
    }))
}

struct ZstdCompressor {
    encoder: Encoder<'static>,
    level: i32,
    input: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl Algorithm for ZstdCompressor {
    fn start(&mut self, _stat: &Stat, _attributes: &FileAttributes) -> Result<()> {
        self.encoder = Encoder::new(self.level).map_err(|_| Error::Memory)?;
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
        let mut output = OutBuffer::around(out);

        if self.consumed < self.input.len() {
            let mut input = InBuffer::around(&self.input[self.consumed..]);
            self.encoder
                .run(&mut input, &mut output)
                .map_err(|_| Error::Internal)?;
            self.consumed += input.pos;
            return Ok(ProcessStep::Produced(output.pos()));
        }

        if !self.eof {
            return Ok(ProcessStep::NeedData);
        }

        let remaining = self
            .encoder
            .finish(&mut output, true)
            .map_err(|_| Error::Internal)?;
        if remaining == 0 {
            Ok(ProcessStep::End(output.pos()))
        } else {
            Ok(ProcessStep::Produced(output.pos()))
        }
    }

    fn general_purpose_bit_flags(&self) -> u16 {
        0
    }

    fn version_needed(&self) -> u16 {
        VERSION_NEEDED
    }
}

struct ZstdDecompressor {
    decoder: Decoder<'static>,
    input: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl Algorithm for ZstdDecompressor {
    fn start(&mut self, _stat: &Stat, _attributes: &FileAttributes) -> Result<()> {
        self.decoder = Decoder::new().map_err(|_| Error::Memory)?;
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
        let mut input = InBuffer::around(&self.input[self.consumed..]);
        let mut output = OutBuffer::around(out);
        let hint = self
            .decoder
            .run(&mut input, &mut output)
            .map_err(|_| Error::CompressedData)?;
        self.consumed += input.pos;
        let produced = output.pos();

        if hint == 0 {
            return Ok(ProcessStep::End(produced));
        }
        if produced > 0 {
            return Ok(ProcessStep::Produced(produced));
        }
        if self.consumed == self.input.len() {
            if self.eof {
                // The frame is incomplete and no more input will come.
                return Err(Error::UnexpectedEof);
            }
            return Ok(ProcessStep::NeedData);
        }
        Ok(ProcessStep::Produced(0))
    }

    fn general_purpose_bit_flags(&self) -> u16 {
        0
    }

    fn version_needed(&self) -> u16 {
        VERSION_NEEDED
    }
}
