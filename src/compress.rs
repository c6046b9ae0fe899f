//! Compression layer: on-the-fly (de)compression of a lower source.
//!
//! The layer pulls raw bytes from the source below into a fixed buffer and
//! drives an [`Algorithm`] plug-in to transform them. Direction and method
//! are fixed at construction.
//!
//! When compressing with the default method, the layer keeps the first
//! input block around: if the algorithm finishes without ever refilling the
//! buffer and the compressed output is no smaller than that block, the
//! layer hands back the raw input instead and reports the entry as stored.
//! Tiny entries therefore never grow by being "compressed".

use std::any::Any;

use crate::codec::{self, Algorithm, AlgorithmFactory, CompressionMethod, ProcessStep};
use crate::source::{Capabilities, Command, Layer, Lower, Source, UserStream};
use crate::stat::{FileAttributes, GP_FLAGS_ALLOWED_MASK, Stat};
use crate::{BUFSIZE, Error, Result};

/// One reader's transformation state.
struct CompressStream {
    end_of_input: bool,
    end_of_stream: bool,
    can_store: bool,
    /// Only meaningful once `end_of_stream` is set.
    is_stored: bool,

    /// Bytes produced so far; authoritative only once `end_of_stream`.
    size: u64,
    /// Length of the first buffer fill; `None` until data was read.
    first_read: Option<usize>,
    buffer: Box<[u8; BUFSIZE]>,

    algorithm: Box<dyn Algorithm>,
}

struct CompressLayer {
    compress: bool,
    method: CompressionMethod,
    flags: u32,
    factory: AlgorithmFactory,

    /// A fatal error observed by any reader; all further reads fail fast.
    latched: Option<Error>,

    /// Primary-mode reader state.
    stream: CompressStream,
}

impl CompressLayer {
    fn new(
        method: CompressionMethod,
        compress: bool,
        flags: u32,
        factory: AlgorithmFactory,
    ) -> Result<CompressLayer> {
        let stream = Self::stream_init(method, compress, flags, factory)?;
        Ok(CompressLayer {
            compress,
            method,
            flags,
            factory,
            latched: None,
            stream,
        })
    }

    fn stream_init(
        method: CompressionMethod,
        compress: bool,
        flags: u32,
        factory: AlgorithmFactory,
    ) -> Result<CompressStream> {
        Ok(CompressStream {
            end_of_input: false,
            end_of_stream: false,
            // Storing instead of compressing is only on the table when the
            // caller left the method choice to us.
            can_store: compress && method == CompressionMethod::Default,
            is_stored: false,
            size: 0,
            first_read: None,
            buffer: Box::new([0u8; BUFSIZE]),
            algorithm: factory(method.actual(), flags)?,
        })
    }

    fn open_reader(lower: &mut Lower<'_>, stream: &mut CompressStream) -> Result<()> {
        stream.end_of_input = false;
        stream.end_of_stream = false;
        stream.is_stored = false;
        stream.size = 0;
        stream.first_read = None;

        let stat = lower.stat()?;
        let attributes = lower.file_attributes()?;
        stream.algorithm.start(&stat, &attributes)
    }

    fn read_reader(
        latched: &mut Option<Error>,
        lower: &mut Lower<'_>,
        stream: &mut CompressStream,
        buf: &mut [u8],
    ) -> Result<usize> {
        if let Some(err) = latched {
            return Err(err.clone());
        }
        if buf.is_empty() || stream.end_of_stream {
            return Ok(0);
        }

        let mut off = 0;
        let mut end = false;
        while !end && off < buf.len() {
            match stream.algorithm.process(&mut buf[off..]) {
                Ok(ProcessStep::Produced(n)) => off += n,

                Ok(ProcessStep::End(n)) => {
                    off += n;
                    stream.end_of_stream = true;

                    let Some(first_read) = stream.first_read else {
                        // The algorithm ended before consuming any input.
                        *latched = Some(Error::Internal);
                        break;
                    };
                    if stream.can_store && first_read <= off {
                        // Compression did not shrink the single input
                        // block; hand back the raw bytes instead.
                        stream.is_stored = true;
                        stream.size = first_read as u64;
                        buf[..first_read].copy_from_slice(&stream.buffer[..first_read]);
                        return Ok(first_read);
                    }
                    end = true;
                }

                Ok(ProcessStep::NeedData) => {
                    if stream.end_of_input {
                        // The algorithm wants more than the source holds;
                        // report what we have.
                        break;
                    }
                    match lower.read(&mut stream.buffer[..]) {
                        Err(err) => {
                            *latched = Some(err);
                            end = true;
                        }
                        Ok(0) => {
                            stream.end_of_input = true;
                            stream.algorithm.end_of_input();
                            if stream.first_read.is_none() {
                                stream.first_read = Some(0);
                            }
                        }
                        Ok(n) => {
                            if stream.first_read.is_some() {
                                // The first block is gone from the buffer;
                                // storing is no longer possible.
                                stream.can_store = false;
                            } else {
                                stream.first_read = Some(n);
                            }
                            stream.algorithm.input(&stream.buffer[..n]);
                        }
                    }
                }

                Err(err) => {
                    *latched = Some(err);
                    end = true;
                }
            }
        }

        if off > 0 {
            stream.can_store = false;
            stream.size += off as u64;
            return Ok(off);
        }

        match latched {
            Some(err) => Err(err.clone()),
            None => Ok(0),
        }
    }

    fn close_reader(stream: &mut CompressStream) -> Result<()> {
        stream.algorithm.end()
    }
}

impl Layer for CompressLayer {
    fn supports(&self) -> Capabilities {
        Capabilities::READABLE
            .with(Command::GetFileAttributes)
            .with(Command::Reopen)
            .union(Capabilities::READABLE_STREAMS)
    }

    fn open(&mut self, mut lower: Lower<'_>) -> Result<()> {
        Self::open_reader(&mut lower, &mut self.stream)
    }

    fn read(&mut self, mut lower: Lower<'_>, buf: &mut [u8]) -> Result<usize> {
        Self::read_reader(&mut self.latched, &mut lower, &mut self.stream, buf)
    }

    fn close(&mut self, _lower: Lower<'_>) -> Result<()> {
        Self::close_reader(&mut self.stream)
    }

    fn stat(&mut self, _lower: Lower<'_>, stat: &mut Stat) -> Result<()> {
        if self.compress {
            if self.stream.end_of_stream {
                stat.comp_method = Some(if self.stream.is_stored {
                    CompressionMethod::Store
                } else {
                    self.method.actual()
                });
                stat.comp_size = Some(self.stream.size);
            } else {
                // Not known yet; whatever a lower layer claimed no longer
                // applies to the transformed data.
                stat.comp_method = None;
                stat.comp_size = None;
            }
        } else {
            stat.comp_method = Some(CompressionMethod::Store);
            if self.stream.end_of_stream {
                stat.size = Some(self.stream.size);
            }
        }
        Ok(())
    }

    fn file_attributes(
        &mut self,
        _lower: Lower<'_>,
        attributes: &mut FileAttributes,
    ) -> Result<()> {
        attributes.version_needed = Some(self.stream.algorithm.version_needed());
        attributes.general_purpose_bit_mask = GP_FLAGS_ALLOWED_MASK;
        attributes.general_purpose_bit_flags = Some(if self.stream.is_stored {
            0
        } else {
            self.stream.algorithm.general_purpose_bit_flags()
        });
        Ok(())
    }

    fn open_stream(&mut self, mut lower: Lower<'_>) -> Result<UserStream> {
        let mut stream = Self::stream_init(self.method, self.compress, self.flags, self.factory)?;
        Self::open_reader(&mut lower, &mut stream)?;
        Ok(Box::new(stream))
    }

    fn read_stream(
        &mut self,
        mut lower: Lower<'_>,
        stream: &mut (dyn Any + Send),
        buf: &mut [u8],
    ) -> Result<usize> {
        let stream = downcast_stream(stream)?;
        Self::read_reader(&mut self.latched, &mut lower, stream, buf)
    }

    fn close_stream(&mut self, _lower: Lower<'_>, stream: UserStream) -> Result<()> {
        let mut stream = stream
            .downcast::<CompressStream>()
            .map_err(|_| Error::Internal)?;
        Self::close_reader(&mut stream)
    }
}

fn downcast_stream(stream: &mut (dyn Any + Send)) -> Result<&mut CompressStream> {
    stream.downcast_mut().ok_or(Error::Internal)
}

fn compression_source_new(
    lower: Source,
    method: CompressionMethod,
    compress: bool,
    flags: u32,
) -> Result<Source> {
    let factory = codec::find_algorithm(method, compress)
        .ok_or(Error::CompressionNotSupported { method })?;
    let layer = CompressLayer::new(method, compress, flags, factory)?;
    Ok(Source::layered(lower, layer))
}

impl Source {
    /// Creates a source producing the compressed form of `lower`.
    ///
    /// `flags` selects the compression level (`0` = the algorithm's
    /// default). Fails with [`Error::CompressionNotSupported`] when no
    /// algorithm for `method` is built in.
    pub fn compress(lower: Source, method: CompressionMethod, flags: u32) -> Result<Source> {
        compression_source_new(lower, method, true, flags)
    }

    /// Creates a source producing the decompressed form of `lower`.
    pub fn decompress(lower: Source, method: CompressionMethod) -> Result<Source> {
        compression_source_new(lower, method, false, 0)
    }
}
