//! # zipsource
//!
//! Layered, stream-capable byte sources for ZIP archive processing.
//!
//! Everything a ZIP library reads or writes flows through a [`Source`]: a
//! stateful producer of bytes built as a stack of layers. The leaf of the
//! stack owns real data (an in-memory buffer, a file, any reader); each
//! layer above transforms the layer below — a [window](Source::window)
//! exposes a sub-range, [compress](Source::compress) /
//! [decompress](Source::decompress) run the data through a compression
//! algorithm. Entry extraction is just a stack like
//! `decompress(window(file))`.
//!
//! ## Reading modes
//!
//! Every source supports the single **primary reader**
//! ([`open`](Source::open) / [`read`](Source::read) / [`tell`](Source::tell)
//! / [`close`](Source::close)), and sources whose layers allow it
//! additionally host any number of **concurrent streams**
//! ([`open_stream`](Source::open_stream) and the `*_stream` twins), each an
//! independent reader with its own position, EOF state and error latch.
//! Stream IDs are small integers, recycled as streams close.
//!
//! ## Quick start
//!
//! ```rust
//! use zipsource::{CompressionMethod, Result, Source};
//!
//! fn main() -> Result<()> {
//!     // View bytes 2..7 of a buffer.
//!     let lower = Source::buffer(b"..hello...".to_vec());
//!     let mut window = Source::window(lower, 2, Some(5))?;
//!     window.open()?;
//!     let mut buf = [0u8; 8];
//!     let n = window.read(&mut buf)?;
//!     assert_eq!(&buf[..n], b"hello");
//!     window.close()?;
//!
//!     // Compress a buffer and read the compressed bytes.
//!     let lower = Source::buffer(b"ABCDE".repeat(1000));
//!     let mut deflated = Source::compress(lower, CompressionMethod::Default, 0)?;
//!     deflated.open()?;
//!     let mut compressed = Vec::new();
//!     let mut chunk = [0u8; 4096];
//!     loop {
//!         match deflated.read(&mut chunk)? {
//!             0 => break,
//!             n => compressed.extend_from_slice(&chunk[..n]),
//!         }
//!     }
//!     deflated.close()?;
//!     assert!(compressed.len() < 5000);
//!     Ok(())
//! }
//! ```
//!
//! ## Capabilities
//!
//! Not every source can do everything: a source wrapping a socket cannot
//! seek, a compression layer is forward-only, a file hosts as many streams
//! as you like. Each source advertises a [`Capabilities`] bitmap over the
//! protocol's [`Command`] vocabulary; layers forward the lower source's
//! capabilities where they can (a window over a seekable file is seekable,
//! over a socket it is not) and the derived classes
//! ([`is_seekable`](Capabilities::is_seekable),
//! [`has_readable_streams`](Capabilities::has_readable_streams), …) tell
//! callers what a particular stack supports.
//!
//! ## Custom layers
//!
//! The [`Layer`] trait is public: implement it to add transformations
//! (decryption, checksumming, throttling) that compose with the built-in
//! layers. A layer talks to the source below it exclusively through the
//! [`Lower`] handle it receives with every command, which transparently
//! routes to the right lower-side reader.
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `bzip2` | Yes | BZip2 compression method |
//! | `zstd` | No | Zstandard compression method |
//!
//! Deflate is always built in.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

/// Buffer size for internal read loops (8 KiB): the window layer's drain
/// buffer and the compression layer's input block.
pub(crate) const BUFSIZE: usize = 8192;

pub mod archive;
pub mod codec;
pub mod error;
pub mod io;
pub mod source;
pub mod stat;

mod compress;
mod grow;
mod window;

pub use archive::Archive;
pub use codec::{Algorithm, CompressionMethod, ProcessStep, compression_method_supported};
pub use error::{Error, Inconsistency, Result};
pub use io::SourceReader;
pub use source::{Capabilities, Command, Layer, Lower, Source, UserStream};
pub use stat::{FileAttributes, GP_FLAGS_ALLOWED_MASK, Stat};
