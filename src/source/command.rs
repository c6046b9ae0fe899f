//! The command vocabulary of the source protocol and the capability bitmap
//! built over it.
//!
//! Every operation a source can be asked to perform has a [`Command`] tag.
//! A layer advertises the tags it honors through a [`Capabilities`] bitmap;
//! the generic dispatch code consults the bitmap where an operation has
//! defaulted behavior for layers that do not implement it (e.g. `Tell`
//! falling back to the byte counter).

/// A command a source can be asked to perform.
///
/// The `*Stream` twins operate on one concurrent reader identified by a
/// stream ID; the plain commands drive the unique primary reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[non_exhaustive]
pub enum Command {
    /// Prepare the primary reader.
    Open,
    /// Produce bytes for the primary reader.
    Read,
    /// Tear down the primary reader.
    Close,
    /// Report entry metadata.
    Stat,
    /// Report the most recent error.
    Error,
    /// Release the layer's private state.
    Free,
    /// Reposition the primary reader.
    Seek,
    /// Report the primary reader's position.
    Tell,
    /// Report the capability bitmap.
    Supports,
    /// Report ZIP directory attributes.
    GetFileAttributes,
    /// Allocate one concurrent reader.
    OpenStream,
    /// Produce bytes for one concurrent reader.
    ReadStream,
    /// Tear down one concurrent reader.
    CloseStream,
    /// Reposition one concurrent reader.
    SeekStream,
    /// Report one concurrent reader's position.
    TellStream,
    /// Capability marker: the source may be opened again after a close.
    /// Never dispatched.
    Reopen,
}

/// A bitmap of the [`Command`]s a source honors.
///
/// Layers compose their bitmap from the class constants below and from the
/// capabilities forwarded by their lower source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    /// The empty bitmap.
    pub const NONE: Capabilities = Capabilities(0);

    /// The commands every readable source answers: `Open`, `Read`, `Close`,
    /// `Stat`, `Error` and `Free`.
    pub const READABLE: Capabilities = Capabilities::NONE
        .with(Command::Open)
        .with(Command::Read)
        .with(Command::Close)
        .with(Command::Stat)
        .with(Command::Error)
        .with(Command::Free);

    /// A readable source that can also be repositioned: [`READABLE`] plus
    /// `Seek`, `Tell` and `Supports`.
    ///
    /// [`READABLE`]: Capabilities::READABLE
    pub const SEEKABLE: Capabilities = Capabilities::READABLE
        .with(Command::Seek)
        .with(Command::Tell)
        .with(Command::Supports);

    /// The commands needed to host concurrent readers.
    pub const READABLE_STREAMS: Capabilities = Capabilities::NONE
        .with(Command::OpenStream)
        .with(Command::ReadStream)
        .with(Command::CloseStream);

    /// Concurrent readers that can also be repositioned.
    pub const SEEKABLE_STREAMS: Capabilities = Capabilities::READABLE_STREAMS
        .with(Command::SeekStream)
        .with(Command::TellStream);

    /// The bitmap containing exactly `command`.
    pub const fn of(command: Command) -> Capabilities {
        Capabilities(1 << command as u32)
    }

    /// Returns `self` with `command` added.
    pub const fn with(self, command: Command) -> Capabilities {
        Capabilities(self.0 | 1 << command as u32)
    }

    /// The union of two bitmaps.
    pub const fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    /// The intersection of two bitmaps.
    pub const fn intersect(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 & other.0)
    }

    /// Whether `command` is in the bitmap.
    pub const fn supports(self, command: Command) -> bool {
        self.0 & (1 << command as u32) != 0
    }

    /// Whether the source can produce bytes in primary mode.
    pub const fn is_readable(self) -> bool {
        self.supports(Command::Read)
    }

    /// Whether the primary reader can be repositioned.
    pub const fn is_seekable(self) -> bool {
        self.is_readable() && self.supports(Command::Seek)
    }

    /// Whether the source can host concurrent readers.
    pub const fn has_readable_streams(self) -> bool {
        self.supports(Command::OpenStream)
            && self.supports(Command::ReadStream)
            && self.supports(Command::CloseStream)
    }

    /// Whether concurrent readers can be repositioned.
    pub const fn has_seekable_streams(self) -> bool {
        self.has_readable_streams()
            && self.supports(Command::SeekStream)
            && self.supports(Command::TellStream)
    }
}
