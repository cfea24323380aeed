//! Reader/writer for PCK game asset archives: a single-file container with a
//! header, a run of (optionally compressed) file payloads, an obfuscated
//! index table, and a trailing footer that is the sole witness of archive
//! validity.
//!
//! The on-disk format is driven entirely by a 4-word key schedule derived
//! from an algorithm id ([`key::KeySchedule`]); everything else (header,
//! footer, index entries) is a thin, versioned codec layered on top of it.

mod builder;
mod entry;
mod error;
mod ext;
mod footer;
mod header;
mod index;
mod key;
mod log;
mod mutate;
mod path_codec;
mod payload;
mod session;
mod tree;

#[cfg(feature = "mmap")]
mod mmap;

pub use builder::build_from_directory;
pub use entry::EntryKind;
pub use error::{Error, Result};
pub use key::{KeyOverrides, KeySchedule};
pub use log::{register_log_callback, LogCallback, Severity};
pub use session::{ArchiveSession, MountOptions, Node, NodeId, Progress};

/// Magic bytes at offset 0 of every archive (§4.3). Arbitrary but fixed;
/// chosen to be recognizable in a hex dump.
pub const MAGIC: [u8; 4] = *b"PCK1";

/// Entry widths known to this implementation, newest to oldest (§4.4). The
/// version detector tries them in this order and accepts the first one that
/// decodes a self-consistent index table.
pub(crate) const KNOWN_WIDTHS: [usize; 3] = [288, 276, 260];

/// The on-disk index entry width an archive was detected to use. Distinct
/// archives on disk may use any of [`KNOWN_WIDTHS`]; this crate does not
/// write layouts other than [`Layout::latest`].
#[derive(
    Clone, Copy, PartialEq, Eq, Debug, strum::Display, strum::FromRepr, strum::EnumIter,
)]
#[repr(usize)]
pub enum Layout {
    W260 = 260,
    W276 = 276,
    W288 = 288,
}

impl Layout {
    pub fn width(self) -> usize {
        self as usize
    }

    pub fn from_width(width: usize) -> Option<Self> {
        Self::from_repr(width)
    }

    /// The layout this crate writes when building or mutating archives.
    pub fn latest() -> Self {
        Layout::W288
    }

    /// All known layouts, newest to oldest (§4.4's detection order).
    pub fn known() -> impl Iterator<Item = Self> {
        crate::KNOWN_WIDTHS
            .iter()
            .map(|w| Self::from_width(*w).expect("KNOWN_WIDTHS entries are all valid layouts"))
    }

    /// All known layouts support in-place index update (§4.9): none of them
    /// place the index region before the payload region.
    pub fn supports_update(self) -> bool {
        true
    }
}
