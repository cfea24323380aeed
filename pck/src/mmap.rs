//! Memory-mapped read view over a mounted archive (feature `mmap`, default
//! on). Mutation still goes through ordinary file I/O (§4.10 rewrites
//! regions in place or appends past the current end, neither of which plays
//! well with a live mapping); this is purely the fast path for mount-time
//! scanning and `read_file`.

use std::fs::File;

use memmap2::Mmap;

use crate::Error;

pub struct MappedFile {
    map: Mmap,
}

impl MappedFile {
    pub fn open(file: &File) -> Result<Self, Error> {
        // SAFETY: the mapped file is exclusively owned by the session for
        // the lifetime of the mapping (§5's shared-resource policy); the
        // session never hands the underlying `File` to another owner while
        // mounted.
        let map = unsafe { Mmap::map(file)? };
        Ok(Self { map })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
