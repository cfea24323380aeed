//! Footer locator (§4.2): the 32 bytes at the end of the file, and the sole
//! witness of archive validity the mutation engine relies on (§4.10).

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

use crate::key::KeySchedule;
use crate::Error;

pub const FOOTER_SIZE: u64 = 32;

/// Fixed witness sentinel shared across all on-disk layouts (§3). Only has
/// to be internally consistent between this crate's reader and writer.
const SENTINEL_0: u32 = 0x1234_5678;
const SENTINEL_1: u32 = 0x9ABC_DEF0;

#[derive(Debug, Clone)]
pub struct Footer {
    pub file_count: u32,
    pub index_offset: u64,
    pub index_block_size: u32,
}

impl Footer {
    /// Reads and validates the footer's guard dwords against `key`. Returns
    /// `Error::NotAnArchive` on any mismatch, per §4.2.
    pub fn read<R: Read>(reader: &mut R, key: &KeySchedule) -> Result<Self, Error> {
        let f0 = reader.read_u32::<LE>()?;
        let f1 = reader.read_u32::<LE>()?;
        if f0 ^ key.g0 != SENTINEL_0 || f1 ^ key.g1 != SENTINEL_1 {
            return Err(Error::NotAnArchive);
        }
        let file_count = reader.read_u32::<LE>()?;
        let index_offset = reader.read_u64::<LE>()?;
        let index_block_size = reader.read_u32::<LE>()?;
        let mut reserved = [0u8; 8];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            file_count,
            index_offset,
            index_block_size,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, key: &KeySchedule) -> Result<(), Error> {
        writer.write_u32::<LE>(key.g0 ^ SENTINEL_0)?;
        writer.write_u32::<LE>(key.g1 ^ SENTINEL_1)?;
        writer.write_u32::<LE>(self.file_count)?;
        writer.write_u64::<LE>(self.index_offset)?;
        writer.write_u32::<LE>(self.index_block_size)?;
        writer.write_all(&[0u8; 8])?;
        Ok(())
    }

    /// I4: `index_offset + index_block_size + FOOTER_SIZE == file_size`.
    pub fn check_file_size(&self, file_size: u64) -> Result<(), Error> {
        if self.index_offset + self.index_block_size as u64 + FOOTER_SIZE != file_size {
            return Err(Error::HeaderFooterInconsistent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyOverrides;
    use std::io::Cursor;

    #[test]
    fn footer_round_trips() {
        let key = KeySchedule::derive(121, KeyOverrides::default());
        let footer = Footer {
            file_count: 3,
            index_offset: 1234,
            index_block_size: 567,
        };
        let mut buf = vec![];
        footer.write(&mut buf, &key).unwrap();
        assert_eq!(buf.len() as u64, FOOTER_SIZE);

        let read_back = Footer::read(&mut Cursor::new(&buf), &key).unwrap();
        assert_eq!(read_back.file_count, footer.file_count);
        assert_eq!(read_back.index_offset, footer.index_offset);
        assert_eq!(read_back.index_block_size, footer.index_block_size);
    }

    #[test]
    fn bad_guard_is_not_an_archive() {
        let key = KeySchedule::derive(121, KeyOverrides::default());
        let footer = Footer {
            file_count: 1,
            index_offset: 0,
            index_block_size: 0,
        };
        let mut buf = vec![];
        footer.write(&mut buf, &key).unwrap();
        buf[0] ^= 0xFF; // flip one byte of F0

        let wrong_key = KeySchedule::derive(122, KeyOverrides::default());
        assert!(matches!(
            Footer::read(&mut Cursor::new(&buf), &wrong_key),
            Err(Error::NotAnArchive)
        ));
        assert!(matches!(
            Footer::read(&mut Cursor::new(&buf), &key),
            Err(Error::NotAnArchive)
        ));
    }
}
