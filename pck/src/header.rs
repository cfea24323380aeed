//! Header probe (§4.3): the 32 bytes at file offset 0.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

use crate::ext::{ReadExt, WriteExt};
use crate::Error;

pub const HEADER_SIZE: u64 = 32;
const DESCRIPTION_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct Header {
    pub data_area_size: u64,
    pub layout_version: u32,
    pub description: String,
}

impl Header {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != super::MAGIC {
            return Err(Error::NotAnArchive);
        }
        let data_area_size = reader.read_u64::<LE>()?;
        let layout_version = reader.read_u32::<LE>()?;
        let description_bytes = reader.read_len(DESCRIPTION_SIZE)?;
        let description = String::from_utf8_lossy(crate::ext::trim_cstring(&description_bytes))
            .into_owned();

        Ok(Self {
            data_area_size,
            layout_version,
            description,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_all(&super::MAGIC)?;
        writer.write_u64::<LE>(self.data_area_size)?;
        writer.write_u32::<LE>(self.layout_version)?;
        writer.write_fixed(self.description.as_bytes(), DESCRIPTION_SIZE)?;
        Ok(())
    }

    /// Consistency check against the footer (§4.3): the data area must end
    /// exactly where the index region begins.
    pub fn check_against_footer(&self, index_offset: u64) -> Result<(), Error> {
        if HEADER_SIZE + self.data_area_size != index_offset {
            return Err(Error::HeaderFooterInconsistent);
        }
        Ok(())
    }
}
