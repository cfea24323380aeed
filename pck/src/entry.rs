//! Index entry codec (§4.5): a fixed-width, obfuscated record describing one
//! file, one folder, or the trailing sentinel entry every archive ends with.

use byteorder::{ByteOrder, LE};

use crate::ext::trim_cstring;
use crate::key::KeySchedule;
use crate::Error;

/// Bytes occupied by everything except `name`: offset(8) + clear_size(8) +
/// cipher_size(8) + flags(4).
pub(crate) const FIXED_TAIL_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
    Tail,
}

impl EntryKind {
    /// The low-byte parity constant a freshly built entry's `raw_entry_type`
    /// carries (I5). Decoded entries keep whatever value `raw_entry_type`
    /// actually had on disk, which agrees with this in the low byte but may
    /// carry other bits besides.
    pub(crate) fn parity(self) -> u32 {
        match self {
            EntryKind::File => 1,
            EntryKind::Folder => 2,
            EntryKind::Tail => 0,
        }
    }

    fn from_parity(p: u32) -> Option<Self> {
        match p & 0xFF {
            1 => Some(EntryKind::File),
            2 => Some(EntryKind::Folder),
            0 => Some(EntryKind::Tail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub offset: u64,
    pub clear_size: u64,
    pub cipher_size: u64,
    pub kind: EntryKind,
    /// The decoded `flags` word before the `^ C` parity extraction (§3, §9):
    /// `kind` is derived from `raw_entry_type & 0xFF`, but any bits beyond
    /// that low byte are opaque to this crate. Preserving them here (rather
    /// than reconstructing `flags` purely from `kind` on encode) keeps
    /// write-back bit-exact for archives this crate didn't itself produce.
    pub raw_entry_type: u32,
}

impl Entry {
    /// Builds a freshly constructed entry (not decoded from disk): its
    /// `raw_entry_type` is just `kind`'s parity constant, with no extra bits.
    pub fn new(name: String, offset: u64, clear_size: u64, cipher_size: u64, kind: EntryKind) -> Self {
        Self {
            name,
            offset,
            clear_size,
            cipher_size,
            raw_entry_type: kind.parity(),
            kind,
        }
    }

    pub fn is_tail(&self) -> bool {
        self.kind == EntryKind::Tail
    }

    /// I2: `cipher_size <= clear_size`, equality iff stored raw.
    pub fn satisfies_size_invariant(&self) -> bool {
        self.cipher_size <= self.clear_size
    }

    /// Decodes one `width`-byte record (§4.5). Does not itself enforce I2 —
    /// the version detector (§4.4) validates decoded entries in bulk.
    pub fn decode(buf: &[u8], width: usize, key: &KeySchedule) -> Result<Self, Error> {
        debug_assert_eq!(buf.len(), width);
        let name_len = width - FIXED_TAIL_SIZE;
        let name_mask = key.name_mask();

        let mut name_buf = buf[..name_len].to_vec();
        for b in name_buf.iter_mut() {
            *b ^= name_mask;
        }
        let name = crate::path_codec::decode_path(trim_cstring(&name_buf))?;

        let tail = &buf[name_len..];
        let offset = read_masked_u64(tail, 0, name_len, key);
        let clear_size = read_masked_u64(tail, 8, name_len + 8, key);
        let cipher_size = read_masked_u64(tail, 16, name_len + 16, key);
        let flags_on_disk = LE::read_u32(&tail[24..28]);
        let flags_dec = flags_on_disk ^ key.field_mask(name_len + 24);
        let raw_entry_type = flags_dec ^ key.c;

        let kind = EntryKind::from_parity(raw_entry_type).ok_or(Error::UnknownVersion)?;

        Ok(Self {
            name,
            offset,
            clear_size,
            cipher_size,
            kind,
            raw_entry_type,
        })
    }

    /// Encodes this entry into a fresh `width`-byte record; the inverse of
    /// [`Entry::decode`].
    pub fn encode(&self, width: usize, key: &KeySchedule) -> Result<Vec<u8>, Error> {
        let name_len = width - FIXED_TAIL_SIZE;
        let encoded_name = crate::path_codec::encode_path(&self.name)?;
        if encoded_name.len() >= name_len {
            return Err(Error::PathEncoding(self.name.clone()));
        }

        let mut buf = vec![0u8; width];
        buf[..encoded_name.len()].copy_from_slice(&encoded_name);
        let name_mask = key.name_mask();
        for b in buf[..name_len].iter_mut() {
            *b ^= name_mask;
        }

        write_masked_u64(&mut buf, name_len, self.offset, name_len, key);
        write_masked_u64(&mut buf, name_len + 8, self.clear_size, name_len + 8, key);
        write_masked_u64(&mut buf, name_len + 16, self.cipher_size, name_len + 16, key);

        let flags_dec = self.raw_entry_type ^ key.c;
        let flags_on_disk = flags_dec ^ key.field_mask(name_len + 24);
        LE::write_u32(&mut buf[name_len + 24..name_len + 28], flags_on_disk);

        Ok(buf)
    }
}

/// Reads a little-endian `u64` at `tail[rel..rel+8]`, un-obfuscating the two
/// 32-bit halves independently at their own record offsets (§4.5's "each
/// numeric field" generalized word-wise to 64-bit fields).
fn read_masked_u64(tail: &[u8], rel: usize, record_offset: usize, key: &KeySchedule) -> u64 {
    let lo = LE::read_u32(&tail[rel..rel + 4]) ^ key.field_mask(record_offset);
    let hi = LE::read_u32(&tail[rel + 4..rel + 8]) ^ key.field_mask(record_offset + 4);
    (lo as u64) | ((hi as u64) << 32)
}

fn write_masked_u64(
    buf: &mut [u8],
    rel: usize,
    value: u64,
    record_offset: usize,
    key: &KeySchedule,
) {
    let lo = (value & 0xFFFF_FFFF) as u32 ^ key.field_mask(record_offset);
    let hi = (value >> 32) as u32 ^ key.field_mask(record_offset + 4);
    LE::write_u32(&mut buf[rel..rel + 4], lo);
    LE::write_u32(&mut buf[rel + 4..rel + 8], hi);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyOverrides;

    fn key() -> KeySchedule {
        KeySchedule::derive(121, KeyOverrides::default())
    }

    #[test]
    fn file_entry_round_trips() {
        let key = key();
        let entry = Entry::new("textures/rock.dds".to_string(), 0x1000, 4096, 2048, EntryKind::File);
        for width in [260usize, 276, 288] {
            let buf = entry.encode(width, &key).unwrap();
            assert_eq!(buf.len(), width);
            let decoded = Entry::decode(&buf, width, &key).unwrap();
            assert_eq!(decoded.name, entry.name);
            assert_eq!(decoded.offset, entry.offset);
            assert_eq!(decoded.clear_size, entry.clear_size);
            assert_eq!(decoded.cipher_size, entry.cipher_size);
            assert_eq!(decoded.kind, entry.kind);
            assert_eq!(decoded.raw_entry_type, entry.raw_entry_type);
        }
    }

    #[test]
    fn folder_and_tail_parity() {
        let key = key();
        let folder = Entry::new("textures".to_string(), 0, 0, 0, EntryKind::Folder);
        let tail = Entry::new(String::new(), 0, 0, 0, EntryKind::Tail);
        let width = 260;
        let f = Entry::decode(&folder.encode(width, &key).unwrap(), width, &key).unwrap();
        assert_eq!(f.kind, EntryKind::Folder);
        let t = Entry::decode(&tail.encode(width, &key).unwrap(), width, &key).unwrap();
        assert!(t.is_tail());
    }

    #[test]
    fn name_too_long_is_rejected() {
        let key = key();
        let entry = Entry::new("x".repeat(300), 0, 0, 0, EntryKind::File);
        assert!(matches!(
            entry.encode(260, &key),
            Err(Error::PathEncoding(_))
        ));
    }

    #[test]
    fn large_offsets_survive_64_bit_masking() {
        let key = key();
        let entry = Entry::new("big.bin".to_string(), u64::MAX - 7, u64::MAX, u64::MAX, EntryKind::File);
        let width = 288;
        let buf = entry.encode(width, &key).unwrap();
        let decoded = Entry::decode(&buf, width, &key).unwrap();
        assert_eq!(decoded.offset, entry.offset);
        assert_eq!(decoded.clear_size, entry.clear_size);
        assert_eq!(decoded.cipher_size, entry.cipher_size);
    }

    /// A foreign archive's entry can set `flags` bits beyond the kind parity
    /// byte; those bits must survive an encode/decode round trip unchanged.
    #[test]
    fn foreign_flags_bits_round_trip() {
        let key = key();
        let mut entry = Entry::new("foreign.bin".to_string(), 4096, 64, 64, EntryKind::File);
        entry.raw_entry_type |= 0xDEAD_0000;
        let width = 260;
        let buf = entry.encode(width, &key).unwrap();
        let decoded = Entry::decode(&buf, width, &key).unwrap();
        assert_eq!(decoded.kind, EntryKind::File);
        assert_eq!(decoded.raw_entry_type, entry.raw_entry_type);
    }
}
