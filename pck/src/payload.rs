//! Payload codec (§4.7): the bytes backing a single file entry, stored raw
//! or deflate-compressed depending on whether compression paid for itself.

use std::io::{Read, Seek, SeekFrom, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::Error;

pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub clear_size: u64,
    pub cipher_size: u64,
}

/// Reads and, if needed, decompresses the payload for one entry. A
/// `cipher_size == clear_size` payload is returned unchanged; otherwise the
/// `cipher_size` on-disk bytes must deflate-decompress to exactly
/// `clear_size` bytes or the archive is corrupt.
pub fn read_payload<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    clear_size: u64,
    cipher_size: u64,
) -> Result<Vec<u8>, Error> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut stored = vec![0u8; cipher_size as usize];
    reader.read_exact(&mut stored)?;

    if cipher_size == clear_size {
        return Ok(stored);
    }

    let mut out = Vec::with_capacity(clear_size as usize);
    DeflateDecoder::new(&stored[..])
        .read_to_end(&mut out)
        .map_err(|_| Error::PayloadCorrupt { offset })?;
    if out.len() as u64 != clear_size {
        return Err(Error::PayloadCorrupt { offset });
    }
    Ok(out)
}

/// Compresses `bytes` at `level` (0 = store, 1..=9 = deflate). Falls back to
/// storing raw if compression does not strictly shrink the payload (§4.7).
pub fn write_payload(bytes: &[u8], level: u32) -> EncodedPayload {
    let clear_size = bytes.len() as u64;
    let store_raw = || EncodedPayload {
        bytes: bytes.to_vec(),
        clear_size,
        cipher_size: clear_size,
    };

    if level == 0 {
        return store_raw();
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(bytes)
        .expect("compressing into a Vec cannot fail");
    let compressed = encoder.finish().expect("compressing into a Vec cannot fail");

    if (compressed.len() as u64) < clear_size {
        EncodedPayload {
            cipher_size: compressed.len() as u64,
            bytes: compressed,
            clear_size,
        }
    } else {
        store_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_compressed_payload() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(8);
        let encoded = write_payload(&data, 6);
        assert!(encoded.cipher_size < encoded.clear_size);

        let mut backing = vec![0u8; 16];
        backing.extend_from_slice(&encoded.bytes);
        let read_back = read_payload(
            &mut Cursor::new(backing),
            16,
            encoded.clear_size,
            encoded.cipher_size,
        )
        .unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn incompressible_data_is_stored_raw() {
        let data: Vec<u8> = (0u8..=255).cycle().take(37).collect();
        let encoded = write_payload(&data, 9);
        assert_eq!(encoded.cipher_size, encoded.clear_size);
        assert_eq!(encoded.bytes, data);
    }

    #[test]
    fn level_zero_always_stores_raw() {
        let data = b"abcabcabcabcabcabcabcabc".to_vec();
        let encoded = write_payload(&data, 0);
        assert_eq!(encoded.cipher_size, encoded.clear_size);
    }

    #[test]
    fn truncated_stream_is_payload_corrupt() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(8);
        let encoded = write_payload(&data, 6);
        let mut truncated = encoded.bytes;
        truncated.truncate(truncated.len() - 2);
        let err = read_payload(
            &mut Cursor::new(truncated),
            0,
            encoded.clear_size,
            encoded.cipher_size - 2,
        )
        .unwrap_err();
        assert!(matches!(err, Error::PayloadCorrupt { .. }));
    }
}
