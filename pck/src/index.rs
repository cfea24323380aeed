//! Index table codec and version detector (§4.4, §4.6).

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::entry::Entry;
use crate::key::KeySchedule;
use crate::{Error, Layout, KNOWN_WIDTHS};

pub struct DecodedIndex {
    pub layout: Layout,
    pub entries: Vec<Entry>,
}

/// Tries zlib-wrapped deflate first, then raw deflate, then gives up and
/// returns the bytes unchanged (§4.4's expanded compression-probe order).
fn probe_decompress(raw: &[u8]) -> Vec<u8> {
    if raw.first() == Some(&0x78) {
        let mut out = Vec::new();
        if ZlibDecoder::new(raw).read_to_end(&mut out).is_ok() {
            return out;
        }
    }
    let mut out = Vec::new();
    if DeflateDecoder::new(raw).read_to_end(&mut out).is_ok() {
        return out;
    }
    raw.to_vec()
}

/// §4.4: tries each known entry width, newest to oldest, and accepts the
/// first one that decodes a self-consistent table (I2, I5, and exactly one
/// tail entry in final position).
pub fn detect_and_decode(
    index_bytes: &[u8],
    file_count: u32,
    key: &KeySchedule,
) -> Result<DecodedIndex, Error> {
    let decompressed = probe_decompress(index_bytes);

    for width in KNOWN_WIDTHS {
        if decompressed.is_empty() || decompressed.len() % width != 0 {
            continue;
        }
        let n = decompressed.len() / width;
        if n as u32 != file_count + 1 {
            continue;
        }

        let decoded: Result<Vec<Entry>, Error> = decompressed
            .chunks(width)
            .map(|chunk| Entry::decode(chunk, width, key))
            .collect();
        let Ok(entries) = decoded else { continue };

        if !entries.iter().all(Entry::satisfies_size_invariant) {
            continue;
        }
        let tail_count = entries.iter().filter(|e| e.is_tail()).count();
        if tail_count != 1 || !entries.last().is_some_and(Entry::is_tail) {
            continue;
        }

        let layout = Layout::from_width(width).expect("width is one of KNOWN_WIDTHS");
        return Ok(DecodedIndex { layout, entries });
    }

    Err(Error::UnknownVersion)
}

/// §4.6 write: encodes every entry, then deflates the block when that would
/// shrink it below 31/32 of its raw size.
pub fn encode(entries: &[Entry], layout: Layout, key: &KeySchedule) -> Result<Vec<u8>, Error> {
    let width = layout.width();
    let mut raw = Vec::with_capacity(entries.len() * width);
    for entry in entries {
        raw.extend_from_slice(&entry.encode(width, key)?);
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    if (compressed.len() as u64) * 32 < (raw.len() as u64) * 31 {
        Ok(compressed)
    } else {
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use crate::key::KeyOverrides;

    fn sample_entries() -> Vec<Entry> {
        vec![
            Entry::new("a.bin".into(), 32, 10, 10, EntryKind::File),
            Entry::new(String::new(), 0, 0, 0, EntryKind::Tail),
        ]
    }

    #[test]
    fn round_trips_through_detection() {
        let key = KeySchedule::derive(121, KeyOverrides::default());
        let entries = sample_entries();
        let bytes = encode(&entries, Layout::latest(), &key).unwrap();
        let decoded = detect_and_decode(&bytes, 1, &key).unwrap();
        assert_eq!(decoded.layout, Layout::latest());
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.entries[0].name, "a.bin");
        assert!(decoded.entries[1].is_tail());
    }

    #[test]
    fn wrong_file_count_fails_detection() {
        let key = KeySchedule::derive(121, KeyOverrides::default());
        let bytes = encode(&sample_entries(), Layout::latest(), &key).unwrap();
        assert!(matches!(
            detect_and_decode(&bytes, 5, &key),
            Err(Error::UnknownVersion)
        ));
    }
}
