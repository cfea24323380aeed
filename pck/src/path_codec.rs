//! Path encoding for the `name` field of an index entry (§4.5). Archive
//! paths are stored as 8-bit bytes; this module is the single seam where
//! that byte encoding meets a Rust `String`, satisfying I6
//! (`decode_path(encode_path(p)) == p`).
//!
//! The encoding is Windows-1252-compatible: bytes `0x00..=0x7F` map directly
//! to ASCII, and `0x80..=0xFF` round-trip byte-for-byte through the private
//! Unicode range rather than being interpreted as any particular code page.
//! This keeps the codec total (every byte sequence decodes to some string)
//! and lossless, without guessing at an archive's original locale.

use crate::Error;

/// Private-use codepoint that byte `b` (`b >= 0x80`) maps to, so every
/// distinct high byte round-trips to a distinct `char`.
fn high_byte_to_char(b: u8) -> char {
    char::from_u32(0xE000 + b as u32).expect("0xE080..=0xE0FF is valid private-use")
}

fn char_to_high_byte(c: char) -> Option<u8> {
    let cp = c as u32;
    if (0xE080..=0xE0FF).contains(&cp) {
        Some((cp - 0xE000) as u8)
    } else {
        None
    }
}

pub fn decode_path(bytes: &[u8]) -> Result<String, Error> {
    let mut s = String::with_capacity(bytes.len());
    for &b in bytes {
        if b < 0x80 {
            s.push(b as char);
        } else {
            s.push(high_byte_to_char(b));
        }
    }
    Ok(s)
}

pub fn encode_path(path: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(path.len());
    for c in path.chars() {
        if (c as u32) < 0x80 {
            out.push(c as u8);
        } else if let Some(b) = char_to_high_byte(c) {
            out.push(b);
        } else {
            return Err(Error::PathEncoding(path.to_string()));
        }
    }
    Ok(out)
}

/// Splits an archive path on either separator the original tooling accepts
/// (§4.8), dropping empty components (leading/trailing/duplicate slashes).
pub fn split_components(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|c| !c.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips() {
        let p = "textures/rock_01.dds";
        assert_eq!(decode_path(&encode_path(p).unwrap()).unwrap(), p);
    }

    #[test]
    fn every_byte_round_trips() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let decoded = decode_path(&bytes).unwrap();
        let re_encoded = encode_path(&decoded).unwrap();
        assert_eq!(re_encoded, bytes);
    }

    #[test]
    fn splits_on_either_separator() {
        assert_eq!(
            split_components("a/b\\c//d"),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn rejects_foreign_characters() {
        assert!(encode_path("caf\u{e9}").is_err());
    }
}
