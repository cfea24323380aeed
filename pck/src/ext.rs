//! Small helper traits layered over `byteorder`, the way `repak`'s `ext`
//! module wraps the handful of fixed encodings its wire format needs.

pub trait ReadExt {
    fn read_len(&mut self, len: usize) -> Result<Vec<u8>, super::Error>;
}

pub trait WriteExt {
    /// Writes `bytes`, truncating or zero-padding to exactly `width`.
    fn write_fixed(&mut self, bytes: &[u8], width: usize) -> Result<(), super::Error>;
}

impl<R: std::io::Read> ReadExt for R {
    fn read_len(&mut self, len: usize) -> Result<Vec<u8>, super::Error> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<W: std::io::Write> WriteExt for W {
    fn write_fixed(&mut self, bytes: &[u8], width: usize) -> Result<(), super::Error> {
        let mut buf = vec![0u8; width];
        let n = bytes.len().min(width);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.write_all(&buf)?;
        Ok(())
    }
}

/// Splits a null-terminated byte buffer at the first NUL.
pub fn trim_cstring(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == 0) {
        Some(i) => &buf[..i],
        None => buf,
    }
}
