//! Bounds-checked binary cursors for archive payloads.
//!
//! All multi-byte scalars are little-endian, reals are IEEE 754 64-bit,
//! strings are u32-length plus raw bytes, vectors are u32-count plus
//! contiguous elements. Every read checks the remaining length first and
//! fails with an underflow error instead of fabricating zeros.

use crate::error::ArchiveError;

/// Reading cursor over an archive payload.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap a buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True when the cursor consumed everything.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        if self.remaining() < n {
            return Err(ArchiveError::Underflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a little-endian u8.
    pub fn read_u8(&mut self) -> Result<u8, ArchiveError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian IEEE 754 f64.
    pub fn read_f64(&mut self) -> Result<f64, ArchiveError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        self.take(n)
    }

    /// Read a u32-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ArchiveError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a u32-count-prefixed vector of f64.
    pub fn read_f64_vec(&mut self) -> Result<Vec<f64>, ArchiveError> {
        let count = self.read_u32()? as usize;
        // Check the whole extent before allocating for a hostile count.
        if self.remaining() < count.saturating_mul(8) {
            return Err(ArchiveError::Underflow {
                needed: count.saturating_mul(8),
                remaining: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_f64()?);
        }
        Ok(out)
    }

    /// Read a u32-count-prefixed vector of u32.
    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>, ArchiveError> {
        let count = self.read_u32()? as usize;
        if self.remaining() < count.saturating_mul(4) {
            return Err(ArchiveError::Underflow {
                needed: count.saturating_mul(4),
                remaining: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    /// Read and verify a 4-byte chunk tag.
    pub fn expect_tag(&mut self, tag: &[u8; 4]) -> Result<(), ArchiveError> {
        let got = self.take(4)?;
        if got != tag {
            return Err(ArchiveError::Malformed(format!(
                "expected chunk tag {:?}, got {:?}",
                String::from_utf8_lossy(tag),
                String::from_utf8_lossy(got)
            )));
        }
        Ok(())
    }
}

/// Writing cursor producing archive payloads.
#[derive(Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    /// An empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish and take the buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Write a u8.
    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Write a little-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian f64.
    pub fn write_f64(&mut self, v: f64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a u32-length-prefixed string.
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Write a u32-count-prefixed vector of f64.
    pub fn write_f64_vec(&mut self, values: &[f64]) {
        self.write_u32(values.len() as u32);
        for v in values {
            self.write_f64(*v);
        }
    }

    /// Write a u32-count-prefixed vector of u32.
    pub fn write_u32_vec(&mut self, values: &[u32]) {
        self.write_u32(values.len() as u32);
        for v in values {
            self.write_u32(*v);
        }
    }

    /// Write a 4-byte chunk tag.
    pub fn write_tag(&mut self, tag: &[u8; 4]) {
        self.data.extend_from_slice(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_u32(0x41524348);
        w.write_f64(25.4);
        w.write_string("manifest.json");
        w.write_u8(1);
        let buf = w.into_vec();

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u32().unwrap(), 0x41524348);
        assert_eq!(r.read_f64().unwrap(), 25.4);
        assert_eq!(r.read_string().unwrap(), "manifest.json");
        assert_eq!(r.read_u8().unwrap(), 1);
        assert!(r.is_empty());
    }

    #[test]
    fn test_vec_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_f64_vec(&[1.0, 2.5, -3.0]);
        w.write_u32_vec(&[7, 8]);
        let buf = w.into_vec();

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_f64_vec().unwrap(), vec![1.0, 2.5, -3.0]);
        assert_eq!(r.read_u32_vec().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_underflow_is_error_not_zero() {
        let mut r = ByteReader::new(&[1, 2]);
        let e = r.read_u32().unwrap_err();
        assert!(e.to_string().contains("underflow"));
        // The failed read consumed nothing.
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn test_hostile_vector_count() {
        // Count claims u32::MAX elements with 4 bytes of payload.
        let mut w = ByteWriter::new();
        w.write_u32(u32::MAX);
        w.write_u32(0);
        let buf = w.into_vec();
        let mut r = ByteReader::new(&buf);
        let e = r.read_f64_vec().unwrap_err();
        assert!(e.to_string().contains("underflow"));
    }

    #[test]
    fn test_bad_tag() {
        let mut r = ByteReader::new(b"MESHrest");
        assert!(r.expect_tag(b"MESH").is_ok());
        let mut r2 = ByteReader::new(b"JUNK");
        assert!(matches!(
            r2.expect_tag(b"SURF"),
            Err(ArchiveError::Malformed(_))
        ));
    }
}
