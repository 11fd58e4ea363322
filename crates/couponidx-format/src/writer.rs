//! Streaming index writer
//!
//! The reader binary-searches the file, so the writer refuses anything that
//! would break that: codes out of order, duplicates, out-of-bounds lengths
//! and embedded line terminators.

use crate::code::{is_code_len, MAX_CODE_LEN, MIN_CODE_LEN};
use crate::error::FormatError;
use std::io::Write;

/// Writes codes one per line, checking the ordering contract as it goes
///
/// # Example
///
/// ```
/// use couponidx_format::IndexWriter;
///
/// let mut out = Vec::new();
/// let mut writer = IndexWriter::new(&mut out);
/// writer.push(b"GBR9297T")?;
/// writer.push(b"OVER9000")?;
/// assert_eq!(writer.finish()?, 2);
/// assert_eq!(out, b"GBR9297T\nOVER9000\n");
/// # Ok::<(), couponidx_format::FormatError>(())
/// ```
pub struct IndexWriter<W: Write> {
    inner: W,
    previous: Vec<u8>,
    written: usize,
}

impl<W: Write> IndexWriter<W> {
    /// Wrap a sink
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            previous: Vec::with_capacity(MAX_CODE_LEN),
            written: 0,
        }
    }

    /// Append one code
    pub fn push(&mut self, code: &[u8]) -> Result<(), FormatError> {
        if !is_code_len(code.len()) {
            return Err(FormatError::InvalidLength {
                code: String::from_utf8_lossy(code).into_owned(),
                len: code.len(),
                min: MIN_CODE_LEN,
                max: MAX_CODE_LEN,
            });
        }
        if memchr::memchr2(b'\n', b'\r', code).is_some() {
            return Err(FormatError::EmbeddedNewline(
                String::from_utf8_lossy(code).into_owned(),
            ));
        }
        if self.written > 0 && code <= self.previous.as_slice() {
            return Err(FormatError::Unsorted {
                previous: String::from_utf8_lossy(&self.previous).into_owned(),
                current: String::from_utf8_lossy(code).into_owned(),
            });
        }

        self.inner.write_all(code)?;
        self.inner.write_all(b"\n")?;

        self.previous.clear();
        self.previous.extend_from_slice(code);
        self.written += 1;
        Ok(())
    }

    /// Number of codes written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush the sink and return the number of codes written
    pub fn finish(mut self) -> Result<usize, FormatError> {
        self.inner.flush()?;
        Ok(self.written)
    }
}

/// Write a sorted sequence of codes to `out`, returning how many were written
pub fn write_index<W, I>(out: W, codes: I) -> Result<usize, FormatError>
where
    W: Write,
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut writer = IndexWriter::new(out);
    for code in codes {
        writer.push(code.as_ref())?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_sorted() {
        let mut out = Vec::new();
        let n = write_index(&mut out, ["GBR9297T", "GNULINUX", "OVER9000"]).unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, b"GBR9297T\nGNULINUX\nOVER9000\n");
    }

    #[test]
    fn test_write_empty_is_zero_bytes() {
        let mut out = Vec::new();
        let n = write_index(&mut out, Vec::<&[u8]>::new()).unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_rejects_unsorted() {
        let mut out = Vec::new();
        let err = write_index(&mut out, ["OVER9000", "GNULINUX"]).unwrap_err();
        assert!(matches!(err, FormatError::Unsorted { .. }));
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut out = Vec::new();
        let err = write_index(&mut out, ["OVER9000", "OVER9000"]).unwrap_err();
        assert!(matches!(err, FormatError::Unsorted { .. }));
    }

    #[test]
    fn test_rejects_bad_length() {
        let mut out = Vec::new();
        let err = write_index(&mut out, ["SHORT"]).unwrap_err();
        assert!(matches!(err, FormatError::InvalidLength { len: 5, .. }));
        assert!(err.to_string().contains("expected 8..=10"));
    }

    #[test]
    fn test_rejects_embedded_newline() {
        let mut out = Vec::new();
        let err = write_index(&mut out, ["ABCD\nEFGH"]).unwrap_err();
        assert!(matches!(err, FormatError::EmbeddedNewline(_)));
    }

    #[test]
    fn test_byte_order_is_not_case_folded() {
        // Uppercase sorts before lowercase in byte order
        let mut out = Vec::new();
        write_index(&mut out, ["ZZZZZZZZ", "aaaaaaaa"]).unwrap();
        assert_eq!(out, b"ZZZZZZZZ\naaaaaaaa\n");
    }
}
