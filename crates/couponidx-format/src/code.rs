//! Candidate codes and line addressing
//!
//! Codes are plain byte strings. Only their byte length is checked; case and
//! content pass through untouched.

/// Shortest accepted code, in bytes
pub const MIN_CODE_LEN: usize = 8;

/// Longest accepted code, in bytes
pub const MAX_CODE_LEN: usize = 10;

/// Whether a byte length falls inside the accepted code bounds
#[inline]
pub const fn is_code_len(len: usize) -> bool {
    len >= MIN_CODE_LEN && len <= MAX_CODE_LEN
}

/// Strip one trailing `\n` and then one trailing `\r`
///
/// Source lists written on Windows end lines with `\r\n`; both forms map to
/// the same code.
#[inline]
pub fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Byte offsets at which each line of `data` starts
///
/// Offset 0 is present for any non-empty buffer. Every other entry is the
/// position following a `\n`, except for a `\n` that ends the buffer: a
/// trailing newline terminates the last line instead of opening a new one.
pub fn line_starts(data: &[u8]) -> Vec<usize> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut offsets = Vec::with_capacity(data.len() / (MIN_CODE_LEN + 1) + 1);
    offsets.push(0);
    offsets.extend(
        memchr::memchr_iter(b'\n', data)
            .map(|pos| pos + 1)
            .filter(|&start| start < data.len()),
    );
    offsets
}

/// Bytes of line `idx`, without its terminator
///
/// `offsets` must come from [`line_starts`] over the same `data`.
///
/// # Panics
///
/// Panics if `idx` is out of bounds of `offsets`.
#[inline]
pub fn line_at<'a>(data: &'a [u8], offsets: &[usize], idx: usize) -> &'a [u8] {
    let start = offsets[idx];
    let end = match offsets.get(idx + 1) {
        Some(&next) => next - 1,
        None if data.last() == Some(&b'\n') => data.len() - 1,
        None => data.len(),
    };
    &data[start..end]
}
