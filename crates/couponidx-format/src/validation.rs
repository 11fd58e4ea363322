//! Index file validation for files of unknown provenance
//!
//! Binary search over the file is only sound when lines are strictly
//! ascending. Validation walks the file once and reports:
//! - **Errors**: blank lines, out-of-bounds lengths, ordering violations,
//!   duplicates
//! - **Warnings**: missing final newline, carriage returns
//!
//! Files with errors still open in the default (trusting) mode; strict
//! openers refuse them.

use crate::code::{is_code_len, line_at, line_starts, MAX_CODE_LEN, MIN_CODE_LEN};
use serde::Serialize;

/// Only the first few problems of each kind are spelled out
const MAX_REPORTED: usize = 20;

/// Validation result for an index file
#[derive(Debug, Clone, Serialize)]
pub struct IndexValidationResult {
    /// Problems that make lookups unreliable
    pub errors: Vec<String>,
    /// Deviations from the canonical layout that lookups tolerate
    pub warnings: Vec<String>,
    /// Statistics gathered during validation
    pub stats: IndexFileStats,
}

/// Statistics gathered during index validation
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexFileStats {
    /// File size in bytes
    pub size_bytes: usize,
    /// Number of lines, blank ones included
    pub line_count: usize,
    /// Shortest line length seen (0 for an empty file)
    pub min_len: usize,
    /// Longest line length seen
    pub max_len: usize,
    /// Total number of errors, including unreported ones
    pub error_count: usize,
}

impl IndexValidationResult {
    fn new(size_bytes: usize) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            stats: IndexFileStats {
                size_bytes,
                ..Default::default()
            },
        }
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.stats.error_count == 0
    }

    fn error(&mut self, msg: impl FnOnce() -> String) {
        if self.stats.error_count < MAX_REPORTED {
            self.errors.push(msg());
        } else if self.stats.error_count == MAX_REPORTED {
            self.errors.push("further errors suppressed".to_string());
        }
        self.stats.error_count += 1;
    }
}

/// Validate the structure of an index file held in memory
///
/// Line numbers in messages are 1-based.
pub fn validate_index(data: &[u8]) -> IndexValidationResult {
    let mut result = IndexValidationResult::new(data.len());
    if data.is_empty() {
        return result;
    }

    let offsets = line_starts(data);
    result.stats.line_count = offsets.len();
    result.stats.min_len = usize::MAX;

    if data.last() != Some(&b'\n') {
        result
            .warnings
            .push("final line is not newline-terminated".to_string());
    }

    let mut carriage_returns = 0usize;
    let mut previous: Option<&[u8]> = None;

    for idx in 0..offsets.len() {
        let line = line_at(data, &offsets, idx);
        let lineno = idx + 1;

        result.stats.min_len = result.stats.min_len.min(line.len());
        result.stats.max_len = result.stats.max_len.max(line.len());

        if line.last() == Some(&b'\r') {
            carriage_returns += 1;
        }

        if line.is_empty() {
            result.error(|| format!("line {}: blank line", lineno));
        } else if !is_code_len(line.len()) {
            result.error(|| {
                format!(
                    "line {}: length {} outside {}..={}",
                    lineno,
                    line.len(),
                    MIN_CODE_LEN,
                    MAX_CODE_LEN
                )
            });
        }

        if let Some(prev) = previous {
            if line == prev {
                result.error(|| {
                    format!(
                        "line {}: duplicate of previous line {:?}",
                        lineno,
                        String::from_utf8_lossy(line)
                    )
                });
            } else if line < prev {
                result.error(|| {
                    format!(
                        "line {}: {:?} sorts before previous line {:?}",
                        lineno,
                        String::from_utf8_lossy(line),
                        String::from_utf8_lossy(prev)
                    )
                });
            }
        }
        previous = Some(line);
    }

    if carriage_returns > 0 {
        result.warnings.push(format!(
            "{} line(s) end with a carriage return",
            carriage_returns
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_file() {
        let result = validate_index(b"GBR9297T\nGNULINUX\nOVER9000\n");
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.stats.line_count, 3);
        assert_eq!(result.stats.min_len, 8);
        assert_eq!(result.stats.max_len, 8);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let result = validate_index(b"");
        assert!(result.is_valid());
        assert_eq!(result.stats.line_count, 0);
        assert_eq!(result.stats.min_len, 0);
    }

    #[test]
    fn test_unsorted() {
        let result = validate_index(b"OVER9000\nGNULINUX\n");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("sorts before"));
    }

    #[test]
    fn test_duplicate() {
        let result = validate_index(b"OVER9000\nOVER9000\n");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("duplicate"));
    }

    #[test]
    fn test_blank_line() {
        let result = validate_index(b"GNULINUX\n\nOVER9000\n");
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("blank line")));
    }

    #[test]
    fn test_missing_final_newline_is_warning() {
        let result = validate_index(b"GNULINUX\nOVER9000");
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_error_reporting_is_capped() {
        let mut data = Vec::new();
        for _ in 0..50 {
            data.extend_from_slice(b"SHORT\n");
        }
        let result = validate_index(&data);
        assert_eq!(result.errors.len(), MAX_REPORTED + 1);
        // 50 bad lengths plus 49 duplicates
        assert_eq!(result.stats.error_count, 99);
    }

    #[test]
    fn test_serializes() {
        let result = validate_index(b"GNULINUX\n");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stats"]["line_count"], 1);
    }
}
