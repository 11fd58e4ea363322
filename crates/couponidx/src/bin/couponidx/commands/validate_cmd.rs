use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::OutputFormat;
use couponidx::{validate_index, MAX_CODE_LEN, MIN_CODE_LEN};

pub fn cmd_validate(index_path: &Path, format: OutputFormat) -> Result<()> {
    let data = fs::read(index_path)
        .with_context(|| format!("Failed to read index {}", index_path.display()))?;
    let result = validate_index(&data);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            println!("Index:          {}", index_path.display());
            println!("  Size:         {} bytes", result.stats.size_bytes);
            println!("  Lines:        {}", result.stats.line_count);
            println!(
                "  Code lengths: {}..={} (accepted {}..={})",
                result.stats.min_len, result.stats.max_len, MIN_CODE_LEN, MAX_CODE_LEN
            );
            for warning in &result.warnings {
                println!("  warning: {}", warning);
            }
            for error in &result.errors {
                println!("  error: {}", error);
            }
            if result.is_valid() {
                println!("✓ Index is valid");
            }
        }
    }

    if !result.is_valid() {
        bail!(
            "Index {} failed validation with {} error(s)",
            index_path.display(),
            result.stats.error_count
        );
    }
    Ok(())
}
