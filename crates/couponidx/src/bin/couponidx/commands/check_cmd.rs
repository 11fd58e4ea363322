use anyhow::{Context, Result};
use serde_json::json;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use crate::OutputFormat;
use couponidx::CouponIndex;

pub fn cmd_check(
    index_path: &Path,
    codes: Vec<String>,
    strict: bool,
    format: OutputFormat,
) -> Result<()> {
    let index = CouponIndex::from(index_path)
        .with_strict(strict)
        .open()
        .with_context(|| format!("Failed to open index {}", index_path.display()))?;

    let codes = if codes.is_empty() {
        read_codes(io::stdin().lock()).context("Failed to read codes from stdin")?
    } else {
        codes
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match format {
        OutputFormat::Text => {
            for code in &codes {
                let verdict = if index.is_valid(code) { "valid" } else { "invalid" };
                writeln!(out, "{}\t{}", code, verdict)?;
            }
        }
        OutputFormat::Json => {
            let results: Vec<_> = codes
                .iter()
                .map(|code| json!({ "code": code, "valid": index.is_valid(code) }))
                .collect();
            let stats = index.stats();
            let report = json!({
                "index": index_path.display().to_string(),
                "results": results,
                "stats": stats,
            });
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// One code per line; line endings stripped, blank lines skipped
fn read_codes(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut codes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let code = line.strip_suffix('\r').unwrap_or(&line);
        if !code.is_empty() {
            codes.push(code.to_string());
        }
    }
    Ok(codes)
}
