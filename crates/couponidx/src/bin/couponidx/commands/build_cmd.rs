use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;

use crate::OutputFormat;
use couponidx::{IndexBuilder, SourceSummary};

/// Parsed `build` arguments
pub struct BuildOptions {
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    pub min_sources: u32,
    pub threads: usize,
    pub dry_run: bool,
    pub format: OutputFormat,
    pub verbose: bool,
}

pub fn cmd_build(opts: BuildOptions) -> Result<()> {
    let builder = IndexBuilder::new(&opts.sources)
        .min_sources(opts.min_sources)
        .threads(opts.threads);

    if opts.dry_run {
        let collected = builder
            .collect()
            .context("Failed to scan coupon sources")?;

        match opts.format {
            OutputFormat::Json => {
                let report = json!({
                    "dry_run": true,
                    "output": opts.output.display().to_string(),
                    "min_sources": opts.min_sources,
                    "distinct_codes": collected.distinct_codes(),
                    "written": collected.len(),
                    "sources": sources_json(collected.sources()),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                println!(
                    "Dry run: {} codes would be written to {}",
                    collected.len(),
                    opts.output.display()
                );
                if opts.verbose {
                    print_sources(collected.sources(), collected.distinct_codes());
                }
            }
        }
        return Ok(());
    }

    let summary = builder
        .build(&opts.output)
        .with_context(|| format!("Failed to build index {}", opts.output.display()))?;

    match opts.format {
        OutputFormat::Json => {
            let report = json!({
                "dry_run": false,
                "output": summary.path.display().to_string(),
                "min_sources": summary.min_sources,
                "distinct_codes": summary.distinct_codes,
                "written": summary.written,
                "elapsed_ms": summary.elapsed.as_millis() as u64,
                "sources": sources_json(&summary.sources),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "Index built: {} codes written to {}",
                summary.written,
                summary.path.display()
            );
            if opts.verbose {
                print_sources(&summary.sources, summary.distinct_codes);
                println!("  Build time:     {:.2?}", summary.elapsed);
            }
        }
    }

    Ok(())
}

fn print_sources(sources: &[SourceSummary], distinct_codes: usize) {
    for (i, source) in sources.iter().enumerate() {
        println!(
            "  Source {}: {} ({} lines, {} candidates, {} distinct)",
            i,
            source.path.display(),
            source.lines,
            source.candidates,
            source.distinct
        );
    }
    println!("  Distinct codes: {}", distinct_codes);
}

fn sources_json(sources: &[SourceSummary]) -> serde_json::Value {
    sources
        .iter()
        .map(|s| {
            json!({
                "path": s.path.display().to_string(),
                "lines": s.lines,
                "candidates": s.candidates,
                "distinct": s.distinct,
            })
        })
        .collect()
}
