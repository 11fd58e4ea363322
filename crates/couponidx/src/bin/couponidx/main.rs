mod commands;
mod tracing_setup;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use commands::{cmd_build, cmd_check, cmd_validate, BuildOptions};
use couponidx::DEFAULT_MIN_SOURCES;
use tracing_setup::{init_subscriber, Verbosity};

#[derive(Parser)]
#[command(name = "couponidx")]
#[command(about = "Build and query corroborated coupon-code indexes", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge source lists into a sorted index of corroborated codes
    Build {
        /// Source files, one code per line
        #[arg(
            env = "COUPON_FILES",
            value_delimiter = ',',
            default_values = ["data/coupon1.txt", "data/coupon2.txt", "data/coupon3.txt"]
        )]
        sources: Vec<PathBuf>,

        /// Output index file
        #[arg(short, long, env = "OUTPUT_PATH", default_value = "data/valid_codes.txt")]
        output: PathBuf,

        /// Keep codes listed by at least this many sources
        #[arg(
            long,
            default_value_t = DEFAULT_MIN_SOURCES,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        min_sources: u32,

        /// Worker threads for scanning sources (0 = one per CPU)
        #[arg(short = 'j', long, default_value_t = 1)]
        threads: usize,

        /// Report what would be written without touching the output
        #[arg(long)]
        dry_run: bool,

        /// Output format for the build report
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Look codes up in an index
    Check {
        /// Codes to check (read from stdin, one per line, when omitted)
        codes: Vec<String>,

        /// Index file
        #[arg(short, long, env = "VALID_CODES_PATH", default_value = "data/valid_codes.txt")]
        index: PathBuf,

        /// Refuse an index that fails structural validation
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check an index file's structure
    Validate {
        /// Index file
        index: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Report format shared by all subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    init_subscriber(verbosity);

    match cli.command {
        Commands::Build {
            sources,
            output,
            min_sources,
            threads,
            dry_run,
            format,
        } => cmd_build(BuildOptions {
            sources,
            output,
            min_sources,
            threads,
            dry_run,
            format,
            verbose: verbosity == Verbosity::Verbose,
        }),
        Commands::Check {
            codes,
            index,
            strict,
            format,
        } => cmd_check(&index, codes, strict, format),
        Commands::Validate { index, format } => cmd_validate(&index, format),
    }
}
