use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pngbin::convert::{has_extension, BIN_EXTENSION, PNG_EXTENSION};
use pngbin::{Config, ConvertError, ErrorKind, PngCompression};

#[derive(Parser, Debug)]
#[command(name = "pngbin")]
#[command(about = "Convert PNG images to and from a flat RGBA binary container", long_about = None)]
#[command(version)]
struct Args {
    /// Input file (PNG, or BIN with --to-png), or a directory of them
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file, defaults to INPUT with its extension swapped
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Convert a BIN container back to PNG
    #[arg(long, default_value_t)]
    to_png: bool,

    /// Raw pixel data only, without the 17-byte header
    #[arg(long, default_value_t)]
    raw: bool,

    /// PNG compression level, when writing PNG
    #[arg(long, value_enum)]
    compression: Option<PngCompressionArg>,

    /// Verbose output
    #[arg(short, long, default_value_t, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (no logging)
    #[arg(short, long, default_value_t)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PngCompressionArg {
    Fast,
    Default,
    Best,
}

impl From<PngCompressionArg> for PngCompression {
    fn from(arg: PngCompressionArg) -> Self {
        match arg {
            PngCompressionArg::Fast => PngCompression::Fast,
            PngCompressionArg::Default => PngCompression::Default,
            PngCompressionArg::Best => PngCompression::Best,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Options {
    to_png: bool,
    header: bool,
    compression: PngCompression,
}

impl Options {
    fn new(args: &Args, config: &Config) -> Self {
        Options {
            to_png: args.to_png,
            header: config.include_header && !args.raw,
            compression: args
                .compression
                .map(Into::into)
                .unwrap_or(config.png_compression),
        }
    }

    fn input_extension(&self) -> &'static str {
        if self.to_png {
            BIN_EXTENSION
        } else {
            PNG_EXTENSION
        }
    }
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => return ExitCode::from(usage_exit_code(&e)),
    };

    setup_logging(args.verbose, args.quiet);

    let config = Config::load().unwrap_or_default();

    match run(&args, &config) {
        Ok(true) => ExitCode::from(EXIT_SUCCESS),
        Ok(false) => ExitCode::from(EXIT_FAILURE),
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Usage errors go to stdout and fail with 1, like conversion failures.
/// Help and version output are not failures.
fn usage_exit_code(err: &clap::Error) -> u8 {
    print!("{err}");

    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
            EXIT_SUCCESS
        }
        _ => EXIT_FAILURE,
    }
}

/// Returns whether every conversion succeeded
fn run(args: &Args, config: &Config) -> Result<bool> {
    let options = Options::new(args, config);
    log::debug!("Converting with {options:?}");

    if !args.input.is_dir() {
        return Ok(convert_one(&args.input, args.output.as_deref(), &options));
    }

    if args.output.is_some() {
        anyhow::bail!("OUTPUT cannot be given when INPUT is a directory");
    }

    let files = find_files(&args.input, options.input_extension())?;
    if files.is_empty() {
        anyhow::bail!(
            "No .{} files found in {}",
            options.input_extension(),
            args.input.display()
        );
    }

    log::info!("Converting {} files", files.len());

    // sequential on purpose: every file is independent and small
    let failed = files
        .iter()
        .filter(|file| !convert_one(file, None, &options))
        .count();

    if failed > 0 {
        log::warn!("{failed} of {} conversions failed", files.len());
    }

    Ok(failed == 0)
}

fn convert_one(input: &Path, output: Option<&Path>, options: &Options) -> bool {
    let result = if options.to_png {
        pngbin::bin_to_png(input, output, options.header, options.compression)
    } else {
        pngbin::png_to_bin(input, output, options.header)
    };

    match result {
        Ok(conversion) => {
            println!("{conversion}");
            true
        }
        Err(e) => {
            println!("{}", failure_message(&e, options.to_png));
            false
        }
    }
}

fn failure_message(err: &ConvertError, to_png: bool) -> String {
    match err.kind() {
        ErrorKind::Codec if to_png => format!("Error converting BIN to PNG: {err}"),
        ErrorKind::Codec => format!("Error converting PNG: {err}"),
        _ => err.to_string(),
    }
}

fn find_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}
