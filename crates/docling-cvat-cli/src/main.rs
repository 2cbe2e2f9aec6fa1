#![allow(clippy::struct_excessive_bools)] // CLI args have many boolean flags

//! docling-cvat - convert CVAT layout annotations to docling JSON
//!
//! Reads a CVAT "for images 1.1" XML export, resolves structure and reading
//! order for every image and writes one JSON report per image.

use anyhow::{Context, Result};
use clap::Parser;
use docling_cvat::{
    ConversionConfig, CvatAnnotations, CvatDocument, Diagnostic, ModularPipeline, Severity,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (default)
    Normal,
    /// Pipeline debug logging
    Verbose,
}

impl Verbosity {
    /// Create from CLI flags
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    const fn default_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "debug",
        }
    }

    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }
}

/// Configuration file structure
///
/// ```toml
/// [conversion]
/// containment_threshold = 0.7
/// point_tolerance = 5.0
/// parallel = true
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
struct Config {
    conversion: ConversionConfig,
}

impl Config {
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[derive(Parser, Debug)]
#[command(name = "docling-cvat")]
#[command(version)]
#[command(about = "Convert CVAT layout annotations into docling JSON documents", long_about = None)]
struct Args {
    /// CVAT XML export ("for images 1.1")
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Convert a single image by name
    #[arg(long)]
    image: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fraction of a child's area that must lie inside its parent
    #[arg(long)]
    containment_threshold: Option<f64>,

    /// Control-point hit tolerance in pixels
    #[arg(long)]
    tolerance: Option<f64>,

    /// Process paths and pages on a single thread
    #[arg(long)]
    sequential: bool,

    /// Write each image's plan and diagnostics to this directory
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Only report diagnostics, omit the converted documents
    #[arg(long)]
    diagnostics_only: bool,

    /// Exit with an error if any image has ERROR diagnostics
    #[arg(long)]
    strict: bool,

    /// Compact JSON output
    #[arg(long)]
    compact: bool,

    /// Verbose output (pipeline debug logs)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Config file values with command-line overrides applied
    fn conversion_config(&self) -> Result<ConversionConfig> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)?.conversion,
            None => ConversionConfig::default(),
        };
        if let Some(threshold) = self.containment_threshold {
            config = config.with_containment_threshold(threshold);
        }
        if let Some(tolerance) = self.tolerance {
            config = config.with_point_tolerance(tolerance);
        }
        if self.sequential {
            config = config.with_parallel(false);
        }
        Ok(config)
    }
}

/// Per-image entry of the JSON report
#[derive(Debug, Serialize)]
struct ImageReport {
    image: String,
    severity: Option<Severity>,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<CvatDocument>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity.default_filter()),
    )
    .init();

    let config = args.conversion_config()?;
    let mut pipeline = ModularPipeline::with_config(config).context("Invalid configuration")?;
    if let Some(dir) = &args.debug_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create debug directory: {}", dir.display()))?;
        pipeline = pipeline.with_debug_output(dir.clone());
    }

    let annotations = CvatAnnotations::from_file(&args.input)
        .with_context(|| format!("Failed to read annotations: {}", args.input.display()))?;
    let pages = match &args.image {
        Some(name) => vec![annotations.image(name)?.clone()],
        None => annotations.into_pages(),
    };
    log::debug!("Converting {} images from {}", pages.len(), args.input.display());

    let results = pipeline
        .convert_all(&pages)
        .context("Failed to convert annotations")?;

    let mut fatal = 0;
    let mut with_errors = 0;
    let reports: Vec<ImageReport> = pages
        .iter()
        .zip(results)
        .map(|(page, result)| {
            let severity = result.severity();
            match severity {
                Some(Severity::Fatal) => fatal += 1,
                Some(Severity::Error) => with_errors += 1,
                _ => {}
            }
            if verbosity.should_show_output() {
                eprintln!(
                    "{}: {} warnings, {} errors, {} fatal",
                    page.name,
                    result.count(Severity::Warning),
                    result.count(Severity::Error),
                    result.count(Severity::Fatal)
                );
            }
            ImageReport {
                image: page.name.clone(),
                severity,
                diagnostics: result.diagnostics,
                document: if args.diagnostics_only {
                    None
                } else {
                    result.document
                },
            }
        })
        .collect();

    let json = if args.compact {
        serde_json::to_string(&reports)
    } else {
        serde_json::to_string_pretty(&reports)
    }
    .context("Failed to serialize to JSON")?;

    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write output file: {}", path.display()))?,
        None => println!("{json}"),
    }

    if fatal > 0 {
        anyhow::bail!("{fatal} of {} images could not be converted", reports.len());
    }
    if args.strict && with_errors > 0 {
        anyhow::bail!("{with_errors} images have ERROR diagnostics (--strict)");
    }
    Ok(())
}
