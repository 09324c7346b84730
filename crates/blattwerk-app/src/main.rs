// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk: size-targeted PDF and image compression from the command line.
//
// Entry point. Initialises logging on stderr, parses arguments and runs one
// command. Failures are printed in plain language.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use blattwerk_core::human_errors::{Severity, humanize_error};
use blattwerk_core::{BlattwerkError, QualityPreset, RasterFormat};
use clap::{Parser, Subcommand};

use commands::Session;

#[derive(Parser, Debug)]
#[command(name = "blattwerk", version)]
#[command(about = "Shrink PDFs and images to a size budget, and scan or split PDF pages")]
struct Cli {
    /// JSON engine configuration; missing keys take defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of parallel page workers (default: one per core).
    #[arg(long, global = true, value_name = "N")]
    workers: Option<usize>,

    /// Run page workers as threads instead of separate processes.
    #[arg(long, global = true)]
    threads: bool,

    /// Print reports as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a PDF toward a target size.
    Compress {
        input: PathBuf,
        /// Output PDF (default: <input>_compressed.pdf).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Target size: 2MB, 500KB, 1.5 (bare number = MB).
        #[arg(short = 't', long, default_value = "2MB")]
        target_size: String,
        /// Compression preset: low (smallest), medium, high (best looking).
        #[arg(short, long, default_value = "medium")]
        quality: QualityPreset,
    },
    /// Estimate whether a PDF can reach a target size.
    Feasibility {
        input: PathBuf,
        #[arg(short = 't', long, default_value = "2MB")]
        target_size: String,
    },
    /// Resize and/or re-encode one image, optionally to a target size.
    ResizeImage {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target size, e.g. 50KB.
        #[arg(short = 's', long)]
        target_size: Option<String>,
        /// Exact output dimensions, e.g. 600x600.
        #[arg(short, long)]
        dimensions: Option<String>,
        /// jpeg or png (default: from the output extension).
        #[arg(short, long)]
        format: Option<RasterFormat>,
    },
    /// Shrink one image to a target size, keeping its dimensions.
    CompressImage {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short = 's', long)]
        target_size: String,
        /// Encode as PNG so alpha survives.
        #[arg(long)]
        preserve_transparency: bool,
    },
    /// Resize every image in a directory.
    BatchResize {
        input_dir: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(short = 's', long)]
        target_size: Option<String>,
        #[arg(short, long)]
        dimensions: Option<String>,
        #[arg(short, long, default_value = "jpeg")]
        format: RasterFormat,
    },
    /// List blank pages of a PDF (1-based).
    ScanBlank {
        input: PathBuf,
        /// Minimum whiteness for a blank page (default from config, 0.98).
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Write a copy of a PDF without its blank pages.
    RemoveBlank {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Render every page of a PDF to an image file.
    ExtractImages {
        input: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(short, long, default_value = "png")]
        format: RasterFormat,
        /// Render resolution (default from config, 300).
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Generate sample PDFs to try the other commands on.
    Samples {
        #[arg(short, long, default_value = "samples")]
        output_dir: PathBuf,
        #[arg(short, long, default_value_t = 10)]
        pages: usize,
    },
    /// Serve one page chunk over stdin/stdout (used by process workers).
    #[command(hide = true)]
    Worker,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Workers answer on stdout in the chunk protocol; nothing else may print.
    if let Command::Worker = cli.command {
        return match blattwerk_document::serve_stdio() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!(error = %err, "worker failed");
                ExitCode::FAILURE
            }
        };
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BlattwerkError> {
    let session = Session::load(cli.config.as_deref(), cli.workers, cli.threads, cli.json)?;

    match cli.command {
        Command::Compress {
            input,
            output,
            target_size,
            quality,
        } => session.compress(&input, output, &target_size, quality),
        Command::Feasibility { input, target_size } => session.feasibility(&input, &target_size),
        Command::ResizeImage {
            input,
            output,
            target_size,
            dimensions,
            format,
        } => session.resize_image(
            &input,
            &output,
            target_size.as_deref(),
            dimensions.as_deref(),
            format,
        ),
        Command::CompressImage {
            input,
            output,
            target_size,
            preserve_transparency,
        } => session.compress_image(&input, &output, &target_size, preserve_transparency),
        Command::BatchResize {
            input_dir,
            output_dir,
            target_size,
            dimensions,
            format,
        } => session.batch_resize(
            &input_dir,
            &output_dir,
            target_size.as_deref(),
            dimensions.as_deref(),
            format,
        ),
        Command::ScanBlank { input, threshold } => session.scan_blank(&input, threshold),
        Command::RemoveBlank {
            input,
            output,
            threshold,
        } => session.remove_blank(&input, &output, threshold),
        Command::ExtractImages {
            input,
            output_dir,
            format,
            dpi,
        } => session.extract_images(&input, &output_dir, format, dpi),
        Command::Samples { output_dir, pages } => session.samples(&output_dir, pages),
        Command::Worker => Ok(()),
    }
}

fn report_error(err: &BlattwerkError) {
    let human = humanize_error(err);
    let label = match human.severity {
        Severity::Transient => "temporary problem",
        Severity::ActionRequired => "action required",
        Severity::Permanent => "error",
    };
    eprintln!("blattwerk: {label}: {}", human.message);
    eprintln!("  {}", human.suggestion);
    if human.retriable {
        eprintln!("  Running the command again may succeed.");
    }
    tracing::debug!(error = %err, "command failed");
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn compress_defaults() {
        let cli = Cli::try_parse_from(["blattwerk", "compress", "in.pdf"]).unwrap();
        match cli.command {
            Command::Compress {
                output,
                target_size,
                quality,
                ..
            } => {
                assert!(output.is_none());
                assert_eq!(target_size, "2MB");
                assert_eq!(quality, QualityPreset::Medium);
            }
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "blattwerk",
            "scan-blank",
            "doc.pdf",
            "--threads",
            "--workers",
            "3",
            "--json",
        ])
        .unwrap();
        assert!(cli.threads && cli.json);
        assert_eq!(cli.workers, Some(3));
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!(Cli::try_parse_from(["blattwerk", "compress", "in.pdf", "-q", "extreme"]).is_err());
    }

    #[test]
    fn formats_parse_from_names() {
        let cli = Cli::try_parse_from([
            "blattwerk",
            "extract-images",
            "doc.pdf",
            "-o",
            "pages",
            "-f",
            "jpg",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::ExtractImages {
                format: RasterFormat::Jpeg,
                ..
            }
        ));
    }
}
