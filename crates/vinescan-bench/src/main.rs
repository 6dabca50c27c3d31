//! vinescan-bench: CLI tool for running the classification pipeline on one
//! image and inspecting per-stage diagnostics.
//!
//! Useful for:
//!
//! - Comparing foliage mask strategies (`degree-hue` vs `half-degree-hue`)
//! - Checking what the model actually sees (`--save-segmented`)
//! - Measuring per-stage durations, inference in particular
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin vinescan-bench -- --model leaf.onnx [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod logger;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use vinescan_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use vinescan_pipeline::{
    FoliageMaskKind, ModelConfig, OnnxClassifier, PipelineConfig, RecordLanguage,
};

/// Grape-leaf classification diagnostics.
///
/// Loads an ONNX export of the leaf model, runs the pipeline on the given
/// image and prints per-stage timings, segmentation coverage and the
/// resulting disease record.
#[derive(Parser)]
#[command(name = "vinescan-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Path to the ONNX model.
    #[arg(long)]
    model: PathBuf,

    /// Model load timeout in seconds.
    #[arg(long, default_value_t = ModelConfig::DEFAULT_LOAD_TIMEOUT.as_secs_f64())]
    load_timeout: f64,

    /// Foliage mask strategy.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_MASK)]
    mask: Mask,

    /// Language of the printed description and remedy.
    #[arg(long, value_enum, default_value_t = Language::English)]
    language: Language,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, `--mask` and `--language` are ignored. The JSON must
    /// be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the segmented image to this PNG file.
    #[arg(long)]
    save_segmented: Option<PathBuf>,
}

/// Foliage mask strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mask {
    /// Hue in degrees within [60, 180], saturation and value >= 25.
    DegreeHue,
    /// Hue in half-degrees within [30, 80], saturation and value in [40, 255].
    HalfDegreeHue,
}

/// Record text language selection.
#[derive(Clone, Copy, ValueEnum)]
enum Language {
    /// English.
    English,
    /// Bahasa Indonesia.
    Indonesian,
}

/// Maps a [`FoliageMaskKind`] to the local CLI [`Mask`] enum.
const fn mask_from_pipeline(kind: FoliageMaskKind) -> Mask {
    match kind {
        FoliageMaskKind::DegreeHue => Mask::DegreeHue,
        FoliageMaskKind::HalfDegreeHue => Mask::HalfDegreeHue,
    }
}

/// The CLI default mask, derived from [`PipelineConfig::DEFAULT_FOLIAGE_MASK`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_MASK: Mask = mask_from_pipeline(PipelineConfig::DEFAULT_FOLIAGE_MASK);

/// Build a [`PipelineConfig`] from CLI arguments.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        foliage_mask: match cli.mask {
            Mask::DegreeHue => FoliageMaskKind::DegreeHue,
            Mask::HalfDegreeHue => FoliageMaskKind::HalfDegreeHue,
        },
        language: match cli.language {
            Language::English => RecordLanguage::English,
            Language::Indonesian => RecordLanguage::Indonesian,
        },
    })
}

/// Build a [`ModelConfig`] from CLI arguments.
fn model_config_from_cli(cli: &Cli) -> Result<ModelConfig, String> {
    let load_timeout = Duration::try_from_secs_f64(cli.load_timeout)
        .map_err(|e| format!("Invalid --load-timeout {}: {e}", cli.load_timeout))?;
    Ok(ModelConfig {
        model_path: cli.model.clone(),
        load_timeout,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let model_config = match model_config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let load_start = Instant::now();
    let classifier = match OnnxClassifier::load(&model_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Model error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        elapsed_ms = load_start.elapsed().as_secs_f64() * 1000.0,
        "model ready"
    );

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match vinescan_pipeline::diagnostics::classify_with_diagnostics(
            &image_bytes,
            &config,
            &classifier,
            &StdClock,
        ) {
            Ok((staged, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                    let record = staged.result.record_in(config.language);
                    println!();
                    println!("Label:       {}", record.label);
                    println!("Description: {}", record.description);
                    println!("Remedy:      {}", record.remedy);
                }

                // Write the segmented image on the first run only.
                if run == 0
                    && let Some(ref path) = cli.save_segmented
                {
                    match staged.segmented().save(path) {
                        Ok(()) => eprintln!("Segmented image written to {}", path.display()),
                        Err(e) => {
                            eprintln!("Error writing segmented image to {}: {e}", path.display());
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                eprintln!("{}", e.user_message());
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (i, (name, _)) in first.stages().iter().enumerate() {
        let stage_sum: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[i].1.duration.as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = stage_sum / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }

    let labels_agree = all_diagnostics
        .iter()
        .all(|d| d.summary.label == first.summary.label);
    if !labels_agree {
        println!();
        println!("Warning: runs disagree on the label");
    }
}
