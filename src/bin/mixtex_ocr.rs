//! Command-line image-to-LaTeX recognition.
//!
//! # Usage
//!
//! ```bash
//! mixtex-ocr [OPTIONS] <IMAGES>...
//! ```
//!
//! Prints one LaTeX result per image on stdout; logs go to stderr.
//!
//! # Examples
//!
//! ```bash
//! mixtex-ocr --model-dir model/ formula.png
//! mixtex-ocr --model-dir model/ --convert-align --use-dollars page1.png page2.png
//! RUST_LOG=mixtex_ocr=debug mixtex-ocr --model-dir model/ --device cuda:0 formula.png
//! ```

use anyhow::{Context, bail};
use clap::Parser;
use mixtex_ocr::core::config::{MixTexConfig, OrtExecutionProvider};
use mixtex_ocr::pipeline::{CancellationSignal, MixTexPipeline};
use mixtex_ocr::processors::PostprocessOptions;
use mixtex_ocr::utils::{init_tracing, load_image};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Parser)]
#[command(name = "mixtex-ocr", version)]
#[command(about = "Recognizes mathematical formulas in images and prints LaTeX")]
struct Args {
    /// Paths to input images
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory holding encoder_model.onnx, decoder_model_merged.onnx and tokenizer.json
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replace \( and \) with $
    #[arg(long)]
    use_dollars: bool,

    /// Split align* blocks into one $$ ... $$ equation per row
    #[arg(long)]
    convert_align: bool,

    /// Maximum number of decode steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Device to use for inference (e.g., 'cpu', 'cuda', 'cuda:0')
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Abort an image after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> anyhow::Result<MixTexConfig> {
    let mut config = match &args.config {
        Some(path) => MixTexConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MixTexConfig::default(),
    };
    if let Some(dir) = &args.model_dir {
        config.model_dir = Some(dir.clone());
    }
    if let Some(max_steps) = args.max_steps {
        config.decoder.max_steps = max_steps;
    }
    let provider = OrtExecutionProvider::from_device(&args.device)?;
    if provider != OrtExecutionProvider::CPU {
        config.ort_session.execution_providers = Some(vec![provider, OrtExecutionProvider::CPU]);
    }
    Ok(config)
}

fn run(args: Args) -> anyhow::Result<bool> {
    let config = build_config(&args)?;
    if args.verbose {
        info!("Configuration:");
        info!("  Search paths: {:?}", config.search_paths());
        info!("  Device: {}", args.device);
        info!("  Max steps: {}", config.decoder.max_steps);
        info!("  Repetition threshold: {}", config.decoder.repetition_threshold);
    }

    let pipeline = MixTexPipeline::load(&config).context("failed to load model")?;
    let options = PostprocessOptions::new(args.use_dollars, args.convert_align);

    let mut all_ok = true;
    for path in &args.images {
        let image = match load_image(path) {
            Ok(image) => image,
            Err(e) => {
                error!("Failed to load image {}: {}", path.display(), e);
                all_ok = false;
                continue;
            }
        };

        let cancel = match args.timeout_secs {
            Some(secs) => CancellationSignal::new().with_timeout(Duration::from_secs(secs)),
            None => CancellationSignal::new(),
        };

        match pipeline.recognize(&image, &options, &cancel) {
            Ok(recognition) => {
                info!(
                    "{}: {} steps in {:.2}ms, stopped on {}",
                    path.display(),
                    recognition.steps,
                    recognition.elapsed.as_secs_f64() * 1000.0,
                    recognition.stop_reason
                );
                if recognition.latex.is_empty() {
                    warn!("{}: no formula recognized", path.display());
                }
                if args.images.len() > 1 {
                    println!("% {}", path.display());
                }
                println!("{}", recognition.latex);
            }
            Err(e) => {
                error!("Recognition failed for {}: {}", path.display(), e);
                all_ok = false;
            }
        }
    }

    if !all_ok && args.images.len() == 1 {
        bail!("recognition failed");
    }
    Ok(all_ok)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(if args.verbose { "debug" } else { "info" });

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
