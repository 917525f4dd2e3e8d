use std::fs;
use std::path::PathBuf;

use acne_region_analyzer::analyzer::{decode_image, OnnxAcneAnalyzer};
use acne_region_analyzer::annotate::annotate;
use acne_region_analyzer::AppConfig;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Count acne detections per face region in a single photo.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Face photo (JPEG or PNG)
    image: PathBuf,

    /// JSON config; missing fields fall back to defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the ONNX models (overrides ACNE_MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Minimum detector confidence
    #[arg(long)]
    threshold: Option<f32>,

    /// Write a copy of the photo with detections outlined
    #[arg(long)]
    annotate: Option<PathBuf>,

    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(model_dir) = args.model_dir {
        config.models.model_dir = Some(model_dir);
    }
    if let Some(threshold) = args.threshold {
        config.analyzer.confidence_threshold = threshold;
    }
    let analyzer = OnnxAcneAnalyzer::load(&config)?;

    let bytes = fs::read(&args.image).with_context(|| format!("failed to read {}", args.image.display()))?;
    let image = decode_image(&bytes).with_context(|| format!("failed to decode {}", args.image.display()))?;
    let result = analyzer.analyze(&image)?;

    if let Some(path) = args.annotate {
        annotate(&image, &result)
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("annotated image written to {}", path.display());
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
