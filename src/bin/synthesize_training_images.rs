use anyhow::{Context, Result};
use clap::Parser;
use speck_meter::measurer::load_sheet;
use speck_meter::observability;
use speck_meter::synthetic::{load_crops, CocoDataset, SynthesisConfig, Synthesizer, IMAGE_DIR};
use std::path::PathBuf;
use tracing::info;

/// Pastes speck crops onto a base sheet to build an augmented COCO dataset
#[derive(Parser)]
#[command(name = "synthesize_training_images", version, about, long_about = None)]
struct Cli {
    /// Base sheet image the crops are pasted onto
    #[arg(long, value_name = "FILE")]
    base: PathBuf,

    /// Folder of crop images
    #[arg(long, value_name = "DIR")]
    crops: PathBuf,

    /// Existing COCO annotations to extend
    #[arg(long, value_name = "FILE")]
    coco: PathBuf,

    /// Output folder; images go to <out>/images
    #[arg(short, long, value_name = "DIR", default_value = "augmented")]
    out: PathBuf,

    /// Where to write the updated COCO file (defaults to <out>/annotations.json)
    #[arg(long, value_name = "FILE")]
    coco_out: Option<PathBuf>,

    /// Number of images to generate
    #[arg(short = 'n', long, default_value_t = 750)]
    images: usize,

    #[arg(long, default_value_t = 7)]
    min_crops: usize,

    #[arg(long, default_value_t = 150)]
    max_crops: usize,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let textfile = observability::init_observability()?;

    let config = SynthesisConfig {
        images: cli.images,
        min_crops: cli.min_crops,
        max_crops: cli.max_crops,
        seed: cli.seed,
        ..Default::default()
    };
    let mut synthesizer = Synthesizer::new(config).context("Invalid synthesis settings")?;

    let base = load_sheet(&cli.base)
        .with_context(|| format!("Failed to load base image {}", cli.base.display()))?;
    let crops: Vec<_> = load_crops(&cli.crops)
        .with_context(|| format!("Failed to read crops from {}", cli.crops.display()))?
        .into_iter()
        .map(|(_, crop)| crop)
        .collect();
    if crops.is_empty() {
        anyhow::bail!("No crop images found in {}", cli.crops.display());
    }

    let mut dataset = CocoDataset::from_path(&cli.coco)
        .with_context(|| format!("Failed to read COCO file {}", cli.coco.display()))?;

    let total = synthesizer.config().images;
    println!("Generating {} images from {} crops...", total, crops.len());

    for i in 0..total {
        if i % 100 == 0 && i > 0 {
            println!("Generated {}/{} images...", i, total);
        }

        synthesizer
            .write_composite(&base, &crops, &mut dataset, &cli.out, i)
            .with_context(|| format!("Failed to write image {}", i))?;
        metrics::counter!("synthetic_images_total").increment(1);
    }

    let coco_out = cli
        .coco_out
        .unwrap_or_else(|| cli.out.join("annotations.json"));
    dataset
        .save(&coco_out)
        .with_context(|| format!("Failed to write {}", coco_out.display()))?;

    info!(
        images = total,
        annotations = dataset.annotations.len(),
        coco = %coco_out.display(),
        "Synthetic dataset written"
    );
    println!("✓ {} images in {}", total, cli.out.join(IMAGE_DIR).display());
    println!("✓ {}", coco_out.display());

    if let Err(e) = textfile.flush() {
        tracing::warn!(error = %e, "Failed to write metrics file");
    }
    Ok(())
}
