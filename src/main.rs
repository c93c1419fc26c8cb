use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use speck_meter::aggregate::{aggregate_by_label, read_label_list, write_label_totals};
use speck_meter::batch::run_batch;
use speck_meter::calibration::{
    calibrate, load_samples, read_ground_truth, write_calibration_rows, CalibrationGrid,
};
use speck_meter::config::{parse_markers, AppConfig};
use speck_meter::discovery::{discover_sheets, list_files, PairingStrategy, SHEET_EXTENSIONS};
use speck_meter::errors::error_logging;
use speck_meter::export::{MaskStyle, SpeckExporter};
use speck_meter::observability::{self, tracing_mod, MetricsTextfile};
use speck_meter::observability::metrics::record_report_metrics;
use speck_meter::observability_config::ObservabilityConfig;
use speck_meter::overlay::{measure_overlay_dir, write_coverage_csv};
use speck_meter::rect_report::{
    convert_rectangles, scan_images, write_images_csv, write_rects_csv, RectReportConfig,
};
use speck_meter::report::{read_speck_report, write_pixel_report, write_speck_report};
use speck_meter::sampling::{sample_csv_file, DEFAULT_SAMPLE_SEED, DEFAULT_SAMPLE_SIZE};
use speck_meter::segmentation::{CleanupMode, PreFilter};
use speck_meter::sheet::PixelAreaConvention;
use speck_meter::SpeckMeasurer;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "speck-meter")]
#[command(version, about = "Dark speck area measurement for paper handsheets", long_about = None)]
struct Cli {
    /// Write Prometheus metrics to this file when the command ends
    #[arg(long, value_name = "FILE", global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the commands that segment ROIs
#[derive(Args, Clone)]
struct MeasureArgs {
    /// Folder with sheet images and LabelMe JSON files
    #[arg(value_name = "DIR")]
    folder: PathBuf,

    /// Real sheet diameter in millimeters
    #[arg(long, value_name = "MM")]
    diameter_mm: Option<f64>,

    /// Sheet pixel area: raw, circle-average or circle-min
    #[arg(long, value_name = "CONVENTION")]
    convention: Option<PixelAreaConvention>,

    /// Mask cleanup: none or morphological
    #[arg(long, value_name = "MODE")]
    cleanup: Option<CleanupMode>,

    /// Pre-filter: none, gaussian[:SIGMA] or bilateral:D,SC,SS
    #[arg(long, value_name = "FILTER")]
    pre_filter: Option<PreFilter>,

    /// ROI label markers, e.g. "Spr" or "S,p,r,1"
    #[arg(long, value_name = "CHARS")]
    markers: Option<String>,

    /// Image/annotation pairing: stem-prefix, components[:N] or image-path
    #[arg(long, value_name = "STRATEGY")]
    pairing: Option<PairingStrategy>,

    /// Process sheets in parallel
    #[arg(long)]
    parallel: bool,
}

impl MeasureArgs {
    /// Environment configuration with command line overrides applied
    fn resolve(&self) -> Result<AppConfig> {
        let mut config = AppConfig::from_env().context("Failed to load configuration")?;
        let measurement = &mut config.measurement;

        if let Some(diameter) = self.diameter_mm {
            measurement.diameter_mm = diameter;
        }
        if let Some(convention) = self.convention {
            measurement.convention = convention;
        }
        if let Some(cleanup) = self.cleanup {
            measurement.cleanup = cleanup;
        }
        if let Some(pre_filter) = &self.pre_filter {
            measurement.pre_filter = pre_filter.clone();
        }
        if let Some(markers) = &self.markers {
            measurement.markers = parse_markers(markers);
        }
        if let Some(pairing) = self.pairing {
            config.batch.pairing = pairing;
        }
        if self.parallel {
            config.batch.parallel = true;
        }

        if let Err(e) = config.validate() {
            error_logging::log_config_error(&e, "command_line", "resolve");
            return Err(e.into());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Measure dark speck areas in pixels and mm²
    Measure {
        #[command(flatten)]
        args: MeasureArgs,

        /// Output CSV
        #[arg(short, long, value_name = "FILE", default_value = "speck_report_mm2.csv")]
        out: PathBuf,

        /// Save ROI crops here
        #[arg(long, value_name = "DIR")]
        crops: Option<PathBuf>,

        /// Save mask visuals here
        #[arg(long, value_name = "DIR")]
        masks: Option<PathBuf>,

        /// Mask visual: masked, overlay or transparent
        #[arg(long, value_name = "STYLE", default_value = "masked")]
        mask_style: MaskStyle,

        /// Decimals kept for mm² values
        #[arg(long, value_name = "N")]
        decimals: Option<u32>,
    },

    /// Count dark speck pixels without unit conversion
    Pixels {
        #[command(flatten)]
        args: MeasureArgs,

        /// Output CSV
        #[arg(short, long, value_name = "FILE", default_value = "dark_pixels.csv")]
        out: PathBuf,
    },

    /// Convert annotated rectangle areas to mm² without segmentation
    Rects {
        /// Folder containing the raster images
        #[arg(long, value_name = "DIR")]
        images: PathBuf,

        /// Folder containing LabelMe JSONs
        #[arg(long, value_name = "DIR")]
        jsons: PathBuf,

        #[arg(long, value_name = "FILE", default_value = "images.csv")]
        out_img: PathBuf,

        #[arg(long, value_name = "FILE", default_value = "rects.csv")]
        out_rect: PathBuf,

        /// Radius of the physical disc
        #[arg(long, value_name = "MM", default_value = "82.5")]
        radius_mm: f64,

        /// Share of a rectangle covered by its spot
        #[arg(long, value_name = "FACTOR", default_value = "0.70")]
        filling_factor: f64,

        /// Adjusted area from which a spot counts as large
        #[arg(long, value_name = "MM2", default_value = "0.40")]
        threshold_mm2: f64,
    },

    /// Sum dark_mm2 per label for a list of labels
    Aggregate {
        /// Speck report CSV
        #[arg(value_name = "REPORT")]
        report: PathBuf,

        /// Labels of interest, one per line or comma-separated
        #[arg(long, value_name = "FILE")]
        labels: PathBuf,

        #[arg(short, long, value_name = "FILE", default_value = "label_areas.csv")]
        out: PathBuf,

        #[arg(long, value_name = "N", default_value = "2")]
        decimals: u32,
    },

    /// Draw a reproducible random sample of report rows
    Sample {
        /// Any CSV with a header row
        #[arg(value_name = "CSV")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE", default_value = "random_sample.csv")]
        out: PathBuf,

        #[arg(short = 'n', long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        size: usize,

        #[arg(long, default_value_t = DEFAULT_SAMPLE_SEED)]
        seed: u64,

        /// Columns to keep (comma-separated); all when omitted
        #[arg(long, value_name = "COLS", value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Count red pixels of overlay images beside their crops
    Overlay {
        /// Folder with crops and overlay_<crop>.png files
        #[arg(value_name = "DIR")]
        folder: PathBuf,

        #[arg(short, long, value_name = "FILE", default_value = "areas.csv")]
        out: PathBuf,
    },

    /// Search bilateral pre-filter settings against hand measurements
    Calibrate {
        #[command(flatten)]
        args: MeasureArgs,

        /// CSV with image and "dark_px_by hand_mm2" columns
        #[arg(long, value_name = "FILE")]
        ground_truth: PathBuf,

        /// Per-ROI results of the best setting
        #[arg(short, long, value_name = "FILE", default_value = "calibration.csv")]
        out: PathBuf,

        /// Also write the full speck report measured with the best setting
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut observability_config = ObservabilityConfig::from_env();
    if cli.metrics_file.is_some() {
        observability_config.metrics_file = cli.metrics_file.clone();
    }
    let metrics = observability::init_observability_with_config(observability_config)?;

    let result = run(cli.command);
    flush_metrics(&metrics);
    result
}

fn flush_metrics(metrics: &MetricsTextfile) {
    if let Err(e) = metrics.flush() {
        let path = metrics.path().map(|p| p.display().to_string());
        error_logging::log_filesystem_error(&e, "write_metrics_file", path.as_deref());
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Measure {
            args,
            out,
            crops,
            masks,
            mask_style,
            decimals,
        } => {
            let _span = tracing_mod::command_span("measure").entered();
            let mut config = args.resolve()?;
            if let Some(decimals) = decimals {
                config.measurement.decimals = decimals;
                config.validate()?;
            }
            info!("{}", config.summary());

            let pairs = discover_sheets(&args.folder, config.batch.pairing, SHEET_EXTENSIONS)?;
            let measurer = SpeckMeasurer::new(config.measurement.clone())?;
            let exporter = SpeckExporter::new(crops, masks, mask_style);
            let outcome = {
                let folder = args.folder.display().to_string();
                let _batch = tracing_mod::batch_span(&folder, config.batch.parallel).entered();
                run_batch(&pairs, &measurer, &exporter, config.batch.parallel)
            };

            let rows = outcome.speck_rows(config.measurement.decimals);
            write_speck_report(&out, &rows)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            record_report_metrics("speck", rows.len());

            println!(
                "✓ {} ({} rows, {} sheets, {} skipped)",
                out.display(),
                rows.len(),
                outcome.summary.sheets_processed,
                outcome.summary.sheets_skipped
            );
        }

        Commands::Pixels { args, out } => {
            let _span = tracing_mod::command_span("pixels").entered();
            let config = args.resolve()?;
            info!("{}", config.summary());

            let pairs = discover_sheets(&args.folder, config.batch.pairing, SHEET_EXTENSIONS)?;
            let measurer = SpeckMeasurer::new(config.measurement.clone())?;
            let outcome =
                run_batch(&pairs, &measurer, &SpeckExporter::default(), config.batch.parallel);

            let rows = outcome.pixel_rows();
            write_pixel_report(&out, &rows)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            record_report_metrics("pixels", rows.len());

            println!("✓ {} ({} rows)", out.display(), rows.len());
        }

        Commands::Rects {
            images,
            jsons,
            out_img,
            out_rect,
            radius_mm,
            filling_factor,
            threshold_mm2,
        } => {
            let _span = tracing_mod::command_span("rects").entered();
            let rect_config = RectReportConfig {
                radius_mm,
                filling_factor,
                threshold_mm2,
            };

            let records = scan_images(&images)?;
            if records.is_empty() {
                anyhow::bail!(
                    "No images found in {} - check the path and extensions",
                    images.display()
                );
            }
            write_images_csv(&out_img, &records)?;

            let json_files = list_files(&jsons, &["json"])?;
            let (rows, summary) = convert_rectangles(&json_files, &records, &rect_config)?;
            write_rects_csv(&out_rect, &rows)?;
            record_report_metrics("rects", rows.len());

            println!("✓ {} ({} lines)", out_img.display(), records.len());
            println!("✓ {} ({} rectangles)", out_rect.display(), summary.rectangles);
            println!("   Total adjusted area: {:.3} mm²", summary.total_adj_mm2);
            println!(
                "   {} spots ≥ {} mm² (sum {:.3} mm²)",
                summary.large_count, rect_config.threshold_mm2, summary.large_sum_mm2
            );
        }

        Commands::Aggregate {
            report,
            labels,
            out,
            decimals,
        } => {
            let _span = tracing_mod::command_span("aggregate").entered();
            let rows = read_speck_report(&report)
                .with_context(|| format!("Failed to read {}", report.display()))?;
            let labels = read_label_list(&labels)?;

            let totals = aggregate_by_label(&rows, &labels, decimals);
            write_label_totals(&out, &totals)?;
            record_report_metrics("aggregate", totals.len());

            println!("✓ Wrote {} rows to {}", totals.len(), out.display());
        }

        Commands::Sample {
            input,
            out,
            size,
            seed,
            columns,
        } => {
            let _span = tracing_mod::command_span("sample").entered();
            let sampled = sample_csv_file(&input, &out, size, seed, &columns)?;
            record_report_metrics("sample", sampled);

            println!("✓ {} sampled rows saved to {}", sampled, out.display());
        }

        Commands::Overlay { folder, out } => {
            let _span = tracing_mod::command_span("overlay").entered();
            let rows = measure_overlay_dir(&folder, SHEET_EXTENSIONS)?;
            write_coverage_csv(&out, &rows)?;
            record_report_metrics("overlay", rows.len());

            println!("✓ {} ({} crops)", out.display(), rows.len());
        }

        Commands::Calibrate {
            args,
            ground_truth,
            out,
            report,
        } => {
            let _span = tracing_mod::command_span("calibrate").entered();
            let config = args.resolve()?;
            info!("{}", config.summary());

            let truth = read_ground_truth(&ground_truth)?;
            let pairs = discover_sheets(&args.folder, config.batch.pairing, SHEET_EXTENSIONS)?;
            let samples = load_samples(&pairs, &truth, &config.measurement)?;

            let outcome =
                calibrate(&samples, &CalibrationGrid::default(), config.measurement.cleanup)?;
            write_calibration_rows(&out, &outcome.rows)?;

            println!("Best STD: {}", outcome.error_std);
            println!("Best params: {}", outcome.pre_filter);

            if let Some(report_path) = report {
                let mut measurement = config.measurement.clone();
                measurement.pre_filter = outcome.pre_filter.clone();
                let measurer = SpeckMeasurer::new(measurement)?;
                let batch =
                    run_batch(&pairs, &measurer, &SpeckExporter::default(), config.batch.parallel);
                let rows = batch.speck_rows(config.measurement.decimals);
                write_speck_report(&report_path, &rows)?;
                record_report_metrics("speck", rows.len());
                println!("✓ {} ({} rows)", report_path.display(), rows.len());
            }
        }
    }

    Ok(())
}
