//! framekeep: batch region filtering over a directory of images.
//!
//! Loads every matching image under `<input-root>/<dir>`, then for each
//! image and each selected filter: applies the filter to the configured
//! regions, saves the result under `<output-root>/<dir>/<filter>/`, and
//! resets the image before the next filter. Each image is unloaded once
//! all its variants are written.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin framekeep -- --dir people --filter gaussian --filter pixelate
//! ```

#![allow(clippy::print_stderr)]

mod regions;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use framekeep_pipeline::{
    CacheKind, Pipeline, PipelineConfig, PipelineError, RasterCodec, RegionFilter,
    RegionFilterKind, RegionOverlay, keys,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::regions::{FractionalRegions, RelativeRegion};

/// Default cache capacity, in images.
const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Apply region filters to every image in a directory and save one copy
/// per filter.
#[derive(Debug, Parser)]
#[command(name = "framekeep", version)]
struct Cli {
    /// Root that `--dir` and image keys are relative to.
    #[arg(long, default_value = PipelineConfig::DEFAULT_INPUT_ROOT)]
    input_root: PathBuf,

    /// Root that filtered copies are written under.
    #[arg(long, default_value = PipelineConfig::DEFAULT_OUTPUT_ROOT)]
    output_root: PathBuf,

    /// Directory under the input root to process. Empty means the whole
    /// input root.
    #[arg(long, default_value = "")]
    dir: String,

    /// File extensions to load (case-insensitive, leading dot optional).
    #[arg(long = "ext", value_name = "EXT", default_values = [".jpg", ".jpeg"])]
    extensions: Vec<String>,

    /// Maximum number of decoded images kept in the cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Keep every decoded image cached instead of evicting.
    #[arg(long, conflicts_with = "cache_capacity")]
    unbounded_cache: bool,

    /// Region to filter, as "X,Y,W,H" percentages of the image size.
    /// Repeat for several regions.
    #[arg(long = "region", value_name = "X,Y,W,H", default_value = "25,15,50,60")]
    regions: Vec<RelativeRegion>,

    /// Filters to apply, one output variant each.
    #[arg(long = "filter", value_enum, default_values_t = [Filter::Gaussian, Filter::Median, Filter::Pixelate])]
    filters: Vec<Filter>,

    /// Gaussian blur sigma.
    #[arg(long, default_value_t = RegionFilterKind::DEFAULT_SIGMA)]
    sigma: f32,

    /// Median blur radius in pixels.
    #[arg(long, default_value_t = RegionFilterKind::DEFAULT_MEDIAN_RADIUS)]
    median_radius: u32,

    /// Pixelation block size in pixels.
    #[arg(long, default_value_t = RegionFilterKind::DEFAULT_BLOCK)]
    block: u32,

    /// Skip images whose shorter side is below this many pixels.
    #[arg(long, value_name = "PIXELS")]
    min_dimension: Option<u32>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, `--input-root`, `--output-root`, `--ext`, and the
    /// cache flags are ignored. The JSON must be a valid
    /// `PipelineConfig` serialization; missing fields take defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Log filter directive (e.g. "debug" or "framekeep_pipeline=trace").
    /// Overrides `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,
}

/// Region filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Filter {
    /// Strong per-channel Gaussian blur.
    Gaussian,
    /// Median blur.
    Median,
    /// Blocky mosaic.
    Pixelate,
    /// Solid black box.
    Fill,
}

impl Filter {
    const fn to_kind(self, cli: &Cli) -> RegionFilterKind {
        match self {
            Self::Gaussian => RegionFilterKind::GaussianBlur { sigma: cli.sigma },
            Self::Median => RegionFilterKind::MedianBlur {
                radius: cli.median_radius,
            },
            Self::Pixelate => RegionFilterKind::Pixelate { block: cli.block },
            Self::Fill => RegionFilterKind::DEFAULT_FILL,
        }
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided it is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        input_root: cli.input_root.clone(),
        output_root: cli.output_root.clone(),
        cache: if cli.unbounded_cache {
            CacheKind::Unbounded
        } else {
            CacheKind::Lru {
                capacity: cli.cache_capacity,
            }
        },
        extensions: cli.extensions.clone(),
    })
}

fn init_tracing(directive: Option<&str>) {
    let filter = directive.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Output subdirectory for one filter variant: `<dir>/<filter name>`.
fn variant_subdir(dir: &str, kind: &RegionFilterKind) -> String {
    format!("{}{}", keys::directory_prefix(dir), kind.name())
}

/// Counts reported at the end of a run.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    images: usize,
    variants: usize,
}

/// Run the batch and return what was written.
///
/// Stops at the first error; images finished before it keep their
/// outputs.
fn run(cli: &Cli, config: &PipelineConfig) -> Result<Summary, PipelineError> {
    let filters: Vec<RegionFilterKind> = cli.filters.iter().map(|f| f.to_kind(cli)).collect();

    let mut pipeline = Pipeline::new(config, RasterCodec)?;
    let mut overlay = RegionOverlay::new(FractionalRegions::new(cli.regions.clone()));

    pipeline.load_directory_default(&cli.dir)?;
    if let Some(min) = cli.min_dimension {
        pipeline.filter(|key, img| {
            let keep = img.width().min(img.height()) >= min;
            if !keep {
                tracing::info!(key, width = img.width(), height = img.height(), "skipping small image");
            }
            keep
        });
    }

    let mut image_keys = pipeline.image_keys(&cli.dir);
    image_keys.sort();

    let mut summary = Summary::default();
    for key in &image_keys {
        for kind in &filters {
            overlay.process_region(pipeline.working_set_mut(), key, |img, region| {
                kind.apply(img, region);
            })?;
            pipeline.save_as(key, &variant_subdir(&cli.dir, kind))?;
            overlay.reset_region(key);
            pipeline.reset(key)?;
            summary.variants += 1;
        }
        pipeline.unload(key)?;
        summary.images += 1;
        tracing::info!(key = %key, variants = filters.len(), "done");
    }
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "starting");

    match run(&cli, &config) {
        Ok(summary) => {
            tracing::info!(
                images = summary.images,
                variants = summary.variants,
                "processing completed"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
