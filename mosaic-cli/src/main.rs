//! mosaic-stitch: assemble a directory of grid tiles into one image.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::FileFormat;
use common::log_setup::setup_logging;
use mosaic::{
    Config, DEFAULT_OVERLAP, ImageDimensions, Stitcher, load_tile_directory, save_mosaic,
};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "mosaic-stitch")]
#[command(about = "Register overlapping grid tiles and blend them into one mosaic")]
#[command(version)]
struct Cli {
    /// Directory holding `{prefix}-{x}_{y}-{suffix}` tile images.
    input_dir: PathBuf,

    /// Directory the stitched image is written to.
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Fraction of each tile dimension shared with its neighbour.
    #[arg(long, default_value_t = DEFAULT_OVERLAP)]
    overlap: f64,

    /// Largest accepted correction from the nominal grid, in pixels.
    #[arg(long)]
    max_shift: Option<f64>,

    /// Radius of the median pre-filter; 0 disables it.
    #[arg(long)]
    median_radius: Option<usize>,

    /// Skip the Sobel edge filter before correlation.
    #[arg(long)]
    no_edge_filter: bool,

    /// Write an 8-bit image instead of keeping the source bit depth.
    #[arg(long)]
    display_depth: bool,

    /// Register pairs one at a time.
    #[arg(long)]
    sequential: bool,

    /// YAML or JSON configuration; flags given on the command line win.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily-rolling log files here.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = setup_logging(&cli.log_level, cli.log_dir.as_deref()) {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(output) => {
            info!("Wrote {}", output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<PathBuf> {
    validate_overlap(cli.overlap)?;
    let config = build_config(cli)?;

    let loaded = load_tile_directory(&cli.input_dir, cli.overlap)
        .with_context(|| format!("Failed to load tiles from {}", cli.input_dir.display()))?;
    check_median_radius(
        config.registration.median_radius,
        loaded.tiles.dimensions(),
        cli.overlap,
    )?;

    let result = Stitcher::new(config)
        .stitch(&loaded.tiles)
        .context("Stitching failed")?;

    let d = &result.diagnostics;
    info!(
        tiles = d.tile_count,
        registered = d.registered_pairs,
        failed = d.failed_pairs,
        mean_error = d.mean_pair_error,
        residual = d.solver_residual,
        status = ?d.solver_status,
        angle_deg = result.angle.to_degrees(),
        "Stitch summary"
    );

    fs::create_dir_all(&cli.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            cli.output_dir.display()
        )
    })?;
    let output = cli
        .output_dir
        .join(mosaic::stitched_file_name(&loaded.prefix));
    save_mosaic(&result.mosaic, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(output)
}

fn validate_overlap(overlap: f64) -> Result<()> {
    if !(overlap > 0.0 && overlap < 1.0) {
        bail!("--overlap must lie strictly between 0 and 1, got {overlap}");
    }
    Ok(())
}

/// Config file values, then command-line overrides.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    if let Some(max_shift) = cli.max_shift {
        if !(max_shift.is_finite() && max_shift >= 0.0) {
            bail!("--max-shift must be a non-negative number, got {max_shift}");
        }
        config.solver.max_shift = max_shift;
    }
    if let Some(radius) = cli.median_radius {
        config.registration.median_radius = radius;
    }
    if cli.no_edge_filter {
        config.registration.edge_filter = false;
    }
    if cli.display_depth {
        config.full_depth = false;
    }
    if cli.sequential {
        config.parallel = false;
    }

    Ok(config)
}

fn load_config(path: &Path) -> Result<Config> {
    let name = path.to_string_lossy();
    let format = FileFormat::from_file_name(&name)
        .with_context(|| format!("Unsupported config file {name}"))?;
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read config {name}"))?;
    let config: Config = common::deserialize(&text, format)
        .with_context(|| format!("Failed to parse config {name}"))?;

    check_config(&config).with_context(|| format!("Invalid settings in {name}"))?;
    Ok(config)
}

/// User-facing counterpart of `Config::validate`, which panics.
fn check_config(config: &Config) -> Result<()> {
    let solver = &config.solver;
    if config.max_concurrent_pairs == 0 {
        bail!("max_concurrent_pairs must be > 0");
    }
    if !(solver.max_shift.is_finite() && solver.max_shift >= 0.0) {
        bail!("max_shift must be a finite non-negative number, got {}", solver.max_shift);
    }
    if solver.max_iterations == 0 {
        bail!("max_iterations must be > 0");
    }
    if !(solver.tolerance.is_finite() && solver.tolerance > 0.0) {
        bail!("tolerance must be a finite positive number, got {}", solver.tolerance);
    }
    Ok(())
}

/// The median disk must fit inside the narrow side of an overlap strip.
fn check_median_radius(radius: usize, dims: ImageDimensions, overlap: f64) -> Result<()> {
    let strip_width = (dims.width as f64 * overlap).floor() as usize;
    let strip_height = (dims.height as f64 * overlap).floor() as usize;
    let limit = strip_width.min(strip_height);
    if radius > limit {
        bail!(
            "--median-radius {radius} exceeds the {limit} px overlap strip of {}x{} tiles",
            dims.width,
            dims.height
        );
    }
    Ok(())
}
