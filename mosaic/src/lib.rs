//! Mosaic - assembly of overlapping grid tiles into one image.
//!
//! The engine works in four stages:
//! - phase-correlation registration of every pair of grid-adjacent tiles
//! - a single error-weighted camera rotation estimate
//! - a bounded least-squares solve for per-tile offsets
//! - feathered compositing of all tiles onto one canvas
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mosaic::{Config, Stitcher, load_tile_directory, save_mosaic};
//!
//! let loaded = load_tile_directory("tiles/", mosaic::DEFAULT_OVERLAP)?;
//! let result = Stitcher::new(Config::default()).stitch(&loaded.tiles)?;
//! save_mosaic(&result.mosaic, "stitched.tif")?;
//! ```

pub mod angle;
pub mod compositor;
pub mod config;
pub mod error;
pub mod graph;
pub mod io;
pub mod pipeline;
pub mod registration;
pub mod solver;
pub mod tile;

#[cfg(test)]
pub(crate) mod testing;

pub use angle::estimate_camera_angle;
pub use compositor::{Mosaic, MosaicPixels, Placement, assemble};
pub use config::{Config, DEFAULT_OVERLAP, RegistrationConfig, SolverConfig};
pub use error::{Error, Result};
pub use graph::{AdjacencyGraph, TilePair};
pub use io::{
    LoadedTiles, load_tile_directory, load_tile_image, parse_tile_file_name, save_mosaic,
    save_tile_image, stitched_file_name,
};
pub use pipeline::{Diagnostics, StitchResult, Stitcher};
pub use registration::{PairMeasurement, PairRegistrar};
pub use registration::phase_correlation::SubpixelMethod;
pub use solver::{SolveStatus, Solution, SolvedPosition, solve_positions};
pub use tile::{GridCoord, GridLayout, ImageDimensions, Tile, TileGeometry, TileImage, TileSet};
