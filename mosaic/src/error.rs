//! Error types for mosaic assembly.

use std::io;
use std::path::PathBuf;

use glam::IVec2;
use thiserror::Error;

use crate::tile::{GridCoord, ImageDimensions};

pub type Result<T> = std::result::Result<T, Error>;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while loading, registering or assembling tiles.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No tiles provided for stitching")]
    NoTiles,

    #[error("Overlap fraction must lie in (0, 1), got {overlap}")]
    InvalidOverlap { overlap: f64 },

    #[error("Dimension mismatch for tile {index}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        index: usize,
        expected: ImageDimensions,
        actual: ImageDimensions,
    },

    #[error("Tiles {first} and {second} share grid coordinate {coord}")]
    DuplicateCoordinate {
        first: usize,
        second: usize,
        coord: GridCoord,
    },

    #[error("Tiles are not grid-adjacent: coordinate difference ({}, {})", diff.x, diff.y)]
    NonAdjacentPair { diff: IVec2 },

    #[error("Overlap strip is empty ({width}x{height})")]
    EmptyOverlap { width: usize, height: usize },

    #[error("Cannot estimate camera angle: no registered tile pairs")]
    DegenerateAngle,

    #[error("Tile file name '{name}' has no '-<x>_<y>-' grid coordinate")]
    TileFileName { name: String },

    #[error("No tile images found in '{path}'")]
    EmptyDirectory { path: PathBuf },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxedError,
    },

    #[error("Failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: BoxedError,
    },

    #[error("Unsupported image format for '{path}': {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },
}
