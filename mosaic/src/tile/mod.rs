//! Tiles, the tile set and the nominal grid geometry they are laid out on.


use std::collections::HashMap;
use std::fmt;

use common::buffer2::Buffer2;
use glam::{DVec2, IVec2};

use crate::error::{Error, Result};

/// Rec.709 luminance weights for RGB samples.
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Zero-based grid cell of a tile. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GridCoord {
    pub x: usize,
    pub y: usize,
}

impl GridCoord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Grid step from `self` to `other`.
    pub fn diff(&self, other: GridCoord) -> IVec2 {
        IVec2::new(
            other.x as i32 - self.x as i32,
            other.y as i32 - self.y as i32,
        )
    }

    /// True when `other` is one step away along exactly one axis.
    pub fn is_adjacent(&self, other: GridCoord) -> bool {
        is_unit_step(self.diff(other))
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

pub(crate) fn is_unit_step(diff: IVec2) -> bool {
    diff.x.abs() + diff.y.abs() == 1
}

/// Image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Number of interleaved channels (1 for grayscale, 3 for RGB)
    pub channels: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        assert!(width > 0, "Width must be positive");
        assert!(height > 0, "Height must be positive");
        assert!(channels > 0, "Channels must be positive");
        Self {
            width,
            height,
            channels,
        }
    }

    /// Total number of samples (width * height * channels).
    pub fn sample_count(&self) -> usize {
        self.width * self.height * self.channels
    }

    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    pub fn is_rgb(&self) -> bool {
        self.channels == 3
    }
}

/// 16-bit tile pixels with interleaved channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    dimensions: ImageDimensions,
    samples: Vec<u16>,
}

impl TileImage {
    pub fn new(dimensions: ImageDimensions, samples: Vec<u16>) -> Self {
        assert_eq!(
            samples.len(),
            dimensions.sample_count(),
            "samples length must equal width * height * channels"
        );
        Self {
            dimensions,
            samples,
        }
    }

    /// Widens 8-bit samples so that `value >> 8` restores the original byte.
    pub fn from_u8(dimensions: ImageDimensions, samples: &[u8]) -> Self {
        Self::new(
            dimensions,
            samples.iter().map(|&v| u16::from(v) * 257).collect(),
        )
    }

    /// Image with every pixel set to `color` (one value per channel).
    pub fn filled(width: usize, height: usize, color: &[u16]) -> Self {
        let dimensions = ImageDimensions::new(width, height, color.len());
        let samples = color
            .iter()
            .copied()
            .cycle()
            .take(dimensions.sample_count())
            .collect();
        Self::new(dimensions, samples)
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    pub fn channels(&self) -> usize {
        self.dimensions.channels
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Interleaved samples of pixel `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u16] {
        let channels = self.dimensions.channels;
        let start = (y * self.dimensions.width + x) * channels;
        &self.samples[start..start + channels]
    }

    /// Single-channel luminance of the whole image, scaled to `[0, 1]`.
    pub fn luminance(&self) -> Buffer2<f32> {
        self.luminance_region(0, 0, self.width(), self.height())
    }

    /// Luminance of the `width x height` window at `(x, y)`.
    ///
    /// RGB uses Rec.709 weights, any other channel count the channel mean.
    pub fn luminance_region(&self, x: usize, y: usize, width: usize, height: usize) -> Buffer2<f32> {
        assert!(
            x + width <= self.width() && y + height <= self.height(),
            "luminance region exceeds image bounds"
        );
        let channels = self.channels();
        let scale = 1.0 / f32::from(u16::MAX);
        Buffer2::from_fn(width, height, |col, row| {
            let px = self.pixel(x + col, y + row);
            let value = match channels {
                1 => f32::from(px[0]),
                3 => px
                    .iter()
                    .zip(LUMA_WEIGHTS)
                    .map(|(&v, w)| f32::from(v) * w)
                    .sum(),
                _ => px.iter().map(|&v| f32::from(v)).sum::<f32>() / channels as f32,
            };
            value * scale
        })
    }
}

/// A tile image and the grid cell it was captured at.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub coord: GridCoord,
    pub image: TileImage,
}

impl Tile {
    pub fn new(coord: GridCoord, image: TileImage) -> Self {
        Self { coord, image }
    }
}

/// Extent shared by every tile plus the expected overlap fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGeometry {
    pub width: usize,
    pub height: usize,
    pub overlap: f64,
}

impl TileGeometry {
    pub fn new(width: usize, height: usize, overlap: f64) -> Self {
        Self {
            width,
            height,
            overlap,
        }
    }

    /// Width of the strip shared with a horizontal neighbour.
    pub fn overlap_width(&self) -> usize {
        (self.width as f64 * self.overlap).floor() as usize
    }

    /// Height of the strip shared with a vertical neighbour.
    pub fn overlap_height(&self) -> usize {
        (self.height as f64 * self.overlap).floor() as usize
    }

    /// Nominal distance between neighbouring tile origins.
    pub fn step(&self) -> DVec2 {
        DVec2::new(
            self.width as f64 * (1.0 - self.overlap),
            self.height as f64 * (1.0 - self.overlap),
        )
    }

    /// Width of the left feathering ramp.
    pub fn blend_margin_x(&self) -> usize {
        (self.width as f64 * self.overlap / 2.0).floor() as usize
    }

    /// Height of the top feathering ramp.
    pub fn blend_margin_y(&self) -> usize {
        (self.height as f64 * self.overlap / 2.0).floor() as usize
    }
}

/// Nominal pixel layout of a `columns x rows` grid centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub geometry: TileGeometry,
    pub columns: usize,
    pub rows: usize,
}

impl GridLayout {
    pub fn new(geometry: TileGeometry, columns: usize, rows: usize) -> Self {
        Self {
            geometry,
            columns,
            rows,
        }
    }

    /// Top-left pixel position of `coord` before any correction.
    pub fn nominal(&self, coord: GridCoord) -> IVec2 {
        let axis = |index: usize, count: usize, extent: usize| -> i32 {
            let centred = index as f64 - (count as f64 - 1.0) / 2.0;
            ((centred * (1.0 - self.geometry.overlap) - 0.5) * extent as f64).trunc() as i32
        };
        IVec2::new(
            axis(coord.x, self.columns, self.geometry.width),
            axis(coord.y, self.rows, self.geometry.height),
        )
    }
}

/// Ordered, validated collection of equally sized tiles.
#[derive(Debug, Clone)]
pub struct TileSet {
    tiles: Vec<Tile>,
    overlap: f64,
    columns: usize,
    rows: usize,
}

impl TileSet {
    /// Validates and wraps `tiles`.
    ///
    /// Tile order is preserved; index 0 becomes the reference tile.
    pub fn new(tiles: Vec<Tile>, overlap: f64) -> Result<Self> {
        let Some(first) = tiles.first() else {
            return Err(Error::NoTiles);
        };
        if !(overlap > 0.0 && overlap < 1.0) {
            return Err(Error::InvalidOverlap { overlap });
        }

        let expected = first.image.dimensions();
        for (index, tile) in tiles.iter().enumerate().skip(1) {
            let actual = tile.image.dimensions();
            if actual != expected {
                return Err(Error::DimensionMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }

        let mut seen: HashMap<GridCoord, usize> = HashMap::with_capacity(tiles.len());
        for (index, tile) in tiles.iter().enumerate() {
            if let Some(&first) = seen.get(&tile.coord) {
                return Err(Error::DuplicateCoordinate {
                    first,
                    second: index,
                    coord: tile.coord,
                });
            }
            seen.insert(tile.coord, index);
        }

        let columns = tiles.iter().map(|t| t.coord.x).max().unwrap_or(0) + 1;
        let rows = tiles.iter().map(|t| t.coord.y).max().unwrap_or(0) + 1;

        Ok(Self {
            tiles,
            overlap,
            columns,
            rows,
        })
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.tiles[0].image.dimensions()
    }

    pub fn coords(&self) -> Vec<GridCoord> {
        self.tiles.iter().map(|t| t.coord).collect()
    }

    pub fn geometry(&self) -> TileGeometry {
        let dims = self.dimensions();
        TileGeometry::new(dims.width, dims.height, self.overlap)
    }

    pub fn layout(&self) -> GridLayout {
        GridLayout::new(self.geometry(), self.columns, self.rows)
    }
}
