//! Feathered compositing of solved tiles onto one canvas.


use glam::IVec2;
use rayon::prelude::*;
use tracing::debug;

use crate::solver::SolvedPosition;
use crate::tile::{GridCoord, TileGeometry, TileSet};

/// Where a tile was pasted on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub tile: usize,
    pub coord: GridCoord,
    /// Top-left canvas pixel of the tile.
    pub top_left: IVec2,
}

/// Canvas samples, interleaved like the source tiles.
#[derive(Debug, Clone, PartialEq)]
pub enum MosaicPixels {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl MosaicPixels {
    pub fn len(&self) -> usize {
        match self {
            MosaicPixels::U8(v) => v.len(),
            MosaicPixels::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample widened to 16 bits.
    pub fn get_u16(&self, index: usize) -> u16 {
        match self {
            MosaicPixels::U8(v) => u16::from(v[index]) * 257,
            MosaicPixels::U16(v) => v[index],
        }
    }
}

/// The assembled image and the positions used to build it.
#[derive(Debug, Clone, PartialEq)]
pub struct Mosaic {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub pixels: MosaicPixels,
    pub positions: Vec<SolvedPosition>,
    pub placements: Vec<Placement>,
}

impl Mosaic {
    /// Interleaved samples of canvas pixel `(x, y)`, widened to 16 bits.
    pub fn pixel(&self, x: usize, y: usize) -> Vec<u16> {
        let start = (y * self.width + x) * self.channels;
        (start..start + self.channels)
            .map(|i| self.pixels.get_u16(i))
            .collect()
    }
}

/// Paste every tile at its solved, rotation-corrected corner.
///
/// Tiles are painted in index order. The left and top margins of tiles that
/// have a neighbour on that side ramp linearly from the canvas to the tile.
/// Without `full_depth` the canvas holds the upper 8 bits of each sample.
pub fn assemble(
    tiles: &TileSet,
    positions: &[SolvedPosition],
    angle: f64,
    full_depth: bool,
) -> Mosaic {
    assert_eq!(
        positions.len(),
        tiles.len(),
        "one solved position per tile is required"
    );

    let dims = tiles.dimensions();
    let geometry = tiles.geometry();
    let sin = angle.sin();

    let corners: Vec<IVec2> = positions
        .iter()
        .map(|p| {
            let pos = p.position().as_dvec2();
            let nominal = p.nominal.as_dvec2();
            glam::DVec2::new(pos.x + sin * nominal.y, pos.y - sin * nominal.x)
                .round()
                .as_ivec2()
        })
        .collect();

    let min = corners.iter().fold(IVec2::MAX, |acc, &c| acc.min(c));
    let max = corners.iter().fold(IVec2::MIN, |acc, &c| acc.max(c));
    let width = (max.x - min.x) as usize + dims.width;
    let height = (max.y - min.y) as usize + dims.height;
    let channels = dims.channels;

    let mut canvas = vec![0u16; width * height * channels];
    let mut placements = Vec::with_capacity(tiles.len());

    for (index, (tile, &corner)) in tiles.tiles().iter().zip(&corners).enumerate() {
        let top_left = corner - min;
        let mask = BlendMask::new(&geometry, tile.coord);
        paste_tile(
            &mut canvas,
            width,
            channels,
            tile.image.samples(),
            dims.width,
            dims.height,
            top_left,
            &mask,
            full_depth,
        );
        placements.push(Placement {
            tile: index,
            coord: tile.coord,
            top_left,
        });
    }

    debug!(width, height, channels, full_depth, "Assembled mosaic");

    let pixels = if full_depth {
        MosaicPixels::U16(canvas)
    } else {
        MosaicPixels::U8(canvas.into_iter().map(|v| v as u8).collect())
    };

    Mosaic {
        width,
        height,
        channels,
        pixels,
        positions: positions.to_vec(),
        placements,
    }
}

/// Feathering weights of one tile.
#[derive(Debug, Clone)]
struct BlendMask {
    left: Vec<f32>,
    top: Vec<f32>,
}

impl BlendMask {
    fn new(geometry: &TileGeometry, coord: GridCoord) -> Self {
        let left = if coord.x > 0 {
            linspace(geometry.blend_margin_x())
        } else {
            Vec::new()
        };
        let top = if coord.y > 0 {
            linspace(geometry.blend_margin_y())
        } else {
            Vec::new()
        };
        Self { left, top }
    }

    /// The top ramp wins where both ramps apply.
    #[inline]
    fn weight(&self, x: usize, y: usize) -> f32 {
        if let Some(&w) = self.top.get(y) {
            w
        } else if let Some(&w) = self.left.get(x) {
            w
        } else {
            1.0
        }
    }
}

/// `n` evenly spaced values from 0 to 1 inclusive.
fn linspace(n: usize) -> Vec<f32> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n).map(|i| i as f32 / (n - 1) as f32).collect(),
    }
}

#[allow(clippy::too_many_arguments)]
fn paste_tile(
    canvas: &mut [u16],
    canvas_width: usize,
    channels: usize,
    samples: &[u16],
    tile_width: usize,
    tile_height: usize,
    top_left: IVec2,
    mask: &BlendMask,
    full_depth: bool,
) {
    let row_len = canvas_width * channels;
    let x0 = top_left.x as usize * channels;
    let y0 = top_left.y as usize;
    let tile_row_len = tile_width * channels;

    canvas
        .par_chunks_mut(row_len)
        .skip(y0)
        .take(tile_height)
        .enumerate()
        .for_each(|(y, canvas_row)| {
            let src = &samples[y * tile_row_len..(y + 1) * tile_row_len];
            let dst = &mut canvas_row[x0..x0 + tile_row_len];
            for (x, (dst_px, src_px)) in dst
                .chunks_exact_mut(channels)
                .zip(src.chunks_exact(channels))
                .enumerate()
            {
                let m = mask.weight(x, y);
                for (out, &value) in dst_px.iter_mut().zip(src_px) {
                    let value = if full_depth { value } else { value >> 8 };
                    if m >= 1.0 {
                        *out = value;
                    } else {
                        let blended = f32::from(value) * m + f32::from(*out) * (1.0 - m);
                        *out = blended.round() as u16;
                    }
                }
            }
        });
}
