//! Testing utilities for mosaic.

#![allow(dead_code)]

use common::buffer2::Buffer2;
use glam::IVec2;

use crate::tile::{GridCoord, Tile, TileImage, TileSet};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Small deterministic LCG so synthetic scenes are reproducible.
pub struct TestRng(u64);

impl TestRng {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 33) as f32 / (1u64 << 31) as f32
    }

    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + self.next_f32() * (hi - lo)
    }
}

/// Textured scene in `[0, 1]`: a shallow gradient plus many Gaussian blobs of
/// varying size and brightness, dense enough that every overlap strip of a
/// tile cut from it carries structure.
pub fn blob_scene(width: usize, height: usize, seed: u64) -> Buffer2<f32> {
    let mut rng = TestRng::new(seed);
    let mut scene = Buffer2::from_fn(width, height, |x, y| {
        0.05 + 0.05 * (x as f32 / width as f32) + 0.03 * (y as f32 / height as f32)
    });

    let blob_count = (width * height) / 120;
    for _ in 0..blob_count {
        let cx = rng.range(0.0, width as f32);
        let cy = rng.range(0.0, height as f32);
        let sigma = rng.range(1.5, 5.0);
        let amplitude = rng.range(0.1, 0.6);

        let reach = (3.0 * sigma).ceil() as isize;
        let x0 = (cx as isize - reach).max(0);
        let x1 = (cx as isize + reach).min(width as isize - 1);
        let y0 = (cy as isize - reach).max(0);
        let y1 = (cy as isize + reach).min(height as isize - 1);
        let inv = 1.0 / (2.0 * sigma * sigma);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                scene[(x as usize, y as usize)] += amplitude * (-(dx * dx + dy * dy) * inv).exp();
            }
        }
    }

    for v in scene.pixels_mut() {
        *v = v.min(1.0);
    }
    scene
}

/// Cuts a `width x height` window at `(x, y)` out of `scene` as a tile image,
/// replicating the luminance into `channels` channels.
pub fn cut_tile(
    scene: &Buffer2<f32>,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    channels: usize,
) -> TileImage {
    let window = scene.crop(x, y, width, height);
    let samples = window
        .iter()
        .flat_map(|&v| std::iter::repeat_n((v * f32::from(u16::MAX)).round() as u16, channels))
        .collect();
    TileImage::new(
        crate::tile::ImageDimensions::new(width, height, channels),
        samples,
    )
}

/// Per-tile pixel displacement from the ideal grid used by [`grid_tile_set`].
pub type Jitter = fn(GridCoord) -> (i32, i32);

/// Cuts a `columns x rows` grid of `size`-pixel tiles out of one scene.
///
/// Tile `(x, y)` starts at `margin + x * step + jitter(x, y)` where `step` is
/// the nominal step for `overlap`. Tiles are ordered row-major.
pub fn grid_tile_set(
    columns: usize,
    rows: usize,
    size: usize,
    overlap: f64,
    jitter: Jitter,
    seed: u64,
) -> TileSet {
    let margin = 16usize;
    let step = (size as f64 * (1.0 - overlap)).round() as usize;
    let scene_w = margin * 2 + step * (columns - 1) + size;
    let scene_h = margin * 2 + step * (rows - 1) + size;
    let scene = blob_scene(scene_w, scene_h, seed);

    let mut tiles = Vec::with_capacity(columns * rows);
    for y in 0..rows {
        for x in 0..columns {
            let coord = GridCoord::new(x, y);
            let (jx, jy) = jitter(coord);
            let left = (margin + x * step) as i32 + jx;
            let top = (margin + y * step) as i32 + jy;
            let image = cut_tile(&scene, left as usize, top as usize, size, size, 1);
            tiles.push(Tile::new(coord, image));
        }
    }
    TileSet::new(tiles, overlap).expect("synthetic tile set is valid")
}

/// Cuts a `columns x rows` grid of `size`-pixel tiles along a stage grid
/// rotated by `angle` radians against the camera axes.
///
/// Moving one column right drops the tile by `sin(angle) * step` pixels and
/// moving one row down shifts it right by the same amount. Returns the tile
/// set (row-major) and the top-left scene position each tile was cut from.
pub fn rotated_grid_tile_set(
    columns: usize,
    rows: usize,
    size: usize,
    overlap: f64,
    angle: f64,
    seed: u64,
) -> (TileSet, Vec<IVec2>) {
    let step = size as f64 * (1.0 - overlap);
    let (sin, cos) = angle.sin_cos();
    let drift = (sin.abs() * step * (columns.max(rows) as f64)).ceil() as usize;
    let margin = 16 + drift;
    let scene_w = margin * 2 + (step * (columns - 1) as f64).ceil() as usize + size;
    let scene_h = margin * 2 + (step * (rows - 1) as f64).ceil() as usize + size;
    let scene = blob_scene(scene_w, scene_h, seed);

    let mut tiles = Vec::with_capacity(columns * rows);
    let mut origins = Vec::with_capacity(columns * rows);
    for y in 0..rows {
        for x in 0..columns {
            let (gx, gy) = (x as f64 * step, y as f64 * step);
            let left = margin as f64 + gx * cos + gy * sin;
            let top = margin as f64 + gy * cos - gx * sin;
            let origin = IVec2::new(left.round() as i32, top.round() as i32);
            let image = cut_tile(&scene, origin.x as usize, origin.y as usize, size, size, 1);
            tiles.push(Tile::new(GridCoord::new(x, y), image));
            origins.push(origin);
        }
    }
    let tiles = TileSet::new(tiles, overlap).expect("synthetic tile set is valid");
    (tiles, origins)
}

pub fn no_jitter(_: GridCoord) -> (i32, i32) {
    (0, 0)
}
