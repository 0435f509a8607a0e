//! Tile and mosaic file I/O.
//!
//! Tiles are named `{prefix}-{x}_{y}-{suffix}.{ext}`; the last `-{x}_{y}-`
//! group of the file stem gives the grid coordinate.

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use common::file_utils::tile_image_files;
use rayon::prelude::*;
use tiff::decoder::DecodingResult;
use tiff::encoder::{TiffEncoder, colortype};

use crate::compositor::{Mosaic, MosaicPixels};
use crate::error::{Error, Result};
use crate::tile::{GridCoord, ImageDimensions, Tile, TileImage, TileSet};

/// Tiles read from one directory.
#[derive(Debug, Clone)]
pub struct LoadedTiles {
    pub tiles: TileSet,
    /// Name prefix of the first tile, used to name the output.
    pub prefix: String,
    /// Source file of each tile, in tile order.
    pub paths: Vec<PathBuf>,
}

/// File name of the stitched output for a tile prefix.
pub fn stitched_file_name(prefix: &str) -> String {
    format!("{prefix}-stitched.tif")
}

/// Split a tile file name into its prefix and grid coordinate.
pub fn parse_tile_file_name(name: &str) -> Result<(String, GridCoord)> {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let bytes = stem.as_bytes();

    for start in (0..bytes.len()).rev() {
        if bytes[start] != b'-' {
            continue;
        }
        if let Some(coord) = parse_coord_group(&stem[start + 1..]) {
            return Ok((stem[..start].to_string(), coord));
        }
    }

    Err(Error::TileFileName {
        name: name.to_string(),
    })
}

/// Parses `{digits}_{digits}-` at the start of `text`.
fn parse_coord_group(text: &str) -> Option<GridCoord> {
    let (x, rest) = split_digits(text)?;
    let rest = rest.strip_prefix('_')?;
    let (y, rest) = split_digits(rest)?;
    rest.starts_with('-').then_some(GridCoord::new(x, y))
}

fn split_digits(text: &str) -> Option<(usize, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}

/// Load every tile image in `dir`, ordered by file name.
pub fn load_tile_directory(dir: impl AsRef<Path>, overlap: f64) -> Result<LoadedTiles> {
    let dir = dir.as_ref();
    let paths = tile_image_files(dir).map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if paths.is_empty() {
        return Err(Error::EmptyDirectory {
            path: dir.to_path_buf(),
        });
    }

    let names: Vec<(String, GridCoord)> = paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            parse_tile_file_name(&name)
        })
        .collect::<Result<_>>()?;

    let images: Vec<TileImage> = paths
        .par_iter()
        .map(|path| load_tile_image(path))
        .collect::<Result<_>>()?;

    let prefix = names[0].0.clone();
    let tiles = names
        .into_iter()
        .zip(images)
        .map(|((_, coord), image)| Tile::new(coord, image))
        .collect();
    let tiles = TileSet::new(tiles, overlap)?;

    let dims = tiles.dimensions();
    tracing::info!(
        count = tiles.len(),
        columns = tiles.columns(),
        rows = tiles.rows(),
        width = dims.width,
        height = dims.height,
        channels = dims.channels,
        "Loaded tiles from {}",
        dir.display()
    );

    Ok(LoadedTiles {
        tiles,
        prefix,
        paths,
    })
}

/// Load one tile. TIFF goes through the `tiff` decoder, PNG and JPEG through
/// `image`. Alpha channels are dropped.
pub fn load_tile_image(path: impl AsRef<Path>) -> Result<TileImage> {
    let path = path.as_ref();
    match extension(path).as_str() {
        "tif" | "tiff" => load_tiff(path),
        "png" | "jpg" | "jpeg" => load_png_jpeg(path),
        ext => Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("file extension '{ext}'"),
        }),
    }
}

/// Write the mosaic as TIFF or PNG, chosen by extension.
pub fn save_mosaic(mosaic: &Mosaic, path: impl AsRef<Path>) -> Result<()> {
    let samples = match &mosaic.pixels {
        MosaicPixels::U8(v) => Samples::U8(v),
        MosaicPixels::U16(v) => Samples::U16(v),
    };
    write_samples(
        path.as_ref(),
        ImageDimensions::new(mosaic.width, mosaic.height, mosaic.channels),
        samples,
    )
}

/// Write a tile image at 16 bits as TIFF or PNG, chosen by extension.
pub fn save_tile_image(image: &TileImage, path: impl AsRef<Path>) -> Result<()> {
    write_samples(path.as_ref(), image.dimensions(), Samples::U16(image.samples()))
}

#[derive(Clone, Copy)]
enum Samples<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn decode_error(path: &Path) -> impl FnOnce(tiff::TiffError) -> Error + '_ {
    move |err| Error::Decode {
        path: path.to_path_buf(),
        source: Box::new(err),
    }
}

fn load_tiff(path: &Path) -> Result<TileImage> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = tiff::decoder::Decoder::new(file)
        .map_err(decode_error(path))?
        .with_limits(tiff::decoder::Limits::unlimited());

    let colortype = decoder.colortype().map_err(decode_error(path))?;
    let (stored, kept) = match colortype {
        tiff::ColorType::Gray(_) => (1, 1),
        tiff::ColorType::GrayA(_) => (2, 1),
        tiff::ColorType::RGB(_) => (3, 3),
        tiff::ColorType::RGBA(_) => (4, 3),
        other => {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("TIFF color type {other:?}"),
            });
        }
    };

    let (width, height) = decoder.dimensions().map_err(decode_error(path))?;
    let dims = ImageDimensions::new(width as usize, height as usize, kept);

    let samples: Vec<u16> = match decoder.read_image().map_err(decode_error(path))? {
        DecodingResult::U8(buf) => drop_alpha(&buf, stored, kept)
            .map(|v| u16::from(v) * 257)
            .collect(),
        DecodingResult::U16(buf) => drop_alpha(&buf, stored, kept).collect(),
        _ => {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "TIFF sample format other than 8/16-bit unsigned".to_string(),
            });
        }
    };

    if samples.len() != dims.sample_count() {
        return Err(Error::Decode {
            path: path.to_path_buf(),
            source: format!(
                "expected {} samples, decoded {}",
                dims.sample_count(),
                samples.len()
            )
            .into(),
        });
    }
    Ok(TileImage::new(dims, samples))
}

/// Keep the first `kept` of every `stored` interleaved samples.
fn drop_alpha<T: Copy>(buf: &[T], stored: usize, kept: usize) -> impl Iterator<Item = T> + '_ {
    buf.chunks_exact(stored)
        .flat_map(move |px| px[..kept].iter().copied())
}

fn load_png_jpeg(path: &Path) -> Result<TileImage> {
    let img = image::open(path).map_err(|err| Error::Decode {
        path: path.to_path_buf(),
        source: Box::new(err),
    })?;

    let (width, height) = (img.width() as usize, img.height() as usize);
    if img.color().has_color() {
        let rgb = img.to_rgb16();
        Ok(TileImage::new(
            ImageDimensions::new(width, height, 3),
            rgb.into_raw(),
        ))
    } else {
        let gray = img.to_luma16();
        Ok(TileImage::new(
            ImageDimensions::new(width, height, 1),
            gray.into_raw(),
        ))
    }
}

fn write_samples(path: &Path, dims: ImageDimensions, samples: Samples<'_>) -> Result<()> {
    match extension(path).as_str() {
        "tif" | "tiff" => save_tiff(path, dims, samples),
        "png" => save_png(path, dims, samples),
        ext => Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("output extension '{ext}'"),
        }),
    }
}

fn save_tiff(path: &Path, dims: ImageDimensions, samples: Samples<'_>) -> Result<()> {
    let file = File::create(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encode_error = |err: tiff::TiffError| Error::Encode {
        path: path.to_path_buf(),
        source: Box::new(err),
    };
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(encode_error)?;

    let (w, h) = (dims.width as u32, dims.height as u32);
    let written = match (samples, dims.channels) {
        (Samples::U8(data), 1) => encoder.write_image::<colortype::Gray8>(w, h, data),
        (Samples::U8(data), 3) => encoder.write_image::<colortype::RGB8>(w, h, data),
        (Samples::U8(data), 4) => encoder.write_image::<colortype::RGBA8>(w, h, data),
        (Samples::U16(data), 1) => encoder.write_image::<colortype::Gray16>(w, h, data),
        (Samples::U16(data), 3) => encoder.write_image::<colortype::RGB16>(w, h, data),
        (Samples::U16(data), 4) => encoder.write_image::<colortype::RGBA16>(w, h, data),
        (_, channels) => {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("TIFF with {channels} channels"),
            });
        }
    };
    written.map_err(encode_error)
}

fn save_png(path: &Path, dims: ImageDimensions, samples: Samples<'_>) -> Result<()> {
    use image::ColorType;

    let (bytes, color): (&[u8], ColorType) = match (samples, dims.channels) {
        (Samples::U8(data), 1) => (data, ColorType::L8),
        (Samples::U8(data), 2) => (data, ColorType::La8),
        (Samples::U8(data), 3) => (data, ColorType::Rgb8),
        (Samples::U8(data), 4) => (data, ColorType::Rgba8),
        (Samples::U16(data), 1) => (bytemuck::cast_slice(data), ColorType::L16),
        (Samples::U16(data), 2) => (bytemuck::cast_slice(data), ColorType::La16),
        (Samples::U16(data), 3) => (bytemuck::cast_slice(data), ColorType::Rgb16),
        (Samples::U16(data), 4) => (bytemuck::cast_slice(data), ColorType::Rgba16),
        (_, channels) => {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("PNG with {channels} channels"),
            });
        }
    };

    image::save_buffer_with_format(
        path,
        bytes,
        dims.width as u32,
        dims.height as u32,
        color,
        image::ImageFormat::Png,
    )
    .map_err(|err| Error::Encode {
        path: path.to_path_buf(),
        source: Box::new(err),
    })
}
