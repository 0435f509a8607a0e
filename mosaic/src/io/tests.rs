use std::fs;
use std::path::PathBuf;

use common::test_utils::test_output_path;

use super::*;
use crate::compositor::assemble;
use crate::solver::SolvedPosition;
use crate::testing::{blob_scene, cut_tile};

/// Fresh, empty directory under the test output root.
fn clean_dir(name: &str) -> PathBuf {
    let dir = test_output_path(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_parse_tile_file_name() {
    let (prefix, coord) = parse_tile_file_name("scan-3_12-ch0.tif").unwrap();
    assert_eq!(prefix, "scan");
    assert_eq!(coord, GridCoord::new(3, 12));

    let (prefix, coord) = parse_tile_file_name("run-01_002-z.tiff").unwrap();
    assert_eq!(prefix, "run");
    assert_eq!(coord, GridCoord::new(1, 2));
}

#[test]
fn test_parse_uses_last_coordinate_group() {
    let (prefix, coord) = parse_tile_file_name("plate-1_2-x-4_5-.png").unwrap();
    assert_eq!(prefix, "plate-1_2-x");
    assert_eq!(coord, GridCoord::new(4, 5));
}

#[test]
fn test_parse_rejects_names_without_coordinate() {
    for name in ["nocoord.tif", "scan-1_2.tif", "scan-a_2-x.tif", "scan-1-2-x.png", "scan-_2-x.tif"] {
        let err = parse_tile_file_name(name).unwrap_err();
        assert!(matches!(err, Error::TileFileName { .. }), "{name}: {err}");
    }
}

#[test]
fn test_stitched_file_name() {
    assert_eq!(stitched_file_name("scan"), "scan-stitched.tif");
}

#[test]
fn test_tiff_rgb16_round_trip() {
    let dir = clean_dir("io_tiff_rgb16");
    let scene = blob_scene(40, 30, 11);
    let tile = cut_tile(&scene, 0, 0, 40, 30, 3);
    let path = dir.join("t-0_0-a.tif");

    save_tile_image(&tile, &path).unwrap();
    let loaded = load_tile_image(&path).unwrap();

    assert_eq!(loaded, tile);
}

#[test]
fn test_png_gray_round_trip() {
    let dir = clean_dir("io_png_gray");
    let scene = blob_scene(24, 16, 12);
    let tile = cut_tile(&scene, 0, 0, 24, 16, 1);
    let path = dir.join("t-0_0-a.png");

    save_tile_image(&tile, &path).unwrap();
    let loaded = load_tile_image(&path).unwrap();

    assert_eq!(loaded, tile);
}

#[test]
fn test_tiff_8bit_rgba_widened_and_alpha_dropped() {
    let dir = clean_dir("io_tiff_rgba8");
    let path = dir.join("t-0_0-a.tif");
    let rgba: Vec<u8> = [10u8, 20, 30, 255, 40, 50, 60, 0].to_vec();
    {
        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
        encoder
            .write_image::<colortype::RGBA8>(2, 1, &rgba)
            .unwrap();
    }

    let loaded = load_tile_image(&path).unwrap();

    assert_eq!(loaded.channels(), 3);
    assert_eq!(loaded.pixel(0, 0), &[10 * 257, 20 * 257, 30 * 257]);
    assert_eq!(loaded.pixel(1, 0), &[40 * 257, 50 * 257, 60 * 257]);
}

#[test]
fn test_save_mosaic_display_depth_tiff() {
    let dir = clean_dir("io_mosaic_u8");
    let tile = TileImage::filled(4, 3, &[1000, 2000, 65535]);
    let tiles = TileSet::new(vec![Tile::new(GridCoord::new(0, 0), tile)], 0.25).unwrap();
    let positions = [SolvedPosition {
        coord: GridCoord::new(0, 0),
        nominal: glam::IVec2::ZERO,
        offset: glam::IVec2::ZERO,
    }];
    let mosaic = assemble(&tiles, &positions, 0.0, false);
    let path = dir.join("m-stitched.tif");

    save_mosaic(&mosaic, &path).unwrap();
    let loaded = load_tile_image(&path).unwrap();

    assert_eq!(loaded.width(), 4);
    assert_eq!(loaded.height(), 3);
    // 8-bit samples come back widened by 257.
    assert_eq!(loaded.pixel(2, 1), &[3 * 257, 7 * 257, 255 * 257]);
}

#[test]
fn test_unsupported_extensions() {
    let dir = clean_dir("io_unsupported");
    let tile = TileImage::filled(2, 2, &[0]);

    let err = save_tile_image(&tile, dir.join("x.bmp")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { .. }), "{err}");

    let err = load_tile_image(dir.join("x.gif")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { .. }), "{err}");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = clean_dir("io_missing");
    let err = load_tile_image(dir.join("absent.tif")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err}");
}

#[test]
fn test_load_tile_directory() {
    let dir = clean_dir("io_directory");
    let scene = blob_scene(200, 160, 13);
    for y in 0..2 {
        for x in 0..2 {
            let tile = cut_tile(&scene, x * 60, y * 60, 80, 80, 1);
            save_tile_image(&tile, dir.join(format!("slide-{x}_{y}-raw.tif"))).unwrap();
        }
    }
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let loaded = load_tile_directory(&dir, 0.25).unwrap();

    assert_eq!(loaded.prefix, "slide");
    assert_eq!(loaded.tiles.len(), 4);
    assert_eq!(loaded.paths.len(), 4);
    assert_eq!(loaded.tiles.columns(), 2);
    assert_eq!(loaded.tiles.rows(), 2);
    // Sorted by file name: slide-0_0, slide-0_1, slide-1_0, slide-1_1.
    assert_eq!(
        loaded.tiles.coords(),
        vec![
            GridCoord::new(0, 0),
            GridCoord::new(0, 1),
            GridCoord::new(1, 0),
            GridCoord::new(1, 1),
        ]
    );
    assert_eq!(
        loaded.tiles.tiles()[2].image,
        cut_tile(&scene, 60, 0, 80, 80, 1)
    );
}

#[test]
fn test_load_empty_directory() {
    let dir = clean_dir("io_empty");
    fs::write(dir.join("readme.md"), "no tiles").unwrap();

    let err = load_tile_directory(&dir, 0.25).unwrap_err();
    assert!(matches!(err, Error::EmptyDirectory { .. }), "{err}");
}

#[test]
fn test_load_directory_with_bad_name() {
    let dir = clean_dir("io_bad_name");
    let tile = TileImage::filled(8, 8, &[100]);
    save_tile_image(&tile, dir.join("slide-0_0-a.tif")).unwrap();
    save_tile_image(&tile, dir.join("slide.tif")).unwrap();

    let err = load_tile_directory(&dir, 0.25).unwrap_err();
    assert!(matches!(err, Error::TileFileName { .. }), "{err}");
}

#[test]
fn test_load_directory_with_mixed_sizes() {
    let dir = clean_dir("io_mixed_sizes");
    save_tile_image(&TileImage::filled(8, 8, &[1]), dir.join("s-0_0-a.tif")).unwrap();
    save_tile_image(&TileImage::filled(8, 6, &[1]), dir.join("s-1_0-a.tif")).unwrap();

    let err = load_tile_directory(&dir, 0.25).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { index: 1, .. }), "{err}");
}
