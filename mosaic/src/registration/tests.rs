use glam::IVec2;

use super::*;
use crate::testing::{blob_scene, cut_tile};
use crate::tile::TileImage;

const SIZE: usize = 128;
const OVERLAP: f64 = 0.25;
const STEP: usize = 96;
const MARGIN: usize = 20;

/// Tile at the scene origin plus a neighbour one step away along `diff`,
/// displaced by `(dx, dy)` beyond the nominal step.
fn neighbours(diff: IVec2, dx: i32, dy: i32, channels: usize, seed: u64) -> (TileImage, TileImage) {
    let scene = blob_scene(SIZE + STEP + 2 * MARGIN, SIZE + STEP + 2 * MARGIN, seed);
    let a = cut_tile(&scene, MARGIN, MARGIN, SIZE, SIZE, channels);
    let bx = (MARGIN as i32 + diff.x * STEP as i32 + dx) as usize;
    let by = (MARGIN as i32 + diff.y * STEP as i32 + dy) as usize;
    let b = cut_tile(&scene, bx, by, SIZE, SIZE, channels);
    (a, b)
}

fn registrar() -> PairRegistrar {
    PairRegistrar::new(
        ImageDimensions::new(SIZE, SIZE, 1),
        OVERLAP,
        RegistrationConfig::default(),
    )
}

fn assert_shift(measurement: &PairMeasurement, dx: f64, dy: f64) {
    assert!(
        (measurement.shift.x - dx).abs() <= 1.0 && (measurement.shift.y - dy).abs() <= 1.0,
        "expected ({dx}, {dy}), got {:?}",
        measurement.shift
    );
}

#[test]
fn test_recovers_horizontal_neighbour_shift() {
    let (a, b) = neighbours(IVec2::X, 3, -2, 1, 42);
    let measurement = registrar().register(&a, &b, IVec2::X).unwrap();
    assert_shift(&measurement, 3.0, -2.0);
    assert!(measurement.error < 0.9, "error = {}", measurement.error);
}

#[test]
fn test_recovers_vertical_neighbour_shift() {
    let (a, b) = neighbours(IVec2::Y, -4, 5, 1, 43);
    let measurement = registrar().register(&a, &b, IVec2::Y).unwrap();
    assert_shift(&measurement, -4.0, 5.0);
}

#[test]
fn test_reversed_pair_negates_shift() {
    let (left, right) = neighbours(IVec2::X, 2, 3, 1, 44);
    let measurement = registrar().register(&right, &left, IVec2::NEG_X).unwrap();
    assert_shift(&measurement, -2.0, -3.0);
}

#[test]
fn test_rgb_tiles_register_on_luminance() {
    let (a, b) = neighbours(IVec2::Y, 1, -3, 3, 45);
    let registrar = PairRegistrar::new(
        ImageDimensions::new(SIZE, SIZE, 3),
        OVERLAP,
        RegistrationConfig::default(),
    );
    let measurement = registrar.register(&a, &b, IVec2::Y).unwrap();
    assert_shift(&measurement, 1.0, -3.0);
}

#[test]
fn test_unfiltered_registration() {
    let (a, b) = neighbours(IVec2::X, -2, 4, 1, 46);
    let config = RegistrationConfig {
        median_radius: 0,
        edge_filter: false,
        ..Default::default()
    };
    let registrar = PairRegistrar::new(ImageDimensions::new(SIZE, SIZE, 1), OVERLAP, config);
    let measurement = registrar.register(&a, &b, IVec2::X).unwrap();
    assert_shift(&measurement, -2.0, 4.0);
}

#[test]
fn test_non_adjacent_pairs_rejected() {
    let image = TileImage::filled(SIZE, SIZE, &[500]);
    for diff in [
        IVec2::new(2, 0),
        IVec2::new(1, 1),
        IVec2::ZERO,
        IVec2::new(0, -3),
    ] {
        let result = registrar().register(&image, &image, diff);
        assert!(
            matches!(result, Err(Error::NonAdjacentPair { diff: d }) if d == diff),
            "diff {diff} should be rejected"
        );
    }
}

#[test]
fn test_featureless_tiles_give_no_confidence() {
    let a = TileImage::filled(SIZE, SIZE, &[1000, 2000, 3000]);
    let b = TileImage::filled(SIZE, SIZE, &[1100, 2100, 3100]);
    let registrar = PairRegistrar::new(
        ImageDimensions::new(SIZE, SIZE, 3),
        OVERLAP,
        RegistrationConfig::default(),
    );
    let measurement = registrar.register(&a, &b, IVec2::X).unwrap();
    assert_eq!(measurement, PairMeasurement::featureless());
}

#[test]
fn test_empty_overlap_strip() {
    let image = TileImage::filled(3, 3, &[7]);
    let registrar = PairRegistrar::new(
        ImageDimensions::new(3, 3, 1),
        OVERLAP,
        RegistrationConfig::default(),
    );
    assert!(matches!(
        registrar.register(&image, &image, IVec2::X),
        Err(Error::EmptyOverlap { width: 0, height: 3 })
    ));
    assert!(matches!(
        registrar.register(&image, &image, IVec2::NEG_Y),
        Err(Error::EmptyOverlap { width: 3, height: 0 })
    ));
}

#[test]
fn test_measurement_angle() {
    let geometry = TileGeometry::new(100, 200, 0.25);
    let sideways = PairMeasurement {
        shift: DVec2::new(0.0, 7.5),
        error: 0.1,
        phase: 0.0,
    };
    // 7.5 / 75 for a horizontal neighbour.
    let expected = -(0.1f64).asin();
    assert!((sideways.angle(IVec2::X, &geometry) - expected).abs() < 1e-12);
    assert!((sideways.angle(IVec2::NEG_X, &geometry) + expected).abs() < 1e-12);

    let downward = PairMeasurement {
        shift: DVec2::new(-15.0, 4.0),
        error: 0.1,
        phase: 0.0,
    };
    // -15 / 150 for a vertical neighbour.
    assert!((downward.angle(IVec2::Y, &geometry) - (-0.1f64).asin()).abs() < 1e-12);

    let huge = PairMeasurement {
        shift: DVec2::new(0.0, 1e6),
        error: 0.1,
        phase: 0.0,
    };
    assert!((huge.angle(IVec2::X, &geometry) + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
}
