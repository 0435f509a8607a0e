//! Global camera-to-stage rotation from the registered pairs.

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::TilePair;
use crate::tile::TileGeometry;

/// Errors below this floor are clamped before weighting.
pub(crate) const MIN_PAIR_ERROR: f64 = 1e-6;

/// Inverse-error weight of one measurement.
#[inline]
pub(crate) fn pair_weight(error: f64) -> f64 {
    1.0 / error.max(MIN_PAIR_ERROR)
}

/// Error-weighted mean of the per-pair angles, in radians.
///
/// Unregistered pairs are skipped. Fails with [`Error::DegenerateAngle`] when
/// no pair has a measurement.
pub fn estimate_camera_angle<'a>(
    pairs: impl IntoIterator<Item = &'a TilePair>,
    geometry: &TileGeometry,
) -> Result<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut count = 0usize;

    for pair in pairs {
        let Some(measurement) = pair.measurement() else {
            continue;
        };
        let weight = pair_weight(measurement.error);
        weighted_sum += measurement.angle(pair.diff, geometry) * weight;
        weight_total += weight;
        count += 1;
    }

    if count == 0 {
        return Err(Error::DegenerateAngle);
    }

    let angle = weighted_sum / weight_total;
    debug!(pairs = count, angle, "Estimated camera angle");
    Ok(angle)
}
