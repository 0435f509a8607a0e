//! Pairwise registration of grid-adjacent tiles.
//!
//! The overlap strips of both tiles are cut from their luminance, cleaned with
//! a disk median and a Sobel edge filter, and handed to a [`PhaseCorrelator`].

pub mod filters;
pub mod phase_correlation;

#[cfg(test)]
mod tests;

use common::buffer2::Buffer2;
use glam::{DVec2, IVec2};

use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::tile::{ImageDimensions, TileGeometry, TileImage, is_unit_step};
use phase_correlation::{PhaseCorrelationConfig, PhaseCorrelator};

/// Outcome of registering one tile pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMeasurement {
    /// Translation of tile b relative to tile a beyond the nominal grid step,
    /// in image axes. Equals `offset(b) - offset(a)` for an exact match.
    pub shift: DVec2,
    /// Match error in `[0, 1]`, lower is more confident.
    pub error: f64,
    pub phase: f64,
}

impl PairMeasurement {
    /// Measurement for strips without structure: no shift, no confidence.
    pub fn featureless() -> Self {
        Self {
            shift: DVec2::ZERO,
            error: 1.0,
            phase: 0.0,
        }
    }

    /// Camera rotation implied by this measurement.
    ///
    /// The shift component perpendicular to the adjacency axis is divided by
    /// the nominal step along that axis.
    pub fn angle(&self, diff: IVec2, geometry: &TileGeometry) -> f64 {
        let step = geometry.step();
        if diff.x != 0 {
            -(self.shift.y * diff.x as f64 / step.x).clamp(-1.0, 1.0).asin()
        } else {
            (self.shift.x * diff.y as f64 / step.y).clamp(-1.0, 1.0).asin()
        }
    }
}

/// Registers tile pairs of one tile set. Built once and shared across threads.
#[derive(Debug)]
pub struct PairRegistrar {
    geometry: TileGeometry,
    config: RegistrationConfig,
    /// Correlator for strips shared by horizontal neighbours.
    horizontal: Option<PhaseCorrelator>,
    /// Correlator for strips shared by vertical neighbours.
    vertical: Option<PhaseCorrelator>,
}

impl PairRegistrar {
    pub fn new(dimensions: ImageDimensions, overlap: f64, config: RegistrationConfig) -> Self {
        let geometry = TileGeometry::new(dimensions.width, dimensions.height, overlap);
        let correlation = PhaseCorrelationConfig {
            use_windowing: config.use_windowing,
            subpixel_method: config.subpixel_method,
        };

        let overlap_width = geometry.overlap_width();
        let overlap_height = geometry.overlap_height();
        let horizontal = (overlap_width > 0)
            .then(|| PhaseCorrelator::new(overlap_width, geometry.height, correlation));
        let vertical = (overlap_height > 0)
            .then(|| PhaseCorrelator::new(geometry.width, overlap_height, correlation));

        Self {
            geometry,
            config,
            horizontal,
            vertical,
        }
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    /// Measure how tile `b`, one grid step `diff` away from tile `a`, is
    /// displaced from its nominal position relative to `a`.
    pub fn register(&self, a: &TileImage, b: &TileImage, diff: IVec2) -> Result<PairMeasurement> {
        if !is_unit_step(diff) {
            return Err(Error::NonAdjacentPair { diff });
        }

        let (correlator, strip_a, strip_b) = if diff.x != 0 {
            let width = self.geometry.overlap_width();
            let height = self.geometry.height;
            let correlator = self
                .horizontal
                .as_ref()
                .ok_or(Error::EmptyOverlap { width, height })?;
            let far = self.geometry.width - width;
            let (xa, xb) = if diff.x > 0 { (far, 0) } else { (0, far) };
            (
                correlator,
                a.luminance_region(xa, 0, width, height),
                b.luminance_region(xb, 0, width, height),
            )
        } else {
            let width = self.geometry.width;
            let height = self.geometry.overlap_height();
            let correlator = self
                .vertical
                .as_ref()
                .ok_or(Error::EmptyOverlap { width, height })?;
            let far = self.geometry.height - height;
            let (ya, yb) = if diff.y > 0 { (far, 0) } else { (0, far) };
            (
                correlator,
                a.luminance_region(0, ya, width, height),
                b.luminance_region(0, yb, width, height),
            )
        };

        let strip_a = self.filter(strip_a);
        let strip_b = self.filter(strip_b);

        let measurement = match correlator.correlate(&strip_a, &strip_b) {
            Some(result) => PairMeasurement {
                shift: result.translation,
                error: result.error,
                phase: result.phase,
            },
            None => {
                tracing::debug!(?diff, "Featureless overlap strip, no-confidence measurement");
                PairMeasurement::featureless()
            }
        };
        Ok(measurement)
    }

    fn filter(&self, strip: Buffer2<f32>) -> Buffer2<f32> {
        let strip = if self.config.median_radius > 0 {
            filters::median_filter_disk(&strip, self.config.median_radius)
        } else {
            strip
        };
        if self.config.edge_filter {
            filters::sobel_magnitude(&strip)
        } else {
            strip
        }
    }
}
