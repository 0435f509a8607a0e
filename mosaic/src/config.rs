//! Stitching configuration.
//!
//! All sections use `#[serde(default)]`, so a YAML or JSON file only needs the
//! fields it wants to change.

use serde::{Deserialize, Serialize};

use crate::registration::phase_correlation::SubpixelMethod;

/// Overlap fraction assumed between neighbouring tiles when none is given.
pub const DEFAULT_OVERLAP: f64 = 0.25;

/// Pair registration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Radius of the disk median filter in pixels. 0 disables it.
    pub median_radius: usize,
    /// Replace strips by their Sobel gradient magnitude before correlating.
    pub edge_filter: bool,
    /// Apply a separable Hann window before the FFT.
    pub use_windowing: bool,
    pub subpixel_method: SubpixelMethod,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            median_radius: 3,
            edge_filter: true,
            use_windowing: true,
            subpixel_method: SubpixelMethod::Parabolic,
        }
    }
}

/// Global position solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Largest offset from the nominal grid position, in pixels, per axis.
    pub max_shift: f64,
    /// Most bound-pinning rounds per axis, each one linear solve.
    pub max_iterations: usize,
    /// Slack in pixels past `max_shift` before a tile is pinned to the bound.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_shift: 350.0,
            max_iterations: 10_000,
            tolerance: 1e-3,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) {
        assert!(
            self.max_shift.is_finite() && self.max_shift >= 0.0,
            "max_shift must be finite and non-negative"
        );
        assert!(self.max_iterations > 0, "max_iterations must be > 0");
        assert!(
            self.tolerance.is_finite() && self.tolerance > 0.0,
            "tolerance must be positive"
        );
    }
}

/// Complete stitching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registration: RegistrationConfig,
    pub solver: SolverConfig,
    /// Keep 16-bit samples in the mosaic. When false, samples are reduced to 8 bits.
    pub full_depth: bool,
    /// Register tile pairs on the rayon pool.
    pub parallel: bool,
    /// Upper bound on pairs registered at the same time.
    pub max_concurrent_pairs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registration: RegistrationConfig::default(),
            solver: SolverConfig::default(),
            full_depth: true,
            parallel: true,
            max_concurrent_pairs: 64,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Panics
    ///
    /// Panics with a descriptive message if any parameter is invalid.
    pub fn validate(&self) {
        self.solver.validate();
        assert!(
            self.max_concurrent_pairs > 0,
            "max_concurrent_pairs must be > 0"
        );
    }
}
