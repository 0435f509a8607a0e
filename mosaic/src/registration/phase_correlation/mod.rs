//! Phase correlation between two equally sized overlap strips.
//!
//! The translation is found by:
//! 1. removing the mean and applying a separable Hann window
//! 2. zero-padding each axis to a power of two and taking the 2D FFT
//! 3. normalizing the cross-power spectrum and inverting it
//! 4. locating the integer peak (with wrap-around) and refining it
//!
//! The match quality is scored from the unnormalized cross-correlation at the
//! peak relative to the strip energies.


use std::f64::consts::TAU;
use std::sync::Arc;

use common::buffer2::Buffer2;
use glam::DVec2;
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};

/// Centred energy at or below this fraction of the raw energy counts as featureless.
const FEATURELESS_RATIO: f64 = 1e-8;

/// Configuration for phase correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCorrelationConfig {
    /// Apply Hann window to reduce edge effects.
    pub use_windowing: bool,
    /// Sub-pixel interpolation method.
    pub subpixel_method: SubpixelMethod,
}

impl Default for PhaseCorrelationConfig {
    fn default() -> Self {
        Self {
            use_windowing: true,
            subpixel_method: SubpixelMethod::Parabolic,
        }
    }
}

/// Sub-pixel interpolation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubpixelMethod {
    /// No sub-pixel refinement.
    None,
    /// Parabolic fit through the peak and its 4-neighbours.
    #[default]
    Parabolic,
    /// Parabolic fit on log values.
    Gaussian,
    /// Weighted centroid of the 5x5 neighbourhood.
    Centroid,
}

/// Result of phase correlation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseCorrelationResult {
    /// Translation `d` such that `moving(p) ≈ reference(p + d)`.
    pub translation: DVec2,
    /// Height of the normalized correlation peak.
    pub peak_value: f64,
    /// `sqrt(|1 - |CC|² / (E_ref · E_moving)|)`, 0 for a perfect match.
    pub error: f64,
    /// Argument of the cross-correlation at the peak.
    pub phase: f64,
}

/// Phase correlator for one strip shape.
pub struct PhaseCorrelator {
    config: PhaseCorrelationConfig,
    width: usize,
    height: usize,
    fft_width: usize,
    fft_height: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
    window_x: Vec<f32>,
    window_y: Vec<f32>,
}

impl std::fmt::Debug for PhaseCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseCorrelator")
            .field("config", &self.config)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fft_width", &self.fft_width)
            .field("fft_height", &self.fft_height)
            .finish()
    }
}

impl PhaseCorrelator {
    /// Create a correlator for `width x height` strips.
    pub fn new(width: usize, height: usize, config: PhaseCorrelationConfig) -> Self {
        assert!(width > 0 && height > 0, "strip must not be empty");

        let fft_width = width.next_power_of_two();
        let fft_height = height.next_power_of_two();

        let mut planner = FftPlanner::new();
        let row_forward = planner.plan_fft_forward(fft_width);
        let row_inverse = planner.plan_fft_inverse(fft_width);
        let col_forward = planner.plan_fft_forward(fft_height);
        let col_inverse = planner.plan_fft_inverse(fft_height);

        let (window_x, window_y) = if config.use_windowing {
            (hann_window(width), hann_window(height))
        } else {
            (vec![1.0; width], vec![1.0; height])
        };

        Self {
            config,
            width,
            height,
            fft_width,
            fft_height,
            row_forward,
            row_inverse,
            col_forward,
            col_inverse,
            window_x,
            window_y,
        }
    }

    pub fn strip_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Estimate the translation between two strips.
    ///
    /// Returns `None` when either strip carries no structure after mean removal.
    pub fn correlate(
        &self,
        reference: &Buffer2<f32>,
        moving: &Buffer2<f32>,
    ) -> Option<PhaseCorrelationResult> {
        assert!(
            reference.width() == self.width
                && reference.height() == self.height
                && moving.width() == self.width
                && moving.height() == self.height,
            "strip size does not match correlator"
        );

        let ref_fft = self.fft_2d(self.prepare_image(reference)?);
        let mov_fft = self.fft_2d(self.prepare_image(moving)?);

        let product: Vec<Complex<f32>> = ref_fft
            .iter()
            .zip(&mov_fft)
            .map(|(&a, &b)| a * b.conj())
            .collect();

        let correlation = self.ifft_2d(cross_power_spectrum(&product));
        let (peak_x, peak_y, peak_value) = self.find_peak(&correlation);

        let dx = wrap(peak_x, self.fft_width);
        let dy = wrap(peak_y, self.fft_height);

        let translation = match self.config.subpixel_method {
            SubpixelMethod::None => DVec2::new(dx, dy),
            SubpixelMethod::Parabolic => {
                self.subpixel_parabolic(&correlation, peak_x, peak_y, dx, dy)
            }
            SubpixelMethod::Gaussian => {
                self.subpixel_gaussian(&correlation, peak_x, peak_y, dx, dy)
            }
            SubpixelMethod::Centroid => {
                self.subpixel_centroid(&correlation, peak_x, peak_y, dx, dy)
            }
        };

        let n = (self.fft_width * self.fft_height) as f64;
        let energy = |spectrum: &[Complex<f32>]| -> f64 {
            spectrum.iter().map(|c| c.norm_sqr() as f64).sum::<f64>() / n
        };
        let ref_energy = energy(&ref_fft);
        let mov_energy = energy(&mov_fft);
        let cc = self.cross_correlation_at(&product, peak_x, peak_y);

        let error = (1.0 - cc.norm_sqr() / (ref_energy * mov_energy))
            .abs()
            .sqrt();

        Some(PhaseCorrelationResult {
            translation,
            peak_value,
            error,
            phase: cc.im.atan2(cc.re),
        })
    }

    /// Mean-remove, window and zero-pad a strip into an FFT buffer.
    fn prepare_image(&self, image: &Buffer2<f32>) -> Option<Vec<Complex<f32>>> {
        let count = image.len() as f64;
        let raw_energy: f64 = image.iter().map(|&v| (v as f64) * (v as f64)).sum();
        let mean = image.iter().map(|&v| v as f64).sum::<f64>() / count;
        let centred_energy: f64 = image
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum();
        if raw_energy == 0.0 || centred_energy <= FEATURELESS_RATIO * raw_energy {
            return None;
        }

        let mean = mean as f32;
        let mut padded = vec![Complex::new(0.0f32, 0.0); self.fft_width * self.fft_height];
        let mut windowed_energy = 0.0f64;
        for y in 0..self.height {
            let src = image.row(y);
            let dst = &mut padded[y * self.fft_width..y * self.fft_width + self.width];
            for (x, (out, &v)) in dst.iter_mut().zip(src).enumerate() {
                let value = (v - mean) * self.window_x[x] * self.window_y[y];
                windowed_energy += (value as f64) * (value as f64);
                *out = Complex::new(value, 0.0);
            }
        }

        (windowed_energy > 0.0).then_some(padded)
    }

    /// 2D FFT by row transforms, a transpose, column transforms and a transpose back.
    fn fft_2d(&self, mut data: Vec<Complex<f32>>) -> Vec<Complex<f32>> {
        self.row_forward.process(&mut data);
        let mut columns = transpose(&data, self.fft_height, self.fft_width);
        self.col_forward.process(&mut columns);
        transpose(&columns, self.fft_width, self.fft_height)
    }

    /// Inverse 2D FFT, normalized, real part only.
    fn ifft_2d(&self, mut data: Vec<Complex<f32>>) -> Vec<f32> {
        self.row_inverse.process(&mut data);
        let mut columns = transpose(&data, self.fft_height, self.fft_width);
        self.col_inverse.process(&mut columns);
        let data = transpose(&columns, self.fft_width, self.fft_height);

        let norm = 1.0 / (self.fft_width * self.fft_height) as f32;
        data.iter().map(|c| c.re * norm).collect()
    }

    /// Unnormalized cross-correlation at integer lag `(px, py)`, evaluated
    /// directly from the product spectrum.
    fn cross_correlation_at(&self, product: &[Complex<f32>], px: usize, py: usize) -> Complex<f64> {
        let twiddles = |lag: usize, len: usize| -> Vec<Complex<f64>> {
            (0..len)
                .map(|k| Complex::from_polar(1.0, TAU * ((k * lag) % len) as f64 / len as f64))
                .collect()
        };
        let ex = twiddles(px, self.fft_width);
        let ey = twiddles(py, self.fft_height);

        let mut sum = Complex::new(0.0f64, 0.0);
        for (ky, row) in product.chunks_exact(self.fft_width).enumerate() {
            let row_sum: Complex<f64> = row
                .iter()
                .zip(&ex)
                .map(|(p, e)| Complex::new(p.re as f64, p.im as f64) * e)
                .sum();
            sum += row_sum * ey[ky];
        }
        sum / (self.fft_width * self.fft_height) as f64
    }

    /// Find peak location and value in correlation surface.
    fn find_peak(&self, correlation: &[f32]) -> (usize, usize, f64) {
        let mut max_val = f32::NEG_INFINITY;
        let mut max_idx = 0;
        for (idx, &val) in correlation.iter().enumerate() {
            if val > max_val {
                max_val = val;
                max_idx = idx;
            }
        }
        (
            max_idx % self.fft_width,
            max_idx / self.fft_width,
            max_val as f64,
        )
    }

    /// Correlation sample with wrap-around on both axes.
    #[inline]
    fn sample(&self, correlation: &[f32], x: isize, y: isize) -> f32 {
        let w = self.fft_width as isize;
        let h = self.fft_height as isize;
        let xx = x.rem_euclid(w) as usize;
        let yy = y.rem_euclid(h) as usize;
        correlation[yy * self.fft_width + xx]
    }

    /// Sub-pixel refinement using parabolic fit.
    fn subpixel_parabolic(
        &self,
        correlation: &[f32],
        peak_x: usize,
        peak_y: usize,
        dx: f64,
        dy: f64,
    ) -> DVec2 {
        let px = peak_x as isize;
        let py = peak_y as isize;

        let c = self.sample(correlation, px, py);
        let l = self.sample(correlation, px - 1, py);
        let r = self.sample(correlation, px + 1, py);
        let t = self.sample(correlation, px, py - 1);
        let b = self.sample(correlation, px, py + 1);

        DVec2::new(
            dx + parabola_offset(l as f64, c as f64, r as f64),
            dy + parabola_offset(t as f64, c as f64, b as f64),
        )
    }

    /// Sub-pixel refinement using Gaussian fit.
    fn subpixel_gaussian(
        &self,
        correlation: &[f32],
        peak_x: usize,
        peak_y: usize,
        dx: f64,
        dy: f64,
    ) -> DVec2 {
        let px = peak_x as isize;
        let py = peak_y as isize;
        let ln = |x: isize, y: isize| (self.sample(correlation, x, y).max(1e-10) as f64).ln();

        let c = ln(px, py);
        DVec2::new(
            dx + parabola_offset(ln(px - 1, py), c, ln(px + 1, py)),
            dy + parabola_offset(ln(px, py - 1), c, ln(px, py + 1)),
        )
    }

    /// Sub-pixel refinement using centroid.
    fn subpixel_centroid(
        &self,
        correlation: &[f32],
        peak_x: usize,
        peak_y: usize,
        dx: f64,
        dy: f64,
    ) -> DVec2 {
        let radius = 2isize;
        let px = peak_x as isize;
        let py = peak_y as isize;

        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;
        let mut sum_w = 0.0f64;

        for dy_off in -radius..=radius {
            for dx_off in -radius..=radius {
                let w = self
                    .sample(correlation, px + dx_off, py + dy_off)
                    .max(0.0) as f64;
                sum_x += dx_off as f64 * w;
                sum_y += dy_off as f64 * w;
                sum_w += w;
            }
        }

        if sum_w > 1e-10 {
            DVec2::new(dx + sum_x / sum_w, dy + sum_y / sum_w)
        } else {
            DVec2::new(dx, dy)
        }
    }
}

/// Normalize each frequency of the product spectrum to unit magnitude.
fn cross_power_spectrum(product: &[Complex<f32>]) -> Vec<Complex<f32>> {
    product
        .iter()
        .map(|&p| {
            let magnitude = p.norm();
            if magnitude > 1e-10 {
                p / magnitude
            } else {
                Complex::new(0.0, 0.0)
            }
        })
        .collect()
}

/// Vertex offset of the parabola through `(-1, l)`, `(0, c)`, `(1, r)`.
#[inline]
fn parabola_offset(l: f64, c: f64, r: f64) -> f64 {
    let denom = 2.0 * (l + r - 2.0 * c);
    if denom.abs() > 1e-10 {
        ((l - r) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    }
}

/// Map a peak index to a signed lag.
#[inline]
fn wrap(peak: usize, len: usize) -> f64 {
    if peak > len / 2 {
        peak as f64 - len as f64
    } else {
        peak as f64
    }
}

/// Out-of-place transpose of a `rows x cols` row-major matrix.
fn transpose(data: &[Complex<f32>], rows: usize, cols: usize) -> Vec<Complex<f32>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = data[r * cols + c];
        }
    }
    out
}

/// Compute 1D Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}
