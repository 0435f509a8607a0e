//! End-to-end stitching pipeline.
//!
//! # Pipeline Stages
//!
//! 1. **Graph** - Enumerate grid-adjacent tile pairs
//! 2. **Registration** - Phase-correlate every pair's overlap strips
//! 3. **Angle** - Error-weighted camera rotation estimate
//! 4. **Solve** - Bounded least-squares tile offsets
//! 5. **Assemble** - Feathered compositing onto one canvas


use std::time::Instant;

use crate::angle::estimate_camera_angle;
use crate::compositor::{Mosaic, assemble};
use crate::config::Config;
use crate::error::Result;
use crate::graph::AdjacencyGraph;
use crate::registration::PairRegistrar;
use crate::solver::{SolveStatus, Solution, solve_positions};
use crate::tile::TileSet;

/// Summary figures of one stitching run.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub tile_count: usize,
    pub adjacent_pairs: usize,
    pub registered_pairs: usize,
    pub failed_pairs: usize,
    /// Mean registration error over registered pairs.
    pub mean_pair_error: f64,
    pub max_pair_error: f64,
    pub solver_residual: f64,
    pub solver_status: SolveStatus,
    pub solver_iterations: usize,
}

/// Output of [`Stitcher::stitch`].
#[derive(Debug, Clone)]
pub struct StitchResult {
    pub mosaic: Mosaic,
    /// Camera rotation in radians.
    pub angle: f64,
    pub solution: Solution,
    pub diagnostics: Diagnostics,
}

/// Stitches tile sets with one configuration.
#[derive(Debug, Clone)]
pub struct Stitcher {
    config: Config,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Stitcher {
    /// Create a new stitcher with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(config: Config) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register, solve and assemble `tiles`.
    ///
    /// Fails only when no pair could be registered; individual pair failures
    /// and solver non-convergence degrade the result instead.
    pub fn stitch(&self, tiles: &TileSet) -> Result<StitchResult> {
        let _span = tracing::info_span!("stitch", tiles = tiles.len()).entered();
        let start = Instant::now();

        let mut graph = AdjacencyGraph::from_tiles(tiles);
        tracing::info!(
            columns = tiles.columns(),
            rows = tiles.rows(),
            adjacent_pairs = graph.adjacent_count(),
            "Stitching tile grid"
        );

        {
            let _span = tracing::info_span!("register").entered();
            let stage = Instant::now();
            let registrar = PairRegistrar::new(
                tiles.dimensions(),
                tiles.overlap(),
                self.config.registration.clone(),
            );
            graph.register(
                tiles,
                &registrar,
                self.config.parallel,
                self.config.max_concurrent_pairs,
            );
            tracing::info!(
                registered = graph.registered_count(),
                failed = graph.failed_count(),
                elapsed_ms = stage.elapsed().as_millis() as u64,
                "Registered tile pairs"
            );
        }

        let geometry = tiles.geometry();
        let angle = estimate_camera_angle(graph.registered_pairs(), &geometry)?;
        tracing::info!(
            angle_rad = angle,
            angle_deg = angle.to_degrees(),
            "Estimated camera angle"
        );

        let solution = {
            let _span = tracing::info_span!("solve").entered();
            let solution = solve_positions(
                graph.registered_pairs(),
                &tiles.coords(),
                &tiles.layout(),
                angle,
                &self.config.solver,
            );
            tracing::info!(
                status = ?solution.status,
                residual = solution.residual,
                iterations = solution.iterations,
                "Solved tile positions"
            );
            solution
        };

        let mosaic = {
            let _span = tracing::info_span!("assemble").entered();
            assemble(tiles, &solution.positions, angle, self.config.full_depth)
        };

        let diagnostics = diagnostics(tiles, &graph, &solution);
        tracing::info!(
            width = mosaic.width,
            height = mosaic.height,
            mean_pair_error = diagnostics.mean_pair_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Mosaic assembled"
        );

        Ok(StitchResult {
            mosaic,
            angle,
            solution,
            diagnostics,
        })
    }
}

fn diagnostics(tiles: &TileSet, graph: &AdjacencyGraph, solution: &Solution) -> Diagnostics {
    let errors: Vec<f64> = graph
        .registered_pairs()
        .filter_map(|pair| pair.measurement().map(|m| m.error))
        .collect();
    let mean_pair_error = if errors.is_empty() {
        0.0
    } else {
        errors.iter().sum::<f64>() / errors.len() as f64
    };
    let max_pair_error = errors.iter().copied().fold(0.0, f64::max);

    Diagnostics {
        tile_count: tiles.len(),
        adjacent_pairs: graph.adjacent_count(),
        registered_pairs: errors.len(),
        failed_pairs: graph.failed_count(),
        mean_pair_error,
        max_pair_error,
        solver_residual: solution.residual,
        solver_status: solution.status,
        solver_iterations: solution.iterations,
    }
}
