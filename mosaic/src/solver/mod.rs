//! Global tile placement from the pairwise measurements.
//!
//! Every tile gets an `(x, y)` offset from its nominal grid position. Tile 0
//! is the reference and stays at `(0, 0)`; all others are bounded to
//! `±max_shift`. The offsets minimise
//!
//! ```text
//! L = sqrt[(Σ w_i (Δx_i - x_i)² + Σ w_i (Δy_i - y_i)²) / (2 Σ w_i)]
//! ```
//!
//! where `Δ = offset(b) - offset(a)`, `w_i = 1 / max(error_i, 1e-6)` and
//! `(x_i, y_i)` is the pair shift with the camera rotation removed. The two
//! axes decouple, and each is solved directly from its normal equations.


use glam::{DVec2, IVec2};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::angle::pair_weight;
use crate::config::SolverConfig;
use crate::graph::TilePair;
use crate::tile::{GridCoord, GridLayout};

/// Final placement of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolvedPosition {
    pub coord: GridCoord,
    /// Position on the nominal grid.
    pub nominal: IVec2,
    /// Correction applied on top of `nominal`.
    pub offset: IVec2,
}

impl SolvedPosition {
    pub fn position(&self) -> IVec2 {
        self.nominal + self.offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    /// Round limit hit or singular system; offsets fell back to the nominal grid.
    NotConverged,
    /// No measured pairs, so there was nothing to solve.
    NoConstraints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// One entry per tile, in tile order.
    pub positions: Vec<SolvedPosition>,
    pub status: SolveStatus,
    /// Loss of the returned integer offsets.
    pub residual: f64,
    /// Linear solves needed by the slower axis.
    pub iterations: usize,
}

/// One weighted difference constraint `offset(b) - offset(a) ≈ target`.
#[derive(Debug, Clone, Copy)]
struct Constraint {
    a: usize,
    b: usize,
    target: DVec2,
    weight: f64,
}

/// Solve for per-tile offsets. `coords[0]` is the reference tile.
pub fn solve_positions<'a>(
    pairs: impl IntoIterator<Item = &'a TilePair>,
    coords: &[GridCoord],
    layout: &GridLayout,
    angle: f64,
    config: &SolverConfig,
) -> Solution {
    config.validate();

    let constraints = build_constraints(pairs, layout, angle);
    let tile_count = coords.len();
    let bound = config.max_shift;

    let (mut offsets, status, iterations) = if constraints.is_empty() || tile_count < 2 {
        (vec![DVec2::ZERO; tile_count], SolveStatus::NoConstraints, 0)
    } else {
        let anchors = anchor_tiles(&constraints, tile_count);
        let (xs, x_iterations) = solve_axis(&constraints, &anchors, bound, config, |t| t.x);
        let (ys, y_iterations) = solve_axis(&constraints, &anchors, bound, config, |t| t.y);
        let iterations = x_iterations.max(y_iterations);
        match (xs, ys) {
            (Some(xs), Some(ys)) => {
                let offsets = xs.into_iter().zip(ys).map(|(x, y)| DVec2::new(x, y)).collect();
                (offsets, SolveStatus::Converged, iterations)
            }
            _ => {
                warn!(
                    iterations,
                    "Position solver failed, falling back to the nominal grid"
                );
                (vec![DVec2::ZERO; tile_count], SolveStatus::NotConverged, iterations)
            }
        }
    };

    let limit = bound.floor();
    for offset in offsets.iter_mut() {
        *offset = offset.round().clamp(DVec2::splat(-limit), DVec2::splat(limit));
    }
    if let Some(reference) = offsets.first_mut() {
        *reference = DVec2::ZERO;
    }

    let residual = loss(&constraints, &offsets);
    debug!(?status, iterations, residual, "Solved tile positions");

    let positions = coords
        .iter()
        .zip(&offsets)
        .map(|(&coord, offset)| SolvedPosition {
            coord,
            nominal: layout.nominal(coord),
            offset: offset.as_ivec2(),
        })
        .collect();

    Solution {
        positions,
        status,
        residual,
        iterations,
    }
}

/// Rotation-corrected targets of all measured pairs.
fn build_constraints<'a>(
    pairs: impl IntoIterator<Item = &'a TilePair>,
    layout: &GridLayout,
    angle: f64,
) -> Vec<Constraint> {
    let step = layout.geometry.step();
    let sin = angle.sin();
    pairs
        .into_iter()
        .filter_map(|pair| {
            let measurement = pair.measurement()?;
            let diff = pair.diff.as_dvec2();
            let target = DVec2::new(
                measurement.shift.x - sin * step.y * diff.y,
                measurement.shift.y + sin * step.x * diff.x,
            );
            Some(Constraint {
                a: pair.a,
                b: pair.b,
                target,
                weight: pair_weight(measurement.error),
            })
        })
        .collect()
}

/// Marks the lowest-index tile of every connected component as an anchor.
///
/// Tile 0 anchors its own component; tiles without any measured pair anchor
/// themselves and stay on the nominal grid.
fn anchor_tiles(constraints: &[Constraint], tile_count: usize) -> Vec<bool> {
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); tile_count];
    for c in constraints {
        neighbours[c.a].push(c.b);
        neighbours[c.b].push(c.a);
    }

    let mut anchors = vec![false; tile_count];
    let mut visited = vec![false; tile_count];
    let mut stack = Vec::new();
    for start in 0..tile_count {
        if visited[start] {
            continue;
        }
        anchors[start] = true;
        visited[start] = true;
        stack.push(start);
        while let Some(tile) = stack.pop() {
            for &next in &neighbours[tile] {
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }
    }
    anchors
}

/// Bounded weighted least squares on one axis.
///
/// Each round solves the normal equations of the free tiles (the weighted
/// graph Laplacian with the pinned tiles moved to the right-hand side) by
/// Cholesky. Tiles that land outside `±bound` are pinned to the bound and the
/// rest is solved again. Returns `None` offsets when `max_iterations` rounds
/// are not enough or the system is singular.
fn solve_axis(
    constraints: &[Constraint],
    anchors: &[bool],
    bound: f64,
    config: &SolverConfig,
    component: impl Fn(DVec2) -> f64,
) -> (Option<Vec<f64>>, usize) {
    let tile_count = anchors.len();
    let mut pinned: Vec<Option<f64>> = anchors.iter().map(|&a| a.then_some(0.0)).collect();

    for round in 1..=config.max_iterations {
        let free: Vec<usize> = (0..tile_count).filter(|&t| pinned[t].is_none()).collect();
        if free.is_empty() {
            return (Some(pinned.iter().map(|v| v.unwrap_or(0.0)).collect()), round);
        }

        let mut slot = vec![usize::MAX; tile_count];
        for (k, &tile) in free.iter().enumerate() {
            slot[tile] = k;
        }

        let n = free.len();
        let mut lhs = DMatrix::<f64>::zeros(n, n);
        let mut rhs = DVector::<f64>::zeros(n);
        for c in constraints {
            let t = component(c.target);
            let w = c.weight;
            // Residual of one pair: x_b - x_a - t.
            match (pinned[c.a], pinned[c.b]) {
                (None, None) => {
                    let (i, j) = (slot[c.a], slot[c.b]);
                    lhs[(i, i)] += w;
                    lhs[(j, j)] += w;
                    lhs[(i, j)] -= w;
                    lhs[(j, i)] -= w;
                    rhs[i] -= w * t;
                    rhs[j] += w * t;
                }
                (Some(xa), None) => {
                    let j = slot[c.b];
                    lhs[(j, j)] += w;
                    rhs[j] += w * (xa + t);
                }
                (None, Some(xb)) => {
                    let i = slot[c.a];
                    lhs[(i, i)] += w;
                    rhs[i] += w * (xb - t);
                }
                (Some(_), Some(_)) => {}
            }
        }

        let solved = match lhs.clone().cholesky() {
            Some(chol) => Some(chol.solve(&rhs)),
            None => lhs.lu().solve(&rhs),
        };
        let Some(solved) = solved else {
            warn!(round, "Position system is singular");
            return (None, round);
        };

        let mut violated = false;
        for (k, &tile) in free.iter().enumerate() {
            let value = solved[k];
            if value.abs() > bound + config.tolerance {
                pinned[tile] = Some(value.clamp(-bound, bound));
                violated = true;
            }
        }

        if !violated {
            let offsets = (0..tile_count)
                .map(|tile| pinned[tile].unwrap_or_else(|| solved[slot[tile]]))
                .collect();
            return (Some(offsets), round);
        }
        debug!(round, "Pinned out-of-bounds tiles, solving again");
    }
    (None, config.max_iterations)
}

fn loss(constraints: &[Constraint], offsets: &[DVec2]) -> f64 {
    let (sum, weight) = constraints.iter().fold((0.0, 0.0), |(sum, weight), c| {
        let residual = offsets[c.b] - offsets[c.a] - c.target;
        (sum + c.weight * residual.length_squared(), weight + c.weight)
    });
    if weight > 0.0 {
        (sum / (2.0 * weight)).sqrt()
    } else {
        0.0
    }
}
