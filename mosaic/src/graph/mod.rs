//! Pair slots for every unordered tile pair and their registration.


use common::parallel::map_maybe_parallel;
use glam::IVec2;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::registration::{PairMeasurement, PairRegistrar};
use crate::tile::{GridCoord, TileGeometry, TileSet, is_unit_step};

/// Two grid-adjacent tiles `a < b` and, once registered, their measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePair {
    pub a: usize,
    pub b: usize,
    /// `coord(b) - coord(a)`, always a unit step.
    pub diff: IVec2,
    measurement: Option<PairMeasurement>,
}

impl TilePair {
    /// Fails with [`Error::NonAdjacentPair`] unless the coordinates are one step apart.
    pub fn new(a: usize, b: usize, coord_a: GridCoord, coord_b: GridCoord) -> Result<Self> {
        let diff = coord_a.diff(coord_b);
        if !is_unit_step(diff) {
            return Err(Error::NonAdjacentPair { diff });
        }
        Ok(Self {
            a,
            b,
            diff,
            measurement: None,
        })
    }

    pub fn measurement(&self) -> Option<&PairMeasurement> {
        self.measurement.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.measurement.is_some()
    }

    /// Camera rotation implied by this pair, `None` until registered.
    pub fn angle(&self, geometry: &TileGeometry) -> Option<f64> {
        match &self.measurement {
            Some(measurement) => Some(measurement.angle(self.diff, geometry)),
            None => {
                warn!(a = self.a, b = self.b, "Tried to get angle of an unregistered pair");
                None
            }
        }
    }

    pub(crate) fn set_measurement(&mut self, measurement: PairMeasurement) {
        debug_assert!(self.measurement.is_none(), "pair registered twice");
        self.measurement = Some(measurement);
    }
}

/// All unordered tile pairs `(i, j)`, `i < j`, in row-major pair order.
///
/// Pairs whose tiles are not grid-adjacent occupy an empty slot.
#[derive(Debug, Clone)]
pub struct AdjacencyGraph {
    tile_count: usize,
    slots: Vec<Option<TilePair>>,
    failed: usize,
}

impl AdjacencyGraph {
    pub fn new(coords: &[GridCoord]) -> Self {
        let n = coords.len();
        let mut slots = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in i + 1..n {
                slots.push(TilePair::new(i, j, coords[i], coords[j]).ok());
            }
        }

        let graph = Self {
            tile_count: n,
            slots,
            failed: 0,
        };
        debug!(
            tiles = n,
            slots = graph.slots.len(),
            adjacent = graph.adjacent_count(),
            "Built adjacency graph"
        );
        graph
    }

    pub fn from_tiles(tiles: &TileSet) -> Self {
        Self::new(&tiles.coords())
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot index of the unordered pair `{i, j}`.
    pub fn slot_index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        assert!(
            j < self.tile_count && i != j,
            "pair indices must be distinct tile indices"
        );
        i * self.tile_count - i * (i + 1) / 2 + (j - i - 1)
    }

    /// The pair `{i, j}` if the tiles are grid-adjacent.
    pub fn pair(&self, i: usize, j: usize) -> Option<&TilePair> {
        self.slots[self.slot_index(i, j)].as_ref()
    }

    pub fn adjacent_pairs(&self) -> impl Iterator<Item = &TilePair> {
        self.slots.iter().flatten()
    }

    pub fn registered_pairs(&self) -> impl Iterator<Item = &TilePair> {
        self.adjacent_pairs().filter(|pair| pair.is_registered())
    }

    pub fn adjacent_count(&self) -> usize {
        self.adjacent_pairs().count()
    }

    pub fn registered_count(&self) -> usize {
        self.registered_pairs().count()
    }

    /// Pairs whose registration returned an error.
    pub fn failed_count(&self) -> usize {
        self.failed
    }

    /// Register every adjacent, not yet registered pair.
    ///
    /// Each pair is independent; results are written back to the slot they
    /// came from. Failing pairs are logged and stay unregistered.
    pub fn register(
        &mut self,
        tiles: &TileSet,
        registrar: &PairRegistrar,
        parallel: bool,
        max_concurrent: usize,
    ) {
        let pending: Vec<(usize, usize, usize, IVec2)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Some(pair) if !pair.is_registered() => Some((index, pair.a, pair.b, pair.diff)),
                _ => None,
            })
            .collect();

        let images = tiles.tiles();
        let results = map_maybe_parallel(&pending, parallel, max_concurrent, |&(_, a, b, diff)| {
            registrar.register(&images[a].image, &images[b].image, diff)
        });

        for ((index, ..), result) in pending.into_iter().zip(results) {
            let Some(pair) = self.slots[index].as_mut() else {
                continue;
            };
            match result {
                Ok(measurement) => {
                    debug!(
                        a = pair.a,
                        b = pair.b,
                        shift_x = measurement.shift.x,
                        shift_y = measurement.shift.y,
                        error = measurement.error,
                        "Registered pair"
                    );
                    pair.set_measurement(measurement);
                }
                Err(err) => {
                    warn!(a = pair.a, b = pair.b, %err, "Pair registration failed");
                    self.failed += 1;
                }
            }
        }
    }
}
