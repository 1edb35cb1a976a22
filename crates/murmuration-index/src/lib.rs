//! Spatial indexing for agent neighborhood queries.
//!
//! A uniform cell list over a cubic box centered on the origin. Positions
//! live in `[-extent/2, extent/2]` per axis; each agent is hashed into a
//! cell and queries enumerate the cells intersecting the search radius.
//! In periodic mode both the cell walk and the reported distances use the
//! minimum-image convention.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait SpatialIndex {
    /// Rebuild internal structures from agent positions; dead agents are skipped.
    fn rebuild(&mut self, positions: &[[f32; 3]], alive: &[bool]) -> Result<(), IndexError>;

    /// Visit neighbors of `agent_idx` within the provided squared radius.
    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );
}

/// Uniform cell grid backing neighbor queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellGrid {
    /// Requested cell edge; the realized edge is `extent / cells_per_axis`,
    /// which is never smaller than this.
    pub cell_size: f32,
    /// Box edge length; the domain spans `[-extent/2, extent/2]` per axis.
    pub extent: f32,
    /// Whether the box wraps (minimum-image distances, wrapping cell walk).
    pub periodic: bool,
    #[serde(skip)]
    inv_cell_size: f32,
    #[serde(skip)]
    cells_per_axis: i32,
    #[serde(skip)]
    buckets: Buckets,
    #[serde(skip)]
    agent_cells: Vec<CellCoord>,
    #[serde(skip)]
    positions: Vec<[f32; 3]>,
}

/// Integer cell coordinate; `(-1, -1, -1)` marks an unindexed (dead) agent.
pub type CellCoord = (i32, i32, i32);

const NO_CELL: CellCoord = (-1, -1, -1);

#[derive(Debug, Clone)]
enum Buckets {
    Dense(Vec<Vec<usize>>),
    Sparse(HashMap<CellCoord, Vec<usize>>),
}

impl Default for Buckets {
    fn default() -> Self {
        Self::Sparse(HashMap::new())
    }
}

// Guard against excessive memory use when the box is huge relative to the cell size.
const DENSE_BUCKET_MAX_CELLS: usize = 1_000_000;

impl CellGrid {
    /// Create a new grid with the provided cell size and box extent.
    pub fn new(cell_size: f32, extent: f32, periodic: bool) -> Result<Self, IndexError> {
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        if !(extent > 0.0) || !extent.is_finite() {
            return Err(IndexError::InvalidConfig("extent must be positive"));
        }
        let mut grid = Self {
            cell_size,
            extent,
            periodic,
            inv_cell_size: 0.0,
            cells_per_axis: 0,
            buckets: Buckets::default(),
            agent_cells: Vec::new(),
            positions: Vec::new(),
        };
        grid.recompute_layout();
        Ok(grid)
    }

    fn recompute_layout(&mut self) {
        // Cells tile the box exactly: the per-axis count rounds down so the
        // realized cell edge is at least the requested size. Rounding up
        // instead would leave phantom space past the last cell, and the
        // wrapped one-cell walk could miss neighbors across the seam.
        self.cells_per_axis = Self::cells_for_extent(self.extent, self.cell_size);
        let cell_width = self.extent / self.cells_per_axis as f32;
        self.inv_cell_size = 1.0 / cell_width;
    }

    /// Number of cells along one axis.
    #[must_use]
    pub const fn cells_per_axis(&self) -> i32 {
        self.cells_per_axis
    }

    /// The cell the indexed agent was assigned during the last rebuild.
    #[must_use]
    pub fn cell_of(&self, agent_idx: usize) -> Option<CellCoord> {
        let cell = *self.agent_cells.get(agent_idx)?;
        if cell == NO_CELL { None } else { Some(cell) }
    }

    /// Linearized cell id for the indexed agent, if present.
    #[must_use]
    pub fn linear_cell_of(&self, agent_idx: usize) -> Option<usize> {
        self.cell_of(agent_idx).map(|cell| self.linear_index(cell))
    }

    /// The cell a world position hashes into.
    #[must_use]
    pub fn cell_from_point(&self, p: [f32; 3]) -> CellCoord {
        let half = self.extent * 0.5;
        (
            self.discretize_axis(p[0] + half),
            self.discretize_axis(p[1] + half),
            self.discretize_axis(p[2] + half),
        )
    }

    /// Minimum-image displacement between two positions.
    #[must_use]
    pub fn displacement(&self, from: [f32; 3], to: [f32; 3]) -> [f32; 3] {
        let mut d = [to[0] - from[0], to[1] - from[1], to[2] - from[2]];
        if self.periodic {
            for v in &mut d {
                *v -= self.extent * (*v / self.extent).round();
            }
        }
        d
    }

    #[inline]
    fn discretize_axis(&self, shifted: f32) -> i32 {
        let raw = (shifted * self.inv_cell_size).floor();
        let cell = raw.clamp(i32::MIN as f32, i32::MAX as f32) as i32;
        if self.periodic {
            Self::wrap(cell, self.cells_per_axis)
        } else {
            cell.clamp(0, self.cells_per_axis - 1)
        }
    }

    #[inline]
    const fn wrap(value: i32, max: i32) -> i32 {
        ((value % max) + max) % max
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    const fn linear_index(&self, cell: CellCoord) -> usize {
        // coordinates are already confined to [0, cells_per_axis)
        let n = self.cells_per_axis as usize;
        (cell.2 as usize) * n * n + (cell.1 as usize) * n + cell.0 as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cells_for_extent(extent: f32, cell_size: f32) -> i32 {
        let raw = (extent / cell_size).floor().max(1.0);
        raw.min(i32::MAX as f32) as i32
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn cell_reach(&self, radius: f32) -> i32 {
        (radius * self.inv_cell_size).ceil().max(0.0).min(i32::MAX as f32) as i32
    }

    fn for_each_in_bucket(
        &self,
        cell: CellCoord,
        origin: [f32; 3],
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        let indices: &[usize] = match &self.buckets {
            Buckets::Dense(buckets) => &buckets[self.linear_index(cell)],
            Buckets::Sparse(map) => match map.get(&cell) {
                Some(indices) => indices,
                None => return,
            },
        };
        for &other_idx in indices {
            if other_idx == agent_idx {
                continue;
            }
            let d = self.displacement(origin, self.positions[other_idx]);
            let dist_sq = d[0].mul_add(d[0], d[1].mul_add(d[1], d[2] * d[2]));
            if dist_sq <= radius_sq {
                visitor(other_idx, OrderedFloat(dist_sq));
            }
        }
    }
}

impl SpatialIndex for CellGrid {
    fn rebuild(&mut self, positions: &[[f32; 3]], alive: &[bool]) -> Result<(), IndexError> {
        if self.cell_size <= 0.0 || self.extent <= 0.0 {
            return Err(IndexError::InvalidConfig(
                "cell_size and extent must be positive",
            ));
        }
        if positions.len() != alive.len() {
            return Err(IndexError::InvalidConfig(
                "positions and alive mask must have equal length",
            ));
        }
        self.recompute_layout();
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.agent_cells.clear();
        self.agent_cells.resize(positions.len(), NO_CELL);

        let per_axis = self.cells_per_axis as usize;
        let total_cells = per_axis
            .checked_mul(per_axis)
            .and_then(|n| n.checked_mul(per_axis));

        if let Some(cell_count) = total_cells.filter(|&c| c <= DENSE_BUCKET_MAX_CELLS) {
            // Dense path: two-pass build for precise capacity reservations.
            let mut counts: Vec<usize> = vec![0; cell_count];
            for (idx, p) in positions.iter().enumerate() {
                if !alive[idx] {
                    continue;
                }
                let cell = self.cell_from_point(*p);
                self.agent_cells[idx] = cell;
                counts[self.linear_index(cell)] += 1;
            }
            let mut dense: Vec<Vec<usize>> = counts.into_iter().map(Vec::with_capacity).collect();
            for (idx, &cell) in self.agent_cells.iter().enumerate() {
                if cell == NO_CELL {
                    continue;
                }
                dense[self.linear_index(cell)].push(idx);
            }
            self.buckets = Buckets::Dense(dense);
        } else {
            // Sparse fallback for boxes far larger than the interaction scale.
            let mut map: HashMap<CellCoord, Vec<usize>> = HashMap::new();
            map.reserve(positions.len());
            for (idx, p) in positions.iter().enumerate() {
                if !alive[idx] {
                    continue;
                }
                let cell = self.cell_from_point(*p);
                self.agent_cells[idx] = cell;
                map.entry(cell).or_default().push(idx);
            }
            self.buckets = Buckets::Sparse(map);
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if agent_idx >= self.positions.len() || radius_sq < 0.0 {
            return;
        }
        let home = self.agent_cells[agent_idx];
        if home == NO_CELL {
            return;
        }
        let origin = self.positions[agent_idx];
        let n = self.cells_per_axis;
        let reach = self.cell_reach(radius_sq.sqrt());

        // When the search window covers the whole (periodic) axis, walk each
        // cell exactly once; a wrapped relative walk would revisit cells and
        // double-count neighbors in small boxes.
        let span_all = 2 * reach + 1 >= n;
        let (lo, hi) = if span_all { (0, n - 1) } else { (-reach, reach) };

        for dz in lo..=hi {
            for dy in lo..=hi {
                for dx in lo..=hi {
                    let cell = if span_all {
                        (dx, dy, dz)
                    } else {
                        let (cx, cy, cz) = (home.0 + dx, home.1 + dy, home.2 + dz);
                        if self.periodic {
                            (Self::wrap(cx, n), Self::wrap(cy, n), Self::wrap(cz, n))
                        } else {
                            if cx < 0 || cy < 0 || cz < 0 || cx >= n || cy >= n || cz >= n {
                                continue;
                            }
                            (cx, cy, cz)
                        }
                    };
                    self.for_each_in_bucket(cell, origin, agent_idx, radius_sq, visitor);
                }
            }
        }
    }
}
