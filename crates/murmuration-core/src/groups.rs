//! Group detection via label propagation over spatial + directional
//! similarity, with per-group aggregate statistics.
//!
//! Labels live in `[0, max_groups)`; predators and the dead stay at -1.
//! Each propagation round reads one buffer and writes another, so the
//! outcome does not depend on agent visit order.

use crate::arena::{AgentColumns, NO_GROUP};
use crate::forces::in_fov;
use crate::params::{BoundaryMode, EngineParams};
use glam::Vec3;
use murmuration_index::{CellGrid, SpatialIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Aggregate statistics for one detected group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    pub id: i32,
    pub size: u32,
    pub centroid: Vec3,
    pub mean_velocity: Vec3,
    /// Largest member distance from the centroid.
    pub radius: f32,
}

/// Run one full detection pass and recompute aggregates.
pub(crate) fn update(
    columns: &mut AgentColumns,
    grid: &CellGrid,
    params: &EngineParams,
    max_groups: usize,
) -> Vec<GroupAggregate> {
    let n = columns.len();

    // Seed labels: fresh eligible agents start in a striped label; predators
    // and the dead are pinned outside the label domain.
    for i in 0..n {
        let eligible = columns.alive[i] && !params.profiles[columns.kinds[i]].is_predator;
        if !eligible {
            columns.group_ids[i] = NO_GROUP;
        } else if columns.group_ids[i] < 0 {
            columns.group_ids[i] = (i % max_groups) as i32;
        }
    }

    let r_sq = params.grouping.r_cluster * params.grouping.r_cluster;
    let cos_theta = params.grouping.theta_cluster.cos();
    let mut read: Vec<i32> = columns.group_ids.clone();
    let mut write: Vec<i32> = vec![NO_GROUP; n];

    let mut fov_cos = [0.0f32; crate::arena::AgentKind::COUNT];
    for (slot, profile) in fov_cos.iter_mut().zip(&params.profiles.0) {
        *slot = (profile.fov_angle * 0.5).cos();
    }

    for _ in 0..params.grouping.n_iterations {
        {
            let read_ref = &read;
            let positions = &columns.positions;
            let velocities = &columns.velocities;
            let kinds = &columns.kinds;

            write
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, out)| {
                    let own = read_ref[i];
                    if own < 0 {
                        *out = NO_GROUP;
                        return;
                    }
                    let vi = velocities[i];
                    let vi_norm = vi.length();
                    let profile = &params.profiles[kinds[i]];

                    let mut counts = vec![0u32; max_groups];
                    counts[own as usize] += 1;

                    if vi_norm >= 1.0e-6 {
                        grid.neighbors_within(i, r_sq, &mut |j, _| {
                            let label = read_ref[j];
                            if label < 0 {
                                return;
                            }
                            let vj = velocities[j];
                            let vj_norm = vj.length();
                            if vj_norm < 1.0e-6 {
                                return;
                            }
                            let rij = params.displacement(positions[i], positions[j]);
                            if !in_fov(vi, rij, profile.fov_enabled, fov_cos[kinds[i].index()]) {
                                return;
                            }
                            let cos_angle = (vi.dot(vj) / (vi_norm * vj_norm)).clamp(-1.0, 1.0);
                            if cos_angle >= cos_theta {
                                counts[label as usize] += 1;
                            }
                        });
                    }

                    // Mode label; ties resolve to the lowest label.
                    let mut best = own;
                    let mut best_count = 0u32;
                    for (label, &count) in counts.iter().enumerate() {
                        if count > best_count {
                            best_count = count;
                            best = label as i32;
                        }
                    }
                    *out = best;
                });
        }
        std::mem::swap(&mut read, &mut write);
    }

    columns.group_ids.copy_from_slice(&read);
    aggregates(columns, params, max_groups)
}

/// Recompute size, centroid, mean velocity, and radius for every label.
fn aggregates(
    columns: &AgentColumns,
    params: &EngineParams,
    max_groups: usize,
) -> Vec<GroupAggregate> {
    let periodic = params.boundary.mode == BoundaryMode::Periodic;
    let box_size = params.boundary.box_size;

    let mut sizes = vec![0u32; max_groups];
    let mut velocity_sums = vec![Vec3::ZERO; max_groups];
    // Positions on a torus average through per-axis phase angles.
    let mut sin_sums = vec![Vec3::ZERO; max_groups];
    let mut cos_sums = vec![Vec3::ZERO; max_groups];
    let mut plain_sums = vec![Vec3::ZERO; max_groups];

    for i in 0..columns.len() {
        let label = columns.group_ids[i];
        if label < 0 {
            continue;
        }
        let g = label as usize;
        sizes[g] += 1;
        velocity_sums[g] += columns.velocities[i];
        if periodic {
            let theta = (columns.positions[i] + Vec3::splat(box_size * 0.5)) / box_size
                * std::f32::consts::TAU;
            sin_sums[g] += Vec3::new(theta.x.sin(), theta.y.sin(), theta.z.sin());
            cos_sums[g] += Vec3::new(theta.x.cos(), theta.y.cos(), theta.z.cos());
        } else {
            plain_sums[g] += columns.positions[i];
        }
    }

    let mut result = Vec::new();
    for g in 0..max_groups {
        if sizes[g] == 0 {
            continue;
        }
        let size = sizes[g] as f32;
        let centroid = if periodic {
            let mut mean_angle = Vec3::new(
                sin_sums[g].x.atan2(cos_sums[g].x),
                sin_sums[g].y.atan2(cos_sums[g].y),
                sin_sums[g].z.atan2(cos_sums[g].z),
            );
            for d in 0..3 {
                if mean_angle[d] < 0.0 {
                    mean_angle[d] += std::f32::consts::TAU;
                }
            }
            mean_angle / std::f32::consts::TAU * box_size - Vec3::splat(box_size * 0.5)
        } else {
            plain_sums[g] / size
        };
        let mut radius = 0.0f32;
        for i in 0..columns.len() {
            if columns.group_ids[i] == g as i32 {
                radius = radius.max(params.displacement(centroid, columns.positions[i]).length());
            }
        }
        result.push(GroupAggregate {
            id: g as i32,
            size: sizes[g],
            centroid,
            mean_velocity: velocity_sums[g] / size,
            radius,
        });
    }
    result
}
