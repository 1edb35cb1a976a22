//! Force accumulation: the per-agent physics kernel.
//!
//! Runs as a data-parallel map over agent indices; every agent owns its own
//! accumulator and neighbor traversal order is fixed by the grid, so the
//! result is independent of the thread schedule.

use crate::arena::{AgentColumns, HealthBand, NO_TARGET};
use crate::obstacles::ObstacleTable;
use crate::params::{EngineParams, HealthBandParams, TypeProfile};
use crate::resources::ResourceTable;
use glam::Vec3;
use murmuration_index::{CellGrid, SpatialIndex};
use rayon::prelude::*;

/// Preferred speed after health scaling.
#[must_use]
pub(crate) fn effective_v0(profile: &TypeProfile, band: HealthBand, bands: &HealthBandParams) -> f32 {
    profile.v0 * band.speed_scale(bands)
}

/// Whether the displacement `rij` falls inside the observer's view cone.
///
/// A near-zero velocity has no facing direction and sees everywhere.
#[must_use]
pub(crate) fn in_fov(velocity: Vec3, rij: Vec3, enabled: bool, cos_half_angle: f32) -> bool {
    if !enabled {
        return true;
    }
    let v_norm = velocity.length();
    let r_norm = rij.length();
    if v_norm < 1.0e-6 || r_norm < 1.0e-6 {
        return true;
    }
    velocity.dot(rij) / (v_norm * r_norm) >= cos_half_angle
}

/// Accumulate all forces at the current positions and commit `a = F / m`.
pub(crate) fn accumulate(
    columns: &mut AgentColumns,
    grid: &CellGrid,
    resources: &ResourceTable,
    obstacles: &ObstacleTable,
    params: &EngineParams,
) {
    let n = columns.len();
    if n == 0 {
        return;
    }

    let mut fov_cos = [0.0f32; crate::arena::AgentKind::COUNT];
    for (slot, profile) in fov_cos.iter_mut().zip(&params.profiles.0) {
        *slot = (profile.fov_angle * 0.5).cos();
    }

    let positions = &columns.positions;
    let velocities = &columns.velocities;
    let alive = &columns.alive;
    let kinds = &columns.kinds;
    let health = &columns.health;
    let target_resource = &columns.target_resource;
    let target_prey = &columns.target_prey;
    let has_target = &columns.has_target;

    let predators: Vec<usize> = (0..n)
        .filter(|&i| alive[i] && params.profiles[kinds[i]].is_predator)
        .collect();

    let morse = params.morse;
    let rc_sq = morse.rc * morse.rc;
    let inv_la = 1.0 / morse.la;
    let inv_lr = 1.0 / morse.lr;

    let forces: Vec<Vec3> = (0..n)
        .into_par_iter()
        .map(|i| {
            if !alive[i] {
                return Vec3::ZERO;
            }
            let xi = positions[i];
            let vi = velocities[i];
            let profile = &params.profiles[kinds[i]];
            let cos_half = fov_cos[kinds[i].index()];
            let beta_i = params.alignment.beta * profile.beta_scale;

            let mut force = Vec3::ZERO;
            let mut v_sum = Vec3::ZERO;
            let mut n_visible = 0u32;

            grid.neighbors_within(i, rc_sq, &mut |j, dist_sq| {
                let r_sq = dist_sq.into_inner();
                if r_sq < 1.0e-12 {
                    return;
                }
                let rij = params.displacement(xi, positions[j]);
                let r = r_sq.sqrt();

                // Contact repulsion acts regardless of view direction.
                if r < params.repulsion.min_dist {
                    force -= params.repulsion.strength * (params.repulsion.min_dist - r) * rij / r;
                }

                if in_fov(vi, rij, profile.fov_enabled, cos_half) {
                    let coeff = morse.ca * inv_la * (-r * inv_la).exp()
                        - morse.cr * inv_lr * (-r * inv_lr).exp();
                    force += coeff * rij / r;

                    if beta_i > 0.0 {
                        v_sum += velocities[j];
                        n_visible += 1;
                    }
                }
            });

            if beta_i > 0.0 && n_visible > 0 {
                let v_mean = v_sum / n_visible as f32;
                force += beta_i * (v_mean - vi);
            }

            // Rayleigh drive toward the health-scaled preferred speed.
            let v0 = effective_v0(profile, health[i], &params.foraging.health);
            force += params.rayleigh.alpha * (1.0 - vi.length_squared() / (v0 * v0 + 1.0e-12)) * vi;

            // Goal seeking, weighted per type.
            if params.goal.enabled && profile.goal_weight > 0.0 {
                let toward = params.displacement(xi, params.goal.position);
                let dist = toward.length();
                if dist > 1.0e-6 {
                    force += params.goal.strength * profile.goal_weight * toward / dist;
                }
            }

            // Pull toward the locked resource.
            let res = target_resource[i];
            if has_target[i] && res != NO_TARGET && resources.is_active(res as usize) {
                let toward = params.displacement(xi, resources.positions[res as usize]);
                let dist = toward.length();
                if dist > 1.0e-6 {
                    force += params.foraging.foraging_strength * toward / dist;
                }
            }

            if profile.is_predator {
                // Hunting pull toward the locked prey.
                let prey = target_prey[i];
                if prey != NO_TARGET && alive[prey as usize] {
                    let toward = params.displacement(xi, positions[prey as usize]);
                    let dist = toward.length();
                    if dist > 1.0e-6 {
                        force += params.predation.hunt_strength * toward / dist;
                    }
                }
            } else if params.fear.enabled {
                // Flee nearby predators, harder the closer they are.
                for &p in &predators {
                    let toward = params.displacement(xi, positions[p]);
                    let dist = toward.length();
                    if dist > 1.0e-6 && dist < params.fear.range {
                        force -= params.fear.strength / (dist + 1.0) * (toward / dist);
                    }
                }
            }

            force += obstacles.force_at(xi);
            force
        })
        .collect();

    columns
        .accelerations
        .par_iter_mut()
        .zip(forces.into_par_iter())
        .zip(columns.masses.par_iter())
        .for_each(|((a, f), &m)| {
            *a = f / m;
        });
}

/// Morse pair coefficient at separation `r`; negative is repulsive.
#[must_use]
pub(crate) fn morse_coefficient(params: &EngineParams, r: f32) -> f32 {
    let m = params.morse;
    m.ca / m.la * (-r / m.la).exp() - m.cr / m.lr * (-r / m.lr).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EngineParams;

    #[test]
    fn morse_sign_convention() {
        let params = EngineParams::default();
        // Short range: repulsion dominates.
        assert!(morse_coefficient(&params, 0.3) < 0.0);
        // Intermediate range: attraction dominates.
        assert!(morse_coefficient(&params, 5.0) > 0.0);
        // Far outside both scales the coefficient fades toward zero.
        assert!(morse_coefficient(&params, 14.0).abs() < 1e-2);
    }

    #[test]
    fn fov_admits_frontal_and_rejects_rear() {
        let cos_half = (120.0f32.to_radians() * 0.5).cos();
        let forward = Vec3::new(1.0, 0.0, 0.0);
        assert!(in_fov(forward, Vec3::new(2.0, 0.5, 0.0), true, cos_half));
        assert!(!in_fov(forward, Vec3::new(-2.0, 0.0, 0.0), true, cos_half));
        // Disabled FOV or zero velocity sees everything.
        assert!(in_fov(forward, Vec3::new(-2.0, 0.0, 0.0), false, cos_half));
        assert!(in_fov(Vec3::ZERO, Vec3::new(-2.0, 0.0, 0.0), true, cos_half));
    }

    #[test]
    fn narrower_fov_never_admits_more() {
        let forward = Vec3::new(0.0, 1.0, 0.0);
        let offsets = [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(-0.5, 1.0, 2.0),
        ];
        let mut previous = usize::MAX;
        for degrees in [30.0f32, 90.0, 150.0, 240.0, 360.0] {
            let cos_half = (degrees.to_radians() * 0.5).cos();
            let admitted = offsets
                .iter()
                .filter(|&&r| in_fov(forward, r, true, cos_half))
                .count();
            assert!(
                previous == usize::MAX || admitted >= previous,
                "widening the cone lost neighbors at {degrees} degrees"
            );
            previous = admitted;
        }
    }

    #[test]
    fn effective_v0_tracks_health_band() {
        let params = EngineParams::default();
        let profile = params.profiles[crate::arena::AgentKind::Follower];
        let bands = params.foraging.health;
        let healthy = effective_v0(&profile, HealthBand::Healthy, &bands);
        let dying = effective_v0(&profile, HealthBand::Dying, &bands);
        assert_eq!(healthy, profile.v0);
        assert!((dying - profile.v0 * bands.dying_speed).abs() < 1e-6);
    }
}
