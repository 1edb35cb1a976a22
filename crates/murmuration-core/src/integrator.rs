//! Velocity-Verlet integration with boundary handling and Vicsek noise.
//!
//! The step is split in two: `drift` applies the first half-kick plus the
//! position update and resolves the boundary, `kick` applies the second
//! half-kick, perturbs the heading, and enforces the speed cap. Forces are
//! re-accumulated between the two halves.

use crate::arena::AgentColumns;
use crate::forces::effective_v0;
use crate::params::{BoundaryMode, Dimensionality, EngineParams};
use crate::rng::Rng32;
use glam::Vec3;
use rayon::prelude::*;

/// First half-kick and drift, with per-axis boundary resolution.
pub(crate) fn drift(columns: &mut AgentColumns, params: &EngineParams, dt: f32) {
    let boundary = params.boundary;
    let half = boundary.box_size * 0.5;

    columns
        .positions
        .par_iter_mut()
        .zip(columns.velocities.par_iter_mut())
        .zip(columns.accelerations.par_iter())
        .zip(columns.alive.par_iter())
        .for_each(|(((x, v), a), &alive)| {
            if !alive {
                return;
            }
            *v += 0.5 * dt * *a;
            *x += *v * dt;
            for d in 0..3 {
                match boundary.mode {
                    BoundaryMode::Periodic => {
                        x[d] = (x[d] + half).rem_euclid(boundary.box_size) - half;
                    }
                    BoundaryMode::Reflective => {
                        if x[d] > half {
                            let overshoot = x[d] - half;
                            x[d] = half;
                            v[d] = -v[d] - boundary.wall_stiffness * overshoot;
                        } else if x[d] < -half {
                            let overshoot = -half - x[d];
                            x[d] = -half;
                            v[d] = -v[d] + boundary.wall_stiffness * overshoot;
                        }
                    }
                    BoundaryMode::Absorbing => {
                        if x[d].abs() > half {
                            x[d] = x[d].clamp(-half, half);
                            v[d] = 0.0;
                        }
                    }
                }
            }
        });
}

/// Second half-kick, rotational noise, and the speed cap.
pub(crate) fn kick(columns: &mut AgentColumns, params: &EngineParams, dt: f32) {
    let bands = params.foraging.health;

    columns
        .velocities
        .par_iter_mut()
        .zip(columns.accelerations.par_iter())
        .zip(columns.rng_states.par_iter_mut())
        .zip(columns.alive.par_iter())
        .zip(columns.kinds.par_iter())
        .zip(columns.health.par_iter())
        .for_each(|(((((v, a), state), &alive), &kind), &band)| {
            if !alive {
                return;
            }
            *v += 0.5 * dt * *a;

            let profile = &params.profiles[kind];
            let eta = params.noise.eta * profile.eta;
            if eta > 0.0 {
                let speed = v.length();
                if speed > 1.0e-6 {
                    let mut rng = Rng32::from_state(*state);
                    let angle = (rng.uniform() * 2.0 - 1.0) * eta;
                    *v = match params.dimensions {
                        Dimensionality::Two => rotate_in_plane(*v, angle),
                        Dimensionality::Three => {
                            let axis = rng.unit_axis();
                            rotate_about_axis(*v, axis, angle)
                        }
                    };
                    *state = rng.state();
                }
            }

            let cap = params.speed_cap_factor * effective_v0(profile, band, &bands);
            let speed = v.length();
            if speed > cap {
                *v *= cap / speed;
            }
        });
}

/// Rotate a vector in the xy-plane (2D runs keep z = 0).
#[must_use]
fn rotate_in_plane(v: Vec3, angle: f32) -> Vec3 {
    let (sin, cos) = angle.sin_cos();
    Vec3::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos, v.z)
}

/// Rodrigues' rotation of `v` about the unit axis `k`.
#[must_use]
fn rotate_about_axis(v: Vec3, k: Vec3, angle: f32) -> Vec3 {
    let (sin, cos) = angle.sin_cos();
    v * cos + k.cross(v) * sin + k * k.dot(v) * (1.0 - cos)
}
