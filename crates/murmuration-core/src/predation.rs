//! Predation behavior: prey acquisition and probabilistic attacks.

use crate::arena::{AgentColumns, NO_TARGET};
use crate::params::{EngineParams, PredationParams};
use crate::rng::Rng32;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

/// Lock each live predator onto the nearest live non-predator within its
/// search horizon; clears the lock when nothing is in range.
pub(crate) fn select_prey(columns: &mut AgentColumns, params: &EngineParams) {
    let n = columns.len();
    let positions = &columns.positions;
    let alive = &columns.alive;
    let kinds = &columns.kinds;
    let horizon = OrderedFloat(params.predation.hunt_range);

    let updates: Vec<(usize, i32)> = (0..n)
        .into_par_iter()
        .filter(|&i| alive[i] && params.profiles[kinds[i]].is_predator)
        .map(|i| {
            let mut best = NO_TARGET;
            let mut best_dist = horizon;
            for j in 0..n {
                if j == i || !alive[j] || params.profiles[kinds[j]].is_predator {
                    continue;
                }
                let dist = OrderedFloat(
                    params.displacement(positions[i], positions[j]).length(),
                );
                if dist < best_dist {
                    best_dist = dist;
                    best = j as i32;
                }
            }
            (i, best)
        })
        .collect();

    for (i, best) in updates {
        columns.target_prey[i] = best;
        columns.has_target[i] = best != NO_TARGET;
    }
}

/// Attack success probability under the additive multi-factor model.
///
/// The returned probability is clamped to the configured `[min, max]` band,
/// so there is always a residual chance of escape and of capture.
#[must_use]
pub fn success_probability(
    params: &PredationParams,
    predator_speed: f32,
    prey_speed: f32,
    reference_speed: f32,
    predator_energy: f32,
    prey_energy: f32,
    energy_max: f32,
    protectors: u32,
) -> f32 {
    let speed_edge = params.speed_gain * ((predator_speed - prey_speed) / reference_speed).tanh();
    let prey_weakness = params.weakness_gain * (1.0 - prey_energy / energy_max);
    let stamina = params.stamina_gain * (predator_energy / energy_max);
    let group_defense = params.defense_penalty * (1.0 - 1.0 / (1.0 + protectors as f32));
    (params.base_rate + speed_edge + prey_weakness + stamina - group_defense)
        .clamp(params.min_rate, params.max_rate)
}

/// Cooldown-gated attack resolution, in agent-index order.
///
/// Returns the number of kills this step.
pub(crate) fn attack(columns: &mut AgentColumns, params: &EngineParams, step: u64) -> usize {
    let n = columns.len();
    let predation = params.predation;
    let energy_max = params.foraging.energy_max;
    let step_now = step.min(i32::MAX as u64) as i32;
    let mut kills = 0;

    for i in 0..n {
        if !columns.alive[i] || !params.profiles[columns.kinds[i]].is_predator {
            continue;
        }
        let prey = columns.target_prey[i];
        if prey == NO_TARGET || !columns.alive[prey as usize] {
            continue;
        }
        let prey = prey as usize;
        if step_now - columns.last_attack_step[i] < predation.cooldown as i32 {
            continue;
        }
        let dist = params
            .displacement(columns.positions[i], columns.positions[prey])
            .length();
        if dist > predation.attack_radius {
            continue;
        }

        let protectors = count_protectors(columns, params, prey);
        let probability = success_probability(
            &predation,
            columns.velocities[i].length(),
            columns.velocities[prey].length(),
            params.rayleigh.v0,
            columns.energies[i],
            columns.energies[prey],
            energy_max,
            protectors,
        );

        let mut rng = Rng32::from_state(columns.rng_states[i]);
        let roll = rng.uniform();
        columns.rng_states[i] = rng.state();
        columns.last_attack_step[i] = step_now;

        if roll < probability {
            columns.energies[i] = (columns.energies[i] + predation.energy_reward).min(energy_max);
            columns.mark_dead(prey);
            columns.target_prey[i] = NO_TARGET;
            columns.has_target[i] = false;
            kills += 1;
            tracing::debug!(predator = i, prey, probability, "predation kill");
        } else {
            columns.energies[i] = (columns.energies[i] - predation.failure_cost).max(0.0);
        }
    }
    kills
}

/// Live same-group non-predator neighbors of `prey` within twice the
/// attack radius. Ungrouped prey defends alone.
fn count_protectors(columns: &AgentColumns, params: &EngineParams, prey: usize) -> u32 {
    let group = columns.group_ids[prey];
    if group < 0 {
        return 0;
    }
    let radius = params.predation.attack_radius * 2.0;
    let mut count = 0;
    for j in 0..columns.len() {
        if j == prey || !columns.alive[j] || params.profiles[columns.kinds[j]].is_predator {
            continue;
        }
        if columns.group_ids[j] != group {
            continue;
        }
        let dist = params
            .displacement(columns.positions[prey], columns.positions[j])
            .length();
        if dist <= radius {
            count += 1;
        }
    }
    count
}
