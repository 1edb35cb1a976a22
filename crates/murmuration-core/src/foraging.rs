//! Foraging behavior: target selection, FIFO consumption, energy accounting.

use crate::arena::{AgentColumns, NO_TARGET};
use crate::params::EngineParams;
use crate::resources::ResourceTable;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

/// Lock each hungry (or already-locked) non-predator onto its nearest
/// active resource. Runs at the start of the step, before forces.
pub(crate) fn select_targets(
    columns: &mut AgentColumns,
    resources: &ResourceTable,
    params: &EngineParams,
) {
    let positions = &columns.positions;
    let alive = &columns.alive;
    let kinds = &columns.kinds;
    let energies = &columns.energies;
    let threshold = params.foraging.energy_threshold;

    columns
        .target_resource
        .par_iter_mut()
        .zip(columns.has_target.par_iter_mut())
        .enumerate()
        .for_each(|(i, (target, has_target))| {
            if !alive[i] || params.profiles[kinds[i]].is_predator {
                return;
            }
            if energies[i] >= threshold && !*has_target {
                return;
            }
            let mut best = NO_TARGET;
            let mut best_dist = OrderedFloat(f32::INFINITY);
            for res in 0..resources.len() {
                if !resources.active[res] || resources.amounts[res] <= 0.0 {
                    continue;
                }
                let dist = OrderedFloat(
                    params
                        .displacement(positions[i], resources.positions[res])
                        .length(),
                );
                if dist < best_dist {
                    best_dist = dist;
                    best = res as i32;
                }
            }
            *target = best;
            *has_target = best != NO_TARGET;
        });
}

/// One FIFO-by-proximity arbitration pass over every active resource.
///
/// Consumers are served nearest-first (ties by index); the pass over a
/// single resource is serial, which is what makes the split deterministic.
pub(crate) fn consume(
    columns: &mut AgentColumns,
    resources: &mut ResourceTable,
    params: &EngineParams,
) {
    let n = columns.len();
    let energy_max = params.foraging.energy_max;
    let intake = params.foraging.consumption_per_step;
    let conversion = params.foraging.conversion_efficiency;
    let mut consumers: Vec<(OrderedFloat<f32>, usize)> = Vec::new();

    for res in 0..resources.len() {
        if !resources.active[res] || resources.amounts[res] <= 0.0 {
            continue;
        }
        let radius = resources.radii[res];
        consumers.clear();
        for i in 0..n {
            if !columns.alive[i] {
                continue;
            }
            let dist = params
                .displacement(columns.positions[i], resources.positions[res])
                .length();
            if dist <= radius {
                consumers.push((OrderedFloat(dist), i));
            }
        }
        consumers.sort_unstable();

        for &(_, i) in &consumers {
            if resources.amounts[res] <= 0.0 {
                break;
            }
            let headroom = (energy_max - columns.energies[i]) / conversion;
            let take = intake.min(resources.amounts[res]).min(headroom).max(0.0);
            resources.amounts[res] -= take;
            columns.energies[i] = (columns.energies[i] + take * conversion).min(energy_max);
            if columns.energies[i] >= energy_max {
                columns.target_resource[i] = NO_TARGET;
                columns.has_target[i] = false;
            }
        }

        if resources.amounts[res] <= 0.0 && resources.replenish_rates[res] <= 0.0 {
            resources.amounts[res] = 0.0;
            resources.active[res] = false;
            tracing::debug!(resource = res, "resource depleted");
            // Targets referencing a retired resource are stale; drop them now.
            for i in 0..n {
                if columns.target_resource[i] == res as i32 {
                    columns.target_resource[i] = NO_TARGET;
                    columns.has_target[i] = false;
                }
            }
        }
    }
}

/// Passive drain, health-band refresh, and starvation deaths.
///
/// Returns the number of agents that starved this step.
pub(crate) fn update_energy(columns: &mut AgentColumns, params: &EngineParams) -> usize {
    let foraging = params.foraging;
    let velocities = &columns.velocities;

    columns
        .energies
        .par_iter_mut()
        .zip(columns.health.par_iter_mut())
        .zip(columns.alive.par_iter())
        .enumerate()
        .for_each(|(i, ((energy, band), &alive))| {
            if !alive {
                return;
            }
            let drain =
                foraging.consumption_per_step + foraging.movement_drain * velocities[i].length();
            *energy = (*energy - drain).max(0.0);
            *band = crate::arena::HealthBand::classify(*energy, &foraging.health);
        });

    let mut deaths = 0;
    for i in 0..columns.len() {
        if columns.alive[i] && columns.energies[i] <= 0.0 {
            columns.mark_dead(i);
            deaths += 1;
        }
    }
    if deaths > 0 {
        tracing::debug!(count = deaths, "agents starved");
    }
    deaths
}
