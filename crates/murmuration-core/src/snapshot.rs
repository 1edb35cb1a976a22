//! Point-in-time, read-only views of engine state for external consumers.
//!
//! Snapshots are copies: publishing one never blocks the engine and holding
//! one never aliases live simulation state.

use crate::arena::AgentColumns;
use crate::groups::GroupAggregate;
use crate::resources::ResourceTable;
use serde::{Deserialize, Serialize};

/// Aggregate statistics over live agents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Diagnostics {
    pub mean_speed: f32,
    pub std_speed: f32,
    /// Radius of gyration about the live centroid.
    pub rg: f32,
    /// `|Σ v| / Σ |v|`, zero when nothing moves.
    pub polarization: f32,
    pub n_groups: u32,
}

/// One active resource as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceView {
    pub position: [f32; 3],
    pub amount: f32,
    pub radius: f32,
    pub renewable: bool,
}

/// Full engine snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: u64,
    pub agent_count: usize,
    pub positions: Vec<[f32; 3]>,
    pub velocities: Vec<[f32; 3]>,
    pub kinds: Vec<u8>,
    pub energies: Vec<f32>,
    pub targets: Vec<i32>,
    pub group_labels: Vec<i32>,
    pub alive: Vec<bool>,
    pub stats: Diagnostics,
    pub resources: Vec<ResourceView>,
    pub groups: Vec<GroupAggregate>,
}

impl Snapshot {
    pub(crate) fn capture(
        step: u64,
        columns: &AgentColumns,
        resources: &ResourceTable,
        groups: &[GroupAggregate],
    ) -> Self {
        let mut views = Vec::with_capacity(resources.active_count());
        for id in 0..resources.len() {
            if !resources.active[id] {
                continue;
            }
            views.push(ResourceView {
                position: resources.positions[id].to_array(),
                amount: resources.amounts[id],
                radius: resources.radii[id],
                renewable: resources.replenish_rates[id] > 0.0,
            });
        }

        Self {
            step,
            agent_count: columns.len(),
            positions: columns.positions().iter().map(|p| p.to_array()).collect(),
            velocities: columns.velocities().iter().map(|v| v.to_array()).collect(),
            kinds: columns.kinds().iter().map(|k| k.index() as u8).collect(),
            energies: columns.energies().to_vec(),
            targets: columns.target_resource().to_vec(),
            group_labels: columns.group_ids().to_vec(),
            alive: columns.alive().to_vec(),
            stats: diagnostics(columns, groups.len() as u32),
            resources: views,
            groups: groups.to_vec(),
        }
    }
}

/// Compute aggregate statistics over the live population.
pub(crate) fn diagnostics(columns: &AgentColumns, n_groups: u32) -> Diagnostics {
    let mut n_live = 0u32;
    let mut speed_sum = 0.0f32;
    let mut speed_sq_sum = 0.0f32;
    let mut velocity_sum = glam::Vec3::ZERO;
    let mut centroid = glam::Vec3::ZERO;

    for i in 0..columns.len() {
        if !columns.alive[i] {
            continue;
        }
        n_live += 1;
        let speed = columns.velocities[i].length();
        speed_sum += speed;
        speed_sq_sum += speed * speed;
        velocity_sum += columns.velocities[i];
        centroid += columns.positions[i];
    }

    if n_live == 0 {
        return Diagnostics {
            n_groups,
            ..Diagnostics::default()
        };
    }

    let n = n_live as f32;
    centroid /= n;
    let mut r_sq_sum = 0.0f32;
    for i in 0..columns.len() {
        if columns.alive[i] {
            r_sq_sum += (columns.positions[i] - centroid).length_squared();
        }
    }

    let mean_speed = speed_sum / n;
    let variance = (speed_sq_sum / n - mean_speed * mean_speed).max(0.0);
    let polarization = if speed_sum > 1.0e-12 {
        velocity_sum.length() / speed_sum
    } else {
        0.0
    };

    Diagnostics {
        mean_speed,
        std_speed: variance.sqrt(),
        rg: (r_sq_sum / n).sqrt(),
        polarization,
        n_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::AgentKind;
    use crate::params::ProfileTable;
    use glam::Vec3;

    fn columns(n: usize) -> AgentColumns {
        let mut columns =
            AgentColumns::new(&vec![AgentKind::Follower; n], &ProfileTable::default());
        for i in 0..n {
            columns.alive[i] = true;
        }
        columns
    }

    #[test]
    fn perfectly_aligned_population_has_unit_polarization() {
        let mut c = columns(4);
        for i in 0..4 {
            c.velocities[i] = Vec3::new(0.0, 2.0, 0.0);
            c.positions[i] = Vec3::new(i as f32, 0.0, 0.0);
        }
        let stats = diagnostics(&c, 0);
        assert!((stats.polarization - 1.0).abs() < 1e-6);
        assert!((stats.mean_speed - 2.0).abs() < 1e-6);
        assert!(stats.std_speed < 1e-5);
    }

    #[test]
    fn opposed_pair_has_zero_polarization() {
        let mut c = columns(2);
        c.velocities[0] = Vec3::new(1.0, 0.0, 0.0);
        c.velocities[1] = Vec3::new(-1.0, 0.0, 0.0);
        let stats = diagnostics(&c, 0);
        assert!(stats.polarization < 1e-6);
    }

    #[test]
    fn dead_agents_are_excluded_from_stats() {
        let mut c = columns(3);
        c.velocities[0] = Vec3::new(1.0, 0.0, 0.0);
        c.velocities[1] = Vec3::new(1.0, 0.0, 0.0);
        c.velocities[2] = Vec3::new(100.0, 0.0, 0.0);
        c.mark_dead(2);
        let stats = diagnostics(&c, 0);
        assert!((stats.mean_speed - 1.0).abs() < 1e-6);
        // The sentinel position must not distort the gyration radius.
        assert!(stats.rg < 1.0);
    }

    #[test]
    fn all_dead_population_yields_zeroed_stats() {
        let mut c = columns(2);
        c.mark_dead(0);
        c.mark_dead(1);
        let stats = diagnostics(&c, 3);
        assert_eq!(stats.mean_speed, 0.0);
        assert_eq!(stats.polarization, 0.0);
        assert_eq!(stats.n_groups, 3);
    }

    #[test]
    fn capture_reflects_active_resources_only() {
        let c = columns(1);
        let mut resources = crate::resources::ResourceTable::new(4);
        resources
            .add(crate::resources::ResourceConfig::depletable(
                Vec3::ZERO,
                10.0,
                2.0,
            ))
            .unwrap();
        let retired = resources
            .add(crate::resources::ResourceConfig::renewable(
                Vec3::ONE,
                5.0,
                1.0,
                1.0,
                10.0,
            ))
            .unwrap();
        resources.remove(retired).unwrap();

        let snapshot = Snapshot::capture(7, &c, &resources, &[]);
        assert_eq!(snapshot.step, 7);
        assert_eq!(snapshot.resources.len(), 1);
        assert!(!snapshot.resources[0].renewable);
        assert_eq!(snapshot.agent_count, 1);
        assert_eq!(snapshot.positions.len(), 1);
    }
}
