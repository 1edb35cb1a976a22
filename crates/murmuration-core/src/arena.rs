//! Dense structure-of-arrays storage for the agent arena.
//!
//! The arena has fixed capacity: agents are created once at initialization
//! and tombstoned on death, never removed, so plain indices stay valid for
//! the lifetime of a run. All cross-references between agents, resources,
//! and groups are index-based.

use crate::params::{HealthBandParams, ProfileTable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Sentinel index meaning "no target" / "no group".
pub const NO_TARGET: i32 = -1;
/// Sentinel group label for predators, the dead, and the unclustered.
pub const NO_GROUP: i32 = -1;
/// Sentinel cell id for agents not present in the spatial grid.
pub const NO_CELL: i32 = -1;
/// Dead agents are parked here, far outside any live grid cell.
pub const DEAD_SENTINEL: f32 = 1.0e6;

/// Behavioral role of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AgentKind {
    #[default]
    Follower = 0,
    Explorer = 1,
    Leader = 2,
    Predator = 3,
}

impl AgentKind {
    /// Number of distinct roles.
    pub const COUNT: usize = 4;

    /// Dense index used for profile-table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Follower),
            1 => Some(Self::Explorer),
            2 => Some(Self::Leader),
            3 => Some(Self::Predator),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Follower => "follower",
            Self::Explorer => "explorer",
            Self::Leader => "leader",
            Self::Predator => "predator",
        }
    }
}

/// Discretized energy tier; scales the effective preferred speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    #[default]
    Healthy,
    Tired,
    Weak,
    Dying,
}

impl HealthBand {
    /// Band for a given energy level.
    #[must_use]
    pub fn classify(energy: f32, bands: &HealthBandParams) -> Self {
        if energy > bands.healthy_above {
            Self::Healthy
        } else if energy > bands.tired_above {
            Self::Tired
        } else if energy > bands.weak_above {
            Self::Weak
        } else {
            Self::Dying
        }
    }

    /// Multiplier applied to the preferred speed.
    #[must_use]
    pub fn speed_scale(self, bands: &HealthBandParams) -> f32 {
        match self {
            Self::Healthy => 1.0,
            Self::Tired => bands.tired_speed,
            Self::Weak => bands.weak_speed,
            Self::Dying => bands.dying_speed,
        }
    }
}

/// Collection of per-agent columns for hot-path iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentColumns {
    pub(crate) positions: Vec<Vec3>,
    pub(crate) velocities: Vec<Vec3>,
    pub(crate) accelerations: Vec<Vec3>,
    pub(crate) kinds: Vec<AgentKind>,
    pub(crate) masses: Vec<f32>,
    pub(crate) energies: Vec<f32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) health: Vec<HealthBand>,
    pub(crate) target_resource: Vec<i32>,
    pub(crate) target_prey: Vec<i32>,
    pub(crate) has_target: Vec<bool>,
    pub(crate) group_ids: Vec<i32>,
    pub(crate) rng_states: Vec<u32>,
    pub(crate) last_attack_step: Vec<i32>,
    pub(crate) cell_ids: Vec<i32>,
}

impl AgentColumns {
    /// Build columns for a fixed population; masses come from the profiles.
    #[must_use]
    pub(crate) fn new(kinds: &[AgentKind], profiles: &ProfileTable) -> Self {
        let n = kinds.len();
        let columns = Self {
            positions: vec![Vec3::ZERO; n],
            velocities: vec![Vec3::ZERO; n],
            accelerations: vec![Vec3::ZERO; n],
            kinds: kinds.to_vec(),
            masses: kinds.iter().map(|&k| profiles[k].mass).collect(),
            energies: vec![0.0; n],
            alive: vec![false; n],
            health: vec![HealthBand::Healthy; n],
            target_resource: vec![NO_TARGET; n],
            target_prey: vec![NO_TARGET; n],
            has_target: vec![false; n],
            group_ids: vec![NO_GROUP; n],
            rng_states: vec![1; n],
            last_attack_step: vec![0; n],
            cell_ids: vec![NO_CELL; n],
        };
        columns.debug_assert_coherent();
        columns
    }

    /// Number of arena slots (live and dead).
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when the arena holds no agents at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of live agents.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    /// Immutable access to positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Mutable access to positions.
    #[must_use]
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Immutable access to velocities.
    #[must_use]
    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    /// Mutable access to velocities.
    #[must_use]
    pub fn velocities_mut(&mut self) -> &mut [Vec3] {
        &mut self.velocities
    }

    /// Immutable access to energies.
    #[must_use]
    pub fn energies(&self) -> &[f32] {
        &self.energies
    }

    /// Mutable access to energies.
    #[must_use]
    pub fn energies_mut(&mut self) -> &mut [f32] {
        &mut self.energies
    }

    /// Immutable access to the alive mask.
    #[must_use]
    pub fn alive(&self) -> &[bool] {
        &self.alive
    }

    /// Immutable access to agent roles.
    #[must_use]
    pub fn kinds(&self) -> &[AgentKind] {
        &self.kinds
    }

    /// Immutable access to per-agent masses.
    #[must_use]
    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    /// Immutable access to health bands.
    #[must_use]
    pub fn health(&self) -> &[HealthBand] {
        &self.health
    }

    /// Immutable access to foraging targets.
    #[must_use]
    pub fn target_resource(&self) -> &[i32] {
        &self.target_resource
    }

    /// Immutable access to predation targets.
    #[must_use]
    pub fn target_prey(&self) -> &[i32] {
        &self.target_prey
    }

    /// Immutable access to group labels.
    #[must_use]
    pub fn group_ids(&self) -> &[i32] {
        &self.group_ids
    }

    /// Immutable access to grid cell assignments.
    #[must_use]
    pub fn cell_ids(&self) -> &[i32] {
        &self.cell_ids
    }

    /// Immutable access to per-agent RNG states.
    #[must_use]
    pub fn rng_states(&self) -> &[u32] {
        &self.rng_states
    }

    /// Tombstone an agent: park it at the far sentinel and clear its state.
    pub(crate) fn mark_dead(&mut self, index: usize) {
        self.alive[index] = false;
        self.positions[index] = Vec3::splat(DEAD_SENTINEL);
        self.velocities[index] = Vec3::ZERO;
        self.accelerations[index] = Vec3::ZERO;
        self.energies[index] = 0.0;
        self.health[index] = HealthBand::Dying;
        self.target_resource[index] = NO_TARGET;
        self.target_prey[index] = NO_TARGET;
        self.has_target[index] = false;
        self.group_ids[index] = NO_GROUP;
        self.cell_ids[index] = NO_CELL;
    }

    #[inline]
    pub(crate) fn debug_assert_coherent(&self) {
        let n = self.positions.len();
        debug_assert_eq!(n, self.velocities.len());
        debug_assert_eq!(n, self.accelerations.len());
        debug_assert_eq!(n, self.kinds.len());
        debug_assert_eq!(n, self.masses.len());
        debug_assert_eq!(n, self.energies.len());
        debug_assert_eq!(n, self.alive.len());
        debug_assert_eq!(n, self.health.len());
        debug_assert_eq!(n, self.target_resource.len());
        debug_assert_eq!(n, self.target_prey.len());
        debug_assert_eq!(n, self.has_target.len());
        debug_assert_eq!(n, self.group_ids.len());
        debug_assert_eq!(n, self.rng_states.len());
        debug_assert_eq!(n, self.last_attack_step.len());
        debug_assert_eq!(n, self.cell_ids.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ProfileTable;

    #[test]
    fn masses_come_from_profiles() {
        let profiles = ProfileTable::default();
        let columns = AgentColumns::new(
            &[AgentKind::Follower, AgentKind::Predator, AgentKind::Explorer],
            &profiles,
        );
        assert_eq!(columns.len(), 3);
        assert_eq!(columns.masses()[0], profiles[AgentKind::Follower].mass);
        assert_eq!(columns.masses()[1], profiles[AgentKind::Predator].mass);
        assert_eq!(columns.masses()[2], profiles[AgentKind::Explorer].mass);
    }

    #[test]
    fn mark_dead_parks_at_sentinel_and_clears_state() {
        let profiles = ProfileTable::default();
        let mut columns = AgentColumns::new(&[AgentKind::Follower; 2], &profiles);
        columns.alive[1] = true;
        columns.energies[1] = 42.0;
        columns.velocities[1] = Vec3::new(1.0, 2.0, 3.0);
        columns.target_resource[1] = 3;
        columns.has_target[1] = true;
        columns.group_ids[1] = 5;

        columns.mark_dead(1);

        assert!(!columns.alive[1]);
        assert!(columns.positions[1].min_element() >= DEAD_SENTINEL);
        assert_eq!(columns.velocities[1], Vec3::ZERO);
        assert_eq!(columns.energies[1], 0.0);
        assert_eq!(columns.target_resource[1], NO_TARGET);
        assert!(!columns.has_target[1]);
        assert_eq!(columns.group_ids[1], NO_GROUP);
        assert_eq!(columns.alive_count(), 0);
    }

    #[test]
    fn health_band_thresholds_match_defaults() {
        let bands = HealthBandParams::default();
        assert_eq!(HealthBand::classify(80.0, &bands), HealthBand::Healthy);
        assert_eq!(HealthBand::classify(50.0, &bands), HealthBand::Tired);
        assert_eq!(HealthBand::classify(30.0, &bands), HealthBand::Weak);
        assert_eq!(HealthBand::classify(15.0, &bands), HealthBand::Dying);
        assert_eq!(HealthBand::classify(1.0, &bands), HealthBand::Dying);
        assert_eq!(HealthBand::Weak.speed_scale(&bands), 0.60);
    }

    #[test]
    fn kind_round_trips_through_index() {
        for kind in [
            AgentKind::Follower,
            AgentKind::Explorer,
            AgentKind::Leader,
            AgentKind::Predator,
        ] {
            assert_eq!(AgentKind::from_index(kind.index() as u8), Some(kind));
        }
        assert_eq!(AgentKind::from_index(4), None);
    }
}
