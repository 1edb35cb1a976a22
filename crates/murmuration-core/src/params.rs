//! Simulation parameters and per-type behavior profiles.
//!
//! The parameter block is immutable within a step; the command channel swaps
//! it atomically at step boundaries. Profiles are a shared read-only table
//! indexed by [`AgentKind`].

use crate::EngineError;
use crate::arena::AgentKind;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// How positions leaving the box are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Positions wrap modulo the box; distances use the minimum image.
    #[default]
    Periodic,
    /// Positions clamp to the wall and the normal velocity component flips.
    Reflective,
    /// Positions clamp to the wall and the normal velocity component drops to zero.
    Absorbing,
}

/// Spatial dimensionality of the run; the 2D case keeps `z = 0` throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dimensionality {
    Two,
    #[default]
    Three,
}

/// Morse pair potential: short-range repulsion, longer-range attraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorseParams {
    pub ca: f32,
    pub cr: f32,
    pub la: f32,
    pub lr: f32,
    /// Interaction cut-off radius; also fixes the grid cell size (`2·rc`).
    pub rc: f32,
}

impl Default for MorseParams {
    fn default() -> Self {
        Self {
            ca: 1.5,
            cr: 2.0,
            la: 2.5,
            lr: 0.5,
            rc: 15.0,
        }
    }
}

/// Rayleigh active drive anchoring speeds to a preferred value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayleighParams {
    pub alpha: f32,
    /// Reference preferred speed; per-type profiles override the per-agent value.
    pub v0: f32,
}

impl Default for RayleighParams {
    fn default() -> Self {
        Self { alpha: 2.0, v0: 1.0 }
    }
}

/// Cucker–Smale velocity alignment gain, scaled per type by the profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParams {
    pub beta: f32,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

/// Vicsek rotational noise; the global gain multiplies each type's `eta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub eta: f32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self { eta: 1.0 }
    }
}

/// Short-range soft-sphere overlap repulsion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftRepulsionParams {
    pub min_dist: f32,
    pub strength: f32,
}

impl Default for SoftRepulsionParams {
    fn default() -> Self {
        Self {
            min_dist: 0.5,
            strength: 20.0,
        }
    }
}

/// Box geometry and wall behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryParams {
    pub mode: BoundaryMode,
    /// Edge length; the domain spans `[-box_size/2, box_size/2]` per axis.
    pub box_size: f32,
    /// Extra inward kick per unit of overshoot in reflective mode.
    pub wall_stiffness: f32,
}

impl Default for BoundaryParams {
    fn default() -> Self {
        Self {
            mode: BoundaryMode::Periodic,
            box_size: 50.0,
            wall_stiffness: 0.0,
        }
    }
}

/// Energy thresholds separating the four health bands, and the speed
/// multiplier each band applies to the preferred speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBandParams {
    pub healthy_above: f32,
    pub tired_above: f32,
    pub weak_above: f32,
    pub tired_speed: f32,
    pub weak_speed: f32,
    pub dying_speed: f32,
}

impl Default for HealthBandParams {
    fn default() -> Self {
        Self {
            healthy_above: 50.0,
            tired_above: 30.0,
            weak_above: 15.0,
            tired_speed: 0.85,
            weak_speed: 0.60,
            dying_speed: 0.30,
        }
    }
}

/// Foraging and energy bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForagingParams {
    pub energy_max: f32,
    pub initial_energy: f32,
    /// Agents below this energy start scanning for resources.
    pub energy_threshold: f32,
    /// Per-step intake from a resource, and the passive per-step drain.
    pub consumption_per_step: f32,
    /// Additional drain proportional to speed.
    pub movement_drain: f32,
    /// Pull toward the locked resource.
    pub foraging_strength: f32,
    /// Resource units converted to energy units per unit consumed.
    pub conversion_efficiency: f32,
    pub health: HealthBandParams,
}

impl Default for ForagingParams {
    fn default() -> Self {
        Self {
            energy_max: 100.0,
            initial_energy: 100.0,
            energy_threshold: 30.0,
            consumption_per_step: 0.2,
            movement_drain: 0.1,
            foraging_strength: 3.0,
            conversion_efficiency: 1.0,
            health: HealthBandParams::default(),
        }
    }
}

/// Predator hunting and the attack success model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredationParams {
    pub hunt_range: f32,
    pub hunt_strength: f32,
    pub attack_radius: f32,
    /// Steps between attack attempts.
    pub cooldown: u32,
    pub energy_reward: f32,
    pub failure_cost: f32,
    pub base_rate: f32,
    pub speed_gain: f32,
    pub weakness_gain: f32,
    pub stamina_gain: f32,
    pub defense_penalty: f32,
    pub min_rate: f32,
    pub max_rate: f32,
}

impl Default for PredationParams {
    fn default() -> Self {
        Self {
            hunt_range: 20.0,
            hunt_strength: 5.0,
            attack_radius: 2.0,
            cooldown: 20,
            energy_reward: 40.0,
            failure_cost: 10.0,
            base_rate: 0.5,
            speed_gain: 0.20,
            weakness_gain: 0.15,
            stamina_gain: 0.06,
            defense_penalty: 0.30,
            min_rate: 0.05,
            max_rate: 0.95,
        }
    }
}

/// Label-propagation group detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupingParams {
    pub r_cluster: f32,
    /// Maximum velocity angle between group mates, radians.
    pub theta_cluster: f32,
    pub n_iterations: u32,
    /// Detection runs every `interval` steps.
    pub interval: u32,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            r_cluster: 5.0,
            theta_cluster: 30.0_f32.to_radians(),
            n_iterations: 5,
            interval: 10,
        }
    }
}

/// Goal-directed pull, weighted per type by the profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalParams {
    pub enabled: bool,
    pub position: Vec3,
    pub strength: f32,
}

impl Default for GoalParams {
    fn default() -> Self {
        Self {
            enabled: false,
            position: Vec3::ZERO,
            strength: 2.0,
        }
    }
}

/// Prey fear response: repulsion from nearby live predators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FearParams {
    pub enabled: bool,
    pub range: f32,
    pub strength: f32,
}

impl Default for FearParams {
    fn default() -> Self {
        Self {
            enabled: true,
            range: 15.0,
            strength: 8.0,
        }
    }
}

/// Role-specific behavior profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeProfile {
    /// Multiplies the global alignment gain.
    pub beta_scale: f32,
    /// Per-type noise amplitude, scaled by the global gain.
    pub eta: f32,
    /// Preferred speed before health scaling.
    pub v0: f32,
    pub mass: f32,
    pub fov_enabled: bool,
    /// Full field-of-view cone angle, radians.
    pub fov_angle: f32,
    /// Multiplies the global goal strength; zero disables goal seeking.
    pub goal_weight: f32,
    /// Display color for downstream consumers.
    pub color: [f32; 3],
    pub is_predator: bool,
}

impl TypeProfile {
    #[must_use]
    pub fn default_for(kind: AgentKind) -> Self {
        let fov_angle = 120.0_f32.to_radians();
        match kind {
            AgentKind::Follower => Self {
                beta_scale: 1.5,
                eta: 0.05,
                v0: 1.0,
                mass: 1.0,
                fov_enabled: true,
                fov_angle,
                goal_weight: 0.0,
                color: [0.30, 0.65, 1.00],
                is_predator: false,
            },
            AgentKind::Explorer => Self {
                beta_scale: 0.5,
                eta: 0.30,
                v0: 1.3,
                mass: 0.8,
                fov_enabled: true,
                fov_angle,
                goal_weight: 0.0,
                color: [1.00, 0.75, 0.20],
                is_predator: false,
            },
            AgentKind::Leader => Self {
                beta_scale: 1.0,
                eta: 0.15,
                v0: 1.4,
                mass: 1.2,
                fov_enabled: true,
                fov_angle,
                goal_weight: 1.0,
                color: [0.35, 0.85, 0.40],
                is_predator: false,
            },
            AgentKind::Predator => Self {
                beta_scale: 0.0,
                eta: 0.10,
                v0: 1.3,
                mass: 1.5,
                fov_enabled: true,
                fov_angle,
                goal_weight: 0.0,
                color: [0.95, 0.25, 0.25],
                is_predator: true,
            },
        }
    }
}

/// Read-only per-type profile table, indexed by [`AgentKind`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileTable(pub [TypeProfile; AgentKind::COUNT]);

impl Default for ProfileTable {
    fn default() -> Self {
        Self([
            TypeProfile::default_for(AgentKind::Follower),
            TypeProfile::default_for(AgentKind::Explorer),
            TypeProfile::default_for(AgentKind::Leader),
            TypeProfile::default_for(AgentKind::Predator),
        ])
    }
}

impl Index<AgentKind> for ProfileTable {
    type Output = TypeProfile;

    fn index(&self, kind: AgentKind) -> &TypeProfile {
        &self.0[kind.index()]
    }
}

/// Full parameter block; replaced atomically between steps on update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    pub dimensions: Dimensionality,
    pub morse: MorseParams,
    pub rayleigh: RayleighParams,
    pub alignment: AlignmentParams,
    pub noise: NoiseParams,
    pub repulsion: SoftRepulsionParams,
    pub boundary: BoundaryParams,
    pub foraging: ForagingParams,
    pub predation: PredationParams,
    pub grouping: GroupingParams,
    pub goal: GoalParams,
    pub fear: FearParams,
    /// Hard speed cap as a multiple of the health-scaled preferred speed.
    pub speed_cap_factor: f32,
    pub profiles: ProfileTable,
}

impl EngineParams {
    /// Grid cell edge derived from the interaction cut-off.
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        2.0 * self.morse.rc
    }

    /// Minimum-image displacement under the current boundary mode.
    #[must_use]
    pub fn displacement(&self, from: Vec3, to: Vec3) -> Vec3 {
        let d = to - from;
        if self.boundary.mode == BoundaryMode::Periodic {
            let b = self.boundary.box_size;
            d - b * (d / b).round()
        } else {
            d
        }
    }

    /// Validate the block; nothing is mutated on failure.
    pub fn validate(&self) -> Result<(), EngineError> {
        fn positive(v: f32) -> bool {
            v.is_finite() && v > 0.0
        }
        fn non_negative(v: f32) -> bool {
            v.is_finite() && v >= 0.0
        }

        let m = &self.morse;
        if !positive(m.rc) || !positive(m.la) || !positive(m.lr) {
            return Err(EngineError::InvalidConfig(
                "morse rc, la, and lr must be positive",
            ));
        }
        if !m.ca.is_finite() || !m.cr.is_finite() {
            return Err(EngineError::InvalidConfig(
                "morse coefficients must be finite",
            ));
        }
        if !self.rayleigh.alpha.is_finite() || !positive(self.rayleigh.v0) {
            return Err(EngineError::InvalidConfig(
                "rayleigh alpha must be finite and v0 positive",
            ));
        }
        if !self.alignment.beta.is_finite() || !non_negative(self.noise.eta) {
            return Err(EngineError::InvalidConfig(
                "alignment beta must be finite and noise eta non-negative",
            ));
        }
        if !non_negative(self.repulsion.min_dist) || !non_negative(self.repulsion.strength) {
            return Err(EngineError::InvalidConfig(
                "soft repulsion parameters must be non-negative",
            ));
        }
        if !positive(self.boundary.box_size) || !non_negative(self.boundary.wall_stiffness) {
            return Err(EngineError::InvalidConfig(
                "box_size must be positive and wall_stiffness non-negative",
            ));
        }

        let f = &self.foraging;
        if !positive(f.energy_max)
            || !positive(f.initial_energy)
            || f.initial_energy > f.energy_max
        {
            return Err(EngineError::InvalidConfig(
                "initial_energy must be in (0, energy_max]",
            ));
        }
        if !non_negative(f.energy_threshold)
            || !non_negative(f.consumption_per_step)
            || !non_negative(f.movement_drain)
            || !non_negative(f.foraging_strength)
            || !positive(f.conversion_efficiency)
        {
            return Err(EngineError::InvalidConfig(
                "foraging rates must be non-negative and conversion positive",
            ));
        }
        let h = &f.health;
        if !(h.healthy_above > h.tired_above && h.tired_above > h.weak_above && h.weak_above >= 0.0)
        {
            return Err(EngineError::InvalidConfig(
                "health band thresholds must be strictly descending",
            ));
        }
        for scale in [h.tired_speed, h.weak_speed, h.dying_speed] {
            if !(scale > 0.0 && scale <= 1.0) {
                return Err(EngineError::InvalidConfig(
                    "health band speed multipliers must be in (0, 1]",
                ));
            }
        }

        let p = &self.predation;
        if !positive(p.hunt_range) || !positive(p.attack_radius) {
            return Err(EngineError::InvalidConfig(
                "predation ranges must be positive",
            ));
        }
        if !non_negative(p.energy_reward) || !non_negative(p.failure_cost) {
            return Err(EngineError::InvalidConfig(
                "predation energy transfers must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&p.min_rate)
            || !(0.0..=1.0).contains(&p.max_rate)
            || p.min_rate > p.max_rate
        {
            return Err(EngineError::InvalidConfig(
                "predation rate clamp must satisfy 0 <= min <= max <= 1",
            ));
        }

        let g = &self.grouping;
        if !positive(g.r_cluster) || !positive(g.theta_cluster) {
            return Err(EngineError::InvalidConfig(
                "grouping thresholds must be positive",
            ));
        }
        if g.n_iterations == 0 || g.interval == 0 {
            return Err(EngineError::InvalidConfig(
                "grouping iterations and interval must be positive",
            ));
        }

        if !non_negative(self.goal.strength)
            || !positive(self.fear.range)
            || !non_negative(self.fear.strength)
        {
            return Err(EngineError::InvalidConfig(
                "goal and fear parameters must be non-negative (fear range positive)",
            ));
        }
        if !(self.speed_cap_factor.is_finite() && self.speed_cap_factor >= 1.0) {
            return Err(EngineError::InvalidConfig(
                "speed_cap_factor must be at least 1",
            ));
        }

        for profile in &self.profiles.0 {
            if !positive(profile.v0) || !positive(profile.mass) {
                return Err(EngineError::InvalidConfig(
                    "profile v0 and mass must be positive",
                ));
            }
            if !non_negative(profile.eta)
                || !non_negative(profile.beta_scale)
                || !non_negative(profile.goal_weight)
            {
                return Err(EngineError::InvalidConfig(
                    "profile gains must be non-negative",
                ));
            }
            if !(profile.fov_angle > 0.0 && profile.fov_angle <= std::f32::consts::TAU) {
                return Err(EngineError::InvalidConfig(
                    "profile fov_angle must be in (0, 2*pi]",
                ));
            }
        }
        Ok(())
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            dimensions: Dimensionality::default(),
            morse: MorseParams::default(),
            rayleigh: RayleighParams::default(),
            alignment: AlignmentParams::default(),
            noise: NoiseParams::default(),
            repulsion: SoftRepulsionParams::default(),
            boundary: BoundaryParams::default(),
            foraging: ForagingParams::default(),
            predation: PredationParams::default(),
            grouping: GroupingParams::default(),
            goal: GoalParams::default(),
            fear: FearParams::default(),
            speed_cap_factor: 3.0,
            profiles: ProfileTable::default(),
        }
    }
}
