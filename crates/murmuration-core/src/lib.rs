//! Heterogeneous agent-based flocking simulation engine.
//!
//! Advances N self-propelled agents of distinct roles (followers, explorers,
//! leaders, predators) through a bounded 2D/3D box under Morse pair forces,
//! Cucker–Smale alignment, a Rayleigh active drive, Vicsek rotational noise,
//! goal seeking, obstacle avoidance, foraging on depletable resources, and
//! probabilistic predation.
//!
//! A step is a fixed pipeline of data-parallel phases over the agent arena:
//! grid rebuild, target selection, force accumulation, Velocity-Verlet
//! drift with boundary resolution, a second force pass, the closing kick
//! with noise and the speed cap, resource arbitration, attacks,
//! regeneration, energy accounting, and (periodically) group detection.
//! Phases are strictly ordered; within a phase every agent index has a
//! single writer, so runs are reproducible for a fixed seed regardless of
//! the thread count.
//!
//! The engine is library-shaped: external surfaces pull [`Snapshot`]s and
//! push [`EngineCommand`]s between steps; they never hold live references
//! into the arena.

mod arena;
mod command;
mod forces;
mod foraging;
mod groups;
mod integrator;
mod obstacles;
mod params;
mod predation;
mod resources;
mod rng;
mod snapshot;

pub use arena::{
    AgentColumns, AgentKind, DEAD_SENTINEL, HealthBand, NO_CELL, NO_GROUP, NO_TARGET,
};
pub use command::{
    CommandReceiver, CommandSender, EngineCommand, create_command_bus, drain_pending_commands,
};
pub use groups::GroupAggregate;
pub use obstacles::{Axis, ObstacleConfig, ObstacleShape, ObstacleTable};
pub use params::{
    AlignmentParams, BoundaryMode, BoundaryParams, Dimensionality, EngineParams, FearParams,
    ForagingParams, GoalParams, GroupingParams, HealthBandParams, MorseParams, NoiseParams,
    PredationParams, ProfileTable, RayleighParams, SoftRepulsionParams, TypeProfile,
};
pub use predation::success_probability;
pub use resources::{ResourceConfig, ResourceTable};
pub use rng::Rng32;
pub use snapshot::{Diagnostics, ResourceView, Snapshot};

use glam::Vec3;
use murmuration_index::{CellGrid, SpatialIndex};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced at construction and mutation boundaries.
///
/// A step never fails: numerical degeneracies inside the pipeline are
/// handled as local no-ops.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A configuration value cannot be used; nothing was mutated.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A fixed-capacity arena is full; nothing was mutated.
    #[error("{kind} capacity exceeded (max {max})")]
    CapacityExceeded { kind: &'static str, max: usize },
    /// The referenced id was never allocated.
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: usize },
}

/// Fixed arena capacities declared at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacities {
    pub max_groups: usize,
    pub max_resources: usize,
    pub max_obstacles: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            max_groups: 32,
            max_resources: 32,
            max_obstacles: 32,
        }
    }
}

/// The simulation engine: owns the arena, the environment tables, the
/// spatial grid, and the step counter.
pub struct Engine {
    params: EngineParams,
    capacities: Capacities,
    columns: AgentColumns,
    grid: CellGrid,
    resources: ResourceTable,
    obstacles: ObstacleTable,
    groups: Vec<GroupAggregate>,
    step_counter: u64,
    running: bool,
    seed: u64,
    init_extent: f32,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("step", &self.step_counter)
            .field("agents", &self.columns.len())
            .field("alive", &self.columns.alive_count())
            .field("resources", &self.resources.len())
            .field("obstacles", &self.obstacles.len())
            .field("running", &self.running)
            .finish()
    }
}

impl Engine {
    /// Build an engine for a fixed population of the given roles.
    pub fn new(
        params: EngineParams,
        kinds: &[AgentKind],
        capacities: Capacities,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        if kinds.is_empty() {
            return Err(EngineError::InvalidConfig(
                "population must contain at least one agent",
            ));
        }
        if capacities.max_groups == 0 {
            return Err(EngineError::InvalidConfig("max_groups must be positive"));
        }
        let grid = Self::build_grid(&params)?;
        Ok(Self {
            columns: AgentColumns::new(kinds, &params.profiles),
            resources: ResourceTable::new(capacities.max_resources),
            obstacles: ObstacleTable::new(capacities.max_obstacles),
            groups: Vec::new(),
            grid,
            params,
            capacities,
            step_counter: 0,
            running: true,
            seed: 0,
            init_extent: 0.0,
        })
    }

    fn build_grid(params: &EngineParams) -> Result<CellGrid, EngineError> {
        CellGrid::new(
            params.cell_size(),
            params.boundary.box_size,
            params.boundary.mode == BoundaryMode::Periodic,
        )
        .map_err(|_| EngineError::InvalidConfig("grid cell size and box must be positive"))
    }

    /// Scatter agents in the init box and sample velocities on the sphere
    /// (circle in 2D) at each type's preferred speed.
    pub fn initialize(&mut self, init_extent: f32, seed: u64) {
        self.seed = seed;
        self.init_extent = init_extent;
        self.step_counter = 0;
        self.groups.clear();
        self.resources.reset();

        let mut rng = SmallRng::seed_from_u64(seed);
        let planar = self.params.dimensions == Dimensionality::Two;
        let foraging = self.params.foraging;
        let cooldown = self.params.predation.cooldown.min(i32::MAX as u32) as i32;

        for i in 0..self.columns.len() {
            let profile = self.params.profiles[self.columns.kinds[i]];
            let mut coord = |rng: &mut SmallRng| {
                if init_extent > 0.0 {
                    rng.random_range(-init_extent..init_extent)
                } else {
                    0.0
                }
            };
            let x = coord(&mut rng);
            let y = coord(&mut rng);
            let z = if planar { 0.0 } else { coord(&mut rng) };
            self.columns.positions[i] = Vec3::new(x, y, z);

            let heading = if planar {
                let angle = rng.random_range(0.0..std::f32::consts::TAU);
                Vec3::new(angle.cos(), angle.sin(), 0.0)
            } else {
                sample_unit_vector(&mut rng)
            };
            self.columns.velocities[i] = heading * profile.v0;
            self.columns.accelerations[i] = Vec3::ZERO;
            self.columns.masses[i] = profile.mass;
            self.columns.energies[i] = foraging.initial_energy;
            self.columns.alive[i] = true;
            self.columns.health[i] = HealthBand::classify(foraging.initial_energy, &foraging.health);
            self.columns.target_resource[i] = NO_TARGET;
            self.columns.target_prey[i] = NO_TARGET;
            self.columns.has_target[i] = false;
            self.columns.group_ids[i] = NO_GROUP;
            self.columns.cell_ids[i] = NO_CELL;
            self.columns.rng_states[i] = Rng32::seeded(seed, i).state();
            self.columns.last_attack_step[i] = -cooldown;
        }
        debug!(agents = self.columns.len(), seed, "arena initialized");
    }

    /// Re-seed and re-randomise from the stored seed; the step counter and
    /// resource amounts rewind with it.
    pub fn reset(&mut self) {
        self.initialize(self.init_extent, self.seed);
    }

    /// Swap the parameter block. Applies between steps; a change to the box
    /// or cut-off rebuilds the spatial grid.
    pub fn update_params(&mut self, params: EngineParams) -> Result<(), EngineError> {
        params.validate()?;
        let grid_changed = params.cell_size() != self.params.cell_size()
            || params.boundary.box_size != self.params.boundary.box_size
            || (params.boundary.mode == BoundaryMode::Periodic)
                != (self.params.boundary.mode == BoundaryMode::Periodic);
        if grid_changed {
            self.grid = Self::build_grid(&params)?;
        }
        for i in 0..self.columns.len() {
            self.columns.masses[i] = params.profiles[self.columns.kinds[i]].mass;
        }
        self.params = params;
        debug!("parameter block swapped");
        Ok(())
    }

    /// Advance one step of the pipeline.
    pub fn step(&mut self, dt: f32) {
        self.rebuild_grid();
        foraging::select_targets(&mut self.columns, &self.resources, &self.params);
        predation::select_prey(&mut self.columns, &self.params);

        forces::accumulate(
            &mut self.columns,
            &self.grid,
            &self.resources,
            &self.obstacles,
            &self.params,
        );
        integrator::drift(&mut self.columns, &self.params, dt);

        self.rebuild_grid();
        forces::accumulate(
            &mut self.columns,
            &self.grid,
            &self.resources,
            &self.obstacles,
            &self.params,
        );
        integrator::kick(&mut self.columns, &self.params, dt);

        foraging::consume(&mut self.columns, &mut self.resources, &self.params);
        predation::attack(&mut self.columns, &self.params, self.step_counter);
        self.resources.regenerate();
        foraging::update_energy(&mut self.columns, &self.params);

        if self.step_counter % u64::from(self.params.grouping.interval) == 0 {
            self.groups = groups::update(
                &mut self.columns,
                &self.grid,
                &self.params,
                self.capacities.max_groups,
            );
        }

        self.step_counter += 1;
        self.columns.debug_assert_coherent();
    }

    /// Convenience driver for fixed-length runs.
    pub fn run(&mut self, steps: u32, dt: f32) {
        for _ in 0..steps {
            self.step(dt);
        }
    }

    /// Fixed-length run that reports diagnostics every `log_every` steps.
    pub fn run_logged(&mut self, steps: u32, dt: f32, log_every: u32) {
        for n in 0..steps {
            self.step(dt);
            if log_every > 0 && n % log_every == 0 {
                let stats = self.diagnostics();
                debug!(
                    step = self.step_counter,
                    mean_speed = stats.mean_speed,
                    polarization = stats.polarization,
                    rg = stats.rg,
                    alive = self.columns.alive_count(),
                    "diagnostics"
                );
            }
        }
    }

    fn rebuild_grid(&mut self) {
        let positions: Vec<[f32; 3]> = self
            .columns
            .positions
            .iter()
            .map(|p| p.to_array())
            .collect();
        // The grid configuration was validated at construction; a rebuild
        // over finite positions cannot fail.
        let _ = self.grid.rebuild(&positions, &self.columns.alive);
        for i in 0..self.columns.len() {
            self.columns.cell_ids[i] = self
                .grid
                .linear_cell_of(i)
                .map_or(NO_CELL, |cell| cell as i32);
        }
    }

    /// Allocate a resource; fails when the declared capacity is reached.
    pub fn add_resource(&mut self, config: ResourceConfig) -> Result<usize, EngineError> {
        self.resources.add(config)
    }

    /// Retire a resource.
    pub fn remove_resource(&mut self, id: usize) -> Result<(), EngineError> {
        self.resources.remove(id)
    }

    /// Move a resource (dynamic environments).
    pub fn update_resource_position(&mut self, id: usize, position: Vec3) -> Result<(), EngineError> {
        self.resources.update_position(id, position)
    }

    /// Allocate an obstacle; fails when the declared capacity is reached.
    pub fn add_obstacle(&mut self, config: ObstacleConfig) -> Result<usize, EngineError> {
        self.obstacles.add(config)
    }

    /// Retire an obstacle.
    pub fn remove_obstacle(&mut self, id: usize) -> Result<(), EngineError> {
        self.obstacles.remove(id)
    }

    /// Move an obstacle (dynamic environments).
    pub fn update_obstacle_position(&mut self, id: usize, center: Vec3) -> Result<(), EngineError> {
        self.obstacles.update_position(id, center)
    }

    /// Point-in-time copy of the full engine state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.step_counter, &self.columns, &self.resources, &self.groups)
    }

    /// Aggregate statistics over live agents.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        snapshot::diagnostics(&self.columns, self.groups.len() as u32)
    }

    /// Number of live agents.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.columns.alive_count()
    }

    /// Number of groups found by the last detection pass.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Aggregates from the last detection pass.
    #[must_use]
    pub fn get_groups(&self) -> &[GroupAggregate] {
        &self.groups
    }

    /// Steps advanced since the last initialize/reset.
    #[must_use]
    pub const fn step_count(&self) -> u64 {
        self.step_counter
    }

    /// Whether the driver should be stepping.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Toggle stepping; commands use this between steps.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Current parameter block.
    #[must_use]
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Declared capacities.
    #[must_use]
    pub const fn capacities(&self) -> Capacities {
        self.capacities
    }

    /// Read-only access to the agent columns.
    #[must_use]
    pub fn columns(&self) -> &AgentColumns {
        &self.columns
    }

    /// Mutable access to the agent columns, for scenario setup and tests.
    #[must_use]
    pub fn columns_mut(&mut self) -> &mut AgentColumns {
        &mut self.columns
    }

    /// Read-only access to the resource table.
    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Read-only access to the obstacle table.
    #[must_use]
    pub fn obstacles(&self) -> &ObstacleTable {
        &self.obstacles
    }
}

/// Uniform direction on the unit sphere (Marsaglia rejection).
fn sample_unit_vector(rng: &mut SmallRng) -> Vec3 {
    loop {
        let u: f32 = rng.random_range(-1.0..1.0);
        let v: f32 = rng.random_range(-1.0..1.0);
        let s = u * u + v * v;
        if s < 1.0 && s > 1.0e-12 {
            let f = (1.0 - s).sqrt();
            return Vec3::new(2.0 * u * f, 2.0 * v * f, 1.0 - 2.0 * s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_population() -> Vec<AgentKind> {
        let mut kinds = vec![AgentKind::Follower; 10];
        kinds.extend([AgentKind::Explorer; 4]);
        kinds.extend([AgentKind::Leader; 2]);
        kinds.push(AgentKind::Predator);
        kinds
    }

    #[test]
    fn construction_rejects_empty_population() {
        let err = Engine::new(EngineParams::default(), &[], Capacities::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn construction_rejects_invalid_params() {
        let mut params = EngineParams::default();
        params.boundary.box_size = 0.0;
        let err =
            Engine::new(params, &[AgentKind::Follower], Capacities::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn initialize_is_reproducible() {
        let kinds = mixed_population();
        let mut a = Engine::new(EngineParams::default(), &kinds, Capacities::default()).unwrap();
        let mut b = Engine::new(EngineParams::default(), &kinds, Capacities::default()).unwrap();
        a.initialize(10.0, 0xFEED);
        b.initialize(10.0, 0xFEED);
        assert_eq!(a.snapshot(), b.snapshot());

        let mut c = Engine::new(EngineParams::default(), &kinds, Capacities::default()).unwrap();
        c.initialize(10.0, 0xBEEF);
        assert_ne!(a.snapshot().positions, c.snapshot().positions);
    }

    #[test]
    fn velocities_start_on_the_preferred_speed_sphere() {
        let kinds = mixed_population();
        let mut engine =
            Engine::new(EngineParams::default(), &kinds, Capacities::default()).unwrap();
        engine.initialize(10.0, 7);
        for (i, v) in engine.columns().velocities().iter().enumerate() {
            let v0 = engine.params().profiles[engine.columns().kinds()[i]].v0;
            assert!(
                (v.length() - v0).abs() < 1e-4,
                "agent {i} started at speed {} instead of {v0}",
                v.length()
            );
        }
    }

    #[test]
    fn planar_runs_stay_planar() {
        let mut params = EngineParams::default();
        params.dimensions = Dimensionality::Two;
        let mut engine = Engine::new(
            params,
            &[AgentKind::Follower; 12],
            Capacities::default(),
        )
        .unwrap();
        engine.initialize(5.0, 3);
        engine.run(20, 0.05);
        for (i, p) in engine.columns().positions().iter().enumerate() {
            if engine.columns().alive()[i] {
                assert_eq!(p.z, 0.0, "agent {i} left the plane");
            }
        }
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let kinds = mixed_population();
        let mut engine =
            Engine::new(EngineParams::default(), &kinds, Capacities::default()).unwrap();
        engine.initialize(10.0, 99);
        let initial = engine.snapshot();
        engine.run(5, 0.02);
        assert_ne!(engine.snapshot().positions, initial.positions);
        engine.reset();
        assert_eq!(engine.snapshot(), initial);
    }

    #[test]
    fn update_params_twice_is_idempotent() {
        let kinds = mixed_population();
        let mut engine =
            Engine::new(EngineParams::default(), &kinds, Capacities::default()).unwrap();
        engine.initialize(10.0, 5);
        let mut params = EngineParams::default();
        params.alignment.beta = 2.5;
        params.morse.rc = 10.0;
        engine.update_params(params).unwrap();
        let after_first = engine.snapshot();
        engine.update_params(params).unwrap();
        assert_eq!(engine.snapshot(), after_first);
    }

    #[test]
    fn capacity_overflow_is_reported_without_mutation() {
        let mut engine = Engine::new(
            EngineParams::default(),
            &[AgentKind::Follower],
            Capacities {
                max_resources: 1,
                ..Capacities::default()
            },
        )
        .unwrap();
        engine
            .add_resource(ResourceConfig::depletable(Vec3::ZERO, 10.0, 2.0))
            .unwrap();
        let err = engine
            .add_resource(ResourceConfig::depletable(Vec3::ONE, 10.0, 2.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { .. }));
        assert_eq!(engine.resources().len(), 1);
    }
}
