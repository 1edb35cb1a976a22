//! Whole-engine integration: seeded determinism, grid/position consistency,
//! and snapshot behavior.

use glam::Vec3;
use murmuration_core::{
    AgentKind, Capacities, Engine, EngineParams, ObstacleConfig, ObstacleShape, ResourceConfig,
};
use murmuration_index::{CellGrid, SpatialIndex};

fn mixed_kinds() -> Vec<AgentKind> {
    let mut kinds = vec![AgentKind::Follower; 18];
    kinds.extend([AgentKind::Explorer; 6]);
    kinds.extend([AgentKind::Leader; 3]);
    kinds.extend([AgentKind::Predator; 2]);
    kinds
}

fn populated_engine(seed: u64) -> Engine {
    let mut params = EngineParams::default();
    params.goal.enabled = true;
    params.goal.position = Vec3::new(10.0, -5.0, 0.0);
    let mut engine = Engine::new(params, &mixed_kinds(), Capacities::default()).unwrap();
    engine
        .add_resource(ResourceConfig::renewable(
            Vec3::new(8.0, 8.0, 0.0),
            120.0,
            4.0,
            2.0,
            180.0,
        ))
        .unwrap();
    engine
        .add_resource(ResourceConfig::depletable(
            Vec3::new(-8.0, -8.0, 0.0),
            90.0,
            3.0,
        ))
        .unwrap();
    engine
        .add_obstacle(ObstacleConfig::new(ObstacleShape::Sphere {
            center: Vec3::new(0.0, 12.0, 0.0),
            radius: 3.0,
        }))
        .unwrap();
    engine.initialize(10.0, seed);
    engine
}

#[test]
fn seeded_runs_are_bit_identical() {
    let mut a = populated_engine(0xDEAD_BEEF);
    let mut b = populated_engine(0xDEAD_BEEF);

    for step in 0..60 {
        a.step(0.02);
        b.step(0.02);
        if step % 15 == 0 || step == 59 {
            assert_eq!(
                a.snapshot(),
                b.snapshot(),
                "divergence after step {step}"
            );
        }
    }
}

#[test]
fn different_seeds_diverge() {
    let mut a = populated_engine(1);
    let mut b = populated_engine(2);
    a.run(10, 0.02);
    b.run(10, 0.02);
    assert_ne!(a.snapshot().positions, b.snapshot().positions);
}

#[test]
fn replay_after_reset_matches_the_first_run() {
    let mut engine = populated_engine(0xFACE);
    engine.run(30, 0.02);
    let first = engine.snapshot();

    engine.reset();
    engine.run(30, 0.02);
    assert_eq!(engine.snapshot(), first);
}

#[test]
fn cell_assignments_match_positions_after_stepping() {
    let mut engine = populated_engine(0x51);
    engine.run(25, 0.02);

    let params = *engine.params();
    let mut reference = CellGrid::new(
        params.cell_size(),
        params.boundary.box_size,
        params.boundary.mode == murmuration_core::BoundaryMode::Periodic,
    )
    .unwrap();
    let positions: Vec<[f32; 3]> = engine
        .columns()
        .positions()
        .iter()
        .map(|p| p.to_array())
        .collect();
    reference
        .rebuild(&positions, engine.columns().alive())
        .unwrap();

    for i in 0..engine.columns().len() {
        let recorded = engine.columns().cell_ids()[i];
        match reference.linear_cell_of(i) {
            Some(cell) => assert_eq!(
                recorded, cell as i32,
                "agent {i} grid assignment is stale"
            ),
            None => assert_eq!(recorded, murmuration_core::NO_CELL),
        }
    }
}

#[test]
fn snapshots_do_not_mutate_engine_state() {
    let mut engine = populated_engine(0x7E57);
    engine.run(5, 0.02);
    let before = engine.snapshot();
    let _ = engine.snapshot();
    let _ = engine.diagnostics();
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn all_dead_runs_keep_producing_snapshots() {
    let mut params = EngineParams::default();
    params.foraging.consumption_per_step = 200.0;
    let mut engine = Engine::new(
        params,
        &[AgentKind::Follower; 5],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(5.0, 12);

    engine.step(0.02);
    assert_eq!(engine.alive_count(), 0);

    // The engine keeps stepping and publishing after extinction.
    engine.run(10, 0.02);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.step, 11);
    assert!(snapshot.alive.iter().all(|&a| !a));
    assert_eq!(snapshot.stats.mean_speed, 0.0);
    assert_eq!(snapshot.stats.polarization, 0.0);
}

#[test]
fn wrapped_positions_stay_inside_the_box() {
    let mut params = EngineParams::default();
    params.boundary.box_size = 30.0;
    params.foraging.consumption_per_step = 0.0;
    params.foraging.movement_drain = 0.0;
    let mut engine = Engine::new(
        params,
        &[AgentKind::Explorer; 12],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(14.0, 33);
    engine.run(200, 0.05);

    for (i, p) in engine.columns().positions().iter().enumerate() {
        if engine.columns().alive()[i] {
            assert!(
                p.abs().max_element() <= 15.0 + 1e-4,
                "agent {i} escaped the periodic box at {p:?}"
            );
        }
    }
}

#[test]
fn step_counter_is_monotonic_and_reset_zeroes_it() {
    let mut engine = populated_engine(0xA5);
    assert_eq!(engine.step_count(), 0);
    engine.run(7, 0.02);
    assert_eq!(engine.step_count(), 7);
    engine.reset();
    assert_eq!(engine.step_count(), 0);
}
