//! End-to-end dynamics scenarios: pair forces, alignment convergence,
//! speed anchoring, goal seeking, and health-scaled locomotion.

use glam::Vec3;
use murmuration_core::{
    AgentKind, BoundaryMode, Capacities, Engine, EngineParams,
};

/// Parameters with every force channel switched off; scenarios re-enable
/// exactly what they exercise.
fn quiescent_params() -> EngineParams {
    let mut params = EngineParams::default();
    params.morse.ca = 0.0;
    params.morse.cr = 0.0;
    params.rayleigh.alpha = 0.0;
    params.alignment.beta = 0.0;
    params.noise.eta = 0.0;
    params.repulsion.min_dist = 0.0;
    params.fear.enabled = false;
    params.foraging.consumption_per_step = 0.0;
    params.foraging.movement_drain = 0.0;
    for profile in &mut params.profiles.0 {
        profile.fov_enabled = false;
    }
    params
}

fn pair_engine(params: EngineParams, a: Vec3, b: Vec3) -> Engine {
    let mut engine = Engine::new(
        params,
        &[AgentKind::Follower, AgentKind::Follower],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(0.0, 1);
    let columns = engine.columns_mut();
    columns.positions_mut()[0] = a;
    columns.positions_mut()[1] = b;
    columns.velocities_mut()[0] = Vec3::ZERO;
    columns.velocities_mut()[1] = Vec3::ZERO;
    engine
}

fn pair_separation(engine: &Engine) -> f32 {
    let positions = engine.columns().positions();
    engine
        .params()
        .displacement(positions[0], positions[1])
        .length()
}

#[test]
fn morse_pair_repels_at_short_range() {
    let mut params = quiescent_params();
    params.morse = murmuration_core::MorseParams {
        ca: 1.5,
        cr: 2.0,
        la: 2.5,
        lr: 0.5,
        rc: 15.0,
    };
    params.boundary.box_size = 100.0;
    let mut engine = pair_engine(
        params,
        Vec3::new(0.15, 0.0, 0.0),
        Vec3::new(-0.15, 0.0, 0.0),
    );
    assert!((pair_separation(&engine) - 0.3).abs() < 1e-6);

    engine.step(0.01);

    assert!(
        pair_separation(&engine) > 0.3,
        "short-range pair should separate, got {}",
        pair_separation(&engine)
    );
}

#[test]
fn morse_pair_attracts_at_intermediate_range() {
    let mut params = quiescent_params();
    params.morse = murmuration_core::MorseParams {
        ca: 1.5,
        cr: 2.0,
        la: 2.5,
        lr: 0.5,
        rc: 15.0,
    };
    params.boundary.box_size = 100.0;
    let mut engine = pair_engine(
        params,
        Vec3::new(2.5, 0.0, 0.0),
        Vec3::new(-2.5, 0.0, 0.0),
    );

    engine.step(0.01);

    assert!(
        pair_separation(&engine) < 5.0,
        "mid-range pair should approach, got {}",
        pair_separation(&engine)
    );
}

#[test]
fn alignment_drives_polarization_up() {
    let mut params = quiescent_params();
    params.alignment.beta = 2.0;
    params.boundary.box_size = 50.0;
    params.profiles.0[AgentKind::Follower.index()].beta_scale = 1.0;

    let mut engine = Engine::new(
        params,
        &[AgentKind::Follower; 10],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(5.0, 2024);
    let initial = engine.diagnostics().polarization;

    engine.run(500, 0.05);

    let polarization = engine.diagnostics().polarization;
    assert_eq!(engine.alive_count(), 10);
    assert!(
        polarization > 0.9,
        "velocity consensus should emerge: started at {initial}, ended at {polarization}"
    );
}

#[test]
fn rayleigh_drive_anchors_mean_speed() {
    let mut params = quiescent_params();
    params.rayleigh.alpha = 2.0;
    params.profiles.0[AgentKind::Follower.index()].v0 = 1.0;

    let mut engine = Engine::new(
        params,
        &[AgentKind::Follower; 100],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(5.0, 11);
    {
        // Spread initial speeds across (0, 5]; directions stay as seeded.
        let columns = engine.columns_mut();
        for (i, v) in columns.velocities_mut().iter_mut().enumerate() {
            let speed = 5.0 * (i as f32 + 1.0) / 100.0;
            *v = v.normalize() * speed;
        }
    }

    engine.run(2000, 0.01);

    let mean_speed = engine.diagnostics().mean_speed;
    assert!(
        (mean_speed - 1.0).abs() < 0.05,
        "speeds should anchor at v0: mean {mean_speed}"
    );
}

#[test]
fn speed_cap_holds_across_a_run() {
    let mut params = quiescent_params();
    params.rayleigh.alpha = 2.0;
    params.noise.eta = 1.0;
    for profile in &mut params.profiles.0 {
        profile.eta = 0.2;
    }
    params.speed_cap_factor = 2.0;

    let mut engine = Engine::new(
        params,
        &[AgentKind::Explorer; 24],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(5.0, 77);
    let cap = 2.0 * engine.params().profiles[AgentKind::Explorer].v0;

    for _ in 0..50 {
        engine.step(0.02);
        for (i, v) in engine.columns().velocities().iter().enumerate() {
            if engine.columns().alive()[i] {
                assert!(
                    v.length() <= cap + 1e-4,
                    "agent {i} exceeded the cap: {}",
                    v.length()
                );
            }
        }
    }
}

#[test]
fn leaders_seek_the_goal() {
    let mut params = quiescent_params();
    params.rayleigh.alpha = 2.0;
    params.goal.enabled = true;
    params.goal.position = Vec3::new(15.0, 15.0, 10.0);
    params.goal.strength = 2.0;

    let kinds = [
        AgentKind::Leader,
        AgentKind::Leader,
        AgentKind::Follower,
        AgentKind::Follower,
    ];
    let mut engine = Engine::new(params, &kinds, Capacities::default()).unwrap();
    engine.initialize(2.0, 5);
    let start: Vec3 = engine.columns().positions()[0];
    let start_dist = engine
        .params()
        .displacement(start, engine.params().goal.position)
        .length();

    engine.run(700, 0.02);

    let end_dist = engine
        .params()
        .displacement(
            engine.columns().positions()[0],
            engine.params().goal.position,
        )
        .length();
    assert!(
        end_dist < start_dist * 0.5,
        "leader should close on the goal: {start_dist} -> {end_dist}"
    );
}

#[test]
fn dying_agents_move_at_reduced_speed() {
    let mut params = quiescent_params();
    params.rayleigh.alpha = 2.0;
    let v0 = params.profiles.0[AgentKind::Follower.index()].v0;

    let mut engine = Engine::new(
        params,
        &[AgentKind::Follower; 4],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(3.0, 9);
    for e in engine.columns_mut().energies_mut() {
        // Below the lowest band threshold; no drain, so it stays there.
        *e = 10.0;
    }

    engine.run(400, 0.01);

    let expected = v0 * engine.params().foraging.health.dying_speed;
    for (i, v) in engine.columns().velocities().iter().enumerate() {
        assert!(
            (v.length() - expected).abs() < 0.05,
            "agent {i} should crawl at {expected}, got {}",
            v.length()
        );
    }
}

#[test]
fn reflective_box_confines_the_swarm() {
    let mut params = quiescent_params();
    params.rayleigh.alpha = 2.0;
    params.boundary.mode = BoundaryMode::Reflective;
    params.boundary.box_size = 20.0;

    let mut engine = Engine::new(
        params,
        &[AgentKind::Explorer; 16],
        Capacities::default(),
    )
    .unwrap();
    engine.initialize(8.0, 13);
    engine.run(500, 0.05);

    for (i, p) in engine.columns().positions().iter().enumerate() {
        if engine.columns().alive()[i] {
            assert!(
                p.abs().max_element() <= 10.0 + 1e-4,
                "agent {i} escaped the box at {p:?}"
            );
        }
    }
}

#[test]
fn obstacles_bend_trajectories() {
    let mut params = quiescent_params();
    params.rayleigh.alpha = 2.0;
    params.boundary.box_size = 60.0;

    let kinds = [AgentKind::Follower; 6];
    let mut with_obstacle = Engine::new(params, &kinds, Capacities::default()).unwrap();
    let mut without = Engine::new(params, &kinds, Capacities::default()).unwrap();
    with_obstacle
        .add_obstacle(murmuration_core::ObstacleConfig::new(
            murmuration_core::ObstacleShape::Sphere {
                center: Vec3::ZERO,
                radius: 4.0,
            },
        ))
        .unwrap();
    with_obstacle.initialize(10.0, 21);
    without.initialize(10.0, 21);
    for engine in [&mut with_obstacle, &mut without] {
        let columns = engine.columns_mut();
        columns.positions_mut()[0] = Vec3::new(8.0, 0.1, 0.0);
        columns.velocities_mut()[0] = Vec3::new(-1.0, 0.0, 0.0);
    }

    with_obstacle.run(200, 0.02);
    without.run(200, 0.02);

    assert_ne!(
        with_obstacle.snapshot().positions,
        without.snapshot().positions,
        "an obstacle in the arena must perturb trajectories"
    );
    // Nobody ends up deep inside the obstacle.
    for (i, p) in with_obstacle.columns().positions().iter().enumerate() {
        if with_obstacle.columns().alive()[i] {
            assert!(
                p.length() > 3.0,
                "agent {i} sits inside the obstacle at {p:?}"
            );
        }
    }
}
