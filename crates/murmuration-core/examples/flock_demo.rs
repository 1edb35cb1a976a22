//! Mixed-population demo: followers, explorers, leaders chasing a goal, a
//! couple of predators, and two resource patches.
//!
//! ```sh
//! cargo run --example flock_demo
//! ```

use glam::Vec3;
use murmuration_core::{
    AgentKind, Capacities, Engine, EngineParams, ResourceConfig,
};

fn main() {
    let mut params = EngineParams::default();
    params.goal.enabled = true;
    params.goal.position = Vec3::new(10.0, 10.0, 10.0);

    let mut kinds = vec![AgentKind::Follower; 60];
    kinds.extend(vec![AgentKind::Explorer; 25]);
    kinds.extend(vec![AgentKind::Leader; 10]);
    kinds.extend(vec![AgentKind::Predator; 5]);

    let mut engine = Engine::new(params, &kinds, Capacities::default()).expect("engine");
    engine
        .add_resource(ResourceConfig::renewable(
            Vec3::new(15.0, 15.0, 0.0),
            200.0,
            4.0,
            10.0,
            300.0,
        ))
        .expect("resource");
    engine
        .add_resource(ResourceConfig::depletable(
            Vec3::new(-15.0, -15.0, 0.0),
            500.0,
            5.0,
        ))
        .expect("resource");
    engine.initialize(15.0, 42);

    println!("step | <|v|>  | P     | Rg     | alive | groups");
    for block in 0..10 {
        engine.run(50, 0.02);
        let stats = engine.diagnostics();
        println!(
            "{:>4} | {:.3}  | {:.3} | {:6.2} | {:>5} | {}",
            (block + 1) * 50,
            stats.mean_speed,
            stats.polarization,
            stats.rg,
            engine.alive_count(),
            engine.group_count(),
        );
    }
}
