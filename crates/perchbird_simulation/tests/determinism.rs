//! Тесты детерминизма
//!
//! Один seed → одинаковые маршруты, дуги и позы птиц

use bevy::prelude::*;
use perchbird_simulation::{
    create_headless_app, run_fixed_ticks, spawn_bird, spawn_waypoint, world_snapshot, BirdSpawn, BirdState,
    MoodEvent, MoodLevel, MoodNudge, WaypointPools,
};

/// Несколько птиц летают по общему кольцу waypoint'ов
fn run_simulation(seed: u64, bird_count: usize, tick_count: u32) -> Vec<u8> {
    let mut app = create_headless_app(seed);
    let world = app.world_mut();

    let friendly: Vec<Entity> = (0..5)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / 5.0;
            spawn_waypoint(world, Vec3::new(angle.cos() * 10.0, 4.0, angle.sin() * 10.0))
        })
        .collect();
    let angry: Vec<Entity> = (0..3)
        .map(|i| spawn_waypoint(world, Vec3::new(-15.0 + i as f32 * 15.0, 8.0, -12.0)))
        .collect();

    let birds: Vec<Entity> = (0..bird_count)
        .map(|i| {
            spawn_bird(
                world,
                BirdSpawn {
                    transform: Transform::from_xyz(i as f32, 2.0, 0.0),
                    pools: WaypointPools {
                        friendly: friendly.clone(),
                        neutral: friendly.clone(),
                        angry: angry.clone(),
                    },
                    ..Default::default()
                },
            )
        })
        .collect();

    run_fixed_ticks(app.world_mut(), tick_count / 2);

    // Первую птицу злим — она переключается на другой пул
    for _ in 0..4 {
        app.world_mut().send_event(MoodEvent {
            bird: birds[0],
            nudge: MoodNudge::Punch,
        });
    }
    run_fixed_ticks(app.world_mut(), tick_count / 2);

    assert!(app.world().get::<MoodLevel>(birds[0]).unwrap().is_angry());
    for bird in &birds {
        assert_eq!(app.world().get::<BirdState>(*bird), Some(&BirdState::Flying));
    }

    world_snapshot::<Transform>(app.world_mut())
}

#[test]
fn test_determinism_same_seed() {
    const SEED: u64 = 12345;

    let snapshot1 = run_simulation(SEED, 4, 1200);
    let snapshot2 = run_simulation(SEED, 4, 1200);

    assert_eq!(
        snapshot1, snapshot2,
        "Симуляция с одинаковым seed ({}) дала разные результаты!",
        SEED
    );
}

#[test]
fn test_determinism_multiple_runs() {
    let snapshots: Vec<_> = (0..3).map(|_| run_simulation(42, 3, 600)).collect();

    for (i, snapshot) in snapshots.iter().enumerate().skip(1) {
        assert_eq!(snapshots[0], *snapshot, "Прогон {} дал результат отличный от прогона 0", i);
    }
}

#[test]
fn test_different_seeds_diverge() {
    let snapshot1 = run_simulation(1, 2, 600);
    let snapshot2 = run_simulation(2, 2, 600);

    assert_ne!(snapshot1, snapshot2, "Разные seed должны давать разные маршруты");
}
