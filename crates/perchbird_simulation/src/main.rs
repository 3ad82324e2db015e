//! Headless симуляция PERCHBIRD
//!
//! Без рендера и физики: птица летает по waypoint'ам, садится на руку,
//! получает удар и снова взлетает. Мотор — на ScriptedDriver.

use bevy::prelude::*;
use perchbird_simulation::hardware::ScriptedDriver;
use perchbird_simulation::{
    create_headless_app, run_fixed_tick, spawn_bird, spawn_hand, spawn_perch, spawn_waypoint, BirdCommand,
    BirdCommandKind, BirdSpawn, BirdState, ConnectionConfig, ConnectionSession, ContactPhase, HandContact,
    MoodLevel, WaypointPools,
};

fn main() {
    let seed = 42;
    println!("Starting PERCHBIRD headless simulation (seed: {})", seed);

    let mut app = create_headless_app(seed);
    let world = app.world_mut();

    let mut session = ConnectionSession::new(Box::new(ScriptedDriver::healthy()), ConnectionConfig::default());
    session.start();
    world.insert_resource(session);

    let ring: Vec<Entity> = (0..6)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / 6.0;
            spawn_waypoint(world, Vec3::new(angle.cos() * 8.0, 3.0, angle.sin() * 8.0))
        })
        .collect();
    let perch = spawn_perch(world, Transform::from_xyz(0.0, 1.4, 0.5));
    let hand = spawn_hand(world, Vec3::new(0.0, 1.2, 0.0));

    let bird = spawn_bird(
        world,
        BirdSpawn {
            transform: Transform::from_xyz(0.0, 3.0, 0.0),
            pools: WaypointPools {
                friendly: ring.clone(),
                neutral: ring.clone(),
                angry: ring,
            },
            perch: Some(perch),
            ..Default::default()
        },
    );

    // Сценарий: (тик, действие)
    for tick in 0..1800u32 {
        let world = app.world_mut();
        match tick {
            300 => {
                world.send_event(BirdCommand {
                    bird,
                    kind: BirdCommandKind::RequestPerch,
                });
            }
            900 => {
                // Резкий взмах рукой по сидящей птице
                world.entity_mut(hand).insert(Transform::from_xyz(0.0, 1.4, 0.5));
                world.send_event(HandContact {
                    bird,
                    other: hand,
                    phase: ContactPhase::Entered,
                });
            }
            960 => {
                world.send_event(HandContact {
                    bird,
                    other: hand,
                    phase: ContactPhase::Exited,
                });
            }
            1200 => {
                world.send_event(BirdCommand {
                    bird,
                    kind: BirdCommandKind::RequestFlight,
                });
            }
            _ => {}
        }

        run_fixed_tick(world);

        if tick % 100 == 0 {
            let state = world.get::<BirdState>(bird).copied();
            let position = world.get::<Transform>(bird).map(|t| t.translation);
            let mood = world.get::<MoodLevel>(bird).map(MoodLevel::level);
            println!("Tick {}: {:?} at {:.2?}, mood {:?}", tick, state, position, mood);
        }
    }

    println!("Simulation complete!");
}
