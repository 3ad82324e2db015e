//! PERCHBIRD Simulation Core
//!
//! ECS-симуляция птицы на Bevy 0.16:
//! - полёт по Bézier кривым между waypoint'ами (пул по настроению)
//! - заход на движущийся перч (рука игрока) + landing blend
//! - Ragdoll на удар (rapier тела), возврат в полёт с rebase root
//! - мотор лески на USB serial (handshake с ограниченными retry)
//!
//! Все системы — в FixedUpdate (60Hz), одной цепочкой SimulationSet.

use std::time::Duration;

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Публичные модули
pub mod bird;
pub mod config;
pub mod curve;
pub mod flight;
pub mod hardware;
pub mod impact;
pub mod logger;
pub mod mood;
pub mod path;
pub mod ragdoll;

// Re-export базовых типов для удобства
pub use bird::{
    BirdCommand, BirdCommandKind, BirdControls, BirdController, BirdImpact, BirdPlugin, BirdState,
    BirdStateChanged, ControllerInput, ControllerSnapshot,
};
pub use config::{BirdTuning, ConnectionConfig, FlightConfig, HitConfig, MoodConfig, MotorConfig};
pub use curve::{BezierCurve, CurveDegree};
pub use flight::{ArrivedAtPerch, FlightEngine, FlightPlugin, LandingStarted, PerchTarget, TrackedPerch};
pub use hardware::{
    ConnectionCommand, ConnectionSession, ConnectionState, ConnectionStateChanged, HardwarePlugin, MotorCommand,
    SpinDirection,
};
pub use impact::{ContactLatch, ContactPhase, HandContact, HandVelocity, ImpactPlugin, PlayerHand};
pub use mood::{MoodBucket, MoodChanged, MoodEvent, MoodLevel, MoodNudge, MoodPlugin};
pub use path::{Waypoint, WaypointPools};
pub use ragdoll::{AnimatorState, RagdollBody, RagdollRig};

pub use logger::{
    init_logger, log, log_error, log_info, log_warning, set_log_level, set_logger, set_logger_if_needed, LogLevel,
    LogPrinter,
};

/// Порядок систем внутри одного fixed tick
///
/// contacts → mood → settle timers → commands/impacts → flight → arrivals → perch follow → connection
///
/// Timers стоят до Commands/Arrival: timer, заведённый переходом, начинает отсчёт
/// со следующего тика и срабатывает ровно через settle_delay.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    Input,
    Mood,
    Timers,
    Commands,
    Flight,
    Arrival,
    Follow,
    Hardware,
}

/// Главный plugin симуляции (объединяет все подсистемы)
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app
            // Fixed timestep 60Hz для simulation tick
            .insert_resource(Time::<Fixed>::from_hz(60.0))
            // Детерминистичный RNG (seed по умолчанию)
            .insert_resource(DeterministicRng::new(42))
            .configure_sets(
                FixedUpdate,
                (
                    SimulationSet::Input,
                    SimulationSet::Mood,
                    SimulationSet::Timers,
                    SimulationSet::Commands,
                    SimulationSet::Flight,
                    SimulationSet::Arrival,
                    SimulationSet::Follow,
                    SimulationSet::Hardware,
                )
                    .chain(),
            )
            .register_type::<BirdState>()
            .register_type::<BirdController>()
            .register_type::<FlightEngine>()
            .register_type::<FlightConfig>()
            .register_type::<MoodLevel>()
            .register_type::<RagdollRig>()
            .register_type::<AnimatorState>()
            // Подсистемы
            .add_plugins((ImpactPlugin, MoodPlugin, BirdPlugin, FlightPlugin, HardwarePlugin));
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
///
/// RapierPhysicsPlugin не добавляется: тела рэгдолла — только данные,
/// host с рендером подключает физику сам.
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins((MinimalPlugins, SimulationPlugin))
        .insert_resource(DeterministicRng::new(seed));

    app
}

/// Один fixed tick вручную (тесты, headless прогон)
///
/// Не зависит от реального времени: Time<Fixed> сдвигается ровно на timestep.
pub fn run_fixed_tick(world: &mut World) {
    let timestep = world.resource::<Time<Fixed>>().timestep();
    world.resource_mut::<Time<Fixed>>().advance_by(timestep);
    world.run_schedule(FixedUpdate);
}

pub fn run_fixed_ticks(world: &mut World, ticks: u32) {
    for _ in 0..ticks {
        run_fixed_tick(world);
    }
}

/// Длительность одного fixed tick
pub fn fixed_timestep(world: &World) -> Duration {
    world.resource::<Time<Fixed>>().timestep()
}

/// Snapshot мира для сравнения детерминизма
pub fn world_snapshot<T: Component + std::fmt::Debug>(world: &mut World) -> Vec<u8> {
    let mut snapshot = Vec::new();

    let mut query = world.query::<(Entity, &T)>();
    let mut entities: Vec<_> = query.iter(world).collect();

    // Сортируем по Entity ID для детерминизма
    entities.sort_by_key(|(entity, _)| entity.index());

    for (entity, component) in entities {
        snapshot.extend_from_slice(&entity.index().to_le_bytes());
        snapshot.extend_from_slice(format!("{:?}", component).as_bytes());
    }

    snapshot
}

/// Local поза главного тела рэгдолла относительно root
pub const MAIN_BODY_REST: Transform = Transform::from_xyz(0.0, 0.1, 0.0);

/// Параметры спавна птицы
#[derive(Debug, Clone, Default)]
pub struct BirdSpawn {
    pub transform: Transform,
    pub tuning: BirdTuning,
    pub pools: WaypointPools,
    pub perch: Option<Entity>,
}

/// Спавнит птицу: root + тела рэгдолла (children), полёт сразу включён
pub fn spawn_bird(world: &mut World, spawn: BirdSpawn) -> Entity {
    use ragdoll::ragdoll_body_bundle;

    let tuning = spawn.tuning.sanitized();

    let main = world.spawn(ragdoll_body_bundle(RagdollBody::Main, MAIN_BODY_REST)).id();
    let limbs: Vec<Entity> = [Vec3::new(-0.15, 0.1, 0.0), Vec3::new(0.15, 0.1, 0.0), Vec3::new(0.0, 0.1, 0.12)]
        .into_iter()
        .map(|offset| {
            world
                .spawn(ragdoll_body_bundle(RagdollBody::Limb, Transform::from_translation(offset)))
                .id()
        })
        .collect();

    let mut flight = FlightEngine::default();
    let forward = *spawn.transform.forward();
    flight.enable(Vec3::new(forward.x, 0.0, forward.z));

    let bird = world
        .spawn((
            spawn.transform,
            BirdState::Flying,
            BirdController::new(tuning.motor.clone()),
            flight,
            tuning.flight.clone(),
            spawn.pools,
            MoodLevel::new(tuning.mood.clone()),
            ContactLatch::default(),
            tuning.hit.clone(),
            AnimatorState::default(),
            RagdollRig::new(main, limbs.clone(), MAIN_BODY_REST),
            BirdControls::default(),
        ))
        .id();

    let mut root = world.entity_mut(bird);
    root.add_child(main);
    for limb in limbs {
        root.add_child(limb);
    }

    if let Some(perch) = spawn.perch {
        root.insert(TrackedPerch(perch));
    }

    log_info(&format!("🐦 Spawned bird {:?} at {:.2?}", bird, spawn.transform.translation));
    bird
}

pub fn spawn_waypoint(world: &mut World, position: Vec3) -> Entity {
    world.spawn((Waypoint, Transform::from_translation(position))).id()
}

pub fn spawn_perch(world: &mut World, transform: Transform) -> Entity {
    world.spawn((PerchTarget, transform)).id()
}

pub fn spawn_hand(world: &mut World, position: Vec3) -> Entity {
    world
        .spawn((PlayerHand, HandVelocity::default(), Transform::from_translation(position)))
        .id()
}
