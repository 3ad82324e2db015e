//! Flight domain — полёт по Bézier кривым, заход на перч, landing blend
//!
//! Содержит:
//! - FlightEngine (покадровый driver, без ECS зависимостей)
//! - PerchTarget / TrackedPerch (внешний движущийся перч и ссылка птицы на него)
//! - LandingStarted / ArrivedAtPerch (fire-once события для рендера/звука)
//! - flight_tick_system (FixedUpdate)

use bevy::prelude::*;

pub mod engine;

pub use engine::{
    approach_speed_multiplier, ease_out_cubic, FlightEngine, FlightTick, LandingBlend, PlanRequest,
};

use crate::config::FlightConfig;
use crate::mood::MoodLevel;
use crate::path::{Waypoint, WaypointPools};
use crate::DeterministicRng;

/// Маркер: entity — перч (рука игрока). Трансформ принадлежит внешнему коду.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct PerchTarget;

/// На какой перч садится птица
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct TrackedPerch(pub Entity);

/// Event: птица долетела до конца кривой захода и начала посадку
#[derive(Event, Debug, Clone)]
pub struct LandingStarted {
    pub bird: Entity,
}

/// Event: landing blend завершён (птица на перче)
#[derive(Event, Debug, Clone)]
pub struct ArrivedAtPerch {
    pub bird: Entity,
    pub perch: Entity,
}

/// Система: один тик полёта для всех птиц
///
/// 1. Выполняем отложенный PlanRequest (поставлен state machine в этом же тике)
/// 2. FlightEngine::tick
/// 3. Реакция на результат: replan / события
pub fn flight_tick_system(
    mut birds: Query<(
        Entity,
        &mut FlightEngine,
        &mut Transform,
        &FlightConfig,
        &WaypointPools,
        Option<&MoodLevel>,
        Option<&TrackedPerch>,
    )>,
    perches: Query<&Transform, (With<PerchTarget>, Without<FlightEngine>)>,
    waypoints: Query<&Transform, (With<Waypoint>, Without<FlightEngine>)>,
    mut rng: ResMut<DeterministicRng>,
    mut landing_events: EventWriter<LandingStarted>,
    mut arrival_events: EventWriter<ArrivedAtPerch>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();

    for (entity, mut flight, mut transform, config, pools, mood, tracked) in birds.iter_mut() {
        let perch_entity = tracked.map(|t| t.0);
        let perch_pose = perch_entity.and_then(|e| perches.get(e).ok()).copied();

        if let Some(request) = flight.take_pending_plan() {
            match (request, perch_pose) {
                (PlanRequest::Cruise, _) => {
                    plan_cruise(entity, &mut flight, &transform, config, pools, mood, &waypoints, &mut rng);
                }
                (PlanRequest::PerchApproach, Some(perch)) => {
                    flight.plan_perch_approach(transform.translation, perch.translation, &mut rng.rng, config);
                    crate::log(&format!(
                        "🪶 {:?} perch approach: {:.2?} → {:.2?}",
                        entity, transform.translation, perch.translation
                    ));
                }
                (PlanRequest::PerchApproach, None) => {
                    crate::log_warning(&format!("{:?} perch approach requested but perch target is missing", entity));
                    flight.abort_perch();
                }
            }
        }

        match flight.tick(&mut transform, perch_pose.as_ref(), delta, config) {
            FlightTick::NeedsCruisePlan => {
                plan_cruise(entity, &mut flight, &transform, config, pools, mood, &waypoints, &mut rng);
            }
            FlightTick::PerchLost => {
                crate::log_warning(&format!("{:?} lost its perch target, back to cruise", entity));
                plan_cruise(entity, &mut flight, &transform, config, pools, mood, &waypoints, &mut rng);
            }
            FlightTick::LandingStarted => {
                crate::log(&format!("🛬 {:?} landing started", entity));
                landing_events.write(LandingStarted { bird: entity });
            }
            FlightTick::Arrived => {
                // perch_entity гарантированно есть: без перча landing не завершается
                if let Some(perch) = perch_entity {
                    crate::log_info(&format!("🐦 {:?} arrived at perch {:?}", entity, perch));
                    arrival_events.write(ArrivedAtPerch { bird: entity, perch });
                }
            }
            FlightTick::Disabled | FlightTick::Cruising | FlightTick::Landing => {}
        }
    }
}

/// Новый cruise маршрут из пула по текущему настроению
#[allow(clippy::too_many_arguments)]
fn plan_cruise(
    entity: Entity,
    flight: &mut FlightEngine,
    transform: &Transform,
    config: &FlightConfig,
    pools: &WaypointPools,
    mood: Option<&MoodLevel>,
    waypoints: &Query<&Transform, (With<Waypoint>, Without<FlightEngine>)>,
    rng: &mut DeterministicRng,
) {
    let bucket = mood.map(MoodLevel::bucket).unwrap_or_else(|| MoodLevel::default().bucket());

    // Despawned waypoint'ы молча выпадают из пула
    let candidates: Vec<(Entity, Vec3)> = pools
        .pool(bucket)
        .iter()
        .filter_map(|&waypoint| waypoints.get(waypoint).ok().map(|t| (waypoint, t.translation)))
        .collect();

    let was_holding = flight.is_holding();
    if !flight.plan_cruise(transform.translation, &candidates, &mut rng.rng, config) && !was_holding {
        crate::log(&format!("{:?} has no {:?} waypoints, holding position", entity, bucket));
    }
}

/// Flight Plugin
pub struct FlightPlugin;

impl Plugin for FlightPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<LandingStarted>()
            .add_event::<ArrivedAtPerch>()
            .add_systems(FixedUpdate, flight_tick_system.in_set(crate::SimulationSet::Flight));
    }
}
