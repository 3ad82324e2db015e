//! FlightEngine — покадровое движение по кривой
//!
//! Два взаимоисключающих под-режима за тик:
//! - cruise/approach: продвигаем t по кривой (Δt = speed·dt / length)
//! - landing blend: ease-out от захваченной позы к живой позе перча
//!
//! Engine ничего не знает про ECS — система в `flight::mod` подаёт позу птицы,
//! позу перча и dt, и реагирует на `FlightTick`.

use bevy::prelude::*;
use rand::Rng;

use crate::config::FlightConfig;
use crate::path::{retarget_perch_end, FlightPath, PathPlanner};

/// Что нужно спланировать в начале следующего тика
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum PlanRequest {
    Cruise,
    PerchApproach,
}

/// Landing blend: поза в момент входа + прошедшее время
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct LandingBlend {
    pub start: Transform,
    pub elapsed: f32,
}

/// Результат одного тика
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightTick {
    /// Engine выключен (Perched/Ragdoll)
    Disabled,
    /// Движемся по кривой
    Cruising,
    /// Кривой нет (или закончилась/вырожденная) — нужен новый cruise маршрут
    NeedsCruisePlan,
    /// t дошёл до 1 при заходе на перч — начался landing blend
    LandingStarted,
    /// Идёт landing blend
    Landing,
    /// Landing blend завершён, engine выключился
    Arrived,
    /// Перч пропал во время захода/посадки — перчинг отменён
    PerchLost,
}

/// Состояние полёта птицы
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct FlightEngine {
    enabled: bool,
    perching: bool,
    path: Option<FlightPath>,
    landing: Option<LandingBlend>,
    /// Последний валидный heading (для нулевой касательной и новых дуг)
    heading: Option<Vec3>,
    pending_plan: Option<PlanRequest>,
    /// Последний cruise план не нашёл waypoint'ов
    holding: bool,
    pub planner: PathPlanner,
}

impl FlightEngine {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_perching(&self) -> bool {
        self.perching
    }

    pub fn is_landing(&self) -> bool {
        self.landing.is_some()
    }

    pub fn path(&self) -> Option<&FlightPath> {
        self.path.as_ref()
    }

    pub fn heading(&self) -> Option<Vec3> {
        self.heading
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn pending_plan(&self) -> Option<PlanRequest> {
        self.pending_plan
    }

    pub fn take_pending_plan(&mut self) -> Option<PlanRequest> {
        self.pending_plan.take()
    }

    /// Включает полёт с нуля: cruise от текущей позиции вдоль `forward`
    pub fn enable(&mut self, forward: Vec3) {
        self.enabled = true;
        self.perching = false;
        self.landing = None;
        self.path = None;
        self.heading = forward.try_normalize().or(self.heading);
        self.pending_plan = Some(PlanRequest::Cruise);
    }

    /// Выключает вывод позы (Ragdoll/Perched владеют трансформом)
    pub fn disable(&mut self) {
        self.enabled = false;
        self.landing = None;
        self.path = None;
        self.pending_plan = None;
    }

    /// Запрос на перч
    ///
    /// No-op (false), если уже заходим на перч или engine выключен.
    pub fn begin_perch(&mut self) -> bool {
        if !self.enabled || self.perching {
            return false;
        }
        self.perching = true;
        self.pending_plan = Some(PlanRequest::PerchApproach);
        true
    }

    /// Отменяет заход на перч (цель пропала)
    pub fn abort_perch(&mut self) {
        self.perching = false;
        self.landing = None;
        self.path = None;
    }

    /// Строит cruise маршрут из пула кандидатов
    ///
    /// false — пул пуст, птица остаётся на месте.
    pub fn plan_cruise<R: Rng>(
        &mut self,
        position: Vec3,
        candidates: &[(Entity, Vec3)],
        rng: &mut R,
        config: &FlightConfig,
    ) -> bool {
        let path = self
            .planner
            .plan_cruise(position, self.heading, candidates, rng, config);
        let planned = path.is_some();
        self.path = path;
        self.holding = !planned;
        planned
    }

    /// Строит маршрут захода на перч
    pub fn plan_perch_approach<R: Rng>(
        &mut self,
        position: Vec3,
        perch_position: Vec3,
        rng: &mut R,
        config: &FlightConfig,
    ) {
        let path = self
            .planner
            .plan_perch_approach(position, self.heading, perch_position, rng, config);
        self.path = Some(path);
    }

    /// Один тик полёта
    pub fn tick(
        &mut self,
        pose: &mut Transform,
        perch: Option<&Transform>,
        dt: f32,
        config: &FlightConfig,
    ) -> FlightTick {
        if !self.enabled {
            return FlightTick::Disabled;
        }

        // Landing blend — только интерполяция, кривую не трогаем
        if let Some(landing) = self.landing {
            let Some(perch) = perch else {
                self.abort_perch();
                return FlightTick::PerchLost;
            };
            return self.tick_landing(landing, pose, perch, dt, config);
        }

        if self.perching && perch.is_none() {
            self.abort_perch();
            return FlightTick::PerchLost;
        }

        let Some(path) = self.path.as_mut() else {
            if self.perching {
                self.abort_perch();
                return FlightTick::PerchLost;
            }
            return FlightTick::NeedsCruisePlan;
        };

        if let (true, Some(perch)) = (self.perching, perch) {
            retarget_perch_end(
                path,
                perch.translation,
                config.perch_tracking_speed,
                dt,
                config.length_segments,
            );
        } else if path.is_degenerate() {
            // start == end: стоим на месте, без деления на ~0
            self.path = None;
            return FlightTick::NeedsCruisePlan;
        }

        path.refresh_length(config.length_segments);

        let multiplier = match (self.perching, perch) {
            (true, Some(perch)) => {
                approach_speed_multiplier(pose.translation.distance(perch.translation), config)
            }
            _ => 1.0,
        };

        path.t = (path.t + dt * config.flight_speed * multiplier / path.length).min(1.0);

        if path.is_complete() {
            if let Some(exit) = path.curve.tangent(1.0).try_normalize() {
                self.heading = Some(exit);
            }

            if self.perching {
                self.landing = Some(LandingBlend {
                    start: *pose,
                    elapsed: 0.0,
                });
                return FlightTick::LandingStarted;
            }

            pose.translation = path.curve.end();
            self.path = None;
            return FlightTick::NeedsCruisePlan;
        }

        let position = path.curve.position(path.t);
        let tangent = path.curve.tangent(path.t);
        pose.translation = position;
        self.turn_towards(pose, tangent, dt, config);

        FlightTick::Cruising
    }

    fn tick_landing(
        &mut self,
        mut landing: LandingBlend,
        pose: &mut Transform,
        perch: &Transform,
        dt: f32,
        config: &FlightConfig,
    ) -> FlightTick {
        landing.elapsed += dt;

        let progress = if config.landing_duration > 0.0 {
            (landing.elapsed / config.landing_duration).clamp(0.0, 1.0)
        } else {
            1.0
        };

        if progress >= 1.0 {
            // Сходимся точно к живой позе перча
            pose.translation = perch.translation;
            pose.rotation = perch.rotation;
            self.landing = None;
            self.path = None;
            self.enabled = false;
            return FlightTick::Arrived;
        }

        let ease = ease_out_cubic(progress);
        pose.translation = landing.start.translation.lerp(perch.translation, ease);
        pose.rotation = landing.start.rotation.slerp(perch.rotation, ease);
        self.landing = Some(landing);

        FlightTick::Landing
    }

    /// Плавный доворот к касательной (никаких snap'ов посреди полёта)
    fn turn_towards(&mut self, pose: &mut Transform, tangent: Vec3, dt: f32, config: &FlightConfig) {
        let Some(direction) = tangent.try_normalize() else {
            return;
        };
        self.heading = Some(direction);

        let target = Transform::IDENTITY.looking_to(direction, Vec3::Y).rotation;
        let step = (config.rotation_speed * dt).clamp(0.0, 1.0);
        pose.rotation = pose.rotation.slerp(target, step);
    }
}

/// 1 − (1 − x)³
pub fn ease_out_cubic(x: f32) -> f32 {
    let inv = 1.0 - x.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

/// Множитель скорости у перча: min_speed_multiplier → 1.0 линейно по дистанции
pub fn approach_speed_multiplier(distance: f32, config: &FlightConfig) -> f32 {
    if config.slowdown_distance <= 0.0 || distance >= config.slowdown_distance {
        return 1.0;
    }
    let s = (distance / config.slowdown_distance).clamp(0.0, 1.0);
    config.min_speed_multiplier + (1.0 - config.min_speed_multiplier) * s
}
