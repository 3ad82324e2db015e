//! Bird domain — жизненный цикл Flying / Perched / Ragdoll
//!
//! Архитектура:
//! - BirdState меняется ТОЛЬКО через `transition::transition`
//! - Входы: BirdCommand (ввод), BirdImpact (удар), ArrivedAtPerch (flight)
//! - Мотор лески управляется из entry/exit actions + ручные команды
//! - Отложенный стоп мотора: Timer в BirdController (вместо корутины)

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub mod input;
pub mod transition;

pub use input::{BirdControls, ButtonEdge, ControllerSnapshot, Edge, TRIGGER_THRESHOLD};
pub use transition::{transition, BirdDriver, BirdParts, Transition};

use crate::config::MotorConfig;
use crate::flight::{ArrivedAtPerch, PerchTarget, TrackedPerch};
use crate::hardware::{send_motor_command, ConnectionSession, MotorCommand, SpinDirection};

/// Состояние птицы (ровно одно активно)
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect, Serialize, Deserialize)]
#[reflect(Component)]
pub enum BirdState {
    #[default]
    Flying,
    Perched,
    Ragdoll,
}

/// Контроллер птицы: отложенная остановка мотора
///
/// Инвариант: не больше одного pending settle timer.
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct BirdController {
    pub motor: MotorConfig,
    settle_timer: Option<Timer>,
}

impl BirdController {
    pub fn new(motor: MotorConfig) -> Self {
        Self {
            motor: motor.sanitized(),
            settle_timer: None,
        }
    }

    pub fn has_pending_settle(&self) -> bool {
        self.settle_timer.is_some()
    }

    /// Стоп мотора через settle_delay (заменяет предыдущий)
    pub fn schedule_settle(&mut self) {
        // motor — pub, мог измениться после new()
        let delay = if self.motor.settle_delay.is_finite() {
            self.motor.settle_delay.max(0.0)
        } else {
            MotorConfig::default().settle_delay
        };
        self.settle_timer = Some(Timer::from_seconds(delay, TimerMode::Once));
    }

    /// true — был pending timer
    pub fn cancel_settle(&mut self) -> bool {
        self.settle_timer.take().is_some()
    }

    /// true — timer истёк в этом тике (и больше не существует)
    pub fn tick_settle(&mut self, delta: std::time::Duration) -> bool {
        let Some(timer) = self.settle_timer.as_mut() else {
            return false;
        };

        timer.tick(delta);
        if timer.finished() {
            self.settle_timer = None;
            return true;
        }
        false
    }
}

/// Что просит ввод
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum BirdCommandKind {
    RequestPerch,
    RequestFlight,
    MotorSpin(SpinDirection),
    MotorStop,
}

/// Event: команда птице (edge-triggered)
#[derive(Event, Debug, Clone)]
pub struct BirdCommand {
    pub bird: Entity,
    pub kind: BirdCommandKind,
}

/// Event: удар по птице (от impact)
#[derive(Event, Debug, Clone)]
pub struct BirdImpact {
    pub bird: Entity,
    pub force: Vec3,
}

/// Event: птица сменила состояние
#[derive(Event, Debug, Clone, PartialEq)]
pub struct BirdStateChanged {
    pub bird: Entity,
    pub from: BirdState,
    pub to: BirdState,
}

/// Event: уровни кнопок контроллеров за кадр (host опрашивает устройства)
#[derive(Event, Debug, Clone)]
pub struct ControllerInput {
    pub bird: Entity,
    pub snapshot: ControllerSnapshot,
}

/// Система: ControllerInput → BirdCommand (по фронтам)
pub fn map_controller_input(
    mut inputs: EventReader<ControllerInput>,
    mut controls: Query<&mut BirdControls>,
    mut commands: EventWriter<BirdCommand>,
) {
    for input in inputs.read() {
        let Ok(mut bird_controls) = controls.get_mut(input.bird) else {
            crate::log_warning(&format!("ControllerInput: {:?} has no BirdControls", input.bird));
            continue;
        };

        for kind in bird_controls.update(input.snapshot) {
            commands.write(BirdCommand { bird: input.bird, kind });
        }
    }
}

/// Система: команды и удары → переходы
pub fn process_bird_commands(
    mut commands: EventReader<BirdCommand>,
    mut impacts: EventReader<BirdImpact>,
    mut driver: BirdDriver,
) {
    for command in commands.read() {
        match command.kind {
            BirdCommandKind::RequestPerch => driver.request_perch(command.bird),
            BirdCommandKind::RequestFlight => driver.request_flight(command.bird),
            BirdCommandKind::MotorSpin(direction) => driver.motor_spin(command.bird, direction),
            BirdCommandKind::MotorStop => driver.motor(command.bird, MotorCommand::Stop),
        }
    }

    for impact in impacts.read() {
        driver.impact(impact.bird, impact.force);
    }
}

/// Система: ArrivedAtPerch → Perched (в том же тике, что и посадка)
pub fn handle_perch_arrivals(mut arrivals: EventReader<ArrivedAtPerch>, mut driver: BirdDriver) {
    for arrival in arrivals.read() {
        driver.arrive(arrival.bird, arrival.perch);
    }
}

/// Система: отложенная остановка мотора
pub fn tick_settle_timers(
    mut controllers: Query<(Entity, &mut BirdController)>,
    mut session: Option<ResMut<ConnectionSession>>,
    time: Res<Time<Fixed>>,
) {
    for (entity, mut controller) in controllers.iter_mut() {
        if controller.tick_settle(time.delta()) {
            crate::log(&format!("{:?}: motor settled", entity));
            send_motor_command(session.as_deref_mut(), MotorCommand::Stop);
        }
    }
}

/// Система: Perched птица следует за перчем (перч двигает внешний код)
pub fn follow_perch(
    mut birds: Query<(&BirdState, &TrackedPerch, &mut Transform)>,
    perches: Query<&Transform, (With<PerchTarget>, Without<BirdState>)>,
) {
    for (state, tracked, mut transform) in birds.iter_mut() {
        if *state != BirdState::Perched {
            continue;
        }

        // Пропавший перч: остаёмся в последней позе до следующей команды
        if let Ok(perch) = perches.get(tracked.0) {
            transform.translation = perch.translation;
            transform.rotation = perch.rotation;
        }
    }
}

/// Система: выход из Perched/Ragdoll перевзводит grip посадки
pub fn rearm_controls_on_transition(
    mut changes: EventReader<BirdStateChanged>,
    mut controls: Query<&mut BirdControls>,
) {
    for change in changes.read() {
        if !matches!(change.from, BirdState::Perched | BirdState::Ragdoll) {
            continue;
        }
        if let Ok(mut bird_controls) = controls.get_mut(change.bird) {
            bird_controls.rearm_perch_grip();
        }
    }
}

/// Bird Plugin
pub struct BirdPlugin;

impl Plugin for BirdPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<BirdCommand>()
            .add_event::<BirdImpact>()
            .add_event::<BirdStateChanged>()
            .add_event::<ControllerInput>()
            .add_systems(FixedUpdate, map_controller_input.in_set(crate::SimulationSet::Input))
            .add_systems(FixedUpdate, process_bird_commands.in_set(crate::SimulationSet::Commands))
            .add_systems(FixedUpdate, handle_perch_arrivals.in_set(crate::SimulationSet::Arrival))
            .add_systems(FixedUpdate, tick_settle_timers.in_set(crate::SimulationSet::Timers))
            .add_systems(
                FixedUpdate,
                (follow_perch, rearm_controls_on_transition)
                    .chain()
                    .in_set(crate::SimulationSet::Follow),
            );
    }
}
