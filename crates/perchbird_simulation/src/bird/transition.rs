//! Функция перехода BirdState + BirdDriver (SystemParam для систем bird)
//!
//! Порядок внутри перехода:
//! 1. Отмена отложенной остановки мотора
//! 2. Exit actions старого состояния
//! 3. Entry actions нового состояния
//! 4. Запись нового BirdState
//!
//! Переход завершается в той же системе, где начался.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use super::{BirdController, BirdState, BirdStateChanged};
use crate::flight::{FlightEngine, PerchTarget, TrackedPerch};
use crate::hardware::{send_motor_command, ConnectionSession, MotorCommand, SpinDirection};
use crate::ragdoll::{rebase_parent, AnimatorState, RagdollBodies, RagdollBody, RagdollRig};

/// Куда переходим (с данными для entry action)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    ToFlying,
    ToPerched { perch: Transform },
    ToRagdoll { impulse: Vec3 },
}

impl Transition {
    pub fn target(&self) -> BirdState {
        match self {
            Transition::ToFlying => BirdState::Flying,
            Transition::ToPerched { .. } => BirdState::Perched,
            Transition::ToRagdoll { .. } => BirdState::Ragdoll,
        }
    }
}

/// Мутабельные части одной птицы на время перехода
pub struct BirdParts<'a> {
    pub entity: Entity,
    pub state: &'a mut BirdState,
    pub controller: &'a mut BirdController,
    pub flight: &'a mut FlightEngine,
    pub root: &'a mut Transform,
    pub animator: &'a mut AnimatorState,
    pub rig: &'a mut RagdollRig,
}

/// Выполняет переход; возвращает событие для BirdStateChanged
pub fn transition(
    bird: &mut BirdParts,
    to: Transition,
    bodies: &mut RagdollBodies,
    mut session: Option<&mut ConnectionSession>,
) -> BirdStateChanged {
    let from = *bird.state;

    // Не больше одного отложенного стопа
    bird.controller.cancel_settle();

    // Мировая поза кости на выходе из Ragdoll (для выравнивания root ниже)
    let mut captured_bone = None;

    match from {
        BirdState::Flying => {
            bird.flight.disable();
        }
        BirdState::Perched => {
            // Отпускаем натяжение лески
            send_motor_command(session.as_deref_mut(), MotorCommand::Backward);
            bird.controller.schedule_settle();
        }
        BirdState::Ragdoll => {
            bodies.disable(bird.rig, bird.animator);

            // Root переезжает туда, где оказалась кость, кость — в позу покоя
            match bodies.tracked_bone_world(bird.rig, bird.root) {
                Some(captured) => {
                    bodies.reset_tracked_bone(bird.rig);
                    *bird.root = rebase_parent(&captured, &bird.rig.rest_local);
                    captured_bone = Some(captured);
                }
                None => crate::log_warning(&format!(
                    "{:?}: tracked bone {:?} missing, root stays in place",
                    bird.entity, bird.rig.main_body
                )),
            }
        }
    }

    match to {
        Transition::ToFlying => {
            bird.animator.is_flying = true;

            // Выравниваем по горизонту (после ragdoll птица может лежать на боку)
            let forward = *bird.root.forward();
            let level = Vec3::new(forward.x, 0.0, forward.z)
                .try_normalize()
                .or_else(|| bird.flight.heading().map(|h| Vec3::new(h.x, 0.0, h.z)))
                .and_then(Vec3::try_normalize)
                .unwrap_or(Vec3::NEG_Z);
            bird.root.rotation = Transform::IDENTITY.looking_to(level, Vec3::Y).rotation;

            // Крен/тангаж убраны; root сдвигается так, чтобы кость осталась в той же точке
            if let Some(captured) = captured_bone {
                let rest = bird.rig.rest_local;
                bird.root.translation = captured.translation
                    - bird.root.rotation * (bird.root.scale * rest.translation);
            }

            bird.flight.enable(level);
        }
        Transition::ToPerched { perch } => {
            send_motor_command(session.as_deref_mut(), MotorCommand::Forward);
            bird.controller.schedule_settle();

            bird.animator.is_flying = false;
            bird.root.translation = perch.translation;
            bird.root.rotation = perch.rotation;
        }
        Transition::ToRagdoll { impulse } => {
            bird.flight.disable();
            bodies.enable(bird.rig, bird.animator, impulse);
        }
    }

    *bird.state = to.target();

    crate::log_info(&format!("🐦 {:?}: {:?} → {:?}", bird.entity, from, to.target()));

    BirdStateChanged {
        bird: bird.entity,
        from,
        to: to.target(),
    }
}

type BirdItem = (
    Entity,
    &'static mut BirdState,
    &'static mut BirdController,
    &'static mut FlightEngine,
    &'static mut Transform,
    &'static mut AnimatorState,
    &'static mut RagdollRig,
    Option<&'static TrackedPerch>,
);

/// Всё, что нужно системам bird для переходов
#[derive(SystemParam)]
pub struct BirdDriver<'w, 's> {
    birds: Query<'w, 's, BirdItem>,
    perches: Query<'w, 's, &'static Transform, (With<PerchTarget>, Without<BirdState>, Without<RagdollBody>)>,
    bodies: RagdollBodies<'w, 's>,
    session: Option<ResMut<'w, ConnectionSession>>,
    changed_events: EventWriter<'w, BirdStateChanged>,
}

impl BirdDriver<'_, '_> {
    /// Запрос на посадку (из любого состояния)
    ///
    /// Ragdoll → Flying, затем заход на перч в этом же тике.
    pub fn request_perch(&mut self, bird: Entity) {
        let Ok((entity, mut state, mut controller, mut flight, mut root, mut animator, mut rig, tracked)) =
            self.birds.get_mut(bird)
        else {
            crate::log_warning(&format!("RequestPerch: {:?} is not a bird", bird));
            return;
        };

        let perch_exists = tracked.is_some_and(|t| self.perches.contains(t.0));
        if !perch_exists {
            crate::log_warning(&format!("RequestPerch: {:?} has no perch target", entity));
            return;
        }

        match *state {
            BirdState::Perched => {
                crate::log(&format!("{:?} already perched", entity));
                return;
            }
            BirdState::Ragdoll => {
                let mut parts = BirdParts {
                    entity,
                    state: &mut state,
                    controller: &mut controller,
                    flight: &mut flight,
                    root: &mut root,
                    animator: &mut animator,
                    rig: &mut rig,
                };
                let event = transition(
                    &mut parts,
                    Transition::ToFlying,
                    &mut self.bodies,
                    self.session.as_deref_mut(),
                );
                self.changed_events.write(event);
            }
            BirdState::Flying => {}
        }

        if flight.begin_perch() {
            crate::log(&format!("🪶 {:?} perching...", entity));
        } else {
            crate::log(&format!("{:?} is already approaching its perch", entity));
        }
    }

    /// Запрос на полёт (no-op если уже летим)
    pub fn request_flight(&mut self, bird: Entity) {
        self.apply(bird, Transition::ToFlying);
    }

    /// Удар: Ragdoll с импульсом; по уже упавшей птице импульсы складываются
    pub fn impact(&mut self, bird: Entity, force: Vec3) {
        let Ok((entity, state, _, _, _, _, rig, _)) = self.birds.get(bird) else {
            crate::log_warning(&format!("BirdImpact: {:?} is not a bird", bird));
            return;
        };

        if *state == BirdState::Ragdoll {
            crate::log(&format!("💥 {:?} hit again while ragdolled: {:.2?}", entity, force));
            self.bodies.reapply_impulse(rig, force);
            return;
        }

        self.apply(bird, Transition::ToRagdoll { impulse: force });
    }

    /// Посадка завершена (ArrivedAtPerch)
    pub fn arrive(&mut self, bird: Entity, perch: Entity) {
        let Ok(perch_pose) = self.perches.get(perch).copied() else {
            crate::log_warning(&format!("{:?} arrived at {:?}, but the perch is gone", bird, perch));
            return;
        };

        let Ok((_, state, ..)) = self.birds.get(bird) else {
            return;
        };
        if *state != BirdState::Flying {
            // Устаревший arrival: птицу сбили в этом же тике
            return;
        }

        self.apply(bird, Transition::ToPerched { perch: perch_pose });
    }

    /// Ручное управление мотором: отменяет отложенный стоп
    pub fn motor(&mut self, bird: Entity, command: MotorCommand) {
        let Ok((_, _, mut controller, ..)) = self.birds.get_mut(bird) else {
            crate::log_warning(&format!("Motor command: {:?} is not a bird", bird));
            return;
        };

        if controller.cancel_settle() {
            crate::log(&format!("{:?}: pending motor stop cancelled by manual control", bird));
        }
        send_motor_command(self.session.as_deref_mut(), command);
    }

    pub fn motor_spin(&mut self, bird: Entity, direction: SpinDirection) {
        self.motor(bird, direction.into());
    }

    fn apply(&mut self, bird: Entity, to: Transition) {
        let Ok((entity, mut state, mut controller, mut flight, mut root, mut animator, mut rig, _)) =
            self.birds.get_mut(bird)
        else {
            crate::log_warning(&format!("{:?}: {:?} ignored, not a bird", bird, to.target()));
            return;
        };

        if *state == to.target() {
            crate::log(&format!("{:?} already {:?}", entity, to.target()));
            return;
        }

        let mut parts = BirdParts {
            entity,
            state: &mut state,
            controller: &mut controller,
            flight: &mut flight,
            root: &mut root,
            animator: &mut animator,
            rig: &mut rig,
        };
        let event = transition(&mut parts, to, &mut self.bodies, self.session.as_deref_mut());
        self.changed_events.write(event);
    }
}
