//! RagdollBridge — переключение animated pose ⇄ rapier physics
//!
//! Архитектура:
//! - Rapier владеет телами (RigidBody / Velocity / ExternalImpulse / GravityScale)
//! - Animator (внешний) читает AnimatorState.enabled
//! - ECS решает КОГДА переключать, rapier — КАК двигать
//!
//! Порядок операций важен (иначе один кадр "драки" поз):
//! - enable: сначала выключаем animator, потом тела → Dynamic, потом импульс
//! - disable: сначала тела → Kinematic, animator включаем последним

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

/// Роль тела в рэгдолле
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub enum RagdollBody {
    /// Главное тело = tracked bone (визуальный child птицы)
    Main,
    /// Крылья/хвост/голова
    Limb,
}

/// Рэгдолл птицы (на root entity)
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct RagdollRig {
    pub main_body: Entity,
    pub limbs: Vec<Entity>,
    /// Local поза main body относительно root в покое
    pub rest_local: Transform,
    /// Физика сейчас управляет телами
    pub active: bool,
}

impl RagdollRig {
    pub fn new(main_body: Entity, limbs: Vec<Entity>, rest_local: Transform) -> Self {
        Self {
            main_body,
            limbs,
            rest_local,
            active: false,
        }
    }

    /// Все тела: main первым
    pub fn bodies(&self) -> impl Iterator<Item = Entity> + '_ {
        std::iter::once(self.main_body).chain(self.limbs.iter().copied())
    }
}

/// Состояние внешнего animator'а (читается рендером)
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct AnimatorState {
    pub enabled: bool,
    pub is_flying: bool,
}

impl Default for AnimatorState {
    fn default() -> Self {
        Self {
            enabled: true,
            is_flying: true,
        }
    }
}

/// Компоненты одного тела рэгдолла (для spawn)
pub fn ragdoll_body_bundle(
    role: RagdollBody,
    local: Transform,
) -> (RagdollBody, Transform, RigidBody, Velocity, ExternalImpulse, GravityScale) {
    (
        role,
        local,
        RigidBody::KinematicPositionBased,
        Velocity::zero(),
        ExternalImpulse::default(),
        GravityScale(0.0),
    )
}

/// Доступ к телам рэгдоллов
#[derive(SystemParam)]
pub struct RagdollBodies<'w, 's> {
    bodies: Query<
        'w,
        's,
        (
            &'static mut RigidBody,
            &'static mut Velocity,
            &'static mut ExternalImpulse,
            &'static mut GravityScale,
            &'static mut Transform,
        ),
        (With<RagdollBody>, Without<RagdollRig>),
    >,
}

impl RagdollBodies<'_, '_> {
    /// Физика берёт управление: animator off → Dynamic → zero velocity → impulse
    pub fn enable(&mut self, rig: &mut RagdollRig, animator: &mut AnimatorState, impulse: Vec3) {
        animator.enabled = false;

        for entity in rig.bodies() {
            let Ok((mut body, mut velocity, mut external, mut gravity, _)) = self.bodies.get_mut(entity) else {
                crate::log_warning(&format!("Ragdoll: body {:?} is missing, skipped", entity));
                continue;
            };

            *body = RigidBody::Dynamic;
            gravity.0 = 1.0;

            // Остаточная скорость анимации испортит реакцию на удар
            *velocity = Velocity::zero();
            external.impulse = impulse;
            external.torque_impulse = Vec3::ZERO;
        }

        rig.active = true;
    }

    /// Повторный удар по уже упавшей птице: импульсы складываются
    pub fn reapply_impulse(&mut self, rig: &RagdollRig, impulse: Vec3) {
        for entity in rig.bodies() {
            if let Ok((_, _, mut external, _, _)) = self.bodies.get_mut(entity) {
                external.impulse += impulse;
            }
        }
    }

    /// Анимация берёт управление: Kinematic → zero velocity → animator on
    pub fn disable(&mut self, rig: &mut RagdollRig, animator: &mut AnimatorState) {
        for entity in rig.bodies() {
            let Ok((mut body, mut velocity, mut external, mut gravity, _)) = self.bodies.get_mut(entity) else {
                crate::log_warning(&format!("Ragdoll: body {:?} is missing, skipped", entity));
                continue;
            };

            *body = RigidBody::KinematicPositionBased;
            gravity.0 = 0.0;
            *velocity = Velocity::zero();
            *external = ExternalImpulse::default();
        }

        rig.active = false;
        animator.enabled = true;
    }

    /// Мировая поза tracked bone (root × local)
    pub fn tracked_bone_world(&self, rig: &RagdollRig, root: &Transform) -> Option<Transform> {
        self.bodies
            .get(rig.main_body)
            .ok()
            .map(|(_, _, _, _, local)| root.mul_transform(*local))
    }

    /// Возвращает tracked bone в позу покоя относительно root
    pub fn reset_tracked_bone(&mut self, rig: &RagdollRig) {
        if let Ok((_, _, _, _, mut local)) = self.bodies.get_mut(rig.main_body) {
            *local = rig.rest_local;
        }
    }
}

/// Поза родителя, при которой child с `rest_local` оказывается ровно в `captured_world`
///
/// parent × rest_local == captured_world
pub fn rebase_parent(captured_world: &Transform, rest_local: &Transform) -> Transform {
    let scale = if rest_local.scale.cmpeq(Vec3::ZERO).any() {
        captured_world.scale
    } else {
        captured_world.scale / rest_local.scale
    };
    let rotation = (captured_world.rotation * rest_local.rotation.inverse()).normalize();
    let translation = captured_world.translation - rotation * (scale * rest_local.translation);

    Transform {
        translation,
        rotation,
        scale,
    }
}
