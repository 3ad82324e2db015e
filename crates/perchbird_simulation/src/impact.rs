//! Контакты руки игрока с птицей: удар или поглаживание
//!
//! Host шлёт HandContact (enter/exit) из своего trigger-коллайдера.
//! Одна реакция на один эпизод контакта: ContactLatch взводится на enter,
//! сбрасывается на exit руки.

use bevy::prelude::*;

use crate::bird::BirdImpact;
use crate::config::HitConfig;
use crate::mood::{MoodEvent, MoodNudge};

/// Маркер: entity — рука игрока
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct PlayerHand;

/// Скорость руки по дельте позиции между тиками
///
/// `raw_velocity` — скорость последнего тика (по ней классифицируется удар),
/// `velocity` — сглаженная (для UI/отладки).
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct HandVelocity {
    /// Больше = быстрее догоняет сырую скорость
    pub smoothing: f32,
    velocity: Vec3,
    raw: Vec3,
    last_position: Option<Vec3>,
}

impl Default for HandVelocity {
    fn default() -> Self {
        Self {
            smoothing: 10.0,
            velocity: Vec3::ZERO,
            raw: Vec3::ZERO,
            last_position: None,
        }
    }
}

impl HandVelocity {
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn raw_velocity(&self) -> Vec3 {
        self.raw
    }

    /// Новая позиция руки за тик dt
    pub fn sample(&mut self, position: Vec3, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        if let Some(last) = self.last_position {
            self.raw = (position - last) / dt;
            self.velocity = self.velocity.lerp(self.raw, (dt * self.smoothing).clamp(0.0, 1.0));
        }
        self.last_position = Some(position);
    }
}

/// Фаза контакта
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum ContactPhase {
    Entered,
    Exited,
}

/// Event: коллайдер коснулся птицы / отпустил её
#[derive(Event, Debug, Clone)]
pub struct HandContact {
    pub bird: Entity,
    pub other: Entity,
    pub phase: ContactPhase,
}

/// Защёлка эпизода контакта
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct ContactLatch {
    reacted: bool,
}

impl ContactLatch {
    pub fn has_reacted(&self) -> bool {
        self.reacted
    }
}

/// Итог классификации касания
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandReaction {
    Punch { force: Vec3 },
    Pet,
}

/// Удар — если скорость руки ≥ min_hit_speed, иначе поглаживание
pub fn classify_contact(hand_velocity: Vec3, config: &HitConfig) -> HandReaction {
    if hand_velocity.length() >= config.min_hit_speed {
        HandReaction::Punch {
            force: hand_velocity * config.force_multiplier,
        }
    } else {
        HandReaction::Pet
    }
}

/// Система: обновление скоростей рук
pub fn track_hand_velocity(mut hands: Query<(&Transform, &mut HandVelocity)>, time: Res<Time<Fixed>>) {
    let delta = time.delta_secs();
    for (transform, mut velocity) in hands.iter_mut() {
        velocity.sample(transform.translation, delta);
    }
}

/// Система: HandContact → MoodEvent (+ BirdImpact при ударе)
pub fn detect_hand_contacts(
    mut contacts: EventReader<HandContact>,
    mut birds: Query<(&mut ContactLatch, &HitConfig)>,
    hands: Query<Option<&HandVelocity>, With<PlayerHand>>,
    mut mood_events: EventWriter<MoodEvent>,
    mut impact_events: EventWriter<BirdImpact>,
) {
    for contact in contacts.read() {
        // Только руки игрока (остальные коллайдеры не интересны)
        let Ok(hand_velocity) = hands.get(contact.other) else {
            continue;
        };

        let Ok((mut latch, config)) = birds.get_mut(contact.bird) else {
            crate::log_warning(&format!("HandContact: {:?} is not a bird with ContactLatch", contact.bird));
            continue;
        };

        match contact.phase {
            ContactPhase::Exited => {
                latch.reacted = false;
            }
            ContactPhase::Entered => {
                if latch.reacted {
                    continue;
                }
                latch.reacted = true;

                // Скорость за последний тик, без сглаживания; рука без трекера неподвижна
                let velocity = hand_velocity.map(HandVelocity::raw_velocity).unwrap_or(Vec3::ZERO);

                match classify_contact(velocity, config) {
                    HandReaction::Punch { force } => {
                        crate::log(&format!("👊 {:?} punched (speed {:.1})", contact.bird, velocity.length()));
                        mood_events.write(MoodEvent {
                            bird: contact.bird,
                            nudge: MoodNudge::Punch,
                        });
                        impact_events.write(BirdImpact {
                            bird: contact.bird,
                            force,
                        });
                    }
                    HandReaction::Pet => {
                        crate::log(&format!("🤚 {:?} petted", contact.bird));
                        mood_events.write(MoodEvent {
                            bird: contact.bird,
                            nudge: MoodNudge::Pet,
                        });
                    }
                }
            }
        }
    }
}

/// Impact Plugin
pub struct ImpactPlugin;

impl Plugin for ImpactPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<HandContact>().add_systems(
            FixedUpdate,
            (track_hand_velocity, detect_hand_contacts)
                .chain()
                .in_set(crate::SimulationSet::Input),
        );
    }
}
