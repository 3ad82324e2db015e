//! Настроение птицы (MoodLevel)
//!
//! Удар понижает, поглаживание повышает, значение всегда в [0, 100].
//! PathPlanner только читает bucket — мутирует уровень лишь `apply_mood_events`.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MoodConfig;

pub const MOOD_MIN: f32 = 0.0;
pub const MOOD_MAX: f32 = 100.0;

/// Пул waypoint'ов, выбранный по настроению
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum MoodBucket {
    Friendly,
    Neutral,
    Angry,
}

/// Уровень настроения
///
/// Инвариант: MOOD_MIN ≤ level ≤ MOOD_MAX после каждой мутации
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct MoodLevel {
    level: f32,
    config: MoodConfig,
}

impl Default for MoodLevel {
    fn default() -> Self {
        Self::new(MoodConfig::default())
    }
}

impl MoodLevel {
    pub fn new(config: MoodConfig) -> Self {
        Self {
            level: config.initial_level.clamp(MOOD_MIN, MOOD_MAX),
            config,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn bucket(&self) -> MoodBucket {
        if self.level > self.config.friendly_threshold {
            MoodBucket::Friendly
        } else if self.level < self.config.angry_threshold {
            MoodBucket::Angry
        } else {
            MoodBucket::Neutral
        }
    }

    pub fn is_happy(&self) -> bool {
        self.bucket() == MoodBucket::Friendly
    }

    pub fn is_angry(&self) -> bool {
        self.bucket() == MoodBucket::Angry
    }

    pub fn apply(&mut self, nudge: MoodNudge) {
        let delta = match nudge {
            MoodNudge::Punch => -self.config.punch_decrease,
            MoodNudge::Pet => self.config.pet_increase,
        };
        self.set_level(self.level + delta);
    }

    pub fn set_level(&mut self, level: f32) {
        // NaN из внешнего кода не должен пробить инвариант
        self.level = if level.is_nan() {
            self.level
        } else {
            level.clamp(MOOD_MIN, MOOD_MAX)
        };
    }

    pub fn reset(&mut self) {
        self.set_level(self.config.initial_level);
    }
}

/// Толчок настроения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum MoodNudge {
    Punch,
    Pet,
}

/// Event: контакт с рукой изменил настроение (от impact коллаборатора)
#[derive(Event, Debug, Clone)]
pub struct MoodEvent {
    pub bird: Entity,
    pub nudge: MoodNudge,
}

/// Event: новое значение настроения (для UI/звука/частиц)
#[derive(Event, Debug, Clone)]
pub struct MoodChanged {
    pub bird: Entity,
    pub level: f32,
    pub bucket: MoodBucket,
}

/// Система: MoodEvent → MoodLevel
pub fn apply_mood_events(
    mut mood_events: EventReader<MoodEvent>,
    mut moods: Query<&mut MoodLevel>,
    mut changed_events: EventWriter<MoodChanged>,
) {
    for event in mood_events.read() {
        let Ok(mut mood) = moods.get_mut(event.bird) else {
            crate::log_warning(&format!("MoodEvent: {:?} has no MoodLevel", event.bird));
            continue;
        };

        mood.apply(event.nudge);

        crate::log(&format!(
            "🐦 {:?} {:?} → mood {:.1} ({:?})",
            event.bird,
            event.nudge,
            mood.level(),
            mood.bucket()
        ));

        changed_events.write(MoodChanged {
            bird: event.bird,
            level: mood.level(),
            bucket: mood.bucket(),
        });
    }
}

/// Mood Plugin
pub struct MoodPlugin;

impl Plugin for MoodPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<MoodEvent>()
            .add_event::<MoodChanged>()
            .add_systems(FixedUpdate, apply_mood_events.in_set(crate::SimulationSet::Mood));
    }
}
