//! Edge-детектор кнопок XR контроллеров → BirdCommandKind
//!
//! Опрос устройств — забота host'а; сюда приходят уже прочитанные уровни.

use bevy::prelude::*;

use super::BirdCommandKind;
use crate::hardware::SpinDirection;

/// Аналоговый trigger считается нажатым выше этого порога
pub const TRIGGER_THRESHOLD: f32 = 0.1;

/// Фронт кнопки
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Превращает уровень кнопки (опрос каждый кадр) в фронты
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Reflect)]
pub struct ButtonEdge {
    was_pressed: bool,
}

impl ButtonEdge {
    pub fn update(&mut self, pressed: bool) -> Option<Edge> {
        let edge = match (self.was_pressed, pressed) {
            (false, true) => Some(Edge::Pressed),
            (true, false) => Some(Edge::Released),
            _ => None,
        };
        self.was_pressed = pressed;
        edge
    }

    pub fn update_axis(&mut self, value: f32) -> Option<Edge> {
        self.update(value > TRIGGER_THRESHOLD)
    }

    pub fn is_pressed(&self) -> bool {
        self.was_pressed
    }

    pub fn reset(&mut self) {
        self.was_pressed = false;
    }
}

/// Уровни кнопок обоих контроллеров за кадр
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub left_grip: bool,
    pub left_trigger: f32,
    pub right_grip: bool,
    pub right_trigger: f32,
}

/// Раскладка управления птицей
///
/// - left grip: сесть на руку
/// - right grip: взлететь
/// - left trigger (удержание): мотор назад, отпускание — стоп
/// - right trigger (удержание): мотор вперёд, отпускание — стоп
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct BirdControls {
    left_grip: ButtonEdge,
    left_trigger: ButtonEdge,
    right_grip: ButtonEdge,
    right_trigger: ButtonEdge,
}

impl BirdControls {
    /// Команды, порождённые фронтами этого кадра
    pub fn update(&mut self, snapshot: ControllerSnapshot) -> Vec<BirdCommandKind> {
        let mut commands = Vec::new();

        if self.left_grip.update(snapshot.left_grip) == Some(Edge::Pressed) {
            commands.push(BirdCommandKind::RequestPerch);
        }

        if self.right_grip.update(snapshot.right_grip) == Some(Edge::Pressed) {
            commands.push(BirdCommandKind::RequestFlight);
        }

        for (edge, direction) in [
            (self.left_trigger.update_axis(snapshot.left_trigger), SpinDirection::Backward),
            (self.right_trigger.update_axis(snapshot.right_trigger), SpinDirection::Forward),
        ] {
            match edge {
                Some(Edge::Pressed) => commands.push(BirdCommandKind::MotorSpin(direction)),
                Some(Edge::Released) => commands.push(BirdCommandKind::MotorStop),
                None => {}
            }
        }

        commands
    }

    /// Удержанный grip снова сработает после выхода из Perched/Ragdoll
    pub fn rearm_perch_grip(&mut self) {
        self.left_grip.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_edges() {
        let mut button = ButtonEdge::default();
        assert_eq!(button.update(false), None);
        assert_eq!(button.update(true), Some(Edge::Pressed));
        assert_eq!(button.update(true), None);
        assert_eq!(button.update(false), Some(Edge::Released));
    }

    #[test]
    fn test_trigger_threshold() {
        let mut trigger = ButtonEdge::default();
        assert_eq!(trigger.update_axis(0.1), None);
        assert_eq!(trigger.update_axis(0.11), Some(Edge::Pressed));
    }

    #[test]
    fn test_grip_press_emits_once() {
        let mut controls = BirdControls::default();
        let held = ControllerSnapshot {
            left_grip: true,
            ..Default::default()
        };

        assert_eq!(controls.update(held), vec![BirdCommandKind::RequestPerch]);
        assert!(controls.update(held).is_empty());
    }

    #[test]
    fn test_rearmed_grip_fires_while_held() {
        let mut controls = BirdControls::default();
        let held = ControllerSnapshot {
            left_grip: true,
            ..Default::default()
        };

        controls.update(held);
        controls.rearm_perch_grip();
        assert_eq!(controls.update(held), vec![BirdCommandKind::RequestPerch]);
    }

    #[test]
    fn test_trigger_hold_and_release() {
        let mut controls = BirdControls::default();
        let pressed = ControllerSnapshot {
            right_trigger: 0.8,
            ..Default::default()
        };

        assert_eq!(
            controls.update(pressed),
            vec![BirdCommandKind::MotorSpin(SpinDirection::Forward)]
        );
        assert!(controls.update(pressed).is_empty());
        assert_eq!(
            controls.update(ControllerSnapshot::default()),
            vec![BirdCommandKind::MotorStop]
        );
    }
}
