//! Tunables птицы и железа
//!
//! Все числа — из полевой настройки стенда (VR + мотор на USB serial).
//! Каждая группа — отдельный компонент/поле, чтобы host мог переопределить
//! только нужное (`#[serde(default)]` дополняет недостающие поля).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::curve::CurveDegree;

/// Параметры полёта (FlightEngine + PathPlanner)
#[derive(Component, Debug, Clone, Reflect, Serialize, Deserialize)]
#[reflect(Component)]
#[serde(default)]
pub struct FlightConfig {
    /// Линейная скорость вдоль кривой (m/s)
    pub flight_speed: f32,
    /// Скорость доворота к касательной (slerp factor per second)
    pub rotation_speed: f32,
    /// Высота дуги относительно дистанции
    pub arc_height_factor: f32,
    /// ± jitter вертикали дуги (метры)
    pub arc_randomness: f32,
    /// Доля дистанции под длину ручки контрольной точки
    pub handle_ratio: f32,
    /// Максимальная длина ручки (метры)
    pub handle_cap: f32,
    /// Длительность landing blend (секунды)
    pub landing_duration: f32,
    /// Радиус замедления перед перчем (метры)
    pub slowdown_distance: f32,
    /// Минимальный множитель скорости у самого перча
    pub min_speed_multiplier: f32,
    /// Скорость подтягивания конца кривой к движущемуся перчу (1/s)
    pub perch_tracking_speed: f32,
    /// Степень всех кривых этой птицы
    pub curve_degree: CurveDegree,
    /// Сегменты для оценки длины дуги
    pub length_segments: u32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            flight_speed: 5.0,
            rotation_speed: 8.0,
            arc_height_factor: 0.25,
            arc_randomness: 0.5,
            handle_ratio: 0.33,
            handle_cap: 6.0,
            landing_duration: 0.5,
            slowdown_distance: 2.0,
            min_speed_multiplier: 0.3,
            perch_tracking_speed: 3.0,
            curve_degree: CurveDegree::Cubic,
            length_segments: 20,
        }
    }
}

impl FlightConfig {
    /// Нечисловые/отрицательные значения → default
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            flight_speed: checked(self.flight_speed, d.flight_speed, "flight_speed"),
            rotation_speed: checked(self.rotation_speed, d.rotation_speed, "rotation_speed"),
            arc_height_factor: checked(self.arc_height_factor, d.arc_height_factor, "arc_height_factor"),
            arc_randomness: checked(self.arc_randomness, d.arc_randomness, "arc_randomness"),
            handle_ratio: checked(self.handle_ratio, d.handle_ratio, "handle_ratio"),
            handle_cap: checked(self.handle_cap, d.handle_cap, "handle_cap"),
            landing_duration: checked(self.landing_duration, d.landing_duration, "landing_duration"),
            slowdown_distance: checked(self.slowdown_distance, d.slowdown_distance, "slowdown_distance"),
            min_speed_multiplier: checked(self.min_speed_multiplier, d.min_speed_multiplier, "min_speed_multiplier")
                .min(1.0),
            perch_tracking_speed: checked(self.perch_tracking_speed, d.perch_tracking_speed, "perch_tracking_speed"),
            curve_degree: self.curve_degree,
            length_segments: self.length_segments.max(1),
        }
    }
}

/// Параметры мотора (натяжение лески при посадке)
#[derive(Debug, Clone, Reflect, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Через сколько секунд после импульса мотор останавливается
    pub settle_delay: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self { settle_delay: 0.7 }
    }
}

impl MotorConfig {
    pub fn sanitized(self) -> Self {
        Self {
            settle_delay: checked(self.settle_delay, Self::default().settle_delay, "settle_delay"),
        }
    }
}

/// Параметры настроения
#[derive(Debug, Clone, Reflect, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodConfig {
    pub initial_level: f32,
    /// Штраф за удар
    pub punch_decrease: f32,
    /// Бонус за поглаживание
    pub pet_increase: f32,
    /// Выше — friendly пул waypoint'ов
    pub friendly_threshold: f32,
    /// Ниже — angry пул
    pub angry_threshold: f32,
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            initial_level: 100.0,
            punch_decrease: 20.0,
            pet_increase: 10.0,
            friendly_threshold: 60.0,
            angry_threshold: 40.0,
        }
    }
}

impl MoodConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            initial_level: checked(self.initial_level, d.initial_level, "initial_level"),
            punch_decrease: checked(self.punch_decrease, d.punch_decrease, "punch_decrease"),
            pet_increase: checked(self.pet_increase, d.pet_increase, "pet_increase"),
            friendly_threshold: checked(self.friendly_threshold, d.friendly_threshold, "friendly_threshold"),
            angry_threshold: checked(self.angry_threshold, d.angry_threshold, "angry_threshold"),
        }
    }
}

/// Классификация касаний руки (удар vs поглаживание)
#[derive(Component, Debug, Clone, Reflect, Serialize, Deserialize)]
#[reflect(Component)]
#[serde(default)]
pub struct HitConfig {
    /// Минимальная скорость руки для удара (m/s)
    pub min_hit_speed: f32,
    /// Импульс = скорость руки × multiplier
    pub force_multiplier: f32,
}

impl Default for HitConfig {
    fn default() -> Self {
        Self {
            min_hit_speed: 5.0,
            force_multiplier: 1.0,
        }
    }
}

impl HitConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            min_hit_speed: checked(self.min_hit_speed, d.min_hit_speed, "min_hit_speed"),
            force_multiplier: checked(self.force_multiplier, d.force_multiplier, "force_multiplier"),
        }
    }
}

/// Параметры USB serial handshake
#[derive(Debug, Clone, Reflect, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub baud_rate: u32,
    /// Пауза между попытками (секунды)
    pub retry_interval: f32,
    /// Бюджет попыток до Failed
    pub max_retries: u32,
    /// Пауза перед первой попыткой (активити/XR ещё поднимаются)
    pub startup_delay: f32,
    /// Пауза после выдачи permission перед re-init
    pub post_permission_delay: f32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            retry_interval: 2.0,
            max_retries: 10,
            startup_delay: 1.5,
            post_permission_delay: 1.0,
        }
    }
}

impl ConnectionConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            baud_rate: self.baud_rate,
            retry_interval: checked(self.retry_interval, d.retry_interval, "retry_interval"),
            max_retries: self.max_retries,
            startup_delay: checked(self.startup_delay, d.startup_delay, "startup_delay"),
            post_permission_delay: checked(self.post_permission_delay, d.post_permission_delay, "post_permission_delay"),
        }
    }
}

/// Все tunables одним документом (для загрузки host'ом)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BirdTuning {
    pub flight: FlightConfig,
    pub motor: MotorConfig,
    pub mood: MoodConfig,
    pub hit: HitConfig,
    pub connection: ConnectionConfig,
}

impl BirdTuning {
    /// Проверка после загрузки: все группы приводятся к допустимым значениям
    pub fn sanitized(self) -> Self {
        Self {
            flight: self.flight.sanitized(),
            motor: self.motor.sanitized(),
            mood: self.mood.sanitized(),
            hit: self.hit.sanitized(),
            connection: self.connection.sanitized(),
        }
    }
}

/// Конечное и ≥ 0, иначе fallback (с предупреждением)
fn checked(value: f32, fallback: f32, name: &str) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        crate::log_warning(&format!("Tunable {} = {} is invalid, using {}", name, value, fallback));
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flight_config_default() {
        let config = FlightConfig::default();
        assert_eq!(config.flight_speed, 5.0);
        assert_eq!(config.landing_duration, 0.5);
        assert_eq!(config.slowdown_distance, 2.0);
        assert_eq!(config.min_speed_multiplier, 0.3);
        assert_eq!(config.perch_tracking_speed, 3.0);
        assert_eq!(config.curve_degree, CurveDegree::Cubic);
    }

    #[test]
    fn test_partial_tuning_fills_defaults() {
        let json = r#"{
            "flight": { "flight_speed": 7.5 },
            "connection": { "max_retries": 3 }
        }"#;

        let tuning: BirdTuning = serde_json::from_str(json).unwrap();

        assert_eq!(tuning.flight.flight_speed, 7.5);
        assert_eq!(tuning.flight.rotation_speed, 8.0); // default
        assert_eq!(tuning.connection.max_retries, 3);
        assert_eq!(tuning.connection.baud_rate, 115_200); // default
        assert_eq!(tuning.motor.settle_delay, 0.7);
        assert_eq!(tuning.mood.initial_level, 100.0);
    }

    #[test]
    fn test_curve_degree_parses_by_name() {
        let json = r#"{ "curve_degree": "Quadratic" }"#;
        let config: FlightConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.curve_degree, CurveDegree::Quadratic);
    }

    #[test]
    fn test_sanitized_replaces_non_finite_tunables() {
        let tuning = BirdTuning {
            flight: FlightConfig {
                arc_randomness: f32::INFINITY,
                landing_duration: f32::NAN,
                flight_speed: 9.0,
                length_segments: 0,
                ..Default::default()
            },
            motor: MotorConfig {
                settle_delay: f32::INFINITY,
            },
            hit: HitConfig {
                min_hit_speed: -1.0,
                ..Default::default()
            },
            connection: ConnectionConfig {
                retry_interval: f32::NEG_INFINITY,
                ..Default::default()
            },
            ..Default::default()
        }
        .sanitized();

        assert_eq!(tuning.flight.arc_randomness, 0.5);
        assert_eq!(tuning.flight.landing_duration, 0.5);
        assert_eq!(tuning.flight.flight_speed, 9.0);
        assert_eq!(tuning.flight.length_segments, 1);
        assert_eq!(tuning.motor.settle_delay, 0.7);
        assert_eq!(tuning.hit.min_hit_speed, 5.0);
        assert_eq!(tuning.connection.retry_interval, 2.0);
    }

    #[test]
    fn test_sanitized_keeps_valid_tuning() {
        let tuning = BirdTuning::default().sanitized();
        assert_eq!(tuning.motor.settle_delay, 0.7);
        assert_eq!(tuning.flight.arc_randomness, 0.5);
        assert_eq!(tuning.connection.max_retries, 10);
    }
}
