//! PathPlanner — выбор следующей кривой полёта
//!
//! Cruise: случайный waypoint из пула по настроению (без повтора предыдущего).
//! Perch approach: та же дуга, но конец = перч, конец подтягивается каждый тик.
//!
//! Контрольные точки:
//! - start = текущая позиция (фиксируется при создании)
//! - ручка старта вдоль текущего heading (непрерывность направления)
//! - вертикальная дуга `distance × arc_height_factor ± jitter` только по Y

use bevy::prelude::*;
use rand::Rng;

use crate::config::FlightConfig;
use crate::curve::{BezierCurve, CurveDegree, MIN_CURVE_LENGTH};
use crate::mood::MoodBucket;

/// Маркер: entity — waypoint (resolved handle, не ищется по тегу)
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Waypoint;

/// Пулы waypoint'ов птицы, переданные при спавне
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct WaypointPools {
    pub friendly: Vec<Entity>,
    pub neutral: Vec<Entity>,
    pub angry: Vec<Entity>,
}

impl WaypointPools {
    pub fn pool(&self, bucket: MoodBucket) -> &[Entity] {
        match bucket {
            MoodBucket::Friendly => &self.friendly,
            MoodBucket::Neutral => &self.neutral,
            MoodBucket::Angry => &self.angry,
        }
    }
}

/// Кривая + прогресс + кэш длины
///
/// Инвариант: start кривой не меняется после создания;
/// конец меняется только при `tracks_target == true`.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct FlightPath {
    pub curve: BezierCurve,
    /// Прогресс в [0, 1]
    pub t: f32,
    /// Кэш оценки длины (≥ MIN_CURVE_LENGTH)
    pub length: f32,
    /// Конец следует за движущейся целью (перч)
    pub tracks_target: bool,
}

impl FlightPath {
    pub fn new(curve: BezierCurve, tracks_target: bool, segments: u32) -> Self {
        Self {
            curve,
            t: 0.0,
            length: curve.safe_length(segments),
            tracks_target,
        }
    }

    pub fn refresh_length(&mut self, segments: u32) {
        self.length = self.curve.safe_length(segments);
    }

    pub fn is_complete(&self) -> bool {
        self.t >= 1.0
    }

    /// Вырожденная кривая (start ≈ end) — двигаться некуда
    ///
    /// Смотрим на концы, а не на длину: jitter дуги даёт петлю ненулевой длины.
    pub fn is_degenerate(&self) -> bool {
        self.curve.start().distance(self.curve.end()) <= MIN_CURVE_LENGTH
    }
}

/// Планировщик маршрутов (одна птица)
#[derive(Debug, Clone, Default, Reflect)]
pub struct PathPlanner {
    last_waypoint: Option<Entity>,
}

impl PathPlanner {
    pub fn last_waypoint(&self) -> Option<Entity> {
        self.last_waypoint
    }

    /// Новый cruise маршрут к случайному waypoint'у пула
    ///
    /// `candidates` — (waypoint, позиция) уже выбранного по настроению пула.
    /// Пустой пул → None (вызывающий остаётся на месте).
    pub fn plan_cruise<R: Rng>(
        &mut self,
        current: Vec3,
        heading: Option<Vec3>,
        candidates: &[(Entity, Vec3)],
        rng: &mut R,
        config: &FlightConfig,
    ) -> Option<FlightPath> {
        if candidates.is_empty() {
            return None;
        }

        // Исключаем предыдущую цель, чтобы не летать туда-обратно между двумя точками
        let eligible: Vec<&(Entity, Vec3)> = if candidates.len() > 1 {
            candidates
                .iter()
                .filter(|(entity, _)| Some(*entity) != self.last_waypoint)
                .collect()
        } else {
            candidates.iter().collect()
        };

        // Все кандидаты == last_waypoint (дубли в пуле) — берём любой
        let eligible = if eligible.is_empty() {
            candidates.iter().collect()
        } else {
            eligible
        };

        let &(target, destination) = eligible[rng.gen_range(0..eligible.len())];
        self.last_waypoint = Some(target);

        let curve = build_arc(current, destination, heading, rng, config);
        Some(FlightPath::new(curve, false, config.length_segments))
    }

    /// Маршрут к перчу (конец будет подтягиваться `retarget_perch_end`)
    pub fn plan_perch_approach<R: Rng>(
        &mut self,
        current: Vec3,
        heading: Option<Vec3>,
        perch_position: Vec3,
        rng: &mut R,
        config: &FlightConfig,
    ) -> FlightPath {
        // После посадки cruise может снова выбрать любой waypoint
        self.last_waypoint = None;

        let curve = build_arc(current, perch_position, heading, rng, config);
        FlightPath::new(curve, true, config.length_segments)
    }
}

/// Строит дугу start → end
///
/// Без heading (или нулевой heading) ручка старта смотрит прямо на цель.
pub fn build_arc<R: Rng>(
    start: Vec3,
    end: Vec3,
    heading: Option<Vec3>,
    rng: &mut R,
    config: &FlightConfig,
) -> BezierCurve {
    let distance = start.distance(end);
    let direction = (end - start).normalize_or_zero();
    let exit_direction = heading
        .and_then(|h| h.try_normalize())
        .unwrap_or(direction);

    let handle = (distance * config.handle_ratio).min(config.handle_cap);

    let jitter = if config.arc_randomness.is_finite() && config.arc_randomness > 0.0 {
        rng.gen_range(-config.arc_randomness..=config.arc_randomness)
    } else {
        0.0
    };
    let arc = distance * config.arc_height_factor + jitter;

    match config.curve_degree {
        CurveDegree::Cubic => {
            let p1 = start + exit_direction * handle + Vec3::Y * arc;
            let p2 = end - direction * handle + Vec3::Y * (arc * 0.5);
            BezierCurve::cubic(start, p1, p2, end)
        }
        CurveDegree::Quadratic => {
            let p1 = start + exit_direction * handle + Vec3::Y * arc;
            BezierCurve::quadratic(start, p1, end)
        }
    }
}

/// Подтягивает конец кривой к живой позиции перча
///
/// Кривая деформируется под летящей птицей; длина пересчитывается сразу.
pub fn retarget_perch_end(
    path: &mut FlightPath,
    perch_position: Vec3,
    tracking_speed: f32,
    dt: f32,
    segments: u32,
) {
    if !path.tracks_target {
        return;
    }

    let factor = (tracking_speed * dt).clamp(0.0, 1.0);
    let end = path.curve.end_mut();
    *end = end.lerp(perch_position, factor);
    path.refresh_length(segments);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn waypoint(index: u32) -> Entity {
        Entity::from_raw(index)
    }

    #[test]
    fn test_empty_pool_is_noop() {
        let mut planner = PathPlanner::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let path = planner.plan_cruise(Vec3::ZERO, None, &[], &mut rng, &FlightConfig::default());
        assert!(path.is_none());
        assert!(planner.last_waypoint().is_none());
    }

    #[test]
    fn test_two_waypoints_never_repeat() {
        let mut planner = PathPlanner::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let config = FlightConfig::default();
        let pool = [
            (waypoint(1), Vec3::new(10.0, 2.0, 0.0)),
            (waypoint(2), Vec3::new(-10.0, 3.0, 5.0)),
        ];

        let mut previous = None;
        for _ in 0..200 {
            let path = planner
                .plan_cruise(Vec3::ZERO, Some(Vec3::Z), &pool, &mut rng, &config)
                .unwrap();
            let chosen = planner.last_waypoint();
            assert_ne!(chosen, previous);
            assert!(pool.iter().any(|(_, pos)| *pos == path.curve.end()));
            previous = chosen;
        }
    }

    #[test]
    fn test_single_waypoint_pool_repeats() {
        let mut planner = PathPlanner::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = FlightConfig::default();
        let pool = [(waypoint(5), Vec3::new(4.0, 0.0, 0.0))];

        for _ in 0..3 {
            assert!(planner
                .plan_cruise(Vec3::ZERO, None, &pool, &mut rng, &config)
                .is_some());
            assert_eq!(planner.last_waypoint(), Some(waypoint(5)));
        }
    }

    #[test]
    fn test_arc_control_points() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let config = FlightConfig {
            arc_randomness: 0.0,
            ..default()
        };
        let start = Vec3::ZERO;
        let end = Vec3::new(30.0, 0.0, 0.0); // handle = min(9.9, 6) = 6
        let curve = build_arc(start, end, Some(Vec3::Z), &mut rng, &config);

        let BezierCurve::Cubic { p0, p1, p2, p3 } = curve else {
            panic!("expected cubic curve");
        };
        let arc = 30.0 * config.arc_height_factor;
        assert_eq!(p0, start);
        assert_eq!(p3, end);
        assert!((p1 - Vec3::new(0.0, arc, 6.0)).length() < 1e-5);
        assert!((p2 - Vec3::new(24.0, arc * 0.5, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_arc_jitter_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let config = FlightConfig::default();
        let end = Vec3::new(8.0, 0.0, 0.0);
        for _ in 0..100 {
            let curve = build_arc(Vec3::ZERO, end, None, &mut rng, &config);
            let BezierCurve::Cubic { p1, .. } = curve else {
                panic!("expected cubic curve");
            };
            let base = 8.0 * config.arc_height_factor;
            assert!(p1.y >= base - config.arc_randomness - 1e-5);
            assert!(p1.y <= base + config.arc_randomness + 1e-5);
        }
    }

    #[test]
    fn test_perch_approach_without_heading_points_at_target() {
        let mut planner = PathPlanner::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let config = FlightConfig {
            arc_randomness: 0.0,
            arc_height_factor: 0.0,
            ..default()
        };
        let perch = Vec3::new(0.0, 0.0, -9.0);
        let path = planner.plan_perch_approach(Vec3::ZERO, None, perch, &mut rng, &config);

        assert!(path.tracks_target);
        assert_eq!(path.t, 0.0);
        // Без дуги и heading кривая — отрезок: длина = дистанции
        assert!((path.length - 9.0).abs() < 1e-3);
        let tangent = path.curve.tangent(0.0).normalize();
        assert!((tangent - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_quadratic_degree_builds_quadratic() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let config = FlightConfig {
            curve_degree: CurveDegree::Quadratic,
            ..default()
        };
        let curve = build_arc(Vec3::ZERO, Vec3::X * 5.0, None, &mut rng, &config);
        assert_eq!(curve.degree(), CurveDegree::Quadratic);
        assert_eq!(curve.end(), Vec3::X * 5.0);
    }

    #[test]
    fn test_degenerate_path_has_length_floor() {
        let mut planner = PathPlanner::default();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let config = FlightConfig {
            arc_randomness: 0.0,
            ..default()
        };
        let here = Vec3::new(1.0, 1.0, 1.0);
        let path = planner
            .plan_cruise(here, None, &[(waypoint(1), here)], &mut rng, &config)
            .unwrap();
        assert_eq!(path.length, MIN_CURVE_LENGTH);
        assert!(path.is_degenerate());
        assert!(path.curve.position(0.5).is_finite());
    }

    #[test]
    fn test_retarget_converges_to_moving_perch() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let config = FlightConfig::default();
        let mut planner = PathPlanner::default();
        let mut perch = Vec3::new(0.0, 1.5, -10.0);
        let velocity = Vec3::new(0.5, 0.0, 0.0);
        let mut path = planner.plan_perch_approach(Vec3::ZERO, None, perch, &mut rng, &config);

        let dt = 1.0 / 60.0;
        // 3 time constants (1 / tracking_speed) — lag settles near v / k
        for _ in 0..180 {
            perch += velocity * dt;
            retarget_perch_end(&mut path, perch, config.perch_tracking_speed, dt, 20);
        }

        let steady_lag = velocity.length() / config.perch_tracking_speed;
        let error = path.curve.end().distance(perch);
        assert!(error < steady_lag * 1.2, "error={} lag={}", error, steady_lag);
        assert_eq!(path.curve.start(), Vec3::ZERO);
    }

    #[test]
    fn test_retarget_ignores_cruise_paths() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut planner = PathPlanner::default();
        let config = FlightConfig::default();
        let end = Vec3::new(3.0, 0.0, 3.0);
        let mut path = planner
            .plan_cruise(Vec3::ZERO, None, &[(waypoint(1), end)], &mut rng, &config)
            .unwrap();
        retarget_perch_end(&mut path, Vec3::new(50.0, 0.0, 0.0), 3.0, 0.1, 20);
        assert_eq!(path.curve.end(), end);
    }

    #[test]
    fn test_non_finite_jitter_is_ignored() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let config = FlightConfig {
            arc_randomness: f32::INFINITY,
            ..Default::default()
        };
        let end = Vec3::new(8.0, 0.0, 0.0);
        let curve = build_arc(Vec3::ZERO, end, Some(Vec3::X), &mut rng, &config);

        assert_eq!(curve.end(), end);
        assert!(curve.position(0.5).is_finite());
    }
}
