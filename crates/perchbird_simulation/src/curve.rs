//! Bézier кривые для полёта
//!
//! Чистая математика, без ECS state.
//! Степень кривой выбирается явно (enum variant), никогда не угадывается
//! по количеству точек.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Нижняя граница длины кривой (метры)
///
/// Делим на длину при переводе линейной скорости в Δt —
/// вырожденная кривая (start == end) не должна давать inf/NaN.
pub const MIN_CURVE_LENGTH: f32 = 0.01;

/// Степень кривой
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum CurveDegree {
    Quadratic,
    #[default]
    Cubic,
}

/// Bézier кривая в world space
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum BezierCurve {
    Quadratic { p0: Vec3, p1: Vec3, p2: Vec3 },
    Cubic { p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3 },
}

impl BezierCurve {
    pub fn cubic(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> Self {
        Self::Cubic { p0, p1, p2, p3 }
    }

    pub fn quadratic(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        Self::Quadratic { p0, p1, p2 }
    }

    pub fn degree(&self) -> CurveDegree {
        match self {
            Self::Quadratic { .. } => CurveDegree::Quadratic,
            Self::Cubic { .. } => CurveDegree::Cubic,
        }
    }

    pub fn start(&self) -> Vec3 {
        match *self {
            Self::Quadratic { p0, .. } | Self::Cubic { p0, .. } => p0,
        }
    }

    pub fn end(&self) -> Vec3 {
        match *self {
            Self::Quadratic { p2, .. } => p2,
            Self::Cubic { p3, .. } => p3,
        }
    }

    /// Конечная контрольная точка (мутируется только при tracking перча)
    pub fn end_mut(&mut self) -> &mut Vec3 {
        match self {
            Self::Quadratic { p2, .. } => p2,
            Self::Cubic { p3, .. } => p3,
        }
    }

    /// Позиция на кривой
    ///
    /// `position(0) == start()` и `position(1) == end()` точно (без погрешности):
    /// при t=0/1 все лишние веса становятся ровно нулём.
    pub fn position(&self, t: f32) -> Vec3 {
        let u = 1.0 - t;
        match *self {
            Self::Quadratic { p0, p1, p2 } => u * u * p0 + 2.0 * u * t * p1 + t * t * p2,
            Self::Cubic { p0, p1, p2, p3 } => {
                u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
            }
        }
    }

    /// Аналитическая производная по t
    ///
    /// Vec3::ZERO только при совпадающих контрольных точках —
    /// вызывающий обязан оставить последний известный heading.
    pub fn tangent(&self, t: f32) -> Vec3 {
        let u = 1.0 - t;
        match *self {
            Self::Quadratic { p0, p1, p2 } => 2.0 * u * (p1 - p0) + 2.0 * t * (p2 - p1),
            Self::Cubic { p0, p1, p2, p3 } => {
                3.0 * u * u * (p1 - p0) + 6.0 * u * t * (p2 - p1) + 3.0 * t * t * (p3 - p2)
            }
        }
    }

    /// Длина ломаной из `segments` отрезков (детерминирована для фиксированных входов)
    pub fn estimate_length(&self, segments: u32) -> f32 {
        let segments = segments.max(1);
        let mut length = 0.0;
        let mut prev = self.start();

        for i in 1..=segments {
            let t = i as f32 / segments as f32;
            let point = self.position(t);
            length += prev.distance(point);
            prev = point;
        }

        length
    }

    /// Длина с нижней границей `MIN_CURVE_LENGTH` (безопасно делить)
    pub fn safe_length(&self, segments: u32) -> f32 {
        self.estimate_length(segments).max(MIN_CURVE_LENGTH)
    }
}
