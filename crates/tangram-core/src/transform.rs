//! 二维刚体变换
//!
//! 七巧板拼块只允许旋转 + 平移（缩放恒为 1），平行四边形额外允许镜像。
//! 变换作用于已按视觉比例放大的局部坐标：
//!
//! `p' = translation + R(rotation) * F * p`，其中 `F` 在 `flipped` 时沿 x 轴镜像。

use crate::math::{normalize_angle, Point2, Vector2};
use nalgebra::{Matrix3, Rotation2};
use serde::{Deserialize, Serialize};

/// 二维变换
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    /// 旋转角度（度，[0, 360)）
    pub rotation: f64,
    /// 平移
    pub translation: Vector2,
    /// 是否镜像（仅平行四边形）
    #[serde(default)]
    pub flipped: bool,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    pub fn identity() -> Self {
        Self {
            rotation: 0.0,
            translation: Vector2::zeros(),
            flipped: false,
        }
    }

    pub fn new(rotation: f64, translation: Vector2, flipped: bool) -> Self {
        Self {
            rotation: normalize_angle(rotation),
            translation,
            flipped,
        }
    }

    /// 纯平移
    pub fn from_translation(translation: Vector2) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    fn linear(&self, v: &Vector2) -> Vector2 {
        let mirrored = if self.flipped {
            Vector2::new(-v.x, v.y)
        } else {
            *v
        };
        Rotation2::new(self.rotation.to_radians()) * mirrored
    }

    /// 变换点
    pub fn apply(&self, p: &Point2) -> Point2 {
        Point2::from(self.linear(&p.coords) + self.translation)
    }

    /// 变换方向向量（不含平移）
    pub fn apply_vector(&self, v: &Vector2) -> Vector2 {
        self.linear(v)
    }

    /// 在世界坐标中再平移
    pub fn translated(&self, delta: Vector2) -> Self {
        Self {
            translation: self.translation + delta,
            ..*self
        }
    }

    /// 在世界坐标中绕 `pivot` 再旋转 `delta` 度
    pub fn rotated_about(&self, pivot: &Point2, delta: f64) -> Self {
        let rot = Rotation2::new(delta.to_radians());
        let offset = self.translation - pivot.coords;
        Self {
            rotation: normalize_angle(self.rotation + delta),
            translation: pivot.coords + rot * offset,
            flipped: self.flipped,
        }
    }

    /// 齐次 3x3 矩阵（供渲染层使用）
    #[rustfmt::skip]
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let ex = self.linear(&Vector2::x());
        let ey = self.linear(&Vector2::y());
        Matrix3::new(
            ex.x, ey.x, self.translation.x,
            ex.y, ey.y, self.translation.y,
            0.0, 0.0, 1.0,
        )
    }

    /// 所有分量是否有限（退化几何可能产生 NaN）
    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite() && self.translation.x.is_finite() && self.translation.y.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_point_eq(a: Point2, b: Point2) {
        assert!((a - b).norm() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_apply_rotation_translation() {
        let t = Transform2D::new(90.0, Vector2::new(10.0, 0.0), false);
        assert_point_eq(t.apply(&Point2::new(1.0, 0.0)), Point2::new(10.0, 1.0));
    }

    #[test]
    fn test_flip() {
        let t = Transform2D::new(0.0, Vector2::zeros(), true);
        assert_point_eq(t.apply(&Point2::new(2.0, 1.0)), Point2::new(-2.0, 1.0));
    }

    #[test]
    fn test_rotated_about_keeps_pivot() {
        let t = Transform2D::new(30.0, Vector2::new(5.0, 7.0), true);
        let local = Point2::new(3.0, 4.0);
        let pivot = t.apply(&local);
        let r = t.rotated_about(&pivot, 135.0);
        assert_point_eq(r.apply(&local), pivot);
        assert!((r.rotation - 165.0).abs() < 1e-9);
    }

    #[test]
    fn test_matrix_matches_apply() {
        let t = Transform2D::new(45.0, Vector2::new(-3.0, 2.0), true);
        let p = Point2::new(1.5, -2.0);
        let m = t.to_matrix() * nalgebra::Vector3::new(p.x, p.y, 1.0);
        assert_point_eq(Point2::new(m.x, m.y), t.apply(&p));
    }

    #[test]
    fn test_non_finite() {
        let t = Transform2D::from_translation(Vector2::new(f64::NAN, 0.0));
        assert!(!t.is_finite());
        assert!(Transform2D::identity().is_finite());
    }
}
