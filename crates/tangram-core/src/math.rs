//! 基础数学类型
//!
//! 基于 nalgebra 的二维点/向量别名，以及包围盒和角度工具函数。

use serde::{Deserialize, Serialize};

/// 二维点
pub type Point2 = nalgebra::Point2<f64>;

/// 二维向量
pub type Vector2 = nalgebra::Vector2<f64>;

/// 数值计算的通用极小量
pub const EPSILON: f64 = 1e-10;

/// 二维叉积（z 分量）
#[inline]
pub fn cross(a: &Vector2, b: &Vector2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// 将角度归一化到 [0, 360)
pub fn normalize_angle(degrees: f64) -> f64 {
    let mut a = degrees % 360.0;
    if a < 0.0 {
        a += 360.0;
    }
    // 极小负数加 360 后可能恰好等于 360
    if a >= 360.0 {
        a -= 360.0;
    }
    a + 0.0
}

/// 将角度归一化到 (-180, 180]
pub fn signed_angle(degrees: f64) -> f64 {
    let a = normalize_angle(degrees);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2 {
    pub min: Point2,
    pub max: Point2,
}

impl BoundingBox2 {
    pub fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    /// 空包围盒（任何 expand 后都有效）
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::INFINITY, f64::INFINITY),
            max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// 从点集构建
    pub fn from_points(points: impl IntoIterator<Item = Point2>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.expand(&p);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn expand(&mut self, p: &Point2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point2 {
        nalgebra::center(&self.min, &self.max)
    }

    /// 两个包围盒是否相交（边界相接也算，容差向外扩展）
    pub fn intersects(&self, other: &BoundingBox2, tolerance: f64) -> bool {
        self.min.x <= other.max.x + tolerance
            && other.min.x <= self.max.x + tolerance
            && self.min.y <= other.max.y + tolerance
            && other.min.y <= self.max.y + tolerance
    }

    /// 是否完全包含另一个包围盒
    pub fn contains(&self, other: &BoundingBox2, tolerance: f64) -> bool {
        other.min.x >= self.min.x - tolerance
            && other.min.y >= self.min.y - tolerance
            && other.max.x <= self.max.x + tolerance
            && other.max.y <= self.max.y + tolerance
    }
}

/// 画布尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn bounds(&self) -> BoundingBox2 {
        BoundingBox2::new(Point2::origin(), Point2::new(self.width, self.height))
    }
}
