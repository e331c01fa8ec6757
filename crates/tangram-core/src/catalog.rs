//! 拼块目录
//!
//! 七种固定形状的局部顶点表。单位长度 = 小三角形直角边，
//! 顶点按逆时针排列，第 `i` 条边从顶点 `i` 指向顶点 `(i+1) % n`。

use crate::math::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// 拼块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PieceType {
    SmallTriangle1,
    SmallTriangle2,
    MediumTriangle,
    LargeTriangle1,
    LargeTriangle2,
    Square,
    Parallelogram,
}

const SMALL_TRIANGLE: [(f64, f64); 3] = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
const MEDIUM_TRIANGLE: [(f64, f64); 3] = [(0.0, 0.0), (2.0, 0.0), (1.0, 1.0)];
const LARGE_TRIANGLE: [(f64, f64); 3] = [(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)];
const SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
const PARALLELOGRAM: [(f64, f64); 4] = [(0.0, 0.0), (1.0, 0.0), (2.0, 1.0), (1.0, 1.0)];

impl PieceType {
    /// 全部七种拼块
    pub const ALL: [PieceType; 7] = [
        PieceType::SmallTriangle1,
        PieceType::SmallTriangle2,
        PieceType::MediumTriangle,
        PieceType::LargeTriangle1,
        PieceType::LargeTriangle2,
        PieceType::Square,
        PieceType::Parallelogram,
    ];

    /// 稳定的标识名
    pub fn name(&self) -> &'static str {
        match self {
            PieceType::SmallTriangle1 => "smallTriangle1",
            PieceType::SmallTriangle2 => "smallTriangle2",
            PieceType::MediumTriangle => "mediumTriangle",
            PieceType::LargeTriangle1 => "largeTriangle1",
            PieceType::LargeTriangle2 => "largeTriangle2",
            PieceType::Square => "square",
            PieceType::Parallelogram => "parallelogram",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// 显示名
    pub fn display_name(&self) -> &'static str {
        match self {
            PieceType::SmallTriangle1 | PieceType::SmallTriangle2 => "小三角形",
            PieceType::MediumTriangle => "中三角形",
            PieceType::LargeTriangle1 | PieceType::LargeTriangle2 => "大三角形",
            PieceType::Square => "正方形",
            PieceType::Parallelogram => "平行四边形",
        }
    }

    fn raw(&self) -> &'static [(f64, f64)] {
        match self {
            PieceType::SmallTriangle1 | PieceType::SmallTriangle2 => &SMALL_TRIANGLE,
            PieceType::MediumTriangle => &MEDIUM_TRIANGLE,
            PieceType::LargeTriangle1 | PieceType::LargeTriangle2 => &LARGE_TRIANGLE,
            PieceType::Square => &SQUARE,
            PieceType::Parallelogram => &PARALLELOGRAM,
        }
    }

    /// 局部坐标顶点
    pub fn vertices(&self) -> Vec<Point2> {
        self.raw().iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.raw().len()
    }

    /// 边数（闭合多边形，与顶点数相同）
    pub fn edge_count(&self) -> usize {
        self.vertex_count()
    }

    /// 局部坐标边 `(起点, 终点)`
    pub fn edges(&self) -> Vec<(Point2, Point2)> {
        let v = self.vertices();
        let n = v.len();
        (0..n).map(|i| (v[i], v[(i + 1) % n])).collect()
    }

    /// 局部面积（单位：小三角形直角边的平方）
    pub fn area(&self) -> f64 {
        match self {
            PieceType::SmallTriangle1 | PieceType::SmallTriangle2 => 0.5,
            PieceType::MediumTriangle => 1.0,
            PieceType::LargeTriangle1 | PieceType::LargeTriangle2 => 2.0,
            PieceType::Square | PieceType::Parallelogram => 1.0,
        }
    }

    /// 局部质心（顶点均值；对三角形和平行四边形与面积质心一致）
    pub fn centroid(&self) -> Point2 {
        let raw = self.raw();
        let sum = raw
            .iter()
            .fold(Vector2::zeros(), |acc, &(x, y)| acc + Vector2::new(x, y));
        Point2::from(sum / raw.len() as f64)
    }

    /// 是否允许镜像
    pub fn can_flip(&self) -> bool {
        matches!(self, PieceType::Parallelogram)
    }
}

impl std::fmt::Display for PieceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
