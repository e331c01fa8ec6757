//! 拼块实例
//!
//! `Piece` 是某个 [`PieceType`] 在画布上的一次放置，带有自己的变换。
//! 顶点/边引用不单独存储，按需从局部索引计算世界坐标。

use crate::catalog::PieceType;
use crate::geometry::{centroid, transform_vertices, Segment};
use crate::math::{BoundingBox2, Point2};
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};

/// 拼块ID（唯一字符串）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub String);

impl PieceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 生成新的随机ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PieceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PieceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PieceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 已放置的拼块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    #[serde(rename = "type")]
    pub piece_type: PieceType,
    pub transform: Transform2D,
}

impl Piece {
    pub fn new(id: PieceId, piece_type: PieceType, transform: Transform2D) -> Self {
        Self {
            id,
            piece_type,
            transform,
        }
    }

    /// 按视觉比例放大后的局部顶点
    pub fn scaled_local_vertices(&self, visual_scale: f64) -> Vec<Point2> {
        self.piece_type
            .vertices()
            .into_iter()
            .map(|v| Point2::from(v.coords * visual_scale))
            .collect()
    }

    /// 世界坐标顶点
    pub fn world_vertices(&self, visual_scale: f64) -> Vec<Point2> {
        transform_vertices(&self.scaled_local_vertices(visual_scale), &self.transform)
    }

    /// 单个世界坐标顶点；索引越界返回 `None`
    pub fn world_vertex(&self, index: usize, visual_scale: f64) -> Option<Point2> {
        let local = self.piece_type.vertices().get(index).copied()?;
        Some(self.transform.apply(&Point2::from(local.coords * visual_scale)))
    }

    /// 单条世界坐标边（顶点 i 到顶点 i+1）；索引越界返回 `None`
    pub fn world_edge(&self, index: usize, visual_scale: f64) -> Option<Segment> {
        let n = self.piece_type.vertex_count();
        if index >= n {
            return None;
        }
        Some(Segment::new(
            self.world_vertex(index, visual_scale)?,
            self.world_vertex((index + 1) % n, visual_scale)?,
        ))
    }

    /// 世界坐标质心
    pub fn world_centroid(&self, visual_scale: f64) -> Point2 {
        centroid(&self.world_vertices(visual_scale))
    }

    pub fn bounding_box(&self, visual_scale: f64) -> BoundingBox2 {
        BoundingBox2::from_points(self.world_vertices(visual_scale))
    }

    /// 换一个变换的副本（用于预览计算）
    pub fn with_transform(&self, transform: Transform2D) -> Self {
        Self {
            transform,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector2;

    #[test]
    fn test_world_geometry() {
        let piece = Piece::new(
            PieceId::new("sq"),
            PieceType::Square,
            Transform2D::from_translation(Vector2::new(100.0, 200.0)),
        );
        assert_eq!(piece.world_vertex(2, 50.0), Some(Point2::new(150.0, 250.0)));
        assert_eq!(piece.world_vertex(4, 50.0), None);

        let edge = piece.world_edge(3, 50.0).unwrap();
        assert_eq!(edge.start, Point2::new(100.0, 250.0));
        assert_eq!(edge.end, Point2::new(100.0, 200.0));
        assert!(piece.world_edge(4, 50.0).is_none());

        assert_eq!(piece.world_centroid(50.0), Point2::new(125.0, 225.0));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(PieceId::generate(), PieceId::generate());
    }
}
