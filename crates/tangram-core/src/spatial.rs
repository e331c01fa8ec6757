//! 空间索引
//!
//! 基于均匀网格的宽相位（broad phase）：整体校验时先用包围盒筛出可能接触的拼块对，
//! 再交给几何内核做精确判定。七巧板最多几十块，网格足够。

use crate::math::{BoundingBox2, Point2};
use crate::piece::{Piece, PieceId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// 基于网格的空间索引
#[derive(Debug)]
pub struct SpatialIndex {
    /// 网格单元大小
    cell_size: f64,

    /// 网格映射：网格坐标 -> 拼块列表
    grid: HashMap<(i64, i64), Vec<PieceId>>,

    /// 拼块的包围盒缓存
    bboxes: HashMap<PieceId, BoundingBox2>,
}

impl SpatialIndex {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 100.0 },
            grid: HashMap::new(),
            bboxes: HashMap::new(),
        }
    }

    /// 为一组拼块建索引；网格大小取两倍视觉比例（大三角形的直角边长）
    pub fn from_pieces(pieces: &[Piece], visual_scale: f64) -> Self {
        let mut index = Self::new(visual_scale * 2.0);
        for piece in pieces {
            index.insert(piece.id.clone(), piece.bounding_box(visual_scale));
        }
        index
    }

    fn to_grid_coord(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// 包围盒覆盖的所有网格单元
    fn cells_for_bbox(&self, bbox: &BoundingBox2) -> Vec<(i64, i64)> {
        if bbox.is_empty() {
            return Vec::new();
        }
        let (min_gx, min_gy) = self.to_grid_coord(bbox.min.x, bbox.min.y);
        let (max_gx, max_gy) = self.to_grid_coord(bbox.max.x, bbox.max.y);

        let mut cells = Vec::new();
        for gx in min_gx..=max_gx {
            for gy in min_gy..=max_gy {
                cells.push((gx, gy));
            }
        }
        cells
    }

    /// 插入（已存在则替换）
    pub fn insert(&mut self, id: PieceId, bbox: BoundingBox2) {
        self.remove(&id);
        for cell in self.cells_for_bbox(&bbox) {
            self.grid.entry(cell).or_default().push(id.clone());
        }
        self.bboxes.insert(id, bbox);
    }

    pub fn remove(&mut self, id: &PieceId) -> bool {
        let Some(bbox) = self.bboxes.remove(id) else {
            return false;
        };
        for cell in self.cells_for_bbox(&bbox) {
            if let Some(ids) = self.grid.get_mut(&cell) {
                ids.retain(|e| e != id);
            }
        }
        true
    }

    /// 范围查询：包围盒（放宽 `tolerance`）与 `rect` 相交的拼块
    pub fn query_rect(&self, rect: &BoundingBox2, tolerance: f64) -> Vec<PieceId> {
        let mut expanded = *rect;
        expanded.expand(&Point2::new(rect.min.x - tolerance, rect.min.y - tolerance));
        expanded.expand(&Point2::new(rect.max.x + tolerance, rect.max.y + tolerance));

        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for cell in self.cells_for_bbox(&expanded) {
            let Some(ids) = self.grid.get(&cell) else {
                continue;
            };
            for id in ids {
                if seen.insert(id) {
                    if let Some(bbox) = self.bboxes.get(id) {
                        if bbox.intersects(rect, tolerance) {
                            result.push(id.clone());
                        }
                    }
                }
            }
        }
        result
    }

    /// 包围盒相交（放宽 `tolerance`）的所有拼块对，每对只出现一次且按ID排序
    pub fn candidate_pairs(&self, tolerance: f64) -> Vec<(PieceId, PieceId)> {
        let mut pairs = BTreeSet::new();
        for (id, bbox) in &self.bboxes {
            for other in self.query_rect(bbox, tolerance) {
                if &other == id {
                    continue;
                }
                let pair = if id < &other {
                    (id.clone(), other)
                } else {
                    (other, id.clone())
                };
                pairs.insert(pair);
            }
        }
        pairs.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PieceType;
    use crate::math::Vector2;
    use crate::transform::Transform2D;

    fn square(id: &str, x: f64, y: f64) -> Piece {
        Piece::new(
            id.into(),
            PieceType::Square,
            Transform2D::from_translation(Vector2::new(x, y)),
        )
    }

    #[test]
    fn test_candidate_pairs_skip_far_pieces() {
        let pieces = vec![square("a", 0.0, 0.0), square("b", 50.0, 0.0), square("c", 500.0, 500.0)];
        let index = SpatialIndex::from_pieces(&pieces, 50.0);
        assert_eq!(index.len(), 3);
        assert_eq!(
            index.candidate_pairs(1.0),
            vec![(PieceId::new("a"), PieceId::new("b"))]
        );
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let mut index = SpatialIndex::new(100.0);
        let id = PieceId::new("a");
        index.insert(
            id.clone(),
            BoundingBox2::new(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0)),
        );
        index.insert(
            id.clone(),
            BoundingBox2::new(Point2::new(300.0, 300.0), Point2::new(310.0, 310.0)),
        );
        let near_origin = BoundingBox2::new(Point2::new(4.0, 4.0), Point2::new(6.0, 6.0));
        assert!(index.query_rect(&near_origin, 0.0).is_empty());
        let moved = BoundingBox2::new(Point2::new(304.0, 304.0), Point2::new(306.0, 306.0));
        assert_eq!(index.query_rect(&moved, 0.0), vec![id.clone()]);
        assert_eq!(index.len(), 1);

        assert!(index.remove(&id));
        assert!(!index.remove(&id));
        assert!(index.is_empty());
    }
}
