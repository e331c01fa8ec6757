//! 校验引擎
//!
//! 整体拼图检查，三项全部通过才算合法拼装：
//! 1. 任意两块之间没有面积重叠
//! 2. 每一处边接触都有对应的连接（顶点接触不需要）
//! 3. 从第 0 块出发可以经由连接到达所有拼块
//!
//! 两两检查前先用 [`SpatialIndex`] 做包围盒筛选。

use crate::config::{ConnectivityMode, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{classify_contact, has_area_overlap, ContactType};
use crate::piece::{Piece, PieceId};
use crate::puzzle::Puzzle;
use crate::spatial::SpatialIndex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// 整体校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyReport {
    /// 发生面积重叠的拼块对
    pub overlaps: Vec<(PieceId, PieceId)>,
    /// 有边接触但没有连接的拼块对
    pub unexplained_contacts: Vec<(PieceId, PieceId)>,
    /// 从第 0 块无法到达的拼块
    pub unreachable: Vec<PieceId>,
}

impl AssemblyReport {
    pub fn is_valid(&self) -> bool {
        self.overlaps.is_empty() && self.unexplained_contacts.is_empty() && self.unreachable.is_empty()
    }
}

/// 校验引擎
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationEngine {
    config: EngineConfig,
}

impl ValidationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 包围盒相交的拼块对
    fn candidate_pairs<'a>(&self, pieces: &'a [Piece]) -> Vec<(&'a Piece, &'a Piece)> {
        let scale = self.config.visual_scale;
        let tol = self.config.tolerance.vertex.max(self.config.tolerance.edge);
        let by_id: HashMap<&PieceId, &Piece> = pieces.iter().map(|p| (&p.id, p)).collect();

        SpatialIndex::from_pieces(pieces, scale)
            .candidate_pairs(tol)
            .into_iter()
            .filter_map(|(a, b)| Some((*by_id.get(&a)?, *by_id.get(&b)?)))
            .collect()
    }

    /// 所有发生面积重叠的拼块对
    pub fn overlapping_pairs(&self, puzzle: &Puzzle) -> Vec<(PieceId, PieceId)> {
        let scale = self.config.visual_scale;
        self.candidate_pairs(puzzle.pieces())
            .into_iter()
            .filter(|(a, b)| {
                has_area_overlap(
                    &a.world_vertices(scale),
                    &b.world_vertices(scale),
                    &self.config.tolerance,
                )
            })
            .map(|(a, b)| (a.id.clone(), b.id.clone()))
            .collect()
    }

    pub fn has_invalid_area_overlaps(&self, puzzle: &Puzzle) -> bool {
        !self.overlapping_pairs(puzzle).is_empty()
    }

    /// 有边接触但两块之间没有任何连接的拼块对
    pub fn unexplained_contacts(&self, puzzle: &Puzzle) -> Vec<(PieceId, PieceId)> {
        let scale = self.config.visual_scale;
        self.candidate_pairs(puzzle.pieces())
            .into_iter()
            .filter(|(a, b)| {
                classify_contact(
                    &a.world_vertices(scale),
                    &b.world_vertices(scale),
                    &self.config.tolerance,
                ) == ContactType::EdgeContact
            })
            .filter(|(a, b)| {
                !puzzle
                    .connections()
                    .iter()
                    .any(|c| c.involves(&a.id) && c.involves(&b.id))
            })
            .map(|(a, b)| (a.id.clone(), b.id.clone()))
            .collect()
    }

    pub fn has_unexplained_contacts(&self, puzzle: &Puzzle) -> bool {
        !self.unexplained_contacts(puzzle).is_empty()
    }

    /// 连通图的边：显式连接，以及（按配置）几何上的顶点/边接触
    fn graph_edges(&self, puzzle: &Puzzle, excluded: Option<&PieceId>) -> Vec<(PieceId, PieceId)> {
        let keep = |id: &PieceId| excluded != Some(id);

        let mut edges: Vec<(PieceId, PieceId)> = puzzle
            .connections()
            .iter()
            .map(|c| c.connection_type.pieces())
            .filter(|(a, b)| keep(a) && keep(b))
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect();

        if self.config.connectivity == ConnectivityMode::ConnectionsAndTouches {
            let scale = self.config.visual_scale;
            for (a, b) in self.candidate_pairs(puzzle.pieces()) {
                if !keep(&a.id) || !keep(&b.id) {
                    continue;
                }
                let contact = classify_contact(
                    &a.world_vertices(scale),
                    &b.world_vertices(scale),
                    &self.config.tolerance,
                );
                if matches!(contact, ContactType::VertexContact | ContactType::EdgeContact) {
                    edges.push((a.id.clone(), b.id.clone()));
                }
            }
        }
        edges
    }

    /// 连通分量（按拼块顺序，每个分量从其第一块开始广度优先遍历）
    fn components(&self, puzzle: &Puzzle, excluded: Option<&PieceId>) -> Vec<Vec<PieceId>> {
        let edges = self.graph_edges(puzzle, excluded);
        let mut adjacency: HashMap<&PieceId, Vec<PieceId>> = HashMap::new();
        for (a, b) in &edges {
            adjacency.entry(a).or_default().push(b.clone());
            adjacency.entry(b).or_default().push(a.clone());
        }

        let mut visited: HashSet<PieceId> = HashSet::new();
        let mut components = Vec::new();
        for piece in puzzle.pieces() {
            if excluded == Some(&piece.id) || visited.contains(&piece.id) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([piece.id.clone()]);
            visited.insert(piece.id.clone());
            while let Some(id) = queue.pop_front() {
                if let Some(neighbors) = adjacency.get(&id) {
                    for n in neighbors {
                        if visited.insert(n.clone()) {
                            queue.push_back(n.clone());
                        }
                    }
                }
                component.push(id);
            }
            components.push(component);
        }
        components
    }

    /// 从第 0 块出发无法到达的拼块
    pub fn unreachable_pieces(&self, puzzle: &Puzzle) -> Vec<PieceId> {
        self.components(puzzle, None)
            .into_iter()
            .skip(1)
            .flatten()
            .collect()
    }

    pub fn is_connected(&self, puzzle: &Puzzle) -> bool {
        self.unreachable_pieces(puzzle).is_empty()
    }

    pub fn is_valid_assembly(&self, puzzle: &Puzzle) -> bool {
        !self.has_invalid_area_overlaps(puzzle)
            && !self.has_unexplained_contacts(puzzle)
            && self.is_connected(puzzle)
    }

    /// 完整校验报告
    pub fn validate(&self, puzzle: &Puzzle) -> AssemblyReport {
        let report = AssemblyReport {
            overlaps: self.overlapping_pairs(puzzle),
            unexplained_contacts: self.unexplained_contacts(puzzle),
            unreachable: self.unreachable_pieces(puzzle),
        };
        tracing::debug!(
            "Validated {} piece(s): {} overlap(s), {} unexplained contact(s), {} unreachable",
            puzzle.piece_count(),
            report.overlaps.len(),
            report.unexplained_contacts.len(),
            report.unreachable.len()
        );
        report
    }

    /// 删除某块后剩余拼块的连通分量数不能增加
    pub fn can_remove_piece(&self, puzzle: &Puzzle, id: &PieceId) -> EngineResult<()> {
        if puzzle.piece(id).is_none() {
            return Err(EngineError::PieceNotFound(id.clone()));
        }

        let before = self.components(puzzle, None).len();
        let after = self.components(puzzle, Some(id)).len();
        if after > before {
            tracing::warn!("Refusing to remove {}: would split the puzzle", id);
            return Err(EngineError::StructurallyRequired(format!(
                "removing {} would split the puzzle into {} disconnected groups",
                id, after
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PieceType;
    use crate::connection::{create_connection, ConnectionType};
    use crate::math::Vector2;
    use crate::transform::Transform2D;

    fn square(id: &str, x: f64, y: f64) -> Piece {
        Piece::new(
            id.into(),
            PieceType::Square,
            Transform2D::from_translation(Vector2::new(x, y)),
        )
    }

    fn edge_link(puzzle: &mut Puzzle, a: &str, b: &str) {
        let ct = ConnectionType::EdgeToEdge {
            piece_a: a.into(),
            edge_a: 1,
            piece_b: b.into(),
            edge_b: 3,
        };
        let c = create_connection(ct, puzzle.pieces(), &EngineConfig::default()).unwrap();
        puzzle.add_connection(c).unwrap();
    }

    fn row(n: usize) -> Puzzle {
        let mut puzzle = Puzzle::new();
        let ids: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
        for (i, id) in ids.iter().enumerate() {
            puzzle.add_piece(square(id, 50.0 * i as f64, 0.0)).unwrap();
        }
        for pair in ids.windows(2) {
            edge_link(&mut puzzle, &pair[0], &pair[1]);
        }
        puzzle
    }

    #[test]
    fn test_valid_row_assembly() {
        let engine = ValidationEngine::default();
        let puzzle = row(3);
        assert!(engine.is_valid_assembly(&puzzle));
        assert!(engine.validate(&puzzle).is_valid());
    }

    #[test]
    fn test_overlap_detected() {
        let engine = ValidationEngine::default();
        let mut puzzle = Puzzle::new();
        puzzle.add_piece(square("a", 0.0, 0.0)).unwrap();
        puzzle.add_piece(square("b", 25.0, 25.0)).unwrap();
        assert!(engine.has_invalid_area_overlaps(&puzzle));
        assert_eq!(
            engine.validate(&puzzle).overlaps,
            vec![(PieceId::new("a"), PieceId::new("b"))]
        );
    }

    #[test]
    fn test_edge_contact_requires_connection() {
        let engine = ValidationEngine::default();
        let mut puzzle = row(2);
        // 第三块贴在 p1 右边，但没有声明连接
        puzzle.add_piece(square("loose", 100.0, 0.0)).unwrap();
        let report = engine.validate(&puzzle);
        assert_eq!(
            report.unexplained_contacts,
            vec![(PieceId::new("loose"), PieceId::new("p1"))]
        );
        assert_eq!(report.unreachable, vec![PieceId::new("loose")]);
        assert!(!engine.is_valid_assembly(&puzzle));
    }

    #[test]
    fn test_vertex_contact_allowed_and_touch_connectivity() {
        let mut puzzle = row(2);
        // 只在 (100,50) 处与 p1 顶点相接
        puzzle.add_piece(square("corner", 100.0, 50.0)).unwrap();

        let strict = ValidationEngine::default();
        assert!(!strict.has_unexplained_contacts(&puzzle));
        assert!(!strict.is_connected(&puzzle));

        let lenient = ValidationEngine::new(EngineConfig {
            connectivity: ConnectivityMode::ConnectionsAndTouches,
            ..EngineConfig::default()
        });
        assert!(lenient.is_connected(&puzzle));
        assert!(lenient.is_valid_assembly(&puzzle));
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let engine = ValidationEngine::default();
        let mut puzzle = row(3);
        puzzle.add_piece(square("x", 10.0, 10.0)).unwrap();
        let first = engine.validate(&puzzle);
        let second = engine.validate(&puzzle);
        assert_eq!(first, second);
        assert_eq!(engine.is_valid_assembly(&puzzle), engine.is_valid_assembly(&puzzle));
    }

    #[test]
    fn test_removing_bridge_connection_disconnects() {
        let engine = ValidationEngine::default();
        let mut puzzle = row(3);
        assert!(engine.is_connected(&puzzle));
        let before = engine.unreachable_pieces(&puzzle).len();

        puzzle.remove_connection(1).unwrap();
        assert!(!engine.is_connected(&puzzle));
        assert!(engine.unreachable_pieces(&puzzle).len() >= before);
        assert_eq!(engine.unreachable_pieces(&puzzle), vec![PieceId::new("p2")]);
    }

    #[test]
    fn test_can_remove_piece() {
        let engine = ValidationEngine::default();
        let puzzle = row(3);
        assert!(engine.can_remove_piece(&puzzle, &"p2".into()).is_ok());
        assert!(engine.can_remove_piece(&puzzle, &"p0".into()).is_ok());
        assert!(matches!(
            engine.can_remove_piece(&puzzle, &"p1".into()),
            Err(EngineError::StructurallyRequired(_))
        ));
        assert_eq!(
            engine.can_remove_piece(&puzzle, &"nope".into()),
            Err(EngineError::PieceNotFound("nope".into()))
        );
    }
}
