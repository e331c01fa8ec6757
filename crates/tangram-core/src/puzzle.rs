//! 拼图（拼块 + 连接）
//!
//! `Puzzle` 只保证引用完整性（连接引用的拼块必须存在），
//! 几何不变量（无重叠、接触有连接、整体连通）由校验引擎检查。

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::error::{EngineError, EngineResult};
use crate::piece::{Piece, PieceId};
use crate::placement::Placement;
use crate::transform::Transform2D;
use crate::validation::ValidationEngine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
    pieces: Vec<Piece>,
    connections: Vec<Connection>,
}

impl Puzzle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有数据构建，并检查引用完整性
    pub fn from_parts(pieces: Vec<Piece>, connections: Vec<Connection>) -> EngineResult<Self> {
        let puzzle = Self {
            pieces,
            connections,
        };
        puzzle.check_references()?;
        Ok(puzzle)
    }

    /// 拼块ID唯一，且每个连接引用的拼块都存在
    pub fn check_references(&self) -> EngineResult<()> {
        for (i, piece) in self.pieces.iter().enumerate() {
            if self.pieces[..i].iter().any(|p| p.id == piece.id) {
                return Err(EngineError::DuplicatePiece(piece.id.clone()));
            }
        }
        for connection in &self.connections {
            let (a, b) = connection.connection_type.pieces();
            for id in [a, b] {
                if self.piece(id).is_none() {
                    return Err(EngineError::PieceNotFound(id.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    pub fn piece(&self, id: &PieceId) -> Option<&Piece> {
        self.pieces.iter().find(|p| &p.id == id)
    }

    pub fn index_of(&self, id: &PieceId) -> Option<usize> {
        self.pieces.iter().position(|p| &p.id == id)
    }

    /// 是否为拼图中的第一块（第一块始终锁定）
    pub fn is_first_piece(&self, id: &PieceId) -> bool {
        self.pieces.first().is_some_and(|p| &p.id == id)
    }

    /// 涉及某拼块的连接：`(索引, 连接)`
    pub fn connections_of(&self, id: &PieceId) -> Vec<(usize, &Connection)> {
        self.connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.involves(id))
            .collect()
    }

    /// 添加不带连接的拼块（第一块或自由放置）
    pub fn add_piece(&mut self, piece: Piece) -> EngineResult<()> {
        if self.piece(&piece.id).is_some() {
            return Err(EngineError::DuplicatePiece(piece.id));
        }
        tracing::info!("Added piece {} ({})", piece.id, piece.piece_type);
        self.pieces.push(piece);
        Ok(())
    }

    /// 原子地追加新拼块及其连接；任何检查失败时拼图保持不变
    pub fn place_piece(&mut self, placement: Placement) -> EngineResult<()> {
        let Placement { piece, connections } = placement;
        if self.piece(&piece.id).is_some() {
            return Err(EngineError::DuplicatePiece(piece.id));
        }
        for connection in &connections {
            let (a, b) = connection.connection_type.pieces();
            for id in [a, b] {
                if id != &piece.id && self.piece(id).is_none() {
                    return Err(EngineError::PieceNotFound(id.clone()));
                }
            }
        }

        tracing::info!(
            "Placed piece {} ({}) with {} connection(s)",
            piece.id,
            piece.piece_type,
            connections.len()
        );
        self.pieces.push(piece);
        self.connections.extend(connections);
        Ok(())
    }

    pub fn add_connection(&mut self, connection: Connection) -> EngineResult<()> {
        let (a, b) = connection.connection_type.pieces();
        for id in [a, b] {
            if self.piece(id).is_none() {
                return Err(EngineError::PieceNotFound(id.clone()));
            }
        }
        tracing::info!("Added connection {}", connection.connection_type);
        self.connections.push(connection);
        Ok(())
    }

    pub fn remove_connection(&mut self, index: usize) -> EngineResult<Connection> {
        if index >= self.connections.len() {
            return Err(EngineError::ConnectionIndexOutOfRange(index));
        }
        let removed = self.connections.remove(index);
        tracing::info!("Removed connection {}", removed.connection_type);
        Ok(removed)
    }

    /// 删除拼块及其所有连接
    ///
    /// 如果删除后剩余拼块不再连通，则拒绝删除。
    pub fn remove_piece(&mut self, id: &PieceId, config: &EngineConfig) -> EngineResult<Piece> {
        let index = self
            .index_of(id)
            .ok_or_else(|| EngineError::PieceNotFound(id.clone()))?;

        ValidationEngine::new(*config).can_remove_piece(self, id)?;

        let piece = self.pieces.remove(index);
        self.connections.retain(|c| !c.involves(id));
        tracing::info!("Removed piece {} ({})", piece.id, piece.piece_type);
        Ok(piece)
    }

    /// 提交新的变换（预览计算不会调用这里）
    pub fn update_transform(&mut self, id: &PieceId, transform: Transform2D) -> EngineResult<()> {
        if !transform.is_finite() {
            return Err(EngineError::NonFiniteTransform);
        }
        let piece = self
            .pieces
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| EngineError::PieceNotFound(id.clone()))?;
        piece.transform = transform;
        tracing::debug!("Committed transform for {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PieceType;
    use crate::connection::{create_connection, ConnectionType};
    use crate::math::Vector2;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    /// 三个正方形横向排成一排：a - b - c，相邻边连接
    fn row_of_squares() -> Puzzle {
        let mut puzzle = Puzzle::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            puzzle
                .add_piece(Piece::new(
                    (*id).into(),
                    PieceType::Square,
                    Transform2D::from_translation(Vector2::new(50.0 * i as f64, 0.0)),
                ))
                .unwrap();
        }
        for (a, b) in [("a", "b"), ("b", "c")] {
            let ct = ConnectionType::EdgeToEdge {
                piece_a: a.into(),
                edge_a: 1,
                piece_b: b.into(),
                edge_b: 3,
            };
            let connection = create_connection(ct, puzzle.pieces(), &config()).unwrap();
            puzzle.add_connection(connection).unwrap();
        }
        puzzle
    }

    #[test]
    fn test_duplicate_piece_rejected() {
        let mut puzzle = row_of_squares();
        let dup = Piece::new("a".into(), PieceType::Square, Transform2D::identity());
        assert_eq!(
            puzzle.add_piece(dup),
            Err(EngineError::DuplicatePiece("a".into()))
        );
        assert_eq!(puzzle.piece_count(), 3);
    }

    #[test]
    fn test_remove_leaf_piece_drops_connections() {
        let mut puzzle = row_of_squares();
        puzzle.remove_piece(&"c".into(), &config()).unwrap();
        assert_eq!(puzzle.piece_count(), 2);
        assert_eq!(puzzle.connections().len(), 1);
        assert!(puzzle.connections_of(&"c".into()).is_empty());
    }

    #[test]
    fn test_remove_bridging_piece_rejected() {
        let mut puzzle = row_of_squares();
        let before = puzzle.clone();
        assert!(matches!(
            puzzle.remove_piece(&"b".into(), &config()),
            Err(EngineError::StructurallyRequired(_))
        ));
        assert_eq!(puzzle, before);
    }

    #[test]
    fn test_from_parts_rejects_dangling_connection() {
        let puzzle = row_of_squares();
        let pieces = puzzle.pieces()[..2].to_vec();
        let result = Puzzle::from_parts(pieces, puzzle.connections().to_vec());
        assert_eq!(result, Err(EngineError::PieceNotFound("c".into())));
    }

    #[test]
    fn test_update_transform_rejects_non_finite() {
        let mut puzzle = row_of_squares();
        let bad = Transform2D::from_translation(Vector2::new(f64::NAN, 0.0));
        assert_eq!(
            puzzle.update_transform(&"a".into(), bad),
            Err(EngineError::NonFiniteTransform)
        );
        assert!(puzzle.is_first_piece(&"a".into()));
        assert!(!puzzle.is_first_piece(&"b".into()));
    }
}
