//! 连接模型
//!
//! 两个已放置拼块之间的声明式几何关系，以及每种关系隐含的运动约束：
//! - 顶点对顶点 ⇒ 绕静止块顶点旋转
//! - 边对边 ⇒ 沿较长边（轨道）平移
//! - 顶点对边 ⇒ 顶点沿边平移
//!
//! 约束的参考几何（旋转中心 / 平移轴）总是取自连接中**静止**的一方。
//! [`ConnectionType::roles`] 是区分静止块/移动块的唯一入口，
//! 变换引擎、操作分类器和校验引擎共用它。

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{distance, edges_coincide, point_on_segment, Segment};
use crate::math::{Point2, Vector2};
use crate::piece::{Piece, PieceId};
use serde::{Deserialize, Serialize};

/// 拼块上的连接锚点（局部索引）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "camelCase")]
pub enum Anchor {
    Vertex(usize),
    Edge(usize),
}

impl Anchor {
    pub fn index(&self) -> usize {
        match self {
            Anchor::Vertex(i) | Anchor::Edge(i) => *i,
        }
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self, Anchor::Vertex(_))
    }
}

/// 用户选中的连接点：某个拼块上的顶点或边
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionPoint {
    pub piece_id: PieceId,
    pub anchor: Anchor,
}

impl ConnectionPoint {
    pub fn vertex(piece_id: impl Into<PieceId>, index: usize) -> Self {
        Self {
            piece_id: piece_id.into(),
            anchor: Anchor::Vertex(index),
        }
    }

    pub fn edge(piece_id: impl Into<PieceId>, index: usize) -> Self {
        Self {
            piece_id: piece_id.into(),
            anchor: Anchor::Edge(index),
        }
    }
}

/// 连接类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConnectionType {
    #[serde(rename_all = "camelCase")]
    VertexToVertex {
        piece_a: PieceId,
        vertex_a: usize,
        piece_b: PieceId,
        vertex_b: usize,
    },
    #[serde(rename_all = "camelCase")]
    EdgeToEdge {
        piece_a: PieceId,
        edge_a: usize,
        piece_b: PieceId,
        edge_b: usize,
    },
    #[serde(rename_all = "camelCase")]
    VertexToEdge {
        vertex_piece: PieceId,
        vertex: usize,
        edge_piece: PieceId,
        edge: usize,
    },
}

/// 连接中静止块与移动块的角色划分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRoles<'a> {
    pub stationary: &'a PieceId,
    pub stationary_anchor: Anchor,
    pub moving: &'a PieceId,
    pub moving_anchor: Anchor,
}

impl ConnectionType {
    /// 由两个连接点构造；`a` 通常是画布上已存在的块
    pub fn from_points(a: &ConnectionPoint, b: &ConnectionPoint) -> Self {
        match (a.anchor, b.anchor) {
            (Anchor::Vertex(va), Anchor::Vertex(vb)) => ConnectionType::VertexToVertex {
                piece_a: a.piece_id.clone(),
                vertex_a: va,
                piece_b: b.piece_id.clone(),
                vertex_b: vb,
            },
            (Anchor::Edge(ea), Anchor::Edge(eb)) => ConnectionType::EdgeToEdge {
                piece_a: a.piece_id.clone(),
                edge_a: ea,
                piece_b: b.piece_id.clone(),
                edge_b: eb,
            },
            (Anchor::Vertex(v), Anchor::Edge(e)) => ConnectionType::VertexToEdge {
                vertex_piece: a.piece_id.clone(),
                vertex: v,
                edge_piece: b.piece_id.clone(),
                edge: e,
            },
            (Anchor::Edge(e), Anchor::Vertex(v)) => ConnectionType::VertexToEdge {
                vertex_piece: b.piece_id.clone(),
                vertex: v,
                edge_piece: a.piece_id.clone(),
                edge: e,
            },
        }
    }

    /// 类型名（日志/错误信息用）
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConnectionType::VertexToVertex { .. } => "vertex-to-vertex",
            ConnectionType::EdgeToEdge { .. } => "edge-to-edge",
            ConnectionType::VertexToEdge { .. } => "vertex-to-edge",
        }
    }

    /// 两端：`(第一方, 第二方)`，顶点对边时为 `(顶点块, 边块)`
    fn endpoints(&self) -> ((&PieceId, Anchor), (&PieceId, Anchor)) {
        match self {
            ConnectionType::VertexToVertex {
                piece_a,
                vertex_a,
                piece_b,
                vertex_b,
            } => (
                (piece_a, Anchor::Vertex(*vertex_a)),
                (piece_b, Anchor::Vertex(*vertex_b)),
            ),
            ConnectionType::EdgeToEdge {
                piece_a,
                edge_a,
                piece_b,
                edge_b,
            } => (
                (piece_a, Anchor::Edge(*edge_a)),
                (piece_b, Anchor::Edge(*edge_b)),
            ),
            ConnectionType::VertexToEdge {
                vertex_piece,
                vertex,
                edge_piece,
                edge,
            } => (
                (vertex_piece, Anchor::Vertex(*vertex)),
                (edge_piece, Anchor::Edge(*edge)),
            ),
        }
    }

    pub fn pieces(&self) -> (&PieceId, &PieceId) {
        let ((a, _), (b, _)) = self.endpoints();
        (a, b)
    }

    pub fn involves(&self, id: &PieceId) -> bool {
        let (a, b) = self.pieces();
        a == id || b == id
    }

    /// 连接另一端的拼块
    pub fn other(&self, id: &PieceId) -> Option<&PieceId> {
        let (a, b) = self.pieces();
        if a == id {
            Some(b)
        } else if b == id {
            Some(a)
        } else {
            None
        }
    }

    /// 以 `moving` 为移动块划分角色；`moving` 不在连接中时返回 `None`
    pub fn roles(&self, moving: &PieceId) -> Option<ConnectionRoles<'_>> {
        let ((a, anchor_a), (b, anchor_b)) = self.endpoints();
        if moving == b {
            Some(ConnectionRoles {
                stationary: a,
                stationary_anchor: anchor_a,
                moving: b,
                moving_anchor: anchor_b,
            })
        } else if moving == a {
            Some(ConnectionRoles {
                stationary: b,
                stationary_anchor: anchor_b,
                moving: a,
                moving_anchor: anchor_a,
            })
        } else {
            None
        }
    }

    /// 创建时的默认角色：顶点对边以边块为静止方，其余以第一方为静止方
    pub fn default_roles(&self) -> ConnectionRoles<'_> {
        let ((a, anchor_a), (b, anchor_b)) = self.endpoints();
        match self {
            ConnectionType::VertexToEdge { .. } => ConnectionRoles {
                stationary: b,
                stationary_anchor: anchor_b,
                moving: a,
                moving_anchor: anchor_a,
            },
            _ => ConnectionRoles {
                stationary: a,
                stationary_anchor: anchor_a,
                moving: b,
                moving_anchor: anchor_b,
            },
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ((a, anchor_a), (b, anchor_b)) = self.endpoints();
        write!(f, "{} {}:{:?} <-> {}:{:?}", self.kind_name(), a, anchor_a, b, anchor_b)
    }
}

/// 连接隐含的运动约束
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Constraint {
    /// 绕中心旋转，`range` 为允许的角度范围（度）
    Rotation { center: Point2, range: f64 },
    /// 沿单位轴平移，允许位置为 `[0, range]`
    Translation { axis: Vector2, range: f64 },
}

/// 连接 = 类型 + 创建时推导出的约束
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    pub constraint: Constraint,
}

impl Connection {
    pub fn involves(&self, id: &PieceId) -> bool {
        self.connection_type.involves(id)
    }

    pub fn other(&self, id: &PieceId) -> Option<&PieceId> {
        self.connection_type.other(id)
    }
}

pub(crate) fn find_piece<'a>(pieces: &'a [Piece], id: &PieceId) -> EngineResult<&'a Piece> {
    pieces
        .iter()
        .find(|p| &p.id == id)
        .ok_or_else(|| EngineError::PieceNotFound(id.clone()))
}

pub(crate) fn vertex_of(piece: &Piece, index: usize, scale: f64) -> EngineResult<Point2> {
    piece
        .world_vertex(index, scale)
        .ok_or_else(|| EngineError::VertexOutOfRange {
            piece: piece.id.clone(),
            index,
        })
}

pub(crate) fn edge_of(piece: &Piece, index: usize, scale: f64) -> EngineResult<Segment> {
    piece
        .world_edge(index, scale)
        .ok_or_else(|| EngineError::EdgeOutOfRange {
            piece: piece.id.clone(),
            index,
        })
}

/// 锚点的世界几何
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnchorGeometry {
    Vertex(Point2),
    Edge(Segment),
}

pub(crate) fn anchor_geometry(piece: &Piece, anchor: Anchor, scale: f64) -> EngineResult<AnchorGeometry> {
    match anchor {
        Anchor::Vertex(i) => vertex_of(piece, i, scale).map(AnchorGeometry::Vertex),
        Anchor::Edge(i) => edge_of(piece, i, scale).map(AnchorGeometry::Edge),
    }
}

/// 按当前变换解析后的连接：两块拼块及各自锚点的世界几何
#[derive(Debug, Clone)]
pub struct ResolvedConnection<'a> {
    pub stationary: &'a Piece,
    pub stationary_anchor: Anchor,
    pub stationary_geometry: AnchorGeometry,
    pub moving: &'a Piece,
    pub moving_anchor: Anchor,
    pub moving_geometry: AnchorGeometry,
}

impl<'a> ResolvedConnection<'a> {
    /// 以 `moving` 为移动块解析连接
    pub fn resolve(
        connection_type: &ConnectionType,
        moving: &PieceId,
        pieces: &'a [Piece],
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        let roles = connection_type
            .roles(moving)
            .ok_or_else(|| EngineError::NotInConnection(moving.clone()))?;
        Self::from_roles(roles, pieces, config)
    }

    pub fn from_roles(
        roles: ConnectionRoles<'_>,
        pieces: &'a [Piece],
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        let scale = config.visual_scale;
        let stationary = find_piece(pieces, roles.stationary)?;
        let moving = find_piece(pieces, roles.moving)?;
        Ok(Self {
            stationary,
            stationary_anchor: roles.stationary_anchor,
            stationary_geometry: anchor_geometry(stationary, roles.stationary_anchor, scale)?,
            moving,
            moving_anchor: roles.moving_anchor,
            moving_geometry: anchor_geometry(moving, roles.moving_anchor, scale)?,
        })
    }

    /// 从静止方推导约束
    pub fn constraint(&self, config: &EngineConfig) -> EngineResult<Constraint> {
        match (self.stationary_geometry, self.moving_geometry) {
            (AnchorGeometry::Vertex(pivot), AnchorGeometry::Vertex(other)) => {
                if distance(&pivot, &other) > config.tolerance.vertex {
                    return Err(EngineError::NotCoincident);
                }
                Ok(Constraint::Rotation {
                    center: pivot,
                    range: 360.0,
                })
            }
            (AnchorGeometry::Edge(stationary), AnchorGeometry::Edge(moving)) => {
                let axis = stationary
                    .direction()
                    .ok_or_else(|| EngineError::Infeasible("zero-length edge".to_string()))?;
                let track = stationary.length().max(moving.length());
                let sliding = stationary.length().min(moving.length());
                Ok(Constraint::Translation {
                    axis,
                    range: (track - sliding).max(0.0),
                })
            }
            // 顶点对边：参考几何总是边块的边
            (AnchorGeometry::Edge(edge), AnchorGeometry::Vertex(_))
            | (AnchorGeometry::Vertex(_), AnchorGeometry::Edge(edge)) => {
                let axis = edge
                    .direction()
                    .ok_or_else(|| EngineError::Infeasible("zero-length edge".to_string()))?;
                Ok(Constraint::Translation {
                    axis,
                    range: edge.length(),
                })
            }
        }
    }

    /// 当前变换下连接关系是否仍然成立
    pub fn is_satisfied(&self, config: &EngineConfig) -> bool {
        let tol = &config.tolerance;
        match (self.stationary_geometry, self.moving_geometry) {
            (AnchorGeometry::Vertex(a), AnchorGeometry::Vertex(b)) => distance(&a, &b) <= tol.vertex,
            (AnchorGeometry::Edge(a), AnchorGeometry::Edge(b)) => edges_coincide(&a, &b, tol.edge),
            (AnchorGeometry::Vertex(v), AnchorGeometry::Edge(e))
            | (AnchorGeometry::Edge(e), AnchorGeometry::Vertex(v)) => {
                point_on_segment(&v, &e.start, &e.end, tol.edge)
            }
        }
    }
}

/// 计算连接的约束；任何索引越界、拼块缺失、顶点未重合时返回 `None`
pub fn calculate_constraint(
    connection_type: &ConnectionType,
    pieces: &[Piece],
    config: &EngineConfig,
) -> Option<Constraint> {
    try_calculate_constraint(connection_type, pieces, config).ok()
}

/// 同 [`calculate_constraint`]，但返回具体的失败原因
pub fn try_calculate_constraint(
    connection_type: &ConnectionType,
    pieces: &[Piece],
    config: &EngineConfig,
) -> EngineResult<Constraint> {
    ResolvedConnection::from_roles(connection_type.default_roles(), pieces, config)?.constraint(config)
}

/// 根据当前变换重新检查连接是否成立
pub fn is_connection_satisfied(
    connection_type: &ConnectionType,
    pieces: &[Piece],
    config: &EngineConfig,
) -> bool {
    ResolvedConnection::from_roles(connection_type.default_roles(), pieces, config)
        .map(|r| r.is_satisfied(config))
        .unwrap_or(false)
}

/// 创建连接：推导约束并确认关系在当前变换下成立
pub fn create_connection(
    connection_type: ConnectionType,
    pieces: &[Piece],
    config: &EngineConfig,
) -> EngineResult<Connection> {
    let resolved = ResolvedConnection::from_roles(connection_type.default_roles(), pieces, config)?;
    let constraint = resolved.constraint(config)?;
    if !resolved.is_satisfied(config) {
        return Err(EngineError::ConnectionNotSatisfied(
            resolved.stationary.id.clone(),
            resolved.moving.id.clone(),
        ));
    }
    tracing::debug!("Created {} connection", connection_type);
    Ok(Connection {
        connection_type,
        constraint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PieceType;
    use crate::transform::Transform2D;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    /// 正方形在原点，小三角形顶点0 接在正方形顶点2 (50,50)
    fn square_and_triangle() -> Vec<Piece> {
        vec![
            Piece::new("sq".into(), PieceType::Square, Transform2D::identity()),
            Piece::new(
                "tri".into(),
                PieceType::SmallTriangle1,
                Transform2D::from_translation(Vector2::new(50.0, 50.0)),
            ),
        ]
    }

    #[test]
    fn test_vertex_to_vertex_constraint() {
        let pieces = square_and_triangle();
        let ct = ConnectionType::VertexToVertex {
            piece_a: "sq".into(),
            vertex_a: 2,
            piece_b: "tri".into(),
            vertex_b: 0,
        };
        let c = calculate_constraint(&ct, &pieces, &config()).unwrap();
        assert_eq!(
            c,
            Constraint::Rotation {
                center: Point2::new(50.0, 50.0),
                range: 360.0
            }
        );
        assert!(is_connection_satisfied(&ct, &pieces, &config()));
    }

    #[test]
    fn test_vertex_to_vertex_requires_coincidence() {
        let pieces = square_and_triangle();
        let ct = ConnectionType::VertexToVertex {
            piece_a: "sq".into(),
            vertex_a: 0,
            piece_b: "tri".into(),
            vertex_b: 0,
        };
        assert!(calculate_constraint(&ct, &pieces, &config()).is_none());
        assert_eq!(
            try_calculate_constraint(&ct, &pieces, &config()),
            Err(EngineError::NotCoincident)
        );
    }

    #[test]
    fn test_out_of_range_indices() {
        let pieces = square_and_triangle();
        let ct = ConnectionType::VertexToVertex {
            piece_a: "sq".into(),
            vertex_a: 2,
            piece_b: "tri".into(),
            vertex_b: 3,
        };
        assert!(calculate_constraint(&ct, &pieces, &config()).is_none());

        let ct = ConnectionType::EdgeToEdge {
            piece_a: "sq".into(),
            edge_a: 7,
            piece_b: "tri".into(),
            edge_b: 0,
        };
        assert!(matches!(
            try_calculate_constraint(&ct, &pieces, &config()),
            Err(EngineError::EdgeOutOfRange { index: 7, .. })
        ));

        let ct = ConnectionType::EdgeToEdge {
            piece_a: "missing".into(),
            edge_a: 0,
            piece_b: "tri".into(),
            edge_b: 0,
        };
        assert!(calculate_constraint(&ct, &pieces, &config()).is_none());
    }

    #[test]
    fn test_edge_to_edge_track_is_longer_edge() {
        // 大三角形底边 (0,0)-(100,0)，正方形顶边贴在它下面
        let pieces = vec![
            Piece::new("big".into(), PieceType::LargeTriangle1, Transform2D::identity()),
            Piece::new(
                "sq".into(),
                PieceType::Square,
                Transform2D::from_translation(Vector2::new(0.0, -50.0)),
            ),
        ];
        let ct = ConnectionType::EdgeToEdge {
            piece_a: "big".into(),
            edge_a: 0,
            piece_b: "sq".into(),
            edge_b: 2,
        };
        match calculate_constraint(&ct, &pieces, &config()).unwrap() {
            Constraint::Translation { axis, range } => {
                assert!((axis - Vector2::new(1.0, 0.0)).norm() < 1e-9);
                assert!((range - 50.0).abs() < 1e-9);
            }
            other => panic!("unexpected constraint {:?}", other),
        }
        assert!(create_connection(ct, &pieces, &config()).is_ok());
    }

    #[test]
    fn test_vertex_to_edge() {
        let pieces = vec![
            Piece::new("big".into(), PieceType::LargeTriangle1, Transform2D::identity()),
            Piece::new(
                "tri".into(),
                PieceType::SmallTriangle1,
                Transform2D::new(180.0, Vector2::new(30.0, 0.0), false),
            ),
        ];
        let ct = ConnectionType::VertexToEdge {
            vertex_piece: "tri".into(),
            vertex: 0,
            edge_piece: "big".into(),
            edge: 0,
        };
        match calculate_constraint(&ct, &pieces, &config()).unwrap() {
            Constraint::Translation { range, .. } => assert!((range - 100.0).abs() < 1e-9),
            other => panic!("unexpected constraint {:?}", other),
        }
        assert!(is_connection_satisfied(&ct, &pieces, &config()));
    }

    #[test]
    fn test_create_connection_round_trip() {
        let pieces = square_and_triangle();
        let ct = ConnectionType::from_points(
            &ConnectionPoint::vertex("sq", 2),
            &ConnectionPoint::vertex("tri", 0),
        );
        let connection = create_connection(ct, &pieces, &config()).unwrap();
        assert!(is_connection_satisfied(&connection.connection_type, &pieces, &config()));
    }

    #[test]
    fn test_create_connection_rejects_unsatisfied_edges() {
        let pieces = square_and_triangle();
        let ct = ConnectionType::EdgeToEdge {
            piece_a: "sq".into(),
            edge_a: 0,
            piece_b: "tri".into(),
            edge_b: 1,
        };
        assert!(matches!(
            create_connection(ct, &pieces, &config()),
            Err(EngineError::ConnectionNotSatisfied(_, _))
        ));
    }

    #[test]
    fn test_roles() {
        let ct = ConnectionType::from_points(
            &ConnectionPoint::edge("a", 1),
            &ConnectionPoint::vertex("b", 2),
        );
        assert!(matches!(ct, ConnectionType::VertexToEdge { .. }));
        let roles = ct.roles(&"a".into()).unwrap();
        assert_eq!(roles.stationary, &PieceId::new("b"));
        assert_eq!(roles.stationary_anchor, Anchor::Vertex(2));
        assert_eq!(roles.moving_anchor, Anchor::Edge(1));
        assert!(ct.roles(&"c".into()).is_none());
        assert_eq!(ct.default_roles().stationary, &PieceId::new("a"));
        assert_eq!(ct.other(&"b".into()), Some(&PieceId::new("a")));
    }
}
