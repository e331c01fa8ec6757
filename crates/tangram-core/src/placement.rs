//! 新拼块放置
//!
//! 用户在画布上选 1~2 个连接点（已有拼块的顶点/边），再在待放置拼块上选同样数量的点，
//! 这里据此算出新拼块的变换，并给出需要一起创建的连接。
//!
//! 放置是“全有或全无”的：任何检查失败都返回错误，拼图不会被修改，
//! 也不会为了避开重叠去搜索别的位置。

use crate::catalog::PieceType;
use crate::config::EngineConfig;
use crate::connection::{
    create_connection, edge_of, find_piece, vertex_of, Anchor, Connection, ConnectionPoint, ConnectionType,
};
use crate::engine::TransformEngine;
use crate::error::{EngineError, EngineResult};
use crate::geometry::Segment;
use crate::math::{cross, normalize_angle, signed_angle, Point2, Vector2};
use crate::piece::{Piece, PieceId};
use crate::puzzle::Puzzle;
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};

/// 放置请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub piece_type: PieceType,
    /// 用户请求的旋转（度），会捕捉到旋转步长
    pub rotation: f64,
    #[serde(default)]
    pub flipped: bool,
    /// 画布上已有拼块的连接点
    pub canvas_points: Vec<ConnectionPoint>,
    /// 待放置拼块上的连接点，与 `canvas_points` 按顺序一一配对
    pub pending_points: Vec<Anchor>,
    /// 不指定时生成 UUID
    #[serde(default)]
    pub piece_id: Option<PieceId>,
}

impl PlacementRequest {
    pub fn new(piece_type: PieceType) -> Self {
        Self {
            piece_type,
            rotation: 0.0,
            flipped: false,
            canvas_points: Vec::new(),
            pending_points: Vec::new(),
            piece_id: None,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_id(mut self, id: impl Into<PieceId>) -> Self {
        self.piece_id = Some(id.into());
        self
    }

    /// 追加一对连接点
    pub fn pair(mut self, canvas: ConnectionPoint, pending: Anchor) -> Self {
        self.canvas_points.push(canvas);
        self.pending_points.push(pending);
        self
    }
}

/// 放置结果：新拼块 + 要创建的连接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub piece: Piece,
    pub connections: Vec<Connection>,
}

/// 画布上所有可选的连接点（每块的每个顶点和每条边）
pub fn available_connection_points(puzzle: &Puzzle) -> Vec<ConnectionPoint> {
    puzzle
        .pieces()
        .iter()
        .flat_map(|piece| {
            let n = piece.piece_type.vertex_count();
            (0..n)
                .map(|i| ConnectionPoint::vertex(piece.id.clone(), i))
                .chain((0..n).map(|i| ConnectionPoint::edge(piece.id.clone(), i)))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 待放置拼块上可选的连接点
pub fn pending_connection_points(piece_type: PieceType) -> Vec<Anchor> {
    let n = piece_type.vertex_count();
    (0..n).map(Anchor::Vertex).chain((0..n).map(Anchor::Edge)).collect()
}

/// 计算新拼块的放置
pub fn calculate_placement(
    puzzle: &Puzzle,
    request: &PlacementRequest,
    config: &EngineConfig,
) -> EngineResult<Placement> {
    let (canvas, pending) = (&request.canvas_points, &request.pending_points);
    if canvas.len() != pending.len() {
        return Err(EngineError::PointCountMismatch {
            canvas: canvas.len(),
            pending: pending.len(),
        });
    }
    match canvas.len() {
        0 => return Err(EngineError::NoConnectionPoints),
        1 | 2 => {}
        n => return Err(EngineError::TooManyConnectionPoints(n)),
    }

    let id = request.piece_id.clone().unwrap_or_else(PieceId::generate);
    if puzzle.piece(&id).is_some() {
        return Err(EngineError::DuplicatePiece(id));
    }

    let aligner = Aligner {
        puzzle,
        config,
        id: &id,
        piece_type: request.piece_type,
        flipped: request.flipped && request.piece_type.can_flip(),
    };
    let pairs: Vec<(&ConnectionPoint, Anchor)> = canvas.iter().zip(pending.iter().copied()).collect();
    for (point, anchor) in &pairs {
        aligner.check_indices(point, *anchor)?;
    }

    let rotation = snap_rotation(request.rotation, config);
    let transform = match pairs.as_slice() {
        [(point, anchor)] => aligner.align_single(point, *anchor, rotation)?,
        [first, second] => aligner.align_two(*first, *second, rotation)?,
        _ => return Err(EngineError::NoConnectionPoints),
    };
    if !transform.is_finite() {
        return Err(EngineError::NonFiniteTransform);
    }

    let piece = Piece::new(id.clone(), request.piece_type, transform);
    let mut all_pieces = puzzle.pieces().to_vec();
    all_pieces.push(piece.clone());
    let connections = pairs
        .iter()
        .map(|(point, anchor)| {
            let ct = ConnectionType::from_points(point, &ConnectionPoint {
                piece_id: id.clone(),
                anchor: *anchor,
            });
            create_connection(ct, &all_pieces, config)
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let overlapping = TransformEngine::new(*config).overlapping(&piece, puzzle.pieces());
    if !overlapping.is_empty() {
        tracing::warn!("Placement of {} overlaps {:?}", request.piece_type, overlapping);
        return Err(EngineError::Overlap(overlapping));
    }

    tracing::debug!(
        "Placement for {} {}: rotation {:.1}, translation ({:.2}, {:.2})",
        request.piece_type,
        id,
        transform.rotation,
        transform.translation.x,
        transform.translation.y
    );
    Ok(Placement { piece, connections })
}

/// 把请求角度捕捉到最近的旋转步长倍数
fn snap_rotation(requested: f64, config: &EngineConfig) -> f64 {
    let step = if config.snap.rotation_step > 0.0 {
        config.snap.rotation_step
    } else {
        45.0
    };
    normalize_angle((requested / step).round() * step)
}

fn angle_of(v: &Vector2) -> f64 {
    v.y.atan2(v.x).to_degrees()
}

/// 旋转（及镜像）后把局部点 `local` 放到 `target`
fn transform_with(rotation: f64, flipped: bool, local: &Point2, target: &Point2) -> Transform2D {
    let base = Transform2D::new(rotation, Vector2::zeros(), flipped);
    base.translated(*target - base.apply(local))
}

struct Aligner<'a> {
    puzzle: &'a Puzzle,
    config: &'a EngineConfig,
    id: &'a PieceId,
    piece_type: PieceType,
    flipped: bool,
}

impl Aligner<'_> {
    fn scale(&self) -> f64 {
        self.config.visual_scale
    }

    fn local_vertex(&self, index: usize) -> EngineResult<Point2> {
        self.piece_type
            .vertices()
            .get(index)
            .map(|v| Point2::from(v.coords * self.scale()))
            .ok_or_else(|| EngineError::VertexOutOfRange {
                piece: self.id.clone(),
                index,
            })
    }

    fn local_edge(&self, index: usize) -> EngineResult<Segment> {
        let n = self.piece_type.vertex_count();
        if index >= n {
            return Err(EngineError::EdgeOutOfRange {
                piece: self.id.clone(),
                index,
            });
        }
        Ok(Segment::new(self.local_vertex(index)?, self.local_vertex((index + 1) % n)?))
    }

    fn canvas_piece(&self, point: &ConnectionPoint) -> EngineResult<&Piece> {
        find_piece(self.puzzle.pieces(), &point.piece_id)
    }

    fn check_indices(&self, point: &ConnectionPoint, pending: Anchor) -> EngineResult<()> {
        let piece = self.canvas_piece(point)?;
        match point.anchor {
            Anchor::Vertex(i) => vertex_of(piece, i, self.scale()).map(|_| ())?,
            Anchor::Edge(i) => edge_of(piece, i, self.scale()).map(|_| ())?,
        }
        match pending {
            Anchor::Vertex(i) => self.local_vertex(i).map(|_| ()),
            Anchor::Edge(i) => self.local_edge(i).map(|_| ()),
        }
    }

    /// 单对连接点
    ///
    /// 顶点对顶点：待放置顶点落到画布顶点上；边对边：两边反向贴合，位置 0；
    /// 顶点对边：边的起点落到顶点上 / 顶点落到边的起点上。
    fn align_single(&self, point: &ConnectionPoint, pending: Anchor, rotation: f64) -> EngineResult<Transform2D> {
        let piece = self.canvas_piece(point)?;
        let scale = self.scale();
        match (point.anchor, pending) {
            (Anchor::Vertex(cv), Anchor::Vertex(pv)) => Ok(transform_with(
                rotation,
                self.flipped,
                &self.local_vertex(pv)?,
                &vertex_of(piece, cv, scale)?,
            )),
            (Anchor::Edge(ce), Anchor::Edge(pe)) => self.align_edges(piece, ce, pe),
            (Anchor::Vertex(cv), Anchor::Edge(pe)) => Ok(transform_with(
                rotation,
                self.flipped,
                &self.local_edge(pe)?.start,
                &vertex_of(piece, cv, scale)?,
            )),
            (Anchor::Edge(ce), Anchor::Vertex(pv)) => Ok(transform_with(
                rotation,
                self.flipped,
                &self.local_vertex(pv)?,
                &edge_of(piece, ce, scale)?.start,
            )),
        }
    }

    /// 边对边：先试反向（两个逆时针多边形贴合时边方向相反），再试同向，
    /// 取新拼块质心落在画布边另一侧的那一个
    fn align_edges(&self, canvas_piece: &Piece, canvas_edge: usize, pending_edge: usize) -> EngineResult<Transform2D> {
        let scale = self.scale();
        let track = edge_of(canvas_piece, canvas_edge, scale)?;
        let axis = track
            .direction()
            .ok_or_else(|| EngineError::Infeasible("zero-length edge".to_string()))?;
        let local = self.local_edge(pending_edge)?;
        let mirror = Transform2D::new(0.0, Vector2::zeros(), self.flipped);
        let local_dir = mirror.apply_vector(&(local.end - local.start));

        let (ls, lm) = (track.length(), local.length());
        let target_mid = track.start + axis * (lm / 2.0).min(ls - lm / 2.0);
        let local_centroid = Point2::from(self.piece_type.centroid().coords * scale);
        let canvas_side = cross(&axis, &(canvas_piece.world_centroid(scale) - track.start));

        for offset in [180.0, 0.0] {
            let rotation = angle_of(&axis) - angle_of(&local_dir) + offset;
            let transform = transform_with(rotation, self.flipped, &local.midpoint(), &target_mid);
            let side = cross(&axis, &(transform.apply(&local_centroid) - track.start));
            if side * canvas_side < 0.0 {
                return Ok(transform);
            }
        }
        Err(EngineError::Infeasible(
            "edges cannot be aligned with the pieces on opposite sides".to_string(),
        ))
    }

    /// 画布世界点与待放置局部点的离散对应关系（用于两对连接点的联合求解）
    fn correspondences(&self, point: &ConnectionPoint, pending: Anchor) -> EngineResult<Vec<(Point2, Point2)>> {
        let piece = self.canvas_piece(point)?;
        let scale = self.scale();
        Ok(match (point.anchor, pending) {
            (Anchor::Vertex(cv), Anchor::Vertex(pv)) => {
                vec![(vertex_of(piece, cv, scale)?, self.local_vertex(pv)?)]
            }
            (Anchor::Edge(ce), Anchor::Edge(pe)) => {
                let (c, p) = (edge_of(piece, ce, scale)?, self.local_edge(pe)?);
                vec![(c.start, p.end), (c.end, p.start), (c.start, p.start), (c.end, p.end)]
            }
            (Anchor::Vertex(cv), Anchor::Edge(pe)) => {
                let (c, p) = (vertex_of(piece, cv, scale)?, self.local_edge(pe)?);
                vec![(c, p.start), (c, p.end)]
            }
            (Anchor::Edge(ce), Anchor::Vertex(pv)) => {
                let (c, p) = (edge_of(piece, ce, scale)?, self.local_vertex(pv)?);
                vec![(c.start, p), (c.end, p)]
            }
        })
    }

    /// 候选变换是否同时满足所有连接点对
    fn satisfies_all(&self, transform: Transform2D, pairs: &[(&ConnectionPoint, Anchor)]) -> bool {
        let candidate = Piece::new(self.id.clone(), self.piece_type, transform);
        let mut pieces: Vec<Piece> = pairs
            .iter()
            .filter_map(|(point, _)| self.canvas_piece(point).ok().cloned())
            .collect();
        pieces.push(candidate);

        pairs.iter().all(|(point, anchor)| {
            let ct = ConnectionType::from_points(point, &ConnectionPoint {
                piece_id: self.id.clone(),
                anchor: *anchor,
            });
            create_connection(ct, &pieces, self.config).is_ok()
        })
    }

    /// 两对连接点
    ///
    /// 两对都是顶点时做两点对齐（距离不一致即不可行）；
    /// 其余组合按离请求角度由近到远枚举旋转候选，取第一个同时满足两对的变换。
    fn align_two(
        &self,
        first: (&ConnectionPoint, Anchor),
        second: (&ConnectionPoint, Anchor),
        rotation: f64,
    ) -> EngineResult<Transform2D> {
        let scale = self.scale();
        let pairs = [first, second];

        if let ((p1, Anchor::Vertex(v1)), (p2, Anchor::Vertex(v2))) = (first, second) {
            if let (Anchor::Vertex(c1), Anchor::Vertex(c2)) = (p1.anchor, p2.anchor) {
                let w1 = vertex_of(self.canvas_piece(p1)?, c1, scale)?;
                let w2 = vertex_of(self.canvas_piece(p2)?, c2, scale)?;
                let l1 = self.local_vertex(v1)?;
                let l2 = self.local_vertex(v2)?;
                let mirror = Transform2D::new(0.0, Vector2::zeros(), self.flipped);
                let local_span = mirror.apply_vector(&(l2 - l1));
                let world_span = w2 - w1;
                if (world_span.norm() - local_span.norm()).abs() > self.config.tolerance.vertex {
                    return Err(EngineError::Infeasible(format!(
                        "connection points are {:.1} apart on the canvas but {:.1} apart on the piece",
                        world_span.norm(),
                        local_span.norm()
                    )));
                }
                let rotation = angle_of(&world_span) - angle_of(&local_span);
                return Ok(transform_with(rotation, self.flipped, &l1, &w1));
            }
        }

        let step = if self.config.snap.rotation_step > 0.0 {
            self.config.snap.rotation_step
        } else {
            45.0
        };
        let count = (360.0 / step).round() as usize;
        let mut rotations: Vec<f64> = (0..count).map(|i| i as f64 * step).collect();
        rotations.sort_by(|a, b| {
            signed_angle(a - rotation)
                .abs()
                .total_cmp(&signed_angle(b - rotation).abs())
        });

        let mut correspondences = Vec::new();
        for (point, anchor) in pairs {
            correspondences.extend(self.correspondences(point, anchor)?);
        }

        for r in rotations {
            for (world, local) in &correspondences {
                let transform = transform_with(r, self.flipped, local, world);
                if self.satisfies_all(transform, &pairs) {
                    return Ok(transform);
                }
            }
        }
        Err(EngineError::Infeasible(
            "no rotation satisfies both connection points".to_string(),
        ))
    }
}
