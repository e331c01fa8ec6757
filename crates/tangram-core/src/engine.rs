//! 变换引擎
//!
//! 计算拼块世界变换的唯一入口，覆盖所有操作：初始放置、旋转、滑动、自由拖动。
//! 实时预览和最终提交走同一条代码路径，预览结果与实际放置结果不会出现偏差。
//!
//! 每次计算之后统一校验：
//! 1. 与其他所有拼块做面积重叠测试（任一重叠 ⇒ 无效）
//! 2. 如果给出了连接，检查连接是否仍然成立
//! 3. 画布边界检查（只报告，不单独导致无效）

use crate::config::EngineConfig;
use crate::connection::{AnchorGeometry, Connection, ConnectionType, ResolvedConnection};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{has_area_overlap, Segment};
use crate::math::{signed_angle, CanvasSize, Point2, Vector2};
use crate::piece::{Piece, PieceId};
use crate::snap::{nearest_angle, rotation_candidates, snap_slide, SnapInfo};
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};

/// 变换操作
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Operation {
    /// 先旋转（可选镜像），再把局部质心移到 `center`
    Place {
        center: Point2,
        rotation: f64,
        #[serde(default)]
        flipped: bool,
    },
    /// 相对当前姿态旋转 `angle` 度；有连接时旋转中心取自连接
    Rotate { angle: f64, pivot: Option<Point2> },
    /// 沿连接约束的轨道滑动到距离 `distance`（滑动边由连接决定）
    Slide { distance: f64 },
    /// 无约束拖动，质心移到 `position`
    Drag { position: Point2 },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Place { .. } => "place",
            Operation::Rotate { .. } => "rotate",
            Operation::Slide { .. } => "slide",
            Operation::Drag { .. } => "drag",
        }
    }
}

/// 校验发现的问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Violation {
    Overlap { piece_id: PieceId },
    BrokenConnection { connection: ConnectionType },
    OutOfBounds,
}

/// 变换计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub transform: Transform2D,
    pub is_valid: bool,
    pub violations: Vec<Violation>,
    pub snap: SnapInfo,
}

impl TransformResult {
    pub fn overlapping_pieces(&self) -> Vec<PieceId> {
        self.violations
            .iter()
            .filter_map(|v| match v {
                Violation::Overlap { piece_id } => Some(piece_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_out_of_bounds(&self) -> bool {
        self.violations.contains(&Violation::OutOfBounds)
    }
}

/// 旋转时的参考框架（旋转中心 + 旋转后的修正）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationFrame {
    /// 无连接：绕给定点旋转
    Free { pivot: Point2 },
    /// 顶点对顶点：旋转后移动块的连接顶点精确落回 `pivot`
    Pivot { pivot: Point2, moving_vertex: usize },
    /// 移动块的顶点搭在静止块的边上：旋转后把顶点重新投影到边上
    VertexOnEdge {
        pivot: Point2,
        moving_vertex: usize,
        edge: Segment,
    },
    /// 移动块的边搭在静止块的顶点上：旋转后平移使边重新经过该顶点
    EdgeThroughVertex { pivot: Point2, moving_edge: usize },
}

impl RotationFrame {
    pub fn from_resolved(resolved: &ResolvedConnection<'_>) -> EngineResult<Self> {
        match (resolved.stationary_geometry, resolved.moving_geometry) {
            (AnchorGeometry::Vertex(pivot), AnchorGeometry::Vertex(_)) => Ok(RotationFrame::Pivot {
                pivot,
                moving_vertex: resolved.moving_anchor.index(),
            }),
            (AnchorGeometry::Edge(edge), AnchorGeometry::Vertex(vertex)) => {
                Ok(RotationFrame::VertexOnEdge {
                    pivot: edge.nearest_point(&vertex),
                    moving_vertex: resolved.moving_anchor.index(),
                    edge,
                })
            }
            (AnchorGeometry::Vertex(pivot), AnchorGeometry::Edge(_)) => {
                Ok(RotationFrame::EdgeThroughVertex {
                    pivot,
                    moving_edge: resolved.moving_anchor.index(),
                })
            }
            (AnchorGeometry::Edge(_), AnchorGeometry::Edge(_)) => Err(EngineError::UnsupportedOperation {
                operation: "rotate",
                connection: "edge-to-edge",
            }),
        }
    }

    pub fn pivot(&self) -> Point2 {
        match *self {
            RotationFrame::Free { pivot }
            | RotationFrame::Pivot { pivot, .. }
            | RotationFrame::VertexOnEdge { pivot, .. }
            | RotationFrame::EdgeThroughVertex { pivot, .. } => pivot,
        }
    }

    /// 把 `piece` 绕框架旋转 `delta` 度后的变换
    pub fn transform_for(&self, piece: &Piece, delta: f64, scale: f64) -> Transform2D {
        let rotated = piece.transform.rotated_about(&self.pivot(), delta);
        let turned = piece.with_transform(rotated);

        let correction = match *self {
            RotationFrame::Free { .. } => Vector2::zeros(),
            RotationFrame::Pivot {
                pivot,
                moving_vertex,
            } => turned
                .world_vertex(moving_vertex, scale)
                .map(|v| pivot - v)
                .unwrap_or_else(Vector2::zeros),
            RotationFrame::VertexOnEdge {
                moving_vertex,
                edge,
                ..
            } => turned
                .world_vertex(moving_vertex, scale)
                .map(|v| edge.nearest_point(&v) - v)
                .unwrap_or_else(Vector2::zeros),
            RotationFrame::EdgeThroughVertex { pivot, moving_edge } => turned
                .world_edge(moving_edge, scale)
                .map(|e| pivot - e.nearest_point(&pivot))
                .unwrap_or_else(Vector2::zeros),
        };
        rotated.translated(correction)
    }
}

/// 滑动时的参考框架
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlideFrame {
    /// 边对边：移动边的中点沿静止边所在直线移动
    Track {
        origin: Point2,
        axis: Vector2,
        /// 位置 0 对应的移动边中点坐标（沿轴）
        start: f64,
        range: f64,
        moving_edge: usize,
    },
    /// 移动块顶点沿静止块的边移动
    VertexAlongEdge {
        origin: Point2,
        axis: Vector2,
        range: f64,
        moving_vertex: usize,
    },
    /// 移动块的边在静止块顶点下方滑过
    EdgeAlongVertex {
        anchor: Point2,
        range: f64,
        moving_edge: usize,
    },
}

impl SlideFrame {
    pub fn from_resolved(resolved: &ResolvedConnection<'_>) -> EngineResult<Self> {
        let zero_length = || EngineError::Infeasible("zero-length edge".to_string());
        match (resolved.stationary_geometry, resolved.moving_geometry) {
            (AnchorGeometry::Edge(stationary), AnchorGeometry::Edge(moving)) => {
                let axis = stationary.direction().ok_or_else(zero_length)?;
                let (ls, lm) = (stationary.length(), moving.length());
                Ok(SlideFrame::Track {
                    origin: stationary.start,
                    axis,
                    start: (lm / 2.0).min(ls - lm / 2.0),
                    range: (ls - lm).abs(),
                    moving_edge: resolved.moving_anchor.index(),
                })
            }
            (AnchorGeometry::Edge(edge), AnchorGeometry::Vertex(_)) => Ok(SlideFrame::VertexAlongEdge {
                origin: edge.start,
                axis: edge.direction().ok_or_else(zero_length)?,
                range: edge.length(),
                moving_vertex: resolved.moving_anchor.index(),
            }),
            (AnchorGeometry::Vertex(anchor), AnchorGeometry::Edge(edge)) => {
                edge.direction().ok_or_else(zero_length)?;
                Ok(SlideFrame::EdgeAlongVertex {
                    anchor,
                    range: edge.length(),
                    moving_edge: resolved.moving_anchor.index(),
                })
            }
            (AnchorGeometry::Vertex(_), AnchorGeometry::Vertex(_)) => Err(EngineError::UnsupportedOperation {
                operation: "slide",
                connection: "vertex-to-vertex",
            }),
        }
    }

    pub fn range(&self) -> f64 {
        match *self {
            SlideFrame::Track { range, .. }
            | SlideFrame::VertexAlongEdge { range, .. }
            | SlideFrame::EdgeAlongVertex { range, .. } => range,
        }
    }

    /// 移动块当前所在的滑动位置
    pub fn position_of(&self, piece: &Piece, scale: f64) -> EngineResult<f64> {
        match *self {
            SlideFrame::Track {
                origin,
                axis,
                start,
                moving_edge,
                ..
            } => {
                let edge = edge_or_err(piece, moving_edge, scale)?;
                Ok((edge.midpoint() - origin).dot(&axis) - start)
            }
            SlideFrame::VertexAlongEdge {
                origin,
                axis,
                moving_vertex,
                ..
            } => {
                let v = vertex_or_err(piece, moving_vertex, scale)?;
                Ok((v - origin).dot(&axis))
            }
            SlideFrame::EdgeAlongVertex {
                anchor,
                moving_edge,
                ..
            } => {
                let edge = edge_or_err(piece, moving_edge, scale)?;
                let dir = edge
                    .direction()
                    .ok_or_else(|| EngineError::Infeasible("zero-length edge".to_string()))?;
                Ok((anchor - edge.start).dot(&dir))
            }
        }
    }

    /// 把 `piece` 滑到位置 `s` 后的变换（纯平移）
    pub fn transform_for(&self, piece: &Piece, s: f64, scale: f64) -> EngineResult<Transform2D> {
        let delta = match *self {
            SlideFrame::Track {
                origin,
                axis,
                start,
                moving_edge,
                ..
            } => {
                let edge = edge_or_err(piece, moving_edge, scale)?;
                let target = origin + axis * (start + s);
                target - edge.midpoint()
            }
            SlideFrame::VertexAlongEdge {
                origin,
                axis,
                moving_vertex,
                ..
            } => {
                let v = vertex_or_err(piece, moving_vertex, scale)?;
                (origin + axis * s) - v
            }
            SlideFrame::EdgeAlongVertex {
                anchor,
                moving_edge,
                ..
            } => {
                let edge = edge_or_err(piece, moving_edge, scale)?;
                let dir = edge
                    .direction()
                    .ok_or_else(|| EngineError::Infeasible("zero-length edge".to_string()))?;
                (anchor - dir * s) - edge.start
            }
        };
        Ok(piece.transform.translated(delta))
    }

    /// 滑动轨道（渲染提示用）
    pub fn track(&self, piece: &Piece, scale: f64) -> EngineResult<Segment> {
        match *self {
            SlideFrame::Track {
                origin,
                axis,
                start,
                range,
                moving_edge,
            } => {
                let lm = edge_or_err(piece, moving_edge, scale)?.length();
                let from = start - lm / 2.0;
                let to = start + range + lm / 2.0;
                Ok(Segment::new(origin + axis * from, origin + axis * to))
            }
            SlideFrame::VertexAlongEdge {
                origin,
                axis,
                range,
                ..
            } => Ok(Segment::new(origin, origin + axis * range)),
            SlideFrame::EdgeAlongVertex { moving_edge, .. } => edge_or_err(piece, moving_edge, scale),
        }
    }
}

fn vertex_or_err(piece: &Piece, index: usize, scale: f64) -> EngineResult<Point2> {
    piece
        .world_vertex(index, scale)
        .ok_or_else(|| EngineError::VertexOutOfRange {
            piece: piece.id.clone(),
            index,
        })
}

fn edge_or_err(piece: &Piece, index: usize, scale: f64) -> EngineResult<Segment> {
    piece
        .world_edge(index, scale)
        .ok_or_else(|| EngineError::EdgeOutOfRange {
            piece: piece.id.clone(),
            index,
        })
}

/// 变换引擎
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformEngine {
    config: EngineConfig,
}

impl TransformEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 计算操作后的变换并校验
    ///
    /// 输入错误（索引越界、操作与连接类型不匹配、非有限分量）以 `Err` 返回；
    /// 几何上不可行（重叠、连接断开）以 `is_valid == false` 返回。
    pub fn calculate_transform(
        &self,
        piece: &Piece,
        operation: &Operation,
        connection: Option<&Connection>,
        other_pieces: &[Piece],
        canvas: CanvasSize,
    ) -> EngineResult<TransformResult> {
        let scale = self.config.visual_scale;
        let (transform, snap) = match *operation {
            Operation::Place {
                center,
                rotation,
                flipped,
            } => (self.place(piece, center, rotation, flipped), SnapInfo::None),
            Operation::Drag { position } => {
                if let Some(c) = connection {
                    return Err(EngineError::UnsupportedOperation {
                        operation: "drag",
                        connection: c.connection_type.kind_name(),
                    });
                }
                let delta = position - piece.world_centroid(scale);
                (piece.transform.translated(delta), SnapInfo::None)
            }
            Operation::Rotate { angle, pivot } => {
                let frame = match connection {
                    Some(c) => {
                        let pair = connection_pair(c, piece, other_pieces)?;
                        let resolved =
                            ResolvedConnection::resolve(&c.connection_type, &piece.id, &pair, &self.config)?;
                        let frame = RotationFrame::from_resolved(&resolved)?;
                        if let Some(p) = pivot {
                            if (p - frame.pivot()).norm() > self.config.tolerance.vertex {
                                tracing::debug!(
                                    "Requested pivot {:?} differs from connection pivot {:?}, using connection",
                                    p,
                                    frame.pivot()
                                );
                            }
                        }
                        frame
                    }
                    None => RotationFrame::Free {
                        pivot: pivot.unwrap_or_else(|| piece.world_centroid(scale)),
                    },
                };
                self.rotate(piece, angle, &frame, other_pieces)
            }
            Operation::Slide { distance } => {
                let c = connection.ok_or(EngineError::UnsupportedOperation {
                    operation: "slide",
                    connection: "unconnected",
                })?;
                let pair = connection_pair(c, piece, other_pieces)?;
                let resolved = ResolvedConnection::resolve(&c.connection_type, &piece.id, &pair, &self.config)?;
                let frame = SlideFrame::from_resolved(&resolved)?;
                let (stop_index, snapped) = snap_slide(distance, frame.range(), &self.config.snap);
                (
                    frame.transform_for(piece, snapped, scale)?,
                    SnapInfo::Slide {
                        requested: distance,
                        snapped,
                        stop_index,
                    },
                )
            }
        };

        if !transform.is_finite() {
            tracing::warn!("Non-finite transform computed for {} ({})", piece.id, operation.name());
            return Err(EngineError::NonFiniteTransform);
        }

        let candidate = piece.with_transform(transform);
        let violations = self.validate(&candidate, connection, other_pieces, canvas);
        let is_valid = !violations
            .iter()
            .any(|v| !matches!(v, Violation::OutOfBounds));

        tracing::debug!(
            "{} {} -> rotation {:.1}, translation ({:.2}, {:.2}), valid={}",
            operation.name(),
            piece.id,
            transform.rotation,
            transform.translation.x,
            transform.translation.y,
            is_valid
        );

        Ok(TransformResult {
            transform,
            is_valid,
            violations,
            snap,
        })
    }

    /// 初始放置：旋转（可选镜像）后把局部质心移到 `center`
    pub fn place(&self, piece: &Piece, center: Point2, rotation: f64, flipped: bool) -> Transform2D {
        let flipped = flipped && piece.piece_type.can_flip();
        let local_centroid = piece.piece_type.centroid().coords * self.config.visual_scale;
        let base = Transform2D::new(rotation, Vector2::zeros(), flipped);
        base.translated(center.coords - base.apply_vector(&local_centroid))
    }

    /// 在合法的 45° 候选角度中，选择离请求角度最近且不与其他块重叠的一个；
    /// 没有无重叠的候选时退回 0°。
    fn rotate(
        &self,
        piece: &Piece,
        angle: f64,
        frame: &RotationFrame,
        other_pieces: &[Piece],
    ) -> (Transform2D, SnapInfo) {
        let scale = self.config.visual_scale;
        let requested = signed_angle(angle);

        let free: Vec<f64> = rotation_candidates(&self.config.snap)
            .into_iter()
            .filter(|&delta| {
                let candidate = piece.with_transform(frame.transform_for(piece, delta, scale));
                self.overlapping(&candidate, other_pieces).is_empty()
            })
            .collect();

        let snapped = nearest_angle(requested, &free).unwrap_or_else(|| {
            tracing::debug!("No overlap-free rotation for {}, falling back to 0", piece.id);
            0.0
        });

        (
            frame.transform_for(piece, snapped, scale),
            SnapInfo::Angle { requested, snapped },
        )
    }

    /// 与候选拼块发生面积重叠的其他拼块
    pub fn overlapping(&self, candidate: &Piece, other_pieces: &[Piece]) -> Vec<PieceId> {
        let scale = self.config.visual_scale;
        let vertices = candidate.world_vertices(scale);
        other_pieces
            .iter()
            .filter(|other| other.id != candidate.id)
            .filter(|other| has_area_overlap(&vertices, &other.world_vertices(scale), &self.config.tolerance))
            .map(|other| other.id.clone())
            .collect()
    }

    /// 统一校验：重叠、连接保持、画布边界（软约束）
    pub fn validate(
        &self,
        candidate: &Piece,
        connection: Option<&Connection>,
        other_pieces: &[Piece],
        canvas: CanvasSize,
    ) -> Vec<Violation> {
        let mut violations: Vec<Violation> = self
            .overlapping(candidate, other_pieces)
            .into_iter()
            .map(|piece_id| Violation::Overlap { piece_id })
            .collect();

        if let Some(c) = connection {
            let satisfied = connection_pair(c, candidate, other_pieces)
                .and_then(|pair| {
                    ResolvedConnection::resolve(&c.connection_type, &candidate.id, &pair, &self.config)
                        .map(|r| r.is_satisfied(&self.config))
                })
                .unwrap_or(false);
            if !satisfied {
                violations.push(Violation::BrokenConnection {
                    connection: c.connection_type.clone(),
                });
            }
        }

        let bbox = candidate.bounding_box(self.config.visual_scale);
        if !canvas.bounds().contains(&bbox, self.config.tolerance.edge) {
            violations.push(Violation::OutOfBounds);
        }

        violations
    }
}

/// `[静止块, 移动块]`，移动块使用调用方给出的（候选）变换
pub(crate) fn connection_pair(
    connection: &Connection,
    piece: &Piece,
    other_pieces: &[Piece],
) -> EngineResult<[Piece; 2]> {
    let other_id = connection
        .other(&piece.id)
        .ok_or_else(|| EngineError::NotInConnection(piece.id.clone()))?;
    let stationary = other_pieces
        .iter()
        .find(|p| &p.id == other_id)
        .ok_or_else(|| EngineError::PieceNotFound(other_id.clone()))?;
    Ok([stationary.clone(), piece.clone()])
}
