//! 编辑会话
//!
//! [`Editor`] 持有拼图、当前状态和进行中的选择，把用户的每一步操作翻译成引擎调用。
//! 每个操作都先通过 [`transition`] 请求状态切换，被接受后才修改数据；
//! 失败时拼图和状态都保持不变。

use crate::state::{transition, EditorState, RejectedTransition};
use serde::{Deserialize, Serialize};
use tangram_core::catalog::PieceType;
use tangram_core::config::EngineConfig;
use tangram_core::connection::{Anchor, ConnectionPoint, ConnectionType};
use tangram_core::engine::{Operation, TransformEngine, TransformResult, Violation};
use tangram_core::error::EngineError;
use tangram_core::manipulation::{calculate_manipulation_mode, constrain_to_limits, ManipulationMode};
use tangram_core::math::{normalize_angle, CanvasSize, Point2};
use tangram_core::piece::{Piece, PieceId};
use tangram_core::placement::{available_connection_points, calculate_placement, Placement, PlacementRequest};
use tangram_core::puzzle::Puzzle;
use tangram_core::snap::rotation_candidates;
use tangram_core::transform::Transform2D;
use tangram_core::validation::ValidationEngine;
use thiserror::Error;

/// 编辑器错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transition(#[from] RejectedTransition),

    #[error("{operation} is not available while {state}")]
    WrongState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("{0} cannot be flipped")]
    NotFlippable(PieceType),

    #[error("Connection point already selected")]
    DuplicatePoint,

    #[error("Piece {0} is locked")]
    PieceLocked(PieceId),

    #[error("Transform rejected: {0:?}")]
    InvalidTransform(Vec<Violation>),
}

pub type EditorResult<T> = Result<T, EditorError>;

/// 操作已放置拼块时的手势
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Gesture {
    /// 相对当前姿态旋转
    Rotate { angle: f64 },
    /// 滑到轨道上的位置
    Slide { distance: f64 },
    /// 拖到新位置（仅无连接的拼块）
    Drag { position: Point2 },
}

impl Gesture {
    fn operation(&self) -> Operation {
        match *self {
            Gesture::Rotate { angle } => Operation::Rotate { angle, pivot: None },
            Gesture::Slide { distance } => Operation::Slide { distance },
            Gesture::Drag { position } => Operation::Drag { position },
        }
    }
}

/// 编辑会话
#[derive(Debug, Clone)]
pub struct Editor {
    puzzle: Puzzle,
    state: EditorState,
    config: EngineConfig,
    canvas: CanvasSize,
    canvas_points: Vec<ConnectionPoint>,
    pending_points: Vec<Anchor>,
    pending_flipped: bool,
    preview: Option<Placement>,
    available_points: Vec<ConnectionPoint>,
}

impl Editor {
    pub fn new(puzzle: Puzzle, config: EngineConfig, canvas: CanvasSize) -> Self {
        let state = EditorState::initial(&puzzle);
        let available_points = available_connection_points(&puzzle);
        Self {
            puzzle,
            state,
            config,
            canvas,
            canvas_points: Vec::new(),
            pending_points: Vec::new(),
            pending_flipped: false,
            preview: None,
            available_points,
        }
    }

    pub fn puzzle(&self) -> &Puzzle {
        &self.puzzle
    }

    pub fn into_puzzle(self) -> Puzzle {
        self.puzzle
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// 状态栏文字
    pub fn description(&self) -> String {
        self.state.description()
    }

    /// 画布上可选的连接点（每次状态切换后刷新）
    pub fn available_connection_points(&self) -> &[ConnectionPoint] {
        &self.available_points
    }

    pub fn canvas_points(&self) -> &[ConnectionPoint] {
        &self.canvas_points
    }

    pub fn pending_points(&self) -> &[Anchor] {
        &self.pending_points
    }

    fn engine(&self) -> TransformEngine {
        TransformEngine::new(self.config)
    }

    /// 请求状态切换；被接受后执行切换后的刷新
    fn request(&mut self, next: EditorState) -> EditorResult<()> {
        self.state = transition(&self.state, next, &self.puzzle)?;
        self.available_points = available_connection_points(&self.puzzle);
        Ok(())
    }

    fn wrong_state(&self, operation: &'static str) -> EditorError {
        EditorError::WrongState {
            operation,
            state: self.state.name(),
        }
    }

    fn clear_selection(&mut self) {
        self.canvas_points.clear();
        self.pending_points.clear();
        self.pending_flipped = false;
        self.preview = None;
    }

    fn snap_rotation(&self, rotation: f64) -> f64 {
        let step = self.config.snap.rotation_step;
        if step > 0.0 {
            normalize_angle((rotation / step).round() * step)
        } else {
            normalize_angle(rotation)
        }
    }

    /// 从空闲开始新一轮：空拼图选第一块，否则选下一块
    pub fn begin(&mut self) -> EditorResult<()> {
        let next = if self.puzzle.is_empty() {
            EditorState::SelectingFirstPiece
        } else {
            EditorState::SelectingNextPiece
        };
        self.request(next)
    }

    // ---- 第一块 ----

    pub fn choose_first_piece(&mut self, piece_type: PieceType) -> EditorResult<()> {
        self.request(EditorState::ManipulatingFirstPiece {
            piece_type,
            rotation: 0.0,
            flipped: false,
        })
    }

    pub fn rotate_first_piece(&mut self, delta: f64) -> EditorResult<()> {
        let EditorState::ManipulatingFirstPiece {
            piece_type,
            rotation,
            flipped,
        } = self.state
        else {
            return Err(self.wrong_state("rotate_first_piece"));
        };
        let rotation = self.snap_rotation(rotation + delta);
        self.request(EditorState::ManipulatingFirstPiece {
            piece_type,
            rotation,
            flipped,
        })
    }

    pub fn flip_first_piece(&mut self) -> EditorResult<()> {
        let EditorState::ManipulatingFirstPiece {
            piece_type,
            rotation,
            flipped,
        } = self.state
        else {
            return Err(self.wrong_state("flip_first_piece"));
        };
        if !piece_type.can_flip() {
            return Err(EditorError::NotFlippable(piece_type));
        }
        self.request(EditorState::ManipulatingFirstPiece {
            piece_type,
            rotation,
            flipped: !flipped,
        })
    }

    /// 把第一块放到画布中心
    pub fn commit_first_piece(&mut self) -> EditorResult<PieceId> {
        let EditorState::ManipulatingFirstPiece {
            piece_type,
            rotation,
            flipped,
        } = self.state
        else {
            return Err(self.wrong_state("commit_first_piece"));
        };

        let piece = Piece::new(PieceId::generate(), piece_type, Transform2D::identity());
        let result = self.engine().calculate_transform(
            &piece,
            &Operation::Place {
                center: self.canvas.center(),
                rotation,
                flipped,
            },
            None,
            self.puzzle.pieces(),
            self.canvas,
        )?;
        if !result.is_valid {
            return Err(EditorError::InvalidTransform(result.violations));
        }

        let next = transition(&self.state, EditorState::Idle, &self.puzzle)?;
        let id = piece.id.clone();
        self.puzzle.add_piece(piece.with_transform(result.transform))?;
        self.state = next;
        self.available_points = available_connection_points(&self.puzzle);
        Ok(id)
    }

    // ---- 后续拼块 ----

    /// 选择画布连接点；从“选下一块”状态开始时自动进入选点状态
    pub fn select_canvas_point(&mut self, point: ConnectionPoint) -> EditorResult<usize> {
        if self.state == EditorState::SelectingNextPiece {
            self.request(EditorState::SelectingCanvasConnections { max_points: 2 })?;
        }
        let EditorState::SelectingCanvasConnections { max_points } = self.state else {
            return Err(self.wrong_state("select_canvas_point"));
        };

        let piece = self
            .puzzle
            .piece(&point.piece_id)
            .ok_or_else(|| EngineError::PieceNotFound(point.piece_id.clone()))?;
        check_anchor(piece, point.anchor)?;
        if self.canvas_points.contains(&point) {
            return Err(EditorError::DuplicatePoint);
        }
        if self.canvas_points.len() >= max_points {
            return Err(EngineError::TooManyConnectionPoints(self.canvas_points.len() + 1).into());
        }

        self.canvas_points.push(point);
        Ok(self.canvas_points.len())
    }

    /// 选定待放置的拼块类型（选点过程中可以改选）
    pub fn choose_pending_piece(&mut self, piece_type: PieceType) -> EditorResult<()> {
        if !matches!(
            self.state,
            EditorState::SelectingCanvasConnections { .. } | EditorState::SelectingPendingConnections { .. }
        ) {
            return Err(self.wrong_state("choose_pending_piece"));
        }
        if self.canvas_points.is_empty() {
            return Err(EngineError::NoConnectionPoints.into());
        }
        self.request(EditorState::SelectingPendingConnections {
            piece_type,
            max_points: self.canvas_points.len(),
        })?;
        self.pending_points.clear();
        self.pending_flipped = false;
        self.preview = None;
        Ok(())
    }

    /// 待放置拼块是否镜像
    pub fn pending_flipped(&self) -> bool {
        self.pending_flipped
    }

    pub fn select_pending_point(&mut self, anchor: Anchor) -> EditorResult<usize> {
        let EditorState::SelectingPendingConnections {
            piece_type,
            max_points,
        } = self.state
        else {
            return Err(self.wrong_state("select_pending_point"));
        };

        let template = Piece::new(PieceId::new("pending"), piece_type, Transform2D::identity());
        check_anchor(&template, anchor)?;
        if self.pending_points.contains(&anchor) {
            return Err(EditorError::DuplicatePoint);
        }
        if self.pending_points.len() >= max_points {
            return Err(EngineError::TooManyConnectionPoints(self.pending_points.len() + 1).into());
        }

        self.pending_points.push(anchor);
        Ok(self.pending_points.len())
    }

    fn pending_piece_type(&self) -> Option<(PieceType, f64)> {
        match self.state {
            EditorState::SelectingPendingConnections { piece_type, .. } => Some((piece_type, 0.0)),
            EditorState::ManipulatingPendingPiece {
                piece_type,
                rotation,
                ..
            } => Some((piece_type, rotation)),
            EditorState::PreviewingPlacement { ref piece } => Some((piece.piece_type, piece.transform.rotation)),
            _ => None,
        }
    }

    /// 待放置拼块的操作方式：只有一对连接点且画布一侧是顶点时可以旋转
    fn pending_mode(&self) -> ManipulationMode {
        match (self.canvas_points.as_slice(), self.pending_points.as_slice()) {
            ([point], [anchor]) => {
                let ct = ConnectionType::from_points(point, &ConnectionPoint {
                    piece_id: PieceId::new("pending"),
                    anchor: *anchor,
                });
                let pivot = self.puzzle.piece(&point.piece_id).and_then(|p| match point.anchor {
                    Anchor::Vertex(i) => p.world_vertex(i, self.config.visual_scale),
                    Anchor::Edge(i) => p.world_edge(i, self.config.visual_scale).map(|e| e.start),
                });
                match (ct, pivot) {
                    (ConnectionType::EdgeToEdge { .. }, _) | (_, None) => ManipulationMode::Locked,
                    (_, Some(pivot)) => ManipulationMode::Rotatable {
                        pivot,
                        snap_angles: rotation_candidates(&self.config.snap),
                    },
                }
            }
            _ => ManipulationMode::Locked,
        }
    }

    /// 旋转待放置的拼块（放置前）
    pub fn rotate_pending_piece(&mut self, delta: f64) -> EditorResult<()> {
        let Some((piece_type, rotation)) = self.pending_piece_type() else {
            return Err(self.wrong_state("rotate_pending_piece"));
        };
        if self.pending_points.len() != self.canvas_points.len() {
            return Err(EngineError::PointCountMismatch {
                canvas: self.canvas_points.len(),
                pending: self.pending_points.len(),
            }
            .into());
        }
        let mode = self.pending_mode();
        if mode.is_locked() {
            return Err(EditorError::PieceLocked(PieceId::new("pending")));
        }
        self.request(EditorState::ManipulatingPendingPiece {
            piece_type,
            mode,
            rotation: self.snap_rotation(rotation + delta),
        })?;
        self.preview = None;
        Ok(())
    }

    /// 镜像待放置的拼块（仅平行四边形）
    ///
    /// 预览中时立即按新的朝向重新计算预览，失败则撤销镜像。
    pub fn flip_pending_piece(&mut self) -> EditorResult<()> {
        let Some((piece_type, _)) = self.pending_piece_type() else {
            return Err(self.wrong_state("flip_pending_piece"));
        };
        if !piece_type.can_flip() {
            return Err(EditorError::NotFlippable(piece_type));
        }

        self.pending_flipped = !self.pending_flipped;
        if matches!(self.state, EditorState::PreviewingPlacement { .. }) {
            if let Err(e) = self.preview_placement() {
                self.pending_flipped = !self.pending_flipped;
                return Err(e);
            }
        } else {
            self.preview = None;
        }
        Ok(())
    }

    /// 计算放置预览；失败时状态不变
    pub fn preview_placement(&mut self) -> EditorResult<&Placement> {
        let Some((piece_type, rotation)) = self.pending_piece_type() else {
            return Err(self.wrong_state("preview_placement"));
        };
        let request = PlacementRequest {
            piece_type,
            rotation,
            flipped: self.pending_flipped,
            canvas_points: self.canvas_points.clone(),
            pending_points: self.pending_points.clone(),
            piece_id: None,
        };

        let placement = calculate_placement(&self.puzzle, &request, &self.config).map_err(|e| {
            tracing::warn!("Placement preview failed: {}", e);
            e
        })?;
        self.request(EditorState::PreviewingPlacement {
            piece: placement.piece.clone(),
        })?;
        Ok(self.preview.insert(placement))
    }

    /// 提交预览中的放置
    pub fn commit_placement(&mut self) -> EditorResult<PieceId> {
        if !matches!(self.state, EditorState::PreviewingPlacement { .. }) {
            return Err(self.wrong_state("commit_placement"));
        }
        let Some(placement) = self.preview.clone() else {
            return Err(self.wrong_state("commit_placement"));
        };

        let next = transition(&self.state, EditorState::Idle, &self.puzzle)?;
        let id = placement.piece.id.clone();
        self.puzzle.place_piece(placement)?;
        self.state = next;
        self.clear_selection();
        self.available_points = available_connection_points(&self.puzzle);
        Ok(id)
    }

    // ---- 已放置拼块 ----

    /// 拼块当前的操作方式
    pub fn manipulation_mode(&self, id: &PieceId) -> EditorResult<ManipulationMode> {
        let piece = self
            .puzzle
            .piece(id)
            .ok_or_else(|| EngineError::PieceNotFound(id.clone()))?;
        Ok(calculate_manipulation_mode(
            piece,
            self.puzzle.connections(),
            self.puzzle.pieces(),
            self.puzzle.is_first_piece(id),
            &self.config,
        )?)
    }

    /// 选中拼块；已选中另一块时先取消选中
    pub fn select_piece(&mut self, id: &PieceId) -> EditorResult<()> {
        let is_locked = self.manipulation_mode(id)?.is_locked();
        let from = match &self.state {
            EditorState::PieceSelected { id: current, .. } if current != id => {
                transition(&self.state, EditorState::Idle, &self.puzzle)?
            }
            other => other.clone(),
        };
        self.state = transition(
            &from,
            EditorState::PieceSelected {
                id: id.clone(),
                is_locked,
            },
            &self.puzzle,
        )?;
        self.available_points = available_connection_points(&self.puzzle);
        Ok(())
    }

    pub fn begin_unlock(&mut self) -> EditorResult<()> {
        let EditorState::PieceSelected { ref id, .. } = self.state else {
            return Err(self.wrong_state("begin_unlock"));
        };
        let id = id.clone();
        self.request(EditorState::UnlockingPiece { id })
    }

    /// 确认解锁：只保留该拼块的第 `keep` 个连接，删除其余连接
    ///
    /// 删除后拼图必须仍然连通，否则拒绝。第一块始终锁定，不能解锁。
    pub fn confirm_unlock(&mut self, keep: usize) -> EditorResult<()> {
        let EditorState::UnlockingPiece { ref id } = self.state else {
            return Err(self.wrong_state("confirm_unlock"));
        };
        let id = id.clone();
        if self.puzzle.is_first_piece(&id) {
            return Err(EngineError::StructurallyRequired("the first piece is always locked".to_string()).into());
        }

        let own: Vec<usize> = self.puzzle.connections_of(&id).into_iter().map(|(i, _)| i).collect();
        if keep >= own.len() {
            return Err(EngineError::ConnectionIndexOutOfRange(keep).into());
        }

        let mut candidate = self.puzzle.clone();
        // 从后往前删，前面的索引不受影响
        for (position, index) in own.iter().enumerate().rev() {
            if position != keep {
                candidate.remove_connection(*index)?;
            }
        }
        if !ValidationEngine::new(self.config).is_connected(&candidate) {
            return Err(EngineError::StructurallyRequired(format!(
                "removing the other connections of {} would disconnect the puzzle",
                id
            ))
            .into());
        }

        let is_locked = calculate_manipulation_mode(
            candidate
                .piece(&id)
                .ok_or_else(|| EngineError::PieceNotFound(id.clone()))?,
            candidate.connections(),
            candidate.pieces(),
            false,
            &self.config,
        )?
        .is_locked();
        let next = transition(
            &self.state,
            EditorState::PieceSelected {
                id: id.clone(),
                is_locked,
            },
            &candidate,
        )?;

        tracing::info!("Unlocked {} ({} connection(s) removed)", id, own.len() - 1);
        self.puzzle = candidate;
        self.state = next;
        self.available_points = available_connection_points(&self.puzzle);
        Ok(())
    }

    pub fn begin_manipulation(&mut self) -> EditorResult<()> {
        let id = match &self.state {
            EditorState::PieceSelected { id, .. } | EditorState::UnlockingPiece { id } => id.clone(),
            _ => return Err(self.wrong_state("begin_manipulation")),
        };
        let mode = self.gesture_mode(&id)?;
        if mode.is_locked() {
            return Err(EditorError::PieceLocked(id));
        }
        self.request(EditorState::ManipulatingExistingPiece { id, mode })
    }

    /// 手势可用的操作方式：捕捉集合按重叠探测的可动范围裁剪
    fn gesture_mode(&self, id: &PieceId) -> EditorResult<ManipulationMode> {
        let mode = self.manipulation_mode(id)?;
        let connections = self.puzzle.connections_of(id);
        let [(_, connection)] = connections.as_slice() else {
            return Ok(mode);
        };
        let piece = self
            .puzzle
            .piece(id)
            .ok_or_else(|| EngineError::PieceNotFound(id.clone()))?;
        Ok(constrain_to_limits(
            mode,
            piece,
            connection,
            self.puzzle.pieces(),
            &self.config,
        )?)
    }

    /// 计算手势结果（预览，不修改拼图）
    pub fn preview_manipulation(&self, gesture: Gesture) -> EditorResult<TransformResult> {
        let EditorState::ManipulatingExistingPiece { ref id, .. } = self.state else {
            return Err(self.wrong_state("preview_manipulation"));
        };
        let piece = self
            .puzzle
            .piece(id)
            .ok_or_else(|| EngineError::PieceNotFound(id.clone()))?;
        if self.manipulation_mode(id)?.is_locked() {
            return Err(EditorError::PieceLocked(id.clone()));
        }

        let connections = self.puzzle.connections_of(id);
        let connection = match connections.as_slice() {
            [] => None,
            [(_, c)] => Some(*c),
            _ => return Err(EditorError::PieceLocked(id.clone())),
        };
        let others: Vec<Piece> = self
            .puzzle
            .pieces()
            .iter()
            .filter(|p| &p.id != id)
            .cloned()
            .collect();

        Ok(self
            .engine()
            .calculate_transform(piece, &gesture.operation(), connection, &others, self.canvas)?)
    }

    /// 提交手势：结果无效时拒绝，拼图不变
    pub fn commit_manipulation(&mut self, gesture: Gesture) -> EditorResult<TransformResult> {
        let result = self.preview_manipulation(gesture)?;
        if !result.is_valid {
            tracing::warn!("Rejected {:?}: {:?}", gesture, result.violations);
            return Err(EditorError::InvalidTransform(result.violations));
        }
        let Some(id) = self.state.piece_id().cloned() else {
            return Err(self.wrong_state("commit_manipulation"));
        };

        let is_locked = self.manipulation_mode(&id)?.is_locked();
        let next = transition(
            &self.state,
            EditorState::PieceSelected {
                id: id.clone(),
                is_locked,
            },
            &self.puzzle,
        )?;
        self.puzzle.update_transform(&id, result.transform)?;
        self.state = next;
        self.available_points = available_connection_points(&self.puzzle);
        Ok(result)
    }

    /// 删除选中的拼块
    pub fn delete_selected(&mut self) -> EditorResult<Piece> {
        let EditorState::PieceSelected { ref id, .. } = self.state else {
            return Err(self.wrong_state("delete_selected"));
        };
        let id = id.clone();
        let next = transition(&self.state, EditorState::Idle, &self.puzzle)?;
        let removed = self.puzzle.remove_piece(&id, &self.config)?;
        self.state = next;
        self.available_points = available_connection_points(&self.puzzle);
        Ok(removed)
    }

    /// 放弃当前操作回到空闲
    pub fn cancel(&mut self) -> EditorResult<()> {
        self.request(EditorState::Idle)?;
        self.clear_selection();
        Ok(())
    }

    /// 进入错误状态
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Editor error: {}", message);
        // 任何状态都可以进入 Error
        if let Ok(next) = transition(&self.state, EditorState::Error { message }, &self.puzzle) {
            self.state = next;
        }
        self.clear_selection();
    }

    /// 从错误状态恢复到初始状态
    pub fn recover(&mut self) -> EditorResult<()> {
        self.request(EditorState::initial(&self.puzzle))
    }
}

fn check_anchor(piece: &Piece, anchor: Anchor) -> Result<(), EngineError> {
    let n = piece.piece_type.vertex_count();
    match anchor {
        Anchor::Vertex(index) if index >= n => Err(EngineError::VertexOutOfRange {
            piece: piece.id.clone(),
            index,
        }),
        Anchor::Edge(index) if index >= n => Err(EngineError::EdgeOutOfRange {
            piece: piece.id.clone(),
            index,
        }),
        _ => Ok(()),
    }
}
