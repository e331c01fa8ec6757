//! 编辑器状态机
//!
//! [`EditorState`] 是“用户当前在做什么”的唯一来源。状态切换只能通过纯函数
//! [`transition`] 完成：给定当前状态、请求的状态和拼图，返回新状态或拒绝原因。
//! 被拒绝时当前状态保持不变，调用方按未变的状态重新刷新界面。

use serde::{Deserialize, Serialize};
use tangram_core::catalog::PieceType;
use tangram_core::manipulation::ManipulationMode;
use tangram_core::piece::{Piece, PieceId};
use tangram_core::puzzle::Puzzle;
use thiserror::Error;

/// 编辑状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditorState {
    /// 空闲
    #[default]
    Idle,
    /// 选择第一块拼块
    SelectingFirstPiece,
    /// 调整第一块的朝向
    #[serde(rename_all = "camelCase")]
    ManipulatingFirstPiece {
        piece_type: PieceType,
        rotation: f64,
        flipped: bool,
    },
    /// 选择下一块拼块
    SelectingNextPiece,
    /// 在画布上选连接点
    #[serde(rename_all = "camelCase")]
    SelectingCanvasConnections { max_points: usize },
    /// 在待放置拼块上选连接点
    #[serde(rename_all = "camelCase")]
    SelectingPendingConnections {
        piece_type: PieceType,
        max_points: usize,
    },
    /// 调整待放置拼块的朝向
    #[serde(rename_all = "camelCase")]
    ManipulatingPendingPiece {
        piece_type: PieceType,
        mode: ManipulationMode,
        rotation: f64,
    },
    /// 预览放置结果
    PreviewingPlacement { piece: Piece },
    /// 选中已放置的拼块
    #[serde(rename_all = "camelCase")]
    PieceSelected { id: PieceId, is_locked: bool },
    /// 确认解锁（移除多余连接）
    UnlockingPiece { id: PieceId },
    /// 操作已放置的拼块
    ManipulatingExistingPiece { id: PieceId, mode: ManipulationMode },
    /// 出错（任何状态都可以进入，也可以从这里回到任何状态）
    Error { message: String },
}

impl EditorState {
    /// 初始状态：空拼图从选第一块开始
    pub fn initial(puzzle: &Puzzle) -> Self {
        if puzzle.is_empty() {
            EditorState::SelectingFirstPiece
        } else {
            EditorState::Idle
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EditorState::Idle => "Idle",
            EditorState::SelectingFirstPiece => "SelectingFirstPiece",
            EditorState::ManipulatingFirstPiece { .. } => "ManipulatingFirstPiece",
            EditorState::SelectingNextPiece => "SelectingNextPiece",
            EditorState::SelectingCanvasConnections { .. } => "SelectingCanvasConnections",
            EditorState::SelectingPendingConnections { .. } => "SelectingPendingConnections",
            EditorState::ManipulatingPendingPiece { .. } => "ManipulatingPendingPiece",
            EditorState::PreviewingPlacement { .. } => "PreviewingPlacement",
            EditorState::PieceSelected { .. } => "PieceSelected",
            EditorState::UnlockingPiece { .. } => "UnlockingPiece",
            EditorState::ManipulatingExistingPiece { .. } => "ManipulatingExistingPiece",
            EditorState::Error { .. } => "Error",
        }
    }

    /// 状态栏文字
    pub fn description(&self) -> String {
        match self {
            EditorState::Idle => "就绪".to_string(),
            EditorState::SelectingFirstPiece => "选择第一块拼块".to_string(),
            EditorState::ManipulatingFirstPiece {
                piece_type,
                rotation,
                flipped,
            } => {
                let flip = if *flipped { "，已镜像" } else { "" };
                format!("调整{}：旋转 {:.0}°{}", piece_type.display_name(), rotation, flip)
            }
            EditorState::SelectingNextPiece => "选择要连接的位置或下一块拼块".to_string(),
            EditorState::SelectingCanvasConnections { max_points } => {
                format!("在画布上选择连接点（最多 {} 个）", max_points)
            }
            EditorState::SelectingPendingConnections {
                piece_type,
                max_points,
            } => format!("在{}上选择 {} 个连接点", piece_type.display_name(), max_points),
            EditorState::ManipulatingPendingPiece {
                piece_type,
                rotation,
                ..
            } => format!("调整{}：旋转 {:.0}°", piece_type.display_name(), rotation),
            EditorState::PreviewingPlacement { piece } => {
                format!("预览：{}", piece.piece_type.display_name())
            }
            EditorState::PieceSelected { id, is_locked } => {
                if *is_locked {
                    format!("已选中 {}（已锁定）", id)
                } else {
                    format!("已选中 {}", id)
                }
            }
            EditorState::UnlockingPiece { id } => format!("解锁 {}：选择要保留的连接", id),
            EditorState::ManipulatingExistingPiece { id, mode } => {
                format!("操作 {}（{}）", id, mode.name())
            }
            EditorState::Error { message } => format!("错误：{}", message),
        }
    }

    /// 当前状态关联的拼块（如果有）
    pub fn piece_id(&self) -> Option<&PieceId> {
        match self {
            EditorState::PieceSelected { id, .. }
            | EditorState::UnlockingPiece { id }
            | EditorState::ManipulatingExistingPiece { id, .. } => Some(id),
            _ => None,
        }
    }

    fn same_kind(&self, other: &EditorState) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl std::fmt::Display for EditorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

/// 被拒绝的状态切换
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transition {from} -> {to} rejected: {reason}")]
pub struct RejectedTransition {
    pub from: &'static str,
    pub to: &'static str,
    pub reason: String,
}

/// 状态切换
///
/// 合法性取决于两端状态，部分切换还取决于拼图内容
/// （Idle 进入选第一块/下一块时看拼图是否为空，选中拼块时看拼块是否存在）。
pub fn transition(
    current: &EditorState,
    requested: EditorState,
    puzzle: &Puzzle,
) -> Result<EditorState, RejectedTransition> {
    match check(current, &requested, puzzle) {
        Ok(()) => {
            tracing::debug!("State {} -> {}", current.name(), requested.name());
            Ok(requested)
        }
        Err(reason) => {
            let rejected = RejectedTransition {
                from: current.name(),
                to: requested.name(),
                reason,
            };
            tracing::warn!("{}", rejected);
            Err(rejected)
        }
    }
}

fn check(current: &EditorState, requested: &EditorState, puzzle: &Puzzle) -> Result<(), String> {
    use EditorState::*;

    // 选中的拼块必须存在
    if let Some(id) = requested.piece_id() {
        if puzzle.piece(id).is_none() {
            return Err(format!("piece {} does not exist", id));
        }
    }

    // 第一块始终锁定
    match requested {
        PieceSelected { id, is_locked: false } if puzzle.is_first_piece(id) => {
            return Err(format!("piece {} is the first piece and always locked", id));
        }
        ManipulatingExistingPiece { id, .. } if puzzle.is_first_piece(id) => {
            return Err(format!("piece {} is the first piece and always locked", id));
        }
        ManipulatingExistingPiece { mode, .. } if mode.is_locked() => {
            return Err("cannot manipulate a locked piece".to_string());
        }
        _ => {}
    }

    match (current, requested) {
        (_, Error { .. }) | (Error { .. }, _) => Ok(()),

        (Idle, SelectingFirstPiece) => {
            if puzzle.is_empty() {
                Ok(())
            } else {
                Err("puzzle already has pieces".to_string())
            }
        }
        (Idle, SelectingNextPiece) => {
            if puzzle.is_empty() {
                Err("puzzle has no pieces to connect to".to_string())
            } else {
                Ok(())
            }
        }

        (PieceSelected { id, is_locked }, UnlockingPiece { id: target }) => {
            if id != target {
                Err("can only unlock the selected piece".to_string())
            } else if !is_locked {
                Err("piece is not locked".to_string())
            } else {
                Ok(())
            }
        }
        (PieceSelected { id, is_locked }, ManipulatingExistingPiece { id: target, .. }) => {
            if id != target {
                Err("can only manipulate the selected piece".to_string())
            } else if *is_locked {
                Err("piece is locked".to_string())
            } else {
                Ok(())
            }
        }
        (UnlockingPiece { id }, PieceSelected { id: target, .. })
        | (UnlockingPiece { id }, ManipulatingExistingPiece { id: target, .. })
        | (ManipulatingExistingPiece { id, .. }, PieceSelected { id: target, .. })
        | (UnlockingPiece { id }, UnlockingPiece { id: target })
        | (ManipulatingExistingPiece { id, .. }, ManipulatingExistingPiece { id: target, .. }) => {
            if id == target {
                Ok(())
            } else {
                Err("a different piece is being edited".to_string())
            }
        }
        (
            PieceSelected { id, is_locked },
            PieceSelected {
                id: target,
                is_locked: target_locked,
            },
        ) => {
            if id != target {
                Err("deselect the current piece first".to_string())
            } else if *is_locked && !target_locked {
                Err("piece can only be unlocked by removing connections".to_string())
            } else {
                Ok(())
            }
        }

        (c, r) if c.same_kind(r) => Ok(()),

        (Idle, PieceSelected { .. })
        | (SelectingFirstPiece, ManipulatingFirstPiece { .. } | Idle)
        | (ManipulatingFirstPiece { .. }, Idle | SelectingFirstPiece)
        | (SelectingNextPiece, SelectingCanvasConnections { .. } | Idle)
        | (
            SelectingCanvasConnections { .. },
            SelectingPendingConnections { .. } | SelectingNextPiece | Idle,
        )
        | (
            SelectingPendingConnections { .. },
            ManipulatingPendingPiece { .. } | PreviewingPlacement { .. } | SelectingCanvasConnections { .. } | Idle,
        )
        | (
            ManipulatingPendingPiece { .. },
            PreviewingPlacement { .. } | SelectingPendingConnections { .. } | Idle,
        )
        | (
            PreviewingPlacement { .. },
            Idle | ManipulatingPendingPiece { .. } | SelectingPendingConnections { .. },
        )
        | (PieceSelected { .. }, Idle)
        | (UnlockingPiece { .. }, Idle)
        | (ManipulatingExistingPiece { .. }, Idle) => Ok(()),

        _ => Err("transition not allowed".to_string()),
    }
}
