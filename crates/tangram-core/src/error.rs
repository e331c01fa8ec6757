//! 引擎错误定义

use crate::piece::PieceId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Piece not found: {0}")]
    PieceNotFound(PieceId),

    #[error("Piece already exists: {0}")]
    DuplicatePiece(PieceId),

    #[error("Vertex index {index} out of range for piece {piece}")]
    VertexOutOfRange { piece: PieceId, index: usize },

    #[error("Edge index {index} out of range for piece {piece}")]
    EdgeOutOfRange { piece: PieceId, index: usize },

    #[error("Connection point count mismatch: {canvas} canvas point(s), {pending} pending point(s)")]
    PointCountMismatch { canvas: usize, pending: usize },

    #[error("At least one connection point is required")]
    NoConnectionPoints,

    #[error("Too many connection points: {0}")]
    TooManyConnectionPoints(usize),

    #[error("Vertices are not coincident")]
    NotCoincident,

    #[error("Connection between {0} and {1} is not satisfied by the current transforms")]
    ConnectionNotSatisfied(PieceId, PieceId),

    #[error("Operation {operation} is not supported for {connection} connections")]
    UnsupportedOperation {
        operation: &'static str,
        connection: &'static str,
    },

    #[error("Piece {0} is not part of the connection")]
    NotInConnection(PieceId),

    #[error("Transform has non-finite components")]
    NonFiniteTransform,

    #[error("Placement overlaps piece(s): {0:?}")]
    Overlap(Vec<PieceId>),

    #[error("Infeasible placement: {0}")]
    Infeasible(String),

    #[error("Rejected: {0}")]
    StructurallyRequired(String),

    #[error("Connection index {0} out of range")]
    ConnectionIndexOutOfRange(usize),
}

pub type EngineResult<T> = Result<T, EngineError>;
