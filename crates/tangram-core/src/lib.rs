//! 七巧板核心引擎
//!
//! 提供拼块几何、连接约束、变换计算和拼装校验功能。
//!
//! # 架构设计
//!
//! - `catalog` / `piece`: 七种固定形状及其放置实例
//! - `geometry`: 纯函数几何内核（SAT 重叠、接触分类）
//! - `connection`: 拼块之间的声明式连接及其隐含的运动约束
//! - `engine` / `placement`: 所有变换的唯一计算入口
//! - `manipulation` / `validation`: 操作方式推导与整体校验
//!
//! 引擎单线程、同步、无 I/O；所有参数通过 [`config::EngineConfig`] 显式传入。
//!
//! # 示例
//!
//! ```rust
//! use tangram_core::prelude::*;
//!
//! let config = EngineConfig::default();
//! let engine = TransformEngine::new(config);
//! let mut puzzle = Puzzle::new();
//!
//! // 第一块放在画布中心
//! let square = Piece::new(PieceId::new("square"), PieceType::Square, Transform2D::identity());
//! let t = engine.place(&square, CanvasSize::new(800.0, 600.0).center(), 0.0, false);
//! puzzle.add_piece(square.with_transform(t)).unwrap();
//!
//! // 小三角形的顶点 0 接到正方形的顶点 2
//! let request = PlacementRequest::new(PieceType::SmallTriangle1)
//!     .pair(ConnectionPoint::vertex("square", 2), Anchor::Vertex(0));
//! let placement = calculate_placement(&puzzle, &request, &config).unwrap();
//! puzzle.place_piece(placement).unwrap();
//!
//! assert!(ValidationEngine::new(config).is_valid_assembly(&puzzle));
//! ```

pub mod catalog;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod manipulation;
pub mod math;
pub mod piece;
pub mod placement;
pub mod puzzle;
pub mod snap;
pub mod spatial;
pub mod transform;
pub mod validation;

pub use error::{EngineError, EngineResult};

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::catalog::PieceType;
    pub use crate::config::{ConnectivityMode, EngineConfig, SlideSnapSet, SnapConfig, ToleranceConfig};
    pub use crate::connection::{
        calculate_constraint, create_connection, is_connection_satisfied, Anchor, Connection,
        ConnectionPoint, ConnectionType, Constraint,
    };
    pub use crate::engine::{Operation, TransformEngine, TransformResult, Violation};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::geometry::{classify_contact, has_area_overlap, ContactType, Segment};
    pub use crate::manipulation::{
        calculate_manipulation_mode, calculate_rotation_limits, calculate_slide_limits, constrain_to_limits, Limits,
        ManipulationMode,
    };
    pub use crate::math::{BoundingBox2, CanvasSize, Point2, Vector2};
    pub use crate::piece::{Piece, PieceId};
    pub use crate::placement::{available_connection_points, calculate_placement, Placement, PlacementRequest};
    pub use crate::puzzle::Puzzle;
    pub use crate::snap::SnapInfo;
    pub use crate::transform::Transform2D;
    pub use crate::validation::{AssemblyReport, ValidationEngine};
}
