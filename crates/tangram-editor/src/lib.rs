//! 七巧板编辑器
//!
//! 把用户的拼装流程建模为显式状态机，并在其上提供编辑会话：
//! - `state`: 状态定义与切换规则（纯函数，不修改拼图）
//! - `session`: 持有拼图的编辑会话，每一步都先经过状态机再调用引擎

pub mod session;
pub mod state;

pub use session::{Editor, EditorError, EditorResult, Gesture};
pub use state::{transition, EditorState, RejectedTransition};
