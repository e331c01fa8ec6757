//! 七巧板文件格式处理
//!
//! 支持：
//! - `.tangram` 原生格式（MessagePack + Zstd）
//! - `.json` 明文格式（便于手工编辑和调试）
//!
//! 两种格式都通过 [`decode_puzzle`] 读入，并在这里完成引用完整性检查。

pub mod document;
pub mod error;
pub mod native;

pub use document::{Document, DocumentMetadata};
pub use error::FileError;
pub use native::{decode_document, decode_puzzle, encode, encode_json, load, save};
