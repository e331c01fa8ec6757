//! 拼图文档（拼图 + 元数据）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tangram_core::puzzle::Puzzle;

/// 文档元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: "未命名拼图".to_string(),
            created: now,
            modified: now,
        }
    }
}

/// 一个可保存的拼图文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub metadata: DocumentMetadata,
    pub puzzle: Puzzle,
}

impl Document {
    pub fn new(puzzle: Puzzle) -> Self {
        Self {
            metadata: DocumentMetadata::default(),
            puzzle,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = title.into();
        self
    }

    /// 更新修改时间
    pub fn touch(&mut self) {
        self.metadata.modified = Utc::now();
    }
}

impl From<Puzzle> for Document {
    fn from(puzzle: Puzzle) -> Self {
        Self::new(puzzle)
    }
}
