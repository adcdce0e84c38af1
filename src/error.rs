//! 故事板生成过程中的错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 故事板操作的结果类型
pub type Result<T> = std::result::Result<T, StoryboardError>;

/// 故事板生成可能出现的错误
///
/// 只有 `SourceUnavailable` 对整次运行是致命的；解码截断和字幕解析失败
/// 会在流水线边界被降级为可恢复的结果。零帧输入不是错误，
/// 而是一个空的场景列表。
#[derive(Debug, Error)]
pub enum StoryboardError {
    #[error("无法打开视频源 {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("视频解码提前结束: {reason}")]
    DecodeTruncated { reason: String },

    #[error("字幕解析失败 {path}: {reason}")]
    CaptionParseFailed { path: PathBuf, reason: String },

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("音频提取失败: {0}")]
    AudioExtraction(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("图像处理错误: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoryboardError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn caption_parse_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CaptionParseFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 是否可以降级处理（不中止整次运行）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DecodeTruncated { .. }
                | Self::CaptionParseFailed { .. }
                | Self::AudioExtraction(_)
        )
    }
}
