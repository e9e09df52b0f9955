//! 错误类型（对外暴露）
//!
//! 转义序列解码失败不会出现在这里：畸形转义一律就地退化为普通文本。
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenizeError {
    /// 快照缺少必需结构（documents/strings 或 result 包装），或索引越界
    #[error("malformed DOM snapshot: {0}")]
    MalformedSnapshot(String),

    /// 输入不是合法 JSON
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// 切分循环连续多轮没有推进（实现缺陷，不是数据问题）
    #[error("runaway rewrite at fragment {cursor}/{len} while splitting {text:?}")]
    RunawayRewrite { text: String, cursor: usize, len: usize },

    /// 已通过正则校验的 base64 片段解码失败（实现缺陷）
    #[error("failed to decode base64 span {encoded:?}")]
    DecodeFailure {
        encoded: String,
        #[source]
        source: base64::DecodeError,
    },

    /// 正则或自动机构建失败
    #[error("failed to build matcher: {0}")]
    Setup(String),
}

impl From<regex::Error> for TokenizeError {
    fn from(e: regex::Error) -> Self {
        TokenizeError::Setup(e.to_string())
    }
}

impl From<aho_corasick::BuildError> for TokenizeError {
    fn from(e: aho_corasick::BuildError) -> Self {
        TokenizeError::Setup(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TokenizeError>;
