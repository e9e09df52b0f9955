//! 切分选项、批量导出选项与统计信息（模块）
use serde::Deserialize;

/// 切分器参数
/// - 默认值即行为基准，修改任何一项都会改变输出的 token 序列
/// - `urlish_threshold` 与 `phi_ratio` 为经验值，可通过 TOML 调整
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitterOptions {
    /// base64 载荷的占位 token
    pub base64_token: String,
    /// 超长单词的占位 token
    pub long_token: String,
    /// 单词最大长度；超过则折叠为 [LONG]
    pub max_word_len: usize,
    /// base64 最短编码长度（6 组 × 4 字符）
    pub min_base64_len: usize,
    /// 纯十六进制 token 折叠的最短长度
    pub min_hex_len: usize,
    /// URL 判定时回看的已输出 token 数
    pub urlish_lookback: usize,
    /// URL 词汇命中数阈值
    pub urlish_threshold: usize,
    /// 超过该长度的片段不做 URL 判定
    pub longest_urlish: usize,
    /// 超过该长度的片段不做单字母表检验，直接视为 base64
    pub longest_phitest: usize,
    /// 观测碰撞值与随机期望值之比的上限
    pub phi_ratio: f64,
    /// 活性保护：游标与列表长度连续不变的最大轮数
    pub max_stalled_iterations: usize,
}

impl Default for SplitterOptions {
    fn default() -> Self {
        Self {
            base64_token: "[BASE64]".to_string(),
            long_token: "[LONG]".to_string(),
            max_word_len: 32,
            min_base64_len: 24,
            min_hex_len: 8,
            urlish_lookback: 5,
            urlish_threshold: 2,
            longest_urlish: 1024,
            longest_phitest: 85,
            phi_ratio: 2.0,
            max_stalled_iterations: 100,
        }
    }
}

/// 导出格式
/// - Json：每行一个 `{"source", "tokenized"}` 对象
/// - Text：每行为空格拼接的 token，可直接作为词表训练语料
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Json,
    Text,
}

/// 批量导出选项
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// 输出格式
    pub format: DumpFormat,
    /// 最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
    /// 切分器参数
    pub splitter: SplitterOptions,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            threads: None,
            format: DumpFormat::Json,
            max_file_size: None,
            splitter: SplitterOptions::default(),
        }
    }
}

/// 导出统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DumpStats {
    pub files_read: usize,
    pub records_tokenized: usize,
    pub records_failed: usize,
    pub tokens_written: usize,
}
