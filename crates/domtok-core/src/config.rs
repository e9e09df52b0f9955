//! 配置文件加载（TOML）
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::options::SplitterOptions;

/// 顶层配置文件结构
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    splitter: SplitterOptions,
}

/// 从 TOML 文本解析切分器参数；缺失的键保持默认值
pub fn parse_options(txt: &str) -> Result<SplitterOptions> {
    let parsed: ConfigFile = toml::from_str(txt)?;
    Ok(parsed.splitter)
}

/// 从 TOML 配置文件加载切分器参数
pub fn load_options(path: &Path) -> Result<SplitterOptions> {
    let txt = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse_options(&txt).with_context(|| format!("parse config {}", path.display()))
}
