//! 单个快照内的切分结果缓存
//!
//! 快照里的字符串大量重复（属性名、类名），同一 (下标, 上下文) 只切分一次。
//! 缓存只在一次快照处理期间存在。
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::{Result, TokenizeError};
use crate::splitter::TextSplitter;

const NO_TOKENS: &[String] = &[];

/// 切分前对字符串做的变换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitContext {
    /// 原样切分（属性名、属性值、文本）
    Verbatim,
    /// 先转小写（标签名）
    Lowercase,
}

pub struct TokenCache<'a> {
    strings: &'a [String],
    splitter: &'a TextSplitter,
    entries: HashMap<(usize, SplitContext), Vec<String>>,
}

impl<'a> TokenCache<'a> {
    pub fn new(strings: &'a [String], splitter: &'a TextSplitter) -> Self {
        Self { strings, splitter, entries: HashMap::new() }
    }

    /// 字符串表第 `index` 项的 token；-1 返回空
    pub fn get(&mut self, index: i64, context: SplitContext) -> Result<&[String]> {
        if index < 0 {
            return Ok(NO_TOKENS);
        }
        let slot = self.slot(index)?;
        match self.entries.entry((slot, context)) {
            Entry::Occupied(e) => Ok(e.into_mut().as_slice()),
            Entry::Vacant(e) => {
                let text = &self.strings[slot];
                let tokens = match context {
                    SplitContext::Verbatim => self.splitter.split(text)?,
                    SplitContext::Lowercase => self.splitter.split(&text.to_lowercase())?,
                };
                Ok(e.insert(tokens).as_slice())
            }
        }
    }

    /// 字符串表原文；-1 返回空串
    pub fn string(&self, index: i64) -> Result<&'a str> {
        if index < 0 {
            return Ok("");
        }
        let strings: &'a [String] = self.strings;
        Ok(strings[self.slot(index)?].as_str())
    }

    /// 已缓存的 (下标, 上下文) 数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&self, index: i64) -> Result<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.strings.len())
            .ok_or_else(|| {
                TokenizeError::MalformedSnapshot(format!(
                    "string index {index} out of range ({} strings)",
                    self.strings.len()
                ))
            })
    }
}
