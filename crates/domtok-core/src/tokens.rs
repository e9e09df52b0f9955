//! 结构标记词表与 token 缓冲区
//!
//! 下游词表训练依赖这些字面量，修改即破坏兼容。

pub const TAG_OPEN: &str = "<";
pub const END_TAG_OPEN: &str = "</";
pub const TAG_CLOSE: &str = ">";
pub const ATTR_SEPARATOR: &str = "_";
pub const ATTR_EQUALS: &str = "=";
pub const COMMENT_OPEN: &str = "<!--";
pub const COMMENT_CLOSE: &str = "-->";
pub const DOCTYPE_OPEN: &str = "<!DOCTYPE";
pub const DOCTYPE_PUBLIC: &str = "PUBLIC";

/// 只追加的 token 序列，每次预切分调用新建一个，归调用方所有
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenBuffer {
    tokens: Vec<String>,
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}
