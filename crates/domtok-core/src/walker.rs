//! DOM 快照遍历：结构标记与切分结果交错输出
//!
//! 节点按表序（先序）遍历，用显式栈记录当前打开的祖先。处理一个节点前，
//! 弹出并关闭所有序号不等于其 `parent_index` 的栈顶元素，于是只依赖
//! “父节点在前”这一约束就能正确闭合嵌套元素，不需要预先知道子树范围。
use tracing::trace;

use crate::cache::{SplitContext, TokenCache};
use crate::error::{Result, TokenizeError};
use crate::html::is_void_element;
use crate::options::SplitterOptions;
use crate::snapshot::{self, Document, NodeType, Snapshot, ABSENT};
use crate::splitter::TextSplitter;
use crate::tokens::*;

/// 预切分能力接口：宿主分词器通过它拿到 token 序列与需要注册的特殊 token
pub trait PreTokenize {
    /// 把一个序列化输入切成 token 序列
    fn pre_tokenize(&self, serialized: &str) -> Result<Vec<String>>;

    /// 需要作为原子 token 注册的特殊 token
    fn special_tokens(&self) -> Vec<String>;
}

/// 栈帧：哨兵、透明的文档帧、打开的元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Sentinel,
    Document { index: i64 },
    Element { index: i64, name_index: i64 },
}

impl Frame {
    fn index(&self) -> i64 {
        match *self {
            Frame::Sentinel => ABSENT,
            Frame::Document { index } | Frame::Element { index, .. } => index,
        }
    }
}

/// 消费 JSON 序列化 DOM 快照的预切分器
pub struct DomSnapshotPreTokenizer {
    splitter: TextSplitter,
}

impl DomSnapshotPreTokenizer {
    pub fn new(opts: SplitterOptions) -> Result<Self> {
        Ok(Self { splitter: TextSplitter::new(opts)? })
    }

    /// 把序列化快照转换为 token 序列并追加到 `buf`
    /// - 出错后 `buf` 中已有的内容不保证完整
    pub fn pre_tokenize_dom(&self, buf: &mut TokenBuffer, serialized: &str) -> Result<()> {
        let snapshot = snapshot::parse(serialized)?;
        self.walk(buf, &snapshot)
    }

    /// 遍历已解析的快照；每次调用使用独立的缓存
    pub fn walk(&self, buf: &mut TokenBuffer, snapshot: &Snapshot) -> Result<()> {
        let mut tokens = TokenCache::new(&snapshot.strings, &self.splitter);
        for (doc_no, document) in snapshot.documents.iter().enumerate() {
            self.walk_document(buf, &mut tokens, doc_no, document)?;
        }
        trace!(documents = snapshot.documents.len(), cached = tokens.len(), "snapshot walked");
        Ok(())
    }

    fn walk_document(
        &self,
        buf: &mut TokenBuffer,
        tokens: &mut TokenCache<'_>,
        doc_no: usize,
        document: &Document,
    ) -> Result<()> {
        let mut stack = vec![Frame::Sentinel];
        for node in document.nodes.iter() {
            while stack.last().map(Frame::index) != Some(node.parent_index) {
                match stack.pop() {
                    Some(Frame::Sentinel) | None => {
                        return Err(TokenizeError::MalformedSnapshot(format!(
                            "document {doc_no}: node {} has parent {} which is not an open ancestor",
                            node.index, node.parent_index
                        )))
                    }
                    Some(frame) => terminate(buf, tokens, frame)?,
                }
            }

            match node.node_type {
                NodeType::Element => {
                    buf.append(TAG_OPEN);
                    buf.extend(tokens.get(node.name_index, SplitContext::Lowercase)?);
                    for (name, value) in node.attribute_pairs() {
                        buf.append(ATTR_SEPARATOR);
                        buf.extend(tokens.get(name, SplitContext::Verbatim)?);
                        buf.append(ATTR_EQUALS);
                        buf.extend(tokens.get(value, SplitContext::Verbatim)?);
                    }
                    buf.append(TAG_CLOSE);
                    stack.push(Frame::Element { index: node.index, name_index: node.name_index });
                }
                NodeType::Text | NodeType::CData => {
                    buf.extend(tokens.get(node.value_index, SplitContext::Verbatim)?);
                }
                NodeType::Document | NodeType::DocumentFragment => {
                    stack.push(Frame::Document { index: node.index });
                }
                NodeType::Comment => {
                    buf.append(COMMENT_OPEN);
                    buf.extend(tokens.get(node.value_index, SplitContext::Verbatim)?);
                    buf.append(COMMENT_CLOSE);
                }
                NodeType::DocumentType => {
                    buf.append(DOCTYPE_OPEN);
                    buf.extend(tokens.get(node.name_index, SplitContext::Verbatim)?);
                    if document.public_id >= 0 {
                        buf.append(DOCTYPE_PUBLIC);
                        buf.extend(tokens.get(document.public_id, SplitContext::Verbatim)?);
                    }
                    if document.system_id >= 0 {
                        buf.extend(tokens.get(document.system_id, SplitContext::Verbatim)?);
                    }
                    buf.append(TAG_CLOSE);
                }
                NodeType::ProcessingInstruction | NodeType::Other(_) => {
                    trace!(node = node.index, kind = ?node.node_type, "skip node");
                }
            }
        }

        while let Some(frame) = stack.pop() {
            terminate(buf, tokens, frame)?;
        }
        Ok(())
    }
}

/// 关闭一个栈帧：只有非空元素输出结束标签
fn terminate(buf: &mut TokenBuffer, tokens: &mut TokenCache<'_>, frame: Frame) -> Result<()> {
    let Frame::Element { name_index, .. } = frame else {
        return Ok(());
    };
    if is_void_element(tokens.string(name_index)?) {
        return Ok(());
    }
    buf.append(END_TAG_OPEN);
    buf.extend(tokens.get(name_index, SplitContext::Lowercase)?);
    buf.append(TAG_CLOSE);
    Ok(())
}

impl PreTokenize for DomSnapshotPreTokenizer {
    fn pre_tokenize(&self, serialized: &str) -> Result<Vec<String>> {
        let mut buf = TokenBuffer::new();
        self.pre_tokenize_dom(&mut buf, serialized)?;
        Ok(buf.into_tokens())
    }

    fn special_tokens(&self) -> Vec<String> {
        self.splitter.special_tokens()
    }
}
