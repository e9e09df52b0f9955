//! DOM 快照的反序列化模型
//!
//! 快照为浏览器 DOMSnapshot 的 JSON 形式：`documents` 中每个文档持有一组
//! 按节点序号索引的并行数组，所有字符串通过下标引用共享的 `strings` 表，
//! -1 表示缺失。也接受外层包了一层 `{"result": ...}` 的原始响应。
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, TokenizeError};

/// 字符串表中“缺失”的下标
pub const ABSENT: i64 = -1;

fn absent() -> i64 {
    ABSENT
}

#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub documents: Vec<Document>,
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub nodes: NodeTable,
    #[serde(default = "absent")]
    pub public_id: i64,
    #[serde(default = "absent")]
    pub system_id: i64,
}

/// 节点表（并行数组）；缺失的列按 -1 / 空属性处理
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTable {
    #[serde(default)]
    pub parent_index: Vec<i64>,
    #[serde(default)]
    pub node_type: Vec<u32>,
    #[serde(default)]
    pub node_name: Vec<i64>,
    #[serde(default)]
    pub node_value: Vec<i64>,
    #[serde(default)]
    pub attributes: Vec<Vec<i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    CData,
    ProcessingInstruction,
    Comment,
    Document,
    DocumentType,
    DocumentFragment,
    Other(u32),
}

impl From<u32> for NodeType {
    fn from(v: u32) -> Self {
        match v {
            1 => NodeType::Element,
            3 => NodeType::Text,
            4 => NodeType::CData,
            7 => NodeType::ProcessingInstruction,
            8 => NodeType::Comment,
            9 => NodeType::Document,
            10 => NodeType::DocumentType,
            11 => NodeType::DocumentFragment,
            other => NodeType::Other(other),
        }
    }
}

/// 节点表中的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node<'a> {
    pub index: i64,
    pub parent_index: i64,
    pub node_type: NodeType,
    pub name_index: i64,
    pub value_index: i64,
    /// 名/值下标交替
    pub attributes: &'a [i64],
}

impl<'a> Node<'a> {
    /// 属性 (名, 值) 下标对；奇数长度时丢弃末尾悬空的名字
    pub fn attribute_pairs(&self) -> impl Iterator<Item = (i64, i64)> + 'a {
        let attributes: &'a [i64] = self.attributes;
        attributes.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }
}

impl NodeTable {
    /// 按表序遍历节点（表序即先序：父节点总在后代之前）
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        self.node_type.iter().enumerate().map(move |(i, &ty)| Node {
            index: i as i64,
            parent_index: self.parent_index.get(i).copied().unwrap_or(ABSENT),
            node_type: NodeType::from(ty),
            name_index: self.node_name.get(i).copied().unwrap_or(ABSENT),
            value_index: self.node_value.get(i).copied().unwrap_or(ABSENT),
            attributes: self.attributes.get(i).map(Vec::as_slice).unwrap_or(&[]),
        })
    }
}

/// 从 JSON 文本解析快照
pub fn parse(serialized: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_str(serialized)?;
    from_value(value)
}

/// 从已解析的 JSON 值构造快照；既无 `documents` 也无 `strings` 时展开 `result`
pub fn from_value(mut value: Value) -> Result<Snapshot> {
    let unwrap = match &value {
        Value::Object(map) => {
            !map.contains_key("documents") && !map.contains_key("strings") && map.contains_key("result")
        }
        other => {
            return Err(TokenizeError::MalformedSnapshot(format!(
                "expected a JSON object, found {}",
                json_kind(other)
            )))
        }
    };
    if unwrap {
        value = value["result"].take();
    }
    serde_json::from_value(value).map_err(|e| TokenizeError::MalformedSnapshot(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_snapshot_parses_with_defaults() {
        let snap = from_value(json!({
            "documents": [{"nodes": {"parentIndex": [-1, 0], "nodeType": [9, 1], "nodeName": [0, 1]}}],
            "strings": ["#document", "HTML"]
        }))
        .unwrap();
        let doc = &snap.documents[0];
        assert_eq!(doc.public_id, ABSENT);
        assert_eq!(doc.system_id, ABSENT);
        let nodes: Vec<Node> = doc.nodes.iter().collect();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].node_type, NodeType::Element);
        assert_eq!(nodes[1].parent_index, 0);
        assert_eq!(nodes[1].value_index, ABSENT);
        assert!(nodes[1].attributes.is_empty());
    }

    #[test]
    fn result_envelope_is_unwrapped() {
        let snap = parse(r#"{"id": 7, "result": {"documents": [], "strings": ["x"]}}"#).unwrap();
        assert!(snap.documents.is_empty());
        assert_eq!(snap.strings, vec!["x"]);
    }

    #[test]
    fn missing_keys_are_malformed() {
        let err = parse(r#"{"id": 7, "error": "boom"}"#).unwrap_err();
        assert!(matches!(err, TokenizeError::MalformedSnapshot(_)));
        let err = parse("[1, 2]").unwrap_err();
        assert!(matches!(err, TokenizeError::MalformedSnapshot(_)));
    }

    #[test]
    fn invalid_json_is_reported_as_json_error() {
        assert!(matches!(parse("{nope").unwrap_err(), TokenizeError::Json(_)));
    }

    #[test]
    fn odd_attribute_array_drops_dangling_name() {
        let node = Node {
            index: 0,
            parent_index: ABSENT,
            node_type: NodeType::Element,
            name_index: 0,
            value_index: ABSENT,
            attributes: &[1, 2, 3],
        };
        assert_eq!(node.attribute_pairs().collect::<Vec<_>>(), vec![(1, 2)]);
    }

    #[test]
    fn unknown_node_types_are_preserved() {
        assert_eq!(NodeType::from(12), NodeType::Other(12));
        assert_eq!(NodeType::from(11), NodeType::DocumentFragment);
    }
}
