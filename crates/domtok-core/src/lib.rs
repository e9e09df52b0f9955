//! DOM 快照预切分库
//!
//! 设计要点：
//! - 字符串切分是一个就地改写的状态机：解码转义、按分隔符切开，并把真实的
//!   base64 载荷与碰巧落在 base64 字母表里的 URL 片段区分开。
//! - base64 载荷解码后嗅探格式（图片、字体、JSON、UTF-8 文本），输出
//!   `[BASE64]` 加子类型，而不是大量无意义的碎片。
//! - DOM 遍历只依赖“父节点在前”的表序约束，用显式栈闭合元素；同一快照内
//!   的字符串切分结果按下标缓存。
//! - 整条流水线单线程、无 I/O；批量导出在外层按文件并行，输出顺序可复现。

mod cache;
mod config;
mod dump;
mod error;
mod escape;
mod html;
mod options;
mod sniffer;
mod snapshot;
mod spans;
mod splitter;
mod tokens;
mod walker;

pub use cache::{SplitContext, TokenCache};
pub use config::{load_options, parse_options};
pub use dump::dump_and_write;
pub use error::{Result, TokenizeError};
pub use html::is_void_element;
pub use options::{DumpFormat, DumpOptions, DumpStats, SplitterOptions};
pub use sniffer::{FileType, Payload, Sniffed, Sniffer};
pub use snapshot::{parse as parse_snapshot, Document, Node, NodeTable, NodeType, Snapshot};
pub use spans::{base64_probability, segment, CharClass, Span};
pub use splitter::TextSplitter;
pub use tokens::*;
pub use walker::{DomSnapshotPreTokenizer, PreTokenize};
