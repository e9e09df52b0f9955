//! HTML 空元素表（没有子节点，也没有结束标签）

/// <https://html.spec.whatwg.org/multipage/syntax.html#void-elements>
const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// 标签名是否为空元素（大小写不敏感）
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}
