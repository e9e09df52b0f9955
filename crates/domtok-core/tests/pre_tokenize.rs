use domtok_core::{
    parse_snapshot, DomSnapshotPreTokenizer, PreTokenize, SplitContext, SplitterOptions, TextSplitter,
    TokenBuffer, TokenCache, TokenizeError,
};
use serde_json::{json, Value};

const SVG_PAYLOAD: &str = "PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHdpZHRoPSIxNiIgaGVpZ2h0PSIxNiI+PC9zdmc+";
const PNG_PAYLOAD: &str = "iVBORw0KGgoAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYn";

fn pre_tokenizer() -> DomSnapshotPreTokenizer {
    DomSnapshotPreTokenizer::new(SplitterOptions::default()).unwrap()
}

/// 文档 + 单个元素（带属性）+ 可选文本子节点
fn element(tag: &str, attrs: &[(&str, &str)], text: Option<&str>) -> Value {
    let mut strings = vec!["#document".to_string(), tag.to_string()];
    let mut attr_indexes = Vec::new();
    for (name, value) in attrs {
        attr_indexes.push(strings.len());
        strings.push(name.to_string());
        attr_indexes.push(strings.len());
        strings.push(value.to_string());
    }
    let mut parent = vec![-1, 0];
    let mut kinds = vec![9, 1];
    let mut names = vec![0i64, 1];
    let mut values = vec![-1i64, -1];
    let mut attributes = vec![json!([]), json!(attr_indexes)];
    if let Some(text) = text {
        parent.push(1);
        kinds.push(3);
        names.push(-1);
        values.push(strings.len() as i64);
        strings.push(text.to_string());
        attributes.push(json!([]));
    }
    json!({
        "documents": [{"nodes": {
            "parentIndex": parent,
            "nodeType": kinds,
            "nodeName": names,
            "nodeValue": values,
            "attributes": attributes
        }}],
        "strings": strings
    })
}

#[test]
fn inline_svg_image_end_to_end() {
    let src = format!("data:image/svg+xml;base64,{SVG_PAYLOAD}");
    let snap = element("IMG", &[("src", src.as_str()), ("width", "256")], None);
    let tokens = pre_tokenizer().pre_tokenize(&snap.to_string()).unwrap();
    assert_eq!(
        tokens,
        vec![
            "<", "img", "_", "src", "=", "data", "image", "svg", "xml", "base64", "[BASE64]", "svg",
            "_", "width", "=", "256", ">"
        ]
    );
}

#[test]
fn png_in_inline_style_classifies_by_signature() {
    let style = format!("background: url(data:image/png;base64,{PNG_PAYLOAD}) no-repeat");
    let snap = element("DIV", &[("style", style.as_str())], Some("Hi"));
    let tokens = pre_tokenizer().pre_tokenize(&snap.to_string()).unwrap();
    assert_eq!(
        tokens,
        vec![
            "<", "div", "_", "style", "=", "background", "url", "data", "image", "png", "base64",
            "[BASE64]", "png", "no", "repeat", ">", "Hi", "</", "div", ">"
        ]
    );
}

#[test]
fn query_string_near_url_words_is_not_base64() {
    let href = "http://www1.com.com/?tm=1&subid4=1714127069.0292280000&KW1=News%20Media%20Monitoring%20Tools";
    let snap = element("A", &[("href", href)], None);
    let tokens = pre_tokenizer().pre_tokenize(&snap.to_string()).unwrap();
    assert!(!tokens.iter().any(|t| t == "[BASE64]"), "{tokens:?}");
    assert!(tokens.windows(4).any(|w| w == ["KW1", "News", "Media", "Monitoring"]));
}

#[test]
fn deeply_escaped_text_node_decodes() {
    let text = format!("a&{}lt;b", "amp;".repeat(100));
    let snap = element("P", &[], Some(text.as_str()));
    let tokens = pre_tokenizer().pre_tokenize(&snap.to_string()).unwrap();
    assert_eq!(tokens, vec!["<", "p", ">", "a", "b", "</", "p", ">"]);
}

#[test]
fn pre_tokenize_dom_appends_to_caller_buffer() {
    let pre = pre_tokenizer();
    let mut buf = TokenBuffer::new();
    buf.append("[START]");
    let snap = element("P", &[], Some("one two"));
    pre.pre_tokenize_dom(&mut buf, &snap.to_string()).unwrap();
    assert_eq!(buf.tokens(), ["[START]", "<", "p", ">", "one", "two", "</", "p", ">"]);
}

#[test]
fn repeated_calls_are_deterministic() {
    let pre = pre_tokenizer();
    let snap = element("SPAN", &[("class", "btn btn_primary"), ("title", "Caf\u{e9} &amp; cr\u{e8}me")], Some("x"))
        .to_string();
    assert_eq!(pre.pre_tokenize(&snap).unwrap(), pre.pre_tokenize(&snap).unwrap());
}

#[test]
fn cache_hits_equal_fresh_splits() {
    let snap = parse_snapshot(&element("DIV", &[("data-id", "0xdeadbeef")], None).to_string()).unwrap();
    let splitter = TextSplitter::new(SplitterOptions::default()).unwrap();
    let mut cache = TokenCache::new(&snap.strings, &splitter);
    for index in 0..snap.strings.len() as i64 {
        let fresh = splitter.split(&snap.strings[index as usize]).unwrap();
        assert_eq!(cache.get(index, SplitContext::Verbatim).unwrap(), fresh.as_slice());
        assert_eq!(cache.get(index, SplitContext::Verbatim).unwrap(), fresh.as_slice());
    }
}

#[test]
fn malformed_inputs_fail() {
    let pre = pre_tokenizer();
    assert!(matches!(pre.pre_tokenize("{\"id\": 1}").unwrap_err(), TokenizeError::MalformedSnapshot(_)));
    assert!(matches!(pre.pre_tokenize("not json").unwrap_err(), TokenizeError::Json(_)));
    let bad_index = json!({
        "documents": [{"nodes": {"parentIndex": [-1], "nodeType": [3], "nodeName": [-1], "nodeValue": [42]}}],
        "strings": []
    });
    assert!(matches!(
        pre.pre_tokenize(&bad_index.to_string()).unwrap_err(),
        TokenizeError::MalformedSnapshot(_)
    ));
}
