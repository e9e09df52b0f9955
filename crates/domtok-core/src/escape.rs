//! 转义解码：百分号编码、JavaScript 反斜杠转义、HTML 字符实体
//!
//! 解码按片段增量进行，而不是预先整体处理一遍：解码结果本身可能含有分隔符
//! 或新的转义起始符，需要回到切分循环里重新处理。畸形转义从不报错，
//! 起始字符退化为切分标记，其余字符按普通文本继续处理。
use memchr::memchr3;

use crate::splitter::Fragment;

/// 单个转义序列的解码结果
#[derive(Debug, PartialEq, Eq)]
enum Decoded {
    /// 直接拼入两侧文本（通常是单词的延续）
    Splice(String),
    /// 先插入切分标记，字面量单独成段
    Separate(char),
    /// 畸形或无法识别：起始符替换为切分标记
    Invalid,
}

/// 片段中是否含有转义起始符（`%`、`\`、`&`）
pub(crate) fn contains_escape(text: &str) -> bool {
    memchr3(b'%', b'\\', b'&', text.as_bytes()).is_some()
}

/// 从左到右解码片段中的全部转义；不含转义起始符时返回 None
pub(crate) fn decode_escapes(text: &str) -> Option<Vec<Fragment>> {
    if !contains_escape(text) {
        return None;
    }
    let bytes = text.as_bytes();

    let mut out = Vec::new();
    let mut cur = String::with_capacity(text.len());
    let mut i = 0usize;
    while let Some(off) = memchr3(b'%', b'\\', b'&', &bytes[i..]) {
        let at = i + off;
        cur.push_str(&text[i..at]);
        let rest = &text[at..];
        let (decoded, consumed) = match bytes[at] {
            b'%' => decode_percent(rest),
            b'\\' => decode_backslash(rest),
            _ => decode_entity(rest),
        };
        match decoded {
            Decoded::Splice(s) => cur.push_str(&s),
            Decoded::Separate(c) => {
                flush(&mut cur, &mut out);
                out.push(Fragment::Boundary);
                out.push(Fragment::Text(c.to_string()));
            }
            Decoded::Invalid => {
                flush(&mut cur, &mut out);
                out.push(Fragment::Boundary);
            }
        }
        i = at + consumed;
    }
    cur.push_str(&text[i..]);
    flush(&mut cur, &mut out);
    Some(out)
}

fn flush(cur: &mut String, out: &mut Vec<Fragment>) {
    if !cur.is_empty() {
        out.push(Fragment::Text(std::mem::take(cur)));
    }
}

/// 连续的 `%xx` 一次性解码；非 UTF-8 字节序列按 Latin-1 逐字节映射
fn decode_percent(s: &str) -> (Decoded, usize) {
    let b = s.as_bytes();
    let mut raw = Vec::new();
    let mut i = 0usize;
    while b.get(i) == Some(&b'%') {
        match hex_value(b.get(i + 1..i + 3)) {
            Some(v) => raw.push(v as u8),
            None => break,
        }
        i += 3;
    }
    if raw.is_empty() {
        return (Decoded::Invalid, 1);
    }
    let text = match String::from_utf8(raw) {
        Ok(t) => t,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    };
    (Decoded::Splice(text), i)
}

fn decode_backslash(s: &str) -> (Decoded, usize) {
    let b = s.as_bytes();
    let Some(&c) = b.get(1) else {
        return (Decoded::Invalid, 1);
    };
    match c {
        b'n' => (Decoded::Separate('\n'), 2),
        b't' => (Decoded::Separate('\t'), 2),
        b'r' => (Decoded::Separate('\r'), 2),
        b'b' => (Decoded::Separate('\u{8}'), 2),
        b'f' => (Decoded::Separate('\u{c}'), 2),
        b'v' => (Decoded::Separate('\u{b}'), 2),
        b'0' => (Decoded::Separate('\0'), 2),
        b'\\' => (Decoded::Separate('\\'), 2),
        b'"' => (Decoded::Separate('"'), 2),
        b'\'' => (Decoded::Splice("'".to_string()), 2),
        b'x' => match hex_value(b.get(2..4)) {
            Some(v) => (Decoded::Splice(char::from(v as u8).to_string()), 4),
            None => (Decoded::Invalid, 1),
        },
        b'u' => decode_unicode(b),
        _ => (Decoded::Invalid, 1),
    }
}

/// `\uHHHH`（含代理对）与 `\u{H..}`
fn decode_unicode(b: &[u8]) -> (Decoded, usize) {
    if b.get(2) == Some(&b'{') {
        let digits = b[3..].iter().take(7).take_while(|c| c.is_ascii_hexdigit()).count();
        if digits == 0 || digits > 6 || b.get(3 + digits) != Some(&b'}') {
            return (Decoded::Invalid, 1);
        }
        return match hex_value(b.get(3..3 + digits)).and_then(char::from_u32) {
            Some(c) => (Decoded::Splice(c.to_string()), 4 + digits),
            None => (Decoded::Invalid, 1),
        };
    }
    let Some(unit) = hex_value(b.get(2..6)) else {
        return (Decoded::Invalid, 1);
    };
    if (0xD800..0xDC00).contains(&unit) && b.get(6..8) == Some(b"\\u".as_slice()) {
        if let Some(low) = hex_value(b.get(8..12)).filter(|v| (0xDC00..0xE000).contains(v)) {
            let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            if let Some(c) = char::from_u32(combined) {
                return (Decoded::Splice(c.to_string()), 12);
            }
        }
    }
    match char::from_u32(unit) {
        Some(c) => (Decoded::Splice(c.to_string()), 6),
        None => (Decoded::Invalid, 1),
    }
}

/// `&name;`、`&#dec;`、`&#xhex;`；未终止或未知的实体退化为切分标记
fn decode_entity(s: &str) -> (Decoded, usize) {
    let b = s.as_bytes();
    if b.get(1) == Some(&b'#') {
        let (radix, start, max_digits) = match b.get(2) {
            Some(b'x') | Some(b'X') => (16, 3, 6),
            _ => (10, 2, 7),
        };
        let digits = b[start..]
            .iter()
            .take(max_digits + 1)
            .take_while(|c| if radix == 16 { c.is_ascii_hexdigit() } else { c.is_ascii_digit() })
            .count();
        if digits == 0 || digits > max_digits || b.get(start + digits) != Some(&b';') {
            return (Decoded::Invalid, 2);
        }
        let value = u32::from_str_radix(&s[start..start + digits], radix).ok();
        return match value.and_then(char::from_u32).filter(|c| *c != '\0') {
            Some(c) => (Decoded::Splice(c.to_string()), start + digits + 1),
            None => (Decoded::Invalid, 2),
        };
    }

    let name_len = b[1..].iter().take(33).take_while(|c| c.is_ascii_alphanumeric()).count();
    if name_len == 0 || name_len > 32 || !b[1].is_ascii_alphabetic() || b.get(1 + name_len) != Some(&b';') {
        return (Decoded::Invalid, 1);
    }
    match named_entity(&s[1..1 + name_len]) {
        Some(c) => (Decoded::Splice(c.to_string()), name_len + 2),
        None => (Decoded::Invalid, 1),
    }
}

/// 全部为十六进制数字时返回其数值（from_str_radix 会接受 `+` 前缀，这里先过滤）
fn hex_value(digits: Option<&[u8]>) -> Option<u32> {
    let digits = digits?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(text, 16).ok()
}

/// HTML 4 命名实体（Latin-1 全集与常用符号）
fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "apos" => '\'',
        "quot" => '\u{0022}', "amp" => '\u{0026}', "lt" => '\u{003c}', "gt" => '\u{003e}',
        "nbsp" => '\u{00a0}', "iexcl" => '\u{00a1}', "cent" => '\u{00a2}',
        "pound" => '\u{00a3}', "curren" => '\u{00a4}', "yen" => '\u{00a5}',
        "brvbar" => '\u{00a6}', "sect" => '\u{00a7}', "uml" => '\u{00a8}',
        "copy" => '\u{00a9}', "ordf" => '\u{00aa}', "laquo" => '\u{00ab}', "not" => '\u{00ac}',
        "shy" => '\u{00ad}', "reg" => '\u{00ae}', "macr" => '\u{00af}', "deg" => '\u{00b0}',
        "plusmn" => '\u{00b1}', "sup2" => '\u{00b2}', "sup3" => '\u{00b3}',
        "acute" => '\u{00b4}', "micro" => '\u{00b5}', "para" => '\u{00b6}',
        "middot" => '\u{00b7}', "cedil" => '\u{00b8}', "sup1" => '\u{00b9}',
        "ordm" => '\u{00ba}', "raquo" => '\u{00bb}', "frac14" => '\u{00bc}',
        "frac12" => '\u{00bd}', "frac34" => '\u{00be}', "iquest" => '\u{00bf}',
        "Agrave" => '\u{00c0}', "Aacute" => '\u{00c1}', "Acirc" => '\u{00c2}',
        "Atilde" => '\u{00c3}', "Auml" => '\u{00c4}', "Aring" => '\u{00c5}',
        "AElig" => '\u{00c6}', "Ccedil" => '\u{00c7}', "Egrave" => '\u{00c8}',
        "Eacute" => '\u{00c9}', "Ecirc" => '\u{00ca}', "Euml" => '\u{00cb}',
        "Igrave" => '\u{00cc}', "Iacute" => '\u{00cd}', "Icirc" => '\u{00ce}',
        "Iuml" => '\u{00cf}', "ETH" => '\u{00d0}', "Ntilde" => '\u{00d1}',
        "Ograve" => '\u{00d2}', "Oacute" => '\u{00d3}', "Ocirc" => '\u{00d4}',
        "Otilde" => '\u{00d5}', "Ouml" => '\u{00d6}', "times" => '\u{00d7}',
        "Oslash" => '\u{00d8}', "Ugrave" => '\u{00d9}', "Uacute" => '\u{00da}',
        "Ucirc" => '\u{00db}', "Uuml" => '\u{00dc}', "Yacute" => '\u{00dd}',
        "THORN" => '\u{00de}', "szlig" => '\u{00df}', "agrave" => '\u{00e0}',
        "aacute" => '\u{00e1}', "acirc" => '\u{00e2}', "atilde" => '\u{00e3}',
        "auml" => '\u{00e4}', "aring" => '\u{00e5}', "aelig" => '\u{00e6}',
        "ccedil" => '\u{00e7}', "egrave" => '\u{00e8}', "eacute" => '\u{00e9}',
        "ecirc" => '\u{00ea}', "euml" => '\u{00eb}', "igrave" => '\u{00ec}',
        "iacute" => '\u{00ed}', "icirc" => '\u{00ee}', "iuml" => '\u{00ef}',
        "eth" => '\u{00f0}', "ntilde" => '\u{00f1}', "ograve" => '\u{00f2}',
        "oacute" => '\u{00f3}', "ocirc" => '\u{00f4}', "otilde" => '\u{00f5}',
        "ouml" => '\u{00f6}', "divide" => '\u{00f7}', "oslash" => '\u{00f8}',
        "ugrave" => '\u{00f9}', "uacute" => '\u{00fa}', "ucirc" => '\u{00fb}',
        "uuml" => '\u{00fc}', "yacute" => '\u{00fd}', "thorn" => '\u{00fe}',
        "yuml" => '\u{00ff}', "OElig" => '\u{0152}', "oelig" => '\u{0153}',
        "Scaron" => '\u{0160}', "scaron" => '\u{0161}', "Yuml" => '\u{0178}',
        "fnof" => '\u{0192}', "circ" => '\u{02c6}', "tilde" => '\u{02dc}',
        "Omega" => '\u{03a9}', "alpha" => '\u{03b1}', "beta" => '\u{03b2}',
        "gamma" => '\u{03b3}', "delta" => '\u{03b4}', "mu" => '\u{03bc}', "pi" => '\u{03c0}',
        "sigma" => '\u{03c3}', "ensp" => '\u{2002}', "emsp" => '\u{2003}',
        "thinsp" => '\u{2009}', "zwnj" => '\u{200c}', "zwj" => '\u{200d}', "lrm" => '\u{200e}',
        "rlm" => '\u{200f}', "ndash" => '\u{2013}', "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}', "rsquo" => '\u{2019}', "sbquo" => '\u{201a}',
        "ldquo" => '\u{201c}', "rdquo" => '\u{201d}', "bdquo" => '\u{201e}',
        "dagger" => '\u{2020}', "Dagger" => '\u{2021}', "bull" => '\u{2022}',
        "hellip" => '\u{2026}', "permil" => '\u{2030}', "prime" => '\u{2032}',
        "Prime" => '\u{2033}', "lsaquo" => '\u{2039}', "rsaquo" => '\u{203a}',
        "oline" => '\u{203e}', "frasl" => '\u{2044}', "euro" => '\u{20ac}',
        "trade" => '\u{2122}', "larr" => '\u{2190}', "uarr" => '\u{2191}',
        "rarr" => '\u{2192}', "darr" => '\u{2193}', "harr" => '\u{2194}',
        "minus" => '\u{2212}', "lowast" => '\u{2217}', "infin" => '\u{221e}',
        "sim" => '\u{223c}', "ne" => '\u{2260}', "le" => '\u{2264}', "ge" => '\u{2265}',
        _ => return None,
    };
    Some(c)
}
