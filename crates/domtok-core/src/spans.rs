//! token 的字符类分段与 base64 概率估计
//!
//! 分段结果只用于分类与诊断（CLI `inspect`、判定日志），不参与切分状态。

/// 单个分段的字符类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Digits,
    LowerHex,
    UpperHex,
    MixedHex,
    LowerAlpha,
    UpperAlpha,
    Alphanumeric,
    Punctuation,
    /// 含 `+`、`/` 或填充 `=`
    Base64,
}

impl CharClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CharClass::Digits => "digits",
            CharClass::LowerHex => "lower_hex",
            CharClass::UpperHex => "upper_hex",
            CharClass::MixedHex => "mixed_hex",
            CharClass::LowerAlpha => "lower_alpha",
            CharClass::UpperAlpha => "upper_alpha",
            CharClass::Alphanumeric => "alphanumeric",
            CharClass::Punctuation => "punctuation",
            CharClass::Base64 => "base64",
        }
    }
}

/// token 中的一段（字节偏移，左闭右开）
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub limit: usize,
    pub class: CharClass,
    /// 该段为 base64 编码随机数据的估计概率
    pub probability: f64,
}

impl Span {
    pub fn len(&self) -> usize {
        self.limit - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.limit
    }

    pub fn text<'a>(&self, token: &'a str) -> &'a str {
        &token[self.start..self.limit]
    }
}

fn is_alphabet(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// 把 token 切成 base64 字母表字符（含尾随 `=`）与其他字符交替的最长段
pub fn segment(token: &str) -> Vec<Span> {
    let bytes = token.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    while start < bytes.len() {
        let mut limit = start;
        let class = if is_alphabet(bytes[start]) {
            while limit < bytes.len() && is_alphabet(bytes[limit]) {
                limit += 1;
            }
            while limit < bytes.len() && bytes[limit] == b'=' {
                limit += 1;
            }
            classify_run(&bytes[start..limit])
        } else {
            // 非 ASCII 字节不在字母表内，段边界总落在字符边界上
            while limit < bytes.len() && !is_alphabet(bytes[limit]) {
                limit += 1;
            }
            CharClass::Punctuation
        };
        spans.push(Span {
            start,
            limit,
            class,
            probability: base64_probability(&token[start..limit]),
        });
        start = limit;
    }
    spans
}

fn classify_run(run: &[u8]) -> CharClass {
    if run.iter().any(|b| matches!(b, b'+' | b'/' | b'=')) {
        return CharClass::Base64;
    }
    let has = |f: fn(&u8) -> bool| run.iter().any(f);
    let upper = has(u8::is_ascii_uppercase);
    let lower = has(u8::is_ascii_lowercase);
    if !upper && !lower {
        return CharClass::Digits;
    }
    if run.iter().all(u8::is_ascii_hexdigit) {
        return match (lower, upper) {
            (true, false) => CharClass::LowerHex,
            (false, true) => CharClass::UpperHex,
            _ => CharClass::MixedHex,
        };
    }
    let digits = has(u8::is_ascii_digit);
    match (lower, upper, digits) {
        (true, false, false) => CharClass::LowerAlpha,
        (false, true, false) => CharClass::UpperAlpha,
        _ => CharClass::Alphanumeric,
    }
}

/// 随机数据经 base64 编码后大写、小写、数字三类字符的期望占比
const EXPECTED: [f64; 3] = [26.0 / 62.0, 26.0 / 62.0, 10.0 / 62.0];

/// 1 减去三类字符占比与期望占比的最大偏差
/// - `+`、`/`、`=` 不计入
/// - 含其他字符或没有字母数字时为 0
pub fn base64_probability(run: &str) -> f64 {
    let mut bins = [0usize; 3];
    for b in run.bytes() {
        match b {
            b'A'..=b'Z' => bins[0] += 1,
            b'a'..=b'z' => bins[1] += 1,
            b'0'..=b'9' => bins[2] += 1,
            b'+' | b'/' | b'=' => {}
            _ => return 0.0,
        }
    }
    let total: usize = bins.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let deviation = bins
        .iter()
        .zip(EXPECTED)
        .map(|(&n, expected)| (n as f64 / total as f64 - expected).abs())
        .fold(0.0f64, f64::max);
    (1.0 - deviation).max(0.0)
}
