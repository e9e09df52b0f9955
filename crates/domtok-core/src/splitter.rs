//! 字符串切分器（核心状态机）
//!
//! 工作集是一个 `Fragment` 列表加一个游标：列表初始只有整段输入，之后在游标处
//! 就地改写。每轮检查游标处的片段，按固定优先级应用第一条命中的规则：
//!
//! 1. 空白 → 切分标记
//! 2-4. 含 `%`、`\`、`&` → 整段解码转义后重新检查
//! 5. 含 `_` → 按下划线切开
//! 6. `0x` 十六进制字面量 → 前缀与主体
//! 7. base64 形状 → 判定（URL 片段 / 误报 / 真实载荷）
//! 8. 干净单词 → 非 ASCII 先音译，否则接受
//! 9. 按非单词字符切开（保留 base64 字符与撇号）
//! 10. 无单词字符 → 切分标记
//! 11. 抽取单词
//!
//! 游标之前的文本片段即最终 token。
use deunicode::deunicode;
use regex::{Match, Regex};
use tracing::{debug, trace};

use crate::error::{Result, TokenizeError};
use crate::escape;
use crate::options::SplitterOptions;
use crate::sniffer::{Payload, Sniffed, Sniffer};
use crate::spans::base64_probability;

/// 工作集元素：文本片段，或“此处断开、不输出任何内容”的切分标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fragment {
    Text(String),
    Boundary,
}

/// base64 候选的判定结果
enum Verdict {
    /// 真实载荷：`[BASE64]` 加限定词
    Payload(Vec<String>),
    /// URL 片段或误报：按 `+/=` 切出的普通单词
    Words(Vec<String>),
}

/// 活性检查：游标位置与工作集在一步之后都没变化，记为一次停滞
struct Liveness {
    limit: usize,
    stalled: usize,
    last: Option<(usize, usize, Option<Fragment>)>,
}

impl Liveness {
    fn new(limit: usize) -> Self {
        Self { limit, stalled: 0, last: None }
    }

    /// 连续停滞达到上限时返回 false；就地改写片段内容也算前进
    fn observe(&mut self, cursor: usize, splits: &[Fragment]) -> bool {
        let state = (cursor, splits.len(), splits.get(cursor).cloned());
        if self.last.as_ref() == Some(&state) {
            self.stalled += 1;
            return self.stalled < self.limit;
        }
        self.stalled = 0;
        self.last = Some(state);
        true
    }
}

/// URL 常见词汇（小写比较）；另外以 `cdn` 结尾的词也算
const URL_WORDS: &[&str] = &["http", "https", "www", "css", "url", "static", "src", "href"];

pub struct TextSplitter {
    opts: SplitterOptions,
    sniffer: Sniffer,
    hex_literal: Regex,
    base64: Regex,
    clean_word: Regex,
    keep_runs: Regex,
    words: Regex,
    folded_hex: Regex,
}

impl TextSplitter {
    pub fn new(opts: SplitterOptions) -> Result<Self> {
        let groups = opts.min_base64_len.div_ceil(4).max(1);
        let base64 = Regex::new(&format!(
            r"(?:[A-Za-z0-9+/]{{4}}){{{groups},}}(?:[A-Za-z0-9+/]{{3}}=|[A-Za-z0-9+/]{{2}}==)?"
        ))?;
        let folded_hex = Regex::new(&format!(r"^[0-9a-fA-F]{{{},}}$", opts.min_hex_len))?;
        Ok(Self {
            sniffer: Sniffer::new(&opts)?,
            hex_literal: Regex::new(r"^(0[xX])([0-9a-fA-F]+)[+/=]*$")?,
            base64,
            clean_word: Regex::new(r"^[^\W_]+(?:['’][^\W_]+)*['’]?$")?,
            keep_runs: Regex::new(r"[+/='’[^\W_]]+")?,
            words: Regex::new(r"[^\W_]+(?:['’][^\W_]+)*")?,
            folded_hex,
            opts,
        })
    }

    /// 需要作为原子 token 注册到词表的特殊 token
    pub fn special_tokens(&self) -> Vec<String> {
        vec![self.opts.base64_token.clone(), self.opts.long_token.clone()]
    }

    /// 把一个原始字符串切成 token 序列
    pub fn split(&self, text: &str) -> Result<Vec<String>> {
        let mut splits = vec![Fragment::Text(text.to_string())];
        let mut cursor = 0usize;
        let mut liveness = Liveness::new(self.opts.max_stalled_iterations);
        liveness.observe(cursor, &splits);
        while cursor < splits.len() {
            cursor = self.step(&mut splits, cursor)?;
            if !liveness.observe(cursor, &splits) {
                return Err(TokenizeError::RunawayRewrite {
                    text: text.to_string(),
                    cursor,
                    len: splits.len(),
                });
            }
        }
        Ok(self.postprocess(splits))
    }

    /// 对游标处的片段应用第一条命中的规则，返回新的游标位置
    fn step(&self, splits: &mut Vec<Fragment>, cursor: usize) -> Result<usize> {
        let text = match &splits[cursor] {
            Fragment::Boundary => return Ok(cursor + 1),
            Fragment::Text(text) => text.clone(),
        };

        if text.trim().is_empty() {
            splits[cursor] = Fragment::Boundary;
            return Ok(cursor + 1);
        }

        if let Some(decoded) = escape::decode_escapes(&text) {
            trace!(fragment = %text, "decode escapes");
            splits.splice(cursor..=cursor, decoded);
            return Ok(cursor);
        }

        if text.contains('_') {
            let mut pieces = Vec::new();
            for (i, piece) in text.split('_').enumerate() {
                if i > 0 {
                    pieces.push(Fragment::Boundary);
                }
                if !piece.is_empty() {
                    pieces.push(Fragment::Text(piece.to_string()));
                }
            }
            splits.splice(cursor..=cursor, pieces);
            return Ok(cursor);
        }

        if let Some(caps) = self.hex_literal.captures(&text) {
            let accepted = [
                Fragment::Text(caps[1].to_string()),
                Fragment::Text(caps[2].to_string()),
                Fragment::Boundary,
            ];
            splits.splice(cursor..=cursor, accepted);
            return Ok(cursor + 3);
        }

        if let Some(m) = self.base64.find(&text) {
            return self.enter_base64(splits, cursor, &text, m);
        }

        if self.clean_word.is_match(&text) {
            if text.is_ascii() {
                return Ok(cursor + 1);
            }
            trace!(word = %text, "transliterate");
            splits[cursor] = Fragment::Text(deunicode(&text));
            return Ok(cursor);
        }

        let runs: Vec<Match> = self.keep_runs.find_iter(&text).collect();
        let single_run = matches!(runs.as_slice(), [m] if m.start() == 0 && m.end() == text.len());
        if !runs.is_empty() && !single_run {
            let mut pieces = Vec::with_capacity(runs.len() * 2 + 1);
            let mut last = 0usize;
            for m in runs {
                if m.start() > last {
                    pieces.push(Fragment::Boundary);
                }
                pieces.push(Fragment::Text(m.as_str().to_string()));
                last = m.end();
            }
            if last < text.len() {
                pieces.push(Fragment::Boundary);
            }
            splits.splice(cursor..=cursor, pieces);
            return Ok(cursor);
        }

        if !self.words.is_match(&text) {
            splits[cursor] = Fragment::Boundary;
            return Ok(cursor + 1);
        }

        let mut pieces: Vec<Fragment> = self
            .words
            .find_iter(&text)
            .map(|m| Fragment::Text(m.as_str().to_string()))
            .collect();
        pieces.push(Fragment::Boundary);
        splits.splice(cursor..=cursor, pieces);
        Ok(cursor)
    }

    /// 规则 7：片段中找到 base64 形状的子串
    /// - 子串前的文本先切出去单独处理
    /// - 子串位于开头时判定，结果直接作为最终 token 接受，剩余部分留作下一个片段
    /// - 退回普通单词时，4 字符分组截断的单词尾部从剩余部分并回
    fn enter_base64(
        &self,
        splits: &mut Vec<Fragment>,
        cursor: usize,
        text: &str,
        m: Match,
    ) -> Result<usize> {
        if m.start() > 0 {
            let (head, tail) = text.split_at(m.start());
            splits.splice(
                cursor..=cursor,
                [Fragment::Text(head.to_string()), Fragment::Text(tail.to_string())],
            );
            return Ok(cursor);
        }

        let encoded = m.as_str();
        let mut rest = &text[m.end()..];
        let tokens = match self.adjudicate(encoded, &splits[..cursor])? {
            Verdict::Payload(tokens) => tokens,
            Verdict::Words(mut words) => {
                let tail = rest.bytes().take_while(u8::is_ascii_alphanumeric).count();
                let cut_inside = encoded.ends_with(|c: char| c.is_ascii_alphanumeric());
                if let Some(last) = words.last_mut().filter(|_| cut_inside && tail > 0) {
                    last.push_str(&rest[..tail]);
                    rest = &rest[tail..];
                }
                words
            }
        };
        let accepted = tokens.len();
        let mut replacement: Vec<Fragment> = tokens.into_iter().map(Fragment::Text).collect();
        replacement.push(Fragment::Boundary);
        if !rest.is_empty() {
            replacement.push(Fragment::Text(rest.to_string()));
        }
        splits.splice(cursor..=cursor, replacement);
        Ok(cursor + accepted + 1)
    }

    fn adjudicate(&self, encoded: &str, emitted: &[Fragment]) -> Result<Verdict> {
        let probability = base64_probability(encoded);
        if let Some(kind) = self.sniffer.sniff_prefix(encoded)? {
            debug!(encoded, kind = kind.token(), "base64 signature");
            return Ok(Verdict::Payload(self.base64_tokens(Payload::File(kind))));
        }
        if self.is_urlish(encoded, emitted) {
            debug!(encoded, probability, "urlish, not base64");
            return Ok(Verdict::Words(split_base64_punctuation(encoded)));
        }
        match self.sniffer.classify_content(encoded)? {
            Sniffed::Base64(payload) => {
                debug!(encoded, probability, ?payload, "base64 payload");
                Ok(Verdict::Payload(self.base64_tokens(payload)))
            }
            Sniffed::FalseBase64 => {
                debug!(encoded, probability, "false base64");
                Ok(Verdict::Words(split_base64_punctuation(encoded)))
            }
        }
    }

    fn base64_tokens(&self, payload: Payload) -> Vec<String> {
        let mut tokens = vec![self.opts.base64_token.clone()];
        tokens.extend(payload.qualifiers().into_iter().map(str::to_string));
        tokens
    }

    /// URL 路径片段误报检测
    fn is_urlish(&self, encoded: &str, emitted: &[Fragment]) -> bool {
        if encoded.len() > self.opts.longest_urlish
            || encoded.ends_with('=')
            || encoded.contains('+')
        {
            return false;
        }
        if encoded.contains("//") {
            return true;
        }
        let preceding = emitted
            .iter()
            .rev()
            .filter_map(|f| match f {
                Fragment::Text(t) => Some(t.as_str()),
                Fragment::Boundary => None,
            })
            .take(self.opts.urlish_lookback);
        let hits = encoded
            .split('/')
            .chain(preceding)
            .filter(|w| is_url_word(w))
            .count();
        hits >= self.opts.urlish_threshold
    }

    fn postprocess(&self, splits: Vec<Fragment>) -> Vec<String> {
        let mut out = Vec::with_capacity(splits.len());
        for frag in splits {
            let Fragment::Text(mut token) = frag else {
                continue;
            };
            if token == self.opts.base64_token || token == self.opts.long_token {
                out.push(token);
                continue;
            }
            if token.ends_with(|c: char| c == '\'' || c == '’') {
                token.pop();
            }
            if token.is_empty() {
                continue;
            }
            if self.folded_hex.is_match(&token) {
                out.push(self.opts.long_token.clone());
                if !token.bytes().all(|b| b.is_ascii_digit()) {
                    out.push("hex".to_string());
                }
                out.push("digits".to_string());
                continue;
            }
            if token.chars().count() > self.opts.max_word_len {
                out.push(self.opts.long_token.clone());
                let kind = if token.chars().any(|c| c.is_ascii_digit()) {
                    "alphanumeric"
                } else {
                    "alphabetic"
                };
                out.push(kind.to_string());
                continue;
            }
            out.push(token);
        }
        out
    }
}

fn is_url_word(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    URL_WORDS.contains(&lower.as_str()) || lower.ends_with("cdn")
}

fn split_base64_punctuation(encoded: &str) -> Vec<String> {
    encoded
        .split(|c: char| matches!(c, '+' | '/' | '='))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<String> {
        TextSplitter::new(SplitterOptions::default())
            .unwrap()
            .split(text)
            .unwrap()
    }

    #[test]
    fn curly_apostrophe_is_transliterated_and_trailing_dot_dropped() {
        assert_eq!(split("That\u{2019}s all we know."), vec!["That's", "all", "we", "know"]);
    }

    #[test]
    fn bare_ampersand_and_control_whitespace_split() {
        assert_eq!(
            split("Page=Login&Action=Login';\n\t\t\treturn"),
            vec!["Page", "Login", "Action", "Login", "return"]
        );
    }

    #[test]
    fn url_path_with_static_css_is_not_base64() {
        assert_eq!(
            split("/_next/static/css/99762953f4d03581.css"),
            vec!["next", "static", "css", "[LONG]", "hex", "digits", "css"]
        );
    }

    #[test]
    fn percent_encoded_query_string_splits_into_words() {
        let text = "http://www1.com.com/?tm=1&subid4=1714127069.0292280000&KW1=News%\
                    20Media%20Monitoring%20Tools&KW2=News%20Lead%20Distribution%20Pl\
                    atform&KW3=Newsletters&searchbox=0&domainname=0&backfill=0";
        let expected = vec![
            "http", "www1", "com", "com", "tm", "1", "subid4", "[LONG]", "digits", "[LONG]",
            "digits", "KW1", "News", "Media", "Monitoring", "Tools", "KW2", "News", "Lead",
            "Distribution", "Platform", "KW3", "Newsletters", "searchbox", "0", "domainname",
            "0", "backfill", "0",
        ];
        assert_eq!(split(text), expected);
    }

    #[test]
    fn hex_literals_fold_only_from_eight_digits() {
        assert_eq!(split("0xdeadbeef"), vec!["0x", "[LONG]", "hex", "digits"]);
        assert_eq!(split("0x1234"), vec!["0x", "1234"]);
        assert_eq!(split("id 12345678"), vec!["id", "[LONG]", "digits"]);
    }

    #[test]
    fn uppercase_hex_folds_like_lowercase() {
        assert_eq!(split("0xDEADBEEF"), vec!["0x", "[LONG]", "hex", "digits"]);
        assert_eq!(split("color 5F3A9C2B1D7E"), vec!["color", "[LONG]", "hex", "digits"]);
    }

    #[test]
    fn overlong_words_are_elided() {
        let alpha = "a".repeat(20) + "-" + &"b".repeat(40);
        assert_eq!(split(&alpha), vec!["aaaaaaaaaaaaaaaaaaaa", "[LONG]", "alphabetic"]);
        assert_eq!(split(&"xy1".repeat(12)), vec!["[LONG]", "alphanumeric"]);
    }

    #[test]
    fn png_payload_in_css_url_classifies_by_signature() {
        let css = "url(data:image/png;base64,iVBORw0KGgoAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYn)";
        assert_eq!(split(css), vec!["url", "data", "image", "png", "base64", "[BASE64]", "png"]);
    }

    #[test]
    fn utf8_payload_gets_qualifiers() {
        assert_eq!(
            split("SGVsbG8sIHRoaXMgaXMgcGxhaW4gdGV4dCBpbnNpZGUu"),
            vec!["[BASE64]", "utf", "8"]
        );
    }

    #[test]
    fn false_base64_falls_back_to_words() {
        assert_eq!(
            split("thisisaveryveryverylongidentifiernameoka"),
            vec!["[LONG]", "alphabetic"]
        );
        assert_eq!(split("ooooooooppppppppqqqqqqqqrrrr"), vec!["ooooooooppppppppqqqqqqqqrrrr"]);
    }

    #[test]
    fn url_vocabulary_in_lookback_marks_span_urlish() {
        assert_eq!(
            split("https://cdn.example.com/assets/abcdefghijklmnopqrstuvwxyzABCD"),
            vec!["https", "cdn", "example", "com", "assets", "abcdefghijklmnopqrstuvwxyzABCD"]
        );
    }

    #[test]
    fn fallback_words_cut_by_grouping_are_rejoined() {
        assert_eq!(split("getElementsByClassNameXyz"), vec!["getElementsByClassNameXyz"]);
        assert_eq!(
            split("https://example.com/assets/images/backgrounds/homepage/hero.png"),
            vec!["https", "example", "com", "assets", "images", "backgrounds", "homepage", "hero", "png"]
        );
    }

    #[test]
    fn escapes_decode_before_splitting() {
        assert_eq!(split("caf%C3%A9 &amp; cr&egrave;me"), vec!["cafe", "creme"]);
        assert_eq!(split("line1\\nline2"), vec!["line1", "line2"]);
        assert_eq!(split("don\\'t"), vec!["don't"]);
    }

    #[test]
    fn non_latin_scripts_are_transliterated() {
        assert_eq!(split("Привет, мир"), vec!["Privet", "mir"]);
    }

    #[test]
    fn whitespace_and_punctuation_only_yield_nothing() {
        assert!(split("   \t\n").is_empty());
        assert!(split("--> // ;;").is_empty());
        assert!(split("").is_empty());
    }

    #[test]
    fn split_is_deterministic() {
        let text = "src=/static/img/logo_v2.png?v=abcdefghijklmnopqrstuvwxyz012345";
        assert_eq!(split(text), split(text));
    }

    #[test]
    fn special_tokens_follow_options() {
        let opts = SplitterOptions { long_token: "[LONGWORD]".to_string(), ..Default::default() };
        let splitter = TextSplitter::new(opts).unwrap();
        assert_eq!(splitter.special_tokens(), vec!["[BASE64]", "[LONGWORD]"]);
        assert_eq!(splitter.split("0xdeadbeef").unwrap(), vec!["0x", "[LONGWORD]", "hex", "digits"]);
    }

    #[test]
    fn deeply_reencoded_escapes_decode_fully() {
        let percent = format!("%{}41", "25".repeat(150));
        assert_eq!(split(&percent), vec!["A"]);
        let entity = format!("x&{}lt;y", "amp;".repeat(150));
        assert_eq!(split(&entity), vec!["x", "y"]);

        let opts = SplitterOptions { max_stalled_iterations: 1, ..Default::default() };
        let splitter = TextSplitter::new(opts).unwrap();
        assert_eq!(splitter.split("%2541").unwrap(), vec!["A"]);
    }

    #[test]
    fn liveness_trips_only_on_repeated_state() {
        let splits = vec![Fragment::Text("%2541".to_string())];
        let mut guard = Liveness::new(2);
        assert!(guard.observe(0, &splits));
        assert!(guard.observe(0, &splits));
        assert!(!guard.observe(0, &splits));

        let mut guard = Liveness::new(1);
        assert!(guard.observe(0, &splits));
        assert!(guard.observe(0, &[Fragment::Text("%41".to_string())]));
        assert!(guard.observe(0, &[Fragment::Text("A".to_string())]));
        assert!(guard.observe(1, &[Fragment::Text("A".to_string())]));
    }
}
