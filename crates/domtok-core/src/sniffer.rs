//! base64 载荷嗅探
//!
//! 顺序：编码后的签名前缀 → 完整解码 → UTF-8（XML/SVG 头、JSON）→ 字节魔数
//! → 单字母表检验（仅对较短片段）。这是尽力而为的启发式分类，不是格式解析器。
use aho_corasick::{AhoCorasick, Anchored, Input, MatchKind, StartKind};
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use regex::Regex;

use crate::error::{Result, TokenizeError};
use crate::options::SplitterOptions;

/// 宽松解码：容忍末尾多余比特与缺失的填充
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// 可识别的载荷格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Gif,
    Png,
    Jpeg,
    Riff,
    Webp,
    Wav,
    Avi,
    Svg,
    Woff,
    JsonSandwich,
    Xml,
    Json,
    Zlib,
    Gzip,
    Pdf,
}

impl FileType {
    /// 紧跟在 [BASE64] 之后输出的子类型 token
    pub fn token(self) -> &'static str {
        match self {
            FileType::Gif => "gif",
            FileType::Png => "png",
            FileType::Jpeg => "jpeg",
            FileType::Riff => "riff",
            FileType::Webp => "webp",
            FileType::Wav => "wav",
            FileType::Avi => "avi",
            FileType::Svg => "svg",
            FileType::Woff => "woff",
            FileType::JsonSandwich | FileType::Json => "json",
            FileType::Xml => "xml",
            FileType::Zlib => "zlib",
            FileType::Gzip => "gzip",
            FileType::Pdf => "pdf",
        }
    }
}

/// 文件签名（均为 4 字节，编码后前 5 个字符完全由签名决定）
const SIGNATURES: &[(&[u8], FileType)] = &[
    (b"GIF8", FileType::Gif),
    (b"\x89PNG", FileType::Png),
    (b"\xff\xd8\xff\xe0", FileType::Jpeg),
    (b"\xff\xd8\xff\xe1", FileType::Jpeg),
    (b"\xff\xd8\xff\xdb", FileType::Jpeg),
    (b"RIFF", FileType::Riff),
    (b"<svg", FileType::Svg),
    (b"wOFF", FileType::Woff),
    (b"wOF2", FileType::Woff),
    // 9 字节二进制 + JSON + 8 字节二进制
    (b"\x00\x1d\xda|", FileType::JsonSandwich),
];

/// 编码前缀长度
const PREFIX_LEN: usize = 5;

/// 载荷分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    File(FileType),
    /// 合法 UTF-8 文本，未进一步细分
    Utf8Text,
    /// 看起来像随机数据，无子类型
    Opaque,
}

impl Payload {
    /// 紧跟在 [BASE64] 之后的限定 token
    pub fn qualifiers(self) -> Vec<&'static str> {
        match self {
            Payload::File(ft) => vec![ft.token()],
            Payload::Utf8Text => vec!["utf", "8"],
            Payload::Opaque => Vec::new(),
        }
    }
}

/// 嗅探结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Base64(Payload),
    /// 不像编码数据，调用方应按普通文本处理
    FalseBase64,
}

pub struct Sniffer {
    prefixes: AhoCorasick,
    kinds: Vec<FileType>,
    xml_header: Regex,
    xml_decl: Regex,
    longest_phitest: usize,
    phi_ratio: f64,
}

impl Sniffer {
    pub fn new(opts: &SplitterOptions) -> Result<Self> {
        let mut patterns = Vec::with_capacity(SIGNATURES.len());
        let mut kinds = Vec::with_capacity(SIGNATURES.len());
        for (magic, kind) in SIGNATURES {
            let encoded = STANDARD.encode(magic);
            patterns.push(encoded[..PREFIX_LEN].to_string());
            kinds.push(*kind);
        }
        let prefixes = AhoCorasick::builder()
            .start_kind(StartKind::Anchored)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)?;
        Ok(Self {
            prefixes,
            kinds,
            xml_header: Regex::new(r"^<([a-z]{3,})\s+[a-z]+")?,
            xml_decl: Regex::new(r"^(?:\x{FEFF})?<\?xml\s")?,
            longest_phitest: opts.longest_phitest,
            phi_ratio: opts.phi_ratio,
        })
    }

    /// 按编码后的签名前缀快速识别；RIFF 需解码前 12 字节读取子类型
    pub fn sniff_prefix(&self, encoded: &str) -> Result<Option<FileType>> {
        let input = Input::new(encoded).anchored(Anchored::Yes);
        let Some(m) = self.prefixes.find(input) else {
            return Ok(None);
        };
        let kind = self.kinds[m.pattern().as_usize()];
        if kind != FileType::Riff || encoded.len() < 16 {
            return Ok(Some(kind));
        }
        let head = decode(&encoded[..16])?;
        Ok(Some(match &head[8..12] {
            b"WEBP" => FileType::Webp,
            b"WAVE" => FileType::Wav,
            b"AVI " => FileType::Avi,
            _ => FileType::Riff,
        }))
    }

    /// 独立入口：先看签名前缀，再按内容分类
    pub fn classify(&self, encoded: &str) -> Result<Sniffed> {
        if let Some(kind) = self.sniff_prefix(encoded)? {
            return Ok(Sniffed::Base64(Payload::File(kind)));
        }
        self.classify_content(encoded)
    }

    /// 调用方已做过 `sniff_prefix` 时使用：解码后按内容分类
    pub(crate) fn classify_content(&self, encoded: &str) -> Result<Sniffed> {
        let data = decode(encoded)?;
        if let Ok(text) = std::str::from_utf8(&data) {
            return Ok(Sniffed::Base64(self.sniff_text(text)));
        }
        if let Some(kind) = sniff_bytes(&data) {
            return Ok(Sniffed::Base64(Payload::File(kind)));
        }
        if encoded.len() > self.longest_phitest {
            return Ok(Sniffed::Base64(Payload::Opaque));
        }
        if self.looks_monoalphabetic(encoded) {
            return Ok(Sniffed::FalseBase64);
        }
        Ok(Sniffed::Base64(Payload::Opaque))
    }

    fn sniff_text(&self, text: &str) -> Payload {
        if let Some(caps) = self.xml_header.captures(text) {
            return match &caps[1] {
                "svg" => Payload::File(FileType::Svg),
                _ => Payload::File(FileType::Xml),
            };
        }
        if self.xml_decl.is_match(text) {
            if text.contains("<svg") {
                return Payload::File(FileType::Svg);
            }
            return Payload::File(FileType::Xml);
        }
        if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
            return Payload::File(FileType::Json);
        }
        Payload::Utf8Text
    }

    /// phi 检验：自然文本的符号碰撞数明显高于均匀随机的 64 符号数据
    fn looks_monoalphabetic(&self, encoded: &str) -> bool {
        let symbols = encoded.trim_end_matches('=').as_bytes();
        let mut hist = [0u32; 128];
        for &c in symbols {
            hist[(c & 0x7f) as usize] += 1;
        }
        let observed: f64 = hist
            .iter()
            .filter(|&&f| f > 1)
            .map(|&f| f as f64 * (f as f64 - 1.0))
            .sum();
        let n = symbols.len() as f64;
        let expected = n * (n - 1.0) / 64.0;
        observed > expected * self.phi_ratio
    }
}

fn decode(encoded: &str) -> Result<Vec<u8>> {
    LENIENT.decode(encoded).map_err(|source| TokenizeError::DecodeFailure {
        encoded: encoded.to_string(),
        source,
    })
}

/// 常见容器格式的字节魔数（覆盖签名前缀未命中的偏移情况）
fn sniff_bytes(data: &[u8]) -> Option<FileType> {
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(FileType::Gif);
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(FileType::Png);
    }
    if data.starts_with(b"\xff\xd8\xff") {
        return Some(FileType::Jpeg);
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(FileType::Webp);
    }
    if data.starts_with(b"wOFF") || data.starts_with(b"wOF2") {
        return Some(FileType::Woff);
    }
    if data.starts_with(b"\x1f\x8b") {
        return Some(FileType::Gzip);
    }
    if data.starts_with(b"%PDF-") {
        return Some(FileType::Pdf);
    }
    // zlib 头：CM=8、CINFO<=7，且 CMF*256+FLG 可被 31 整除
    if let [cmf, flg, ..] = *data {
        if cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0 {
            return Some(FileType::Zlib);
        }
    }
    None
}
