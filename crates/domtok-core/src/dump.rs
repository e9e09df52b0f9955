//! 批量导出：快照目录 → 逐行 token 语料，并行调度
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::options::{DumpFormat, DumpOptions, DumpStats};
use crate::snapshot;
use crate::tokens::TokenBuffer;
use crate::walker::DomSnapshotPreTokenizer;

/// 单条记录的处理结果
#[derive(Debug)]
struct RecordOutcome {
    source: String,
    tokens: Option<Vec<String>>,
}

/// 单个文件的处理结果
#[derive(Debug)]
enum FileOutcome {
    /// 超过大小上限或无法读取
    Skipped,
    Read(Vec<RecordOutcome>),
}

#[derive(Serialize)]
struct DumpRecord<'a> {
    source: &'a str,
    tokenized: &'a [String],
}

/// 切分目录下的全部快照并逐行写入 `out`
/// 稳定性保证：
/// - 文件级：按文件名排序
/// - 文件内：按行号顺序；并行时由单线程 writer 按文件序号重排
/// - 单条记录失败只记日志与计数，不中断整批
pub fn dump_and_write(input_dir: &Path, out: &mut dyn Write, opts: &DumpOptions) -> Result<DumpStats> {
    let pre = Arc::new(
        DomSnapshotPreTokenizer::new(opts.splitter.clone()).context("build pre-tokenizer")?,
    );

    let mut files: Vec<PathBuf> = vec![];
    // 数据集为单层目录，深度限制为 1
    for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skip unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut stats = DumpStats::default();
    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    if threads > 1 {
        dump_parallel(&files, out, opts, &pre, &mut stats, threads)?;
        return Ok(stats);
    }

    for path in &files {
        let outcome = tokenize_file(path, &pre, opts.max_file_size);
        write_outcome(out, opts.format, outcome, &mut stats)?;
    }
    Ok(stats)
}

/// 并行调度：
/// - Rayon 线程池按文件并行切分
/// - 单线程 writer 按文件序号重排后流式写出
fn dump_parallel(
    files: &[PathBuf],
    out: &mut dyn Write,
    opts: &DumpOptions,
    pre: &Arc<DomSnapshotPreTokenizer>,
    stats: &mut DumpStats,
    threads: usize,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;
    use std::collections::BTreeMap;

    let (tx, rx) = channel::bounded::<(usize, FileOutcome)>(256);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("build rayon pool")?;

    // writer 留在当前线程，切分放到后台线程
    let pre = Arc::clone(pre);
    let max_file_size = opts.max_file_size;
    let indexed: Vec<(usize, PathBuf)> = files.iter().cloned().enumerate().collect();

    let worker = std::thread::spawn(move || {
        pool.install(|| {
            indexed.par_iter().for_each(|(idx, path)| {
                let outcome = tokenize_file(path, &pre, max_file_size);
                let _ = tx.send((*idx, outcome));
            });
        });
        // Sender 全部丢弃后 Receiver 收到关闭信号
    });

    let mut next_idx = 0usize;
    let mut pending: BTreeMap<usize, FileOutcome> = BTreeMap::new();
    while let Ok((idx, outcome)) = rx.recv() {
        pending.insert(idx, outcome);
        while let Some(outcome) = pending.remove(&next_idx) {
            write_outcome(out, opts.format, outcome, stats)?;
            next_idx += 1;
        }
    }

    if worker.join().is_err() {
        anyhow::bail!("tokenizer thread panicked");
    }

    // 理论上缓冲应已清空
    while let Some(outcome) = pending.remove(&next_idx) {
        write_outcome(out, opts.format, outcome, stats)?;
        next_idx += 1;
    }
    Ok(())
}

fn tokenize_file(path: &Path, pre: &DomSnapshotPreTokenizer, max_file_size: Option<u64>) -> FileOutcome {
    let file_name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    if let Some(max) = max_file_size {
        if let Ok(md) = std::fs::metadata(path) {
            if md.len() > max {
                debug!(file = %file_name, size = md.len(), "skip oversized file");
                return FileOutcome::Skipped;
            }
        }
    }
    let txt = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(file = %file_name, error = %e, "skip unreadable file");
            return FileOutcome::Skipped;
        }
    };

    let is_jsonl = path.extension().is_some_and(|ext| ext == "jsonl");
    if !is_jsonl {
        let tokens = tokenize_document(pre, &txt).map_err(|e| e.context(file_name.clone()));
        return FileOutcome::Read(vec![record(file_name, tokens)]);
    }

    let records = txt
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(no, line)| {
            let source = format!("{file_name}:{}", no + 1);
            let tokens = tokenize_record(pre, line);
            record(source, tokens)
        })
        .collect();
    FileOutcome::Read(records)
}

fn record(source: String, tokens: Result<Vec<String>>) -> RecordOutcome {
    match tokens {
        Ok(tokens) => RecordOutcome { source, tokens: Some(tokens) },
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(%source, error = %reason, "record failed");
            RecordOutcome { source, tokens: None }
        }
    }
}

fn tokenize_document(pre: &DomSnapshotPreTokenizer, serialized: &str) -> Result<Vec<String>> {
    let mut buf = TokenBuffer::new();
    pre.pre_tokenize_dom(&mut buf, serialized)?;
    Ok(buf.into_tokens())
}

/// 一行数据集记录：`{"source_index": .., "dom_snapshot": {..}}` 或裸快照
fn tokenize_record(pre: &DomSnapshotPreTokenizer, line: &str) -> Result<Vec<String>> {
    let mut value: Value = serde_json::from_str(line).context("parse record")?;
    if let Some(inner) = value.get_mut("dom_snapshot") {
        value = inner.take();
    }
    let snapshot = snapshot::from_value(value)?;
    let mut buf = TokenBuffer::new();
    pre.walk(&mut buf, &snapshot)?;
    Ok(buf.into_tokens())
}

fn write_outcome(
    out: &mut dyn Write,
    format: DumpFormat,
    outcome: FileOutcome,
    stats: &mut DumpStats,
) -> Result<()> {
    let FileOutcome::Read(records) = outcome else {
        return Ok(());
    };
    stats.files_read += 1;
    for rec in records {
        let Some(tokens) = rec.tokens else {
            stats.records_failed += 1;
            continue;
        };
        stats.records_tokenized += 1;
        stats.tokens_written += tokens.len();
        match format {
            DumpFormat::Json => {
                let item = DumpRecord { source: &rec.source, tokenized: &tokens };
                serde_json::to_writer(&mut *out, &item)?;
                writeln!(out)?;
            }
            DumpFormat::Text => writeln!(out, "{}", tokens.join(" "))?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn snapshot(tag: &str, text: &str) -> Value {
        json!({
            "documents": [{"nodes": {
                "parentIndex": [-1, 0, 1],
                "nodeType": [9, 1, 3],
                "nodeName": [0, 1, 2],
                "nodeValue": [-1, -1, 3]
            }}],
            "strings": ["#document", tag, "#text", text]
        })
    }

    fn populate(dir: &Path) {
        let lines = [
            json!({"source_index": 0, "dom_snapshot": snapshot("P", "hello world")}).to_string(),
            String::new(),
            json!({"source_index": 1, "dom_snapshot": {"strings": []}}).to_string(),
            snapshot("B", "bye").to_string(),
        ];
        fs::write(dir.join("a.jsonl"), lines.join("\n")).unwrap();
        fs::write(dir.join("b.json"), json!({"result": snapshot("H1", "Title")}).to_string()).unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("c.json"), snapshot("DIV", "hidden").to_string()).unwrap();
    }

    fn dump(dir: &Path, threads: usize, format: DumpFormat) -> (String, DumpStats) {
        let opts = DumpOptions { threads: Some(threads), format, ..Default::default() };
        let mut out = Vec::new();
        let stats = dump_and_write(dir, &mut out, &opts).unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    #[test]
    fn json_lines_in_file_order() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let (out, stats) = dump(dir.path(), 1, DumpFormat::Json);
        let lines: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["source"], "a.jsonl:1");
        assert_eq!(lines[0]["tokenized"], json!(["<", "p", ">", "hello", "world", "</", "p", ">"]));
        assert_eq!(lines[1]["source"], "a.jsonl:4");
        assert_eq!(lines[2]["source"], "b.json");
        assert_eq!(
            stats,
            DumpStats { files_read: 2, records_tokenized: 3, records_failed: 1, tokens_written: 22 }
        );
    }

    #[test]
    fn parallel_output_matches_serial() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        for i in 0..8 {
            fs::write(dir.path().join(format!("z{i}.json")), snapshot("SPAN", &format!("item {i}")).to_string()).unwrap();
        }
        let serial = dump(dir.path(), 1, DumpFormat::Text);
        let parallel = dump(dir.path(), 4, DumpFormat::Text);
        assert_eq!(serial, parallel);
        assert_eq!(serial.0.lines().next(), Some("< p > hello world </ p >"));
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let opts = DumpOptions { threads: Some(1), max_file_size: Some(200), ..Default::default() };
        let mut out = Vec::new();
        let stats = dump_and_write(dir.path(), &mut out, &opts).unwrap();
        assert_eq!(stats.files_read, 1);
        assert_eq!(stats.records_tokenized, 1);
    }
}
