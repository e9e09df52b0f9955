use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use domtok_core::{
    dump_and_write, load_options, segment, DumpFormat, DumpOptions, SplitterOptions, TextSplitter,
};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "domtok", version, about = "DOM 快照预切分工具")]
struct Cli {
    /// 切分器配置文件（TOML，可选 [splitter] 表）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 切分目录下的全部快照，逐行输出
    Dump {
        /// 输入目录（*.jsonl 数据集或单个快照文件）
        #[arg(long)]
        input: PathBuf,

        /// 输出文件；缺省写到标准输出
        #[arg(long)]
        output: Option<PathBuf>,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 输出格式：json 每行一个记录对象，text 每行空格拼接的 token
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// 最大文件大小（单位字节）
        #[arg(long)]
        max_file_size: Option<u64>,
    },
    /// 切分字符串；不给参数时逐行读取标准输入
    Split {
        text: Vec<String>,
    },
    /// 打印 token 的字符类分段
    Inspect {
        token: String,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();
    let splitter_opts = match &cli.config {
        Some(path) => load_options(path)?,
        None => SplitterOptions::default(),
    };

    match cli.command {
        Commands::Dump { input, output, threads, format, max_file_size } => {
            info!(?input, ?output, "starting dump");
            let opts = DumpOptions {
                threads: parse_threads(&threads),
                format: match format {
                    Format::Json => DumpFormat::Json,
                    Format::Text => DumpFormat::Text,
                },
                max_file_size,
                splitter: splitter_opts,
            };
            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path).context("create output file")?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            let stats = dump_and_write(&input, &mut out, &opts).context("dump failed")?;
            out.flush().context("flush output")?;

            info!(
                files_read = stats.files_read,
                records_tokenized = stats.records_tokenized,
                records_failed = stats.records_failed,
                tokens_written = stats.tokens_written,
                "dump finished"
            );
        }
        Commands::Split { text } => {
            let splitter = TextSplitter::new(splitter_opts).context("build splitter")?;
            let mut out = io::stdout().lock();
            if text.is_empty() {
                for line in io::stdin().lock().lines() {
                    print_split(&mut out, &splitter, &line.context("read stdin")?)?;
                }
            } else {
                for t in &text {
                    print_split(&mut out, &splitter, t)?;
                }
            }
        }
        Commands::Inspect { token } => inspect(&token)?,
    }

    Ok(())
}

fn print_split(out: &mut dyn Write, splitter: &TextSplitter, text: &str) -> Result<()> {
    let tokens = splitter.split(text).with_context(|| format!("split {text:?}"))?;
    serde_json::to_writer(&mut *out, &tokens)?;
    writeln!(out)?;
    Ok(())
}

fn inspect(token: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    for span in segment(token) {
        writeln!(
            out,
            "{:>4}..{:<4} {:<12} {:.3} {:?}",
            span.start,
            span.limit,
            span.class.as_str(),
            span.probability,
            span.text(token)
        )?;
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到标准错误，避免混入 split/dump 的标准输出
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return None;
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_accept_auto_and_positive_counts() {
        assert_eq!(parse_threads("auto"), None);
        assert_eq!(parse_threads("AUTO"), None);
        assert_eq!(parse_threads("4"), Some(4));
        assert_eq!(parse_threads("0"), None);
        assert_eq!(parse_threads("many"), None);
    }

    #[test]
    fn cli_parses_dump_arguments() {
        let cli = Cli::try_parse_from([
            "domtok", "dump", "--input", "snapshots", "--format", "text", "--threads", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Dump { input, format, threads, .. } => {
                assert_eq!(input, PathBuf::from("snapshots"));
                assert!(matches!(format, Format::Text));
                assert_eq!(threads, "2");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
