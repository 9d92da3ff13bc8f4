//! 日志初始化.
//!
//! 库 crate 通过 `log` 门面输出, 这里把它们与 `tracing` 事件一起送到控制台
//! 和按日滚动的日志文件. 历史日志在初始化时按保留天数清理, 可选 gzip 压缩.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter 语法, 如 `info` 或 `sheng_filter=debug,warn`
    pub level: String,
    /// 输出到控制台 (stdout)
    pub console: bool,
    /// 输出到日志文件
    pub file: bool,
    pub directory: String,
    pub file_prefix: String,
    /// 超过该天数的历史日志在初始化时删除
    pub retention_days: i64,
    /// 压缩当天以前的历史日志
    pub compress_history: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: false,
            directory: "logs".to_string(),
            file_prefix: "sheng".to_string(),
            retention_days: 30,
            compress_history: true,
        }
    }
}

/// 日志守卫, 持有文件写入线程; 释放时刷新尚未写出的日志
#[must_use = "释放守卫会停止文件日志写入"]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("无效的日志级别: {level}"))
}

/// 安装全局日志订阅器.
///
/// 进程内只能成功一次, 重复调用返回错误. `log` 记录经 `tracing-log` 桥接.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let console_layer = if config.console {
        let layer = fmt::Layer::default()
            .with_writer(io::stdout)
            .with_ansi(true)
            .event_format(LineFormat { ansi: true })
            .with_filter(level_filter(&config.level)?);
        Some(layer)
    } else {
        None
    };

    let (file_layer, worker) = if config.file {
        let directory = Path::new(&config.directory);
        fs::create_dir_all(directory)
            .with_context(|| format!("无法创建日志目录 {}", directory.display()))?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(directory)
            .context("创建滚动日志文件失败")?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::Layer::default()
            .with_writer(writer)
            .with_ansi(false)
            .event_format(LineFormat { ansi: false })
            .with_filter(level_filter(&config.level)?);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("全局日志订阅器已初始化")?;

    if config.file {
        if let Err(err) = cleanup_history(config) {
            tracing::warn!("清理历史日志失败: {err:#}");
        }
    }
    Ok(LoggingGuard { _worker: worker })
}

/// 某天的日志文件路径, 与滚动写入器的命名一致
pub fn current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{prefix}.{}.log", date.format("%Y-%m-%d")))
}

/// 删除过期日志, 并按配置压缩当天以前的日志.
///
/// 只处理 `<prefix>.<YYYY-MM-DD>.log[.gz]` 形式的文件.
pub fn cleanup_history(config: &LoggingConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let today = Local::now().date_naive();
    let oldest_kept = today - ChronoDuration::days(config.retention_days);
    for entry in entries {
        let path = entry?.path();
        let parsed = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| parse_log_name(name, &config.file_prefix));
        match parsed {
            Some((date, _)) if date < oldest_kept => {
                tracing::debug!("删除过期日志 {}", path.display());
                fs::remove_file(&path)
                    .with_context(|| format!("移除 {} 失败", path.display()))?;
            }
            Some((date, false)) if config.compress_history && date < today => {
                compress_to_gz(&path)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// 原地 gzip 压缩: 写出 `<path>.gz` 后删除原文件, 目标已存在时跳过
fn compress_to_gz(path: &Path) -> Result<()> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let target = PathBuf::from(gz_name);
    if target.exists() {
        return Ok(());
    }

    let mut source = File::open(path).with_context(|| format!("读取 {} 失败", path.display()))?;
    let mut encoder = GzEncoder::new(
        File::create(&target).with_context(|| format!("写入 {} 失败", target.display()))?,
        Compression::default(),
    );
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path).with_context(|| format!("移除 {} 失败", path.display()))
}

fn parse_log_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (stem, compressed) = match rest.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (rest, false),
    };
    let date = stem.strip_suffix(".log")?;
    // 只接受补零的 YYYY-MM-DD
    if date.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| (d, compressed))
}

/// 单行事件格式: 时间, 级别, target, 字段.
///
/// 控制台使用短时间戳并按级别着色, 文件使用完整日期且不带转义序列.
#[derive(Clone, Copy)]
struct LineFormat {
    ansi: bool,
}

impl LineFormat {
    fn level_color(level: &tracing::Level) -> &'static str {
        match *level {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            tracing::Level::DEBUG => "\x1b[36m",
            tracing::Level::TRACE => "\x1b[90m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let level = meta.level();
        if self.ansi {
            let stamp = Local::now().format("%m-%d %H:%M:%S%.3f");
            let color = Self::level_color(level);
            write!(writer, "{stamp} {color}{level:>5}\x1b[0m {}: ", meta.target())?;
        } else {
            let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            write!(writer, "{stamp} {level:>5} {}: ", meta.target())?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
