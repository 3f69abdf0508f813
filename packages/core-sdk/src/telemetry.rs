use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_FILE: &str = "voxrelay.log";

/**
 * \brief 诊断日志输出位置。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    Stderr,
    /** \brief 目录，日志追加写入其中的 voxrelay.log */
    Dir(PathBuf),
    Off,
}

static SINK: Lazy<std::sync::RwLock<Sink>> = Lazy::new(|| std::sync::RwLock::new(Sink::Stderr));

/**
 * \brief 更新日志输出位置。
 */
pub fn set_sink(sink: Sink) {
    if let Ok(mut guard) = SINK.write() {
        *guard = sink;
    }
}

pub fn sink() -> Sink {
    SINK.read().map(|g| g.clone()).unwrap_or(Sink::Stderr)
}

/**
 * \brief 记录常规事件。
 */
pub fn log_event(category: &str, message: &str) {
    emit("INFO", category, message);
}

/**
 * \brief 记录错误事件。仅写入服务端，不会进入响应体。
 */
pub fn log_error(category: &str, message: &str) {
    emit("ERROR", category, message);
}

fn emit(level: &str, category: &str, message: &str) {
    let line = match format_line(level, category, message) {
        Ok(line) => line,
        Err(err) => {
            eprintln!("telemetry format failed: {}", err);
            return;
        }
    };
    match sink() {
        Sink::Off => {}
        Sink::Stderr => eprintln!("{}", line),
        Sink::Dir(dir) => {
            if let Err(err) = append_line(&dir, &line) {
                eprintln!("telemetry write failed: {}", err);
                eprintln!("{}", line);
            }
        }
    }
}

fn format_line(level: &str, category: &str, message: &str) -> Result<String> {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    Ok(format!("{} [{}] {} - {}", timestamp, level, category, message))
}

fn append_line(dir: &Path, line: &str) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;
    writeln!(file, "{}", line)?;
    Ok(())
}
