// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Logger backend for the dev runner binaries.
//!
//! Lines are written to stderr (or a file) so that stdout stays free for the
//! lifecycle tokens. The format mirrors the agent log format:
//!
//! ```text
//! 2026-10-19 17:30:00 UTC | DEVRUN | INFO | (src/runner.rs:42 in devrunner::runner) | message
//! ```

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const LOGGER_NAME: &str = "DEVRUN";

/// Environment variable redirecting log output to a file.
pub const LOG_FILE_ENV: &str = "DEVRUN_LOG_FILE";

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Parse a level name. Accepts the `log` crate names as well as the
/// java.util.logging names build tools pass through.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    let level = match name.trim().to_ascii_uppercase().as_str() {
        "OFF" => LevelFilter::Off,
        "ERROR" | "SEVERE" => LevelFilter::Error,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "INFO" => LevelFilter::Info,
        "DEBUG" | "CONFIG" | "FINE" => LevelFilter::Debug,
        "TRACE" | "FINER" | "FINEST" | "ALL" => LevelFilter::Trace,
        _ => return None,
    };
    Some(level)
}

pub struct Logger {
    default: LevelFilter,
    targets: Vec<(String, LevelFilter)>,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    fn level_for(&self, target: &str) -> LevelFilter {
        // Longest matching prefix wins.
        self.targets
            .iter()
            .filter(|(prefix, _)| target_matches(prefix, target))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.default, |(_, level)| *level)
    }

    fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, Ord::max)
    }
}

fn target_matches(prefix: &str, target: &str) -> bool {
    target == prefix
        || target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with("::"))
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(OffsetDateTime::now_utc(), record);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // Nowhere left to report a failing log sink.
        let _ = sink.write_all(line.as_bytes());
    }

    fn flush(&self) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.flush();
    }
}

fn format_record(now: OffsetDateTime, record: &Record) -> String {
    let timestamp = now
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let location = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("({file}:{line} in {}) | ", record.target()),
        _ => String::new(),
    };
    format!(
        "{timestamp} UTC | {LOGGER_NAME} | {} | {location}{}\n",
        record.level(),
        record.args()
    )
}

#[derive(Debug, Clone)]
pub struct Builder {
    default: LevelFilter,
    targets: Vec<(String, LevelFilter)>,
    file: Option<PathBuf>,
}

impl Builder {
    pub fn new(default: LevelFilter) -> Self {
        Self {
            default,
            targets: Vec::new(),
            file: std::env::var_os(LOG_FILE_ENV).map(PathBuf::from),
        }
    }

    /// Override the level for `target` and every module below it.
    pub fn target_level(mut self, target: &str, level: LevelFilter) -> Self {
        self.targets.retain(|(prefix, _)| prefix != target);
        self.targets.push((target.to_string(), level));
        self
    }

    /// Append log lines to `path` instead of stderr.
    pub fn file(mut self, path: &Path) -> Self {
        self.file = Some(path.to_path_buf());
        self
    }

    pub fn build(self) -> io::Result<Logger> {
        let sink: Box<dyn Write + Send> = match self.file {
            Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
            None => Box::new(io::stderr()),
        };
        Ok(Logger {
            default: self.default,
            targets: self.targets,
            sink: Mutex::new(sink),
        })
    }

    /// Install the logger as the global `log` backend.
    pub fn init(self) -> Result<(), InitError> {
        let logger = self.build().map_err(InitError::Open)?;
        log::set_max_level(logger.max_level());
        log::set_boxed_logger(Box::new(logger)).map_err(InitError::AlreadySet)
    }
}

#[derive(Debug)]
pub enum InitError {
    Open(io::Error),
    AlreadySet(SetLoggerError),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::Open(e) => write!(f, "failed to open log file: {e}"),
            InitError::AlreadySet(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InitError {}

/// Install a stderr logger at `level`.
pub fn init_with_level(level: LevelFilter) -> Result<(), InitError> {
    Builder::new(level).init()
}
