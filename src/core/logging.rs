//! Structured logging system
//!
//! This module provides:
//! - Global tracing subscriber setup (JSON or text, stdout or rotated file)
//! - The module log sink that receives lines emitted by sandboxed modules

use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Maximum length of a single module log line
const MAX_MODULE_LOG_LEN: usize = 2048;

/// Logger instance that manages the logging system
pub struct Logger {
    _guard: Option<WorkerGuard>,
}

impl Logger {
    /// Initialize the logging system based on configuration
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

        let (writer, guard) = match config.output.as_str() {
            "stdout" => tracing_appender::non_blocking(io::stdout()),
            "file" => {
                let log_file = config
                    .log_file
                    .as_ref()
                    .context("log_file must be specified when output is 'file'")?;

                if let Some(parent) = log_file.parent() {
                    std::fs::create_dir_all(parent).context("Failed to create log directory")?;
                }

                let appender = RollingFileAppender::for_file(
                    log_file,
                    config.max_file_size,
                    config.max_backups,
                )?;
                tracing_appender::non_blocking(appender)
            }
            _ => anyhow::bail!("Invalid output configuration: {}", config.output),
        };

        let fmt_layer = match config.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_thread_names(true)
                .with_target(true)
                .boxed(),
            "text" => fmt::layer()
                .with_writer(writer)
                .with_thread_names(true)
                .with_target(true)
                .boxed(),
            _ => anyhow::bail!("Invalid format configuration: {}", config.format),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::debug!(
            level = %config.level,
            format = %config.format,
            output = %config.output,
            "Logging system initialized"
        );

        Ok(Logger {
            _guard: Some(guard),
        })
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {}", level),
    }
}

/// Host-side sink for diagnostic lines emitted by a module
pub trait ModuleLogger: Send + Sync {
    fn log(&self, session: &str, message: &str);
}

/// Default module log sink, forwarding to tracing under the `module` target
#[derive(Debug, Clone, Default)]
pub struct TracingModuleLogger;

impl ModuleLogger for TracingModuleLogger {
    fn log(&self, session: &str, message: &str) {
        tracing::info!(target: "module", session = %session, "{}", sanitize_module_log(message));
    }
}

/// Strip control characters (except newline/tab) and cap the length
pub fn sanitize_module_log(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_MODULE_LOG_LEN)
        .collect();
    if message.chars().count() > MAX_MODULE_LOG_LEN {
        format!("{cleaned}… (truncated)")
    } else {
        cleaned
    }
}

/// Rolling file appender that rotates based on file size
pub struct RollingFileAppender {
    directory: PathBuf,
    filename: String,
    max_file_size: usize,
    max_backups: usize,
    current_file: Mutex<Option<std::fs::File>>,
    current_size: AtomicUsize,
}

impl RollingFileAppender {
    pub fn new(
        directory: PathBuf,
        filename: String,
        max_file_size: usize,
        max_backups: usize,
    ) -> Self {
        Self {
            directory,
            filename,
            max_file_size,
            max_backups,
            current_file: Mutex::new(None),
            current_size: AtomicUsize::new(0),
        }
    }

    fn for_file(log_file: &Path, max_file_size: usize, max_backups: usize) -> Result<Self> {
        let directory = log_file
            .parent()
            .context("Log file must have a parent directory")?;

        let filename = log_file
            .file_name()
            .context("Log file must have a filename")?
            .to_str()
            .context("Log filename must be valid UTF-8")?;

        Ok(Self::new(
            directory.to_path_buf(),
            filename.to_string(),
            max_file_size,
            max_backups,
        ))
    }

    fn current_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.directory.join(format!("{}.{}", self.filename, index))
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Option<std::fs::File>>> {
        self.current_file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))
    }

    fn rotate(&self) -> io::Result<()> {
        *self.lock()? = None;

        for i in (1..self.max_backups).rev() {
            let from = self.backup_path(i);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(i + 1))?;
            }
        }

        let current = self.current_path();
        if current.exists() {
            std::fs::rename(&current, self.backup_path(1))?;
        }

        self.current_size.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn open(&self) -> io::Result<MutexGuard<'_, Option<std::fs::File>>> {
        let mut guard = self.lock()?;

        if guard.is_none() {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.current_path())?;
            self.current_size
                .store(file.metadata()?.len() as usize, Ordering::SeqCst);
            *guard = Some(file);
        }

        Ok(guard)
    }
}

impl io::Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size.load(Ordering::SeqCst) + buf.len() > self.max_file_size {
            self.rotate()?;
        }

        let mut guard = self.open()?;
        let written = match guard.as_mut() {
            Some(file) => file.write(buf)?,
            None => 0,
        };
        self.current_size.fetch_add(written, Ordering::SeqCst);

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.open()?.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}
