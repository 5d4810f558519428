//! Tracing subscriber setup.
//!
//! [`init`] wires the `logging` settings group into a `tracing-subscriber`
//! registry for test-runner processes; [`init_cli`] is the stderr-only
//! variant used by the diagnostic binary before any settings exist.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::config::{LogFormat, LogLevel, LoggingSettings};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file or its directory could not be prepared.
    #[error("Failed to prepare log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error | LogLevel::Critical => Level::ERROR,
        }
    }
}

/// `RUST_LOG` directives plus `level` as the default.
pub fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.into())
}

fn fmt_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Structured => layer.with_target(true).boxed(),
        LogFormat::Simple => layer.compact().with_target(false).boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Installs the global subscriber described by `settings`.
///
/// The log file is rotated first if it has grown past
/// `max_file_size_mb`.
///
/// # Errors
///
/// Fails if the log file cannot be prepared or a subscriber is already set.
pub fn init(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let console = settings
        .console_enabled
        .then(|| fmt_layer(settings.format_type, io::stderr, true));

    let file = if settings.file_enabled {
        let file = open_log_file(
            &settings.file_path,
            settings.max_file_size_mb * 1024 * 1024,
            settings.backup_count,
        )?;
        Some(fmt_layer(settings.format_type, Mutex::new(file), false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(build_filter(settings.level.into()))
        .try_init()?;
    Ok(())
}

/// Installs a stderr subscriber for command line use.
///
/// `quiet` limits output to errors; each `verbosity` step lowers the
/// threshold from warn to info, debug and trace.
pub fn init_cli(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(build_filter(level))
        .init();
}

fn open_log_file(path: &Path, max_bytes: u64, backups: u32) -> Result<File, LoggingError> {
    let wrap = |source| LoggingError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
    }
    rotate_log_file(path, max_bytes, backups).map_err(wrap)?;
    OpenOptions::new().create(true).append(true).open(path).map_err(wrap)
}

/// Shifts `file` to `file.1`, `file.1` to `file.2` and so on when `file` is
/// at least `max_bytes` long. The oldest backup beyond `backups` is removed.
///
/// Returns true if a rotation happened.
pub fn rotate_log_file(path: &Path, max_bytes: u64, backups: u32) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes || backups == 0 {
        return Ok(false);
    }

    let backup = |n: u32| {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    };

    let oldest = backup(backups);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup(n);
        if from.exists() {
            fs::rename(&from, backup(n + 1))?;
        }
    }
    fs::rename(path, backup(1))?;
    Ok(true)
}
