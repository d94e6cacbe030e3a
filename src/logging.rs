/// Structured logging for the hazard trigger service
///
/// Backs the `log` facade with a pipeline-aware logger: every entry names the
/// pipeline stage that produced it and, optionally, the region or place code
/// it concerns. Supports console output and an append-only log file for
/// scheduled runs.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::PipelineError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }

    fn to_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug | log::Level::Trace => LogLevel::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Compare,
    Aggregate,
    Classify,
    Store,
    Publish,
    System,
}

impl Stage {
    /// Target string handed to the `log` facade.
    pub fn target(&self) -> &'static str {
        match self {
            Stage::Extract => "EXTRACT",
            Stage::Compare => "COMPARE",
            Stage::Aggregate => "AGGREGATE",
            Stage::Classify => "CLASSIFY",
            Stage::Store => "STORE",
            Stage::Publish => "PUBLISH",
            Stage::System => "SYS",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - source data for the month not released yet
    Expected,
    /// Unexpected failure - configuration, geometry or service problem
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct PipelineLogger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
    /// Serializes appends to the log file
    file_lock: Mutex<()>,
}

impl PipelineLogger {
    pub fn new(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) -> Self {
        PipelineLogger {
            min_level,
            log_file,
            console_timestamps,
            file_lock: Mutex::new(()),
        }
    }

    fn append_to_file(&self, path: &str, entry: &str) -> std::io::Result<()> {
        // A poisoned lock only means another thread panicked mid-write.
        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// Formats one log line as written to the log file.
pub fn format_entry(timestamp: DateTime<Utc>, level: LogLevel, target: &str, message: &str) -> String {
    format!(
        "{} {} {}: {}",
        timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        level,
        target,
        message
    )
}

impl log::Log for PipelineLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        LogLevel::from(metadata.level()) >= self.min_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = LogLevel::from(record.level());
        let message = record.args().to_string();
        let log_entry = format_entry(Utc::now(), level, record.target(), &message);

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", log_entry),
                LogLevel::Warning => eprintln!("   {}", log_entry),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}: {}", record.target(), message),
                LogLevel::Warning => eprintln!("   ⚠ {}: {}", record.target(), message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = self.append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn flush(&self) {}
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Install the pipeline logger as the global `log` backend. Can only
/// succeed once per process.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), log::SetLoggerError> {
    let logger = PipelineLogger::new(min_level, log_file.map(String::from), console_timestamps);
    log::set_logger(Box::leak(Box::new(logger)))?;
    log::set_max_level(min_level.to_level_filter());
    Ok(())
}

fn emit(level: LogLevel, stage: Stage, context: Option<&str>, message: &str) {
    match context {
        Some(ctx) => log::log!(target: stage.target(), level.to_level(), "[{}] {}", ctx, message),
        None => log::log!(target: stage.target(), level.to_level(), "{}", message),
    }
}

/// Log a general informational message
pub fn info(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Info, stage, context, message);
}

/// Log a warning message
pub fn warn(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Warning, stage, context, message);
}

/// Log an error message
pub fn error(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Error, stage, context, message);
}

/// Log a debug message
pub fn debug(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Debug, stage, context, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a pipeline failure by its error variant
pub fn classify_failure(err: &PipelineError) -> FailureType {
    match err {
        // Forecasts for the issue month may not be released yet
        PipelineError::DataUnavailable(_) => FailureType::Expected,
        PipelineError::Configuration(_)
        | PipelineError::GeometryMismatch { .. }
        | PipelineError::IncompatibleGrid(_)
        | PipelineError::Parse(_)
        | PipelineError::Network(_) => FailureType::Unexpected,
        PipelineError::Http { status, .. } if *status >= 500 => FailureType::Unexpected,
        PipelineError::Http { .. }
        | PipelineError::DataUnitNotFound(_)
        | PipelineError::Io(_)
        | PipelineError::Csv(_)
        | PipelineError::Database(_) => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failure with automatic classification
pub fn log_failure(stage: Stage, context: Option<&str>, operation: &str, err: &PipelineError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => warn(stage, context, &message),
        FailureType::Unexpected => error(stage, context, &message),
        FailureType::Unknown => warn(stage, context, &message),
    }
}

/// Log a region that was dropped from this run
pub fn log_region_failure(region_code: &str, lead_time: Option<u32>, err: &PipelineError) {
    let operation = match lead_time {
        Some(lead) => format!("forecast for lead time {}", lead),
        None => "regional forecast".to_string(),
    };
    log_failure(Stage::Aggregate, Some(region_code), &operation, err);
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one country run
pub fn log_run_summary(country: &str, hazard: &str, total: usize, successful: usize) {
    let failed = total.saturating_sub(successful);
    let message = format!(
        "{} {} run complete: {}/{} regions successful, {} failed",
        country, hazard, successful, total, failed
    );

    if failed == 0 {
        info(Stage::System, Some(country), &message);
    } else if successful == 0 {
        error(Stage::System, Some(country), &message);
    } else {
        warn(Stage::System, Some(country), &message);
    }
}
