//! Internal structured logging for the Driftlight renderer.
//!
//! The `log`/`env_logger` crates handle ordinary application logging (and
//! are what the demo binary initializes), but the renderer also wants
//! structured, source-tagged events it can route through its own sink —
//! e.g. so a future editor can show a live log panel. This module provides
//! that: a `Logger` trait, severity levels, a colored default console
//! logger, and macros that go through whichever logger is currently
//! installed.
//!
//! Every `engine_*!` macro also forwards to the standard `log` crate at the
//! matching level, so a host application's existing `log` subscriber still
//! sees everything even if it never installs a custom `Logger`.

use colored::*;
use chrono::{DateTime, Local};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;

/// Implement this to route engine log events somewhere other than stdout
/// (a file, a network sink, an in-process UI panel).
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// A single structured log event.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub timestamp: SystemTime,
    /// Dotted source tag, e.g. `"driftlight::catalogue"`.
    pub source: String,
    pub message: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogSeverity {
    fn to_log_level(self) -> log::Level {
        match self {
            LogSeverity::Trace => log::Level::Trace,
            LogSeverity::Debug => log::Level::Debug,
            LogSeverity::Info => log::Level::Info,
            LogSeverity::Warn => log::Level::Warn,
            LogSeverity::Error => log::Level::Error,
        }
    }
}

/// Colored stdout logger, installed by default.
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };
        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            println!("[{timestamp}] [{severity_str}] [{source}] {} ({file}:{line})", entry.message);
        } else {
            println!("[{timestamp}] [{severity_str}] [{source}] {}", entry.message);
        }
    }
}

static ACTIVE_LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn active_logger() -> &'static RwLock<Box<dyn Logger>> {
    ACTIVE_LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Install a custom logger, replacing the default colored console logger.
pub fn install_logger(logger: Box<dyn Logger>) {
    if let Ok(mut slot) = active_logger().write() {
        *slot = logger;
    }
}

/// Emit a log entry to the currently installed [`Logger`] and to the
/// standard `log` crate facade.
pub fn emit(severity: LogSeverity, source: &str, message: String, file: Option<&'static str>, line: Option<u32>) {
    log::log!(target: "driftlight", severity.to_log_level(), "[{source}] {message}");

    let entry = LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: source.to_string(),
        message,
        file,
        line,
    };
    if let Ok(logger) = active_logger().read() {
        logger.log(&entry);
    }
}

#[macro_export]
macro_rules! engine_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogSeverity::Trace, $source, format!($($arg)*), None, None)
    };
}

#[macro_export]
macro_rules! engine_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogSeverity::Debug, $source, format!($($arg)*), None, None)
    };
}

#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogSeverity::Info, $source, format!($($arg)*), None, None)
    };
}

#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogSeverity::Warn, $source, format!($($arg)*), None, None)
    };
}

#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogSeverity::Error, $source, format!($($arg)*), Some(file!()), Some(line!()))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CapturingLogger(Arc<Mutex<Vec<LogEntry>>>);
    impl Logger for CapturingLogger {
        fn log(&self, entry: &LogEntry) {
            self.0.lock().unwrap().push(entry.clone());
        }
    }

    #[test]
    fn severities_order_trace_below_error() {
        assert!(LogSeverity::Trace < LogSeverity::Error);
        assert!(LogSeverity::Warn < LogSeverity::Error);
    }

    #[test]
    fn installed_logger_receives_entries() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        install_logger(Box::new(CapturingLogger(captured.clone())));
        emit(LogSeverity::Info, "driftlight::test", "hello".into(), None, None);
        let entries = captured.lock().unwrap();
        assert!(entries.iter().any(|e| e.message == "hello"));
        install_logger(Box::new(DefaultLogger));
    }
}
