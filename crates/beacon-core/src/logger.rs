//! Leveled, scoped logger.
//!
//! Thin wrapper over `tracing` so the rest of the crate can gate on a single
//! [`LogLevel`] the way a caller configures it (`silent | error | info |
//! debug`), instead of relying on the process-wide `tracing` subscriber
//! filter alone. Kernel and Hub attach a scope label (client id, room, peer
//! address) to every call, mirroring how the teacher's server driver tags
//! `tracing` calls with `session_id`/`room_id` fields.

use std::fmt;

/// Logging verbosity, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// No output at all.
    Silent,
    /// Only errors.
    Error,
    /// Errors and informational messages.
    #[default]
    Info,
    /// Everything, including per-dispatch tracing.
    Debug,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "error" => Ok(Self::Error),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// A leveled logger optionally scoped to a client, room, or peer.
#[derive(Debug, Clone)]
pub struct Logger {
    level: LogLevel,
    scope: Option<String>,
}

impl Logger {
    /// Create a logger at the given level with no scope.
    pub fn new(level: LogLevel) -> Self {
        Self { level, scope: None }
    }

    /// Current verbosity.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Derive a logger scoped to `label`, inheriting this logger's level.
    pub fn scoped(&self, label: impl fmt::Display) -> Self {
        Self { level: self.level, scope: Some(label.to_string()) }
    }

    /// Log at `error` level.
    pub fn error(&self, message: impl fmt::Display) {
        if self.level >= LogLevel::Error {
            match &self.scope {
                Some(scope) => tracing::error!(scope = %scope, "{message}"),
                None => tracing::error!("{message}"),
            }
        }
    }

    /// Log at `info` level.
    pub fn info(&self, message: impl fmt::Display) {
        if self.level >= LogLevel::Info {
            match &self.scope {
                Some(scope) => tracing::info!(scope = %scope, "{message}"),
                None => tracing::info!("{message}"),
            }
        }
    }

    /// Log at `debug` level.
    pub fn debug(&self, message: impl fmt::Display) {
        if self.level >= LogLevel::Debug {
            match &self.scope {
                Some(scope) => tracing::debug!(scope = %scope, "{message}"),
                None => tracing::debug!("{message}"),
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!("silent".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn ordering_gates_calls() {
        assert!(LogLevel::Debug > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Error);
        assert!(LogLevel::Error > LogLevel::Silent);
    }

    #[test]
    fn scoped_preserves_level() {
        let logger = Logger::new(LogLevel::Debug).scoped("client-1");
        assert_eq!(logger.level(), LogLevel::Debug);
    }
}
