//! Clock and host log forwarding.
//!
//! The pipeline stamps `completed_at` through a [`Clock`] so tests can pin
//! it. [`LoggerSink`] is the hook a desktop shell implements to mirror engine
//! logs into its own log pane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Source of "now" for completion stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Severity of a forwarded log line, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One log line as handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_sync::pipeline`.
    pub target: String,
    pub message: String,
    /// Structured fields; credentials are already redacted when the
    /// subscriber was configured to do so.
    pub fields: HashMap<String, String>,
    /// Name of the innermost active span (`fetch_item`, `restore_backup`...).
    pub span_id: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span_id: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Host-side receiver of engine log lines.
///
/// Called from a tokio task per event; implementations must not block.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Entries below this level are dropped before formatting.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PinnedClock(DateTime<Utc>);

    impl Clock for PinnedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_pinned_clock_through_trait_object() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock: Box<dyn Clock> = Box::new(PinnedClock(at));
        assert_eq!(clock.now(), at);
        assert!(SystemClock.now() > at);
    }

    #[test]
    fn test_log_levels_are_ordered_by_severity() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(
            [LogLevel::Error, LogLevel::Info, LogLevel::Trace].iter().max(),
            Some(&LogLevel::Error)
        );
    }

    #[test]
    fn test_log_entry_fields() {
        let entry = LogEntry::new(LogLevel::Warn, "core_sync::pipeline", "extraction failed")
            .with_field("skin", "ks_porsche/team_a")
            .with_field("kind", "Extraction");

        assert_eq!(entry.target, "core_sync::pipeline");
        assert_eq!(entry.field("skin"), Some("ks_porsche/team_a"));
        assert_eq!(entry.field("kind"), Some("Extraction"));
        assert_eq!(entry.field("missing"), None);
        assert!(entry.span_id.is_none());
    }
}
