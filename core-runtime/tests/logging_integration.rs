//! Integration tests for logging system
//!
//! `init_logging` installs a process-global subscriber, so this binary holds a
//! single test that exercises it.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn test_init_logging_mirrors_to_sink_once() {
    let sink = Arc::new(CollectingSink::default());

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).expect("first init succeeds");

    // Outside a runtime the sink is fed synchronously.
    tracing::info!(target: "core_sync::item", skin = "ac:7/car/team_a", "State changed");
    tracing::debug!(target: "hyper::proto", "ignored dependency chatter");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "State changed");
        assert_eq!(
            entries[0].fields.get("skin"),
            Some(&"ac:7/car/team_a".to_string())
        );
    }

    // A second global subscriber is refused.
    assert!(init_logging(config).is_err());
}
