//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// The global subscriber can only be installed once per process, so every
// assertion that depends on it lives in this one test.
#[test]
fn test_global_logging_forwards_redacted_events_to_sink() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).expect("first initialization succeeds");

    tracing::info!(
        target: "core_auth::manager",
        refresh_token = "r-should-not-leak",
        status = 401u64,
        "Refresh rejected"
    );
    tracing::debug!(target: "hyper::proto", "filtered out by default directives");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.message, "Refresh rejected");
        assert_eq!(entry.fields.get("refresh_token").map(String::as_str), Some("[REDACTED]"));
        assert_eq!(entry.fields.get("status").map(String::as_str), Some("401"));
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_pii_redaction_tokens() {
    assert_eq!(redact_if_sensitive("access_token", "eyJhbGciOi"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "r-1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("jwt_token", "eyJ"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("new_password", "hunter2"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("email", "user@example.com");

    assert!(redacted.starts_with('u'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("operation", "logout"), "logout");
    assert_eq!(redact_if_sensitive("username", "alice"), "alice");
    assert_eq!(redact_if_sensitive("reason", "cross_tab"), "cross_tab");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(true)
        .with_target(false);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(config.enable_spans);
    assert!(!config.display_target);
}
