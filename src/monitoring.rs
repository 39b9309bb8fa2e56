//! Host-facing alert channel.
//!
//! Failures that make a coordination primitive unusable (relay link down,
//! lock store unreachable) are surfaced here instead of being raised across
//! the plugin boundary. The host owns the receiving end and feeds it into
//! its own fatal-error path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Error => write!(f, "ERROR"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub source: String,
    pub message: String,
}

/// Sending half of the alert channel, cloned into every coordination
/// component at construction time.
#[derive(Debug, Clone)]
pub struct AlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl AlertSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, level: AlertLevel, source: &str, message: impl Into<String>) {
        let alert = Alert {
            timestamp: Utc::now(),
            level,
            source: source.to_string(),
            message: message.into(),
        };
        // The host may have dropped the receiver; the log stream still
        // carries the event.
        let _ = self.tx.send(alert);
    }

    /// Report a condition that leaves the component unable to coordinate.
    pub fn fatal(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        error!(source, %message, "fatal coordination failure");
        self.emit(AlertLevel::Critical, source, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fatal_reaches_the_host_receiver() {
        let (sink, mut rx) = AlertSink::channel();
        sink.fatal("test_component", "store went away");

        let alert = rx.recv().await.expect("alert was not delivered");
        assert_eq!(alert.level, AlertLevel::Critical);
        assert_eq!(alert.source, "test_component");
        assert_eq!(alert.message, "store went away");
    }

    #[tokio::test]
    async fn emit_without_receiver_does_not_panic() {
        let (sink, rx) = AlertSink::channel();
        drop(rx);
        sink.emit(AlertLevel::Warning, "test_component", "nobody listening");
    }
}
