use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::error;

/// Operator-facing sink for observed errors.
///
/// Called from connector threads; implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, label: &str, error: &str, title: &str);
}

/// Writes every notification to the tracing log at ERROR level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, label: &str, error: &str, title: &str) {
        error!(title = %title, label = %label, "{error}");
    }
}

/// Discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _label: &str, _error: &str, _title: &str) {}
}

/// A notification captured by `ChannelNotifier`.
#[derive(Debug, Clone)]
pub struct Alert {
    pub label: String,
    pub error: String,
    pub title: String,
    pub at: DateTime<Utc>,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}{}", self.title, self.label, self.error)
    }
}

/// Forwards notifications to a channel consumer (alert forwarder, dashboard).
///
/// Unbounded so a slow consumer never stalls the connector; alerts are
/// dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, label: &str, error: &str, title: &str) {
        let _ = self.tx.send(Alert {
            label: label.to_string(),
            error: error.to_string(),
            title: title.to_string(),
            at: Utc::now(),
        });
    }
}
