//! User-facing failure notifications.
//!
//! Background loads have no caller to return an error to, so failures are
//! reported through a channel the UI drains.

use serde::Serialize;
use tokio::sync::mpsc;
use wsync_core::WsyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A notification about a failed background operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotice {
    pub level: NoticeLevel,
    /// Directory the failure belongs to
    pub directory: String,
    pub title: String,
    pub message: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

/// Sends [`SyncNotice`]s to an optional receiver.
///
/// A notifier without a receiver (or whose receiver was dropped) only logs.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    sender: Option<mpsc::UnboundedSender<SyncNotice>>,
}

impl Notifier {
    pub fn new(sender: mpsc::UnboundedSender<SyncNotice>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Creates a notifier together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A notifier that only logs.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn error(&self, directory: &str, title: &str, error: &WsyncError) {
        tracing::error!("[Notifier] {}: {} ({})", title, error, directory);
        self.send(NoticeLevel::Error, directory, title, error.to_string());
    }

    pub fn warning(&self, directory: &str, title: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("[Notifier] {}: {} ({})", title, message, directory);
        self.send(NoticeLevel::Warning, directory, title, message);
    }

    fn send(&self, level: NoticeLevel, directory: &str, title: &str, message: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        let notice = SyncNotice {
            level,
            directory: directory.to_string(),
            title: title.to_string(),
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        // Receiver gone means nobody is listening anymore.
        let _ = sender.send(notice);
    }
}
