//! The single user-facing notification channel
//!
//! Every failure or noteworthy transition in the core ends up here as a
//! human-readable message with a severity; the outer surface (CLI, GUI)
//! decides how to present it.

use tokio::sync::mpsc;

/// How loudly to present a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// Sending half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn notify(&self, severity: Severity, title: impl Into<String>, message: impl Into<String>) {
        // A closed channel only means the consumer is gone
        let _ = self.sender.send(Notification {
            severity,
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Severity::Info, title, message);
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Severity::Warning, title, message);
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Severity::Error, title, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifications_arrive_in_order() {
        let (notifier, mut receiver) = Notifier::new();
        notifier.info("scan", "found 3 plugins");
        notifier.error("sync", "uv exploded");

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.severity, Severity::Info);
        assert_eq!(first.title, "scan");

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.severity, Severity::Error);
        assert_eq!(second.message, "uv exploded");
    }

    #[test]
    fn dropped_receiver_does_not_panic_senders() {
        let (notifier, receiver) = Notifier::new();
        drop(receiver);
        notifier.warning("late", "nobody is listening");
    }
}
