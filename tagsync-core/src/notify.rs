//! Notification sink consumed by the engines.

use crate::identity::Timestamp;
use chrono::Utc;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Error,
    /// Success message that the UI may dismiss on its own after a moment.
    SuccessVanish,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: Timestamp,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Where engines report transient, user facing outcomes.
pub trait Notifier: Send + Sync {
    fn add_error(&self, message: &str);
    fn add_success_vanish(&self, message: &str);
}

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(notification);
        }
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(NotificationLevel::Error)
    }

    pub fn successes(&self) -> Vec<String> {
        self.messages(NotificationLevel::SuccessVanish)
    }

    fn messages(&self, level: NotificationLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Notifier for NotificationLog {
    fn add_error(&self, message: &str) {
        self.push(Notification::new(NotificationLevel::Error, message));
    }

    fn add_success_vanish(&self, message: &str) {
        self.push(Notification::new(NotificationLevel::SuccessVanish, message));
    }
}

/// Notifier that forwards to `tracing`, for headless consumers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn add_error(&self, message: &str) {
        tracing::error!(target: "tagsync::notify", "{}", message);
    }

    fn add_success_vanish(&self, message: &str) {
        tracing::info!(target: "tagsync::notify", "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_separates_levels() {
        let log = NotificationLog::new();
        log.add_error("boom");
        log.add_success_vanish("saved");
        log.add_error("again");
        assert_eq!(log.errors(), vec!["boom".to_string(), "again".to_string()]);
        assert_eq!(log.successes(), vec!["saved".to_string()]);
        log.clear();
        assert!(log.entries().is_empty());
    }
}
