//! Permission-gated user notifications.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    Unsupported,
}

pub trait Notifier {
    fn notify(&self, title: &str, body: &str);
}

/// Wraps a notifier; sends nothing unless permission was granted.
pub struct NotificationChannel {
    permission: Permission,
    notifier: Box<dyn Notifier>,
}

impl NotificationChannel {
    pub fn new(permission: Permission, notifier: Box<dyn Notifier>) -> Self {
        Self {
            permission,
            notifier,
        }
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn set_permission(&mut self, permission: Permission) {
        self.permission = permission;
    }

    pub fn send(&self, title: &str, body: &str) {
        if self.permission == Permission::Granted {
            self.notifier.notify(title, body);
        } else {
            tracing::trace!(title, permission = ?self.permission, "notification suppressed");
        }
    }
}

pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _body: &str) {}
}

/// Bell + one line on stderr.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, title: &str, body: &str) {
        eprintln!("\x07\r\x1b[2K[{title}] {body}");
    }
}

/// Keeps every notification; used by tests and dry runs.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().map(|(t, _)| t).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((title.to_string(), body.to_string()));
    }
}
