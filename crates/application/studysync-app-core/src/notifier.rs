use tracing::{error, info, warn};

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing notifications. Only `notify` is required; hosts that can show
/// a persistent loading toast override the rest.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);

    fn notify_loading(&self, _message: &str) -> Option<NotificationId> {
        None
    }

    fn update_to_success(&self, _id: NotificationId, _message: &str) {}

    fn update_to_error(&self, _id: NotificationId, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _level: NotifyLevel, _message: &str) {}
}

/// Forwards notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info | NotifyLevel::Success => info!("{message}"),
            NotifyLevel::Warning => warn!("{message}"),
            NotifyLevel::Error => error!("{message}"),
        }
    }
}
