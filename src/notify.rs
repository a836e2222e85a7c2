use log::info;

/// Fire-and-forget notification collaborator.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Default notifier: writes notifications to the application log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!("{}: {}", title, message);
    }
}

/// Used when notifications are disabled in the configuration.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}
