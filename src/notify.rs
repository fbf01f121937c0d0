use tracing::debug;

/// Outbound signal that a group's balances may have changed.
///
/// Real-time delivery to connected clients lives outside this service; an
/// adapter for it implements this trait and gets called after every write
/// that can move a balance.
pub trait ChangeNotifier: Send + Sync {
    fn balances_changed(&self, group_id: &str);
}

/// Default notifier: the signal only shows up in the log.
pub struct LogNotifier;

impl ChangeNotifier for LogNotifier {
    fn balances_changed(&self, group_id: &str) {
        debug!(group = %group_id, "balances changed");
    }
}
