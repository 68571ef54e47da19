//! Tunables for publishing and synchronization.

/// Limits applied by [`Publisher`](crate::publish::Publisher) and
/// [`Synchronizer`](crate::mailbox::Synchronizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound on passes over the work queue in one synchronization call.
    ///
    /// Every pass drains at least one slot per queued participant, so this
    /// also bounds how many items one participant can deliver per call.
    pub max_passes: usize,

    /// Occupied outbound slots a publisher skips before giving up.
    pub max_slot_skips: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { max_passes: 1024, max_slot_skips: 16 }
    }
}
