use tokio::sync::broadcast;

use alcove_types::StoreChange;

/// Capacity of the change broadcast channel. Observers that fall this far
/// behind miss events and resync on the next poll tick.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Fan-out point for device-local store changes.
///
/// Every open view of the same device store ("tab", in the original sense)
/// shares one hub: a write in any of them is pushed to all the others. This
/// is the only push channel in the system and never crosses a device
/// boundary.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    /// Publish a change to all current subscribers. Nobody listening is fine.
    pub fn publish(&self, change: StoreChange) {
        let _ = self.tx.send(change);
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
