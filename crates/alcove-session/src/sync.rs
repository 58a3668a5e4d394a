use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use alcove_store::{StorageBackend, StoreError};
use alcove_types::{FileRecord, Message, StoreChange};

/// Capacity of the per-engine event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// What the last successful refresh saw. Records still carry ciphertext;
/// decryption happens per item at render/download time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub files: Vec<FileRecord>,
}

/// Fired after every applied snapshot change.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Updated { messages: usize, files: usize },
}

/// Periodic reconciliation between the backend and in-memory view state.
///
/// `refresh` fully replaces the snapshot with whatever the backend reports:
/// last refresh wins, no merging. Concurrent refreshes are ordered by a
/// sequence number taken at start: a slower, earlier-started refresh that
/// completes after a newer one has applied is discarded, so a mutation's
/// own post-write refresh can never be clobbered by a stale periodic tick.
pub struct SyncEngine {
    backend: Arc<dyn StorageBackend>,
    token: String,
    snapshot: RwLock<Snapshot>,
    /// Sequence source; each refresh takes the next number when it starts.
    seq: AtomicU64,
    /// Highest sequence applied so far. Guarded by the snapshot lock.
    applied: AtomicU64,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, token: String) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            token,
            snapshot: RwLock::new(Snapshot::default()),
            seq: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            events,
        })
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Fetch both lists and replace the snapshot. On failure the previous
    /// snapshot stays visible and the error propagates to the caller.
    pub async fn refresh(&self) -> Result<Snapshot, StoreError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let (messages, files) = tokio::join!(
            self.backend.list_messages(&self.token),
            self.backend.list_files(&self.token),
        );
        let snapshot = Snapshot {
            messages: messages?,
            files: files?,
        };

        let mut current = self.snapshot.write().await;
        if seq <= self.applied.load(Ordering::SeqCst) {
            debug!("Discarding refresh #{seq}: a newer result already applied");
            return Ok(current.clone());
        }
        self.applied.store(seq, Ordering::SeqCst);
        *current = snapshot.clone();
        let _ = self.events.send(SyncEvent::Updated {
            messages: current.messages.len(),
            files: current.files.len(),
        });
        Ok(snapshot)
    }

    /// Apply a pushed change from a same-device writer. The event carries
    /// the full new list, so no read round-trip is needed.
    async fn apply_change(&self, change: StoreChange) {
        if change.token() != self.token {
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut current = self.snapshot.write().await;
        if seq <= self.applied.load(Ordering::SeqCst) {
            return;
        }
        self.applied.store(seq, Ordering::SeqCst);
        match change {
            StoreChange::Messages { messages, .. } => current.messages = messages,
            StoreChange::Files { files, .. } => current.files = files,
        }
        let _ = self.events.send(SyncEvent::Updated {
            messages: current.messages.len(),
            files: current.files.len(),
        });
    }

    /// Start the periodic poll. The initial login-time refresh has already
    /// run by the time this is called, so the first tick is consumed here
    /// and the loop settles into a fixed cadence.
    pub fn spawn_poll(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!("Periodic refresh failed: {}", e);
                }
            }
        })
    }

    /// Start the change listener, if the backend can push at all.
    pub fn spawn_change_listener(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let mut changes = self.backend.subscribe_changes()?;
        Some(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => self.apply_change(change).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Change listener lagged by {} events; resyncing", missed);
                        if let Err(e) = self.refresh().await {
                            warn!("Resync after lag failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}
