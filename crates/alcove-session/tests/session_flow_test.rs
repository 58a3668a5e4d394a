//! End-to-end session scenarios over the device backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use uuid::Uuid;

use alcove_crypto::CryptoError;
use alcove_session::{PortalTab, SessionError, SessionManager, SessionState, SyncEngine, invite};
use alcove_store::{ChangeHub, LocalBackend, MemoryKv, StorageBackend, StoreError};
use alcove_types::{FileRecord, Message, StoreChange};

const TOKEN: &str = "abc12345";

fn device_backend() -> (Arc<MemoryKv>, ChangeHub, Arc<LocalBackend>) {
    let kv = Arc::new(MemoryKv::new());
    let hub = ChangeHub::new();
    let backend = Arc::new(LocalBackend::new(kv.clone(), Some(hub.clone())));
    (kv, hub, backend)
}

fn manager(backend: Arc<LocalBackend>, device: Arc<MemoryKv>) -> SessionManager {
    // Long poll so tests exercise explicit refreshes and pushes, not timing.
    SessionManager::new(backend, device, Duration::from_secs(60))
}

#[tokio::test]
async fn session_round_trip() {
    let (kv, _hub, backend) = device_backend();
    let manager = manager(backend, kv);

    manager.login(TOKEN).await.unwrap();
    assert_eq!(manager.state().await, SessionState::Authenticated);

    manager.send_message("ari", "hello").await.unwrap();

    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(
        manager.read_message(&snapshot.messages[0]).await.unwrap(),
        "hello"
    );
    assert_eq!(snapshot.messages[0].author, "ari");
}

#[tokio::test]
async fn weak_token_is_rejected_and_state_resets() {
    let (kv, _hub, backend) = device_backend();
    let manager = manager(backend, kv);

    let result = manager.login("short").await;
    assert!(matches!(
        result,
        Err(SessionError::Crypto(CryptoError::WeakToken { .. }))
    ));
    assert_eq!(manager.state().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn operations_require_authentication() {
    let (kv, _hub, backend) = device_backend();
    let manager = manager(backend, kv);

    let result = manager.send_message("ari", "hello").await;
    assert!(matches!(result, Err(SessionError::NotAuthenticated)));
    assert!(matches!(
        manager.snapshot().await,
        Err(SessionError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn oversize_local_upload_is_rejected_without_a_record() {
    let (kv, _hub, backend) = device_backend();
    let manager = manager(backend, kv);
    manager.login(TOKEN).await.unwrap();

    let six_megabytes = vec![0u8; 6 * 1024 * 1024];
    let result = manager
        .upload_file("ari", "big.bin", "application/octet-stream", &six_megabytes)
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Store(StoreError::OversizeFile { .. }))
    ));
    assert!(manager.snapshot().await.unwrap().files.is_empty());
}

#[tokio::test]
async fn file_upload_download_round_trip() {
    let (kv, _hub, backend) = device_backend();
    let manager = manager(backend, kv);
    manager.login(TOKEN).await.unwrap();

    let content = b"PDF bytes, allegedly".to_vec();
    let record = manager
        .upload_file("ari", "plan.pdf", "application/pdf", &content)
        .await
        .unwrap();
    assert_eq!(record.size_bytes, content.len() as u64);

    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.files.len(), 1);
    assert_eq!(
        manager.download_file(&snapshot.files[0]).await.unwrap(),
        content
    );

    manager.delete_file(record.id).await.unwrap();
    assert!(manager.snapshot().await.unwrap().files.is_empty());
}

#[tokio::test]
async fn undecryptable_message_fails_alone() {
    let (kv, _hub, backend) = device_backend();

    // A record someone wrote with a different key still lists fine; only
    // reading it fails.
    backend
        .append_message(TOKEN, "bm90IGEgcmVhbCBlbnZlbG9wZQ==", "mallory")
        .await
        .unwrap();

    let manager = manager(backend, kv);
    manager.login(TOKEN).await.unwrap();
    manager.send_message("ari", "hello").await.unwrap();

    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.messages.len(), 2);

    let mut readable = 0;
    let mut failed = 0;
    for message in &snapshot.messages {
        match manager.read_message(message).await {
            Ok(text) => {
                assert_eq!(text, "hello");
                readable += 1;
            }
            Err(SessionError::Crypto(_)) => failed += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((readable, failed), (1, 1));
}

#[tokio::test]
async fn cross_tab_propagation_without_refresh() {
    let kv = Arc::new(MemoryKv::new());
    let hub = ChangeHub::new();
    let tab1 = Arc::new(LocalBackend::new(kv.clone(), Some(hub.clone())));
    let tab2 = Arc::new(LocalBackend::new(kv.clone(), Some(hub.clone())));

    let manager1 = manager(tab1, kv.clone());
    let manager2 = manager(tab2, kv.clone());
    manager1.login(TOKEN).await.unwrap();
    manager2.login(TOKEN).await.unwrap();

    let mut events = manager2.subscribe().await.unwrap();
    manager1.send_message("ari", "ping across tabs").await.unwrap();

    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no cross-tab event arrived")
        .unwrap();

    // Tab 2 never called refresh; the pushed list is already in its view.
    let snapshot = manager2.snapshot().await.unwrap();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(
        manager2.read_message(&snapshot.messages[0]).await.unwrap(),
        "ping across tabs"
    );
}

#[tokio::test]
async fn invite_round_trip_from_session() {
    let (kv, _hub, backend) = device_backend();
    let manager = manager(backend, kv);
    manager.login(TOKEN).await.unwrap();

    let base = url::Url::parse("https://alcove.example/app").unwrap();
    let link = manager.invite(&base, PortalTab::Files).await.unwrap();

    let decoded = invite::decode(&link).unwrap();
    assert_eq!(decoded.token, TOKEN);
    assert_eq!(decoded.tab, PortalTab::Files);
}

#[tokio::test]
async fn auto_resume_and_non_destructive_logout() {
    let kv = Arc::new(MemoryKv::new());
    let hub = ChangeHub::new();
    let backend = Arc::new(LocalBackend::new(kv.clone(), Some(hub)));

    let first = manager(backend.clone(), kv.clone());
    first.login(TOKEN).await.unwrap();
    first.send_message("ari", "persists").await.unwrap();

    // A fresh manager over the same device picks the session back up.
    let second = manager(backend.clone(), kv.clone());
    assert!(second.resume().await.unwrap());
    assert_eq!(second.state().await, SessionState::Authenticated);
    assert_eq!(second.snapshot().await.unwrap().messages.len(), 1);

    // Logout forgets the device record but deletes nothing shared.
    second.logout().await.unwrap();
    assert_eq!(second.state().await, SessionState::Unauthenticated);

    let third = manager(backend.clone(), kv.clone());
    assert!(!third.resume().await.unwrap());
    assert_eq!(backend.list_messages(TOKEN).await.unwrap().len(), 1);
}

#[tokio::test]
async fn messages_partition_by_token() {
    let kv = Arc::new(MemoryKv::new());
    let hub = ChangeHub::new();
    let backend = Arc::new(LocalBackend::new(kv.clone(), Some(hub)));

    let ours = manager(backend.clone(), kv.clone());
    ours.login(TOKEN).await.unwrap();
    ours.send_message("ari", "ours alone").await.unwrap();
    ours.logout().await.unwrap();

    let theirs = manager(backend, kv);
    theirs.login("zzz98765").await.unwrap();
    assert!(theirs.snapshot().await.unwrap().messages.is_empty());
}

/// Wrapper that holds list results for a configurable delay, for driving
/// the slow-refresh-loses race.
struct DelayedBackend {
    inner: Arc<LocalBackend>,
    delay_ms: AtomicU64,
}

impl DelayedBackend {
    fn new(inner: Arc<LocalBackend>) -> Self {
        Self {
            inner,
            delay_ms: AtomicU64::new(0),
        }
    }

    async fn stall(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl StorageBackend for DelayedBackend {
    async fn list_messages(&self, token: &str) -> Result<Vec<Message>, StoreError> {
        let listed = self.inner.list_messages(token).await;
        self.stall().await;
        listed
    }

    async fn append_message(
        &self,
        token: &str,
        ciphertext: &str,
        author: &str,
    ) -> Result<Message, StoreError> {
        self.inner.append_message(token, ciphertext, author).await
    }

    async fn delete_message(&self, token: &str, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_message(token, id).await
    }

    async fn clear_messages(&self, token: &str) -> Result<(), StoreError> {
        self.inner.clear_messages(token).await
    }

    async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.inner.list_files(token).await
    }

    async fn put_file(
        &self,
        token: &str,
        name: &str,
        mime_type: &str,
        size_bytes: u64,
        envelope: Vec<u8>,
        author: &str,
    ) -> Result<FileRecord, StoreError> {
        self.inner
            .put_file(token, name, mime_type, size_bytes, envelope, author)
            .await
    }

    async fn get_file_payload(
        &self,
        token: &str,
        record: &FileRecord,
    ) -> Result<Vec<u8>, StoreError> {
        self.inner.get_file_payload(token, record).await
    }

    async fn delete_file(&self, token: &str, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_file(token, id).await
    }

    fn subscribe_changes(&self) -> Option<tokio::sync::broadcast::Receiver<StoreChange>> {
        None
    }
}

#[tokio::test]
async fn slow_periodic_refresh_cannot_clobber_newer_result() {
    let kv = Arc::new(MemoryKv::new());
    let local = Arc::new(LocalBackend::new(kv, None));
    let delayed = Arc::new(DelayedBackend::new(local.clone()));
    let engine = SyncEngine::new(delayed.clone(), TOKEN.to_string());

    engine.refresh().await.unwrap();

    // A periodic-style refresh reads the (empty) list, then stalls.
    delayed.delay_ms.store(300, Ordering::SeqCst);
    let slow = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Meanwhile a mutation lands and its own refresh applies.
    delayed.delay_ms.store(0, Ordering::SeqCst);
    local
        .append_message(TOKEN, "c2VhbGVk", "ari")
        .await
        .unwrap();
    engine.refresh().await.unwrap();
    assert_eq!(engine.snapshot().await.messages.len(), 1);

    // The stale result finishes last and is discarded.
    slow.await.unwrap().unwrap();
    assert_eq!(engine.snapshot().await.messages.len(), 1);
}
