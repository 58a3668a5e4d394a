use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use alcove_crypto::{CryptoError, SymmetricKey, derive_key, open, seal};
use alcove_store::{
    ChangeHub, KeyValueStore, LocalBackend, RemoteBackend, SqliteKv, StorageBackend, StoreError,
};
use alcove_types::{FileRecord, Message};

use crate::config::Config;
use crate::error::SessionError;
use crate::invite::{self, PortalTab};
use crate::sync::{Snapshot, SyncEngine, SyncEvent};

/// Device key under which the last-used token is kept for auto-resume.
const RESUME_KEY: &str = "alcove.session.token";

/// Where the session stands. `Authenticating` is visible to observers while
/// key derivation runs on the blocking pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

struct ActiveSession {
    token: String,
    key: SymmetricKey,
    engine: Arc<SyncEngine>,
    poll_task: JoinHandle<()>,
    listener_task: Option<JoinHandle<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        // In-flight work is abandoned, not drained: reads are idempotent
        // and writes are already durable.
        self.poll_task.abort();
        if let Some(task) = &self.listener_task {
            task.abort();
        }
    }
}

enum Inner {
    Unauthenticated,
    Authenticating,
    Authenticated(ActiveSession),
}

/// Owns the token lifecycle and the backend chosen at construction.
///
/// The backend decision is one-time: whoever builds the manager picks
/// remote or device mode, and it holds for the life of the process.
pub struct SessionManager {
    backend: Arc<dyn StorageBackend>,
    device: Arc<dyn KeyValueStore>,
    poll_interval: Duration,
    inner: RwLock<Inner>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        device: Arc<dyn KeyValueStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            device,
            poll_interval,
            inner: RwLock::new(Inner::Unauthenticated),
        }
    }

    /// Wire up from configuration: remote store when one is configured,
    /// otherwise the device database (which then also carries the session
    /// lists). The device store always exists; auto-resume needs it.
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let device: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKv::open(&config.data_dir.join("alcove.db"))?);

        let backend: Arc<dyn StorageBackend> = match &config.remote {
            Some(remote) => {
                info!("Using shared remote store at {}", remote.base_url);
                Arc::new(RemoteBackend::new(remote.clone())?)
            }
            None => {
                info!("No remote store configured; records stay on this device");
                Arc::new(LocalBackend::new(device.clone(), Some(ChangeHub::new())))
            }
        };

        Ok(Self::new(backend, device, config.poll_interval))
    }

    pub async fn state(&self) -> SessionState {
        match &*self.inner.read().await {
            Inner::Unauthenticated => SessionState::Unauthenticated,
            Inner::Authenticating => SessionState::Authenticating,
            Inner::Authenticated(_) => SessionState::Authenticated,
        }
    }

    /// Enter the session behind `token`.
    ///
    /// Derives the key (on the blocking pool, since PBKDF2 is deliberately slow), saves
    /// the auto-resume record, runs the first refresh, and starts the poll.
    /// A failed derivation drops back to `Unauthenticated` with the typed
    /// error; an unreachable backend does *not* fail login; the next tick
    /// retries.
    pub async fn login(&self, token: &str) -> Result<(), SessionError> {
        *self.inner.write().await = Inner::Authenticating;

        let owned = token.to_string();
        let key = match tokio::task::spawn_blocking(move || derive_key(&owned)).await {
            Ok(Ok(key)) => key,
            Ok(Err(e)) => {
                *self.inner.write().await = Inner::Unauthenticated;
                return Err(e.into());
            }
            Err(e) => {
                *self.inner.write().await = Inner::Unauthenticated;
                return Err(SessionError::Internal(e.to_string()));
            }
        };

        if let Err(e) = self.device.set(RESUME_KEY, token) {
            *self.inner.write().await = Inner::Unauthenticated;
            return Err(e.into());
        }

        let engine = SyncEngine::new(self.backend.clone(), token.to_string());
        if let Err(e) = engine.refresh().await {
            warn!("Initial refresh failed, continuing with empty view: {}", e);
        }
        let poll_task = engine.clone().spawn_poll(self.poll_interval);
        let listener_task = engine.clone().spawn_change_listener();

        *self.inner.write().await = Inner::Authenticated(ActiveSession {
            token: token.to_string(),
            key,
            engine,
            poll_task,
            listener_task,
        });
        info!("Session joined");
        Ok(())
    }

    /// Re-enter the last session if the device remembers one. Returns
    /// whether a session was resumed.
    pub async fn resume(&self) -> Result<bool, SessionError> {
        match self.device.get(RESUME_KEY)? {
            Some(token) => {
                self.login(&token).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Leave the session: stop polling, forget key and token, clear the
    /// auto-resume record. Shared records are untouched; leaving is never
    /// destructive.
    pub async fn logout(&self) -> Result<(), SessionError> {
        *self.inner.write().await = Inner::Unauthenticated;
        self.device.remove(RESUME_KEY)?;
        info!("Session left");
        Ok(())
    }

    async fn active(&self) -> Result<(String, SymmetricKey, Arc<SyncEngine>), SessionError> {
        match &*self.inner.read().await {
            Inner::Authenticated(session) => Ok((
                session.token.clone(),
                session.key.clone(),
                session.engine.clone(),
            )),
            _ => Err(SessionError::NotAuthenticated),
        }
    }

    /// Current view state (ciphertext-bearing records).
    pub async fn snapshot(&self) -> Result<Snapshot, SessionError> {
        let (_, _, engine) = self.active().await?;
        Ok(engine.snapshot().await)
    }

    /// Events fired whenever the view state changes.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<SyncEvent>, SessionError> {
        let (_, _, engine) = self.active().await?;
        Ok(engine.subscribe())
    }

    /// Encrypt and persist a message, then refresh so the sender sees it
    /// without waiting for the next tick.
    pub async fn send_message(&self, author: &str, text: &str) -> Result<Message, SessionError> {
        let (token, key, engine) = self.active().await?;

        let envelope = seal(&key, text.as_bytes())?;
        let message = self
            .backend
            .append_message(&token, &BASE64.encode(envelope), author)
            .await?;

        Self::refresh_after_write(&engine).await;
        Ok(message)
    }

    /// Encrypt and persist a file. The device-mode size cap is checked
    /// before sealing so an oversize payload costs no crypto work.
    pub async fn upload_file(
        &self,
        author: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<FileRecord, SessionError> {
        let (token, key, engine) = self.active().await?;

        let size = bytes.len() as u64;
        if let Some(limit) = self.backend.file_size_limit() {
            if size > limit {
                return Err(StoreError::OversizeFile { size, limit }.into());
            }
        }

        let envelope = seal(&key, bytes)?;
        let record = self
            .backend
            .put_file(&token, name, mime_type, size, envelope, author)
            .await?;

        Self::refresh_after_write(&engine).await;
        Ok(record)
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<(), SessionError> {
        let (token, _, engine) = self.active().await?;
        self.backend.delete_message(&token, id).await?;
        Self::refresh_after_write(&engine).await;
        Ok(())
    }

    pub async fn clear_messages(&self) -> Result<(), SessionError> {
        let (token, _, engine) = self.active().await?;
        self.backend.clear_messages(&token).await?;
        Self::refresh_after_write(&engine).await;
        Ok(())
    }

    pub async fn delete_file(&self, id: Uuid) -> Result<(), SessionError> {
        let (token, _, engine) = self.active().await?;
        self.backend.delete_file(&token, id).await?;
        Self::refresh_after_write(&engine).await;
        Ok(())
    }

    /// Decrypt one message for display. Failure is per-item: a corrupted
    /// message renders as an error, everything else stays readable.
    pub async fn read_message(&self, message: &Message) -> Result<String, SessionError> {
        let (_, key, _) = self.active().await?;

        let envelope = BASE64
            .decode(&message.ciphertext)
            .map_err(|_| CryptoError::Decryption)?;
        let plaintext = open(&key, &envelope)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption.into())
    }

    /// Fetch and decrypt one file payload.
    pub async fn download_file(&self, record: &FileRecord) -> Result<Vec<u8>, SessionError> {
        let (token, key, _) = self.active().await?;
        let envelope = self.backend.get_file_payload(&token, record).await?;
        Ok(open(&key, &envelope)?)
    }

    /// Build an invite link for the current session.
    pub async fn invite(&self, app_base: &Url, tab: PortalTab) -> Result<String, SessionError> {
        let (token, _, _) = self.active().await?;
        Ok(invite::encode(app_base, &token, tab))
    }

    /// The post-write refresh reflects the caller's own mutation. The write
    /// itself already succeeded, so a refresh failure only logs.
    async fn refresh_after_write(engine: &Arc<SyncEngine>) {
        if let Err(e) = engine.refresh().await {
            warn!("Post-write refresh failed: {}", e);
        }
    }
}
