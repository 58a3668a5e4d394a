use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use alcove_types::{FileRecord, Message, StoreChange};

use crate::error::StoreError;

/// The storage contract both backends satisfy.
///
/// Records are partitioned strictly by token: nothing written under one
/// token is ever visible under another. Appends create fresh records with
/// ids and timestamps assigned at the write site; deletes are idempotent:
/// removing an id that is already gone is a successful no-op.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn list_messages(&self, token: &str) -> Result<Vec<Message>, StoreError>;

    /// Append a message. `ciphertext` is the base64 envelope over the text.
    async fn append_message(
        &self,
        token: &str,
        ciphertext: &str,
        author: &str,
    ) -> Result<Message, StoreError>;

    async fn delete_message(&self, token: &str, id: Uuid) -> Result<(), StoreError>;

    async fn clear_messages(&self, token: &str) -> Result<(), StoreError>;

    async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, StoreError>;

    /// Store a file. `envelope` is the sealed payload; `size_bytes` is the
    /// plaintext size the record will advertise.
    async fn put_file(
        &self,
        token: &str,
        name: &str,
        mime_type: &str,
        size_bytes: u64,
        envelope: Vec<u8>,
        author: &str,
    ) -> Result<FileRecord, StoreError>;

    /// Fetch the sealed payload for a record, wherever it lives.
    async fn get_file_payload(
        &self,
        token: &str,
        record: &FileRecord,
    ) -> Result<Vec<u8>, StoreError>;

    /// Delete a record and release its payload storage.
    async fn delete_file(&self, token: &str, id: Uuid) -> Result<(), StoreError>;

    /// Plaintext upload cap, if this backend has one. Checked by callers
    /// before they spend cycles sealing the payload.
    fn file_size_limit(&self) -> Option<u64> {
        None
    }

    /// Same-device change notifications, for backends that can push them.
    /// `None` means observers rely on polling alone.
    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StoreChange>> {
        None
    }
}
