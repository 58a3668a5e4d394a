use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use alcove_types::{FileRecord, Message, PayloadRef, StoreChange};

use crate::backend::StorageBackend;
use crate::error::StoreError;
use crate::hub::ChangeHub;
use crate::kv::KeyValueStore;

/// Device-mode plaintext upload cap. The key-value medium underneath has
/// practical size ceilings; uploads past this are rejected up front.
pub const LOCAL_FILE_LIMIT: u64 = 5 * 1024 * 1024;

/// Backend over per-device key-value storage.
///
/// Each token partition is one serialized list per data kind:
/// `alcove.messages.<token>` and `alcove.files.<token>`. File payloads are
/// stored inline in the record. Every list rewrite is published on the
/// change hub so other views of the same device store converge without a
/// poll round-trip.
pub struct LocalBackend {
    kv: Arc<dyn KeyValueStore>,
    hub: Option<ChangeHub>,
}

impl LocalBackend {
    pub fn new(kv: Arc<dyn KeyValueStore>, hub: Option<ChangeHub>) -> Self {
        Self { kv, hub }
    }

    fn messages_key(token: &str) -> String {
        format!("alcove.messages.{token}")
    }

    fn files_key(token: &str) -> String {
        format!("alcove.files.{token}")
    }

    fn load_messages(&self, token: &str) -> Result<Vec<Message>, StoreError> {
        match self.kv.get(&Self::messages_key(token))? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn store_messages(&self, token: &str, messages: &[Message]) -> Result<(), StoreError> {
        self.kv
            .set(&Self::messages_key(token), &serde_json::to_string(messages)?)?;
        if let Some(hub) = &self.hub {
            hub.publish(StoreChange::Messages {
                token: token.to_string(),
                messages: messages.to_vec(),
            });
        }
        Ok(())
    }

    fn load_files(&self, token: &str) -> Result<Vec<FileRecord>, StoreError> {
        match self.kv.get(&Self::files_key(token))? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn store_files(&self, token: &str, files: &[FileRecord]) -> Result<(), StoreError> {
        self.kv
            .set(&Self::files_key(token), &serde_json::to_string(files)?)?;
        if let Some(hub) = &self.hub {
            hub.publish(StoreChange::Files {
                token: token.to_string(),
                files: files.to_vec(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn list_messages(&self, token: &str) -> Result<Vec<Message>, StoreError> {
        self.load_messages(token)
    }

    async fn append_message(
        &self,
        token: &str,
        ciphertext: &str,
        author: &str,
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::new_v4(),
            ciphertext: ciphertext.to_string(),
            author: author.to_string(),
            sent_at: Utc::now(),
        };

        let mut messages = self.load_messages(token)?;
        messages.push(message.clone());
        self.store_messages(token, &messages)?;
        Ok(message)
    }

    async fn delete_message(&self, token: &str, id: Uuid) -> Result<(), StoreError> {
        let mut messages = self.load_messages(token)?;
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() != before {
            self.store_messages(token, &messages)?;
        }
        Ok(())
    }

    async fn clear_messages(&self, token: &str) -> Result<(), StoreError> {
        self.store_messages(token, &[])
    }

    async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.load_files(token)
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
        if size_bytes > LOCAL_FILE_LIMIT {
            warn!(
                "Rejecting oversize upload '{}': {} bytes (device cap {})",
                name, size_bytes, LOCAL_FILE_LIMIT
            );
            return Err(StoreError::OversizeFile {
                size: size_bytes,
                limit: LOCAL_FILE_LIMIT,
            });
        }

        let record = FileRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            payload: PayloadRef::Inline {
                data: BASE64.encode(&envelope),
            },
            uploaded_at: Utc::now(),
            uploaded_by: author.to_string(),
        };

        let mut files = self.load_files(token)?;
        files.push(record.clone());
        self.store_files(token, &files)?;
        Ok(record)
    }

    async fn get_file_payload(
        &self,
        _token: &str,
        record: &FileRecord,
    ) -> Result<Vec<u8>, StoreError> {
        match &record.payload {
            PayloadRef::Inline { data } => Ok(BASE64.decode(data)?),
            PayloadRef::Remote { path } => Err(StoreError::Backend(format!(
                "record points at remote blob '{path}' but the device store has no blob area"
            ))),
        }
    }

    async fn delete_file(&self, token: &str, id: Uuid) -> Result<(), StoreError> {
        let mut files = self.load_files(token)?;
        let before = files.len();
        files.retain(|f| f.id != id);
        if files.len() != before {
            self.store_files(token, &files)?;
        }
        Ok(())
    }

    fn file_size_limit(&self) -> Option<u64> {
        Some(LOCAL_FILE_LIMIT)
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StoreChange>> {
        self.hub.as_ref().map(ChangeHub::subscribe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn backend() -> LocalBackend {
        LocalBackend::new(Arc::new(MemoryKv::new()), Some(ChangeHub::new()))
    }

    #[tokio::test]
    async fn append_and_list() {
        let backend = backend();

        let sent = backend
            .append_message("abc12345", "c2VhbGVk", "ari")
            .await
            .unwrap();
        let listed = backend.list_messages("abc12345").await.unwrap();

        assert_eq!(listed, vec![sent]);
    }

    #[tokio::test]
    async fn token_partitions_are_isolated() {
        let backend = backend();
        backend
            .append_message("token-aaaa", "c2VhbGVk", "ari")
            .await
            .unwrap();
        backend
            .put_file("token-aaaa", "a.txt", "text/plain", 3, vec![1, 2, 3], "ari")
            .await
            .unwrap();

        assert!(backend.list_messages("token-bbbb").await.unwrap().is_empty());
        assert!(backend.list_files("token-bbbb").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = backend();
        let msg = backend
            .append_message("abc12345", "c2VhbGVk", "ari")
            .await
            .unwrap();

        backend.delete_message("abc12345", msg.id).await.unwrap();
        backend.delete_message("abc12345", msg.id).await.unwrap();
        backend
            .delete_message("abc12345", Uuid::new_v4())
            .await
            .unwrap();

        assert!(backend.list_messages("abc12345").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_empties_the_partition() {
        let backend = backend();
        backend
            .append_message("abc12345", "YQ==", "ari")
            .await
            .unwrap();
        backend
            .append_message("abc12345", "Yg==", "bee")
            .await
            .unwrap();

        backend.clear_messages("abc12345").await.unwrap();
        assert!(backend.list_messages("abc12345").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversize_upload_rejected_without_a_record() {
        let backend = backend();
        let result = backend
            .put_file(
                "abc12345",
                "big.bin",
                "application/octet-stream",
                6 * 1024 * 1024,
                vec![0u8; 16],
                "ari",
            )
            .await;

        assert!(matches!(result, Err(StoreError::OversizeFile { .. })));
        assert!(backend.list_files("abc12345").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inline_payload_round_trips() {
        let backend = backend();
        let envelope = vec![7u8; 48];
        let record = backend
            .put_file("abc12345", "note.txt", "text/plain", 20, envelope.clone(), "ari")
            .await
            .unwrap();

        let fetched = backend.get_file_payload("abc12345", &record).await.unwrap();
        assert_eq!(fetched, envelope);

        backend.delete_file("abc12345", record.id).await.unwrap();
        assert!(backend.list_files("abc12345").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_reference_is_refused() {
        let backend = backend();
        let record = FileRecord {
            id: Uuid::new_v4(),
            name: "ghost.bin".into(),
            mime_type: "application/octet-stream".into(),
            size_bytes: 1,
            payload: PayloadRef::Remote {
                path: "abc12345/ghost".into(),
            },
            uploaded_at: Utc::now(),
            uploaded_by: String::new(),
        };

        let result = backend.get_file_payload("abc12345", &record).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn writes_are_published_on_the_hub() {
        let backend = backend();
        let mut changes = backend.subscribe_changes().unwrap();

        backend
            .append_message("abc12345", "c2VhbGVk", "ari")
            .await
            .unwrap();

        match changes.try_recv().unwrap() {
            StoreChange::Messages { token, messages } => {
                assert_eq!(token, "abc12345");
                assert_eq!(messages.len(), 1);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }
}
