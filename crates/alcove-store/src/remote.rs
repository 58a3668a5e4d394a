use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use alcove_types::{FileRecord, Message, PayloadRef};

use crate::backend::StorageBackend;
use crate::error::StoreError;

/// Per-request ceiling. A hung remote surfaces as a `Backend` error and the
/// next poll tick retries; nothing in the core retries on its own.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for the shared remote store.
///
/// Any store exposing two row collections (`messages`, `files`) filtered by
/// a token column plus a put/get/delete blob area is substitutable here.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Optional bearer key, sent on every request when present.
    pub api_key: Option<String>,
}

/// Backend over the shared remote store all participants can reach.
///
/// Message rows carry their envelope inline; file payloads go to the blob
/// area under an opaque `<token>/<file-id>` path that the record points at.
pub struct RemoteBackend {
    http: Client,
    config: RemoteConfig,
}

/// Row shape for inserts: the record itself plus the partition column.
#[derive(Serialize)]
struct NewRow<'a, T: Serialize> {
    token: &'a str,
    #[serde(flatten)]
    record: &'a T,
}

impl RemoteBackend {
    pub fn new(mut config: RemoteConfig) -> Result<Self, StoreError> {
        while config.base_url.ends_with('/') {
            config.base_url.pop();
        }

        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    fn rows_url(&self, collection: &str) -> String {
        format!("{}/{}", self.config.base_url, collection)
    }

    fn row_url(&self, collection: &str, id: Uuid) -> String {
        format!("{}/{}/{}", self.config.base_url, collection, id)
    }

    fn blob_url(&self, path: &str) -> String {
        format!("{}/blobs/{}", self.config.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    fn check(resp: Response) -> Result<Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(StoreError::Backend(format!("remote returned {status}")))
        }
    }

    async fn insert_row<T: Serialize + Sync>(
        &self,
        collection: &str,
        token: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let resp = self
            .authed(self.http.post(self.rows_url(collection)))
            .json(&NewRow { token, record })
            .send()
            .await?;
        Self::check(resp).map(|_| ())
    }

    /// Delete one row. A row that is already gone is a successful no-op.
    async fn delete_row(&self, collection: &str, token: &str, id: Uuid) -> Result<(), StoreError> {
        let resp = self
            .authed(self.http.delete(self.row_url(collection, id)))
            .query(&[("token", token)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp).map(|_| ())
    }

    async fn delete_blob(&self, path: &str) -> Result<(), StoreError> {
        let resp = self.authed(self.http.delete(self.blob_url(path))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp).map(|_| ())
    }
}

#[async_trait]
impl StorageBackend for RemoteBackend {
    async fn list_messages(&self, token: &str) -> Result<Vec<Message>, StoreError> {
        let resp = self
            .authed(self.http.get(self.rows_url("messages")))
            .query(&[("token", token)])
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
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
        self.insert_row("messages", token, &message).await?;
        Ok(message)
    }

    async fn delete_message(&self, token: &str, id: Uuid) -> Result<(), StoreError> {
        self.delete_row("messages", token, id).await
    }

    async fn clear_messages(&self, token: &str) -> Result<(), StoreError> {
        let resp = self
            .authed(self.http.delete(self.rows_url("messages")))
            .query(&[("token", token)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp).map(|_| ())
    }

    async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, StoreError> {
        let resp = self
            .authed(self.http.get(self.rows_url("files")))
            .query(&[("token", token)])
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
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
        let id = Uuid::new_v4();
        let path = format!("{token}/{id}");

        let resp = self
            .authed(self.http.put(self.blob_url(&path)))
            .header("Content-Type", "application/octet-stream")
            .body(envelope)
            .send()
            .await?;
        Self::check(resp)?;

        let record = FileRecord {
            id,
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            payload: PayloadRef::Remote { path: path.clone() },
            uploaded_at: Utc::now(),
            uploaded_by: author.to_string(),
        };

        if let Err(e) = self.insert_row("files", token, &record).await {
            // The blob is orphaned without its row; release it best-effort.
            if let Err(cleanup) = self.delete_blob(&path).await {
                warn!("Could not release orphaned blob {}: {}", path, cleanup);
            }
            return Err(e);
        }

        Ok(record)
    }

    async fn get_file_payload(
        &self,
        _token: &str,
        record: &FileRecord,
    ) -> Result<Vec<u8>, StoreError> {
        match &record.payload {
            // Legacy rows written by device mode keep their envelope inline.
            PayloadRef::Inline { data } => Ok(BASE64.decode(data)?),
            PayloadRef::Remote { path } => {
                let resp = self.authed(self.http.get(self.blob_url(path))).send().await?;
                Ok(Self::check(resp)?.bytes().await?.to_vec())
            }
        }
    }

    async fn delete_file(&self, token: &str, id: Uuid) -> Result<(), StoreError> {
        // The row holds the blob path, so look it up before deleting it.
        let files = self.list_files(token).await?;
        let blob_path = files.iter().find(|f| f.id == id).and_then(|f| match &f.payload {
            PayloadRef::Remote { path } => Some(path.clone()),
            PayloadRef::Inline { .. } => None,
        });

        self.delete_row("files", token, id).await?;

        if let Some(path) = blob_path {
            self.delete_blob(&path).await?;
        }
        Ok(())
    }
}
