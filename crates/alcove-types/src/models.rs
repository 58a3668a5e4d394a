use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages at rest are always encrypted.
/// A backend only ever sees ciphertext, never plaintext and never the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Base64-encoded envelope (`IV(12) || ciphertext+tag`) over the UTF-8 text.
    pub ciphertext: String,
    /// Free-text author label. Not an identity: anyone with the token can
    /// claim any name.
    pub author: String,
    pub sent_at: DateTime<Utc>,
}

/// Where a file's encrypted payload lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadRef {
    /// Base64 envelope stored inside the record itself (device mode, and
    /// legacy rows written before a blob area existed).
    Inline { data: String },
    /// Opaque path into the remote blob area.
    Remote { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    /// Plaintext size. The stored payload is larger (IV + GCM tag).
    pub size_bytes: u64,
    pub payload: PayloadRef,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}
