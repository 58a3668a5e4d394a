use serde::{Deserialize, Serialize};

use crate::models::{FileRecord, Message};

/// Change notification published when one writer replaces a stored list.
///
/// Carries the full new list so observers can swap their in-memory copy
/// without a read round-trip. Only the device-local store emits these; a
/// shared remote store is observed by polling instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreChange {
    /// The message list for a token was rewritten.
    Messages {
        token: String,
        messages: Vec<Message>,
    },

    /// The file list for a token was rewritten.
    Files {
        token: String,
        files: Vec<FileRecord>,
    },
}

impl StoreChange {
    /// The token partition this change belongs to.
    pub fn token(&self) -> &str {
        match self {
            Self::Messages { token, .. } => token,
            Self::Files { token, .. } => token,
        }
    }
}
