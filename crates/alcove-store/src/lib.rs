//! Storage backends for Alcove sessions.
//!
//! Two interchangeable implementations of one contract: [`RemoteBackend`]
//! persists records in a shared remote store reachable by every participant,
//! [`LocalBackend`] keeps them in a per-device key-value store and pushes
//! change notifications to other observers on the same device. Everything a
//! backend touches is ciphertext; the key never gets here.

pub mod backend;
pub mod error;
pub mod hub;
pub mod kv;
pub mod local;
pub mod remote;

pub use backend::StorageBackend;
pub use error::StoreError;
pub use hub::ChangeHub;
pub use kv::{KeyValueStore, MemoryKv, SqliteKv};
pub use local::{LOCAL_FILE_LIMIT, LocalBackend};
pub use remote::{RemoteBackend, RemoteConfig};
