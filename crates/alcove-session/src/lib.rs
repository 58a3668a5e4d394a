//! Session core: the state machine, polling sync engine, and invite links
//! that tie key derivation and storage together.
//!
//! A session is implicit: it is the set of records partitioned under one
//! token. Entering one means deriving the key and starting to poll; leaving
//! one means forgetting the key. Nothing here ever deletes shared data on
//! the way out.

pub mod config;
pub mod error;
pub mod invite;
pub mod manager;
pub mod sync;

pub use config::Config;
pub use error::SessionError;
pub use invite::{Invite, PortalTab};
pub use manager::{SessionManager, SessionState};
pub use sync::{Snapshot, SyncEngine, SyncEvent};
