pub mod events;
pub mod models;

pub use events::StoreChange;
pub use models::{FileRecord, Message, PayloadRef};
