//! Flat JSON persistence: staff list, report chats and the status snapshot.

mod chats;
mod json_file;
mod models;
mod snapshot;
mod users;

pub use chats::ChatRepo;
pub use json_file::{JsonFile, StoreError};
pub use models::*;
pub use snapshot::{JsonSnapshotStore, SnapshotStore};
pub use users::UserRepo;
