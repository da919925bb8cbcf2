//! Persisted document models.

mod chat;
mod snapshot;
mod user;

pub use chat::{ChatRecord, ChatsDocument};
pub use snapshot::{Snapshot, SnapshotDocument, SnapshotRecord};
pub use user::{StaffUser, UsersDocument};
