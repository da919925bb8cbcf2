//! Status snapshot records.
//!
//! One record per collection currently known to be in the target status.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Last observation of a collection that is in the target status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Status as observed, not normalized.
    #[serde(default)]
    pub status: String,

    /// Display name as observed.
    #[serde(rename = "collection_name", default)]
    pub name: String,

    /// Local time of the last observation.
    pub last_checked: NaiveDateTime,
}

/// Collection id -> record.
pub type Snapshot = BTreeMap<String, SnapshotRecord>;

/// On-disk layout of `collections_status.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub collections: Snapshot,
}
