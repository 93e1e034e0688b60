use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::treasure::{StatusType, Treasure};

/// An event fanned out to a Swamp's subscribers (spec §3, §4.E). Exactly one
/// of `treasure`/`old_treasure`/`deleted_treasure` is populated, matching
/// the status: `New`/`Modified`/`Same` carry `treasure` (and `Modified`
/// additionally carries `old_treasure`), `Deleted` carries
/// `deleted_treasure`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub swamp_name: String,
    pub status: StatusType,
    pub event_time: DateTime<Utc>,
    pub treasure: Option<Treasure>,
    pub old_treasure: Option<Treasure>,
    pub deleted_treasure: Option<Treasure>,
}

impl Event {
    pub fn new_or_modified(swamp_name: &str, status: StatusType, treasure: Treasure, old: Option<Treasure>) -> Self {
        Event {
            swamp_name: swamp_name.to_string(),
            status,
            event_time: Utc::now(),
            treasure: Some(treasure),
            old_treasure: old,
            deleted_treasure: None,
        }
    }

    pub fn deleted(swamp_name: &str, deleted: Treasure) -> Self {
        Event {
            swamp_name: swamp_name.to_string(),
            status: StatusType::Deleted,
            event_time: Utc::now(),
            treasure: None,
            old_treasure: None,
            deleted_treasure: Some(deleted),
        }
    }
}

/// The "info" subscription payload (spec §4.E): currently just the element
/// count after a change.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct InfoEvent {
    pub count: usize,
}
