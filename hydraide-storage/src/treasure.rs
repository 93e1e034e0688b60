use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hydraide_base::{err, ContentType, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::content_value::ContentValue;

pub type GuardId = Uuid;

/// Committed (or staged) state of a single Treasure, everything from spec
/// §3 except the Key, which is the map key it lives under and therefore
/// isn't duplicated here.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TreasureData {
    pub value: ContentValue,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
    pub expiration_time: Option<DateTime<Utc>>,
}

impl TreasureData {
    pub fn content_type(&self) -> ContentType {
        self.value.content_type()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.map(|t| t <= now).unwrap_or(false)
    }
}

/// A snapshot of a Treasure keyed by its Key, used in events and index
/// queries where callers need the key alongside the data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Treasure {
    pub key: String,
    pub data: TreasureData,
}

/// Result of `Save` (spec §3 invariant iv). `Deleted` is produced only by
/// [`crate::swamp::Swamp::shift_expired_treasures`] and the slice-delete
/// primitives, never directly by `save`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusType {
    New,
    Modified,
    Same,
    Deleted,
}

#[derive(Clone, Debug)]
enum GuardState {
    Idle,
    Shared(HashSet<GuardId>),
    Exclusive(GuardId),
}

/// Per-key guard bookkeeping for one Swamp (spec §4.C, §9's `Idle ->
/// Guarded{shared|exclusive} -> Saved -> Idle` typestate). Guards are keyed
/// by Treasure key, not tracked per-Swamp, so unrelated keys never
/// contend with each other.
#[derive(Default)]
pub struct GuardRegistry {
    states: DashMap<String, GuardState>,
    waiters: DashMap<String, Arc<Notify>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until a guard of the requested kind can be taken, then takes
    /// it and returns its id.
    pub async fn acquire(&self, key: &str, exclusive: bool) -> GuardId {
        loop {
            if let Some(id) = self.try_acquire(key, exclusive) {
                return id;
            }
            let notify = self
                .waiters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone();
            notify.notified().await;
        }
    }

    fn try_acquire(&self, key: &str, exclusive: bool) -> Option<GuardId> {
        let mut entry = self.states.entry(key.to_string()).or_insert(GuardState::Idle);
        let id = Uuid::new_v4();
        match (&mut *entry, exclusive) {
            (GuardState::Idle, true) => {
                *entry = GuardState::Exclusive(id);
                Some(id)
            }
            (GuardState::Idle, false) => {
                let mut set = HashSet::new();
                set.insert(id);
                *entry = GuardState::Shared(set);
                Some(id)
            }
            (GuardState::Shared(set), false) => {
                set.insert(id);
                Some(id)
            }
            (GuardState::Shared(_), true) | (GuardState::Exclusive(_), _) => None,
        }
    }

    /// Idempotent: releasing an id that isn't (or is no longer) held is a no-op.
    pub fn release(&self, key: &str, id: GuardId) {
        if let Some(mut entry) = self.states.get_mut(key) {
            match &mut *entry {
                GuardState::Exclusive(cur) if *cur == id => *entry = GuardState::Idle,
                GuardState::Shared(set) => {
                    set.remove(&id);
                    if set.is_empty() {
                        *entry = GuardState::Idle;
                    }
                }
                _ => {}
            }
        }
        if let Some(n) = self.waiters.get(key) {
            n.notify_waiters();
        }
    }

    /// Validates that `id` currently holds the exclusive guard on `key`,
    /// which every mutator requires (spec §4.C).
    pub fn require_exclusive(&self, key: &str, id: GuardId) -> Result<()> {
        match self.states.get(key).map(|e| e.clone()) {
            Some(GuardState::Exclusive(cur)) if cur == id => Ok(()),
            _ => Err(err(format!(
                "'{key}' is not held by an exclusive guard matching the given id"
            ))),
        }
    }
}
