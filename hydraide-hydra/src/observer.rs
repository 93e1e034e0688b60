use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// One in-flight Gateway call (spec §4.K).
#[derive(Clone, Debug)]
pub struct InFlightOp {
    pub id: Uuid,
    pub operation: String,
    pub started_at: DateTime<Utc>,
}

/// Registry of in-flight Gateway calls, for shutdown visibility only —
/// it does not gate anything itself (Safeops does that). Every top-level
/// handler registers on entry and deregisters on exit via [`Observer::track`].
#[derive(Default)]
pub struct Observer {
    ops: DashMap<Uuid, InFlightOp>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight_count(&self) -> usize {
        self.ops.len()
    }

    pub fn in_flight(&self) -> Vec<InFlightOp> {
        self.ops.iter().map(|e| e.value().clone()).collect()
    }

    /// Registers `operation` as starting now and returns a guard that
    /// deregisters it when dropped, wherever the handler returns from.
    pub fn track(&self, operation: impl Into<String>) -> ObserverGuard<'_> {
        let id = Uuid::new_v4();
        self.ops.insert(id, InFlightOp { id, operation: operation.into(), started_at: Utc::now() });
        ObserverGuard { observer: self, id }
    }

    /// Polls until every registered operation has completed.
    pub async fn wait_for_all_processes_finished(&self, poll_interval: Duration) {
        while !self.ops.is_empty() {
            tokio::time::sleep(poll_interval).await;
        }
    }
}

pub struct ObserverGuard<'a> {
    observer: &'a Observer,
    id: Uuid,
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        self.observer.ops.remove(&self.id);
    }
}
