use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use hydraide_base::{key_not_found, Result};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

pub type LockId = Uuid;

struct Waiter {
    ttl: Duration,
    grant: oneshot::Sender<LockId>,
}

struct LockState {
    owner: LockId,
    waiters: VecDeque<Waiter>,
}

/// Per-Key FIFO business lock (spec §4.I), independent of Swamp guards.
/// `lock` either grants immediately or enqueues the caller and blocks until
/// handed off by `unlock` or TTL expiry. Dropping the future a caller is
/// awaiting (e.g. on context cancellation) drops its `oneshot::Receiver`;
/// the next handoff attempt just finds the send failing and moves to the
/// following waiter, so cancelled waiters fall out of the queue without
/// disturbing the order of the rest.
#[derive(Default)]
pub struct Locker {
    states: Mutex<HashMap<String, LockState>>,
}

impl Locker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn lock(self: &Arc<Self>, key: &str, ttl: Duration) -> LockId {
        let rx = {
            let mut states = self.states.lock().await;
            match states.get_mut(key) {
                None => {
                    let id = Uuid::new_v4();
                    states.insert(key.to_string(), LockState { owner: id, waiters: VecDeque::new() });
                    self.schedule_expiry(key.to_string(), id, ttl);
                    return id;
                }
                Some(state) => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(Waiter { ttl, grant: tx });
                    rx
                }
            }
        };
        rx.await.unwrap_or_else(|_| Uuid::nil())
    }

    /// Releases `key` if `id` currently owns it, handing off to the next
    /// waiter (if any). A mismatched id is the caller unlocking a lock it
    /// no longer (or never) held.
    pub async fn unlock(self: &Arc<Self>, key: &str, id: LockId) -> Result<()> {
        let mut states = self.states.lock().await;
        match states.get(key) {
            Some(state) if state.owner == id => {
                self.handoff(&mut states, key);
                Ok(())
            }
            _ => Err(key_not_found(format!("lock '{key}' is not held by the given id"))),
        }
    }

    /// True if `id` still owns `key` — used by `heartbeat` to report
    /// whether a lock is still live without extending its TTL.
    pub async fn is_owner(&self, key: &str, id: LockId) -> bool {
        self.states.lock().await.get(key).map(|s| s.owner == id).unwrap_or(false)
    }

    fn schedule_expiry(self: &Arc<Self>, key: String, id: LockId, ttl: Duration) {
        let locker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut states = locker.states.lock().await;
            if states.get(&key).map(|s| s.owner) == Some(id) {
                locker.handoff(&mut states, &key);
            }
        });
    }

    /// Pops waiters off the front of `key`'s queue until one accepts the
    /// grant (or the queue empties, freeing the key). Must be called with
    /// `states` already locked.
    fn handoff(self: &Arc<Self>, states: &mut HashMap<String, LockState>, key: &str) {
        let Some(mut state) = states.remove(key) else { return };
        while let Some(waiter) = state.waiters.pop_front() {
            let new_id = Uuid::new_v4();
            if waiter.grant.send(new_id).is_ok() {
                let ttl = waiter.ttl;
                states.insert(key.to_string(), LockState { owner: new_id, waiters: state.waiters });
                self.schedule_expiry(key.to_string(), new_id, ttl);
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[tokio::test]
    async fn first_locker_gets_it_immediately() {
        let locker = Locker::new();
        let id = locker.lock("k", Duration::from_secs(60)).await;
        assert!(locker.is_owner("k", id).await);
    }

    #[tokio::test]
    async fn unlock_hands_off_to_next_waiter_in_order() {
        let locker = Locker::new();
        let id1 = locker.lock("k", Duration::from_secs(60)).await;

        let locker2 = Arc::clone(&locker);
        let waiter = tokio::spawn(async move { locker2.lock("k", Duration::from_secs(60)).await });
        tokio::task::yield_now().await;

        locker.unlock("k", id1).await.unwrap();
        let id2 = waiter.await.unwrap();
        assert_ne!(id1, id2);
        assert!(locker.is_owner("k", id2).await);
    }

    #[tokio::test]
    async fn unlock_with_wrong_id_is_rejected() {
        let locker = Locker::new();
        let _id = locker.lock("k", Duration::from_secs(60)).await;
        assert!(locker.unlock("k", Uuid::new_v4()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_hands_off_without_an_explicit_unlock() {
        let locker = Locker::new();
        let id1 = locker.lock("k", Duration::from_millis(10)).await;

        let locker2 = Arc::clone(&locker);
        let waiter = tokio::spawn(async move { locker2.lock("k", Duration::from_secs(60)).await });
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_millis(20)).await;
        let id2 = waiter.await.unwrap();
        assert_ne!(id1, id2);
    }
}
