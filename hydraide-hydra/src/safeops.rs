use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The shared/exclusive gate every Gateway handler passes through (spec
/// §4.H). Used inside-out: ordinary operations take the *shared* permit
/// (`.read()`), so they can all run concurrently; shutdown takes the lone
/// *exclusive* permit (`.write()`), which only resolves once every shared
/// permit has been released. Streaming subscriptions must never take the
/// shared permit, or shutdown could block on them forever.
#[derive(Default)]
pub struct Safeops {
    gate: RwLock<()>,
}

pub type SharedPermit<'a> = RwLockReadGuard<'a, ()>;
pub type ExclusivePermit<'a> = RwLockWriteGuard<'a, ()>;

impl Safeops {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_system(&self) -> SharedPermit<'_> {
        self.gate.read().await
    }

    /// Waits for every outstanding shared permit to drop, then returns the
    /// exclusive permit. Holding it blocks all future `lock_system` callers.
    pub async fn shutdown(&self) -> ExclusivePermit<'_> {
        self.gate.write().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[tokio::test]
    async fn shared_permits_coexist() {
        let safeops = Safeops::new();
        let _a = safeops.lock_system().await;
        let _b = safeops.lock_system().await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_shared_permits_to_drop() {
        let safeops = Safeops::new();
        let permit = safeops.lock_system().await;
        drop(permit);
        let _exclusive = safeops.shutdown().await;
    }
}
