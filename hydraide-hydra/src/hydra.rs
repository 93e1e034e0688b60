use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use hydraide_base::{Name, Result, SwampPattern};
use hydraide_storage::{Event, InfoEvent, Swamp, SwampSettings, DEFAULT_FLUSH_BACKOFF_CAP};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::locker::Locker;
use crate::observer::Observer;
use crate::safeops::Safeops;
use crate::settings_registry::SettingsRegistry;

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

type Slot = Arc<AsyncMutex<Option<Arc<Swamp>>>>;

/// The Swamp manager (spec §4.F): a registry of hydrated Swamps keyed by
/// canonical Name, coalescing concurrent first-access races onto a single
/// hydration via a per-Name creation latch. Bundles the subsystems every
/// Gateway operation needs alongside it — Settings, Safeops, Locker, Observer.
pub struct Hydra {
    root: PathBuf,
    island_count: u64,
    slots: DashMap<Name, Slot>,
    settings: SettingsRegistry,
    locker: Arc<Locker>,
    safeops: Arc<Safeops>,
    observer: Arc<Observer>,
    background: StdMutex<Vec<AbortHandle>>,
}

impl Hydra {
    pub fn new(root: PathBuf, island_count: u64) -> Arc<Self> {
        Arc::new(Hydra {
            root,
            island_count,
            slots: DashMap::new(),
            settings: SettingsRegistry::new(),
            locker: Locker::new(),
            safeops: Arc::new(Safeops::new()),
            observer: Arc::new(Observer::new()),
            background: StdMutex::new(Vec::new()),
        })
    }

    pub fn register_pattern(&self, pattern: SwampPattern, settings: SwampSettings) -> Result<()> {
        self.settings.register_pattern(pattern, settings)
    }

    pub fn deregister_pattern(&self, pattern: &SwampPattern) -> Result<()> {
        self.settings.deregister_pattern(pattern)
    }

    pub fn locker(&self) -> &Arc<Locker> {
        &self.locker
    }

    pub fn safeops(&self) -> &Arc<Safeops> {
        &self.safeops
    }

    pub fn observer(&self) -> &Arc<Observer> {
        &self.observer
    }

    /// Returns the already-hydrated Swamp for `name`, or hydrates/creates
    /// it. Concurrent callers for the same Name share one hydration: the
    /// first caller to reach the per-Name latch does the work, the rest
    /// wait on the same lock and receive the result.
    pub async fn summon_swamp(self: &Arc<Self>, name: &Name) -> Result<Arc<Swamp>> {
        let (_pattern, settings) = self.settings.lookup(name)?;
        let slot = self.slots.entry(name.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(None))).clone();

        let mut guard = slot.lock().await;
        if let Some(swamp) = guard.as_ref() {
            return Ok(Arc::clone(swamp));
        }

        let island_id = name.island_id(self.island_count);
        let dir = hydraide_fs::island_swamp_dir(&self.root, island_id, name);
        let swamp = Arc::new(Swamp::hydrate(name.clone(), dir, settings)?);

        let flush_handle = self.spawn_flush_loop(Arc::clone(&swamp));
        self.spawn_idle_watcher(name.clone(), Arc::clone(&slot), flush_handle);

        *guard = Some(Arc::clone(&swamp));
        Ok(swamp)
    }

    /// O(1)-ish metadata check: true if `name` is currently summoned in
    /// memory, or (for a persistent pattern) has chunk files on disk.
    /// Never hydrates the Swamp.
    pub fn is_exist_swamp(&self, name: &Name) -> Result<bool> {
        if let Some(slot) = self.slots.get(name) {
            match slot.try_lock() {
                Ok(guard) => {
                    if guard.is_some() {
                        return Ok(true);
                    }
                }
                Err(_) => return Ok(true), // hydration is in flight right now
            }
        }
        let (_pattern, settings) = self.settings.lookup(name)?;
        if settings.is_in_memory {
            return Ok(false);
        }
        let island_id = name.island_id(self.island_count);
        let dir = hydraide_fs::island_swamp_dir(&self.root, island_id, name);
        Ok(!hydraide_fs::list_chunks(&dir)?.is_empty())
    }

    pub async fn subscribe_to_swamp_events(self: &Arc<Self>, name: &Name, capacity: usize) -> Result<(Uuid, mpsc::Receiver<Event>)> {
        let swamp = self.summon_swamp(name).await?;
        Ok(swamp.subscribe_to_events(capacity))
    }

    pub async fn unsubscribe_from_swamp_events(self: &Arc<Self>, name: &Name, id: Uuid) -> Result<()> {
        let swamp = self.summon_swamp(name).await?;
        swamp.unsubscribe_from_events(id);
        Ok(())
    }

    pub async fn subscribe_to_swamp_info(self: &Arc<Self>, name: &Name, capacity: usize) -> Result<(Uuid, mpsc::Receiver<InfoEvent>)> {
        let swamp = self.summon_swamp(name).await?;
        Ok(swamp.subscribe_to_info(capacity))
    }

    pub async fn unsubscribe_from_swamp_info(self: &Arc<Self>, name: &Name, id: Uuid) -> Result<()> {
        let swamp = self.summon_swamp(name).await?;
        swamp.unsubscribe_from_info(id);
        Ok(())
    }

    /// Returns the spawned loop's `JoinHandle` so the paired idle watcher
    /// can abort it the moment it idle-closes the same Swamp — otherwise
    /// this loop would keep the `Arc<Swamp>` alive and keep ticking forever
    /// after the Swamp has already unloaded.
    fn spawn_flush_loop(&self, swamp: Arc<Swamp>) -> JoinHandle<()> {
        let write_interval = swamp.settings().write_interval;
        let handle = tokio::spawn(async move {
            let mut backoff = write_interval;
            loop {
                tokio::time::sleep(backoff).await;
                match swamp.flush_once().await {
                    Ok(()) => backoff = write_interval,
                    Err(_) if swamp.is_read_only() => break,
                    Err(_) => backoff = (backoff * 2).min(DEFAULT_FLUSH_BACKOFF_CAP),
                }
            }
        });
        self.background.lock().unwrap().push(handle.abort_handle());
        handle
    }

    fn spawn_idle_watcher(self: &Arc<Self>, name: Name, slot: Slot, flush_handle: JoinHandle<()>) {
        let hydra = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                let mut guard = slot.lock().await;
                let Some(swamp) = guard.as_ref().cloned() else {
                    flush_handle.abort();
                    return;
                };
                if swamp.is_idle_expired(tokio::time::Instant::now()) {
                    let _ = swamp.flush_once().await;
                    *guard = None;
                    drop(guard);
                    hydra.slots.remove(&name);
                    flush_handle.abort();
                    return;
                }
            }
        });
        self.background.lock().unwrap().push(handle.abort_handle());
    }

    /// Stops accepting new vigils (via Safeops), drains every in-flight
    /// operation, then flushes and drops every summoned Swamp.
    pub async fn stop_hydra(self: &Arc<Self>) {
        let _exclusive = self.safeops.shutdown().await;
        self.observer.wait_for_all_processes_finished(Duration::from_millis(50)).await;

        for handle in self.background.lock().unwrap().drain(..) {
            handle.abort();
        }

        let slots: Vec<Slot> = self.slots.iter().map(|e| e.value().clone()).collect();
        for slot in slots {
            if let Ok(guard) = slot.try_lock() {
                if let Some(swamp) = guard.as_ref() {
                    let _ = swamp.flush_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hydraide_storage::ContentValue;
    use std::time::Duration as StdDuration;
    use test_log::test;

    fn settings(is_in_memory: bool) -> SwampSettings {
        SwampSettings::new(is_in_memory, StdDuration::from_secs(60), StdDuration::from_secs(1), 1 << 20).unwrap()
    }

    fn new_hydra(root: &std::path::Path) -> Arc<Hydra> {
        Hydra::new(root.to_path_buf(), 1000)
    }

    #[tokio::test]
    async fn summon_swamp_requires_a_registered_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        let name = Name::load("a/b/c").unwrap();
        assert!(hydra.summon_swamp(&name).await.is_err());
    }

    #[tokio::test]
    async fn summon_swamp_returns_the_same_instance_on_repeat_calls() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        hydra
            .register_pattern(SwampPattern::parse("dizzlets/*/*").unwrap(), settings(true))
            .unwrap();
        let name = Name::load("dizzlets/testing/set-and-get").unwrap();

        let a = hydra.summon_swamp(&name).await.unwrap();
        let b = hydra.summon_swamp(&name).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_summon_coalesces_into_one_hydration() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        hydra
            .register_pattern(SwampPattern::parse("dizzlets/*/*").unwrap(), settings(true))
            .unwrap();
        let name = Name::load("dizzlets/testing/set-and-get").unwrap();

        let (a, b) = tokio::join!(hydra.summon_swamp(&name), hydra.summon_swamp(&name));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn is_exist_swamp_is_false_before_summon_and_true_after() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        hydra
            .register_pattern(SwampPattern::parse("dizzlets/*/*").unwrap(), settings(true))
            .unwrap();
        let name = Name::load("dizzlets/testing/set-and-get").unwrap();

        assert!(!hydra.is_exist_swamp(&name).unwrap());
        hydra.summon_swamp(&name).await.unwrap();
        assert!(hydra.is_exist_swamp(&name).unwrap());
    }

    #[tokio::test]
    async fn is_exist_swamp_on_unregistered_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        let name = Name::load("a/b/c").unwrap();
        assert!(hydra.is_exist_swamp(&name).is_err());
    }

    #[tokio::test]
    async fn stop_hydra_flushes_persistent_swamps_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        hydra
            .register_pattern(SwampPattern::parse("dizzlets/*/*").unwrap(), settings(false))
            .unwrap();
        let name = Name::load("dizzlets/testing/set-and-get").unwrap();
        let swamp = hydra.summon_swamp(&name).await.unwrap();

        let guard = swamp.start_treasure_guard("k1", true).await;
        swamp.set_content("k1", guard, ContentValue::Bool(true)).await.unwrap();
        swamp.save("k1", guard).await.unwrap();

        hydra.stop_hydra().await;

        let island_id = name.island_id(1000);
        let swamp_dir = hydraide_fs::island_swamp_dir(dir.path(), island_id, &name);
        assert!(!hydraide_fs::list_chunks(&swamp_dir).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_close_aborts_the_paired_flush_loop_so_the_swamp_can_be_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let hydra = new_hydra(dir.path());
        hydra
            .register_pattern(
                SwampPattern::parse("dizzlets/*/*").unwrap(),
                SwampSettings::new(true, StdDuration::ZERO, StdDuration::from_secs(1), 1 << 20).unwrap(),
            )
            .unwrap();
        let name = Name::load("dizzlets/testing/idle-drop").unwrap();

        let swamp = hydra.summon_swamp(&name).await.unwrap();
        let weak = Arc::downgrade(&swamp);
        drop(swamp);

        // close_after_idle == 0 means idle the instant the last vigil
        // lifts; the watcher polls every IDLE_POLL_INTERVAL, so a handful
        // of ticks is enough for it to close the swamp and abort the
        // paired flush loop that would otherwise keep it alive forever.
        for _ in 0..5 {
            tokio::time::advance(IDLE_POLL_INTERVAL).await;
            tokio::task::yield_now().await;
        }

        assert!(weak.upgrade().is_none());
    }
}
