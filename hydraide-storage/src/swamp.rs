use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hydraide_base::{err, failed_precondition, wrong_type, ContentType, Name, RelOp, Result};
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

use crate::beacon::{Beacon, ChangedDims, IndexType, Order};
use crate::chunk;
use crate::content_value::{check_type_transition, ContentValue};
use crate::event::{Event, InfoEvent};
use crate::settings::SwampSettings;
use crate::treasure::{GuardId, GuardRegistry, StatusType, Treasure, TreasureData};

/// A single, independently-lockable unit of storage (spec §3, §4.E): the
/// hierarchical name, its committed Treasures, and everything needed to
/// persist, index and subscribe to them. Owned behind an `Arc` by the
/// Hydra registry so background flush/idle tasks can hold a handle
/// alongside callers.
pub struct Swamp {
    name: Name,
    dir: PathBuf,
    settings: SwampSettings,

    treasures: RwLock<BTreeMap<String, TreasureData>>,
    guards: GuardRegistry,
    staged: DashMap<String, TreasureData>,
    increment_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    beacons: DashMap<(IndexType, Order), Beacon>,

    chunk_of: DashMap<String, u64>,
    chunk_sizes: DashMap<u64, usize>,
    next_chunk: AtomicU64,
    dirty_chunks: DashMap<u64, ()>,
    flush_failures: AtomicU32,
    read_only: AtomicBool,

    vigil: AtomicI64,
    last_activity: StdMutex<Instant>,

    event_subscribers: DashMap<Uuid, mpsc::Sender<Event>>,
    info_subscribers: DashMap<Uuid, mpsc::Sender<InfoEvent>>,
}

impl Swamp {
    /// Reads every chunk under `dir` (if the pattern is persistent) and
    /// rebuilds the committed map plus chunk bookkeeping. An empty or
    /// missing directory hydrates into an empty Swamp.
    pub fn hydrate(name: Name, dir: PathBuf, settings: SwampSettings) -> Result<Self> {
        let mut treasures = BTreeMap::new();
        let chunk_of = DashMap::new();
        let chunk_sizes = DashMap::new();
        let mut max_chunk_num = 0u64;

        if !settings.is_in_memory {
            for path in hydraide_fs::list_chunks(&dir)? {
                let chunk_num = hydraide_fs::chunk_number(&path)
                    .ok_or_else(|| err(format!("unparseable chunk filename '{}'", path.display())))?;
                let bytes = hydraide_fs::read_chunk(&path)?;
                let entries = chunk::decode(&bytes)?;
                for (key, data) in entries {
                    chunk_of.insert(key.clone(), chunk_num);
                    treasures.insert(key, data);
                }
                chunk_sizes.insert(chunk_num, bytes.len());
                max_chunk_num = max_chunk_num.max(chunk_num);
            }
        }

        Ok(Swamp {
            name,
            dir,
            settings,
            treasures: RwLock::new(treasures),
            guards: GuardRegistry::new(),
            staged: DashMap::new(),
            increment_locks: DashMap::new(),
            beacons: DashMap::new(),
            chunk_of,
            chunk_sizes,
            next_chunk: AtomicU64::new(max_chunk_num),
            dirty_chunks: DashMap::new(),
            flush_failures: AtomicU32::new(0),
            read_only: AtomicBool::new(false),
            vigil: AtomicI64::new(0),
            last_activity: StdMutex::new(Instant::now()),
            event_subscribers: DashMap::new(),
            info_subscribers: DashMap::new(),
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn settings(&self) -> &SwampSettings {
        &self.settings
    }

    // --- Vigil (spec §4.E: pins a Swamp open while an operation is live) ---

    pub fn begin_vigil(&self) {
        self.vigil.fetch_add(1, Ordering::SeqCst);
    }

    pub fn cease_vigil(&self) {
        self.vigil.fetch_sub(1, Ordering::SeqCst);
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn vigil_count(&self) -> i64 {
        self.vigil.load(Ordering::SeqCst)
    }

    /// True once no vigil is held and `close_after_idle` has elapsed since
    /// the last activity. `close_after_idle == 0` (only legal for
    /// in-memory patterns) means "idle the instant the last vigil lifts".
    pub fn is_idle_expired(&self, now: Instant) -> bool {
        if self.vigil_count() > 0 {
            return false;
        }
        let last = *self.last_activity.lock().unwrap();
        now.saturating_duration_since(last) >= self.settings.close_after_idle
    }

    // --- Guards (spec §4.C) ---

    pub async fn start_treasure_guard(&self, key: &str, exclusive: bool) -> GuardId {
        self.guards.acquire(key, exclusive).await
    }

    pub fn release_treasure_guard(&self, key: &str, guard: GuardId) {
        self.guards.release(key, guard);
    }

    // --- Staged edits under an exclusive guard ---

    pub async fn set_content(&self, key: &str, guard: GuardId, value: ContentValue) -> Result<()> {
        self.guards.require_exclusive(key, guard)?;
        let committed = self.treasures.read().await.get(key).cloned();
        let existing_type = self
            .staged
            .get(key)
            .map(|e| e.value.content_type())
            .or_else(|| committed.as_ref().map(|d| d.value.content_type()))
            .unwrap_or(ContentType::Void);
        check_type_transition(existing_type, value.content_type())?;
        let mut entry = self.staged.entry(key.to_string()).or_insert_with(|| committed.unwrap_or_default());
        entry.value = value;
        Ok(())
    }

    pub async fn set_created_at(&self, key: &str, guard: GuardId, at: DateTime<Utc>) -> Result<()> {
        self.guards.require_exclusive(key, guard)?;
        self.stage_mutate(key, |d| d.created_at = Some(at)).await
    }

    pub async fn set_created_by(&self, key: &str, guard: GuardId, by: String) -> Result<()> {
        self.guards.require_exclusive(key, guard)?;
        self.stage_mutate(key, |d| d.created_by = Some(by)).await
    }

    pub async fn set_modified_at(&self, key: &str, guard: GuardId, at: DateTime<Utc>) -> Result<()> {
        self.guards.require_exclusive(key, guard)?;
        self.stage_mutate(key, |d| d.modified_at = Some(at)).await
    }

    pub async fn set_modified_by(&self, key: &str, guard: GuardId, by: String) -> Result<()> {
        self.guards.require_exclusive(key, guard)?;
        self.stage_mutate(key, |d| d.modified_by = Some(by)).await
    }

    pub async fn set_expiration_time(&self, key: &str, guard: GuardId, at: Option<DateTime<Utc>>) -> Result<()> {
        self.guards.require_exclusive(key, guard)?;
        self.stage_mutate(key, |d| d.expiration_time = at).await
    }

    async fn stage_mutate(&self, key: &str, f: impl FnOnce(&mut TreasureData)) -> Result<()> {
        let committed = self.treasures.read().await.get(key).cloned();
        let mut entry = self.staged.entry(key.to_string()).or_insert_with(|| committed.unwrap_or_default());
        f(&mut entry);
        Ok(())
    }

    /// Commits the staged edit for `key`, releasing its guard. Status is
    /// `New`/`Modified`/`Same` purely by value equality: touching only
    /// metadata (timestamps, `*By`) on an unchanged value yields `Same`
    /// (spec §3 invariant iv).
    pub async fn save(&self, key: &str, guard: GuardId) -> Result<StatusType> {
        self.guards.require_exclusive(key, guard)?;
        let Some((_, mut staged)) = self.staged.remove(key) else {
            return Err(err(format!("no staged edit for key '{key}'")));
        };

        let (status, old, dims, count) = {
            let mut treasures = self.treasures.write().await;
            let existing = treasures.get(key).cloned();

            if staged.created_at.is_none() {
                staged.created_at = existing.as_ref().and_then(|e| e.created_at).or(Some(Utc::now()));
            }
            if staged.modified_at.is_none() {
                staged.modified_at = Some(Utc::now());
            }

            let status = match &existing {
                None => StatusType::New,
                Some(old) if old.value == staged.value => StatusType::Same,
                Some(_) => StatusType::Modified,
            };
            let dims = ChangedDims {
                value: existing.as_ref().map(|e| e.value != staged.value).unwrap_or(true),
                created_at: existing.as_ref().map(|e| e.created_at != staged.created_at).unwrap_or(true),
                modified_at: true,
                expiration_time: existing
                    .as_ref()
                    .map(|e| e.expiration_time != staged.expiration_time)
                    .unwrap_or(true),
            };
            treasures.insert(key.to_string(), staged.clone());
            (status, existing, dims, treasures.len())
        };

        self.assign_chunk(key, &staged);
        self.guards.release(key, guard);
        self.record_write(key, status, Some(staged), old, dims, count);
        Ok(status)
    }

    pub async fn get(&self, key: &str) -> Option<Treasure> {
        self.treasures
            .read()
            .await
            .get(key)
            .cloned()
            .map(|data| Treasure { key: key.to_string(), data })
    }

    pub async fn is_key_exist(&self, key: &str) -> bool {
        self.treasures.read().await.contains_key(key)
    }

    pub async fn count(&self) -> usize {
        self.treasures.read().await.len()
    }

    pub async fn get_all(&self) -> Vec<Treasure> {
        self.treasures
            .read()
            .await
            .iter()
            .map(|(k, d)| Treasure { key: k.clone(), data: d.clone() })
            .collect()
    }

    /// Deletes a Treasure outright. Returns `false` if it didn't exist.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let guard = self.guards.acquire(key, true).await;
        let (removed, count) = {
            let mut treasures = self.treasures.write().await;
            let removed = treasures.remove(key);
            (removed, treasures.len())
        };
        self.guards.release(key, guard);
        self.staged.remove(key);

        match removed {
            Some(data) => {
                self.unassign_chunk(key);
                self.record_write(
                    key,
                    StatusType::Deleted,
                    None,
                    Some(data),
                    ChangedDims { value: true, created_at: true, modified_at: true, expiration_time: true },
                    count,
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Ordered index reads (spec §4.D) ---

    pub async fn get_by_index(&self, index_type: IndexType, order: Order, from: usize, limit: usize) -> Vec<Treasure> {
        let treasures = self.treasures.read().await;
        let beacon = self
            .beacons
            .entry((index_type, order))
            .or_insert_with(|| Beacon::build(&treasures, index_type, order))
            .clone();
        beacon
            .query(from, limit)
            .iter()
            .filter_map(|k| treasures.get(k).cloned().map(|d| Treasure { key: k.clone(), data: d }))
            .collect()
    }

    fn invalidate_beacons(&self, dims: ChangedDims) {
        self.beacons.retain(|(index_type, _order), _| !index_type.invalidated_by(&dims));
    }

    // --- Uint32 slice primitives (spec §3) ---

    pub async fn uint32_slice_push(&self, key: &str, values: &[u32]) -> Result<usize> {
        let guard = self.guards.acquire(key, true).await;
        let outcome: Result<(TreasureData, usize, usize)> = {
            let mut treasures = self.treasures.write().await;
            let mut data = treasures.get(key).cloned().unwrap_or_default();
            if data.value == ContentValue::Void {
                data.value = ContentValue::Uint32Slice(Default::default());
                data.created_at.get_or_insert(Utc::now());
            }
            match &mut data.value {
                ContentValue::Uint32Slice(set) => {
                    for v in values {
                        set.insert(*v);
                    }
                    let size = set.len();
                    data.modified_at = Some(Utc::now());
                    treasures.insert(key.to_string(), data.clone());
                    Ok((data, size, treasures.len()))
                }
                other => Err(wrong_type(format!(
                    "expected Uint32Slice, treasure holds {:?}",
                    other.content_type()
                ))),
            }
        };
        self.guards.release(key, guard);
        let (data, size, count) = outcome?;
        self.assign_chunk(key, &data);
        self.record_write(
            key,
            StatusType::Modified,
            Some(data),
            None,
            ChangedDims { value: true, modified_at: true, ..Default::default() },
            count,
        );
        Ok(size)
    }

    /// Removes `values` from the slice. Deleting down to empty deletes the
    /// Treasure itself (spec §3: "a Uint32Slice Treasure emptied by delete
    /// ceases to exist"), cascading — via the background flush loop — to
    /// the Swamp folder if it was the last Treasure.
    pub async fn uint32_slice_delete(&self, key: &str, values: &[u32]) -> Result<usize> {
        enum Outcome {
            Updated(TreasureData, usize),
            Removed(TreasureData),
            NoOp,
        }

        let guard = self.guards.acquire(key, true).await;
        let outcome: Result<Outcome> = {
            let mut treasures = self.treasures.write().await;
            match treasures.get(key).cloned() {
                None => Ok(Outcome::NoOp),
                Some(mut data) => match &mut data.value {
                    ContentValue::Uint32Slice(set) => {
                        for v in values {
                            set.remove(v);
                        }
                        if set.is_empty() {
                            let removed = treasures.remove(key).expect("key just matched above");
                            Ok(Outcome::Removed(removed))
                        } else {
                            let size = set.len();
                            data.modified_at = Some(Utc::now());
                            treasures.insert(key.to_string(), data.clone());
                            Ok(Outcome::Updated(data, size))
                        }
                    }
                    other => Err(wrong_type(format!(
                        "expected Uint32Slice, treasure holds {:?}",
                        other.content_type()
                    ))),
                },
            }
        };
        let count = self.treasures.read().await.len();
        self.guards.release(key, guard);

        match outcome? {
            Outcome::NoOp => Ok(0),
            Outcome::Updated(data, size) => {
                self.assign_chunk(key, &data);
                self.record_write(
                    key,
                    StatusType::Modified,
                    Some(data),
                    None,
                    ChangedDims { value: true, modified_at: true, ..Default::default() },
                    count,
                );
                Ok(size)
            }
            Outcome::Removed(old) => {
                self.unassign_chunk(key);
                self.record_write(
                    key,
                    StatusType::Deleted,
                    None,
                    Some(old),
                    ChangedDims { value: true, created_at: true, modified_at: true, expiration_time: true },
                    count,
                );
                Ok(0)
            }
        }
    }

    pub async fn uint32_slice_size(&self, key: &str) -> Result<usize> {
        match self.treasures.read().await.get(key) {
            Some(data) => Ok(data.value.as_uint32_slice()?.len()),
            None => Ok(0),
        }
    }

    pub async fn uint32_slice_get_all(&self, key: &str) -> Result<Vec<u32>> {
        match self.treasures.read().await.get(key) {
            Some(data) => Ok(data.value.as_uint32_slice()?.into_iter().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn uint32_slice_is_value_exist(&self, key: &str, value: u32) -> Result<bool> {
        match self.treasures.read().await.get(key) {
            Some(data) => Ok(data.value.as_uint32_slice()?.contains(&value)),
            None => Ok(false),
        }
    }

    // --- Conditional numeric increments (spec §3: increments are atomic
    // per key and may be gated by a RelOp condition on the pre-increment
    // value) ---

    async fn increment_impl<T, FGet, FMake>(
        &self,
        key: &str,
        delta: T,
        cond: Option<(RelOp, T)>,
        get: FGet,
        make: FMake,
    ) -> Result<(T, bool)>
    where
        T: Copy + std::ops::Add<Output = T> + PartialOrd,
        FGet: Fn(&ContentValue) -> Result<T>,
        FMake: Fn(T) -> ContentValue,
    {
        let lock = self
            .increment_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _permit = lock.lock().await;
        let guard = self.guards.acquire(key, true).await;

        let outcome: Result<(TreasureData, T, bool, usize)> = {
            let mut treasures = self.treasures.write().await;
            match treasures.get(key).cloned() {
                None => {
                    let now = Utc::now();
                    let data = TreasureData {
                        value: make(delta),
                        created_at: Some(now),
                        modified_at: Some(now),
                        ..Default::default()
                    };
                    treasures.insert(key.to_string(), data.clone());
                    Ok((data, delta, true, treasures.len()))
                }
                Some(existing) => match get(&existing.value) {
                    Err(e) => Err(e),
                    Ok(current) => {
                        let holds = cond.map(|(op, operand)| op.holds(current, operand)).unwrap_or(true);
                        if holds {
                            let new_val = current + delta;
                            let mut updated = existing;
                            updated.value = make(new_val);
                            updated.modified_at = Some(Utc::now());
                            treasures.insert(key.to_string(), updated.clone());
                            Ok((updated, new_val, true, treasures.len()))
                        } else {
                            Ok((existing, current, false, treasures.len()))
                        }
                    }
                },
            }
        };

        self.guards.release(key, guard);

        let (data, result, applied, count) = outcome?;
        if applied {
            self.assign_chunk(key, &data);
            self.record_write(
                key,
                StatusType::Modified,
                Some(data),
                None,
                ChangedDims { value: true, modified_at: true, ..Default::default() },
                count,
            );
        }
        Ok((result, applied))
    }

    pub async fn increment_i8(&self, key: &str, delta: i8, cond: Option<(RelOp, i8)>) -> Result<(i8, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_i8(), ContentValue::Int8).await
    }
    pub async fn increment_i16(&self, key: &str, delta: i16, cond: Option<(RelOp, i16)>) -> Result<(i16, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_i16(), ContentValue::Int16).await
    }
    pub async fn increment_i32(&self, key: &str, delta: i32, cond: Option<(RelOp, i32)>) -> Result<(i32, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_i32(), ContentValue::Int32).await
    }
    pub async fn increment_i64(&self, key: &str, delta: i64, cond: Option<(RelOp, i64)>) -> Result<(i64, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_i64(), ContentValue::Int64).await
    }
    pub async fn increment_u8(&self, key: &str, delta: u8, cond: Option<(RelOp, u8)>) -> Result<(u8, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_u8(), ContentValue::Uint8).await
    }
    pub async fn increment_u16(&self, key: &str, delta: u16, cond: Option<(RelOp, u16)>) -> Result<(u16, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_u16(), ContentValue::Uint16).await
    }
    pub async fn increment_u32(&self, key: &str, delta: u32, cond: Option<(RelOp, u32)>) -> Result<(u32, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_u32(), ContentValue::Uint32).await
    }
    pub async fn increment_u64(&self, key: &str, delta: u64, cond: Option<(RelOp, u64)>) -> Result<(u64, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_u64(), ContentValue::Uint64).await
    }
    pub async fn increment_f32(&self, key: &str, delta: f32, cond: Option<(RelOp, f32)>) -> Result<(f32, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_f32(), |v| ContentValue::Float32(v.into()))
            .await
    }
    pub async fn increment_f64(&self, key: &str, delta: f64, cond: Option<(RelOp, f64)>) -> Result<(f64, bool)> {
        self.increment_impl(key, delta, cond, |v| v.as_f64(), |v| ContentValue::Float64(v.into()))
            .await
    }

    /// Removes up to `n` expired Treasures (ascending by expiration time,
    /// ties broken by key), deleting them the same way `delete` does. A
    /// wire-level request for "all expired" is translated by the caller
    /// into a large `n` before reaching this API (spec §6).
    pub async fn shift_expired_treasures(&self, n: usize) -> Vec<Treasure> {
        let now = Utc::now();
        let (removed, count) = {
            let mut treasures = self.treasures.write().await;
            let mut expired_keys: Vec<String> = treasures
                .iter()
                .filter(|(_, d)| d.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();
            expired_keys.sort_by(|a, b| {
                treasures[a].expiration_time.cmp(&treasures[b].expiration_time).then_with(|| a.cmp(b))
            });
            expired_keys.truncate(n);

            let mut removed = Vec::with_capacity(expired_keys.len());
            for k in &expired_keys {
                if let Some(data) = treasures.remove(k) {
                    removed.push((k.clone(), data));
                }
            }
            (removed, treasures.len())
        };

        for (k, _) in &removed {
            self.unassign_chunk(k);
        }
        for (k, data) in &removed {
            self.record_write(
                k,
                StatusType::Deleted,
                None,
                Some(data.clone()),
                ChangedDims { value: true, created_at: true, modified_at: true, expiration_time: true },
                count,
            );
        }
        removed.into_iter().map(|(key, data)| Treasure { key, data }).collect()
    }

    /// Wipes the Swamp, in memory and on disk. Refuses while a vigil is
    /// held elsewhere (spec §8 invariant: destroying a pinned Swamp is a
    /// `FailedPrecondition`).
    pub async fn destroy(&self) -> Result<()> {
        if self.vigil_count() > 0 {
            return Err(failed_precondition(format!(
                "cannot destroy swamp '{}' while a vigil is held",
                self.name.get()
            )));
        }
        self.treasures.write().await.clear();
        self.staged.clear();
        self.chunk_of.clear();
        self.chunk_sizes.clear();
        self.dirty_chunks.clear();
        self.beacons.clear();

        for path in hydraide_fs::list_chunks(&self.dir)? {
            hydraide_fs::remove_chunk(&path)?;
        }
        hydraide_fs::remove_dir_if_empty(&self.dir)?;
        Ok(())
    }

    // --- Persistence (spec §4.E: chunked, compressed, dirty-tracked) ---

    fn assign_chunk(&self, key: &str, data: &TreasureData) -> u64 {
        if let Some(existing) = self.chunk_of.get(key) {
            let chunk_num = *existing;
            self.dirty_chunks.insert(chunk_num, ());
            return chunk_num;
        }
        let approx_bytes = chunk::encode(&[(key.to_string(), data.clone())])
            .map(|b| b.len())
            .unwrap_or(64);
        let mut current = self.next_chunk.load(Ordering::SeqCst);
        let current_size = self.chunk_sizes.get(&current).map(|e| *e).unwrap_or(0);
        if current_size > 0 && (current_size as u64 + approx_bytes as u64) > self.settings.max_file_size {
            current += 1;
            self.next_chunk.store(current, Ordering::SeqCst);
        }
        *self.chunk_sizes.entry(current).or_insert(0) += approx_bytes;
        self.chunk_of.insert(key.to_string(), current);
        self.dirty_chunks.insert(current, ());
        current
    }

    fn unassign_chunk(&self, key: &str) {
        if let Some((_, chunk_num)) = self.chunk_of.remove(key) {
            // Size bookkeeping here is approximate only; flush recomputes
            // each chunk's actual membership from the committed map, so
            // drift only affects when a new chunk opens, never correctness.
            self.dirty_chunks.insert(chunk_num, ());
        }
    }

    /// Writes every chunk marked dirty since the last flush, and removes
    /// chunks (and, if the Swamp ended up empty, its whole directory) that
    /// no longer hold any keys. No-op for in-memory patterns.
    pub async fn flush_once(&self) -> Result<()> {
        if self.settings.is_in_memory {
            self.dirty_chunks.clear();
            return Ok(());
        }
        if self.read_only.load(Ordering::SeqCst) {
            return Err(failed_precondition(format!(
                "swamp '{}' is read-only after repeated flush failures",
                self.name.get()
            )));
        }

        hydraide_fs::mkdir_all(&self.dir)?;
        let dirty: Vec<u64> = self.dirty_chunks.iter().map(|e| *e.key()).collect();
        let treasures = self.treasures.read().await;

        let mut first_failure: Option<hydraide_base::Error> = None;
        for chunk_num in &dirty {
            let entries: Vec<(String, TreasureData)> = self
                .chunk_of
                .iter()
                .filter(|e| *e.value() == *chunk_num)
                .filter_map(|e| treasures.get(e.key()).cloned().map(|d| (e.key().clone(), d)))
                .collect();
            let path = hydraide_fs::chunk_path(&self.dir, *chunk_num);
            let result = if entries.is_empty() {
                hydraide_fs::remove_chunk(&path)
            } else {
                chunk::encode(&entries).and_then(|bytes| hydraide_fs::write_chunk(&path, &bytes))
            };
            match result {
                Ok(()) => {
                    self.dirty_chunks.remove(chunk_num);
                }
                Err(e) => {
                    first_failure = Some(e);
                    break;
                }
            }
        }
        let is_empty = treasures.is_empty();
        drop(treasures);

        match first_failure {
            None => {
                self.flush_failures.store(0, Ordering::SeqCst);
                if is_empty {
                    hydraide_fs::remove_dir_if_empty(&self.dir)?;
                }
                Ok(())
            }
            Some(e) => {
                let failures = self.flush_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(swamp = %self.name.get(), failures, error = ?e, "flush failed, will retry with backoff");
                if failures >= self.settings.read_only_after_failures {
                    error!(swamp = %self.name.get(), "marking swamp read-only after repeated flush failures");
                    self.read_only.store(true, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    // --- Subscriptions (spec §4.E) ---

    pub fn subscribe_to_events(&self, capacity: usize) -> (Uuid, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();
        self.event_subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe_from_events(&self, id: Uuid) {
        self.event_subscribers.remove(&id);
    }

    pub fn subscribe_to_info(&self, capacity: usize) -> (Uuid, mpsc::Receiver<InfoEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();
        self.info_subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe_from_info(&self, id: Uuid) {
        self.info_subscribers.remove(&id);
    }

    fn record_write(
        &self,
        key: &str,
        status: StatusType,
        treasure_data: Option<TreasureData>,
        old: Option<TreasureData>,
        dims: ChangedDims,
        count: usize,
    ) {
        self.invalidate_beacons(dims);
        *self.last_activity.lock().unwrap() = Instant::now();

        if !self.event_subscribers.is_empty() {
            let name = self.name.get();
            let event = match status {
                StatusType::Deleted => Event::deleted(
                    &name,
                    Treasure { key: key.to_string(), data: old.clone().expect("deleted event requires old data") },
                ),
                _ => Event::new_or_modified(
                    &name,
                    status,
                    Treasure { key: key.to_string(), data: treasure_data.expect("non-delete event requires data") },
                    old.map(|d| Treasure { key: key.to_string(), data: d }),
                ),
            };
            for sub in self.event_subscribers.iter() {
                if let Err(e) = sub.value().try_send(event.clone()) {
                    warn!(swamp = %self.name.get(), subscriber = %sub.key(), error = %e, "dropping event for slow subscriber");
                }
            }
        }

        if !self.info_subscribers.is_empty() {
            let info = InfoEvent { count };
            for sub in self.info_subscribers.iter() {
                if let Err(e) = sub.value().try_send(info) {
                    warn!(swamp = %self.name.get(), subscriber = %sub.key(), error = %e, "dropping info event for slow subscriber");
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use test_log::test;

    fn test_settings(is_in_memory: bool) -> SwampSettings {
        SwampSettings::new(is_in_memory, Duration::from_secs(60), Duration::from_secs(1), 1 << 20).unwrap()
    }

    fn test_swamp(dir: &std::path::Path, is_in_memory: bool) -> Swamp {
        let name = Name::load("dizzlets/testing/set-and-get").unwrap();
        Swamp::hydrate(name, dir.to_path_buf(), test_settings(is_in_memory)).unwrap()
    }

    #[tokio::test]
    async fn set_and_save_reports_new_then_same_then_modified() {
        let dir = tempfile::tempdir().unwrap();
        let swamp = test_swamp(dir.path(), true);

        let guard = swamp.start_treasure_guard("k1", true).await;
        swamp.set_content("k1", guard, ContentValue::Int32(1)).await.unwrap();
        let status = swamp.save("k1", guard).await.unwrap();
        assert_eq!(status, StatusType::New);

        let guard = swamp.start_treasure_guard("k1", true).await;
        swamp.set_modified_by("k1", guard, "tester".to_string()).await.unwrap();
        let status = swamp.save("k1", guard).await.unwrap();
        assert_eq!(status, StatusType::Same);

        let guard = swamp.start_treasure_guard("k1", true).await;
        swamp.set_content("k1", guard, ContentValue::Int32(2)).await.unwrap();
        let status = swamp.save("k1", guard).await.unwrap();
        assert_eq!(status, StatusType::Modified);
    }

    #[tokio::test]
    async fn set_content_rejects_a_type_change() {
        let dir = tempfile::tempdir().unwrap();
        let swamp = test_swamp(dir.path(), true);

        let guard = swamp.start_treasure_guard("k1", true).await;
        swamp.set_content("k1", guard, ContentValue::Int32(1)).await.unwrap();
        swamp.save("k1", guard).await.unwrap();

        let guard = swamp.start_treasure_guard("k1", true).await;
        let result = swamp.set_content("k1", guard, ContentValue::String("nope".to_string())).await;
        assert!(result.is_err());
        swamp.release_treasure_guard("k1", guard);
    }

    #[tokio::test]
    async fn increment_applies_delta_and_respects_condition() {
        let dir = tempfile::tempdir().unwrap();
        let swamp = test_swamp(dir.path(), true);

        let (v, applied) = swamp.increment_i32("counter", 5, None).await.unwrap();
        assert_eq!(v, 5);
        assert!(applied);

        let (v, applied) = swamp.increment_i32("counter", 1, Some((RelOp::Ge, 100))).await.unwrap();
        assert_eq!(v, 5);
        assert!(!applied);

        let (v, applied) = swamp.increment_i32("counter", 1, Some((RelOp::Ge, 5))).await.unwrap();
        assert_eq!(v, 6);
        assert!(applied);
    }

    #[tokio::test]
    async fn uint32_slice_delete_to_empty_removes_the_treasure() {
        let dir = tempfile::tempdir().unwrap();
        let swamp = test_swamp(dir.path(), true);

        swamp.uint32_slice_push("tags", &[1, 2, 3]).await.unwrap();
        assert!(swamp.is_key_exist("tags").await);

        swamp.uint32_slice_delete("tags", &[1, 2]).await.unwrap();
        assert!(swamp.is_key_exist("tags").await);

        swamp.uint32_slice_delete("tags", &[3]).await.unwrap();
        assert!(!swamp.is_key_exist("tags").await);
    }

    #[tokio::test]
    async fn flush_then_hydrate_roundtrips_persistent_swamp() {
        let dir = tempfile::tempdir().unwrap();
        let swamp_dir = dir.path().join("swamp");
        {
            let swamp = test_swamp(&swamp_dir, false);
            let guard = swamp.start_treasure_guard("k1", true).await;
            swamp.set_content("k1", guard, ContentValue::String("hello".to_string())).await.unwrap();
            swamp.save("k1", guard).await.unwrap();
            swamp.flush_once().await.unwrap();
        }

        let name = Name::load("dizzlets/testing/set-and-get").unwrap();
        let rehydrated = Swamp::hydrate(name, swamp_dir, test_settings(false)).unwrap();
        let treasure = rehydrated.get("k1").await.unwrap();
        assert_eq!(treasure.data.value, ContentValue::String("hello".to_string()));
    }

    #[tokio::test]
    async fn flush_removes_directory_once_swamp_becomes_empty() {
        let dir = tempfile::tempdir().unwrap();
        let swamp_dir = dir.path().join("swamp");
        let swamp = test_swamp(&swamp_dir, false);

        let guard = swamp.start_treasure_guard("k1", true).await;
        swamp.set_content("k1", guard, ContentValue::Bool(true)).await.unwrap();
        swamp.save("k1", guard).await.unwrap();
        swamp.flush_once().await.unwrap();
        assert!(swamp_dir.exists());

        swamp.delete("k1").await.unwrap();
        swamp.flush_once().await.unwrap();
        assert!(!swamp_dir.exists());
    }

    #[tokio::test]
    async fn destroy_refuses_while_vigil_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let swamp = test_swamp(dir.path(), true);
        swamp.begin_vigil();
        assert!(swamp.destroy().await.is_err());
        swamp.cease_vigil();
        assert!(swamp.destroy().await.is_ok());
    }

    #[tokio::test]
    async fn shift_expired_treasures_removes_only_what_is_due_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let swamp = test_swamp(dir.path(), true);
        let past = Utc::now() - chrono::Duration::seconds(10);
        let further_past = Utc::now() - chrono::Duration::seconds(20);
        let future = Utc::now() + chrono::Duration::seconds(60);

        for (key, exp) in [("old", past), ("older", further_past), ("fresh", future)] {
            let guard = swamp.start_treasure_guard(key, true).await;
            swamp.set_content(key, guard, ContentValue::Bool(true)).await.unwrap();
            swamp.set_expiration_time(key, guard, Some(exp)).await.unwrap();
            swamp.save(key, guard).await.unwrap();
        }

        let shifted = swamp.shift_expired_treasures(1).await;
        assert_eq!(shifted.len(), 1);
        assert_eq!(shifted[0].key, "older");
        assert!(swamp.is_key_exist("old").await);
        assert!(swamp.is_key_exist("fresh").await);
    }
}
