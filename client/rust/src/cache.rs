//! Snapshot cache
//!
//! Holds the last pulled value per resource key together with the instant
//! the pull was issued. A write carrying an older issue instant than the
//! stored one is discarded, so a slow pull can never clobber a newer pull
//! or a local patch.

use crate::resource::{ResourceKey, ResourceValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Option<ResourceValue>,
    /// Issue instant of the pull (or local patch) that produced `value`
    pub fetched_at: Option<Instant>,
    pub invalidated: bool,
    /// Last poll failure, cleared by the next successful write
    pub last_error: Option<String>,
}

impl CacheEntry {
    fn empty() -> Self {
        CacheEntry {
            value: None,
            fetched_at: None,
            invalidated: false,
            last_error: None,
        }
    }
}

/// One optimistic change: the exact entry it replaced and the value it left
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    key: ResourceKey,
    pre_image: Option<CacheEntry>,
    patched: Option<ResourceValue>,
}

impl Patch {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Value the key held before the change
    pub fn before(&self) -> Option<&ResourceValue> {
        self.pre_image.as_ref().and_then(|e| e.value.as_ref())
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ResourceKey, CacheEntry>,
    /// Eviction instants; pulls issued before them are dropped
    evicted: HashMap<ResourceKey, Instant>,
}

impl CacheState {
    fn evicted_after(&self, key: &ResourceKey, issued_at: Instant) -> bool {
        matches!(self.evicted.get(key), Some(at) if issued_at < *at)
    }
}

#[derive(Default)]
pub struct SnapshotCache {
    state: Mutex<CacheState>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self, key: &ResourceKey) -> Option<ResourceValue> {
        self.lock().entries.get(key).and_then(|e| e.value.clone())
    }

    pub fn entry(&self, key: &ResourceKey) -> Option<CacheEntry> {
        self.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Store a pulled value. Returns false when the write was discarded
    /// because a later pull or patch already landed, or the key was evicted
    /// after this pull was issued.
    pub fn write(&self, key: &ResourceKey, value: ResourceValue, fetched_at: Instant) -> bool {
        let mut state = self.lock();
        if state.evicted_after(key, fetched_at) {
            log::debug!("Dropping pull of evicted key {}", key);
            return false;
        }
        if let Some(existing) = state.entries.get(key) {
            if matches!(existing.fetched_at, Some(stored) if fetched_at < stored) {
                log::debug!("Discarding out-of-order pull for {}", key);
                return false;
            }
        }

        state.evicted.remove(key);
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value: Some(value),
                fetched_at: Some(fetched_at),
                invalidated: false,
                last_error: None,
            },
        );
        true
    }

    /// True when the key has no value, was invalidated, or is older than `ttl`
    pub fn is_stale(&self, key: &ResourceKey, ttl: Duration, now: Instant) -> bool {
        match self.lock().entries.get(key) {
            Some(CacheEntry {
                value: Some(_),
                fetched_at: Some(at),
                invalidated: false,
                ..
            }) => now.saturating_duration_since(*at) >= ttl,
            _ => true,
        }
    }

    /// Instant at which the key turns stale, if it currently holds a fresh value
    pub fn fresh_until(&self, key: &ResourceKey, ttl: Duration) -> Option<Instant> {
        match self.lock().entries.get(key) {
            Some(CacheEntry {
                value: Some(_),
                fetched_at: Some(at),
                invalidated: false,
                ..
            }) => Some(*at + ttl),
            _ => None,
        }
    }

    /// Mark stale while keeping the value readable
    pub fn invalidate(&self, key: &ResourceKey) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            entry.invalidated = true;
        }
    }

    pub fn record_failure(&self, key: &ResourceKey, error: String, issued_at: Instant) {
        let mut state = self.lock();
        if state.evicted_after(key, issued_at) {
            return;
        }
        state
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::empty)
            .last_error = Some(error);
    }

    /// Apply a local change and stamp the entry with the current instant.
    /// When the closure leaves an absent value absent nothing is stored.
    pub fn patch<F>(&self, key: &ResourceKey, f: F) -> Patch
    where
        F: FnOnce(&mut Option<ResourceValue>),
    {
        let mut state = self.lock();
        let pre_image = state.entries.get(key).cloned();
        let patched = apply(&mut state, key, f);
        Patch {
            key: key.clone(),
            pre_image,
            patched,
        }
    }

    /// Take back one patch. While the key still holds exactly what the patch
    /// left, the pre-image is restored as it was; once anything else has
    /// touched the key only `inverse` is applied, so changes made by others
    /// survive.
    pub fn undo<F>(&self, patch: Patch, inverse: F)
    where
        F: FnOnce(&mut Option<ResourceValue>),
    {
        let mut state = self.lock();
        let current = state.entries.get(&patch.key).and_then(|e| e.value.as_ref());
        if current == patch.patched.as_ref() {
            match patch.pre_image {
                Some(entry) => {
                    state.entries.insert(patch.key, entry);
                }
                None => {
                    state.entries.remove(&patch.key);
                }
            }
        } else {
            apply(&mut state, &patch.key, inverse);
        }
    }

    pub fn evict(&self, key: &ResourceKey) {
        let mut state = self.lock();
        state.entries.remove(key);
        state.evicted.insert(key.clone(), Instant::now());
    }

    /// Evict every key for which `keep` returns false
    pub fn evict_where<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&ResourceKey) -> bool,
    {
        let mut state = self.lock();
        let doomed: Vec<ResourceKey> = state
            .entries
            .keys()
            .filter(|key| !keep(key))
            .cloned()
            .collect();
        let now = Instant::now();
        for key in &doomed {
            state.entries.remove(key);
            state.evicted.insert(key.clone(), now);
        }
        doomed.len()
    }

    /// Forget eviction instants older than `horizon`; no pull issued before
    /// them can still be outstanding
    pub fn prune_tombstones(&self, horizon: Duration) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let before = state.evicted.len();
        state
            .evicted
            .retain(|_, at| now.saturating_duration_since(*at) <= horizon);
        before - state.evicted.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `f` on the value of `key`, stamping the entry with "now"; returns
/// the resulting value
fn apply<F>(state: &mut CacheState, key: &ResourceKey, f: F) -> Option<ResourceValue>
where
    F: FnOnce(&mut Option<ResourceValue>),
{
    let existing = state.entries.get(key);
    let had_entry = existing.is_some();
    let mut value = existing.and_then(|e| e.value.clone());
    f(&mut value);

    if !had_entry && value.is_none() {
        return None;
    }
    let entry = state
        .entries
        .entry(key.clone())
        .or_insert_with(CacheEntry::empty);
    entry.value = value.clone();
    entry.fetched_at = Some(Instant::now());
    value
}
