//! Reconciliation scheduler
//!
//! Every subscribed key gets one driver task that pulls the key whenever
//! its cached value turns stale or a refresh is forced. Keys without
//! subscribers are not polled at all.
//!
//! Per key: `Idle -> Fetching -> Idle` on success and
//! `Idle -> Fetching -> Backoff -> Idle` on failure, where the backoff lasts
//! one TTL of the key.

use crate::cache::SnapshotCache;
use crate::config::SyncConfig;
use crate::models::{sort_messages, ConversationSummary};
use crate::remote::{RemoteResult, RemoteStore};
use crate::resource::{ResourceKey, ResourceValue};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::{sleep, sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Backoff,
}

struct KeyState {
    subscribers: usize,
    /// Identifies the driver task currently owning this key
    generation: u64,
    phase: Phase,
    /// Set by forced refreshes, consumed by the next pull
    forced: bool,
    wake: Arc<Notify>,
}

struct SchedulerInner {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<SnapshotCache>,
    sync: SyncConfig,
    keys: Mutex<HashMap<ResourceKey, KeyState>>,
    next_generation: AtomicU64,
}

impl SchedulerInner {
    fn keys(&self) -> MutexGuard<'_, HashMap<ResourceKey, KeyState>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, key: &ResourceKey, generation: u64) -> bool {
        matches!(self.keys().get(key), Some(state) if state.generation == generation)
    }

    fn set_phase(&self, key: &ResourceKey, generation: u64, phase: Phase) {
        if let Some(state) = self.keys().get_mut(key) {
            if state.generation == generation {
                state.phase = phase;
            }
        }
    }

    /// Returns whether a forced refresh is pending and clears it
    fn take_forced(&self, key: &ResourceKey, generation: u64) -> bool {
        match self.keys().get_mut(key) {
            Some(state) if state.generation == generation => std::mem::take(&mut state.forced),
            _ => false,
        }
    }
}

/// Handle to the polling machinery; cheap to clone
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Arc<SnapshotCache>, sync: SyncConfig) -> Self {
        Scheduler {
            inner: Arc::new(SchedulerInner {
                remote,
                cache,
                sync,
                keys: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.inner.sync
    }

    /// Register interest in a key. The first subscriber starts its driver.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, key: ResourceKey) -> Subscription {
        let mut keys = self.inner.keys();
        match keys.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                state.subscribers += 1;
                log::debug!("{} now has {} subscribers", key, state.subscribers);
            }
            Entry::Vacant(vacant) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let wake = Arc::new(Notify::new());
                vacant.insert(KeyState {
                    subscribers: 1,
                    generation,
                    phase: Phase::Idle,
                    forced: false,
                    wake: wake.clone(),
                });
                log::debug!("Scheduling {}", key);
                tokio::spawn(drive(self.inner.clone(), key.clone(), generation, wake));
            }
        }
        drop(keys);

        Subscription {
            key,
            scheduler: self.clone(),
            active: true,
        }
    }

    fn release(&self, key: &ResourceKey) {
        let mut keys = self.inner.keys();
        let remaining = match keys.get_mut(key) {
            Some(state) => {
                state.subscribers = state.subscribers.saturating_sub(1);
                state.subscribers
            }
            None => return,
        };
        if remaining == 0 {
            if let Some(state) = keys.remove(key) {
                // Wake the driver so it notices it no longer owns the key
                state.wake.notify_one();
            }
            log::debug!("Unscheduling {}", key);
        }
    }

    /// Force a pull of `key`. Forces arriving during a pull coalesce into a
    /// single follow-up pull; an unobserved key is only invalidated.
    pub fn refresh(&self, key: &ResourceKey) {
        {
            let mut keys = self.inner.keys();
            if let Some(state) = keys.get_mut(key) {
                state.forced = true;
                state.wake.notify_one();
                return;
            }
        }
        self.inner.cache.invalidate(key);
    }

    pub fn is_tracked(&self, key: &ResourceKey) -> bool {
        self.inner.keys().contains_key(key)
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner.keys().get(key).map_or(0, |s| s.subscribers)
    }

    /// `None` when the key is not scheduled
    pub fn phase(&self, key: &ResourceKey) -> Option<Phase> {
        self.inner.keys().get(key).map(|s| s.phase)
    }

    pub fn tracked_keys(&self) -> Vec<ResourceKey> {
        self.inner.keys().keys().cloned().collect()
    }
}

/// A consumer's interest in one key; dropping it unsubscribes
pub struct Subscription {
    key: ResourceKey,
    scheduler: Scheduler,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn refresh(&self) {
        self.scheduler.refresh(&self.key);
    }

    /// Idempotent
    pub fn unsubscribe(&mut self) {
        if std::mem::take(&mut self.active) {
            self.scheduler.release(&self.key);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}

/// Driver loop of one key, alive while its generation owns the key
async fn drive(inner: Arc<SchedulerInner>, key: ResourceKey, generation: u64, wake: Arc<Notify>) {
    let ttl = key.ttl(&inner.sync);

    loop {
        if !inner.is_current(&key, generation) {
            break;
        }

        let forced = inner.take_forced(&key, generation);
        if !forced && !inner.cache.is_stale(&key, ttl, Instant::now()) {
            let deadline = inner
                .cache
                .fresh_until(&key, ttl)
                .unwrap_or_else(Instant::now);
            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = wake.notified() => {}
            }
            continue;
        }

        inner.set_phase(&key, generation, Phase::Fetching);
        let issued_at = Instant::now();
        match fetch_resource(inner.remote.as_ref(), &key).await {
            Ok(value) => {
                // Written even if the last subscriber left meanwhile,
                // unless the key was evicted after the pull was issued
                if inner.cache.write(&key, value, issued_at) {
                    log::debug!("Pulled {}", key);
                }
                inner.set_phase(&key, generation, Phase::Idle);
            }
            Err(e) => {
                log::warn!("Pull of {} failed: {}", key, e);
                inner.cache.record_failure(&key, e.to_string(), issued_at);
                inner.set_phase(&key, generation, Phase::Backoff);
                sleep(ttl).await;
                inner.set_phase(&key, generation, Phase::Idle);
            }
        }
    }

    log::debug!("Driver for {} stopped", key);
}

/// Issue the remote read that backs `key`
pub async fn fetch_resource(remote: &dyn RemoteStore, key: &ResourceKey) -> RemoteResult<ResourceValue> {
    match key {
        ResourceKey::Conversations(me) => {
            let ids = remote.list_conversations().await?;
            let summaries = ids
                .into_iter()
                .filter_map(|id| match ConversationSummary::from_id(id, me) {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        log::warn!("Skipping conversation listed for {}: {}", me, e);
                        None
                    }
                })
                .collect();
            Ok(ResourceValue::Conversations(summaries))
        }
        ResourceKey::Messages(id) => {
            let mut messages = remote.list_messages(id).await?;
            sort_messages(&mut messages);
            Ok(ResourceValue::Messages(messages))
        }
        ResourceKey::CallHistory => Ok(ResourceValue::CallHistory(remote.get_call_history().await?)),
        ResourceKey::Profile(principal) => {
            Ok(ResourceValue::Profile(remote.get_profile(principal).await?))
        }
        ResourceKey::UserSearch(query) => {
            Ok(ResourceValue::UserSearch(remote.search_users(query).await?))
        }
    }
}
