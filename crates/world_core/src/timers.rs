//! Cancellable one-shot timers keyed by the entity they act on.
//!
//! Scheduling a timer for a key that already has one replaces (and aborts)
//! the old one. A timer removes its own entry right before firing, so the
//! callback may freely cancel timers for the same key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct TimerSet<K: Eq + Hash> {
    timers: Arc<DashMap<K, Pending>>,
    next_generation: AtomicU64,
}

impl<K> Default for TimerSet<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TimerSet<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Runs `callback` after `delay` unless cancelled first. Returns `false`
    /// when called outside a tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, timer for {:?} not scheduled", key);
            return false;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = self.timers.clone();
        let task_key = key.clone();

        // The entry guard is held until the handle is stored, so a zero-delay
        // task cannot look for its own entry before it exists.
        let slot = self.timers.entry(key);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_current = timers
                .remove_if(&task_key, |_, pending| pending.generation == generation)
                .is_some();
            if still_current {
                callback();
            }
        });

        match slot {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(Pending { generation, handle });
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Pending { generation, handle });
            }
        }
        true
    }

    pub fn cancel(&self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some((_, pending)) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<K: Eq + Hash> Drop for TimerSet<K> {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
    }
}
