//! Saved searches with sliding idle expiry.
//!
//! Each handle owns its state and a timer slot. The slot's epoch is bumped
//! whenever the timer is re-armed, and a firing timer removes the entry only
//! if its epoch is still current and no read is in flight. Removal drops the
//! state, which releases any snapshot it pins.

use crate::error::{IndexError, Result};
use crate::index::metrics::INDEX_METRICS;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

struct TimerSlot {
    epoch: u64,
    active_reads: usize,
    closed: bool,
    handle: Option<JoinHandle<()>>,
}

struct Entry<T> {
    state: Arc<T>,
    timeout: Duration,
    timer: Arc<Mutex<TimerSlot>>,
}

type Entries<T> = DashMap<Uuid, Entry<T>>;

/// Handle registry for saved searches
pub struct SavedSearchRegistry<T: Send + Sync + 'static> {
    backend: String,
    entries: Arc<Entries<T>>,
    runtime: Handle,
}

/// Validate a timeout given in seconds
pub fn saved_search_timeout(secs: i64) -> Result<Duration> {
    if secs < 1 {
        return Err(IndexError::InvalidTimeout(secs));
    }
    Ok(Duration::from_secs(secs as u64))
}

impl<T: Send + Sync + 'static> SavedSearchRegistry<T> {
    /// Timers run on the runtime this is created in
    pub fn new(backend: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            IndexError::Configuration(format!("Saved searches need a tokio runtime: {}", e))
        })?;
        Ok(Self {
            backend: backend.into(),
            entries: Arc::new(DashMap::new()),
            runtime,
        })
    }

    /// Register state under a new handle and start its expiry timer
    pub fn insert(&self, state: T, timeout: Duration) -> Uuid {
        let id = Uuid::new_v4();
        let timer = Arc::new(Mutex::new(TimerSlot {
            epoch: 0,
            active_reads: 0,
            closed: false,
            handle: None,
        }));
        {
            let mut slot = timer.lock();
            self.arm(&mut slot, id, timeout);
        }
        self.entries.insert(
            id,
            Entry {
                state: Arc::new(state),
                timeout,
                timer,
            },
        );
        INDEX_METRICS
            .saved_searches
            .with_label_values(&[self.backend.as_str()])
            .inc();
        debug!(backend = %self.backend, saved_search = %id, timeout_secs = timeout.as_secs(), "Saved search created");
        id
    }

    /// Run `read` against the saved state.
    ///
    /// The timer is re-armed before `read` starts and again when it ends;
    /// while it runs the handle cannot expire.
    pub async fn read<R, F, Fut>(&self, id: &Uuid, read: F) -> Result<R>
    where
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let lease = self.lease(id)?;
        let result = read(Arc::clone(&lease.state)).await;
        drop(lease);
        result
    }

    /// Keep a handle alive across work done outside the registry, such as
    /// resolving its hits against the relational store
    pub fn hold(&self, id: &Uuid) -> Result<SavedSearchHold> {
        Ok(SavedSearchHold {
            _lease: Box::new(self.lease(id)?),
        })
    }

    fn lease(&self, id: &Uuid) -> Result<ReadLease<T>> {
        let entry = self
            .entries
            .get(id)
            .ok_or(IndexError::SavedSearchNotFound(*id))?;
        let mut slot = entry.timer.lock();
        if slot.closed {
            return Err(IndexError::SavedSearchNotFound(*id));
        }
        slot.active_reads += 1;
        self.arm(&mut slot, *id, entry.timeout);
        Ok(ReadLease {
            id: *id,
            timeout: entry.timeout,
            timer: Arc::clone(&entry.timer),
            entries: Arc::downgrade(&self.entries),
            runtime: self.runtime.clone(),
            backend: self.backend.clone(),
            state: Arc::clone(&entry.state),
        })
    }

    /// Remove a handle; `false` when it was unknown or already expired
    pub fn remove(&self, id: &Uuid) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                close_slot(&entry.timer);
                INDEX_METRICS
                    .saved_searches
                    .with_label_values(&[self.backend.as_str()])
                    .dec();
                debug!(backend = %self.backend, saved_search = %id, "Saved search deleted");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every handle
    pub fn clear(&self) {
        let ids: Vec<Uuid> = self.entries.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.remove(&id);
        }
    }

    fn arm(&self, slot: &mut TimerSlot, id: Uuid, timeout: Duration) {
        arm_timer(
            slot,
            id,
            timeout,
            Arc::downgrade(&self.entries),
            &self.runtime,
            &self.backend,
        );
    }
}

impl<T: Send + Sync + 'static> Drop for SavedSearchRegistry<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

fn close_slot(timer: &Mutex<TimerSlot>) {
    let mut slot = timer.lock();
    slot.closed = true;
    slot.epoch += 1;
    if let Some(handle) = slot.handle.take() {
        handle.abort();
    }
}

fn arm_timer<T: Send + Sync + 'static>(
    slot: &mut TimerSlot,
    id: Uuid,
    timeout: Duration,
    entries: Weak<Entries<T>>,
    runtime: &Handle,
    backend: &str,
) {
    if slot.closed {
        return;
    }
    slot.epoch += 1;
    if let Some(previous) = slot.handle.take() {
        previous.abort();
    }

    let epoch = slot.epoch;
    let backend = backend.to_string();
    slot.handle = Some(runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(entries) = entries.upgrade() else {
            return;
        };
        let expired = entries.remove_if(&id, |_, entry| {
            let slot = entry.timer.lock();
            slot.epoch == epoch && slot.active_reads == 0 && !slot.closed
        });
        if let Some((_, entry)) = expired {
            {
                let mut slot = entry.timer.lock();
                slot.closed = true;
                // This task is the handle being dropped; never abort itself
                slot.handle = None;
            }
            INDEX_METRICS
                .saved_searches
                .with_label_values(&[backend.as_str()])
                .dec();
            debug!(backend = %backend, saved_search = %id, "Saved search expired");
        }
    }));
}

/// A saved search that cannot expire until this is dropped
pub struct SavedSearchHold {
    _lease: Box<dyn Send + Sync>,
}

/// An in-flight read; re-arms the timer when the read ends
struct ReadLease<T: Send + Sync + 'static> {
    id: Uuid,
    timeout: Duration,
    timer: Arc<Mutex<TimerSlot>>,
    entries: Weak<Entries<T>>,
    runtime: Handle,
    backend: String,
    state: Arc<T>,
}

impl<T: Send + Sync + 'static> Drop for ReadLease<T> {
    fn drop(&mut self) {
        let mut slot = self.timer.lock();
        slot.active_reads = slot.active_reads.saturating_sub(1);
        arm_timer(
            &mut slot,
            self.id,
            self.timeout,
            self.entries.clone(),
            &self.runtime,
            &self.backend,
        );
    }
}
