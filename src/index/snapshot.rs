//! Reference-counted reader generations.
//!
//! A [`SnapshotPool`] owns the current generation of a searchable view.
//! Readers pin it through [`Snapshot`] guards; a refresh installs a newer
//! generation and retires the old one, which is closed once the last guard
//! is dropped. Closing happens exactly once per generation.

use crate::error::{IndexError, Result};
use crate::index::metrics::INDEX_METRICS;
use parking_lot::{Mutex, RwLock};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Produces the latest view and its version, given the installed version;
/// `None` when nothing changed since
pub type SnapshotLoader<S> = Box<dyn Fn(Option<u64>) -> Result<Option<(u64, S)>> + Send + Sync>;

/// One reader generation
pub struct Generation<S> {
    version: u64,
    snapshot: S,
    refs: AtomicUsize,
    retired: AtomicBool,
    closed: AtomicBool,
    open: Arc<AtomicUsize>,
    backend: String,
}

impl<S> Generation<S> {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        if self.refs.load(Ordering::SeqCst) == 0 {
            self.close();
        }
    }

    fn release(&self) {
        let previous = self.refs.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.retired.load(Ordering::SeqCst) {
            self.close();
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
            INDEX_METRICS
                .open_generations
                .with_label_values(&[self.backend.as_str()])
                .dec();
            debug!(backend = %self.backend, version = self.version, "Reader generation closed");
        }
    }
}

/// A pinned generation; releases its reference on drop
pub struct Snapshot<S> {
    generation: Arc<Generation<S>>,
}

impl<S> Snapshot<S> {
    pub fn version(&self) -> u64 {
        self.generation.version
    }

    pub fn generation(&self) -> &Arc<Generation<S>> {
        &self.generation
    }
}

impl<S> Deref for Snapshot<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.generation.snapshot
    }
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        self.generation.refs.fetch_add(1, Ordering::SeqCst);
        Self {
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<S> Drop for Snapshot<S> {
    fn drop(&mut self) {
        self.generation.release();
    }
}

struct PoolInner<S> {
    backend: String,
    loader: SnapshotLoader<S>,
    current: RwLock<Option<Arc<Generation<S>>>>,
    open: Arc<AtomicUsize>,
    poisoned: AtomicBool,
    refresh_on_acquire: AtomicBool,
}

impl<S> PoolInner<S> {
    fn refresh(&self) -> Result<bool> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(poisoned(&self.backend));
        }
        let installed = self.current.read().as_ref().map(|g| g.version);
        let Some((version, snapshot)) = (self.loader)(installed)? else {
            return Ok(false);
        };

        let mut current = self.current.write();
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(poisoned(&self.backend));
        }
        if current.as_ref().map(|g| g.version) == Some(version) {
            return Ok(false);
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        INDEX_METRICS
            .open_generations
            .with_label_values(&[self.backend.as_str()])
            .inc();
        let previous = current.replace(Arc::new(Generation {
            version,
            snapshot,
            refs: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            open: Arc::clone(&self.open),
            backend: self.backend.clone(),
        }));
        drop(current);

        if let Some(previous) = previous {
            previous.retire();
        }
        debug!(backend = %self.backend, version, "Reader generation installed");
        Ok(true)
    }
}

fn poisoned(backend: &str) -> IndexError {
    IndexError::ResourceExhaustion(format!("{} reader pool is poisoned", backend))
}

/// Pool of reader generations with optional background refresh
pub struct SnapshotPool<S> {
    inner: Arc<PoolInner<S>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Send + Sync + 'static> SnapshotPool<S> {
    /// Create a pool and load the first generation
    pub fn new(backend: impl Into<String>, loader: SnapshotLoader<S>) -> Result<Self> {
        let inner = Arc::new(PoolInner {
            backend: backend.into(),
            loader,
            current: RwLock::new(None),
            open: Arc::new(AtomicUsize::new(0)),
            poisoned: AtomicBool::new(false),
            refresh_on_acquire: AtomicBool::new(true),
        });
        inner.refresh()?;
        Ok(Self {
            inner,
            refresh_task: Mutex::new(None),
        })
    }

    /// Pin the current generation.
    ///
    /// Without a background refresher every acquire refreshes first, so
    /// reads observe all committed writes.
    pub fn acquire(&self) -> Result<Snapshot<S>> {
        if self.inner.refresh_on_acquire.load(Ordering::SeqCst) {
            self.inner.refresh()?;
        }
        let current = self.inner.current.read();
        let generation = current
            .as_ref()
            .ok_or_else(|| poisoned(&self.inner.backend))?;
        generation.refs.fetch_add(1, Ordering::SeqCst);
        Ok(Snapshot {
            generation: Arc::clone(generation),
        })
    }

    /// Load and install a newer generation; `false` when nothing changed
    pub fn refresh(&self) -> Result<bool> {
        self.inner.refresh()
    }

    /// Refresh every `interval` on the current runtime instead of on acquire
    pub fn start_refresh(&self, interval: Duration) {
        let weak: Weak<PoolInner<S>> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = inner.refresh() {
                    warn!(backend = %inner.backend, error = %e, "Background refresh failed");
                    if inner.poisoned.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        });

        self.inner.refresh_on_acquire.store(false, Ordering::SeqCst);
        if let Some(previous) = self.refresh_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_refresh(&self) {
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
        self.inner.refresh_on_acquire.store(true, Ordering::SeqCst);
    }

    /// Fail every future acquire after the engine ran out of resources.
    /// The current generation is retired and closes once its readers finish.
    pub fn poison(&self) {
        if self.inner.poisoned.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(backend = %self.inner.backend, "Reader pool poisoned");
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
        let previous = self.inner.current.write().take();
        if let Some(previous) = previous {
            previous.retire();
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.inner.poisoned.load(Ordering::SeqCst)
    }

    /// Generations installed and not yet closed
    pub fn open_generations(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Retire the current generation and stop refreshing
    pub fn close(&self) {
        self.stop_refresh();
        self.inner.refresh_on_acquire.store(false, Ordering::SeqCst);
        self.inner.poisoned.store(true, Ordering::SeqCst);
        let previous = self.inner.current.write().take();
        if let Some(previous) = previous {
            previous.retire();
        }
    }
}

impl<S> Drop for SnapshotPool<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn counting_pool() -> (SnapshotPool<u64>, Arc<AtomicU64>) {
        let version = Arc::new(AtomicU64::new(1));
        let source = Arc::clone(&version);
        let loader: SnapshotLoader<u64> = Box::new(move |_installed| {
            let v = source.load(Ordering::SeqCst);
            Ok(Some((v, v * 10)))
        });
        (SnapshotPool::new("test", loader).unwrap(), version)
    }

    #[test]
    fn test_acquire_pins_generation() {
        let (pool, version) = counting_pool();
        let first = pool.acquire().unwrap();
        assert_eq!(*first, 10);

        version.store(2, Ordering::SeqCst);
        let second = pool.acquire().unwrap();
        assert_eq!(*second, 20);

        // The pinned view is still readable and still open
        assert_eq!(*first, 10);
        assert!(!first.generation().is_closed());
        assert_eq!(pool.open_generations(), 2);

        let old = Arc::clone(first.generation());
        drop(first);
        assert!(old.is_closed());
        assert_eq!(pool.open_generations(), 1);
    }

    #[test]
    fn test_unchanged_version_is_not_reinstalled() {
        let (pool, _version) = counting_pool();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.version(), b.version());
        assert!(!pool.refresh().unwrap());
        assert_eq!(pool.open_generations(), 1);
    }

    #[test]
    fn test_loader_skips_unchanged() {
        let loads = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&loads);
        let loader: SnapshotLoader<&'static str> = Box::new(move |installed| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(match installed {
                Some(_) => None,
                None => Some((1, "first")),
            })
        });
        let pool = SnapshotPool::new("test", loader).unwrap();
        assert_eq!(*pool.acquire().unwrap(), "first");
        assert!(!pool.refresh().unwrap());
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(pool.open_generations(), 1);
    }

    #[test]
    fn test_close_happens_once_across_clones() {
        let (pool, version) = counting_pool();
        let snapshot = pool.acquire().unwrap();
        let clones: Vec<_> = (0..8).map(|_| snapshot.clone()).collect();
        let generation = Arc::clone(snapshot.generation());

        version.store(2, Ordering::SeqCst);
        pool.refresh().unwrap();
        drop(snapshot);
        assert!(!generation.is_closed());

        let handles: Vec<_> = clones
            .into_iter()
            .map(|clone| std::thread::spawn(move || drop(clone)))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(generation.is_closed());
        assert_eq!(pool.open_generations(), 1);
    }

    #[test]
    fn test_poison_fails_acquire() {
        let (pool, _version) = counting_pool();
        let held = pool.acquire().unwrap();
        pool.poison();

        let err = pool.acquire().err().unwrap();
        assert!(err.is_resource_exhaustion());
        assert!(!held.generation().is_closed());
        drop(held);
        assert_eq!(pool.open_generations(), 0);
    }

    #[tokio::test]
    async fn test_background_refresh() {
        let (pool, version) = counting_pool();
        pool.start_refresh(Duration::from_millis(20));

        version.store(5, Ordering::SeqCst);
        // Acquire no longer refreshes on its own
        assert_eq!(*pool.acquire().unwrap(), 10);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*pool.acquire().unwrap(), 50);
        pool.stop_refresh();
    }
}
