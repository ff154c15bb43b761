//! Fixed-size connection pool with per-slot locks.
//!
//! Contention is per slot: `acquire` scans the slots in index order and takes
//! the first lock it can get without waiting. The pool-level lock is only taken
//! while the slots are first populated.

mod lease;
mod slot;
mod stats;
mod warm_up;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

pub use lease::Lease;
pub use slot::SlotIndex;
pub use stats::PoolStats;
pub use warm_up::{SlotProbe, SlotWarmUp, WarmUpReport, WARM_UP_QUERY};

use crate::config::PoolConfig;
use crate::dispatch::WorkerPool;
use crate::driver::Connection;
use crate::engine::Engine;
use crate::error::SqlPoolError;
use slot::{PooledConnection, Slot};

/// State shared between the pool and every outstanding [`Lease`].
pub(crate) struct PoolShared {
    pub(crate) engine: Engine,
    pub(crate) workers: Arc<WorkerPool>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) overflow_opened: AtomicU64,
    pub(crate) overflow_closed: AtomicU64,
    pub(crate) reopened: AtomicU64,
}

impl PoolShared {
    /// Drop the lock of slot `index`. Releasing an unknown or unheld slot is a
    /// caller bug; it is logged and otherwise ignored.
    pub(crate) fn unlock(&self, index: usize) -> bool {
        match self.slots.get(index) {
            None => {
                error!(slot = index, size = self.slots.len(), "release of unknown slot");
                false
            }
            Some(slot) => {
                if slot.unlock() {
                    true
                } else {
                    error!(slot = index, "release of a slot that was not held");
                    false
                }
            }
        }
    }

    /// Close `conn` without blocking an async caller.
    ///
    /// Drivers may block (or run their own runtime) while closing, so inside a
    /// tokio runtime the close is handed to a worker. On a plain thread, such
    /// as a worker itself, it closes in place.
    pub(crate) fn close_connection(&self, conn: Box<dyn Connection>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            conn.close();
            return;
        };
        if let Err(job) = self.workers.submit(Box::new(move || conn.close())) {
            // workers already shut down
            handle.spawn_blocking(job);
        }
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        for slot in &self.slots {
            if let Some(pooled) = slot.take() {
                self.close_connection(pooled.conn);
            }
        }
    }
}

pub struct SlotPool {
    shared: Arc<PoolShared>,
    config: PoolConfig,
    populated: Mutex<bool>,
}

impl SlotPool {
    /// Create the pool and open `config.size` connections, running each
    /// session statement before the connection is exposed. Blocks the calling
    /// thread while connecting.
    ///
    /// Slots whose connection cannot be opened are logged and retired for the
    /// life of the pool.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] for an invalid `config` and
    /// [`SqlPoolError::PoolInitError`] when no connection at all could be opened.
    pub fn initialize(
        engine: Engine,
        workers: Arc<WorkerPool>,
        config: PoolConfig,
    ) -> Result<Self, SqlPoolError> {
        config.validate()?;
        let slots = (0..config.size).map(Slot::new).collect();
        let pool = Self {
            shared: Arc::new(PoolShared {
                engine,
                workers,
                slots,
                overflow_opened: AtomicU64::new(0),
                overflow_closed: AtomicU64::new(0),
                reopened: AtomicU64::new(0),
            }),
            config,
            populated: Mutex::new(false),
        };
        pool.populate()?;
        Ok(pool)
    }

    fn populate(&self) -> Result<usize, SqlPoolError> {
        let mut populated = match self.populated.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *populated {
            return Ok(self.stats().in_service);
        }

        let size = self.shared.slots.len();
        let mut opened = 0;
        for slot in &self.shared.slots {
            match self.shared.engine.connect() {
                Ok(conn) => {
                    if let Some(previous) = slot.put(PooledConnection::new(conn)) {
                        self.shared.close_connection(previous.conn);
                    }
                    opened += 1;
                    debug!(slot = slot.index, "initialized connection {}/{size}", slot.index + 1);
                }
                Err(err) => {
                    slot.retire();
                    error!(slot = slot.index, error = %err, "failed to initialize connection");
                }
            }
        }

        if opened == 0 {
            return Err(SqlPoolError::PoolInitError(
                "failed to establish any database connections".into(),
            ));
        }
        if opened < size {
            warn!(opened, size, "connection pool partially initialized; failed slots stay out of rotation");
        }
        info!(connections = opened, "connection pool initialized");
        *populated = true;
        Ok(opened)
    }

    /// Lease a connection.
    ///
    /// Scans the slots in index order without waiting on any lock, up to
    /// `max_scan_passes` times with `scan_pause` between passes. A claimed slot
    /// whose connection is dead is reopened in place first. When every pass
    /// comes up empty an overflow connection is opened instead of queueing.
    ///
    /// # Errors
    /// Only fails if the overflow connection cannot be opened.
    pub async fn acquire(&self) -> Result<Lease, SqlPoolError> {
        let passes = self.config.max_scan_passes;
        for pass in 0..passes {
            for slot in &self.shared.slots {
                if !slot.try_claim() {
                    continue;
                }
                let lease = Lease::pooled(slot.index, slot.take(), self.shared.clone());
                match self.checkout(lease).await {
                    Ok(lease) => return Ok(lease),
                    Err(err) => {
                        error!(slot = slot.index, error = %err, "error checking connection");
                    }
                }
            }
            if pass + 1 < passes {
                tokio::time::sleep(self.config.scan_pause).await;
            }
        }
        self.open_overflow().await
    }

    async fn checkout(&self, lease: Lease) -> Result<Lease, SqlPoolError> {
        // On failure the lease is dropped on the worker, which releases the slot.
        self.shared
            .workers
            .run(move || {
                let mut lease = lease;
                lease.revalidate().map(|()| lease)
            })
            .await?
    }

    async fn open_overflow(&self) -> Result<Lease, SqlPoolError> {
        warn!(
            passes = self.config.max_scan_passes,
            "no connections available in pool, creating temporary connection"
        );
        let shared = self.shared.clone();
        let opened = self
            .shared
            .workers
            .run(move || -> Result<Lease, SqlPoolError> {
                let conn = shared.engine.connect()?;
                shared.overflow_opened.fetch_add(1, Ordering::Relaxed);
                Ok(Lease::overflow(conn, shared))
            })
            .await?;
        opened.map_err(|err| {
            error!(error = %err, "failed to create temporary connection");
            SqlPoolError::ConnectionError(format!("no database connections available: {err}"))
        })
    }

    /// Give a lease back. Equivalent to dropping it.
    pub fn release(&self, lease: Lease) {
        drop(lease);
    }

    /// Drop the lock of slot `index` directly.
    ///
    /// Releasing a slot that is not held, or an index outside the pool, is
    /// logged and returns `false`.
    pub fn release_slot(&self, index: usize) -> bool {
        self.shared.unlock(index)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let slots = &self.shared.slots;
        let retired = slots.iter().filter(|s| s.is_retired()).count();
        PoolStats {
            size: slots.len(),
            in_service: slots.len() - retired,
            busy: slots.iter().filter(|s| s.is_held()).count(),
            retired,
            overflow_opened: self.shared.overflow_opened.load(Ordering::Relaxed),
            overflow_closed: self.shared.overflow_closed.load(Ordering::Relaxed),
            reopened: self.shared.reopened.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.slots.len()
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.shared.engine
    }

    #[must_use]
    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.shared.workers
    }
}

impl std::fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::test_utils::{FakeConnector, eventually};

    fn pool_with(connector: &FakeConnector, config: PoolConfig) -> Result<SlotPool, SqlPoolError> {
        let engine = Engine::create(
            EngineConfig::mssql("db", "Loans", "sa", "pw"),
            Arc::new(connector.clone()),
        )?;
        SlotPool::initialize(engine, Arc::new(WorkerPool::new(4)?), config)
    }

    #[test]
    fn initialize_opens_every_slot_with_session_setup() {
        let connector = FakeConnector::new();
        let pool = pool_with(&connector, PoolConfig::default()).unwrap();
        assert_eq!(connector.state().opened(), 5);
        assert_eq!(connector.state().batches().len(), 5);
        let stats = pool.stats();
        assert_eq!((stats.size, stats.in_service, stats.busy), (5, 5, 0));
    }

    #[test]
    fn partial_initialization_retires_failed_slots() {
        let connector = FakeConnector::new();
        connector.state().fail_next_connects(2);
        let pool = pool_with(&connector, PoolConfig::default()).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.retired, 2);
        assert_eq!(stats.in_service, 3);
    }

    #[test]
    fn no_connections_is_fatal() {
        let connector = FakeConnector::new();
        connector.state().fail_next_connects(5);
        let err = pool_with(&connector, PoolConfig::default()).unwrap_err();
        assert!(matches!(err, SqlPoolError::PoolInitError(_)));
    }

    #[tokio::test]
    async fn scan_prefers_lowest_free_index() {
        let connector = FakeConnector::new();
        let pool = pool_with(&connector, PoolConfig::default().with_size(3)).unwrap();
        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(first.index(), SlotIndex::Pooled(0));
        assert_eq!(second.index(), SlotIndex::Pooled(1));
        drop(first);
        let third = pool.acquire().await.unwrap();
        assert_eq!(third.index(), SlotIndex::Pooled(0));
        assert_eq!(pool.stats().busy, 2);
    }

    #[tokio::test]
    async fn exhausted_pool_falls_back_to_overflow() {
        let connector = FakeConnector::new();
        let config = PoolConfig::default()
            .with_size(1)
            .with_scan(2, Duration::from_millis(1));
        let pool = pool_with(&connector, config).unwrap();
        let held = pool.acquire().await.unwrap();
        let extra = pool.acquire().await.unwrap();
        assert_eq!(extra.index(), SlotIndex::Overflow);
        assert_eq!(pool.stats().overflow_opened, 1);
        pool.release(extra);
        assert_eq!(pool.stats().overflow_closed, 1);
        let state = connector.state();
        assert!(eventually(|| state.closed() == 1).await);
        drop(held);
        assert_eq!(pool.stats().busy, 0);
    }

    #[tokio::test]
    async fn dropping_the_pool_closes_every_slot_connection() {
        let connector = FakeConnector::new();
        let pool = pool_with(&connector, PoolConfig::default().with_size(3)).unwrap();
        drop(pool);
        let state = connector.state();
        assert!(eventually(|| state.closed() == 3).await);
    }

    #[tokio::test]
    async fn double_release_is_logged_not_fatal() {
        let connector = FakeConnector::new();
        let pool = pool_with(&connector, PoolConfig::default().with_size(2)).unwrap();
        let lease = pool.acquire().await.unwrap();
        assert!(pool.release_slot(0));
        assert!(!pool.release_slot(0));
        assert!(!pool.release_slot(17));
        // The lease's own release finds the slot already unlocked.
        drop(lease);
        assert_eq!(pool.stats().busy, 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn expired_connection_is_recycled_on_checkout() {
        let connector = FakeConnector::new();
        let engine = Engine::create(
            EngineConfig::mssql("db", "Loans", "sa", "pw").with_recycle(Duration::ZERO),
            Arc::new(connector.clone()),
        )
        .unwrap();
        let pool = SlotPool::initialize(
            engine,
            Arc::new(WorkerPool::new(2).unwrap()),
            PoolConfig::default().with_size(1),
        )
        .unwrap();
        let lease = pool.acquire().await.unwrap();
        drop(lease);
        assert_eq!(pool.stats().reopened, 1);
        assert_eq!(connector.state().opened(), 2);
        assert_eq!(connector.state().closed(), 1);
    }
}
