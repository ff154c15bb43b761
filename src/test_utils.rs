//! Instrumented in-memory driver for tests and benches.
//!
//! Every connection records what ran on it, and the shared [`FakeState`]
//! flags any statement that starts while another one is still running on the
//! same connection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::driver::{Connection, Connector};
use crate::error::SqlPoolError;
use crate::results::ResultSet;
use crate::types::{QueryParams, RowValues};

/// Statements containing this marker fail like a server-side error.
pub const FAIL_MARKER: &str = "RAISERROR";

#[derive(Debug, Default)]
pub struct FakeState {
    next_id: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    failing_connects: AtomicUsize,
    overlaps: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Mutex<Duration>,
    busy: Mutex<HashSet<usize>>,
    broken: Mutex<HashSet<usize>>,
    dead: Mutex<HashSet<usize>>,
    batches: Mutex<Vec<String>>,
    queries: Mutex<Vec<(usize, String)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl FakeState {
    /// Connections opened so far (ids are handed out from 0 in open order).
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Statements that started on a connection already running another one.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Highest number of statements observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Make every statement sleep for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Every later statement on connection `id` fails, though it still looks open.
    pub fn break_connection(&self, id: usize) {
        lock(&self.broken).insert(id);
    }

    /// Connection `id` reports itself closed from now on.
    pub fn kill_connection(&self, id: usize) {
        lock(&self.dead).insert(id);
    }

    pub fn batches(&self) -> Vec<String> {
        lock(&self.batches).clone()
    }

    /// `(connection id, sql)` for every query that reached a connection.
    pub fn queries(&self) -> Vec<(usize, String)> {
        lock(&self.queries).clone()
    }

    fn enter(&self, id: usize) {
        if !lock(&self.busy).insert(id) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self, id: usize) {
        lock(&self.busy).remove(&id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Poll `check` until it holds, for up to two seconds.
///
/// Connections released from async code are closed on a worker, so counters
/// such as [`FakeState::closed`] settle shortly after the release returns.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> Arc<FakeState> {
        self.state.clone()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _config: &EngineConfig) -> Result<Box<dyn Connection>, SqlPoolError> {
        let refused = self
            .state
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SqlPoolError::ConnectionError(
                "fake server refused the connection".into(),
            ));
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            id,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    id: usize,
    state: Arc<FakeState>,
    closed: bool,
}

impl FakeConnection {
    fn check(&self, sql: &str) -> Result<(), SqlPoolError> {
        if self.is_closed() {
            return Err(SqlPoolError::ConnectionError(format!(
                "connection {} is closed",
                self.id
            )));
        }
        if lock(&self.state.broken).contains(&self.id) {
            return Err(SqlPoolError::DriverError(format!(
                "connection {} reset by peer",
                self.id
            )));
        }
        if sql.contains(FAIL_MARKER) {
            return Err(SqlPoolError::DriverError(format!(
                "Incorrect syntax near '{FAIL_MARKER}'."
            )));
        }
        Ok(())
    }
}

impl Connection for FakeConnection {
    /// Answers with one row: `connection_id`, `query`, then one column per parameter.
    fn query(&mut self, sql: &str, params: &QueryParams) -> Result<ResultSet, SqlPoolError> {
        self.state.enter(self.id);
        let latency = *lock(&self.state.latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        lock(&self.state.queries).push((self.id, sql.to_string()));
        let outcome = self.check(sql);
        self.state.leave(self.id);
        outcome?;

        let mut columns = vec!["connection_id".to_string(), "query".to_string()];
        let id = i64::try_from(self.id).unwrap_or(i64::MAX);
        let mut values = vec![RowValues::Int(id), RowValues::Text(sql.to_string())];
        for (name, value) in params {
            columns.push(name.clone());
            values.push(value.clone());
        }
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(columns));
        rs.add_row_values(values);
        Ok(rs)
    }

    /// Answers immediately, without the injected latency.
    fn ping(&mut self) -> Result<(), SqlPoolError> {
        self.check("SELECT 1")
    }

    fn batch(&mut self, sql: &str) -> Result<(), SqlPoolError> {
        self.check(sql)?;
        lock(&self.state.batches).push(sql.to_string());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || lock(&self.state.dead).contains(&self.id)
    }

    fn close(mut self: Box<Self>) {
        self.closed = true;
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}
