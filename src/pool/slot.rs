use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

use crate::driver::Connection;

/// Position of a leased connection: one of the fixed slots, or a one-shot
/// overflow connection opened outside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotIndex {
    Pooled(usize),
    Overflow,
}

impl SlotIndex {
    /// Numeric form used in logs; overflow is `-1`.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            SlotIndex::Pooled(i) => i64::try_from(i).unwrap_or(i64::MAX),
            SlotIndex::Overflow => -1,
        }
    }

    #[must_use]
    pub fn is_overflow(self) -> bool {
        matches!(self, SlotIndex::Overflow)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

impl Serialize for SlotIndex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

pub(crate) struct PooledConnection {
    pub(crate) conn: Box<dyn Connection>,
    pub(crate) opened_at: Instant,
}

impl PooledConnection {
    pub(crate) fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            conn,
            opened_at: Instant::now(),
        }
    }
}

/// One fixed pool position.
///
/// `held` is the slot lock: whoever flips it from `false` to `true` owns the
/// slot, including the right to replace its connection, until it flips it back.
pub(crate) struct Slot {
    pub(crate) index: usize,
    held: AtomicBool,
    retired: AtomicBool,
    conn: Mutex<Option<PooledConnection>>,
}

impl Slot {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            held: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            conn: Mutex::new(None),
        }
    }

    /// Non-blocking attempt to take the slot lock.
    pub(crate) fn try_claim(&self) -> bool {
        !self.is_retired()
            && self
                .held
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Drop the slot lock; returns whether it was held.
    pub(crate) fn unlock(&self) -> bool {
        self.held.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> Option<PooledConnection> {
        self.guard().take()
    }

    /// Store `conn`, handing back whatever connection the slot held before.
    pub(crate) fn put(&self, conn: PooledConnection) -> Option<PooledConnection> {
        self.guard().replace(conn)
    }

    fn guard(&self) -> MutexGuard<'_, Option<PooledConnection>> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
