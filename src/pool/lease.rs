use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use super::PoolShared;
use super::slot::{PooledConnection, SlotIndex};
use crate::driver::Connection;
use crate::error::SqlPoolError;

/// Exclusive use of one connection.
///
/// Dropping the lease releases it exactly once: a pooled connection goes back
/// into its slot and the slot lock is dropped, an overflow connection is
/// closed.
pub struct Lease {
    index: SlotIndex,
    conn: Option<PooledConnection>,
    shared: Arc<PoolShared>,
}

impl Lease {
    pub(crate) fn pooled(
        index: usize,
        conn: Option<PooledConnection>,
        shared: Arc<PoolShared>,
    ) -> Self {
        Self {
            index: SlotIndex::Pooled(index),
            conn,
            shared,
        }
    }

    pub(crate) fn overflow(conn: Box<dyn Connection>, shared: Arc<PoolShared>) -> Self {
        Self {
            index: SlotIndex::Overflow,
            conn: Some(PooledConnection::new(conn)),
            shared,
        }
    }

    #[must_use]
    pub fn index(&self) -> SlotIndex {
        self.index
    }

    /// The leased connection. Blocking: only call it from a worker thread.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConnectionError`] if the connection was discarded.
    pub fn connection(&mut self) -> Result<&mut dyn Connection, SqlPoolError> {
        match self.conn.as_mut() {
            Some(pooled) => Ok(pooled.conn.as_mut()),
            None => Err(SqlPoolError::ConnectionError(format!(
                "slot {} has no open connection",
                self.index
            ))),
        }
    }

    /// Give up the connection; a pooled slot reopens on its next checkout.
    pub(crate) fn discard(&mut self) {
        if let Some(pooled) = self.conn.take() {
            self.shared.close_connection(pooled.conn);
        }
    }

    pub(crate) fn has_open_connection(&self) -> bool {
        self.conn.as_ref().is_some_and(|pooled| !pooled.conn.is_closed())
    }

    /// Make sure a pooled slot holds a usable connection, replacing it in
    /// place when it is missing, closed, past the recycle interval, or fails
    /// the pre-ping. Blocking.
    pub(crate) fn revalidate(&mut self) -> Result<(), SqlPoolError> {
        let SlotIndex::Pooled(slot) = self.index else {
            return Ok(());
        };
        let config = self.shared.engine.config();
        let reason = match self.conn.as_mut() {
            None => Some("no connection"),
            Some(pooled) => {
                if pooled.conn.is_closed() {
                    Some("connection closed")
                } else if pooled.opened_at.elapsed() >= config.recycle {
                    Some("recycle interval elapsed")
                } else if config.pre_ping && pooled.conn.ping().is_err() {
                    Some("pre-ping failed")
                } else {
                    None
                }
            }
        };
        let Some(reason) = reason else {
            return Ok(());
        };

        warn!(slot, reason, "reopening pooled connection");
        self.discard();
        let conn = self.shared.engine.connect()?;
        self.conn = Some(PooledConnection::new(conn));
        self.shared.reopened.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("index", &self.index)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        match self.index {
            SlotIndex::Pooled(index) => {
                if let Some(pooled) = self.conn.take() {
                    let displaced = match self.shared.slots.get(index) {
                        Some(slot) => slot.put(pooled),
                        None => Some(pooled),
                    };
                    if let Some(displaced) = displaced {
                        self.shared.close_connection(displaced.conn);
                    }
                }
                self.shared.unlock(index);
            }
            SlotIndex::Overflow => {
                // May run on the async caller's thread; the close itself never does.
                self.discard();
                self.shared.overflow_closed.fetch_add(1, Ordering::Relaxed);
                debug!("overflow connection closed");
            }
        }
    }
}
