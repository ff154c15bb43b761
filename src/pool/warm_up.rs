use serde::Serialize;
use tracing::{debug, info, warn};

use super::SlotPool;
use super::lease::Lease;
use crate::error::SqlPoolError;
use crate::types::QueryParams;

/// Trivial statement used to probe each slot at start-up.
pub const WARM_UP_QUERY: &str = "SELECT 1 AS connection_test";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotProbe {
    Healthy,
    Failed { error: String },
    /// Another caller held the slot when warm-up reached it.
    Busy,
    /// The slot never opened a connection.
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotWarmUp {
    pub index: usize,
    #[serde(flatten)]
    pub probe: SlotProbe,
}

/// Per-slot outcome of [`SlotPool::warm_up`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmUpReport {
    pub slots: Vec<SlotWarmUp>,
}

impl WarmUpReport {
    #[must_use]
    pub fn healthy(&self) -> usize {
        self.count(|p| matches!(p, SlotProbe::Healthy))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|p| matches!(p, SlotProbe::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&SlotProbe) -> bool) -> usize {
        self.slots.iter().filter(|s| pred(&s.probe)).count()
    }
}

impl SlotPool {
    /// Run [`WARM_UP_QUERY`] once on every slot.
    ///
    /// Failures are logged and reported, never returned: a partly healthy pool
    /// keeps serving. A slot that fails has its connection closed so that its
    /// next checkout opens a fresh one.
    pub async fn warm_up(&self) -> WarmUpReport {
        info!("warming up connection pool");
        let mut report = WarmUpReport::default();
        for slot in &self.shared.slots {
            let probe = if slot.is_retired() {
                SlotProbe::Retired
            } else if !slot.try_claim() {
                SlotProbe::Busy
            } else {
                let lease = Lease::pooled(slot.index, slot.take(), self.shared.clone());
                let outcome = self
                    .shared
                    .workers
                    .run(move || {
                        let mut lease = lease;
                        probe_connection(&mut lease)
                    })
                    .await;
                match outcome.and_then(|probed| probed) {
                    Ok(()) => SlotProbe::Healthy,
                    Err(err) => SlotProbe::Failed {
                        error: err.to_string(),
                    },
                }
            };

            match &probe {
                SlotProbe::Healthy => debug!(slot = slot.index, "connection warmed up"),
                SlotProbe::Failed { error } => {
                    warn!(slot = slot.index, error = %error, "connection failed warm-up probe");
                }
                SlotProbe::Busy | SlotProbe::Retired => {
                    debug!(slot = slot.index, probe = ?probe, "slot skipped during warm-up");
                }
            }
            report.slots.push(SlotWarmUp {
                index: slot.index,
                probe,
            });
        }
        info!(
            healthy = report.healthy(),
            failed = report.failed(),
            "connection pool warm-up completed"
        );
        report
    }
}

/// Probe the connection as it is, without reopening it first.
fn probe_connection(lease: &mut Lease) -> Result<(), SqlPoolError> {
    if !lease.has_open_connection() {
        lease.discard();
        return Err(SqlPoolError::ConnectionError("connection is closed".into()));
    }
    let outcome = lease
        .connection()
        .and_then(|conn| conn.query(WARM_UP_QUERY, &QueryParams::new()));
    if let Err(err) = outcome {
        lease.discard();
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{EngineConfig, PoolConfig};
    use crate::dispatch::WorkerPool;
    use crate::engine::Engine;
    use crate::test_utils::FakeConnector;

    #[tokio::test]
    async fn reports_each_slot_and_skips_retired() {
        let connector = FakeConnector::new();
        connector.state().fail_next_connects(1);
        let engine = Engine::create(
            EngineConfig::mssql("db", "Loans", "sa", "pw"),
            Arc::new(connector.clone()),
        )
        .unwrap();
        let pool = SlotPool::initialize(
            engine,
            Arc::new(WorkerPool::new(2).unwrap()),
            PoolConfig::default().with_size(3),
        )
        .unwrap();
        // slot 0 retired; slot 1 holds connection 0
        connector.state().kill_connection(0);

        let report = pool.warm_up().await;
        assert_eq!(report.slots[0].probe, SlotProbe::Retired);
        assert!(matches!(report.slots[1].probe, SlotProbe::Failed { .. }));
        assert_eq!(report.slots[2].probe, SlotProbe::Healthy);
        assert_eq!((report.healthy(), report.failed()), (1, 1));
        assert_eq!(pool.stats().busy, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["slots"][0]["status"], "retired");
        assert_eq!(json["slots"][2]["index"], 2);
    }
}
