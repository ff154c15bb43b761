use serde::Serialize;

/// Point-in-time view of the slot pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Fixed number of slots
    pub size: usize,
    /// Slots that can still be leased
    pub in_service: usize,
    /// Slots whose lock is currently held
    pub busy: usize,
    /// Slots that never opened a connection and are out of rotation
    pub retired: usize,
    pub overflow_opened: u64,
    pub overflow_closed: u64,
    /// Dead, expired or empty slot connections replaced on checkout
    pub reopened: u64,
}

impl PoolStats {
    /// Idle in-service slots.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.in_service.saturating_sub(self.busy)
    }

    /// Overflow connections currently open.
    #[must_use]
    pub fn overflow_in_use(&self) -> u64 {
        self.overflow_opened.saturating_sub(self.overflow_closed)
    }

    /// Fraction of in-service slots currently busy.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.in_service == 0 {
            0.0
        } else {
            self.busy as f64 / self.in_service as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_counts() {
        let stats = PoolStats {
            size: 5,
            in_service: 4,
            busy: 1,
            retired: 1,
            overflow_opened: 3,
            overflow_closed: 2,
            reopened: 0,
        };
        assert_eq!(stats.idle(), 3);
        assert_eq!(stats.overflow_in_use(), 1);
        assert!((stats.utilization() - 0.25).abs() < f64::EPSILON);
        assert!(PoolStats::default().utilization().abs() < f64::EPSILON);
    }
}
