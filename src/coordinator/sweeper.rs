//! Lazy expiration sweeper
//!
//! Runs only when a metadata operation asks for it, and at most once per
//! interval. Each evicted record's declared size is taken back off the node
//! it was placed on in the same pass, so the caller must hold the lock that
//! guards both tables.

use crate::coordinator::metadata::MetadataStore;
use crate::coordinator::placement::PlacementRegistry;
use std::time::Duration;

/// What one sweep did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub reclaimed_bytes: u64,
    pub anomalies: usize,
}

#[derive(Debug)]
pub struct ExpirationSweeper {
    interval_ms: u64,
    next_check_ms: u64,
}

impl ExpirationSweeper {
    /// The first sweep becomes due one interval after `now_ms`
    pub fn new(interval: Duration, now_ms: u64) -> Self {
        let interval_ms = interval.as_millis() as u64;
        Self {
            interval_ms,
            next_check_ms: now_ms.saturating_add(interval_ms),
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_check_ms
    }

    /// Sweep if the interval has elapsed
    pub fn sweep_if_due(
        &mut self,
        metadata: &mut MetadataStore,
        placement: &mut PlacementRegistry,
        now_ms: u64,
    ) -> Option<SweepReport> {
        if !self.is_due(now_ms) {
            return None;
        }
        Some(self.sweep(metadata, placement, now_ms))
    }

    /// Evict every record with `expiry <= now` and reverse its placement accounting
    pub fn sweep(
        &mut self,
        metadata: &mut MetadataStore,
        placement: &mut PlacementRegistry,
        now_ms: u64,
    ) -> SweepReport {
        self.next_check_ms = now_ms.saturating_add(self.interval_ms);

        let mut report = SweepReport::default();
        for key in metadata.expired_keys(now_ms) {
            let Some(record) = metadata.remove(&key) else {
                continue;
            };
            if let Some((node, size)) = record.placement() {
                let outcome = placement.adjust(node, -(size as i128));
                if outcome.clamped {
                    report.anomalies += 1;
                }
                report.reclaimed_bytes += size;
            }
            report.removed += 1;
        }

        if report.removed > 0 {
            tracing::info!(
                removed = report.removed,
                reclaimed_bytes = report.reclaimed_bytes,
                "Expiration sweep evicted records"
            );
        } else {
            tracing::debug!("Expiration sweep found nothing to evict");
        }
        report
    }
}
