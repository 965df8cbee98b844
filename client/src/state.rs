use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide sync counters shared by every panel of a dashboard.
#[derive(Debug, Default)]
pub struct SyncCounters {
    snapshot_loads_total: AtomicU64,
    snapshot_failures_total: AtomicU64,
    changes_applied_total: AtomicU64,
    duplicate_inserts_total: AtomicU64,
    absent_row_noops_total: AtomicU64,
    undecodable_rows_total: AtomicU64,
    reloads_triggered_total: AtomicU64,
    feed_lag_total: AtomicU64,
    writes_total: AtomicU64,
    write_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCountersSnapshot {
    pub snapshot_loads_total: u64,
    pub snapshot_failures_total: u64,
    pub changes_applied_total: u64,
    pub duplicate_inserts_total: u64,
    pub absent_row_noops_total: u64,
    pub undecodable_rows_total: u64,
    pub reloads_triggered_total: u64,
    pub feed_lag_total: u64,
    pub writes_total: u64,
    pub write_failures_total: u64,
}

impl SyncCounters {
    pub fn snapshot(&self) -> SyncCountersSnapshot {
        SyncCountersSnapshot {
            snapshot_loads_total: self.snapshot_loads_total.load(Ordering::Relaxed),
            snapshot_failures_total: self.snapshot_failures_total.load(Ordering::Relaxed),
            changes_applied_total: self.changes_applied_total.load(Ordering::Relaxed),
            duplicate_inserts_total: self.duplicate_inserts_total.load(Ordering::Relaxed),
            absent_row_noops_total: self.absent_row_noops_total.load(Ordering::Relaxed),
            undecodable_rows_total: self.undecodable_rows_total.load(Ordering::Relaxed),
            reloads_triggered_total: self.reloads_triggered_total.load(Ordering::Relaxed),
            feed_lag_total: self.feed_lag_total.load(Ordering::Relaxed),
            writes_total: self.writes_total.load(Ordering::Relaxed),
            write_failures_total: self.write_failures_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_snapshot_load(&self) {
        self.snapshot_loads_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_change_applied(&self) {
        self.changes_applied_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_insert(&self) {
        self.duplicate_inserts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_absent_row_noop(&self) {
        self.absent_row_noops_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undecodable_row(&self) {
        self.undecodable_rows_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload_triggered(&self) {
        self.reloads_triggered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feed_lag(&self, skipped: u64) {
        self.feed_lag_total.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures_total.fetch_add(1, Ordering::Relaxed);
    }
}
