use std::sync::Arc;

use hackhub_shared::Record;
use tracing::{debug, warn};

use crate::state::SyncCounters;
use crate::store::{Order, SharedStore, StoreError};
use crate::view::ViewHandle;

/// One-shot full reads of a collection in its display order.
#[derive(Clone)]
pub struct SnapshotLoader {
    store: SharedStore,
    counters: Arc<SyncCounters>,
}

impl SnapshotLoader {
    pub fn new(store: SharedStore, counters: Arc<SyncCounters>) -> Self {
        Self { store, counters }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn counters(&self) -> &Arc<SyncCounters> {
        &self.counters
    }

    /// Query and decode every row. Rows that do not decode are skipped.
    pub async fn load<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let table = T::TABLE;
        let rows = self.store.query(table, Order::for_table(table)).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<T>(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.counters.record_undecodable_row();
                    warn!(%table, error = %e, "skipping undecodable snapshot row");
                }
            }
        }
        Ok(records)
    }

    /// Reload `view` from the store. On failure the view keeps its previous
    /// rows and `false` is returned.
    ///
    /// Listener writes that land while the query is in flight are kept on top
    /// of the snapshot, and a snapshot older than one already applied is
    /// dropped, so the latest write per id wins whatever order the two paths
    /// finish in.
    pub async fn refresh<T: Record>(&self, view: &ViewHandle<T>) -> bool {
        let table = T::TABLE;
        let stamp = view.begin_snapshot().await;
        match self.load::<T>().await {
            Ok(records) => {
                let count = records.len();
                let applied = view.modify(|v| v.apply_snapshot(stamp, records)).await;
                self.counters.record_snapshot_load();
                if applied {
                    debug!(%table, rows = count, "snapshot applied");
                } else {
                    debug!(%table, rows = count, "newer snapshot already applied; dropping this one");
                }
                true
            }
            Err(e) => {
                view.abandon_snapshot(stamp).await;
                self.counters.record_snapshot_failure();
                warn!(%table, error = %e, "snapshot load failed; keeping previous rows");
                false
            }
        }
    }
}
