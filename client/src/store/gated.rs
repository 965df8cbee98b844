//! Test store that can hold a snapshot query open after it has read its rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hackhub_shared::{ChangeKind, Table};
use tokio::sync::Notify;

use super::memory::MemoryStore;
use super::{ChangeFeed, Filter, Order, RemoteStore, Row, StoreFuture};

pub struct GatedStore {
    inner: Arc<MemoryStore>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// The next query reads its rows, then waits for [`GatedStore::release`].
    pub fn hold_next_query(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once the held query has read the store.
    pub async fn query_held(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl RemoteStore for GatedStore {
    fn query(&self, table: Table, order: Order) -> StoreFuture<'_, Vec<Row>> {
        let rows = self.inner.query(table, order);
        Box::pin(async move {
            let rows = rows.await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            rows
        })
    }

    fn insert(&self, table: Table, row: Row) -> StoreFuture<'_, Row> {
        self.inner.insert(table, row)
    }

    fn update(&self, table: Table, filter: Filter, patch: Row) -> StoreFuture<'_, ()> {
        self.inner.update(table, filter, patch)
    }

    fn subscribe(&self, table: Table, kinds: &[ChangeKind]) -> StoreFuture<'_, ChangeFeed> {
        self.inner.subscribe(table, kinds)
    }
}
