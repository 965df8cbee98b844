//! Boundary to the remote collection store.
//!
//! The store is schema-agnostic: rows travel as JSON objects and are decoded
//! into typed records by the loader and listener.

#[cfg(test)]
pub mod gated;
pub mod http;
pub mod memory;
pub mod sse;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::BoxStream;
use hackhub_shared::{ChangeKind, RawChange, Table};
use tokio_stream::StreamExt;

pub type Row = serde_json::Value;
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;
pub type SharedStore = Arc<dyn RemoteStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    CreatedAtDesc,
    Unordered,
}

impl Order {
    pub fn for_table(table: Table) -> Self {
        if table.newest_first() {
            Order::CreatedAtDesc
        } else {
            Order::Unordered
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    IdEq(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(RawChange),
    /// The feed dropped this many notifications; local state must be reloaded.
    Lagged(u64),
}

/// Live notification stream for one table. Dropping it ends delivery.
pub struct ChangeFeed {
    table: Table,
    stream: BoxStream<'static, FeedMessage>,
}

impl ChangeFeed {
    pub fn new(table: Table, stream: BoxStream<'static, FeedMessage>) -> Self {
        Self { table, stream }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.stream.next().await
    }
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no row {id} in {table}")]
    NotFound { table: Table, id: String },
    #[error("store does not support {0}")]
    Unsupported(&'static str),
    #[error("store connection closed")]
    Closed,
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Query, write and push-notification surface of the remote store.
pub trait RemoteStore: Send + Sync + 'static {
    fn query(&self, table: Table, order: Order) -> StoreFuture<'_, Vec<Row>>;

    /// Insert one row and return it as stored, including server-assigned fields.
    fn insert(&self, table: Table, row: Row) -> StoreFuture<'_, Row>;

    /// Overwrite the patched fields of the rows matching `filter`.
    fn update(&self, table: Table, filter: Filter, patch: Row) -> StoreFuture<'_, ()>;

    fn subscribe(&self, table: Table, kinds: &[ChangeKind]) -> StoreFuture<'_, ChangeFeed>;

    /// Append `value` to the array `field` of row `id` unless already present,
    /// atomically on the store side.
    fn append_unique<'a>(
        &'a self,
        table: Table,
        id: &'a str,
        field: &'a str,
        value: Row,
    ) -> StoreFuture<'a, Row> {
        let _ = (table, id, field, value);
        Box::pin(async { Err(StoreError::Unsupported("append_unique")) })
    }
}
