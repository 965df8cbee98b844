use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use hackhub_shared::{ChangeEvent, ChangeKind, RawChange, Table};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use super::{ChangeFeed, FeedMessage, Filter, Order, RemoteStore, Row, StoreError, StoreFuture};
use crate::config::DEFAULT_CHANGE_BUFFER;

/// In-process store with per-table broadcast notifications.
///
/// Writes to one table are serialized by the table's map shard, and the change
/// notification is sent before the shard is released, so feed order matches
/// write order.
pub struct MemoryStore {
    tables: DashMap<Table, Vec<Row>>,
    feeds: DashMap<Table, broadcast::Sender<RawChange>>,
    query_counts: DashMap<Table, u64>,
    fail_queries: AtomicBool,
    fail_writes: AtomicBool,
    buffer: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_buffer(DEFAULT_CHANGE_BUFFER)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            tables: DashMap::new(),
            feeds: DashMap::new(),
            query_counts: DashMap::new(),
            fail_queries: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            buffer: buffer.max(1),
        }
    }

    /// Load rows without emitting notifications.
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Row>) {
        let mut entry = self.tables.entry(table).or_default();
        for row in rows {
            if let Ok(row) = prepare_row(row) {
                entry.push(row);
            }
        }
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .get(&table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    pub fn row(&self, table: Table, id: &str) -> Option<Row> {
        self.tables
            .get(&table)
            .and_then(|rows| rows.iter().find(|row| row_id(row) == Some(id)).cloned())
    }

    pub fn query_count(&self, table: Table) -> u64 {
        self.query_counts.get(&table).map(|count| *count).unwrap_or(0)
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Push a raw notification without touching stored rows. Returns the
    /// number of live subscribers that received it.
    pub fn emit(&self, table: Table, change: RawChange) -> usize {
        self.sender(table).send(change).unwrap_or(0)
    }

    /// Remove a row and notify subscribers with its identifier only.
    pub fn delete(&self, table: Table, id: &str) -> Result<(), StoreError> {
        let mut rows = self.tables.entry(table).or_default();
        let Some(position) = rows.iter().position(|row| row_id(row) == Some(id)) else {
            return Err(StoreError::NotFound {
                table,
                id: id.to_string(),
            });
        };
        rows.remove(position);
        self.notify(
            table,
            ChangeKind::Delete,
            Value::Object(Map::from_iter([("id".to_string(), Value::from(id))])),
        );
        Ok(())
    }

    pub fn subscriber_count(&self, table: Table) -> usize {
        self.feeds
            .get(&table)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn sender(&self, table: Table) -> broadcast::Sender<RawChange> {
        self.feeds
            .entry(table)
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .clone()
    }

    fn notify(&self, table: Table, kind: ChangeKind, row: Row) {
        let delivered = self
            .sender(table)
            .send(ChangeEvent { kind, row })
            .unwrap_or(0);
        debug!(%table, %kind, delivered, "memory store notified subscribers");
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Transport("injected write failure".to_string()));
        }
        Ok(())
    }

    fn query_now(&self, table: Table, order: Order) -> Result<Vec<Row>, StoreError> {
        *self.query_counts.entry(table).or_insert(0) += 1;
        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(StoreError::Transport("injected query failure".to_string()));
        }
        let mut rows = self.rows(table);
        if order == Order::CreatedAtDesc {
            rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
        }
        Ok(rows)
    }

    fn insert_now(&self, table: Table, row: Row) -> Result<Row, StoreError> {
        self.check_writable()?;
        let row = prepare_row(row)?;
        let mut rows = self.tables.entry(table).or_default();
        if let Some(id) = row_id(&row)
            && rows.iter().any(|existing| row_id(existing) == Some(id))
        {
            return Err(StoreError::Status {
                code: 409,
                body: format!("duplicate key {id}"),
            });
        }
        rows.push(row.clone());
        self.notify(table, ChangeKind::Insert, row.clone());
        Ok(row)
    }

    fn update_now(&self, table: Table, filter: Filter, patch: Row) -> Result<(), StoreError> {
        self.check_writable()?;
        let Value::Object(patch) = patch else {
            return Err(StoreError::Decode("patch must be a JSON object".to_string()));
        };
        let Filter::IdEq(id) = filter;
        let mut rows = self.tables.entry(table).or_default();
        let Some(row) = rows.iter_mut().find(|row| row_id(row) == Some(id.as_str())) else {
            return Err(StoreError::NotFound { table, id });
        };
        if let Value::Object(fields) = row {
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }
        let updated = row.clone();
        self.notify(table, ChangeKind::Update, updated);
        Ok(())
    }

    fn append_unique_now(
        &self,
        table: Table,
        id: &str,
        field: &str,
        value: Row,
    ) -> Result<Row, StoreError> {
        self.check_writable()?;
        let mut rows = self.tables.entry(table).or_default();
        let Some(row) = rows.iter_mut().find(|row| row_id(row) == Some(id)) else {
            return Err(StoreError::NotFound {
                table,
                id: id.to_string(),
            });
        };
        let Value::Object(fields) = row else {
            return Err(StoreError::Decode(format!("row {id} is not an object")));
        };
        let slot = fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(items) = slot else {
            return Err(StoreError::Decode(format!("{field} is not an array")));
        };
        if items.contains(&value) {
            return Ok(row.clone());
        }
        items.push(value);
        let updated = row.clone();
        self.notify(table, ChangeKind::Update, updated.clone());
        Ok(updated)
    }

    fn subscribe_now(&self, table: Table, kinds: Vec<ChangeKind>) -> ChangeFeed {
        let rx = self.sender(table).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(change) if kinds.contains(&change.kind) => Some(FeedMessage::Change(change)),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(FeedMessage::Lagged(skipped)),
        });
        ChangeFeed::new(table, Box::pin(stream))
    }
}

impl RemoteStore for MemoryStore {
    fn query(&self, table: Table, order: Order) -> StoreFuture<'_, Vec<Row>> {
        let result = self.query_now(table, order);
        Box::pin(async move { result })
    }

    fn insert(&self, table: Table, row: Row) -> StoreFuture<'_, Row> {
        let result = self.insert_now(table, row);
        Box::pin(async move { result })
    }

    fn update(&self, table: Table, filter: Filter, patch: Row) -> StoreFuture<'_, ()> {
        let result = self.update_now(table, filter, patch);
        Box::pin(async move { result })
    }

    fn subscribe(&self, table: Table, kinds: &[ChangeKind]) -> StoreFuture<'_, ChangeFeed> {
        let feed = self.subscribe_now(table, kinds.to_vec());
        Box::pin(async move { Ok(feed) })
    }

    fn append_unique<'a>(
        &'a self,
        table: Table,
        id: &'a str,
        field: &'a str,
        value: Row,
    ) -> StoreFuture<'a, Row> {
        let result = self.append_unique_now(table, id, field, value);
        Box::pin(async move { result })
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn created_at(row: &Row) -> Option<DateTime<Utc>> {
    row.get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fill in the server-assigned `id` and `created_at` when absent.
fn prepare_row(row: Row) -> Result<Row, StoreError> {
    let Value::Object(mut fields) = row else {
        return Err(StoreError::Decode("row must be a JSON object".to_string()));
    };
    fields
        .entry("id")
        .or_insert_with(|| Value::from(uuid::Uuid::new_v4().to_string()));
    fields.entry("created_at").or_insert_with(|| {
        Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    });
    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use hackhub_shared::{ChangeKind, Table};
    use serde_json::json;

    use super::MemoryStore;
    use crate::store::{FeedMessage, Filter, Order, RemoteStore, StoreError};

    #[tokio::test]
    async fn insert_assigns_id_and_timestamp() {
        let store = MemoryStore::new();
        let row = store
            .insert(Table::Announcements, json!({"content": "hi", "author": "a@x"}))
            .await
            .expect("insert should succeed");
        assert!(row["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(row["created_at"].as_str().is_some());
        assert_eq!(store.rows(Table::Announcements).len(), 1);
    }

    #[tokio::test]
    async fn query_orders_newest_first_when_requested() {
        let store = MemoryStore::new();
        store.seed(
            Table::Projects,
            [
                json!({"id": "old", "created_at": "2026-01-01T00:00:00Z"}),
                json!({"id": "new", "created_at": "2026-02-01T00:00:00Z"}),
            ],
        );

        let ordered = store
            .query(Table::Projects, Order::CreatedAtDesc)
            .await
            .expect("query");
        assert_eq!(ordered[0]["id"], "new");

        let unordered = store
            .query(Table::Projects, Order::Unordered)
            .await
            .expect("query");
        assert_eq!(unordered[0]["id"], "old");
        assert_eq!(store.query_count(Table::Projects), 2);
    }

    #[tokio::test]
    async fn subscription_filters_by_kind() {
        let store = MemoryStore::new();
        store.seed(Table::Teams, [json!({"id": "t1", "members": []})]);
        let mut feed = store
            .subscribe(Table::Teams, &[ChangeKind::Insert])
            .await
            .expect("subscribe");

        store
            .update(Table::Teams, Filter::IdEq("t1".into()), json!({"name": "x"}))
            .await
            .expect("update");
        store
            .insert(Table::Teams, json!({"id": "t2", "members": []}))
            .await
            .expect("insert");

        let Some(FeedMessage::Change(change)) = feed.next().await else {
            panic!("expected a change");
        };
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.row_id(), Some("t2"));
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_how_much_it_missed() {
        let store = MemoryStore::with_buffer(2);
        let mut feed = store
            .subscribe(Table::Announcements, &ChangeKind::ALL)
            .await
            .expect("subscribe");
        for n in 0..5 {
            store
                .insert(Table::Announcements, json!({"content": n.to_string()}))
                .await
                .expect("insert");
        }
        assert_eq!(feed.next().await, Some(FeedMessage::Lagged(3)));
    }

    #[tokio::test]
    async fn append_unique_never_duplicates() {
        let store = MemoryStore::new();
        store.seed(Table::Teams, [json!({"id": "t1", "members": ["a"]})]);

        store
            .append_unique(Table::Teams, "t1", "members", json!("b"))
            .await
            .expect("append b");
        let row = store
            .append_unique(Table::Teams, "t1", "members", json!("a"))
            .await
            .expect("append a again");
        assert_eq!(row["members"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = MemoryStore::new();
        store.set_fail_queries(true);
        assert!(matches!(
            store.query(Table::Teams, Order::Unordered).await,
            Err(StoreError::Transport(_))
        ));

        store.set_fail_writes(true);
        assert!(store.insert(Table::Teams, json!({"name": "x"})).await.is_err());
        assert!(store.rows(Table::Teams).is_empty());
    }

    #[tokio::test]
    async fn update_of_unknown_row_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(Table::Teams, Filter::IdEq("ghost".into()), json!({"members": []}))
            .await
            .expect_err("update should fail");
        assert_eq!(
            err,
            StoreError::NotFound {
                table: Table::Teams,
                id: "ghost".into()
            }
        );
    }
}
