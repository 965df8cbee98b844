use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use hackhub_shared::{ChangeKind, Table};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use tracing::{info, warn};

use super::sse::event_to_message;
use super::{ChangeFeed, Filter, Order, RemoteStore, Row, StoreError, StoreFuture};
use crate::config::{REALTIME_PREFIX, REST_PREFIX};

const APPEND_UNIQUE_RPC: &str = "append_unique";

/// Remote store reached over HTTP: PostgREST conventions for rows and a
/// Server-Sent-Events stream per table for change notifications.
#[derive(Clone)]
pub struct HttpStore {
    base_url: String,
    client: reqwest::Client,
    /// No overall request timeout: feeds stay open indefinitely.
    feed_client: reqwest::Client,
}

impl HttpStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let headers = default_headers(api_key.as_deref())?;
        let client = reqwest::Client::builder()
            .user_agent("hackhub-client/0.1")
            .default_headers(headers.clone())
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        let feed_client = reqwest::Client::builder()
            .user_agent("hackhub-client/0.1")
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            feed_client,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}{REST_PREFIX}/{table}", self.base_url)
    }

    fn feed_url(&self, table: Table, kinds: &[ChangeKind]) -> String {
        let events = kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{REALTIME_PREFIX}/{table}?events={events}", self.base_url)
    }

    async fn fetch_rows(&self, table: Table, order: Order) -> Result<Vec<Row>, StoreError> {
        let mut request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*")]);
        if order == Order::CreatedAtDesc {
            request = request.query(&[("order", "created_at.desc")]);
        }
        let resp = ensure_success(request.send().await?).await?;
        Ok(resp.json::<Vec<Row>>().await?)
    }

    async fn insert_row(&self, table: Table, row: Row) -> Result<Row, StoreError> {
        let resp = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let rows = ensure_success(resp).await?.json::<Vec<Row>>().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {table} returned no rows")))
    }

    async fn patch_rows(&self, table: Table, filter: Filter, patch: Row) -> Result<(), StoreError> {
        let Filter::IdEq(id) = filter;
        let resp = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn call_append_unique(
        &self,
        table: Table,
        id: &str,
        field: &str,
        value: Row,
    ) -> Result<Row, StoreError> {
        let resp = self
            .client
            .post(format!(
                "{}{REST_PREFIX}/rpc/{APPEND_UNIQUE_RPC}",
                self.base_url
            ))
            .json(&json!({
                "target_table": table,
                "row_id": id,
                "field": field,
                "value": value,
            }))
            .send()
            .await?;
        match ensure_success(resp).await {
            Ok(resp) => Ok(resp.json::<Row>().await?),
            Err(StoreError::Status { code: 404, .. }) => {
                Err(StoreError::Unsupported(APPEND_UNIQUE_RPC))
            }
            Err(e) => Err(e),
        }
    }

    async fn open_feed(&self, table: Table, kinds: Vec<ChangeKind>) -> Result<ChangeFeed, StoreError> {
        let resp = self
            .feed_client
            .get(self.feed_url(table, &kinds))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        info!(%table, "change feed connected");

        let stream = async_stream::stream! {
            let mut events = resp.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%table, error = %e, "change feed read failed");
                        break;
                    }
                };
                if let Some(message) = event_to_message(&event) {
                    yield message;
                }
            }
        };
        Ok(ChangeFeed::new(table, Box::pin(stream)))
    }
}

impl RemoteStore for HttpStore {
    fn query(&self, table: Table, order: Order) -> StoreFuture<'_, Vec<Row>> {
        Box::pin(self.fetch_rows(table, order))
    }

    fn insert(&self, table: Table, row: Row) -> StoreFuture<'_, Row> {
        Box::pin(self.insert_row(table, row))
    }

    fn update(&self, table: Table, filter: Filter, patch: Row) -> StoreFuture<'_, ()> {
        Box::pin(self.patch_rows(table, filter, patch))
    }

    fn subscribe(&self, table: Table, kinds: &[ChangeKind]) -> StoreFuture<'_, ChangeFeed> {
        Box::pin(self.open_feed(table, kinds.to_vec()))
    }

    fn append_unique<'a>(
        &'a self,
        table: Table,
        id: &'a str,
        field: &'a str,
        value: Row,
    ) -> StoreFuture<'a, Row> {
        Box::pin(self.call_append_unique(table, id, field, value))
    }
}

fn default_headers(api_key: Option<&str>) -> Result<HeaderMap, StoreError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let apikey = HeaderValue::from_str(key)
            .map_err(|e| StoreError::Transport(format!("invalid api key header: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| StoreError::Transport(format!("invalid api key header: {e}")))?;
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);
    }
    Ok(headers)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        code: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use hackhub_shared::{ChangeKind, Table};
    use serde_json::{Value, json};

    use super::{HttpStore, default_headers};
    use crate::store::{FeedMessage, Filter, Order, RemoteStore, StoreError};

    type Seen = Arc<Mutex<Vec<String>>>;

    async fn spawn_test_server(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    fn store_at(addr: SocketAddr, api_key: Option<&str>) -> HttpStore {
        HttpStore::new(
            format!("http://{addr}"),
            api_key.map(str::to_string),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .expect("client should build")
    }

    async fn list_announcements(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let mut seen = seen.lock().expect("seen lock");
        seen.push(format!("order={}", params.get("order").map_or("-", String::as_str)));
        seen.push(format!(
            "apikey={}",
            headers.get("apikey").and_then(|v| v.to_str().ok()).unwrap_or("-")
        ));
        Json(json!([
            {"id": "a2", "content": "second", "author": "h@example.com",
             "created_at": "2026-03-01T10:00:00Z"},
            {"id": "a1", "content": "first", "author": "h@example.com",
             "created_at": "2026-03-01T09:00:00Z"},
        ]))
    }

    async fn list_projects() -> impl IntoResponse {
        (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable")
    }

    async fn insert_team_without_representation() -> Json<Value> {
        Json(json!([]))
    }

    async fn patch_team(
        State(seen): State<Seen>,
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let mut seen = seen.lock().expect("seen lock");
        seen.push(format!("id={}", params.get("id").map_or("-", String::as_str)));
        seen.push(format!("members={}", body["members"]));
        StatusCode::NO_CONTENT
    }

    async fn missing_rpc() -> StatusCode {
        StatusCode::NOT_FOUND
    }

    async fn team_feed(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        let body = format!(
            ": subscribed to {}\n\nevent: insert\ndata: {{\"id\":\"t9\",\"members\":[]}}\n\nevent: lagged\ndata: 3\n\n",
            params.get("events").map_or("-", String::as_str)
        );
        ([(header::CONTENT_TYPE, "text/event-stream")], body)
    }

    async fn fake_store() -> (HttpStore, Seen, tokio::task::JoinHandle<()>) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/rest/v1/announcements", get(list_announcements))
            .route("/rest/v1/projects", get(list_projects))
            .route(
                "/rest/v1/teams",
                post(insert_team_without_representation).patch(patch_team),
            )
            .route("/rest/v1/rpc/append_unique", post(missing_rpc))
            .route("/realtime/v1/teams", get(team_feed))
            .with_state(Arc::clone(&seen));
        let (addr, handle) = spawn_test_server(app).await;
        (store_at(addr, Some("anon-key")), seen, handle)
    }

    fn store() -> HttpStore {
        HttpStore::new(
            "https://store.example/",
            None,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .expect("client should build")
    }

    #[test]
    fn urls_follow_rest_and_realtime_layout() {
        let store = store();
        assert_eq!(
            store.table_url(Table::Teams),
            "https://store.example/rest/v1/teams"
        );
        assert_eq!(
            store.feed_url(Table::Announcements, &[ChangeKind::Insert]),
            "https://store.example/realtime/v1/announcements?events=insert"
        );
        assert_eq!(
            store.feed_url(Table::Projects, &ChangeKind::ALL),
            "https://store.example/realtime/v1/projects?events=insert,update,delete"
        );
    }

    #[test]
    fn api_key_is_sent_twice() {
        let headers = default_headers(Some("secret")).expect("headers");
        assert_eq!(headers["apikey"], "secret");
        assert_eq!(headers["authorization"], "Bearer secret");
        assert!(default_headers(None).expect("headers").is_empty());
        assert!(default_headers(Some("bad\nkey")).is_err());
    }

    #[tokio::test]
    async fn query_sends_order_and_api_key_and_decodes_rows() {
        let (store, seen, server) = fake_store().await;
        let rows = store
            .query(Table::Announcements, Order::CreatedAtDesc)
            .await
            .expect("rows");
        let ids: Vec<_> = rows.iter().map(|row| row["id"].as_str()).collect();
        assert_eq!(ids, [Some("a2"), Some("a1")]);
        assert_eq!(
            *seen.lock().expect("seen lock"),
            ["order=created_at.desc", "apikey=anon-key"]
        );
        server.abort();
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_body() {
        let (store, _seen, server) = fake_store().await;
        let err = store
            .query(Table::Projects, Order::Unordered)
            .await
            .expect_err("500 should fail");
        assert_eq!(
            err,
            StoreError::Status {
                code: 500,
                body: "database unavailable".into(),
            }
        );
        assert_eq!(err.to_string(), "HTTP 500: database unavailable");
        server.abort();
    }

    #[tokio::test]
    async fn insert_without_returned_row_is_a_decode_error() {
        let (store, _seen, server) = fake_store().await;
        let err = store
            .insert(Table::Teams, json!({"name": "Crabs", "members": []}))
            .await
            .expect_err("empty representation");
        assert_eq!(
            err,
            StoreError::Decode("insert into teams returned no rows".into())
        );
        server.abort();
    }

    #[tokio::test]
    async fn update_filters_by_id() {
        let (store, seen, server) = fake_store().await;
        store
            .update(
                Table::Teams,
                Filter::IdEq("t1".into()),
                json!({"members": ["a", "b"]}),
            )
            .await
            .expect("patch");
        assert_eq!(
            *seen.lock().expect("seen lock"),
            ["id=eq.t1", r#"members=["a","b"]"#]
        );
        server.abort();
    }

    #[tokio::test]
    async fn missing_append_rpc_reports_unsupported() {
        let (store, _seen, server) = fake_store().await;
        let err = store
            .append_unique(Table::Teams, "t1", "members", json!("a"))
            .await
            .expect_err("rpc is missing");
        assert_eq!(err, StoreError::Unsupported("append_unique"));
        assert_eq!(err.to_string(), "store does not support append_unique");
        server.abort();
    }

    #[tokio::test]
    async fn feed_yields_changes_then_ends_with_the_body() {
        let (store, _seen, server) = fake_store().await;
        let mut feed = store
            .subscribe(Table::Teams, &[ChangeKind::Insert])
            .await
            .expect("feed");
        assert_eq!(feed.table(), Table::Teams);

        let Some(FeedMessage::Change(change)) = feed.next().await else {
            panic!("expected a change first");
        };
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.row_id(), Some("t9"));
        assert_eq!(feed.next().await, Some(FeedMessage::Lagged(3)));
        assert_eq!(feed.next().await, None);
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_store_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = store_at(addr, None)
            .query(Table::Teams, Order::Unordered)
            .await
            .expect_err("nothing listening");
        assert!(matches!(err, StoreError::Transport(_)), "{err:?}");
    }
}
