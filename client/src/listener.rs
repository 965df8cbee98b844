use std::time::Duration;

use hackhub_shared::{ChangeKind, RawChange, Record, Table};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::loader::SnapshotLoader;
use crate::store::{ChangeFeed, FeedMessage, StoreError};
use crate::view::{Reconciled, ViewHandle};

const RESUBSCRIBE_BASE_MS: u64 = 500;
const RESUBSCRIBE_MAX_MS: u64 = 10_000;

/// How a collection turns change notifications into view updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Patch the view row by row, keyed by id.
    Incremental,
    /// Any notification re-runs the full snapshot load.
    Reload,
}

/// Live subscription for one collection view.
///
/// Dropping the handle aborts delivery; `unsubscribe` additionally waits for
/// the task to finish so no event is applied after it returns.
#[derive(Debug)]
pub struct ListenerHandle {
    table: Table,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!(table = %self.table, "change listener unsubscribed");
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Open the notification channel for `T` and start reconciling into `view`.
///
/// The feed is established before this returns, so any write issued after
/// it will be observed.
pub async fn subscribe<T: Record>(
    loader: SnapshotLoader,
    view: ViewHandle<T>,
    kinds: &'static [ChangeKind],
    reconcile: Reconcile,
) -> Result<ListenerHandle, StoreError> {
    let table = T::TABLE;
    let feed = loader.store().subscribe(table, kinds).await?;
    info!(%table, ?reconcile, "change listener subscribed");
    let worker = ListenerWorker {
        loader,
        view,
        kinds,
        reconcile,
    };
    let task = tokio::spawn(worker.run(feed));
    Ok(ListenerHandle {
        table,
        task: Some(task),
    })
}

struct ListenerWorker<T> {
    loader: SnapshotLoader,
    view: ViewHandle<T>,
    kinds: &'static [ChangeKind],
    reconcile: Reconcile,
}

impl<T: Record> ListenerWorker<T> {
    async fn run(self, mut feed: ChangeFeed) {
        let table = T::TABLE;
        let mut consecutive_failures = 0u32;
        loop {
            while let Some(message) = feed.next().await {
                consecutive_failures = 0;
                self.handle(message).await;
            }

            warn!(%table, "change feed closed; resubscribing");
            feed = loop {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let backoff = resubscribe_backoff(consecutive_failures);
                tokio::time::sleep(backoff).await;
                match self.loader.store().subscribe(table, self.kinds).await {
                    Ok(feed) => break feed,
                    Err(e) => warn!(
                        %table,
                        attempt = consecutive_failures,
                        error = %e,
                        "resubscribe failed; backing off for {}ms",
                        backoff.as_millis()
                    ),
                }
            };
            // Notifications sent while disconnected are gone.
            self.reload().await;
        }
    }

    async fn handle(&self, message: FeedMessage) {
        match message {
            FeedMessage::Lagged(skipped) => {
                self.loader.counters().record_feed_lag(skipped);
                warn!(
                    table = %T::TABLE,
                    skipped,
                    "change listener lagged behind feed; reloading snapshot"
                );
                self.reload().await;
            }
            FeedMessage::Change(change) => match self.reconcile {
                Reconcile::Reload => {
                    debug!(table = %T::TABLE, kind = %change.kind, "change received; reloading snapshot");
                    self.reload().await;
                }
                Reconcile::Incremental => self.apply(change).await,
            },
        }
    }

    async fn reload(&self) {
        self.loader.counters().record_reload_triggered();
        self.loader.refresh(&self.view).await;
    }

    async fn apply(&self, change: RawChange) {
        let counters = self.loader.counters();
        let kind = change.kind;
        let Some(id) = change.row_id().map(str::to_owned) else {
            counters.record_undecodable_row();
            warn!(table = %T::TABLE, %kind, "dropping change without a row id");
            return;
        };

        let outcome = match kind {
            ChangeKind::Delete => self.view.modify(|v| v.remove(&id)).await,
            ChangeKind::Insert | ChangeKind::Update => {
                let row = match serde_json::from_value::<T>(change.row) {
                    Ok(row) => row,
                    Err(e) => {
                        counters.record_undecodable_row();
                        warn!(table = %T::TABLE, %kind, %id, error = %e, "dropping undecodable change");
                        return;
                    }
                };
                if kind == ChangeKind::Insert {
                    self.view.modify(|v| v.upsert(row)).await
                } else {
                    self.view.modify(|v| v.update(row)).await
                }
            }
        };

        match outcome {
            Reconciled::Replaced if kind == ChangeKind::Insert => {
                counters.record_duplicate_insert();
                debug!(table = %T::TABLE, %id, "insert for known id replaced in place");
            }
            Reconciled::Absent => {
                counters.record_absent_row_noop();
                debug!(table = %T::TABLE, %kind, %id, "change for unknown id ignored");
                return;
            }
            _ => {}
        }
        counters.record_change_applied();
    }
}

fn resubscribe_backoff(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(6);
    let factor = 1u64 << exponent;
    Duration::from_millis((RESUBSCRIBE_BASE_MS * factor).min(RESUBSCRIBE_MAX_MS))
}
