use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hackhub_shared::Record;
use tokio::sync::{RwLock, RwLockReadGuard, watch};

/// Result of reconciling one row into a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Inserted,
    /// The id was already present; the row was replaced in place.
    Replaced,
    Removed,
    /// Update or delete for an id the view does not hold.
    Absent,
}

/// Ordered, id-unique mirror of one remote collection.
///
/// Every row-level write bumps a sequence number. While a snapshot query is in
/// flight the latest write per id is remembered, so the snapshot can be merged
/// under those writes instead of overwriting them.
#[derive(Debug, Clone)]
pub struct LocalView<T> {
    rows: Vec<T>,
    seq: u64,
    loading: usize,
    applied_stamp: u64,
    pending: HashMap<String, PendingWrite<T>>,
}

/// Position in a view's write history taken before a snapshot query starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotStamp(u64);

#[derive(Debug, Clone)]
struct PendingWrite<T> {
    seq: u64,
    kind: PendingKind<T>,
}

#[derive(Debug, Clone)]
enum PendingKind<T> {
    /// The local row for this id is newer than any snapshot taken before it.
    Upserted,
    /// Update that arrived before its row was visible.
    Patched(T),
    Removed,
}

impl<T: Record> Default for LocalView<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            seq: 0,
            loading: 0,
            applied_stamp: 0,
            pending: HashMap::new(),
        }
    }
}

impl<T: Record> LocalView<T> {
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.iter().find(|row| row.id() == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.id()).collect()
    }

    /// Swap in a full snapshot. Later duplicates of an id win.
    pub fn replace_all(&mut self, rows: Vec<T>) {
        let mut seen = HashSet::new();
        let mut unique: Vec<T> = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            if seen.insert(row.id().to_string()) {
                unique.push(row);
            }
        }
        unique.reverse();
        if T::TABLE.newest_first() {
            unique.sort_by_key(|row| std::cmp::Reverse(row.created_at()));
        }
        self.rows = unique;
    }

    /// Mark the start of a snapshot query. Writes from here on survive the
    /// snapshot that this stamp is later passed back with.
    pub fn begin_snapshot(&mut self) -> SnapshotStamp {
        self.loading += 1;
        SnapshotStamp(self.seq)
    }

    /// Merge a snapshot queried after `stamp` under the writes applied since.
    ///
    /// Returns `false` and leaves the rows alone when a snapshot started later
    /// has already been applied.
    pub fn apply_snapshot(&mut self, stamp: SnapshotStamp, mut rows: Vec<T>) -> bool {
        self.finish_snapshot();
        if stamp.0 < self.applied_stamp {
            return false;
        }

        for (id, write) in &self.pending {
            if write.seq <= stamp.0 {
                continue;
            }
            match &write.kind {
                PendingKind::Removed => rows.retain(|row| row.id() != id),
                PendingKind::Upserted => {
                    if let Some(local) = self.rows.iter().find(|row| row.id() == id) {
                        rows.retain(|row| row.id() != id);
                        rows.push(local.clone());
                    }
                }
                PendingKind::Patched(patched) => {
                    if let Some(slot) = rows.iter_mut().find(|row| row.id() == id) {
                        *slot = patched.clone();
                    }
                }
            }
        }
        self.replace_all(rows);
        self.applied_stamp = stamp.0;
        self.prune_pending();
        true
    }

    /// Give up on a snapshot whose query failed.
    pub fn abandon_snapshot(&mut self, _stamp: SnapshotStamp) {
        self.finish_snapshot();
        self.prune_pending();
    }

    /// Insert at the row's display position, or replace in place when the id
    /// is already present.
    pub fn upsert(&mut self, row: T) -> Reconciled {
        self.record(row.id(), PendingKind::Upserted);
        match self.position(row.id()) {
            Some(index) => {
                let moved = self.rows[index].created_at() != row.created_at();
                if moved && T::TABLE.newest_first() {
                    self.rows.remove(index);
                    self.insert_sorted(row);
                } else {
                    self.rows[index] = row;
                }
                Reconciled::Replaced
            }
            None => {
                self.insert_sorted(row);
                Reconciled::Inserted
            }
        }
    }

    /// Replace an existing row. Unknown ids are ignored, but remembered while
    /// a snapshot is loading in case the snapshot brings the row.
    pub fn update(&mut self, row: T) -> Reconciled {
        if self.position(row.id()).is_none() {
            let id = row.id().to_string();
            self.record(&id, PendingKind::Patched(row));
            return Reconciled::Absent;
        }
        self.upsert(row)
    }

    pub fn remove(&mut self, id: &str) -> Reconciled {
        self.record(id, PendingKind::Removed);
        match self.position(id) {
            Some(index) => {
                self.rows.remove(index);
                Reconciled::Removed
            }
            None => Reconciled::Absent,
        }
    }

    fn record(&mut self, id: &str, kind: PendingKind<T>) {
        self.seq += 1;
        if self.loading > 0 {
            self.pending.insert(
                id.to_string(),
                PendingWrite {
                    seq: self.seq,
                    kind,
                },
            );
        }
    }

    fn finish_snapshot(&mut self) {
        self.loading = self.loading.saturating_sub(1);
    }

    fn prune_pending(&mut self) {
        if self.loading == 0 {
            self.pending.clear();
        } else {
            let applied = self.applied_stamp;
            self.pending.retain(|_, write| write.seq > applied);
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.id() == id)
    }

    fn insert_sorted(&mut self, row: T) {
        if T::TABLE.newest_first() {
            let created_at = row.created_at();
            let index = self
                .rows
                .partition_point(|existing| existing.created_at() > created_at);
            self.rows.insert(index, row);
        } else {
            self.rows.push(row);
        }
    }
}

struct ViewInner<T> {
    view: RwLock<LocalView<T>>,
    revision: watch::Sender<u64>,
}

/// Shared handle to a view. Every write bumps a revision that renderers can
/// wait on.
pub struct ViewHandle<T> {
    inner: Arc<ViewInner<T>>,
}

impl<T> Clone for ViewHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> Default for ViewHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> ViewHandle<T> {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(ViewInner {
                view: RwLock::new(LocalView::default()),
                revision,
            }),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, LocalView<T>> {
        self.inner.view.read().await
    }

    pub async fn rows(&self) -> Vec<T> {
        self.inner.view.read().await.rows().to_vec()
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.inner.view.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.view.read().await.len()
    }

    /// Stamp the start of a snapshot query. Does not bump the revision.
    pub async fn begin_snapshot(&self) -> SnapshotStamp {
        self.inner.view.write().await.begin_snapshot()
    }

    /// Does not bump the revision.
    pub async fn abandon_snapshot(&self, stamp: SnapshotStamp) {
        self.inner.view.write().await.abandon_snapshot(stamp);
    }

    /// Apply `f` under the write lock, then bump the revision.
    pub async fn modify<R>(&self, f: impl FnOnce(&mut LocalView<T>) -> R) -> R {
        let result = {
            let mut view = self.inner.view.write().await;
            f(&mut view)
        };
        self.inner.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
        result
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }
}
