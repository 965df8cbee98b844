pub mod announcements;
pub mod projects;
pub mod teams;

use hackhub_shared::{ChangeKind, Record};
use tracing::warn;

use crate::listener::{self, ListenerHandle, Reconcile};
use crate::loader::SnapshotLoader;
use crate::store::StoreError;
use crate::view::ViewHandle;

pub use announcements::{AnnouncementDraft, AnnouncementsPanel};
pub use projects::{ProjectDraft, ProjectsPanel};
pub use teams::{TeamDraft, TeamsPanel};

/// Snapshot-then-subscribe binding of one collection to its view.
///
/// At most one subscription is live per binding: mounting again tears the
/// previous one down first.
pub struct Binding<T> {
    view: ViewHandle<T>,
    loader: SnapshotLoader,
    kinds: &'static [ChangeKind],
    reconcile: Reconcile,
    listener: Option<ListenerHandle>,
}

impl<T: Record> Binding<T> {
    pub fn new(loader: SnapshotLoader, kinds: &'static [ChangeKind], reconcile: Reconcile) -> Self {
        Self {
            view: ViewHandle::new(),
            loader,
            kinds,
            reconcile,
            listener: None,
        }
    }

    pub fn view(&self) -> &ViewHandle<T> {
        &self.view
    }

    pub fn is_mounted(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(ListenerHandle::is_active)
    }

    /// Subscribe, then load the snapshot.
    ///
    /// A failed subscription still loads the snapshot so the panel shows
    /// stale rows instead of nothing; the error is returned afterwards.
    pub async fn mount(&mut self) -> Result<(), StoreError> {
        self.unmount().await;
        let subscribed = listener::subscribe(
            self.loader.clone(),
            self.view.clone(),
            self.kinds,
            self.reconcile,
        )
        .await;
        self.loader.refresh(&self.view).await;
        match subscribed {
            Ok(handle) => {
                self.listener = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!(table = %T::TABLE, error = %e, "subscription failed; view will not update live");
                Err(e)
            }
        }
    }

    pub async fn unmount(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.unsubscribe().await;
        }
    }

    pub async fn refresh(&self) -> bool {
        self.loader.refresh(&self.view).await
    }
}
