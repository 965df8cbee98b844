use std::sync::Arc;

use hackhub_shared::{Actor, Announcement, ChangeKind, NewAnnouncement, Table};
use tracing::warn;

use super::Binding;
use crate::listener::Reconcile;
use crate::loader::SnapshotLoader;
use crate::mutation::{
    Compose, Draft, MutationSubmitter, SubmitOutcome, ValidationError, encode, require,
};
use crate::state::SyncCounters;
use crate::store::{Row, SharedStore, StoreError};
use crate::view::ViewHandle;

/// Announcements are immutable; only inserts are observed.
const KINDS: &[ChangeKind] = &[ChangeKind::Insert];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncementDraft {
    pub content: String,
}

impl Draft for AnnouncementDraft {
    const TABLE: Table = Table::Announcements;

    fn payload(&self, actor: &Actor) -> Result<Row, ValidationError> {
        require("content", &self.content)?;
        encode(&NewAnnouncement {
            content: self.content.clone(),
            author: actor.email.clone(),
        })
    }

    fn clear(&mut self) {
        self.content.clear();
    }
}

pub struct AnnouncementsPanel {
    binding: Binding<Announcement>,
    submitter: MutationSubmitter,
    pub compose: Compose<AnnouncementDraft>,
}

impl AnnouncementsPanel {
    pub fn new(store: SharedStore, counters: Arc<SyncCounters>) -> Self {
        let loader = SnapshotLoader::new(store.clone(), Arc::clone(&counters));
        Self {
            binding: Binding::new(loader, KINDS, Reconcile::Incremental),
            submitter: MutationSubmitter::new(store, counters),
            // The post form is always visible.
            compose: Compose {
                draft: AnnouncementDraft::default(),
                open: true,
            },
        }
    }

    pub fn view(&self) -> &ViewHandle<Announcement> {
        self.binding.view()
    }

    pub fn is_mounted(&self) -> bool {
        self.binding.is_mounted()
    }

    pub async fn mount(&mut self) -> Result<(), StoreError> {
        self.binding.mount().await
    }

    pub async fn unmount(&mut self) {
        self.binding.unmount().await;
    }

    pub async fn refresh(&self) -> bool {
        self.binding.refresh().await
    }

    /// Post the draft. On success the stored row is shown immediately; the
    /// listener's copy of the same insert later collapses onto it by id.
    pub async fn post(&mut self, actor: Option<&Actor>) -> SubmitOutcome {
        let outcome = self.submitter.submit(&mut self.compose, actor).await;
        // The form stays visible after posting.
        self.compose.open = true;
        if let SubmitOutcome::Submitted(row) = &outcome {
            match serde_json::from_value::<Announcement>(row.clone()) {
                Ok(announcement) => {
                    self.binding
                        .view()
                        .modify(|view| view.upsert(announcement))
                        .await;
                }
                Err(e) => warn!(error = %e, "stored announcement did not decode; waiting for listener"),
            }
        }
        outcome
    }
}
