use std::sync::Arc;

use hackhub_shared::{Actor, ChangeKind, NewTeam, Table, Team};

use super::Binding;
use crate::listener::Reconcile;
use crate::loader::SnapshotLoader;
use crate::membership::{self, JoinOutcome, JoinStrategy, MembershipResolver};
use crate::mutation::{
    Compose, Draft, MutationSubmitter, SubmitOutcome, ValidationError, encode, require,
};
use crate::state::SyncCounters;
use crate::store::{Row, SharedStore, StoreError};
use crate::view::ViewHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamDraft {
    pub name: String,
    pub description: String,
}

impl Draft for TeamDraft {
    const TABLE: Table = Table::Teams;

    /// The creator is the first member.
    fn payload(&self, actor: &Actor) -> Result<Row, ValidationError> {
        require("name", &self.name)?;
        encode(&NewTeam {
            name: self.name.clone(),
            description: self.description.clone(),
            members: vec![actor.id.clone()],
        })
    }

    fn clear(&mut self) {
        *self = TeamDraft::default();
    }
}

pub struct TeamsPanel {
    binding: Binding<Team>,
    submitter: MutationSubmitter,
    resolver: MembershipResolver,
    pub compose: Compose<TeamDraft>,
}

impl TeamsPanel {
    pub fn new(store: SharedStore, counters: Arc<SyncCounters>, strategy: JoinStrategy) -> Self {
        let loader = SnapshotLoader::new(store.clone(), Arc::clone(&counters));
        Self {
            binding: Binding::new(loader, &ChangeKind::ALL, Reconcile::Incremental),
            submitter: MutationSubmitter::new(store.clone(), Arc::clone(&counters)),
            resolver: MembershipResolver::new(store, counters, strategy),
            compose: Compose::default(),
        }
    }

    pub fn view(&self) -> &ViewHandle<Team> {
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

    pub async fn submit(&mut self, actor: Option<&Actor>) -> SubmitOutcome {
        self.submitter.submit(&mut self.compose, actor).await
    }

    /// Whether the join control should be shown for `team_id`.
    pub async fn can_join(&self, team_id: &str, actor: Option<&Actor>) -> bool {
        let view = self.binding.view().read().await;
        view.get(team_id)
            .is_some_and(|team| membership::can_join(team, actor))
    }

    pub async fn join(&self, team_id: &str, actor: Option<&Actor>) -> JoinOutcome {
        self.resolver.join(self.binding.view(), team_id, actor).await
    }
}
