use std::sync::Arc;

use hackhub_shared::{Actor, ChangeKind, NewProject, Project, Table, split_tech_stack};

use super::Binding;
use crate::listener::Reconcile;
use crate::loader::SnapshotLoader;
use crate::mutation::{
    Compose, Draft, MutationSubmitter, SubmitOutcome, ValidationError, encode, require,
};
use crate::state::SyncCounters;
use crate::store::{Row, SharedStore, StoreError};
use crate::view::ViewHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDraft {
    pub title: String,
    pub description: String,
    pub github_url: String,
    /// Comma-separated technologies as typed.
    pub tech_stack: String,
    pub team_id: Option<String>,
}

impl Draft for ProjectDraft {
    const TABLE: Table = Table::Projects;

    fn payload(&self, _actor: &Actor) -> Result<Row, ValidationError> {
        require("title", &self.title)?;
        require("github_url", &self.github_url)?;
        encode(&NewProject {
            title: self.title.clone(),
            description: self.description.clone(),
            github_url: self.github_url.clone(),
            tech_stack: split_tech_stack(&self.tech_stack),
            team_id: self.team_id.clone().filter(|id| !id.is_empty()),
        })
    }

    fn clear(&mut self) {
        *self = ProjectDraft::default();
    }
}

/// Project gallery. Any change reloads the whole collection.
pub struct ProjectsPanel {
    binding: Binding<Project>,
    submitter: MutationSubmitter,
    pub compose: Compose<ProjectDraft>,
}

impl ProjectsPanel {
    pub fn new(store: SharedStore, counters: Arc<SyncCounters>) -> Self {
        let loader = SnapshotLoader::new(store.clone(), Arc::clone(&counters));
        Self {
            binding: Binding::new(loader, &ChangeKind::ALL, Reconcile::Reload),
            submitter: MutationSubmitter::new(store, counters),
            compose: Compose::default(),
        }
    }

    pub fn view(&self) -> &ViewHandle<Project> {
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

    /// Submit the draft. The gallery shows the project once the listener's
    /// reload lands.
    pub async fn submit(&mut self, actor: Option<&Actor>) -> SubmitOutcome {
        self.submitter.submit(&mut self.compose, actor).await
    }
}
