//! Join-team: a read-modify-write on a shared membership list.
//!
//! With [`JoinStrategy::ReadModifyWrite`] the candidate list is built from the
//! local view and written back whole, without a version check. Two clients
//! joining from the same base overwrite each other and one join is lost.
//! [`JoinStrategy::AtomicAppend`] delegates the append to the store, which
//! applies it under its own lock.

use std::sync::Arc;

use hackhub_shared::{Actor, Table, Team};
use serde_json::json;
use tracing::{info, warn};

use crate::state::SyncCounters;
use crate::store::{Filter, SharedStore, StoreError};
use crate::view::{LocalView, ViewHandle};

pub const MEMBERS_FIELD: &str = "members";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinStrategy {
    #[default]
    ReadModifyWrite,
    AtomicAppend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSkip {
    SignedOut,
    UnknownTeam,
    AlreadyMember,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// Write accepted. The view catches up through the listener.
    Joined,
    Skipped(JoinSkip),
    Failed(StoreError),
}

/// Membership write prepared from a local read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    pub team_id: String,
    pub user_id: String,
    /// Full list to write back under read-modify-write.
    pub members: Vec<String>,
}

/// Whether `actor` should be offered a join for `team`.
pub fn can_join(team: &Team, actor: Option<&Actor>) -> bool {
    actor.is_some_and(|actor| !team.has_member(&actor.id))
}

/// Read the current membership of `team_id` from the local view and build the
/// candidate list with the actor appended.
pub fn plan_join(
    view: &LocalView<Team>,
    team_id: &str,
    actor: Option<&Actor>,
) -> Result<JoinPlan, JoinSkip> {
    let actor = actor.ok_or(JoinSkip::SignedOut)?;
    let team = view.get(team_id).ok_or(JoinSkip::UnknownTeam)?;
    if team.has_member(&actor.id) {
        return Err(JoinSkip::AlreadyMember);
    }

    let mut members: Vec<String> = Vec::with_capacity(team.members.len() + 1);
    for member in &team.members {
        if !members.contains(member) {
            members.push(member.clone());
        }
    }
    members.push(actor.id.clone());

    Ok(JoinPlan {
        team_id: team_id.to_string(),
        user_id: actor.id.clone(),
        members,
    })
}

#[derive(Clone)]
pub struct MembershipResolver {
    store: SharedStore,
    counters: Arc<SyncCounters>,
    strategy: JoinStrategy,
}

impl MembershipResolver {
    pub fn new(store: SharedStore, counters: Arc<SyncCounters>, strategy: JoinStrategy) -> Self {
        Self {
            store,
            counters,
            strategy,
        }
    }

    pub fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    pub async fn join(
        &self,
        view: &ViewHandle<Team>,
        team_id: &str,
        actor: Option<&Actor>,
    ) -> JoinOutcome {
        let plan = {
            let current = view.read().await;
            plan_join(&current, team_id, actor)
        };
        match plan {
            Ok(plan) => self.commit(plan).await,
            Err(skip) => JoinOutcome::Skipped(skip),
        }
    }

    /// Write a prepared plan. Under read-modify-write this overwrites the
    /// stored list unconditionally.
    pub async fn commit(&self, plan: JoinPlan) -> JoinOutcome {
        let result = match self.strategy {
            JoinStrategy::ReadModifyWrite => {
                self.store
                    .update(
                        Table::Teams,
                        Filter::IdEq(plan.team_id.clone()),
                        json!({ MEMBERS_FIELD: plan.members }),
                    )
                    .await
            }
            JoinStrategy::AtomicAppend => self
                .store
                .append_unique(
                    Table::Teams,
                    &plan.team_id,
                    MEMBERS_FIELD,
                    json!(plan.user_id),
                )
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => {
                self.counters.record_write();
                info!(team = %plan.team_id, user = %plan.user_id, strategy = ?self.strategy, "joined team");
                JoinOutcome::Joined
            }
            Err(e) => {
                self.counters.record_write_failure();
                warn!(team = %plan.team_id, error = %e, "join failed");
                JoinOutcome::Failed(e)
            }
        }
    }
}
