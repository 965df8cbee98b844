use std::sync::Arc;

use hackhub_shared::{Actor, Table};
use tracing::{info, warn};

use crate::state::SyncCounters;
use crate::store::{Row, SharedStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("sign in to submit")]
    SignedOut,
    /// A required text field is empty after trimming.
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("could not encode payload: {0}")]
    Encode(String),
}

/// Draft input for one collection's create form.
pub trait Draft {
    const TABLE: Table;

    /// Validate and build the insert payload on behalf of `actor`.
    fn payload(&self, actor: &Actor) -> Result<Row, ValidationError>;

    fn clear(&mut self);
}

/// Draft plus whether its compose panel is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compose<D> {
    pub draft: D,
    pub open: bool,
}

impl<D: Draft> Compose<D> {
    pub fn open(&mut self) {
        self.open = true;
    }

    /// Hide the panel; the draft is kept.
    pub fn cancel(&mut self) {
        self.open = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The store accepted the row; the draft was cleared and the panel closed.
    Submitted(Row),
    Rejected(ValidationError),
    /// The write failed; the draft is untouched for a retry.
    Failed(StoreError),
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted(_))
    }
}

/// Issues create writes. Never touches local views.
#[derive(Clone)]
pub struct MutationSubmitter {
    store: SharedStore,
    counters: Arc<SyncCounters>,
}

impl MutationSubmitter {
    pub fn new(store: SharedStore, counters: Arc<SyncCounters>) -> Self {
        Self { store, counters }
    }

    pub async fn submit<D: Draft>(
        &self,
        compose: &mut Compose<D>,
        actor: Option<&Actor>,
    ) -> SubmitOutcome {
        let Some(actor) = actor else {
            return SubmitOutcome::Rejected(ValidationError::SignedOut);
        };
        let payload = match compose.draft.payload(actor) {
            Ok(payload) => payload,
            Err(e) => return SubmitOutcome::Rejected(e),
        };

        match self.store.insert(D::TABLE, payload).await {
            Ok(row) => {
                self.counters.record_write();
                compose.draft.clear();
                compose.open = false;
                info!(table = %D::TABLE, actor = %actor.id, "submitted new row");
                SubmitOutcome::Submitted(row)
            }
            Err(e) => {
                self.counters.record_write_failure();
                warn!(table = %D::TABLE, error = %e, "submit failed; keeping draft");
                SubmitOutcome::Failed(e)
            }
        }
    }
}

/// Fail with `MissingField` when `value` is blank after trimming.
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

pub fn encode<P: serde::Serialize>(payload: &P) -> Result<Row, ValidationError> {
    serde_json::to_value(payload).map_err(|e| ValidationError::Encode(e.to_string()))
}
