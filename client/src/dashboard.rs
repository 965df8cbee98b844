use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hackhub_shared::Table;
use tracing::{info, warn};

use crate::clock::{Clock, Countdown, CountdownSnapshot, CountdownTicker};
use crate::membership::JoinStrategy;
use crate::panels::{AnnouncementsPanel, ProjectsPanel, TeamsPanel};
use crate::state::{SyncCounters, SyncCountersSnapshot};
use crate::store::{SharedStore, StoreError};

/// The three data-bound panels plus the countdown.
pub struct Dashboard {
    pub announcements: AnnouncementsPanel,
    pub projects: ProjectsPanel,
    pub teams: TeamsPanel,
    counters: Arc<SyncCounters>,
    ticker: Option<CountdownTicker>,
}

impl Dashboard {
    pub fn new(store: SharedStore, join_strategy: JoinStrategy) -> Self {
        let counters = Arc::new(SyncCounters::default());
        Self {
            announcements: AnnouncementsPanel::new(store.clone(), Arc::clone(&counters)),
            projects: ProjectsPanel::new(store.clone(), Arc::clone(&counters)),
            teams: TeamsPanel::new(store, Arc::clone(&counters), join_strategy),
            counters,
            ticker: None,
        }
    }

    pub fn counters(&self) -> &Arc<SyncCounters> {
        &self.counters
    }

    /// Mount every panel concurrently. Panels whose subscription failed still
    /// show their snapshot; the failures are returned by table.
    pub async fn mount(&mut self) -> Vec<(Table, StoreError)> {
        let (announcements, projects, teams) = tokio::join!(
            self.announcements.mount(),
            self.projects.mount(),
            self.teams.mount(),
        );
        let failures: Vec<_> = [
            (Table::Announcements, announcements),
            (Table::Projects, projects),
            (Table::Teams, teams),
        ]
        .into_iter()
        .filter_map(|(table, result)| result.err().map(|e| (table, e)))
        .collect();

        if failures.is_empty() {
            info!("dashboard mounted");
        } else {
            warn!(failed = failures.len(), "dashboard mounted with live updates missing");
        }
        failures
    }

    pub async fn unmount(&mut self) {
        tokio::join!(
            self.announcements.unmount(),
            self.projects.unmount(),
            self.teams.unmount(),
        );
        if let Some(ticker) = self.ticker.take() {
            ticker.stop().await;
        }
        info!("dashboard unmounted");
    }

    /// Start (or restart) the countdown display.
    pub fn start_countdown(
        &mut self,
        countdown: Countdown,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> &CountdownTicker {
        self.ticker
            .insert(CountdownTicker::spawn(countdown, clock, interval))
    }

    pub fn countdown(&self) -> Option<CountdownSnapshot> {
        self.ticker.as_ref().map(CountdownTicker::latest)
    }

    pub async fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            announcements: self.announcements.view().len().await,
            projects: self.projects.view().len().await,
            teams: self.teams.view().len().await,
            countdown: self.countdown(),
            counters: self.counters.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashboardSummary {
    pub announcements: usize,
    pub projects: usize,
    pub teams: usize,
    pub countdown: Option<CountdownSnapshot>,
    pub counters: SyncCountersSnapshot,
}

impl fmt::Display for DashboardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "announcements={} projects={} teams={}",
            self.announcements, self.projects, self.teams
        )?;
        if let Some(countdown) = &self.countdown {
            write!(
                f,
                " remaining={} ({})",
                countdown.display(),
                countdown.progress_label()
            )?;
        }
        write!(
            f,
            " applied={} reloads={} writes={}",
            self.counters.changes_applied_total,
            self.counters.reloads_triggered_total,
            self.counters.writes_total
        )
    }
}
