use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hackhub_client::clock::{Countdown, SystemClock};
use hackhub_client::config;
use hackhub_client::dashboard::Dashboard;
use hackhub_client::store::SharedStore;
use hackhub_client::store::http::HttpStore;
use hackhub_client::store::memory::MemoryStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store: SharedStore = match config::store_url() {
        Some(url) => {
            tracing::info!(%url, "Connecting to remote store");
            Arc::new(
                HttpStore::new(
                    url.as_str(),
                    config::store_api_key(),
                    config::http_timeout(),
                    config::connect_timeout(),
                )
                .context("failed to build store client")?,
            )
        }
        None => {
            tracing::warn!("HACKHUB_STORE_URL is not set; using an in-memory store");
            Arc::new(MemoryStore::with_buffer(config::change_buffer()))
        }
    };

    let actor = config::actor();
    match &actor {
        Some(actor) => tracing::info!(actor = %actor.id, "Signed in"),
        None => tracing::info!("No actor configured; running read-only"),
    }

    let join_strategy = config::join_strategy();
    let mut dashboard = Dashboard::new(store, join_strategy);
    for (table, e) in dashboard.mount().await {
        tracing::warn!(%table, error = %e, "live updates unavailable");
    }

    let window = config::countdown_window();
    let clock = Arc::new(SystemClock);
    let countdown = Countdown::starting_at(chrono::Utc::now(), window)
        .on_complete(|| tracing::info!("Hacking window closed"));
    dashboard.start_countdown(countdown, clock, config::tick_interval());

    let mut revisions = (
        dashboard.announcements.view().watch(),
        dashboard.projects.view().watch(),
        dashboard.teams.view().watch(),
    );
    let mut countdown_log =
        tokio::time::interval(Duration::from_secs(config::SUMMARY_LOG_INTERVAL_SECS));
    let shutdown = stop_requested();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            received = &mut shutdown => {
                tracing::info!(signal = received, "Stopping dashboard");
                break;
            }
            _ = countdown_log.tick() => {
                if let Some(countdown) = dashboard.countdown() {
                    tracing::info!(
                        remaining = %countdown.display(),
                        progress = %countdown.progress_label(),
                        "countdown"
                    );
                }
            }
            Ok(()) = revisions.0.changed() => {
                tracing::info!("{}", dashboard.summary().await);
            }
            Ok(()) = revisions.1.changed() => {
                tracing::info!("{}", dashboard.summary().await);
            }
            Ok(()) = revisions.2.changed() => {
                tracing::info!("{}", dashboard.summary().await);
            }
        }
    }

    dashboard.unmount().await;
    tracing::info!("Dashboard unmounted; exiting");
    Ok(())
}

/// Resolves with the name of the first stop signal. A signal whose handler
/// cannot be installed never resolves, so the other one still works.
async fn stop_requested() -> &'static str {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C will not stop the dashboard");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                "terminate"
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM will not stop the dashboard");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}
