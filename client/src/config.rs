use std::time::Duration;

use hackhub_shared::Actor;

use crate::membership::JoinStrategy;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;
pub const DEFAULT_COUNTDOWN_WINDOW_HOURS: i64 = 48;
pub const DEFAULT_CHANGE_BUFFER: usize = 256;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const SUMMARY_LOG_INTERVAL_SECS: u64 = 1;

pub const REST_PREFIX: &str = "/rest/v1";
pub const REALTIME_PREFIX: &str = "/realtime/v1";

pub fn store_url() -> Option<String> {
    std::env::var("HACKHUB_STORE_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

pub fn store_api_key() -> Option<String> {
    std::env::var("HACKHUB_STORE_API_KEY")
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn tick_interval() -> Duration {
    std::env::var("HACKHUB_TICK_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_TICK_INTERVAL_MS))
}

pub fn countdown_window() -> chrono::Duration {
    std::env::var("HACKHUB_COUNTDOWN_WINDOW_HOURS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(chrono::Duration::hours)
        .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_COUNTDOWN_WINDOW_HOURS))
}

pub fn change_buffer() -> usize {
    std::env::var("HACKHUB_CHANGE_BUFFER")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_CHANGE_BUFFER)
}

pub fn http_timeout() -> Duration {
    std::env::var("HACKHUB_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
}

pub fn connect_timeout() -> Duration {
    std::env::var("HACKHUB_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
}

pub fn join_strategy() -> JoinStrategy {
    std::env::var("HACKHUB_JOIN_STRATEGY")
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "atomic-append" | "atomic" => JoinStrategy::AtomicAppend,
                _ => JoinStrategy::ReadModifyWrite,
            }
        })
        .unwrap_or(JoinStrategy::ReadModifyWrite)
}

/// Acting user for this process. Both id and email must be set.
pub fn actor() -> Option<Actor> {
    let id = std::env::var("HACKHUB_ACTOR_ID").ok()?;
    let email = std::env::var("HACKHUB_ACTOR_EMAIL").ok()?;
    if id.trim().is_empty() || email.trim().is_empty() {
        return None;
    }
    Some(Actor {
        id: id.trim().to_string(),
        email: email.trim().to_string(),
    })
}
