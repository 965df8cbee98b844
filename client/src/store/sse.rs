use eventsource_stream::Event;
use hackhub_shared::{ChangeEvent, ChangeKind, RawChange};
use tracing::debug;

use super::FeedMessage;

const LAGGED_EVENT: &str = "lagged";
const DEFAULT_EVENT: &str = "message";

/// Map a Server-Sent Event to a feed message.
///
/// The event name carries the change kind and the data the row
/// (`event: insert` / `data: {...}`). Unnamed events may carry a full
/// `{"kind": ..., "row": ...}` envelope. Keep-alives and unknown events map
/// to `None`.
pub fn event_to_message(event: &Event) -> Option<FeedMessage> {
    let name = if event.event.is_empty() {
        DEFAULT_EVENT
    } else {
        event.event.as_str()
    };
    if name == LAGGED_EVENT {
        let skipped = event.data.trim().parse::<u64>().unwrap_or(1);
        return Some(FeedMessage::Lagged(skipped));
    }
    if let Some(kind) = ChangeKind::parse(name) {
        return match serde_json::from_str(&event.data) {
            Ok(row) => Some(FeedMessage::Change(ChangeEvent { kind, row })),
            Err(e) => {
                debug!(%kind, error = %e, "dropping change event with invalid JSON");
                None
            }
        };
    }
    if name == DEFAULT_EVENT {
        return serde_json::from_str::<RawChange>(&event.data)
            .ok()
            .map(FeedMessage::Change);
    }
    None
}
