use std::fmt::Write;

use chrono::{DateTime, Utc};

/// Remaining time until `deadline`, clamped to `[0, window_ms]`.
pub fn remaining_ms(deadline: DateTime<Utc>, now: DateTime<Utc>, window_ms: i64) -> i64 {
    let remaining = deadline.signed_duration_since(now).num_milliseconds().max(0);
    remaining.min(window_ms.max(0))
}

/// Share of the window still left, in `[0, 1]`.
pub fn progress_fraction(deadline: DateTime<Utc>, now: DateTime<Utc>, window_ms: i64) -> f64 {
    if window_ms <= 0 {
        return 0.0;
    }
    let left = deadline.signed_duration_since(now).num_milliseconds() as f64;
    (left / window_ms as f64).clamp(0.0, 1.0)
}

/// Percentage label with one decimal, e.g. `"50.0%"`.
pub fn format_progress(fraction: f64) -> String {
    let percent = (fraction * 100.0).clamp(0.0, 100.0);
    format!("{percent:.1}%")
}

/// Exact decomposition of a millisecond count. Never rounds up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub hours: i64,
    pub minutes: u8,
    pub seconds: u8,
    pub centis: u8,
}

impl TimeParts {
    pub fn from_millis(ms: i64) -> Self {
        let ms = ms.max(0);
        let total_secs = ms / 1000;
        Self {
            hours: total_secs / 3600,
            minutes: ((total_secs % 3600) / 60) as u8,
            seconds: (total_secs % 60) as u8,
            centis: ((ms % 1000) / 10) as u8,
        }
    }
}

/// Format remaining milliseconds as `HH:MM:SS.cc` with cumulative hours.
pub fn format_countdown(ms: i64) -> String {
    let mut out = String::with_capacity(11);
    write_countdown(&mut out, ms);
    out
}

pub fn write_countdown(buf: &mut String, ms: i64) {
    buf.clear();
    let TimeParts {
        hours,
        minutes,
        seconds,
        centis,
    } = TimeParts::from_millis(ms);
    let _ = write!(buf, "{hours:02}:{minutes:02}:{seconds:02}.{centis:02}");
}
