use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hackhub_shared::{format_countdown, format_progress, progress_fraction, remaining_ms};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Source of "now" for the countdown.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPhase {
    Running,
    Expired,
}

/// Derived countdown values for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountdownSnapshot {
    pub remaining_ms: i64,
    pub progress: f64,
    pub phase: CountdownPhase,
}

impl CountdownSnapshot {
    pub fn expired(&self) -> bool {
        self.phase == CountdownPhase::Expired
    }

    /// `HH:MM:SS.cc`
    pub fn display(&self) -> String {
        format_countdown(self.remaining_ms)
    }

    pub fn progress_label(&self) -> String {
        format_progress(self.progress)
    }
}

type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Countdown toward a fixed deadline over a fixed window.
///
/// The phase moves Running -> Expired once; the completion callback runs on
/// that transition and never again.
pub struct Countdown {
    deadline: DateTime<Utc>,
    window_ms: i64,
    phase: CountdownPhase,
    on_complete: Option<CompletionCallback>,
}

impl Countdown {
    pub fn new(deadline: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            deadline,
            window_ms: window.num_milliseconds().max(0),
            phase: CountdownPhase::Running,
            on_complete: None,
        }
    }

    /// A full window starting at `now`.
    pub fn starting_at(now: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self::new(now + window, window)
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn phase(&self) -> CountdownPhase {
        self.phase
    }

    /// Value at `now` without advancing the phase.
    pub fn peek(&self, now: DateTime<Utc>) -> CountdownSnapshot {
        let remaining = remaining_ms(self.deadline, now, self.window_ms);
        CountdownSnapshot {
            remaining_ms: remaining,
            progress: progress_fraction(self.deadline, now, self.window_ms),
            phase: if remaining == 0 {
                CountdownPhase::Expired
            } else {
                self.phase
            },
        }
    }

    /// Recompute at `now`, firing the completion callback on the first tick
    /// that reaches zero.
    pub fn tick(&mut self, now: DateTime<Utc>) -> CountdownSnapshot {
        let snapshot = self.peek(now);
        if snapshot.expired() && self.phase == CountdownPhase::Running {
            self.phase = CountdownPhase::Expired;
            info!(deadline = %self.deadline, "countdown expired");
            if let Some(callback) = self.on_complete.take() {
                callback();
            }
        }
        snapshot
    }
}

/// Periodic task recomputing a countdown and publishing each value.
pub struct CountdownTicker {
    latest: watch::Receiver<CountdownSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl CountdownTicker {
    pub fn spawn(mut countdown: Countdown, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(countdown.tick(clock.now()));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // `latest` holds a receiver for the ticker's lifetime; stop or
            // drop aborts this loop.
            loop {
                ticker.tick().await;
                tx.send_replace(countdown.tick(clock.now()));
            }
        });
        Self {
            latest: rx,
            task: Some(task),
        }
    }

    pub fn latest(&self) -> CountdownSnapshot {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CountdownSnapshot> {
        self.latest.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            match task.await {
                Err(e) if !e.is_cancelled() => {
                    warn!(error = %e, "countdown ticker ended abnormally");
                }
                _ => debug!("countdown ticker stopped"),
            }
        }
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::{Clock, Countdown, CountdownPhase, CountdownTicker, ManualClock};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn completion_fires_once_after_deadline() {
        let clock = ManualClock::new(start());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut countdown = Countdown::new(
            start() + chrono::Duration::milliseconds(10_000),
            chrono::Duration::hours(48),
        )
        .on_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..999 {
            clock.advance(chrono::Duration::milliseconds(10));
            let snapshot = countdown.tick(clock.now());
            assert!(snapshot.remaining_ms > 0);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        clock.advance(chrono::Duration::milliseconds(10));
        let snapshot = countdown.tick(clock.now());
        assert_eq!(snapshot.remaining_ms, 0);
        assert!(snapshot.expired());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        for _ in 0..50 {
            clock.advance(chrono::Duration::milliseconds(10));
            assert_eq!(countdown.tick(clock.now()).remaining_ms, 0);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(countdown.phase(), CountdownPhase::Expired);
    }

    #[test]
    fn halfway_through_the_window_reads_fifty_percent() {
        let countdown = Countdown::new(
            start() + chrono::Duration::hours(24),
            chrono::Duration::hours(48),
        );
        let snapshot = countdown.peek(start());
        assert!((snapshot.progress - 0.5).abs() < 1e-9);
        assert_eq!(snapshot.progress_label(), "50.0%");
        assert_eq!(snapshot.display(), "24:00:00.00");
    }

    #[test]
    fn remaining_never_exceeds_the_window() {
        let countdown = Countdown::new(
            start() + chrono::Duration::hours(72),
            chrono::Duration::hours(48),
        );
        let snapshot = countdown.peek(start());
        assert_eq!(snapshot.remaining_ms, 48 * 3_600_000);
        assert_eq!(snapshot.progress, 1.0);
        assert_eq!(snapshot.phase, CountdownPhase::Running);
    }

    #[test]
    fn seconds_roll_over_when_minutes_decrement() {
        let clock = ManualClock::new(start());
        let mut countdown = Countdown::new(
            start() + chrono::Duration::milliseconds(60_005),
            chrono::Duration::hours(48),
        );
        assert_eq!(countdown.tick(clock.now()).display(), "00:01:00.00");
        clock.advance(chrono::Duration::milliseconds(10));
        assert_eq!(countdown.tick(clock.now()).display(), "00:00:59.99");
    }

    #[test]
    fn peeking_past_the_deadline_does_not_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let countdown = Countdown::starting_at(start(), chrono::Duration::seconds(1))
            .on_complete(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let snapshot = countdown.peek(start() + chrono::Duration::seconds(5));
        assert!(snapshot.expired());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(countdown.phase(), CountdownPhase::Running);
    }

    #[tokio::test]
    async fn ticker_publishes_until_expiry_and_fires_once() {
        let clock = Arc::new(ManualClock::new(start()));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let countdown = Countdown::starting_at(start(), chrono::Duration::seconds(1))
            .on_complete(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let ticker = CountdownTicker::spawn(countdown, clock.clone(), Duration::from_millis(1));
        let mut latest = ticker.subscribe();
        assert_eq!(ticker.latest().remaining_ms, 1_000);

        clock.advance(chrono::Duration::seconds(2));
        tokio::time::timeout(Duration::from_secs(2), async {
            while !latest.borrow_and_update().expired() {
                latest.changed().await.expect("ticker stopped");
            }
        })
        .await
        .expect("ticker should observe the deadline");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(ticker.is_running());
        ticker.stop().await;
    }
}
