//! Timer tasks with shared cancellation
//!
//! Every task spawned here is tracked; [`Scheduler::shutdown`] cancels the
//! token and waits for all of them. A task body that is still running when
//! the token fires is dropped at its next await point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use common::time::{Clock, LocalZone};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_token(CancellationToken::new(), clock)
    }

    /// Share an existing token, e.g. one cancelled by the signal handler
    pub fn with_token(token: CancellationToken, clock: Arc<dyn Clock>) -> Self {
        Self {
            token,
            tracker: TaskTracker::new(),
            clock,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Number of tasks still running
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Run `task` every `period`, first run immediately
    ///
    /// A run that overruns the period delays the next one instead of
    /// bursting to catch up.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Task {} started (every {:?})", name, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    () = token.cancelled() => break,
                }
                tokio::select! {
                    () = task() => {},
                    () = token.cancelled() => break,
                }
            }

            info!("Task {} stopped", name);
        });
    }

    /// Run `task` once a day at local wall-clock `time_of_day`
    ///
    /// The task receives the instant it was scheduled for, or the clock's
    /// current time if that is later.
    pub fn spawn_daily<F, Fut>(
        &self,
        name: &'static str,
        zone: LocalZone,
        time_of_day: NaiveTime,
        mut task: F,
    ) where
        F: FnMut(DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let clock = self.clock.clone();
        self.tracker.spawn(async move {
            let mut last_fire: Option<DateTime<Utc>> = None;

            loop {
                let now = clock.now();
                let after = last_fire.map_or(now, |last| last.max(now));
                let next = zone.next_daily(after, time_of_day);
                let wait = (next - after).to_std().unwrap_or(Duration::ZERO);
                debug!("Task {} next run at {} (in {:?})", name, next, wait);

                tokio::select! {
                    () = tokio::time::sleep(wait) => {},
                    () = token.cancelled() => break,
                }

                let fired_at = next.max(clock.now());
                last_fire = Some(next);
                tokio::select! {
                    () = task(fired_at) => {},
                    () = token.cancelled() => break,
                }
            }

            info!("Task {} stopped", name);
        });
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Scheduler stopped");
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::time::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_periodic_fires_until_cancelled() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let scheduler = Scheduler::new(clock);
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        scheduler.spawn_periodic("tick", Duration::from_secs(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Fires at 0, 10, 20, 30
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_fires_once_per_day() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let scheduler = Scheduler::new(clock);
        let fired = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let f = fired.clone();
        scheduler.spawn_daily(
            "cleanup",
            LocalZone::utc(),
            NaiveTime::from_hms_opt(0, 1, 0).unwrap(),
            move |at| {
                let f = f.clone();
                async move {
                    f.lock().push(at);
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert!(fired.lock().is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *fired.lock(),
            vec![Utc.with_ymd_and_hms(2024, 5, 2, 0, 1, 0).unwrap()]
        );

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(fired.lock().len(), 2);
        assert_eq!(
            fired.lock()[1],
            Utc.with_ymd_and_hms(2024, 5, 3, 0, 1, 0).unwrap()
        );

        scheduler.shutdown().await;
    }
}
