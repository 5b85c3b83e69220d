//! Wall-clock scheduler for cron-driven jobs

use crate::error::EngineError;
use chrono::{DateTime, Local};
use cron::Schedule;
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Callback run at each occurrence of a schedule
pub type Job = Arc<dyn Fn() + Send + Sync>;

/// Parse a cron expression (seconds field first, local time)
pub fn parse(expression: &str) -> Result<Schedule, EngineError> {
    Schedule::from_str(expression)
        .map_err(|e| EngineError::InvalidCron(format!("{expression}: {e}")))
}

/// Named cron jobs, each on its own task
pub struct Scheduler {
    /// Active timer handles (keyed by job name)
    timers: DashMap<String, JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler whose jobs stop when `shutdown` is cancelled
    #[must_use]
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            timers: DashMap::new(),
            shutdown,
        }
    }

    /// Run `job` at every occurrence of `schedule`, replacing any job of
    /// the same name
    pub fn schedule_cron(&self, name: &str, schedule: Schedule, job: Job) {
        self.remove(name);

        let id = name.to_string();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut last_fired: Option<DateTime<Local>> = None;
            loop {
                let now = Local::now();
                let from = last_fired.map_or(now, |last| last.max(now));
                let Some(next_time) = schedule.after(&from).next() else {
                    tracing::warn!("No upcoming times for cron schedule {}", id);
                    break;
                };

                let duration = (next_time - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);

                tracing::debug!("Next run of {} at {} (in {:?})", id, next_time, duration);

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(duration) => {}
                }

                tracing::debug!("Cron job {} fired", id);
                job();
                last_fired = Some(next_time);
            }
        });

        self.timers.insert(name.to_string(), handle);
        tracing::info!("Scheduled cron job {}", name);
    }

    /// Stop and forget a job
    pub fn remove(&self, name: &str) {
        if let Some((_, handle)) = self.timers.remove(name) {
            handle.abort();
            tracing::debug!("Removed cron job {}", name);
        }
    }

    /// Get the number of active timers
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, Job) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_invalid_expression() {
        assert!(matches!(parse("every morning"), Err(EngineError::InvalidCron(_))));
        assert!(parse("0 0 9 * * *").is_ok());
    }

    #[tokio::test]
    async fn test_job_fires_once_per_occurrence() {
        let scheduler = Scheduler::new(CancellationToken::new());
        let (count, job) = counter();
        scheduler.schedule_cron("every second", parse("* * * * * *").unwrap(), job);
        assert_eq!(scheduler.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let fired = count.load(Ordering::SeqCst);
        assert!((2..=4).contains(&fired), "fired {fired} times");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_replace() {
        let scheduler = Scheduler::new(CancellationToken::new());
        let (first, job) = counter();
        scheduler.schedule_cron("job", parse("* * * * * *").unwrap(), job);
        let (second, job) = counter();
        scheduler.schedule_cron("job", parse("* * * * * *").unwrap(), job);
        assert_eq!(scheduler.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert!(second.load(Ordering::SeqCst) > 0);

        scheduler.remove("job");
        assert_eq!(scheduler.active_count(), 0);
        let seen = second.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(second.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_jobs() {
        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::new(shutdown.clone());
        let (count, job) = counter();
        scheduler.schedule_cron("job", parse("0 * * * * *").unwrap(), job);
        shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
