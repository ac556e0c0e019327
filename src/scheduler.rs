//! Scheduling context for periodic bookkeeping jobs
//!
//! Each job runs on its own task and ticks at a fixed period until the
//! scheduler is destroyed. `destroy` waits for every job to stop.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic job runner
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Create a running scheduler with no jobs
    pub fn start() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            jobs: Vec::new(),
        }
    }

    /// Run `job` now and then every `period`
    ///
    /// A tick that is still running when the next one is due delays the
    /// schedule instead of bursting.
    pub fn schedule_every<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => job().await,
                    _ = shutdown.changed() => break,
                }
            }
            tracing::debug!(job = name, "Scheduled job stopped");
        });

        tracing::debug!(job = name, period_ms = period.as_millis() as u64, "Job scheduled");
        self.jobs.push((name, handle));
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Stop all jobs and wait for them to finish
    pub async fn destroy(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.jobs {
            if let Err(e) = handle.await {
                tracing::warn!(job = name, error = %e, "Scheduled job terminated abnormally");
            }
        }
    }
}
