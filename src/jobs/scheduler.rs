//! Job scheduler: cron and interval triggers over tokio tasks.
//!
//! Each job runs in its own loop, one invocation at a time (a tick that
//! arrives while the previous run is still going is skipped). Start is
//! idempotent; shutdown signals every loop and waits out a grace window.

use super::JobContext;
use anyhow::{Context as _, Result};
use chrono::Utc;
use cron::Schedule;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type JobFn = Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone)]
pub enum Trigger {
    Cron {
        schedule: Box<Schedule>,
        expr: String,
    },
    Interval(Duration),
}

impl Trigger {
    /// Parse a standard 5-field cron expression (minute hour dom month dow).
    pub fn cron(expr: &str) -> Result<Self> {
        // The cron crate wants a seconds field up front.
        let with_seconds = format!("0 {}", expr.trim());
        let schedule = Schedule::from_str(&with_seconds)
            .with_context(|| format!("invalid cron expression: {expr}"))?;
        Ok(Self::Cron {
            schedule: Box::new(schedule),
            expr: expr.to_string(),
        })
    }

    pub fn interval(period: Duration) -> Self {
        Self::Interval(period)
    }

    fn describe(&self) -> String {
        match self {
            Self::Cron { expr, .. } => format!("cron {expr}"),
            Self::Interval(period) => format!("every {}s", period.as_secs()),
        }
    }
}

struct Job {
    id: &'static str,
    trigger: Trigger,
    run: JobFn,
}

pub struct Scheduler {
    jobs: Mutex<Vec<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    pub fn register<F>(&self, id: &'static str, trigger: Trigger, run: F)
    where
        F: Fn(JobContext) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.jobs.lock().push(Job {
            id,
            trigger,
            run: Arc::new(run),
        });
    }

    pub fn job_ids(&self) -> Vec<&'static str> {
        self.jobs.lock().iter().map(|j| j.id).collect()
    }

    /// Spawn one loop per registered job. Calling start twice is a no-op.
    pub fn start(&self, ctx: JobContext) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("scheduler already started");
            return;
        }

        let jobs = std::mem::take(&mut *self.jobs.lock());
        let mut handles = self.handles.lock();

        for job in jobs {
            info!("✅ Registered job: {} ({})", job.id, job.trigger.describe());
            let ctx = ctx.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                match job.trigger {
                    Trigger::Interval(period) => {
                        let mut ticker = tokio::time::interval(period);
                        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                        // The first tick fires immediately; skip it so the job
                        // starts one period after boot.
                        ticker.tick().await;
                        loop {
                            tokio::select! {
                                _ = ticker.tick() => {
                                    run_once(job.id, &job.run, ctx.clone()).await;
                                }
                                _ = shutdown_rx.changed() => break,
                            }
                        }
                    }
                    Trigger::Cron { schedule, .. } => loop {
                        let Some(next) = schedule.upcoming(Utc).next() else {
                            warn!("job {} has no future fire times, stopping", job.id);
                            break;
                        };
                        let wait = (next - Utc::now())
                            .to_std()
                            .unwrap_or(Duration::from_secs(0));
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {
                                run_once(job.id, &job.run, ctx.clone()).await;
                            }
                            _ = shutdown_rx.changed() => break,
                        }
                    },
                }
            }));
        }

        info!("✅ Background scheduler started ({} jobs)", handles.len());
    }

    /// Signal every loop and wait up to `grace` for in-flight runs to finish.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());

        for handle in handles {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("job did not stop within the grace window");
            }
        }
        info!("Background scheduler stopped");
    }
}

async fn run_once(id: &'static str, run: &JobFn, ctx: JobContext) {
    if let Err(e) = run(ctx).await {
        error!("❌ Job {id} failed: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::connections::ConnectionRegistry;
    use crate::fairness::DisabledSolver;
    use crate::ml::ModelRegistry;
    use crate::notify::NoopDispatcher;
    use crate::store::FleetDb;
    use crate::weather::WeatherOracle;
    use std::sync::atomic::AtomicUsize;

    pub(crate) fn test_context() -> JobContext {
        JobContext {
            db: FleetDb::in_memory().unwrap(),
            registry: ModelRegistry::empty(),
            notifier: Arc::new(NoopDispatcher),
            connections: Arc::new(ConnectionRegistry::new()),
            cache: Cache::in_memory(),
            weather: Arc::new(WeatherOracle::new(None)),
            solver: Arc::new(DisabledSolver),
            config: Arc::new(Config::from_env()),
        }
    }

    #[test]
    fn five_field_cron_expressions_parse() {
        assert!(Trigger::cron("0 6 * * *").is_ok());
        assert!(Trigger::cron("0 0 * * *").is_ok());
        assert!(Trigger::cron("0 23 * * *").is_ok());
        assert!(Trigger::cron("0 3 * * *").is_ok());
        assert!(Trigger::cron("not a cron").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_job_fires_and_serializes() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();

        scheduler.register("tick", Trigger::interval(Duration::from_secs(60)), move |_ctx| {
            let seen = seen.clone();
            Box::pin(async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
        scheduler.start(test_context());

        tokio::time::sleep(Duration::from_secs(190)).await;
        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected at least 2 ticks, saw {fired}");

        scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn start_is_idempotent_and_shutdown_waits() {
        let scheduler = Scheduler::new();
        scheduler.register("noop", Trigger::interval(Duration::from_secs(3600)), |_ctx| {
            Box::pin(async { Ok(()) })
        });

        scheduler.start(test_context());
        scheduler.start(test_context());
        scheduler.shutdown(Duration::from_secs(1)).await;
    }
}
