pub mod mastery_reconcile;
pub mod viva_expiry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{Config, WorkerConfig};
use crate::orchestrator::TutorEngine;
use crate::store::Store;

/// Timeout for individual worker invocations.
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 所有 worker 的枚举，消除字符串匹配，编译期保证完整性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    VivaExpiry,
    MasteryReconcile,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VivaExpiry => "viva_expiry",
            Self::MasteryReconcile => "mastery_reconcile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    engine: Arc<TutorEngine>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    viva_timeout_secs: i64,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<TutorEngine>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            engine,
            shutdown_rx,
            config: config.worker.clone(),
            viva_timeout_secs: config.viva.session_timeout_secs,
        }
    }

    /// Single source of truth for all planned jobs and their cron
    /// schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::VivaExpiry,
                cron: "0 * * * * *",
                enabled: true,
            },
            JobSpec {
                name: WorkerName::MasteryReconcile,
                cron: "0 */5 * * * *",
                enabled: self.config.enable_mastery_reconcile,
            },
        ]
    }

    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = spec.name.as_str();
            match spec.name {
                WorkerName::VivaExpiry => {
                    let store = self.store.clone();
                    let timeout = self.viva_timeout_secs;
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            viva_expiry::run(&store, timeout).await;
                        }
                    })
                    .await;
                }
                WorkerName::MasteryReconcile => {
                    let engine = self.engine.clone();
                    add_job(scheduler, spec.cron, name_str, move || {
                        let engine = engine.clone();
                        async move {
                            mastery_reconcile::run(&engine).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = spec.cron, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::error!(
                        worker = name,
                        timeout_secs = WORKER_TIMEOUT.as_secs(),
                        "Worker timed out"
                    );
                }
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}
