pub mod daily_rollover;
pub mod heart_regeneration;
pub mod sync_replay;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::progress::ProgressEngine;
use crate::sync::SyncClient;

/// 单次 worker 执行超时
const WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    HeartRegeneration,
    DailyRollover,
    SyncReplay,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeartRegeneration => "heart_regeneration",
            Self::DailyRollover => "daily_rollover",
            Self::SyncReplay => "sync_replay",
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
    engine: Arc<ProgressEngine>,
    sync: Option<Arc<SyncClient>>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        engine: Arc<ProgressEngine>,
        sync: Option<Arc<SyncClient>>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            engine,
            sync,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.enabled {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::HeartRegeneration,
                cron: "0 * * * * *",
                enabled: true,
            },
            JobSpec {
                name: WorkerName::DailyRollover,
                cron: "30 */5 * * * *",
                enabled: true,
            },
            JobSpec {
                name: WorkerName::SyncReplay,
                cron: "15 * * * * *",
                enabled: self.sync.is_some(),
            },
        ]
    }

    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.enabled {
            tracing::info!("Workers disabled; skipping scheduler startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        self.register_jobs(&scheduler).await;
        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            drain_ms = DRAIN_TIMEOUT.as_millis() as u64,
            "Worker manager shutting down"
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for job in &self.planned_jobs() {
            if !job.enabled {
                tracing::info!(name = job.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = job.name.as_str();
            match job.name {
                WorkerName::HeartRegeneration => {
                    let engine = self.engine.clone();
                    add_job(scheduler, job.cron, name_str, move || {
                        let engine = engine.clone();
                        async move {
                            heart_regeneration::run(&engine).await;
                        }
                    })
                    .await;
                }
                WorkerName::DailyRollover => {
                    let engine = self.engine.clone();
                    add_job(scheduler, job.cron, name_str, move || {
                        let engine = engine.clone();
                        async move {
                            daily_rollover::run(&engine).await;
                        }
                    })
                    .await;
                }
                WorkerName::SyncReplay => {
                    let Some(sync) = self.sync.clone() else {
                        continue;
                    };
                    add_job(scheduler, job.cron, name_str, move || {
                        let sync = sync.clone();
                        async move {
                            sync_replay::run(&sync).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = job.cron, "Registered worker");
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
            if tokio::time::timeout(WORKER_TIMEOUT, fut).await.is_err() {
                tracing::error!(
                    worker = name,
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Worker timed out"
                );
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use crate::config::ProgressConfig;
    use crate::progress::catalog::LevelCatalog;
    use crate::progress::clock::SystemClock;
    use crate::store::Store;

    use super::*;

    fn engine(dir: &tempfile::TempDir) -> Arc<ProgressEngine> {
        let store = Arc::new(Store::open(dir.path().join("workers.sled").to_str().unwrap()).unwrap());
        Arc::new(ProgressEngine::new(
            store,
            Arc::new(LevelCatalog::builtin().unwrap()),
            ProgressConfig::default(),
            Arc::new(SystemClock),
            None,
        ))
    }

    #[tokio::test]
    async fn disabled_config_plans_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(2);
        let manager = WorkerManager::new(
            engine(&tmp),
            None,
            tx.subscribe(),
            &WorkerConfig { enabled: false },
        );
        assert!(manager.planned_jobs().is_empty());
        manager.start().await.expect("disabled start should succeed");
    }

    #[tokio::test]
    async fn sync_replay_follows_sync_availability() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(2);
        let manager = WorkerManager::new(
            engine(&tmp),
            None,
            tx.subscribe(),
            &WorkerConfig { enabled: true },
        );
        let jobs = manager.planned_jobs();
        assert_eq!(jobs.len(), 3);
        let replay = jobs.iter().find(|j| j.name == WorkerName::SyncReplay).unwrap();
        assert!(!replay.enabled);
        assert!(jobs
            .iter()
            .filter(|j| j.name != WorkerName::SyncReplay)
            .all(|j| j.enabled));
    }

    #[tokio::test]
    async fn scheduler_stops_on_shutdown_signal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(2);
        let manager = WorkerManager::new(
            engine(&tmp),
            None,
            tx.subscribe(),
            &WorkerConfig { enabled: true },
        );
        let handle = tokio::spawn(manager.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker manager should stop")
            .expect("join");
        assert!(result.is_ok());
    }

    #[test]
    fn worker_names_are_distinct() {
        let names = [
            WorkerName::HeartRegeneration,
            WorkerName::DailyRollover,
            WorkerName::SyncReplay,
        ];
        let unique: std::collections::HashSet<_> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(unique.len(), names.len());
    }
}
