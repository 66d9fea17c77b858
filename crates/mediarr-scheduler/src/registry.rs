// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed interval in seconds. The first run happens immediately.
    Interval(u64),
    Once,
}

struct RegisteredJob {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

/// Owns the registered jobs and the tasks driving them.
pub struct JobRegistry {
    jobs: RwLock<BTreeMap<String, RegisteredJob>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    max_concurrent: usize,
}

impl JobRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            tasks: Mutex::new(Vec::new()),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn register(&self, job_id: impl Into<String>, job: impl Job + 'static, schedule: Schedule) {
        let job_id = job_id.into();
        let registered = RegisteredJob {
            job: Arc::new(job) as Arc<dyn Job>,
            schedule,
        };
        info!(
            target: "scheduler",
            %job_id,
            job_type = registered.job.job_type(),
            schedule = ?registered.schedule,
            "registering job"
        );
        self.jobs.write().await.insert(job_id, registered);
    }

    pub async fn job_ids(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Spawns one driver task per job. Runs share a concurrency limit.
    pub async fn start(self: Arc<Self>) {
        info!(target: "scheduler", max_concurrent = self.max_concurrent, "starting job registry");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let jobs = self.jobs.read().await;
        let mut tasks = self.tasks.lock().await;

        for (job_id, registered) in jobs.iter() {
            let job_id = job_id.clone();
            let job = registered.job.clone();
            let semaphore = semaphore.clone();

            let handle = match registered.schedule {
                Schedule::Interval(seconds) => tokio::spawn(async move {
                    let mut ticker = interval(Duration::from_secs(seconds.max(1)));
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        // Runs of the same job never overlap.
                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        Self::execute_job(&job_id, job.as_ref()).await;
                        drop(permit);
                    }
                }),
                Schedule::Once => tokio::spawn(async move {
                    if let Ok(_permit) = semaphore.acquire_owned().await {
                        Self::execute_job(&job_id, job.as_ref()).await;
                    }
                }),
            };
            tasks.push(handle);
        }

        info!(target: "scheduler", jobs = jobs.len(), "job registry started");
    }

    /// Aborts every driver task. In-flight runs are dropped at their next await.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!(target: "scheduler", "job registry stopped");
    }

    /// Runs `job` once, retrying per its retry policy.
    pub(crate) async fn execute_job(job_id: &str, job: &dyn Job) -> JobResult {
        let mut ctx = JobContext::new(job_id);
        let max_attempts = if job.is_retriable() {
            job.max_retries() + 1
        } else {
            1
        };

        loop {
            debug!(
                target: "scheduler",
                %job_id,
                job_type = job.job_type(),
                attempt = ctx.attempt,
                max_attempts,
                "executing job"
            );

            let (error, retry) = match job.execute(ctx.clone()).await {
                Ok(JobResult::Success) => {
                    debug!(target: "scheduler", %job_id, attempts = ctx.attempt, "job completed");
                    return JobResult::Success;
                }
                Ok(JobResult::Skipped { reason }) => {
                    debug!(target: "scheduler", %job_id, %reason, "job skipped");
                    return JobResult::Skipped { reason };
                }
                Ok(JobResult::Failure { error, retry }) => (error, retry),
                Err(err) => (err.to_string(), job.is_retriable()),
            };

            error!(
                target: "scheduler",
                %job_id,
                job_type = job.job_type(),
                attempt = ctx.attempt,
                %error,
                retry,
                "job failed"
            );
            if !retry || ctx.attempt >= max_attempts {
                if retry {
                    error!(target: "scheduler", %job_id, "job exhausted all retry attempts");
                }
                return JobResult::Failure { error, retry };
            }

            let delay = Duration::from_secs(job.retry_delay_seconds());
            warn!(target: "scheduler", %job_id, ?delay, "retrying job after delay");
            tokio::time::sleep(delay).await;
            ctx = ctx.retry();
        }
    }
}
