// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use anyhow::Result;
use mediarr_application::{EventPublisher, GrabService, InMemoryEventBus, QueueObserver, QueueService};
use mediarr_realtime::DebouncedBroadcaster;
use std::sync::Arc;
use tracing::{debug, info};

/// Polls every download client and merges the result into the queue.
pub struct RefreshQueueJob<P: EventPublisher = InMemoryEventBus> {
    queue: Arc<QueueService<P>>,
}

impl<P: EventPublisher> RefreshQueueJob<P> {
    pub fn new(queue: Arc<QueueService<P>>) -> Self {
        Self { queue }
    }
}

#[async_trait::async_trait]
impl<P: EventPublisher + 'static> Job for RefreshQueueJob<P> {
    fn job_type(&self) -> &'static str {
        "refresh_queue"
    }

    fn name(&self) -> String {
        "Refresh Queue".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobResult> {
        let report = self.queue.refresh().await;
        debug!(
            target: "jobs",
            job_id = %ctx.job_id,
            polled = report.clients_polled,
            failed = report.clients_failed,
            changed = report.changed,
            "queue refreshed"
        );
        if report.clients_polled == 0 {
            return Ok(JobResult::Skipped {
                reason: "no download clients configured".to_string(),
            });
        }
        if report.clients_failed == report.clients_polled {
            return Ok(JobResult::failure("every download client failed to respond", true));
        }
        Ok(JobResult::Success)
    }

    fn max_retries(&self) -> u32 {
        1
    }

    fn retry_delay_seconds(&self) -> u64 {
        10
    }
}

/// Re-evaluates releases held back by a delay or minimum age.
pub struct ProcessPendingReleasesJob<P: EventPublisher = InMemoryEventBus> {
    grab: Arc<GrabService<P>>,
}

impl<P: EventPublisher> ProcessPendingReleasesJob<P> {
    pub fn new(grab: Arc<GrabService<P>>) -> Self {
        Self { grab }
    }
}

#[async_trait::async_trait]
impl<P: EventPublisher + 'static> Job for ProcessPendingReleasesJob<P> {
    fn job_type(&self) -> &'static str {
        "process_pending_releases"
    }

    fn name(&self) -> String {
        "Process Pending Releases".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobResult> {
        let report = self.grab.process_pending().await;
        if !report.grabbed.is_empty() {
            info!(
                target: "jobs",
                job_id = %ctx.job_id,
                grabbed = report.grabbed.len(),
                still_pending = report.pending,
                "pending releases grabbed"
            );
        }
        Ok(JobResult::Success)
    }

    fn is_retriable(&self) -> bool {
        false
    }
}

/// Drives the queue broadcaster's debounce window.
pub struct BroadcastQueueJob {
    broadcaster: Arc<DebouncedBroadcaster>,
}

impl BroadcastQueueJob {
    pub fn new(broadcaster: Arc<DebouncedBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait::async_trait]
impl Job for BroadcastQueueJob {
    fn job_type(&self) -> &'static str {
        "broadcast_queue"
    }

    fn name(&self) -> String {
        "Broadcast Queue".to_string()
    }

    async fn execute(&self, _ctx: JobContext) -> Result<JobResult> {
        self.broadcaster.tick().await;
        Ok(JobResult::Success)
    }

    fn is_retriable(&self) -> bool {
        false
    }
}

/// Feeds queue changes into the broadcaster.
pub struct QueueBroadcastObserver {
    broadcaster: Arc<DebouncedBroadcaster>,
}

impl QueueBroadcastObserver {
    pub fn new(broadcaster: Arc<DebouncedBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

impl QueueObserver for QueueBroadcastObserver {
    fn queue_changed(&self) {
        self.broadcaster.notify();
    }
}
