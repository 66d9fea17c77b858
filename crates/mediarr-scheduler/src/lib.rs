// SPDX-License-Identifier: GPL-3.0-or-later
pub mod job;
pub mod jobs;
pub mod registry;

use mediarr_application::{EventPublisher, GrabService, InMemoryEventBus, QueueService};
use mediarr_config::SchedulerConfig;
use mediarr_realtime::DebouncedBroadcaster;
use registry::JobRegistry;
use std::sync::Arc;
use tracing::info;

use jobs::{BroadcastQueueJob, ProcessPendingReleasesJob, QueueBroadcastObserver, RefreshQueueJob};

/// The services the background jobs drive.
pub struct SchedulerServices<P: EventPublisher = InMemoryEventBus> {
    pub queue: Arc<QueueService<P>>,
    pub grab: Arc<GrabService<P>>,
    pub broadcaster: Arc<DebouncedBroadcaster>,
}

pub struct Scheduler<P: EventPublisher = InMemoryEventBus> {
    config: SchedulerConfig,
    services: SchedulerServices<P>,
    registry: Arc<JobRegistry>,
}

impl<P: EventPublisher + 'static> Scheduler<P> {
    pub fn new(config: SchedulerConfig, services: SchedulerServices<P>) -> Self {
        let registry = Arc::new(JobRegistry::new(config.max_concurrent_jobs));
        Self {
            config,
            services,
            registry,
        }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Registers every background job and wires queue changes into the broadcaster.
    pub async fn register_jobs(&self) {
        info!(target: "scheduler", "registering background jobs");

        self.services
            .queue
            .add_observer(Arc::new(QueueBroadcastObserver::new(self.services.broadcaster.clone())));

        self.registry
            .register(
                "refresh-queue",
                RefreshQueueJob::new(self.services.queue.clone()),
                Schedule::Interval(self.config.queue_refresh_interval_seconds),
            )
            .await;

        self.registry
            .register(
                "process-pending-releases",
                ProcessPendingReleasesJob::new(self.services.grab.clone()),
                Schedule::Interval(self.config.pending_release_interval_seconds),
            )
            .await;

        self.registry
            .register(
                "broadcast-queue",
                BroadcastQueueJob::new(self.services.broadcaster.clone()),
                Schedule::Interval(self.config.broadcast_tick_seconds),
            )
            .await;

        info!(target: "scheduler", "all jobs registered");
    }

    pub async fn start(&self) {
        self.registry.clone().start().await;
    }

    /// Stops every job, then sends any broadcast still waiting on its window.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        if self.services.broadcaster.flush().await {
            info!(target: "scheduler", "flushed pending queue broadcast");
        }
    }
}

pub use job::{Job, JobContext, JobResult};
pub use registry::Schedule;
