// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use mediarr_application::{
    BlocklistService, DownloadClientRegistry, DownloadDecisionMaker, GrabService, HistoryLog,
    InMemoryEventBus, InMemoryProfileStore, PendingReleaseService, ProfileStore, QueueService,
    TrackedDownloadService,
};
use mediarr_config::{load as load_config, AppConfig, TelemetryConfig};
use mediarr_domain::{Clock, SystemClock};
use mediarr_realtime::{DebouncedBroadcaster, NoopRealtimeHub};
use mediarr_scheduler::{Scheduler, SchedulerServices};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const QUEUE_CHANNEL: &str = "queue";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::args());
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    init_tracing(&config.telemetry);

    let services = build_services(&config)?;
    check_download_clients(&services.clients).await;

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        SchedulerServices {
            queue: services.queue,
            grab: services.grab,
            broadcaster: services.broadcaster,
        },
    );
    scheduler.register_jobs().await;
    scheduler.start().await;
    info!(target: "cli", "mediarr started");

    shutdown_signal().await;
    scheduler.shutdown().await;
    info!(target: "cli", "mediarr stopped");
    Ok(())
}

struct Services {
    clients: DownloadClientRegistry,
    queue: Arc<QueueService>,
    grab: Arc<GrabService>,
    broadcaster: Arc<DebouncedBroadcaster>,
}

fn build_services(config: &AppConfig) -> Result<Services> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let profiles: Arc<dyn ProfileStore> =
        Arc::new(InMemoryProfileStore::from_config(config).context("resolving quality profiles")?);
    let clients = DownloadClientRegistry::from_config(&config.download_clients);
    if clients.is_empty() {
        warn!(target: "cli", "no download clients configured, grabs will fail");
    }

    let history = Arc::new(HistoryLog::new());
    let blocklist = Arc::new(BlocklistService::new());
    let pending = Arc::new(PendingReleaseService::new(profiles.clone()));
    let bus = Arc::new(InMemoryEventBus::new());
    let tracked = Arc::new(TrackedDownloadService::new(history.clone()));

    let maker = Arc::new(DownloadDecisionMaker::standard(
        profiles.clone(),
        history.clone(),
        blocklist.clone(),
        tracked.clone(),
        &config.decision,
        clock.clone(),
    ));
    info!(target: "cli", rules = ?maker.engine().rule_names(), "grab rules loaded");

    let grab = Arc::new(GrabService::new(
        maker,
        clients.clone(),
        history.clone(),
        pending.clone(),
        profiles.clone(),
        clock.clone(),
        bus.clone(),
    ));
    let queue = Arc::new(QueueService::new(
        clients.clone(),
        tracked,
        pending,
        blocklist,
        history,
        profiles,
        clock.clone(),
        bus,
    ));
    let broadcaster = Arc::new(DebouncedBroadcaster::new(
        Arc::new(NoopRealtimeHub),
        clock,
        QUEUE_CHANNEL,
        chrono::Duration::seconds(config.queue.broadcast_debounce_seconds as i64),
    ));

    Ok(Services {
        clients,
        queue,
        grab,
        broadcaster,
    })
}

async fn check_download_clients(clients: &DownloadClientRegistry) {
    for client in clients.all() {
        match client.test_connection().await {
            Ok(()) => info!(target: "cli", client = client.name(), "download client reachable"),
            Err(err) => warn!(target: "cli", client = client.name(), error = %err, "download client unreachable"),
        }
    }
}

/// The first argument, when given, is a TOML configuration file.
fn config_path(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    args.nth(1).map(PathBuf::from)
}

fn env_filter(telemetry: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level))
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let json_layer = telemetry
        .json
        .then(|| fmt::layer().json().with_target(true).with_current_span(false));
    let text_layer = (!telemetry.json)
        .then(|| fmt::layer().with_target(true).with_thread_names(true).with_level(true));

    tracing_subscriber::registry()
        .with(env_filter(telemetry))
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
            }
            _ => {
                warn!(target: "cli", "unable to install unix signal handlers, falling back to ctrl-c");
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(target: "cli", error = %err, "ctrl-c handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "cli", error = %err, "ctrl-c handler failed");
        }
    }

    info!(target: "cli", "shutdown signal received");
}
