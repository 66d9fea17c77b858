// SPDX-License-Identifier: GPL-3.0-or-later
//! Push notifications to connected front-ends.
//!
//! Queue changes arrive in bursts (one per polled client, one per grab), so
//! they go through a [`Debouncer`] and reach the hub as a single `sync`
//! message per window.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use mediarr_domain::Clock;
use serde_json::json;
use tracing::{debug, info, warn};

#[async_trait::async_trait]
pub trait RealtimeHub: Send + Sync + 'static {
    async fn broadcast(&self, channel: &str, payload: &str);
}

pub struct NoopRealtimeHub;

#[async_trait::async_trait]
impl RealtimeHub for NoopRealtimeHub {
    async fn broadcast(&self, channel: &str, payload: &str) {
        info!(target: "realtime", %channel, %payload, "noop realtime broadcast");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: DateTime<Utc> },
}

#[derive(Debug)]
struct DebounceInner {
    state: DebounceState,
    paused: u32,
    /// Triggered while paused; armed on the last resume.
    deferred: bool,
}

/// Coalesces triggers into one firing per window.
///
/// The window opens on the first trigger and is not extended by later ones.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    inner: Mutex<DebounceInner>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(DebounceInner {
                state: DebounceState::Idle,
                paused: 0,
                deferred: false,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, DebounceInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(target: "realtime", "debouncer lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn state(&self) -> DebounceState {
        self.inner().state
    }

    /// Returns `true` when this trigger opened a new window.
    pub fn trigger(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner();
        if inner.paused > 0 {
            inner.deferred = true;
            return false;
        }
        match inner.state {
            DebounceState::Idle => {
                inner.state = DebounceState::Pending {
                    deadline: now + self.window,
                };
                true
            }
            DebounceState::Pending { .. } => false,
        }
    }

    /// Returns `true` once per window, when its deadline has passed.
    pub fn poll(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner();
        match inner.state {
            DebounceState::Pending { deadline } if now >= deadline => {
                inner.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Fires immediately if anything is outstanding, paused or not.
    pub fn flush(&self) -> bool {
        let mut inner = self.inner();
        let outstanding = inner.deferred || matches!(inner.state, DebounceState::Pending { .. });
        inner.state = DebounceState::Idle;
        inner.deferred = false;
        outstanding
    }

    pub fn pause(&self) {
        self.inner().paused += 1;
    }

    pub fn resume(&self, now: DateTime<Utc>) {
        let mut inner = self.inner();
        inner.paused = inner.paused.saturating_sub(1);
        if inner.paused == 0 && inner.deferred {
            inner.deferred = false;
            if inner.state == DebounceState::Idle {
                inner.state = DebounceState::Pending {
                    deadline: now + self.window,
                };
            }
        }
    }
}

/// Sends `{"action":"sync"}` on `channel` at most once per debounce window.
pub struct DebouncedBroadcaster {
    hub: Arc<dyn RealtimeHub>,
    clock: Arc<dyn Clock>,
    debouncer: Debouncer,
    channel: String,
}

impl DebouncedBroadcaster {
    pub fn new(
        hub: Arc<dyn RealtimeHub>,
        clock: Arc<dyn Clock>,
        channel: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            hub,
            clock,
            debouncer: Debouncer::new(window),
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn notify(&self) {
        if self.debouncer.trigger(self.clock.now()) {
            debug!(target: "realtime", channel = %self.channel, "broadcast window opened");
        }
    }

    /// Broadcasts if the current window has elapsed.
    pub async fn tick(&self) -> bool {
        if !self.debouncer.poll(self.clock.now()) {
            return false;
        }
        self.send().await;
        true
    }

    /// Broadcasts any outstanding change now. Called on shutdown.
    pub async fn flush(&self) -> bool {
        if !self.debouncer.flush() {
            return false;
        }
        self.send().await;
        true
    }

    async fn send(&self) {
        let payload = json!({ "action": "sync" }).to_string();
        debug!(target: "realtime", channel = %self.channel, "broadcasting sync");
        self.hub.broadcast(&self.channel, &payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarr_domain::ManualClock;

    #[derive(Default)]
    struct RecordingHub {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl RealtimeHub for RecordingHub {
        async fn broadcast(&self, channel: &str, payload: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((channel.to_string(), payload.to_string()));
        }
    }

    fn broadcaster() -> (DebouncedBroadcaster, Arc<RecordingHub>, Arc<ManualClock>) {
        let hub = Arc::new(RecordingHub::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let broadcaster = DebouncedBroadcaster::new(hub.clone(), clock.clone(), "queue", Duration::seconds(5));
        (broadcaster, hub, clock)
    }

    #[test]
    fn window_is_not_extended_by_later_triggers() {
        let debouncer = Debouncer::new(Duration::seconds(5));
        let start = Utc::now();
        assert!(debouncer.trigger(start));
        assert!(!debouncer.trigger(start + Duration::seconds(4)));
        assert_eq!(
            debouncer.state(),
            DebounceState::Pending {
                deadline: start + Duration::seconds(5)
            }
        );
        assert!(!debouncer.poll(start + Duration::seconds(4)));
        assert!(debouncer.poll(start + Duration::seconds(5)));
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert!(!debouncer.poll(start + Duration::seconds(6)));
    }

    #[test]
    fn paused_triggers_arm_on_resume() {
        let debouncer = Debouncer::new(Duration::seconds(5));
        let start = Utc::now();
        debouncer.pause();
        debouncer.pause();
        assert!(!debouncer.trigger(start));
        debouncer.resume(start);
        assert_eq!(debouncer.state(), DebounceState::Idle);
        debouncer.resume(start + Duration::seconds(1));
        assert!(debouncer.poll(start + Duration::seconds(6)));
    }

    #[tokio::test]
    async fn burst_of_changes_sends_one_sync() {
        let (broadcaster, hub, clock) = broadcaster();
        for _ in 0..10 {
            broadcaster.notify();
        }
        assert!(!broadcaster.tick().await);
        clock.advance(Duration::seconds(5));
        assert!(broadcaster.tick().await);
        assert!(!broadcaster.tick().await);

        let sent = hub.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![("queue".to_string(), r#"{"action":"sync"}"#.to_string())]);
    }

    #[tokio::test]
    async fn flush_sends_outstanding_change_once() {
        let (broadcaster, hub, _clock) = broadcaster();
        assert!(!broadcaster.flush().await);
        broadcaster.notify();
        assert!(broadcaster.flush().await);
        assert!(!broadcaster.flush().await);
        assert_eq!(hub.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn noop_hub_accepts_broadcasts() {
        NoopRealtimeHub.broadcast("queue", "{}").await;
    }
}
