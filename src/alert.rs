use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::detection::Verdict;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Raised { verdict: Verdict },
    Dismissed,
}

/// Decides whether a suspicious verdict becomes a user-visible alert.
///
/// At most one alert is live at a time; a live alert expires on its own after
/// `auto_dismiss` or when the collaborator dismisses it. A new qualifying
/// alert (suspicious, cooldown elapsed) replaces a still-live one, clearing
/// it first. Subscribers get the raise/dismiss sequence over a broadcast
/// channel.
pub struct AlertDispatcher {
    cooldown: Duration,
    auto_dismiss: Duration,
    last_alert: Option<Instant>,
    active_since: Option<Instant>,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration, auto_dismiss: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            cooldown,
            auto_dismiss,
            last_alert: None,
            active_since: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub fn maybe_alert(&mut self, verdict: &Verdict) -> bool {
        self.maybe_alert_at(verdict, Instant::now())
    }

    pub fn maybe_alert_at(&mut self, verdict: &Verdict, now: Instant) -> bool {
        self.expire_at(now);

        if !verdict.suspicious {
            return false;
        }
        if let Some(last) = self.last_alert {
            if now.duration_since(last) < self.cooldown {
                return false;
            }
        }

        if self.active_since.is_some() {
            let _ = self.events.send(AlertEvent::Dismissed);
        }

        self.active_since = Some(now);
        self.last_alert = Some(now);
        warn!(
            "suspicious audio on {}: {} ({:.0}% AI-generated)",
            verdict.source,
            verdict.label,
            verdict.fake_prob * 100.0
        );
        let _ = self.events.send(AlertEvent::Raised {
            verdict: verdict.clone(),
        });
        true
    }

    pub fn dismiss(&mut self) {
        if self.active_since.take().is_some() {
            let _ = self.events.send(AlertEvent::Dismissed);
        }
    }

    pub fn is_active(&mut self) -> bool {
        self.expire_at(Instant::now());
        self.active_since.is_some()
    }

    /// Session teardown: forget alert state without emitting events.
    pub fn reset(&mut self) {
        self.active_since = None;
        self.last_alert = None;
    }

    fn expire_at(&mut self, now: Instant) {
        if let Some(since) = self.active_since {
            if now.duration_since(since) >= self.auto_dismiss {
                self.active_since = None;
                let _ = self.events.send(AlertEvent::Dismissed);
            }
        }
    }
}
