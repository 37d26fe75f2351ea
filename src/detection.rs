use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Real,
    Fake,
    Unknown,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Real => write!(f, "REAL"),
            Label::Fake => write!(f, "FAKE"),
            Label::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Structured classification result for one segment.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub label: Label,
    pub confidence: f32,
    pub real_prob: f32,
    pub fake_prob: f32,
    pub suspicious: bool,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub raw: Option<String>,
    pub latency_ms: Option<u64>,
}

/// Equality key for duplicate suppression: label plus confidence rounded to a
/// coarse percentage bucket, so near-identical verdicts collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetectionKey {
    pub label: Label,
    pub confidence_pct: u8,
}

impl DetectionKey {
    pub fn new(verdict: &Verdict, bucket_pct: u8) -> Self {
        let step = bucket_pct.max(1) as f32;
        let pct = (verdict.confidence.clamp(0.0, 1.0) * 100.0 / step).round() * step;
        Self {
            label: verdict.label,
            confidence_pct: pct as u8,
        }
    }
}

/// Sliding-window suppression of repeated verdicts. Out-of-order arrival is
/// fine; the window is wall-clock time of emission, not dispatch order.
pub struct ResultDeduplicator {
    window: Duration,
    bucket_pct: u8,
    recent: VecDeque<(DetectionKey, Instant)>,
}

impl ResultDeduplicator {
    pub fn new(window: Duration, bucket_pct: u8) -> Self {
        Self {
            window,
            bucket_pct,
            recent: VecDeque::new(),
        }
    }

    pub fn should_emit(&mut self, verdict: &Verdict) -> bool {
        self.should_emit_at(verdict, Instant::now())
    }

    pub fn should_emit_at(&mut self, verdict: &Verdict, now: Instant) -> bool {
        while let Some((_, emitted)) = self.recent.front() {
            if now.duration_since(*emitted) > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        let key = DetectionKey::new(verdict, self.bucket_pct);
        if self.recent.iter().any(|(k, _)| *k == key) {
            return false;
        }

        self.recent.push_back((key, now));
        true
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn verdict(label: Label, confidence: f32) -> Verdict {
        Verdict {
            label,
            confidence,
            real_prob: 1.0 - confidence,
            fake_prob: confidence,
            suspicious: label == Label::Fake,
            timestamp: Utc::now(),
            source: "test".to_string(),
            raw: None,
            latency_ms: None,
        }
    }

    #[test]
    fn test_key_buckets_to_nearest_step() {
        let key = DetectionKey::new(&verdict(Label::Fake, 0.82), 5);
        assert_eq!(key.confidence_pct, 80);
        let key = DetectionKey::new(&verdict(Label::Fake, 0.83), 5);
        assert_eq!(key.confidence_pct, 85);
    }

    #[test]
    fn test_duplicate_suppressed_inside_window() {
        let mut dedup = ResultDeduplicator::new(Duration::from_secs(2), 5);
        let start = Instant::now();
        assert!(dedup.should_emit_at(&verdict(Label::Fake, 0.8), start));
        assert!(!dedup.should_emit_at(&verdict(Label::Fake, 0.81), start + Duration::from_millis(500)));
    }

    #[test]
    fn test_duplicate_allowed_after_window() {
        let mut dedup = ResultDeduplicator::new(Duration::from_secs(2), 5);
        let start = Instant::now();
        assert!(dedup.should_emit_at(&verdict(Label::Fake, 0.8), start));
        assert!(dedup.should_emit_at(&verdict(Label::Fake, 0.8), start + Duration::from_secs(3)));
    }

    #[test]
    fn test_different_labels_not_duplicates() {
        let mut dedup = ResultDeduplicator::new(Duration::from_secs(2), 5);
        let start = Instant::now();
        assert!(dedup.should_emit_at(&verdict(Label::Fake, 0.8), start));
        assert!(dedup.should_emit_at(&verdict(Label::Real, 0.8), start));
    }
}
