use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::sleep;

use voiceguard::{
    AlertEvent, AudioFrame, Classifier, ClassifyError, DetectionSink, EncodedClip, Label,
    MonitorBuilder, MonitorStatus, Verdict,
};

/// Classifier stub: fixed verdict after a configurable delay.
struct FakeClassifier {
    delay: Duration,
    fake_prob: f32,
    calls: AtomicUsize,
}

impl FakeClassifier {
    fn new(delay: Duration, fake_prob: f32) -> Self {
        Self {
            delay,
            fake_prob,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, _clip: &EncodedClip, source: &str) -> Result<Verdict, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        Ok(Verdict {
            label: if self.fake_prob > 0.5 {
                Label::Fake
            } else {
                Label::Real
            },
            confidence: self.fake_prob.max(1.0 - self.fake_prob),
            real_prob: 1.0 - self.fake_prob,
            fake_prob: self.fake_prob,
            suspicious: self.fake_prob > 0.65,
            timestamp: Utc::now(),
            source: source.to_string(),
            raw: None,
            latency_ms: Some(self.delay.as_millis() as u64),
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    verdicts: Mutex<Vec<Verdict>>,
}

impl RecordingSink {
    fn len(&self) -> usize {
        self.verdicts.lock().len()
    }
}

impl DetectionSink for RecordingSink {
    fn record_detection(&self, verdict: &Verdict) {
        self.verdicts.lock().push(verdict.clone());
    }
}

fn push_utterance(tx: &crossbeam::channel::Sender<AudioFrame>) {
    // 3s of speech then one quiet frame: a falling-edge dispatch
    for _ in 0..30 {
        tx.send(AudioFrame::new(vec![0.2; 1600])).unwrap();
    }
    tx.send(AudioFrame::new(vec![0.0; 1600])).unwrap();
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn verdicts_reach_history_and_raise_alerts() {
    let classifier = Arc::new(FakeClassifier::new(Duration::from_millis(10), 0.9));
    let sink = Arc::new(RecordingSink::default());

    let manager = MonitorBuilder::new()
        .classifier(classifier.clone())
        .sink(sink.clone())
        .build();
    let mut alerts = manager.subscribe_alerts();

    manager.start().await.unwrap();
    assert_eq!(manager.status().await, MonitorStatus::Running);

    push_utterance(&manager.frame_sender());
    assert!(
        wait_until(Duration::from_secs(2), || sink.len() == 1).await,
        "verdict should be recorded"
    );

    let raised = alerts.recv().await.unwrap();
    assert!(matches!(raised, AlertEvent::Raised { .. }));

    // an identical verdict inside the dedup window is classified but never surfaced
    push_utterance(&manager.frame_sender());
    assert!(
        wait_until(Duration::from_secs(2), || classifier.calls() == 2).await,
        "second segment should reach the classifier"
    );
    sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.len(), 1, "duplicate verdict must be suppressed");

    manager.stop().await.unwrap();
    assert_eq!(manager.status().await, MonitorStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_discards_in_flight_classification() {
    let classifier = Arc::new(FakeClassifier::new(Duration::from_millis(500), 0.9));
    let sink = Arc::new(RecordingSink::default());

    let manager = MonitorBuilder::new()
        .classifier(classifier.clone())
        .sink(sink.clone())
        .build();
    let mut alerts = manager.subscribe_alerts();

    manager.start().await.unwrap();
    push_utterance(&manager.frame_sender());

    assert!(
        wait_until(Duration::from_secs(2), || classifier.calls() == 1).await,
        "classification should be in flight"
    );

    // stop while the classifier is still sleeping
    manager.stop().await.unwrap();
    sleep(Duration::from_millis(700)).await;

    assert_eq!(sink.len(), 0, "no detection may be stored after stop");
    assert!(
        alerts.try_recv().is_err(),
        "no alert may be raised after stop"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn session_lifecycle_is_guarded() {
    let manager = MonitorBuilder::new()
        .classifier(Arc::new(FakeClassifier::new(Duration::from_millis(1), 0.1)))
        .sink(Arc::new(RecordingSink::default()))
        .build();

    assert!(manager.stop().await.is_err(), "stop before start must fail");

    manager.start().await.unwrap();
    assert!(manager.is_monitoring());
    assert!(
        manager.start().await.is_err(),
        "second start while running must fail"
    );

    manager.stop().await.unwrap();
    assert!(!manager.is_monitoring());

    // restarting inside the re-request cooldown is refused
    assert!(manager.start().await.is_err());
}
