use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertDispatcher, AlertEvent};
use crate::constants::get_config;
use crate::core::capture::FfmpegCapture;
use crate::core::device::AudioDevice;
use crate::detection::ResultDeduplicator;
use crate::encode::encode_wav;
use crate::history::DetectionSink;
use crate::inference::Classifier;
use crate::segment::{AudioFrame, RetentionPolicy, Segment, SegmentBuffer, SegmenterSettings};

use super::builder::MonitorOptions;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MonitorStatus {
    Running,
    Stopped,
}

/// Owns one monitoring session end to end: capture task, segmentation loop,
/// and the fire-and-forget classification tasks a dispatch spawns. Frame
/// intake never waits on the network; a segment's round trip runs on its own
/// task and late results are discarded once the session stops.
pub struct MonitorManager {
    device: Option<AudioDevice>,
    sink: Arc<dyn DetectionSink>,
    classifier: Arc<dyn Classifier>,
    retention: RetentionPolicy,

    sample_rate: u32,
    frame_len: usize,
    start_retry_cooldown: Duration,

    status: Arc<Mutex<MonitorStatus>>,
    is_monitoring: Arc<AtomicBool>,
    start_in_progress: Arc<AtomicBool>,
    last_start_attempt: parking_lot::Mutex<Option<Instant>>,
    terminal_error: Arc<parking_lot::Mutex<Option<String>>>,

    frame_sender: crossbeam::channel::Sender<AudioFrame>,
    frame_receiver: crossbeam::channel::Receiver<AudioFrame>,

    dedup: Arc<parking_lot::Mutex<ResultDeduplicator>>,
    alerts: Arc<parking_lot::Mutex<AlertDispatcher>>,

    cancel: parking_lot::Mutex<CancellationToken>,
    capture_handle: Mutex<Option<JoinHandle<()>>>,
    segment_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorManager {
    pub fn new(options: MonitorOptions) -> Self {
        let config = get_config();
        let (frame_sender, frame_receiver) = crossbeam::channel::bounded(1000);

        let dedup = ResultDeduplicator::new(
            Duration::from_millis(config.dedup_window_ms),
            config.dedup_bucket_pct,
        );
        let alerts = AlertDispatcher::new(
            Duration::from_millis(config.alert_cooldown_ms),
            Duration::from_millis(config.alert_auto_dismiss_ms),
        );

        Self {
            device: options.device,
            sink: options.sink,
            classifier: options.classifier,
            retention: options.retention,
            sample_rate: config.sample_rate,
            frame_len: config.frame_len,
            start_retry_cooldown: Duration::from_millis(config.start_retry_cooldown_ms),
            status: Arc::new(Mutex::new(MonitorStatus::Stopped)),
            is_monitoring: Arc::new(AtomicBool::new(false)),
            start_in_progress: Arc::new(AtomicBool::new(false)),
            last_start_attempt: parking_lot::Mutex::new(None),
            terminal_error: Arc::new(parking_lot::Mutex::new(None)),
            frame_sender,
            frame_receiver,
            dedup: Arc::new(parking_lot::Mutex::new(dedup)),
            alerts: Arc::new(parking_lot::Mutex::new(alerts)),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            capture_handle: Mutex::new(None),
            segment_handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if self.status().await == MonitorStatus::Running {
            return Err(anyhow!("monitoring is already running"));
        }
        if self.start_in_progress.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("a session start is already in progress"));
        }

        let result = self.start_inner().await;
        self.start_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn start_inner(&self) -> Result<()> {
        {
            let mut last_attempt = self.last_start_attempt.lock();
            if let Some(at) = *last_attempt {
                if at.elapsed() < self.start_retry_cooldown {
                    return Err(anyhow!("session start requested too soon after the last attempt"));
                }
            }
            *last_attempt = Some(Instant::now());
        }

        self.dedup.lock().reset();
        self.alerts.lock().reset();
        *self.terminal_error.lock() = None;

        // Stale frames from a previous session must not leak into this one
        while self.frame_receiver.try_recv().is_ok() {}

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        self.is_monitoring.store(true, Ordering::SeqCst);

        if let Some(device) = &self.device {
            let capture = match FfmpegCapture::spawn(device, self.sample_rate, self.frame_len) {
                Ok(capture) => capture,
                Err(e) => {
                    self.is_monitoring.store(false, Ordering::SeqCst);
                    return Err(e).context(format!("failed to open capture for {}", device));
                }
            };

            let frame_tx = self.frame_sender.clone();
            let is_monitoring = self.is_monitoring.clone();
            let status = self.status.clone();
            let terminal_error = self.terminal_error.clone();
            let device_label = device.to_string();

            *self.capture_handle.lock().await = Some(tokio::spawn(async move {
                if let Err(e) = capture.run(frame_tx, is_monitoring.clone()).await {
                    error!("capture for {} failed: {}", device_label, e);
                    *terminal_error.lock() = Some(e.to_string());
                    is_monitoring.store(false, Ordering::SeqCst);
                    *status.lock().await = MonitorStatus::Stopped;
                }
            }));
        }

        *self.segment_handle.lock().await = Some(self.spawn_segment_loop(token));

        *self.status.lock().await = MonitorStatus::Running;
        info!(
            "monitoring started ({})",
            self.device
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "external frame source".to_string())
        );
        Ok(())
    }

    fn spawn_segment_loop(&self, token: CancellationToken) -> JoinHandle<()> {
        let frame_rx = self.frame_receiver.clone();
        let is_monitoring = self.is_monitoring.clone();
        let classifier = self.classifier.clone();
        let dedup = self.dedup.clone();
        let alerts = self.alerts.clone();
        let sink = self.sink.clone();
        let source = self
            .device
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| "external".to_string());
        let settings = SegmenterSettings {
            retention: self.retention,
            ..SegmenterSettings::from_config(get_config())
        };
        let sample_rate = self.sample_rate;

        tokio::spawn(async move {
            let mut buffer = SegmentBuffer::new(sample_rate, settings);

            while is_monitoring.load(Ordering::SeqCst) {
                let frame = match frame_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(frame) => frame,
                    Err(crossbeam::channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
                };

                if let Some(segment) = buffer.on_frame(&frame) {
                    tokio::spawn(classify_segment(
                        segment,
                        classifier.clone(),
                        dedup.clone(),
                        alerts.clone(),
                        sink.clone(),
                        is_monitoring.clone(),
                        token.clone(),
                        source.clone(),
                    ));
                }
            }
            debug!("segmentation loop finished");
        })
    }

    pub async fn stop(&self) -> Result<()> {
        if self.status().await == MonitorStatus::Stopped {
            return Err(anyhow!("monitoring is already stopped"));
        }

        self.is_monitoring.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();

        if let Some(handle) = self.capture_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.segment_handle.lock().await.take() {
            // winds down on its own once the flag is off
            let _ = handle.await;
        }

        {
            let mut alerts = self.alerts.lock();
            alerts.dismiss();
            alerts.reset();
        }
        self.dedup.lock().reset();

        *self.status.lock().await = MonitorStatus::Stopped;
        info!("monitoring stopped");
        Ok(())
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.lock().await.clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.is_monitoring.load(Ordering::SeqCst)
    }

    /// Terminal capture failure from the current/last session, if any.
    pub fn terminal_error(&self) -> Option<String> {
        self.terminal_error.lock().clone()
    }

    /// Handle for hosts that produce their own frames (no capture device).
    pub fn frame_sender(&self) -> crossbeam::channel::Sender<AudioFrame> {
        self.frame_sender.clone()
    }

    pub fn subscribe_alerts(&self) -> tokio::sync::broadcast::Receiver<AlertEvent> {
        self.alerts.lock().subscribe()
    }

    pub fn dismiss_alert(&self) {
        self.alerts.lock().dismiss();
    }
}

#[allow(clippy::too_many_arguments)]
async fn classify_segment(
    segment: Segment,
    classifier: Arc<dyn Classifier>,
    dedup: Arc<parking_lot::Mutex<ResultDeduplicator>>,
    alerts: Arc<parking_lot::Mutex<AlertDispatcher>>,
    sink: Arc<dyn DetectionSink>,
    is_monitoring: Arc<AtomicBool>,
    cancel: CancellationToken,
    source: String,
) {
    let clip = match encode_wav(&segment.samples, segment.sample_rate) {
        Ok(clip) => clip,
        Err(e) => {
            warn!("failed to encode {:.1}s segment: {}", segment.duration_secs, e);
            return;
        }
    };

    let verdict = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("classification cancelled by session stop");
            return;
        }
        result = classifier.classify(&clip, &source) => match result {
            Ok(verdict) => verdict,
            Err(e) => {
                debug!("dropping segment classification: {}", e);
                return;
            }
        }
    };

    if !is_monitoring.load(Ordering::SeqCst) {
        debug!("discarding verdict that arrived after stop");
        return;
    }

    if !dedup.lock().should_emit(&verdict) {
        debug!("suppressing duplicate verdict ({})", verdict.label);
        return;
    }

    info!(
        "{}: {} ({:.0}% confidence{})",
        source,
        verdict.label,
        verdict.confidence * 100.0,
        verdict
            .latency_ms
            .map(|ms| format!(", {}ms", ms))
            .unwrap_or_default()
    );
    sink.record_detection(&verdict);
    alerts.lock().maybe_alert(&verdict);
}
