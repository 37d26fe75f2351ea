use tracing::{debug, warn};

use crate::constants::Config;

/// One fixed-size block of normalized samples from the capture pipe.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Quiet,
    Active,
}

/// Which rule released a segment. Carried on the segment for logging and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReason {
    FallingEdge,
    MaxDuration,
    SilenceTimeout,
    Fallback,
}

/// What stays in the buffer after a dispatch. Trailing overlap keeps a short
/// tail of audio so the next segment has acoustic context at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    TrailingOverlap,
    Clear,
}

/// A contiguous window of audio released for classification. Snapshot of the
/// buffer at dispatch time, never aliased by later segments.
#[derive(Debug, Clone)]
pub struct Segment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f32,
    pub active: bool,
    pub reason: DispatchReason,
}

#[derive(Debug, Clone)]
pub struct SegmenterSettings {
    pub activity_threshold: f32,
    pub silence_floor: f32,
    pub min_utterance_secs: f32,
    pub max_utterance_secs: f32,
    pub silence_timeout_secs: f32,
    pub dispatch_floor_secs: f32,
    pub fallback_interval_secs: f32,
    pub max_buffer_secs: f32,
    pub overlap_secs: f32,
    pub retention: RetentionPolicy,
}

impl SegmenterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            activity_threshold: config.activity_threshold,
            silence_floor: config.silence_floor,
            min_utterance_secs: config.min_utterance_secs,
            max_utterance_secs: config.max_utterance_secs,
            silence_timeout_secs: config.silence_timeout_secs,
            dispatch_floor_secs: config.dispatch_floor_secs,
            fallback_interval_secs: config.fallback_interval_secs,
            max_buffer_secs: config.max_buffer_secs,
            overlap_secs: config.overlap_secs,
            retention: RetentionPolicy::default(),
        }
    }
}

/// Accumulates frames and decides, frame by frame, when the buffered audio is
/// worth classifying.
///
/// Activity is a per-frame RMS test against `activity_threshold`. The dispatch
/// rules run in priority order, at most one dispatch per frame:
/// 1. falling edge (Active to Quiet) with enough buffered audio: end of an
///    utterance, release immediately;
/// 2. sustained activity reaching `max_utterance_secs`, which bounds latency
///    for continuous speech;
/// 3. quiet for longer than `silence_timeout_secs` since the last falling
///    edge with at least `dispatch_floor_secs` buffered, flushing low-volume
///    speech that never produced a rule-1 dispatch;
/// 4. nothing dispatched for `fallback_interval_secs` with the floor met,
///    giving periodic coverage under sensor noise.
///
/// Time is logical audio time derived from frame lengths, so behavior is
/// deterministic under synthetic input.
pub struct SegmentBuffer {
    settings: SegmenterSettings,
    sample_rate: u32,
    samples: Vec<f32>,
    state: Activity,
    clock_secs: f64,
    last_dispatch_secs: f64,
    quiet_since_secs: Option<f64>,
}

impl SegmentBuffer {
    pub fn new(sample_rate: u32, settings: SegmenterSettings) -> Self {
        Self {
            settings,
            sample_rate,
            samples: Vec::new(),
            state: Activity::Quiet,
            clock_secs: 0.0,
            last_dispatch_secs: 0.0,
            quiet_since_secs: None,
        }
    }

    pub fn buffered_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Feed one frame. Synchronous and non-blocking; returns a segment when
    /// one of the dispatch rules fires and the buffered audio clears the
    /// silence floor.
    pub fn on_frame(&mut self, frame: &AudioFrame) -> Option<Segment> {
        let frame_secs = frame.len() as f64 / self.sample_rate as f64;
        self.clock_secs += frame_secs;
        self.samples.extend_from_slice(frame.samples());

        let was_active = self.state == Activity::Active;
        let is_active = frame.rms() > self.settings.activity_threshold;
        self.state = if is_active {
            Activity::Active
        } else {
            Activity::Quiet
        };

        let falling_edge = was_active && !is_active;
        if falling_edge {
            self.quiet_since_secs = Some(self.clock_secs);
        } else if is_active {
            self.quiet_since_secs = None;
        }

        let buffered = self.buffered_secs();
        let reason = if falling_edge && buffered >= self.settings.min_utterance_secs as f64 {
            Some(DispatchReason::FallingEdge)
        } else if is_active && buffered >= self.settings.max_utterance_secs as f64 {
            Some(DispatchReason::MaxDuration)
        } else if !is_active
            && self
                .quiet_since_secs
                .is_some_and(|t| self.clock_secs - t > self.settings.silence_timeout_secs as f64)
            && buffered >= self.settings.dispatch_floor_secs as f64
        {
            Some(DispatchReason::SilenceTimeout)
        } else if self.clock_secs - self.last_dispatch_secs
            >= self.settings.fallback_interval_secs as f64
            && buffered >= self.settings.dispatch_floor_secs as f64
        {
            Some(DispatchReason::Fallback)
        } else {
            None
        };

        if let Some(reason) = reason {
            return self.dispatch(reason, is_active || falling_edge);
        }

        if buffered > self.settings.max_buffer_secs as f64 {
            warn!(
                "segment buffer exceeded {:.1}s without a dispatch, dropping {:.1}s of audio",
                self.settings.max_buffer_secs, buffered
            );
            self.samples.clear();
        }

        None
    }

    fn dispatch(&mut self, reason: DispatchReason, active: bool) -> Option<Segment> {
        let duration_secs = self.buffered_secs() as f32;
        self.last_dispatch_secs = self.clock_secs;
        if reason == DispatchReason::SilenceTimeout {
            // restart the quiet timer, otherwise the rule re-fires every frame
            self.quiet_since_secs = Some(self.clock_secs);
        }

        let samples = std::mem::take(&mut self.samples);

        match self.settings.retention {
            RetentionPolicy::Clear => {}
            RetentionPolicy::TrailingOverlap => {
                let keep = ((self.settings.overlap_secs as f64 * self.sample_rate as f64) as usize)
                    .min(samples.len());
                self.samples = samples[samples.len() - keep..].to_vec();
            }
        }

        if rms(&samples) < self.settings.silence_floor {
            debug!(
                "skipping segment below silence floor ({:.1}s, {:?})",
                duration_secs, reason
            );
            return None;
        }

        debug!(
            "dispatching {:.1}s segment ({:?}, peak {:.4})",
            duration_secs,
            reason,
            peak(&samples)
        );

        Some(Segment {
            samples,
            sample_rate: self.sample_rate,
            duration_secs,
            active,
            reason,
        })
    }
}
