pub mod alert;
pub mod constants;
pub mod core;
pub mod detection;
pub mod encode;
pub mod history;
pub mod inference;
pub mod monitor;
pub mod segment;

pub use alert::{AlertDispatcher, AlertEvent};
pub use crate::core::{default_input_device, list_audio_devices, parse_audio_device, AudioDevice};
pub use detection::{DetectionKey, Label, ResultDeduplicator, Verdict};
pub use encode::{encode_wav, EncodedClip};
pub use history::{DetectionSink, InMemoryHistory};
pub use inference::{Classifier, ClassifyError, InferenceClient, InferenceSettings};
pub use monitor::{MonitorBuilder, MonitorManager, MonitorStatus};
pub use segment::{AudioFrame, RetentionPolicy, Segment, SegmentBuffer, SegmenterSettings};
