use std::sync::Arc;

use crate::constants::get_config;
use crate::core::device::AudioDevice;
use crate::history::{DetectionSink, InMemoryHistory};
use crate::inference::{Classifier, InferenceClient, InferenceSettings};
use crate::segment::RetentionPolicy;

use super::manager::MonitorManager;

pub struct MonitorOptions {
    /// Capture device. `None` means the host feeds frames itself through
    /// [`MonitorManager::frame_sender`].
    pub device: Option<AudioDevice>,
    pub retention: RetentionPolicy,
    pub sink: Arc<dyn DetectionSink>,
    pub classifier: Arc<dyn Classifier>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        let config = get_config();
        Self {
            device: None,
            retention: RetentionPolicy::default(),
            sink: Arc::new(InMemoryHistory::new(config.history_cap)),
            classifier: Arc::new(InferenceClient::new(InferenceSettings::from_config(config))),
        }
    }
}

pub struct MonitorBuilder {
    options: MonitorOptions,
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self {
            options: MonitorOptions::default(),
        }
    }

    pub fn device(mut self, device: AudioDevice) -> Self {
        self.options.device = Some(device);
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.options.retention = retention;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DetectionSink>) -> Self {
        self.options.sink = sink;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.options.classifier = classifier;
        self
    }

    pub fn build(self) -> MonitorManager {
        MonitorManager::new(self.options)
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
