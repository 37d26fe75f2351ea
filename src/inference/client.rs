use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

use crate::constants::Config;
use crate::detection::Verdict;
use crate::encode::EncodedClip;
use crate::inference::parse::parse_result;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("network error: {0}")]
    Network(String),
    #[error("classification timed out")]
    Timeout,
    #[error("no result after {0} poll attempts")]
    Exhausted(u32),
    #[error("unparseable response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ClassifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClassifyError::Timeout
        } else {
            ClassifyError::Network(err.to_string())
        }
    }
}

/// Anything that can turn an encoded clip into a verdict. The production
/// implementation talks to the remote service; tests substitute their own.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, clip: &EncodedClip, source: &str) -> Result<Verdict, ClassifyError>;
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub api_url: String,
    pub suspicion_threshold: f32,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub classify_timeout: Duration,
}

impl InferenceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_url: config.api_url.clone(),
            suspicion_threshold: config.suspicion_threshold,
            poll_attempts: config.poll_attempts,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            classify_timeout: Duration::from_millis(config.classify_timeout_ms),
        }
    }
}

/// Client for the remote detector's three-phase job protocol: upload the clip,
/// submit a prediction referencing it, then poll the event stream for the
/// completed result.
pub struct InferenceClient {
    http: reqwest::Client,
    gradio_api: String,
    settings: InferenceSettings,
}

impl InferenceClient {
    pub fn new(settings: InferenceSettings) -> Self {
        let gradio_api = format!("{}/gradio_api", settings.api_url.trim_end_matches('/'));
        Self {
            http: reqwest::Client::new(),
            gradio_api,
            settings,
        }
    }

    async fn upload(&self, clip: &EncodedClip) -> Result<String, ClassifyError> {
        let part = Part::bytes(clip.bytes.clone())
            .file_name("clip.wav")
            .mime_str("audio/wav")
            .map_err(|e| ClassifyError::Parse(e.to_string()))?;
        let form = Form::new().part("files", part);

        let response = self
            .http
            .post(format!("{}/upload", self.gradio_api))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let paths: Vec<String> = response.json().await?;
        paths
            .into_iter()
            .next()
            .ok_or_else(|| ClassifyError::Parse("upload returned no file reference".to_string()))
    }

    async fn predict(&self, file_ref: &str) -> Result<String, ClassifyError> {
        let body = json!({
            "data": [{
                "path": file_ref,
                "meta": {"_type": "gradio.FileData"}
            }]
        });

        let response = self
            .http
            .post(format!("{}/call/predict", self.gradio_api))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let value: Value = response.json().await?;
        value
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClassifyError::Parse("predict response missing event_id".to_string()))
    }

    /// One pass over the event stream. Returns the terminal payload if the
    /// stream produced one before ending.
    async fn poll_once(&self, event_id: &str) -> Result<Option<String>, ClassifyError> {
        let response = self
            .http
            .get(format!("{}/call/predict/{}", self.gradio_api, event_id))
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                let line = line.trim();
                trace!("poll event line: {}", line);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(value) = serde_json::from_str::<Value>(data) else {
                    continue;
                };
                if let Some(payload) = extract_payload(&value) {
                    return match payload.as_str() {
                        Some(text) => Ok(Some(text.to_string())),
                        None => Err(ClassifyError::Parse(format!(
                            "terminal event carried a non-text payload: {}",
                            payload
                        ))),
                    };
                }
            }
        }

        Ok(None)
    }

    async fn poll(&self, event_id: &str) -> Result<String, ClassifyError> {
        for attempt in 0..self.settings.poll_attempts {
            match self.poll_once(event_id).await {
                Ok(Some(raw)) => return Ok(raw),
                Ok(None) => debug!("poll attempt {} saw no terminal event", attempt + 1),
                Err(ClassifyError::Parse(e)) => return Err(ClassifyError::Parse(e)),
                Err(e) => debug!("poll attempt {} failed: {}", attempt + 1, e),
            }
            sleep(self.settings.poll_interval).await;
        }
        Err(ClassifyError::Exhausted(self.settings.poll_attempts))
    }

    async fn fetch_raw(&self, clip: &EncodedClip) -> Result<String, ClassifyError> {
        let file_ref = self.upload(clip).await?;
        debug!("uploaded clip as {}", file_ref);
        let event_id = self.predict(&file_ref).await?;
        debug!("prediction queued, event {}", event_id);
        self.poll(&event_id).await
    }
}

#[async_trait]
impl Classifier for InferenceClient {
    async fn classify(&self, clip: &EncodedClip, source: &str) -> Result<Verdict, ClassifyError> {
        let started = Instant::now();

        // Dropping the round trip at the deadline also cancels any in-flight
        // upload or poll request.
        let raw = timeout(self.settings.classify_timeout, self.fetch_raw(clip))
            .await
            .map_err(|_| ClassifyError::Timeout)??;

        let mut verdict = parse_result(&raw, self.settings.suspicion_threshold);
        verdict.source = source.to_string();
        verdict.latency_ms = Some(started.elapsed().as_millis() as u64);
        Ok(verdict)
    }
}

/// Terminal payloads arrive in a handful of envelope shapes; returns the
/// embedded result value if this event is terminal.
fn extract_payload(value: &Value) -> Option<&Value> {
    if let Some(first) = value.as_array().and_then(|a| a.first()) {
        return Some(first);
    }
    if let Some(obj) = value.as_object() {
        if obj.get("msg").and_then(Value::as_str) == Some("process_completed") {
            return obj
                .get("output")
                .and_then(|o| o.get("data"))
                .and_then(Value::as_array)
                .and_then(|a| a.first());
        }
        if let Some(first) = obj.get("data").and_then(Value::as_array).and_then(|a| a.first()) {
            return Some(first);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_payload_top_level_array() {
        let value = json!(["🟢 Real Voice: 90.0%"]);
        assert_eq!(
            extract_payload(&value).and_then(Value::as_str),
            Some("🟢 Real Voice: 90.0%")
        );
    }

    #[test]
    fn test_extract_payload_process_completed() {
        let value = json!({
            "msg": "process_completed",
            "output": {"data": ["result text"]}
        });
        assert_eq!(
            extract_payload(&value).and_then(Value::as_str),
            Some("result text")
        );
    }

    #[test]
    fn test_extract_payload_bare_data_envelope() {
        let value = json!({"data": ["inline result"]});
        assert_eq!(
            extract_payload(&value).and_then(Value::as_str),
            Some("inline result")
        );
    }

    #[test]
    fn test_extract_payload_ignores_progress_events() {
        assert!(extract_payload(&json!({"msg": "process_starts"})).is_none());
        assert!(extract_payload(&json!({"msg": "estimation", "rank": 0})).is_none());
        assert!(extract_payload(&json!([])).is_none());
    }
}
