use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

// Pipeline tuning constants. The capture variants this grew out of never
// converged on one set of thresholds, so everything is env-overridable.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

pub fn get_config() -> &'static Config {
    &CONFIG
}

#[derive(Debug, Clone)]
pub struct Config {
    // Audio settings
    pub sample_rate: u32,
    pub frame_len: usize,

    // Segmentation settings
    pub activity_threshold: f32,
    pub silence_floor: f32,
    pub min_utterance_secs: f32,
    pub max_utterance_secs: f32,
    pub silence_timeout_secs: f32,
    pub dispatch_floor_secs: f32,
    pub fallback_interval_secs: f32,
    pub max_buffer_secs: f32,
    pub overlap_secs: f32,

    // Inference settings
    pub api_url: String,
    pub suspicion_threshold: f32,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub classify_timeout_ms: u64,

    // Dedup settings
    pub dedup_window_ms: u64,
    pub dedup_bucket_pct: u8,

    // Alert settings
    pub alert_cooldown_ms: u64,
    pub alert_auto_dismiss_ms: u64,

    // Session settings
    pub history_cap: usize,
    pub start_retry_cooldown_ms: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sample_rate: env_or("VOICEGUARD_SAMPLE_RATE", 16000),
            frame_len: env_or("VOICEGUARD_FRAME_LEN", 1600),

            activity_threshold: env_or("VOICEGUARD_ACTIVITY_THRESHOLD", 0.01),
            silence_floor: env_or("VOICEGUARD_SILENCE_FLOOR", 0.0005),
            min_utterance_secs: env_or("VOICEGUARD_MIN_UTTERANCE_SECS", 2.5),
            max_utterance_secs: env_or("VOICEGUARD_MAX_UTTERANCE_SECS", 5.0),
            silence_timeout_secs: env_or("VOICEGUARD_SILENCE_TIMEOUT_SECS", 3.5),
            dispatch_floor_secs: env_or("VOICEGUARD_DISPATCH_FLOOR_SECS", 1.0),
            fallback_interval_secs: env_or("VOICEGUARD_FALLBACK_INTERVAL_SECS", 15.0),
            max_buffer_secs: env_or("VOICEGUARD_MAX_BUFFER_SECS", 12.0),
            overlap_secs: env_or("VOICEGUARD_OVERLAP_SECS", 0.5),

            api_url: env::var("VOICEGUARD_API_URL").unwrap_or_else(|_| {
                "https://pauliano22-deepfake-audio-detector.hf.space".to_string()
            }),
            suspicion_threshold: env_or("VOICEGUARD_SUSPICION_THRESHOLD", 0.65),
            poll_attempts: env_or("VOICEGUARD_POLL_ATTEMPTS", 15),
            poll_interval_ms: env_or("VOICEGUARD_POLL_INTERVAL_MS", 300),
            classify_timeout_ms: env_or("VOICEGUARD_CLASSIFY_TIMEOUT_MS", 12000),

            dedup_window_ms: env_or("VOICEGUARD_DEDUP_WINDOW_MS", 2000),
            dedup_bucket_pct: env_or("VOICEGUARD_DEDUP_BUCKET_PCT", 5),

            alert_cooldown_ms: env_or("VOICEGUARD_ALERT_COOLDOWN_MS", 3000),
            alert_auto_dismiss_ms: env_or("VOICEGUARD_ALERT_AUTO_DISMISS_MS", 10000),

            history_cap: env_or("VOICEGUARD_HISTORY_CAP", 100),
            start_retry_cooldown_ms: env_or("VOICEGUARD_START_RETRY_COOLDOWN_MS", 1000),
        }
    }
}
