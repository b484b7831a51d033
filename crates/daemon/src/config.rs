use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Process configuration, read once from the environment at startup and
/// passed into collaborators at construction. No component reads env vars
/// on its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,

    pub interpreter_url: String,
    pub renderer_url: String,
    pub composer_url: String,
    pub interpreter_timeout: Duration,

    pub max_concurrent_pipelines: usize,
    pub clip_workers: usize,
    pub render_poll_interval: Duration,
    pub render_deadline: Duration,
    pub retry: RetryPolicy,

    pub style_confidence_floor: f64,
    pub edit_confidence_floor: f64,
    pub planner_fallback_enabled: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            port: env_or("DAEMON_PORT", 7777),
            db_path: PathBuf::from(env_or_string("DAEMON_DB_PATH", ".cache/pipeline.db")),
            interpreter_url: env_or_string("INTERPRETER_SERVICE_URL", "http://127.0.0.1:8001"),
            renderer_url: env_or_string("RENDERER_SERVICE_URL", "http://127.0.0.1:8002"),
            composer_url: env_or_string("COMPOSER_SERVICE_URL", "http://127.0.0.1:8003"),
            interpreter_timeout: Duration::from_secs(env_or("INTERPRETER_TIMEOUT_SECS", 20)),
            max_concurrent_pipelines: env_or("MAX_CONCURRENT_PIPELINES", 5),
            clip_workers: env_or("CLIP_WORKERS", 3),
            render_poll_interval: Duration::from_millis(env_or("RENDER_POLL_INTERVAL_MS", 2000)),
            render_deadline: Duration::from_secs(env_or("RENDER_DEADLINE_SECS", 600)),
            retry: RetryPolicy::new(
                env_or("RENDER_MAX_ATTEMPTS", 3),
                Duration::from_millis(env_or("RETRY_BASE_DELAY_MS", 200)),
                Duration::from_secs(env_or("RETRY_MAX_DELAY_SECS", 5)),
            ),
            style_confidence_floor: env_or("STYLE_CONFIDENCE_FLOOR", 0.35),
            edit_confidence_floor: env_or("EDIT_CONFIDENCE_FLOOR", 0.65),
            planner_fallback_enabled: env_or("PLANNER_FALLBACK", false),
        }
    }
}

#[cfg(test)]
impl Config {
    /// Defaults with tight timings so tests never sleep for real backoff.
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            db_path: PathBuf::from(":memory:"),
            interpreter_url: String::new(),
            renderer_url: String::new(),
            composer_url: String::new(),
            interpreter_timeout: Duration::from_secs(1),
            max_concurrent_pipelines: 5,
            clip_workers: 3,
            render_poll_interval: Duration::from_millis(1),
            render_deadline: Duration::from_secs(5),
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            style_confidence_floor: 0.35,
            edit_confidence_floor: 0.65,
            planner_fallback_enabled: false,
        }
    }
}
