//! Settings read from the environment.

use crate::coordinator::CacheSettings;
use crate::queue::{QueueConfig, TimeoutPolicy};
use crate::renderer::chromium::BrowserOptions;
use crate::telemetry::LogFormat;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";
pub const DEFAULT_BASE_URL: &str = "https://investidor10.com.br";

const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 86_400;
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 3_600;
const DEFAULT_REFRESH_DELAY_MS: u64 = 600_000;
const DEFAULT_CONCURRENCY: usize = 7;
const DEFAULT_JOB_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    /// Required by `serve`. Other commands run without it.
    pub api_token: Option<String>,
    pub redis_url: String,
    pub cache: CacheSettings,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    pub queue: QueueConfig,
    pub navigation_timeout: Duration,
    pub base_url: String,
    pub browser: BrowserOptions,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. Unset or unparsable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(lookup);

        let job_timeout_ms = env.read_u64("JOB_TIMEOUT_MS", DEFAULT_JOB_TIMEOUT_MS);
        let timeout_policy = env
            .read_string("JOB_TIMEOUT_POLICY")
            .and_then(|v| v.parse().ok())
            .unwrap_or(TimeoutPolicy::Error);

        Self {
            port: env.read_u16("PORT", DEFAULT_PORT),
            api_token: env.read_string("API_TOKEN"),
            redis_url: env
                .read_string("REDIS_URL")
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            cache: CacheSettings {
                expiration: Duration::from_secs(
                    env.read_u64("CACHE_EXPIRATION", DEFAULT_CACHE_EXPIRATION_SECS).max(1),
                ),
                refresh_threshold: Duration::from_secs(
                    env.read_u64("REFRESH_THRESHOLD", DEFAULT_REFRESH_THRESHOLD_SECS),
                ),
            },
            auto_refresh: env.read_bool("AUTO_REFRESH_CACHE"),
            refresh_interval: Duration::from_millis(
                env.read_u64("AUTO_REFRESH_DELAY", DEFAULT_REFRESH_DELAY_MS).max(1),
            ),
            queue: QueueConfig {
                concurrency: env.read_usize("PQUEUE_CONCURRENCY", DEFAULT_CONCURRENCY).max(1),
                job_timeout: (job_timeout_ms > 0).then(|| Duration::from_millis(job_timeout_ms)),
                timeout_policy,
            },
            navigation_timeout: Duration::from_millis(
                env.read_u64("NAVIGATION_TIMEOUT_MS", DEFAULT_NAVIGATION_TIMEOUT_MS),
            ),
            base_url: env
                .read_string("SCRAPE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            browser: BrowserOptions {
                ws_endpoint: env.read_string("CHROMIUM_WS_ENDPOINT"),
                executable: env.read_string("CHROMIUM_EXEC_PATH").map(PathBuf::from),
            },
            log_format: env
                .read_string("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Trimmed value. Blank counts as unset.
    fn read_string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn read_u64(&self, name: &str, default_value: u64) -> u64 {
        self.read_string(name)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default_value)
    }

    fn read_usize(&self, name: &str, default_value: usize) -> usize {
        self.read_string(name)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(default_value)
    }

    fn read_u16(&self, name: &str, default_value: u16) -> u16 {
        self.read_string(name)
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(default_value)
    }

    fn read_bool(&self, name: &str) -> bool {
        self.read_string(name).is_some_and(|v| {
            matches!(
                v.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}
