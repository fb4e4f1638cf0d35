//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use trackeame_carriers::AcquisitionConfig;
use trackeame_core::scheduler::DEFAULT_SYNC_CRON;
use trackeame_core::{QueueConfig, WorkerConfig};

/// Runtime configuration for trackeame-server.
///
/// Every field has a default so a local run needs no environment at all.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://trackeame.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Also write daily-rolling log files here.
    pub log_dir: Option<PathBuf>,

    /// Maximum in-flight jobs.
    pub workers: usize,
    pub fetch_timeout: Duration,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub sync_cron: String,
    pub retain_completed_jobs: bool,

    /// Directory of `<slug>.toml` keyword rule overrides.
    pub rules_dir: Option<PathBuf>,
    /// Base URL of the browserless-compatible rendering service.
    pub renderer_url: Option<String>,
    pub renderer_capacity: usize,

    /// Without a key, notifications only go to the log.
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    pub frontend_url: String,

    /// Comma-separated CORS allow-list; unset allows any origin.
    pub cors_allowed_origins: Option<String>,
    pub enable_swagger: bool,

    /// Bearer token guarding `/admin`; unset leaves it open.
    pub admin_token: Option<String>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("TRACKEAME_BIND", "0.0.0.0:8000"),
            database_url: env_or("TRACKEAME_DATABASE_URL", "sqlite://trackeame.db?mode=rwc"),
            log_level: env_or("TRACKEAME_LOG", "info"),
            log_json: env_flag("TRACKEAME_LOG_JSON", false),
            log_dir: env_opt("TRACKEAME_LOG_DIR").map(PathBuf::from),
            workers: parse_env("TRACKEAME_WORKERS", 4),
            fetch_timeout: Duration::from_secs(parse_env("TRACKEAME_FETCH_TIMEOUT_SECS", 60)),
            max_attempts: parse_env("TRACKEAME_MAX_ATTEMPTS", 3),
            poll_interval: Duration::from_millis(parse_env("TRACKEAME_POLL_INTERVAL_MS", 1000)),
            sync_cron: env_or("TRACKEAME_SYNC_CRON", DEFAULT_SYNC_CRON),
            retain_completed_jobs: env_flag("TRACKEAME_RETAIN_COMPLETED_JOBS", false),
            rules_dir: env_opt("TRACKEAME_RULES_DIR").map(PathBuf::from),
            renderer_url: env_opt("TRACKEAME_RENDERER_URL"),
            renderer_capacity: parse_env("TRACKEAME_RENDERER_CAPACITY", 2),
            resend_api_key: env_opt("TRACKEAME_RESEND_API_KEY"),
            mail_from: env_or("TRACKEAME_MAIL_FROM", "no-reply@trackeame.app"),
            frontend_url: env_or("TRACKEAME_FRONTEND_URL", "http://localhost:5173"),
            cors_allowed_origins: env_opt("TRACKEAME_CORS_ORIGINS"),
            enable_swagger: env_flag("TRACKEAME_ENABLE_SWAGGER", true),
            admin_token: env_opt("TRACKEAME_ADMIN_TOKEN"),
        }
    }

    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            renderer_url: self.renderer_url.clone(),
            renderer_capacity: self.renderer_capacity,
            fetch_timeout: self.fetch_timeout,
            ..AcquisitionConfig::default()
        }
    }

    pub fn queue(&self) -> QueueConfig {
        QueueConfig {
            max_attempts: self.max_attempts.max(1),
            retain_completed: self.retain_completed_jobs,
        }
    }

    /// Jobs are bounded by the fetch timeout, so anything running for several
    /// times that long was abandoned.
    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.workers,
            poll_interval: self.poll_interval,
            stale_after: (self.fetch_timeout * 5).max(Duration::from_secs(300)),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
