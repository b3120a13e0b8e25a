use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Default GDELT 2.0 "last update" pointer.
pub const DEFAULT_POINTER_URL: &str = "http://data.gdeltproject.org/gdeltv2/lastupdate.txt";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub feed: FeedConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `EVENTLAKE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("EVENTLAKE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            feed: FeedConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            schedule: ScheduleConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Make sure every configured location is a writable directory (or the
    /// parent of a writable file), creating missing directories on the way.
    pub fn validate(&self) -> Result<(), IngestError> {
        ensure_writable_dir(&self.storage.landing_dir)?;
        ensure_writable_dir(&self.storage.output_dir)?;
        for file in [&self.storage.ledger_path, &self.storage.pass_log_path] {
            if file.is_dir() {
                return Err(IngestError::Config(format!(
                    "{} is a directory, expected a file path",
                    file.display()
                )));
            }
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                ensure_writable_dir(parent)?;
            }
        }
        if let Some(columns) = &self.storage.columns_file {
            if !columns.is_file() {
                return Err(IngestError::Config(format!(
                    "columns file {} does not exist",
                    columns.display()
                )));
            }
        }
        if self.schedule.cron.is_none() && self.schedule.interval_secs == 0 {
            return Err(IngestError::Config("INGEST_INTERVAL_SECS must be > 0".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  feed:     pointer={}, timeout={}s", self.feed.pointer_url, self.feed.timeout_secs);
        tracing::info!("  landing:  {}", self.storage.landing_dir.display());
        tracing::info!("  output:   {}", self.storage.dataset_path().display());
        tracing::info!("  ledger:   {}", self.storage.ledger_path.display());
        tracing::info!("  passes:   {}", self.storage.pass_log_path.display());
        match &self.schedule.cron {
            Some(expr) => tracing::info!("  schedule: cron '{}'", expr),
            None => tracing::info!("  schedule: every {}s", self.schedule.interval_secs),
        }
    }
}

fn ensure_writable_dir(dir: &Path) -> Result<(), IngestError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        IngestError::Config(format!("cannot create directory {}: {}", dir.display(), e))
    })?;
    let meta = std::fs::metadata(dir)?;
    if !meta.is_dir() {
        return Err(IngestError::Config(format!("{} is not a directory", dir.display())));
    }
    if meta.permissions().readonly() {
        return Err(IngestError::Config(format!("{} is not writable", dir.display())));
    }
    Ok(())
}

// ── Feed ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub pointer_url: String,
    pub timeout_secs: u64,
}

impl FeedConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            pointer_url: profiled_env_or(p, "FEED_POINTER_URL", DEFAULT_POINTER_URL),
            timeout_secs: profiled_env_u64(p, "FEED_TIMEOUT_SECS", 60),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub landing_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub pass_log_path: PathBuf,
    /// Optional column-names file overriding the built-in schema names.
    pub columns_file: Option<PathBuf>,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            landing_dir: PathBuf::from(profiled_env_or(p, "LANDING_DIR", "data/landing")),
            output_dir: PathBuf::from(profiled_env_or(p, "OUTPUT_DIR", "data/output")),
            ledger_path: PathBuf::from(profiled_env_or(p, "LEDGER_PATH", "logs/execution_log.txt")),
            pass_log_path: PathBuf::from(profiled_env_or(p, "PASS_LOG_PATH", "logs/passes.jsonl")),
            columns_file: profiled_env_opt(p, "COLUMNS_FILE").map(PathBuf::from),
        }
    }

    /// All paths rooted under one directory. Handy for tests and local runs.
    pub fn rooted(root: &Path) -> Self {
        Self {
            landing_dir: root.join("data").join("landing"),
            output_dir: root.join("data").join("output"),
            ledger_path: root.join("logs").join("execution_log.txt"),
            pass_log_path: root.join("logs").join("passes.jsonl"),
            columns_file: None,
        }
    }

    /// Location of the persisted dataset artifact.
    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join("output.parquet")
    }
}

// ── Schedule ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    /// Cron expression; takes precedence over `interval_secs` when set.
    pub cron: Option<String>,
}

impl ScheduleConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            interval_secs: profiled_env_u64(p, "INGEST_INTERVAL_SECS", 900),
            cron: profiled_env_opt(p, "INGEST_CRON"),
        }
    }
}
