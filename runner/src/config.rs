//! Configuration loaded from environment variables

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use contract::capture::CaptureFilter;

pub const DEFAULT_GOLDEN_BASE: &str = "http://localhost:8000";
pub const DEFAULT_CANDIDATE_BASE: &str = "http://localhost:8001";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Reference implementation, trailing `/` trimmed
    pub golden_base: String,
    /// Implementation under test, trailing `/` trimmed
    pub candidate_base: String,
    /// Names from `CASE_FILTER`
    pub case_filter: Vec<String>,
    pub db_cases: bool,
    pub db_seed: bool,
    pub golden_db_url: Option<String>,
    pub candidate_db_url: Option<String>,
    pub admin_username: String,
    pub admin_password: String,
    /// `None` disables the per-request timeout
    pub http_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub capture_dir: Option<PathBuf>,
    pub capture_filter: CaptureFilter,
}

impl Config {
    /// Load configuration from the process environment (after `.env` discovery)
    pub fn from_env() -> Result<Self> {
        crate::paths::load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| lookup(key).map(|v| parse_bool(&v)).unwrap_or(false);
        let seconds = |key: &str| -> Result<Option<u64>> {
            match non_empty(key) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .with_context(|| format!("Invalid {}: {:?}", key, v)),
                None => Ok(None),
            }
        };

        let golden_base = non_empty("GOLDEN_BASE")
            .unwrap_or_else(|| DEFAULT_GOLDEN_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let candidate_base = non_empty("CANDIDATE_BASE")
            .unwrap_or_else(|| DEFAULT_CANDIDATE_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let case_filter = lookup("CASE_FILTER")
            .map(|v| split_case_filter(&v))
            .unwrap_or_default();

        let http_timeout = match seconds("HTTP_TIMEOUT_SECS")?.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let run_timeout = seconds("RUN_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            golden_base,
            candidate_base,
            case_filter,
            db_cases: flag("ENABLE_DB_CASES"),
            db_seed: flag("ENABLE_DB_SEED"),
            golden_db_url: non_empty("GOLDEN_DB_URL"),
            candidate_db_url: non_empty("CANDIDATE_DB_URL"),
            admin_username: non_empty("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            admin_password: non_empty("ADMIN_PASSWORD").unwrap_or_else(|| "admin123".to_string()),
            http_timeout,
            run_timeout,
            capture_dir: non_empty("CAPTURE_DIR").map(PathBuf::from),
            capture_filter: lookup("CAPTURE_FILTER")
                .map(|v| CaptureFilter::parse(&v))
                .unwrap_or_default(),
        })
    }

    /// Seeding runs only when both `ENABLE_DB_SEED` and `ENABLE_DB_CASES` are set.
    pub fn seeding_enabled(&self) -> bool {
        self.db_seed && self.db_cases
    }
}

pub fn parse_bool(raw: &str) -> bool {
    let v = raw.trim().to_ascii_lowercase();
    v == "1" || v == "true" || v == "yes"
}

/// Split on commas and whitespace, dropping empty entries.
pub fn split_case_filter(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
