use chrono::Duration;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::EngineError;

const DEFAULT_BACK_BUFFER_MIN: i64 = 5;
const DEFAULT_LOOKAHEAD_MIN: i64 = 60;
const DEFAULT_MAX_CONCURRENT_SENDS: usize = 4;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

/// Engine configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// IANA zone used to project "now" into the user's calendar day.
    pub timezone: Tz,
    /// Trailing buffer absorbing scheduler dispatch jitter.
    pub back_buffer_minutes: i64,
    /// Forward lookahead for upcoming-soon reminders.
    pub lookahead_minutes: i64,
    /// Upper bound on concurrent push sends within one run.
    pub max_concurrent_sends: usize,
    /// Per-send HTTP timeout; a timed-out send classifies as transport_error.
    pub send_timeout_secs: u64,
    pub db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            back_buffer_minutes: DEFAULT_BACK_BUFFER_MIN,
            lookahead_minutes: DEFAULT_LOOKAHEAD_MIN,
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            db_path: PathBuf::from("goalpulse.db"),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let timezone = match env_var_non_empty("GOALPULSE_TZ") {
            Some(raw) => Tz::from_str(&raw).map_err(|_| EngineError::InvalidTimezone(raw))?,
            None => defaults.timezone,
        };

        Ok(Self {
            timezone,
            back_buffer_minutes: env_parsed("GOALPULSE_BACK_BUFFER_MIN")
                .unwrap_or(defaults.back_buffer_minutes),
            lookahead_minutes: env_parsed("GOALPULSE_LOOKAHEAD_MIN")
                .unwrap_or(defaults.lookahead_minutes),
            max_concurrent_sends: env_parsed("GOALPULSE_MAX_CONCURRENT_SENDS")
                .unwrap_or(defaults.max_concurrent_sends),
            send_timeout_secs: env_parsed("GOALPULSE_SEND_TIMEOUT_SECS")
                .unwrap_or(defaults.send_timeout_secs),
            db_path: env_var_non_empty("GOALPULSE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
        })
    }

    pub fn back_buffer(&self) -> Duration {
        Duration::minutes(self.back_buffer_minutes)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::minutes(self.lookahead_minutes)
    }

    pub fn send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.send_timeout_secs)
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env_var_non_empty(key).and_then(|value| value.parse().ok())
}
