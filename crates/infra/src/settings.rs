//! Process settings from environment variables.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_RETRY_QUEUE: &str = "reorderApi";
pub const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub http_port: u16,
    /// Unset → in-memory cache and queue.
    pub redis_url: Option<String>,
    /// Unset → in-memory credential store.
    pub database_url: Option<String>,
    pub retry_queue_name: String,
    pub retry_delay: Duration,
    pub retry_honor_schedule: bool,
    pub youtube_api_base: String,
    pub http_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            redis_url: None,
            database_url: None,
            retry_queue_name: DEFAULT_RETRY_QUEUE.to_string(),
            retry_delay: Duration::from_secs(86_400),
            retry_honor_schedule: true,
            youtube_api_base: DEFAULT_YOUTUBE_API_BASE.to_string(),
            http_timeout: Duration::from_secs(30),
            queue_capacity: 1024,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let retry_queue_name = get("RETRY_QUEUE_NAME").unwrap_or(defaults.retry_queue_name);
        let queue_capacity = parse_or("QUEUE_CAPACITY", get("QUEUE_CAPACITY"), defaults.queue_capacity)?;
        if queue_capacity == 0 {
            return Err(invalid("QUEUE_CAPACITY", "0", "must be positive"));
        }
        let timeout_secs: u64 = parse_or("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 30)?;
        if timeout_secs == 0 {
            return Err(invalid("HTTP_TIMEOUT_SECS", "0", "must be positive"));
        }

        Ok(Self {
            http_port: parse_or("HTTP_PORT", get("HTTP_PORT"), defaults.http_port)?,
            redis_url: get("REDIS_URL"),
            database_url: get("DATABASE_URL"),
            retry_queue_name,
            retry_delay: Duration::from_secs(parse_or("RETRY_DELAY_SECS", get("RETRY_DELAY_SECS"), 86_400)?),
            retry_honor_schedule: parse_bool("RETRY_HONOR_SCHEDULE", get("RETRY_HONOR_SCHEDULE"), true)?,
            youtube_api_base: get("YOUTUBE_API_BASE").unwrap_or(defaults.youtube_api_base),
            http_timeout: Duration::from_secs(timeout_secs),
            queue_capacity,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| invalid(name, &v, e.to_string())),
    }
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, SettingsError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(invalid(name, other, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(from(&[]).unwrap(), Settings::default());
    }

    #[test]
    fn reads_overrides() {
        let s = from(&[
            ("HTTP_PORT", "9000"),
            ("REDIS_URL", "redis://cache:6379"),
            ("RETRY_QUEUE_NAME", "retries"),
            ("RETRY_DELAY_SECS", "60"),
            ("RETRY_HONOR_SCHEDULE", "off"),
            ("QUEUE_CAPACITY", "8"),
        ])
        .unwrap();

        assert_eq!(s.http_port, 9000);
        assert_eq!(s.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(s.database_url, None);
        assert_eq!(s.retry_queue_name, "retries");
        assert_eq!(s.retry_delay, Duration::from_secs(60));
        assert!(!s.retry_honor_schedule);
        assert_eq!(s.queue_capacity, 8);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = from(&[("REDIS_URL", "  "), ("RETRY_QUEUE_NAME", "")]).unwrap();
        assert_eq!(s.redis_url, None);
        assert_eq!(s.retry_queue_name, DEFAULT_RETRY_QUEUE);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(from(&[("HTTP_PORT", "eighty")]), Err(SettingsError::Invalid { name: "HTTP_PORT", .. })));
        assert!(from(&[("RETRY_HONOR_SCHEDULE", "maybe")]).is_err());
        assert!(from(&[("QUEUE_CAPACITY", "0")]).is_err());
        assert!(from(&[("HTTP_TIMEOUT_SECS", "0")]).is_err());
    }
}
