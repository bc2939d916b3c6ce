use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_MAP_FILENAME: &str = "folder_map.txt";
const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";
const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{missing} must be set together with {present}")]
    Incomplete { missing: &'static str, present: &'static str },
}

/// Settings read once per container from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub shared_drive_id: Option<String>,
    pub shared_drive_folder: Option<String>,
    pub map_filename: String,
    pub access_token: Option<String>,
    pub metadata_url: String,
    pub drive_api_url: String,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values count as unset.
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let http_timeout = match var("HTTP_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidNumber { name: "HTTP_TIMEOUT_SECS", value: raw }),
            },
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        // The drive settings come as a pair; neither alone is runnable.
        let shared_drive_id = var("SHARED_DRIVE_ID");
        let shared_drive_folder = var("SHARED_DRIVE_FOLDER");
        match (&shared_drive_id, &shared_drive_folder) {
            (Some(_), None) => {
                return Err(ConfigError::Incomplete { missing: "SHARED_DRIVE_FOLDER", present: "SHARED_DRIVE_ID" })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete { missing: "SHARED_DRIVE_ID", present: "SHARED_DRIVE_FOLDER" })
            }
            _ => {}
        }

        Ok(Self {
            shared_drive_id,
            shared_drive_folder,
            map_filename: var("FOLDER_MAP_FILENAME").unwrap_or_else(|| DEFAULT_MAP_FILENAME.to_string()),
            access_token: var("ACCESS_TOKEN"),
            metadata_url: var("METADATA_URL").unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            drive_api_url: var("DRIVE_API_URL").unwrap_or_else(|| DEFAULT_DRIVE_API_URL.to_string()),
            http_timeout,
        })
    }

    // Shared client for every outbound call; the timeout here is the only one applied
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

// Get worker count from env var or detect CPUs, clamped to 1-6
pub fn get_worker_count() -> usize {
    worker_count_from(env::var("WORKER_COUNT").ok(), num_cpus::get())
}

fn worker_count_from(raw: Option<String>, detected: usize) -> usize {
    raw.and_then(|count| count.trim().parse::<usize>().ok())
        .unwrap_or(detected)
        .clamp(1, 6)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).expect("empty env is valid");

        assert_eq!(config.shared_drive_id, None);
        assert_eq!(config.map_filename, "folder_map.txt");
        assert_eq!(config.metadata_url, "http://metadata.google.internal");
        assert_eq!(config.drive_api_url, "https://www.googleapis.com");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = Config::from_lookup(lookup(&[("SHARED_DRIVE_ID", "  "), ("ACCESS_TOKEN", "")]))
            .expect("blank env is valid");

        assert_eq!(config.shared_drive_id, None);
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let error = Config::from_lookup(lookup(&[("HTTP_TIMEOUT_SECS", "soon")])).unwrap_err();

        assert_eq!(
            error,
            ConfigError::InvalidNumber { name: "HTTP_TIMEOUT_SECS", value: "soon".to_string() }
        );
    }

    #[test]
    fn drive_settings_must_be_set_together() {
        let error = Config::from_lookup(lookup(&[("SHARED_DRIVE_ID", "drive-1")])).unwrap_err();
        assert_eq!(
            error,
            ConfigError::Incomplete { missing: "SHARED_DRIVE_FOLDER", present: "SHARED_DRIVE_ID" }
        );
        assert_eq!(error.to_string(), "SHARED_DRIVE_FOLDER must be set together with SHARED_DRIVE_ID");

        let error = Config::from_lookup(lookup(&[("SHARED_DRIVE_FOLDER", "target")])).unwrap_err();
        assert_eq!(
            error,
            ConfigError::Incomplete { missing: "SHARED_DRIVE_ID", present: "SHARED_DRIVE_FOLDER" }
        );
    }

    #[test]
    fn both_drive_settings_load() {
        let config = Config::from_lookup(lookup(&[("SHARED_DRIVE_ID", "drive-1"), ("SHARED_DRIVE_FOLDER", "target")]))
            .expect("paired drive settings are valid");

        assert_eq!(config.shared_drive_id.as_deref(), Some("drive-1"));
        assert_eq!(config.shared_drive_folder.as_deref(), Some("target"));
    }

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(worker_count_from(Some("64".to_string()), 2), 6);
        assert_eq!(worker_count_from(Some("0".to_string()), 2), 1);
        assert_eq!(worker_count_from(Some("bogus".to_string()), 3), 3);
        assert_eq!(worker_count_from(None, 16), 6);
    }
}
