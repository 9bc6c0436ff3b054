//! Run settings, loadable from an optional TOML file with CLI
//! overrides applied on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::matcher::SearchRetry;
use crate::retry::RetryPolicy;

/// Settings for one scraper run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Billboard URL to enumerate.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Where the consolidated catalog JSON lives.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Minutes of cinema/IMDb duration disagreement still accepted as
    /// the same film. Above this, ratings are withheld.
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_minutes: u32,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub search: SearchSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            catalog_path: default_catalog_path(),
            duration_tolerance_minutes: default_duration_tolerance(),
            browser: BrowserSettings::default(),
            retry: RetrySettings::default(),
            search: SearchSettings::default(),
        }
    }
}

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Explicit browser binary; discovered from well-known paths and
    /// `PATH` when unset.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Remote DevTools URL ("ws://localhost:9222"). When set, attaches
    /// to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Fixed element-presence wait, in seconds.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            binary_path: None,
            remote_url: None,
            headless: default_headless(),
            wait_timeout_secs: default_wait_timeout(),
        }
    }
}

/// Per-listing retry and session-restart parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_restart_threshold")]
    pub restart_threshold: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
            restart_threshold: default_restart_threshold(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
            restart_threshold: self.restart_threshold,
        }
    }
}

/// External-search retry parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_search_delay_ms")]
    pub delay_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_search_delay_ms(),
        }
    }
}

impl SearchSettings {
    pub fn retry(&self) -> SearchRetry {
        SearchRetry {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

fn default_base_url() -> String {
    "https://www.todoshowcase.com/".to_string()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("docs/data.json")
}

fn default_duration_tolerance() -> u32 {
    10
}

fn default_headless() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_restart_threshold() -> u32 {
    3
}

fn default_search_delay_ms() -> u64 {
    500
}

impl Settings {
    /// Load settings from a TOML file, or defaults when no file exists.
    /// An explicitly-passed path must parse; the implicit default path
    /// may be absent.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
            }
            None => {
                let default_path = Path::new("cartelera.toml");
                if default_path.exists() {
                    Self::load(Some(default_path))
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.duration_tolerance_minutes, 10);
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.retry.restart_threshold, 3);
        assert!(s.browser.headless);
        assert_eq!(s.catalog_path, PathBuf::from("docs/data.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let s: Settings = toml::from_str(
            r#"
            duration_tolerance_minutes = 2

            [browser]
            headless = false
            "#,
        )
        .unwrap();
        assert_eq!(s.duration_tolerance_minutes, 2);
        assert!(!s.browser.headless);
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.base_url, "https://www.todoshowcase.com/");
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/cartelera.toml"))).is_err());
    }
}
