use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:9999";
pub const DEFAULT_API_SECRET: &str = "set-your-secret";
pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const MAX_CONCURRENCY: usize = 50;

/// User settings, persisted in the snapshot under `settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_url: String,
    pub api_secret: String,
    pub test_url: String,
    pub smart_connect: bool,
    /// Comma-separated allow-list for the auto-switch loop.
    pub smart_connect_keywords: String,
    pub test_concurrency: usize,
    pub probe_timeout_ms: u64,
    pub auto_switch_interval_secs: u64,
    pub traffic_interval_secs: u64,
    /// Force the daemon into rule mode whenever the catalog is rebuilt.
    pub rule_mode_on_connect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_secret: DEFAULT_API_SECRET.to_string(),
            test_url: DEFAULT_TEST_URL.to_string(),
            smart_connect: false,
            smart_connect_keywords: String::new(),
            test_concurrency: DEFAULT_CONCURRENCY,
            probe_timeout_ms: 10_000,
            auto_switch_interval_secs: 300,
            traffic_interval_secs: 300,
            rule_mode_on_connect: true,
        }
    }
}

impl Settings {
    /// Both address and secret still hold their shipped defaults.
    pub fn is_unconfigured(&self) -> bool {
        self.api_url == DEFAULT_API_URL && self.api_secret == DEFAULT_API_SECRET
    }

    pub fn concurrency(&self) -> usize {
        clamp_concurrency(self.test_concurrency)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }

    pub fn auto_switch_interval(&self) -> Duration {
        Duration::from_secs(self.auto_switch_interval_secs.max(1))
    }

    pub fn traffic_interval(&self) -> Duration {
        Duration::from_secs(self.traffic_interval_secs.max(1))
    }

    pub fn keywords(&self) -> Vec<String> {
        parse_keywords(&self.smart_connect_keywords)
    }
}

pub fn clamp_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_CONCURRENCY)
}

/// Splits a comma-separated keyword list, dropping blanks, lowercased.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase)
        .collect()
}
