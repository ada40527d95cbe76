// src/config.rs

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::RecordPolicy;
use crate::ct_log::client::{ClientOptions, DEFAULT_ENTRIES_BODY_LIMIT, DEFAULT_STH_BODY_LIMIT};
use crate::ct_log::fetcher::MAX_BATCH_SIZE;
use crate::ct_log::log_list::DEFAULT_LOG_LIST_URL;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Where unparsable certificates are archived
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("pems")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_search_term")]
    pub term: String,
    #[serde(default)]
    pub record_policy: RecordPolicy,
}

fn default_search_term() -> String {
    ".com".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            term: default_search_term(),
            record_policy: RecordPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FetchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sth_body_limit")]
    pub sth_body_limit: usize,
    #[serde(default = "default_entries_body_limit")]
    pub entries_body_limit: usize,
    /// Start each log at its stored last-seen index
    #[serde(default = "default_resume")]
    pub resume: bool,
}

fn default_batch_size() -> u64 { MAX_BATCH_SIZE }
fn default_timeout_secs() -> u64 { 30 }
fn default_sth_body_limit() -> usize { DEFAULT_STH_BODY_LIMIT }
fn default_entries_body_limit() -> usize { DEFAULT_ENTRIES_BODY_LIMIT }
fn default_resume() -> bool { true }

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            sth_body_limit: default_sth_body_limit(),
            entries_body_limit: default_entries_body_limit(),
            resume: default_resume(),
        }
    }
}

impl FetchConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            sth_body_limit: self.sth_body_limit,
            entries_body_limit: self.entries_body_limit,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgresql://localhost/ctsift".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogListConfig {
    #[serde(default = "default_log_list_url")]
    pub url: String,
    #[serde(default)]
    pub include_readonly: bool,
    /// Scan logs stored by `sync-logs` in addition to `[[logs]]`
    #[serde(default)]
    pub use_synced_logs: bool,
}

fn default_log_list_url() -> String {
    DEFAULT_LOG_LIST_URL.to_string()
}

impl Default for LogListConfig {
    fn default() -> Self {
        Self {
            url: default_log_list_url(),
            include_readonly: false,
            use_synced_logs: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One log to scan: root URL plus base64 SubjectPublicKeyInfo
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log_list: LogListConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub logs: Vec<LogConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(cfg)
    }

    /// Reject settings the scanner cannot honour
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fetch.batch_size == 0 || self.fetch.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!(
                "fetch.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                self.fetch.batch_size
            );
        }

        if self.search.term.is_empty() {
            anyhow::bail!("search.term must not be empty");
        }

        if self.fetch.sth_body_limit == 0 || self.fetch.entries_body_limit == 0 {
            anyhow::bail!("fetch body limits must be non-zero");
        }

        if self.logs.is_empty() && !self.log_list.use_synced_logs {
            anyhow::bail!("no logs configured: add [[logs]] entries or enable log_list.use_synced_logs");
        }

        for log in &self.logs {
            url::Url::parse(&log.url).with_context(|| format!("Invalid log URL {:?}", log.url))?;
        }

        Ok(())
    }
}
