// src/ct_log/log_list.rs
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use super::types::{LogInfo, LogListV3};
use crate::database::LogSource;

/// Google's published list of all known logs
pub const DEFAULT_LOG_LIST_URL: &str = "https://www.gstatic.com/ct/log_list/v3/all_logs_list.json";

/// Fetches the public CT log directory
pub struct LogListFetcher {
    http_client: reqwest::Client,
}

impl LogListFetcher {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }

    /// Fetch the v3 log list and return every usable log with a key
    ///
    /// # Arguments
    /// * `list_url` - URL of a v3 `all_logs_list.json`
    /// * `include_readonly` - Also return frozen logs, which still serve entries
    pub async fn fetch_log_sources(
        &self,
        list_url: &str,
        include_readonly: bool,
    ) -> Result<Vec<LogSource>> {
        info!("Fetching CT log list from {}", list_url);

        let response = self
            .http_client
            .get(list_url)
            .send()
            .await
            .context("Failed to fetch CT log list")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch log list: HTTP {}", response.status());
        }

        let log_list: LogListV3 = response
            .json()
            .await
            .context("Failed to parse log list JSON")?;

        let sources = select_sources(&log_list, include_readonly);

        info!(
            "Found {} acceptable CT logs (readonly={})",
            sources.len(),
            include_readonly
        );

        Ok(sources)
    }
}

fn select_sources(log_list: &LogListV3, include_readonly: bool) -> Vec<LogSource> {
    let mut sources = Vec::new();

    for operator in &log_list.operators {
        for log in &operator.logs {
            let acceptable = log
                .state
                .as_ref()
                .is_some_and(|state| state.is_acceptable(include_readonly));

            match to_source(log, &operator.name) {
                Some(source) if acceptable => {
                    debug!("Found log: {} ({})", source.description, source.url);
                    sources.push(source);
                }
                _ => debug!("Skipping log: {} ({})", log.description, log.url),
            }
        }
    }

    sources
}

fn to_source(log: &LogInfo, operator: &str) -> Option<LogSource> {
    let key = log.key.as_ref().filter(|k| !k.is_empty())?;
    // Same form as LogIdentity::url, so checkpoints line up
    let url = log.url.trim_end_matches('/');
    if url.is_empty() {
        return None;
    }

    Some(LogSource {
        description: log.description.clone(),
        key: key.clone(),
        url: url.to_string(),
        mmd: log.mmd.unwrap_or_default(),
        operator: operator.to_string(),
    })
}
