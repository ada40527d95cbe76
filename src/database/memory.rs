// src/database/memory.rs
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::{Datastore, LogSource};
use crate::classifier::ParsedCertificate;

/// Matches kept for display by [`MemoryDatastore::new`]
pub const DEFAULT_MATCH_CAPACITY: usize = 1000;

#[derive(Debug, Default)]
struct Tables {
    certificate_count: u64,
    match_count: u64,
    /// Most recent matches, oldest first
    recent_matches: VecDeque<(i64, ParsedCertificate)>,
    sources: Vec<LogSource>,
    last_seen: HashMap<String, u64>,
}

/// In-process datastore, used when no database is configured.
///
/// Certificate bodies are counted, not stored, and only the most recent
/// matches are kept, so memory stays flat however long a log is.
#[derive(Debug)]
pub struct MemoryDatastore {
    tables: Mutex<Tables>,
    match_capacity: usize,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::with_match_capacity(DEFAULT_MATCH_CAPACITY)
    }

    pub fn with_match_capacity(match_capacity: usize) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            match_capacity,
        }
    }

    pub async fn certificate_count(&self) -> u64 {
        self.tables.lock().await.certificate_count
    }

    /// Every match recorded, including those no longer retained
    pub async fn match_count(&self) -> u64 {
        self.tables.lock().await.match_count
    }

    /// Retained matches with the id of their recorded certificate, oldest first
    pub async fn matches(&self) -> Vec<(i64, ParsedCertificate)> {
        self.tables
            .lock()
            .await
            .recent_matches
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn record_certificate(&self, _der: &[u8]) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        tables.certificate_count += 1;
        Ok(tables.certificate_count as i64)
    }

    async fn record_match(&self, cert: &ParsedCertificate, certificate_id: i64) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        tables.match_count += 1;
        if self.match_capacity > 0 {
            if tables.recent_matches.len() == self.match_capacity {
                tables.recent_matches.pop_front();
            }
            tables.recent_matches.push_back((certificate_id, cert.clone()));
        }
        Ok(tables.match_count as i64)
    }

    async fn upsert_log_source(&self, source: &LogSource) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        if let Some(pos) = tables.sources.iter().position(|s| s.url == source.url) {
            tables.sources[pos] = source.clone();
            return Ok(pos as i64 + 1);
        }
        tables.sources.push(source.clone());
        Ok(tables.sources.len() as i64)
    }

    async fn log_sources(&self) -> Result<Vec<LogSource>> {
        Ok(self.tables.lock().await.sources.clone())
    }

    async fn last_seen_index(&self, log_url: &str) -> Result<Option<u64>> {
        Ok(self.tables.lock().await.last_seen.get(log_url).copied())
    }

    async fn update_last_seen(&self, log_url: &str, index: u64) -> Result<()> {
        self.tables
            .lock()
            .await
            .last_seen
            .insert(log_url.to_string(), index);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
