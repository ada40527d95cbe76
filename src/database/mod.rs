// src/database/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classifier::ParsedCertificate;

pub mod memory;
pub mod postgres;

pub use memory::MemoryDatastore;
pub use postgres::PostgresBackend;

/// A CT log as listed in the public log directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    pub description: String,
    /// Base64 SubjectPublicKeyInfo DER
    pub key: String,
    pub url: String,
    /// Maximum merge delay, in seconds
    pub mmd: u64,
    pub operator: String,
}

/// Persistence for certificates, matches and per-log scan state
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Store the raw DER of a successfully parsed certificate
    async fn record_certificate(&self, der: &[u8]) -> Result<i64>;

    /// Store the parsed fields of a matched certificate, referencing the
    /// row created by `record_certificate`
    async fn record_match(&self, cert: &ParsedCertificate, certificate_id: i64) -> Result<i64>;

    /// Insert or update a log source, keyed on its URL
    async fn upsert_log_source(&self, source: &LogSource) -> Result<i64>;

    async fn log_sources(&self) -> Result<Vec<LogSource>>;

    /// First index not yet processed for a log, if it was ever scanned
    async fn last_seen_index(&self, log_url: &str) -> Result<Option<u64>>;

    async fn update_last_seen(&self, log_url: &str, index: u64) -> Result<()>;

    /// Health check
    async fn ping(&self) -> Result<()>;
}
