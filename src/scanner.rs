// src/scanner.rs
//! Per-log scan pipeline
//!
//! For each log: verify its tree head, download `[start, tree_size)` in
//! order through the classifier, and store the index reached so the next
//! run can pick up from there. Logs are scanned one after another, each
//! with its own progress line.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::classifier::{CertificateClassifier, RecordPolicy, SearchTerm};
use crate::config::{Config, LogConfig};
use crate::ct_log::client::{ClientOptions, CtLogClient};
use crate::ct_log::fetcher::EntryFetcher;
use crate::ct_log::sth::{fetch_head, LogIdentity};
use crate::database::{Datastore, LogSource};
use crate::error::{CtError, ErrorClass};
use crate::progress::{status_channel, ProgressReporter};
use crate::stats::StatsCollector;

/// A log scan that stopped on a fatal error
#[derive(Debug, Error)]
#[error("scan of {log_url} stopped at index {done}: {source}")]
pub struct ScanError {
    pub log_url: String,
    /// First index not processed
    pub done: u64,
    #[source]
    pub source: CtError,
}

impl ScanError {
    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }
}

/// A completed log scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub log_url: String,
    pub start: u64,
    pub done: u64,
    pub tree_size: u64,
}

/// Results of scanning several logs
#[derive(Debug, Default)]
pub struct ScanReport {
    pub completed: Vec<ScanOutcome>,
    pub failed: Vec<ScanError>,
}

impl ScanReport {
    /// The first fatal error encountered, which decides the exit status
    pub fn first_failure(&self) -> Option<&ScanError> {
        self.failed.first()
    }
}

pub struct LogScanner {
    datastore: Arc<dyn Datastore>,
    artifacts: ArtifactStore,
    search: SearchTerm,
    policy: RecordPolicy,
    stats: StatsCollector,
    client_options: ClientOptions,
    batch_size: u64,
    resume: bool,
    show_progress: bool,
}

impl LogScanner {
    pub fn new(
        config: &Config,
        datastore: Arc<dyn Datastore>,
        stats: StatsCollector,
        show_progress: bool,
    ) -> Self {
        Self {
            datastore,
            artifacts: ArtifactStore::new(&config.output.dir),
            search: SearchTerm::new(config.search.term.clone()),
            policy: config.search.record_policy,
            stats,
            client_options: config.fetch.client_options(),
            batch_size: config.fetch.batch_size,
            resume: config.fetch.resume,
            show_progress,
        }
    }

    /// Scan one log from `start`, or from its stored checkpoint when `start`
    /// is `None` and resuming is enabled
    pub async fn scan_log(
        &self,
        log: &LogIdentity,
        start: Option<u64>,
    ) -> Result<ScanOutcome, ScanError> {
        let fail = |done: u64, source: CtError| ScanError {
            log_url: log.url().to_string(),
            done,
            source,
        };

        let start = match start {
            Some(start) => start,
            None if self.resume => self
                .datastore
                .last_seen_index(log.url())
                .await
                .map_err(|e| fail(0, CtError::Storage(e)))?
                .unwrap_or(0),
            None => 0,
        };

        let client = CtLogClient::new(log.url(), self.client_options.clone())
            .map_err(|e| fail(start, e))?;

        let head = fetch_head(&client, log).await.map_err(|e| fail(start, e))?;
        info!(
            "{}: verified tree head of {} entries ({})",
            log.url(),
            head.tree_size,
            head.time
        );

        if start >= head.tree_size {
            info!("{}: nothing new since index {}", log.url(), start);
            return Ok(ScanOutcome {
                log_url: log.url().to_string(),
                start,
                done: start,
                tree_size: head.tree_size,
            });
        }

        info!(
            "{}: scanning entries {}..{}",
            log.url(),
            start,
            head.tree_size
        );

        let mut classifier = CertificateClassifier::new(
            self.datastore.clone(),
            self.artifacts.for_log(log.url()),
            self.search.clone(),
            self.policy,
            self.stats.clone(),
        );

        let (status_tx, status_rx) = status_channel();
        let reporter = ProgressReporter::new(self.show_progress).spawn(status_rx);

        let result = EntryFetcher::new(&client)
            .with_batch_size(self.batch_size)
            .download_range(start, head.tree_size, Some(status_tx), &mut classifier)
            .await;

        // The sender is gone; wait for the line to be cleared before
        // anything else is printed
        if let Err(e) = reporter.await {
            warn!("Progress reporter task failed: {}", e);
        }

        let done = match &result {
            Ok(done) => *done,
            Err(e) => e.done,
        };

        if self.resume {
            if let Err(e) = self.datastore.update_last_seen(log.url(), done).await {
                match result {
                    // Report the scan error rather than the checkpoint failure
                    Err(_) => warn!("{}: failed to store checkpoint {}: {:#}", log.url(), done, e),
                    Ok(_) => return Err(fail(done, CtError::Storage(e))),
                }
            }
        }

        match result {
            Ok(done) => {
                info!("{}: processed up to index {}", log.url(), done);
                Ok(ScanOutcome {
                    log_url: log.url().to_string(),
                    start,
                    done,
                    tree_size: head.tree_size,
                })
            }
            Err(e) => Err(fail(e.done, e.source)),
        }
    }

    /// Scan every log in turn; a fatal error stops only that log
    pub async fn scan_all(&self, logs: &[LogIdentity], start: Option<u64>) -> ScanReport {
        let mut report = ScanReport::default();

        for log in logs {
            match self.scan_log(log, start).await {
                Ok(outcome) => report.completed.push(outcome),
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(e);
                }
            }
        }

        report
    }
}

/// Build verified log identities from configured and synced sources.
///
/// Configured logs come first; a synced log with the same URL is ignored.
/// Keys that are not P-256 SubjectPublicKeyInfo are skipped with a warning.
pub fn collect_identities(configured: &[LogConfig], synced: &[LogSource]) -> Vec<LogIdentity> {
    let mut seen = HashSet::new();
    let mut identities = Vec::new();

    let candidates = configured
        .iter()
        .map(|log| (log.url.as_str(), log.key.as_str()))
        .chain(synced.iter().map(|s| (s.url.as_str(), s.key.as_str())));

    for (url, key) in candidates {
        match LogIdentity::from_base64_key(url, key) {
            Ok(identity) => {
                if seen.insert(identity.url().to_string()) {
                    identities.push(identity);
                }
            }
            Err(e) => warn!("Skipping log {}: {}", url, e),
        }
    }

    identities
}
