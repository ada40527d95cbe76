// src/ct_log/fetcher.rs
//! Sequential, bounded pagination over a log's entries
//!
//! Batches are requested strictly in index order, one at a time. Each raw
//! entry is decoded and handed to an [`EntrySink`] before the next one is
//! touched, so a sink can rely on seeing indices in increasing order.

use async_trait::async_trait;
use tracing::debug;

use super::leaf::{self, LeafEntry};
use super::types::RawEntry;
use crate::error::{CtError, RangeError};
use crate::progress::{OperationStatus, StatusSender};

/// Largest batch requested from a log in one get-entries call
pub const MAX_BATCH_SIZE: u64 = 2000;

/// Anything that can serve get-entries for an inclusive index range
#[async_trait]
pub trait EntrySource: Send + Sync {
    async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<RawEntry>, CtError>;
}

/// Receives decoded entries in index order
#[async_trait]
pub trait EntrySink: Send {
    /// An error returned here aborts the whole range
    async fn accept(&mut self, index: u64, entry: LeafEntry) -> Result<(), CtError>;
}

/// Drives batch retrieval from an [`EntrySource`]
pub struct EntryFetcher<'a, S: ?Sized> {
    source: &'a S,
    batch_size: u64,
}

impl<'a, S: EntrySource + ?Sized> EntryFetcher<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Use smaller batches; values are clamped to `1..=MAX_BATCH_SIZE`
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Process every index in `[start, up_to)`.
    ///
    /// Returns `up_to` on success. On a fatal error the returned
    /// [`RangeError`] carries the first index that was not fully processed.
    /// The progress sender is consumed and dropped on return, which closes
    /// the status stream either way.
    pub async fn download_range(
        &self,
        start: u64,
        up_to: u64,
        progress: Option<StatusSender>,
        sink: &mut dyn EntrySink,
    ) -> Result<u64, RangeError> {
        let mut done = start;

        while done < up_to {
            if let Some(progress) = &progress {
                progress.publish(OperationStatus::new(start, done, up_to));
            }

            let end = done.saturating_add(self.batch_size - 1).min(up_to - 1);
            let requested = end - done + 1;

            let entries = self
                .source
                .get_entries(done, end)
                .await
                .map_err(|e| RangeError::new(done, e))?;

            // A short batch is fine, the next request resumes where it
            // stopped; an empty or oversized one is not
            let returned = entries.len() as u64;
            if returned == 0 || returned > requested {
                return Err(RangeError::new(
                    done,
                    CtError::BatchSize {
                        start: done,
                        requested,
                        returned,
                    },
                ));
            }

            debug!("Processing {} entries starting at {}", returned, done);

            for raw in entries {
                let entry = leaf::parse_entry(&raw.leaf_input, &raw.extra_data).map_err(|source| {
                    RangeError::new(done, CtError::Decode { index: done, source })
                })?;

                sink.accept(done, entry)
                    .await
                    .map_err(|e| RangeError::new(done, e))?;

                done += 1;
            }
        }

        if let Some(progress) = &progress {
            progress.publish(OperationStatus::new(start, done, up_to));
        }

        Ok(done)
    }
}
