// src/ct_log/mod.rs
pub mod client;
pub mod fetcher;
pub mod leaf;
pub mod log_list;
pub mod sth;
pub mod types;

pub use client::{ClientOptions, CtLogClient};
pub use fetcher::{EntryFetcher, EntrySink, EntrySource, MAX_BATCH_SIZE};
pub use leaf::{parse_entry, EntryType, LeafEntry, LeafPayload};
pub use log_list::LogListFetcher;
pub use sth::{fetch_head, verify_head, LogIdentity, SignedTreeHead};
pub use types::{LogInfo, LogListV3, RawEntry, SthResponse};
