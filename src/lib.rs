// Library interface for ct-sift
pub mod artifacts;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod ct_log;
pub mod database;
pub mod error;
pub mod progress;
pub mod scanner;
pub mod stats;
