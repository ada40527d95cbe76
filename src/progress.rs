// src/progress.rs
//! Progress reporting for range downloads
//!
//! The fetch loop publishes [`OperationStatus`] snapshots into a single-slot
//! `watch` channel: publishing overwrites whatever the reporter has not read
//! yet and never waits. A background [`ProgressReporter`] task renders the
//! latest snapshot on one terminal line through indicatif and exits once the
//! sending half is dropped.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Animation frames cycled while waiting
const FRAMES: &[&str] = &["|", "/", "-", "\\", " "];

/// How often the animation advances without a new snapshot
pub const FRAME_INTERVAL: Duration = Duration::from_millis(200);

/// Progress through the index range `[start, length)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationStatus {
    /// First index requested
    pub start: u64,
    /// Next index to be processed
    pub current: u64,
    /// Exclusive end of the range
    pub length: u64,
}

impl OperationStatus {
    /// `current` is clamped into `[start, length]`
    pub fn new(start: u64, current: u64, length: u64) -> Self {
        let length = length.max(start);
        Self {
            start,
            current: current.clamp(start, length),
            length,
        }
    }

    pub fn percentage(&self) -> f32 {
        let total = self.length.saturating_sub(self.start);
        if total == 0 {
            return 100.0;
        }
        let done = self.current.saturating_sub(self.start);
        done as f32 * 100.0 / total as f32
    }
}

/// Text shown next to the spinner
pub fn render_message(status: &OperationStatus) -> String {
    format!(
        "{:.1}% ({} of {})",
        status.percentage(),
        status.current,
        status.length
    )
}

/// Producer half of the status conduit. Dropping it closes the stream.
#[derive(Debug)]
pub struct StatusSender {
    tx: watch::Sender<Option<OperationStatus>>,
}

impl StatusSender {
    /// Replace the pending snapshot; never blocks, even with no reader
    pub fn publish(&self, status: OperationStatus) {
        self.tx.send_replace(Some(status));
    }
}

/// Consumer half of the status conduit
#[derive(Debug)]
pub struct StatusReceiver {
    rx: watch::Receiver<Option<OperationStatus>>,
}

impl StatusReceiver {
    /// Wait for a snapshot newer than the last one returned.
    /// `None` once the sender is gone and the last snapshot has been seen.
    pub async fn next(&mut self) -> Option<OperationStatus> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(status) = *self.rx.borrow_and_update() {
                return Some(status);
            }
        }
    }

    /// Latest snapshot without waiting
    pub fn latest(&self) -> Option<OperationStatus> {
        *self.rx.borrow()
    }
}

/// Create a connected single-slot status conduit
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = watch::channel(None);
    (StatusSender { tx }, StatusReceiver { rx })
}

/// Renders status snapshots on a single terminal line
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter; a disabled one consumes snapshots without drawing
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(FRAMES),
        );

        Self { bar }
    }

    pub fn is_enabled(&self) -> bool {
        !self.bar.is_hidden()
    }

    /// Consume snapshots until the stream closes, then clear the line
    pub async fn run(self, mut statuses: StatusReceiver) {
        // Nothing to draw until the first snapshot arrives
        let Some(mut status) = statuses.next().await else {
            self.bar.finish_and_clear();
            return;
        };
        self.bar.set_message(render_message(&status));

        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                next = statuses.next() => match next {
                    Some(latest) => status = latest,
                    None => break,
                },
                _ = ticker.tick() => self.bar.tick(),
            }

            self.bar.set_message(render_message(&status));
        }

        self.bar.finish_and_clear();
    }

    /// Run on a background task
    pub fn spawn(self, statuses: StatusReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(statuses))
    }
}
