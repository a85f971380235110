//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring extraction
//! progress, [`CancellationToken`] for cooperative cancellation of both
//! extraction and serving, and [`ProgressInfo`] for progress snapshots.
//!
//! The total frame count of a raw stream is not known until the decoder
//! finishes, so reports carry throughput rather than a percentage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framescrub::{ExtractionConfig, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} frames ({:.1} fps)", info.current, info.frames_per_second);
//!     }
//! }
//!
//! let config = ExtractionConfig::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_batch_size(100);
//! ```

use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::sync::Notify;

/// A snapshot of extraction progress.
///
/// Delivered to [`ProgressCallback::on_progress`] every
/// [`batch_size`](crate::ExtractionConfig::with_batch_size) frames and once
/// more when extraction finishes.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// How many frames have been stored so far.
    pub current: u64,
    /// Raw bytes consumed from the decoder so far.
    pub bytes_read: u64,
    /// Wall-clock time elapsed since the extraction started.
    pub elapsed: Duration,
    /// Average decode throughput since the start.
    pub frames_per_second: f64,
    /// `true` for the final report of a successful run.
    pub finished: bool,
}

/// Trait for receiving progress updates during extraction.
///
/// Progress callbacks are **infallible**: they observe but cannot halt
/// the operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during extraction.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads and tasks; call
/// [`cancel`](CancellationToken::cancel) from anywhere to request
/// cancellation. The extraction loop checks
/// [`is_cancelled`](CancellationToken::is_cancelled) before each frame.
/// Connection loops additionally await [`cancelled`](CancellationToken::cancelled)
/// alongside their next read.
///
/// # Example
///
/// ```
/// use framescrub::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Wait until cancellation is requested.
    ///
    /// Resolves immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            let mut notified = pin!(self.state.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Tracks extraction timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    current: u64,
    bytes_read: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, batch_size: u64) -> Self {
        Self {
            callback,
            current: 0,
            bytes_read: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one stored frame and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, frame_bytes: usize) {
        self.current += 1;
        self.bytes_read += frame_bytes as u64;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(false);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(true);
    }

    fn report(&self, finished: bool) {
        let elapsed = self.start_time.elapsed();
        let seconds = elapsed.as_secs_f64();
        let frames_per_second = if seconds > 0.0 {
            self.current as f64 / seconds
        } else {
            0.0
        };

        self.callback.on_progress(&ProgressInfo {
            current: self.current,
            bytes_read: self.bytes_read,
            elapsed,
            frames_per_second,
            finished,
        });
    }
}
