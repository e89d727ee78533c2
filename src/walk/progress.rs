//! Progress reporting and cancellation for validation walks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkEvent {
    /// The walk has started.
    Started {
        total_resources: usize,
    },
    /// A resource's sequence is about to run.
    ResourceStarted {
        address: String,
        index: usize,
        total: usize,
    },
    /// A resource was expanded into instances.
    ResourceExpanded {
        address: String,
        instances: usize,
    },
    /// A resource and all its instances have been validated.
    ResourceCompleted {
        address: String,
        errors: usize,
        warnings: usize,
        duration_ms: u64,
    },
    /// The walk was cancelled before finishing.
    Cancelled,
    /// The walk has finished.
    Completed {
        total_duration_ms: u64,
        resources_walked: usize,
        resources_skipped: usize,
    },
}

/// Callback receiving progress events.
pub type WalkCallback = Box<dyn Fn(WalkEvent) + Send + Sync>;

/// Counts walked resources and relays events to a callback.
///
/// Shared by reference across the walk's worker threads.
pub struct WalkTracker {
    total: usize,
    walked: AtomicU64,
    skipped: AtomicU64,
    cancelled: Arc<AtomicBool>,
    start_time: Option<Instant>,
    callback: Option<WalkCallback>,
}

impl WalkTracker {
    /// Create a tracker for `total` resources.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            walked: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            cancelled: Arc::new(AtomicBool::new(false)),
            start_time: None,
            callback: None,
        }
    }

    /// Relay events to a callback.
    pub fn with_callback(mut self, callback: WalkCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Observe an external cancellation flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Start timing and announce the walk.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.send(WalkEvent::Started {
            total_resources: self.total,
        });
    }

    /// Report that a resource's sequence is starting.
    pub fn resource_started(&self, address: &str) {
        self.send(WalkEvent::ResourceStarted {
            address: address.to_string(),
            index: self.walked.load(Ordering::Relaxed) as usize,
            total: self.total,
        });
    }

    /// Report a finished expansion.
    pub fn resource_expanded(&self, address: &str, instances: usize) {
        self.send(WalkEvent::ResourceExpanded {
            address: address.to_string(),
            instances,
        });
    }

    /// Report that a resource is done.
    pub fn resource_completed(
        &self,
        address: &str,
        errors: usize,
        warnings: usize,
        duration_ms: u64,
    ) {
        self.walked.fetch_add(1, Ordering::Relaxed);
        self.send(WalkEvent::ResourceCompleted {
            address: address.to_string(),
            errors,
            warnings,
            duration_ms,
        });
    }

    /// Record resources that will not be walked.
    pub fn resources_skipped(&self, count: usize) {
        self.skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Mark the walk cancelled and announce it.
    ///
    /// The walk stops before its next batch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.send(WalkEvent::Cancelled);
    }

    /// Number of resources walked so far.
    pub fn walked(&self) -> usize {
        self.walked.load(Ordering::Relaxed) as usize
    }

    /// Number of resources skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed) as usize
    }

    /// Fraction of resources handled, as a percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        ((self.walked() + self.skipped()) as f32 / self.total as f32) * 100.0
    }

    /// Announce the end of the walk.
    pub fn complete(&self) {
        let total_duration_ms = self
            .start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.send(WalkEvent::Completed {
            total_duration_ms,
            resources_walked: self.walked(),
            resources_skipped: self.skipped(),
        });
    }

    fn send(&self, event: WalkEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

impl Default for WalkTracker {
    fn default() -> Self {
        Self::new(0)
    }
}
