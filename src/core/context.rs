//! Per-execution state shared across all operations of one run.
//!
//! An [`ExecutionContext`] is created for a single full-graph execution and
//! discarded afterwards. It carries the viewer crop, the cooperative
//! cancellation flag and the worker configuration; operations see it as
//! read-mostly shared state.

use crate::core::geometry::Rect;
use crate::execution::progress::{RenderCallback, RenderEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle for requesting cancellation of a running execution.
///
/// Cloneable and thread-safe; typically handed to UI or signal handlers
/// while the render runs on worker threads.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cooperative cancellation.
    ///
    /// Already-dispatched tiles finish; no new tiles start.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Global per-run state for one graph execution.
pub struct ExecutionContext {
    region: Option<Rect>,
    cancel: Arc<AtomicBool>,
    threads: usize,
    progress: Option<RenderCallback>,
}

impl ExecutionContext {
    /// Create a context rendering the terminal operation's full extent.
    pub fn new() -> Self {
        Self {
            region: None,
            cancel: Arc::new(AtomicBool::new(false)),
            threads: 0,
            progress: None,
        }
    }

    /// Restrict rendering to a viewer crop of the output extent.
    pub fn with_region(mut self, region: Rect) -> Self {
        self.region = Some(region);
        self
    }

    /// Set the worker pool size (0 = use all available cores).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set a progress callback, invoked from worker threads.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(RenderEvent) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Get a handle that can cancel this execution from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// The requested viewer crop, if any.
    pub fn region(&self) -> Option<Rect> {
        self.region
    }

    /// Configured worker count (0 = default).
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// The progress callback, if configured.
    pub fn progress(&self) -> Option<&RenderCallback> {
        self.progress.as_ref()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
