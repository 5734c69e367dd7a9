//! Tile-level progress reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// A progress event emitted by the tile scheduler.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// Tile dispatch is about to begin.
    Started {
        total_tiles: usize,
    },
    /// One more tile has been assembled.
    TileFinished {
        finished: usize,
        total: usize,
    },
    /// The full region has been rendered.
    Completed {
        total_duration_ms: u64,
    },
    /// Execution stopped cooperatively; partial output was discarded.
    Cancelled,
}

/// Callback type for progress events.
///
/// Invoked from worker threads, so it must be thread-safe.
pub type RenderCallback = Box<dyn Fn(RenderEvent) + Send + Sync>;

/// Tracks tile completion for one execution.
pub struct RenderProgress<'a> {
    total_tiles: usize,
    finished: AtomicUsize,
    start: Instant,
    callback: Option<&'a RenderCallback>,
}

impl<'a> RenderProgress<'a> {
    /// Create a tracker for `total_tiles` tiles.
    pub fn new(total_tiles: usize, callback: Option<&'a RenderCallback>) -> Self {
        Self {
            total_tiles,
            finished: AtomicUsize::new(0),
            start: Instant::now(),
            callback,
        }
    }

    /// Report that dispatch is starting.
    pub fn started(&self) {
        self.emit(RenderEvent::Started {
            total_tiles: self.total_tiles,
        });
    }

    /// Report one finished tile.
    pub fn tile_finished(&self) {
        let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(RenderEvent::TileFinished {
            finished,
            total: self.total_tiles,
        });
    }

    /// Number of tiles finished so far.
    pub fn finished_tiles(&self) -> usize {
        self.finished.load(Ordering::Relaxed)
    }

    /// Report successful completion.
    pub fn completed(&self) {
        self.emit(RenderEvent::Completed {
            total_duration_ms: self.start.elapsed().as_millis() as u64,
        });
    }

    /// Report cooperative cancellation.
    pub fn cancelled(&self) {
        self.emit(RenderEvent::Cancelled);
    }

    fn emit(&self, event: RenderEvent) {
        if let Some(callback) = self.callback {
            callback(event);
        }
    }
}
