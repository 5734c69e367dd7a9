//! Tile scheduling and the execution entry point.
//!
//! The scheduler partitions the requested output region into tiles,
//! dispatches them across a fixed-size worker pool, and assembles finished
//! tiles into the final buffer. Cancellation is cooperative at tile
//! granularity: a cancelled execution stops dispatching new tiles, lets
//! in-flight tiles finish, discards all partial output, and still runs
//! `deinit_execution` for every initialized operation.

use crate::core::buffer::{PixelBuffer, PixelSampler};
use crate::core::context::ExecutionContext;
use crate::core::error::{ChitraResult, ExecutionError, OperationId};
use crate::core::geometry::Rect;
use crate::execution::progress::RenderProgress;
use crate::execution::reader::Runtime;
use crate::graph::operation::{DataType, Operation};
use crate::graph::structure::OperationGraph;
use log::{debug, trace};
use rayon::prelude::*;

/// Default edge length of a scheduled tile.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Minimum configurable tile edge length.
pub const MIN_TILE_SIZE: u32 = 8;

/// Maximum configurable tile edge length.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Partitions output regions into tiles and drives worker dispatch.
///
/// Tile size is a tuning parameter, not a correctness contract; edge
/// tiles are clipped to the region bounds.
#[derive(Debug, Clone)]
pub struct TileScheduler {
    tile_size: u32,
}

impl Default for TileScheduler {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl TileScheduler {
    /// Create a scheduler with the default tile size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile edge length, clamped to a sane range.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        self
    }

    /// Execute the graph, rendering `terminal`'s output for the context's
    /// region (or its full extent), and return the assembled buffer.
    ///
    /// Structural validation (acyclicity, resolution propagation) happens
    /// before any operation is initialized or any tile dispatched.
    pub fn execute(
        &self,
        graph: &OperationGraph,
        terminal: OperationId,
        ctx: &ExecutionContext,
    ) -> ChitraResult<PixelBuffer> {
        let runtime = Runtime::build(graph, terminal)?;
        let terminal_index = runtime.terminal_index();
        let extent = runtime.resolution(terminal_index).to_rect();

        let region = match ctx.region() {
            None => extent,
            Some(requested) => {
                let clipped = requested.intersect(&extent);
                if clipped.is_empty() {
                    return Err(ExecutionError::InvalidRegion { requested, extent }.into());
                }
                clipped
            }
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.threads())
            .build()
            .map_err(|e| ExecutionError::WorkerPool(e.to_string()))?;

        let tiles = partition(region, self.tile_size);
        let channels = match runtime.output_type(terminal_index) {
            DataType::Value => 1,
            DataType::Color => 4,
        };

        debug!(
            "dispatching {} tiles over region {} on {} workers",
            tiles.len(),
            region,
            pool.current_num_threads()
        );

        let progress = RenderProgress::new(tiles.len(), ctx.progress());
        progress.started();

        // Deinit runs on every exit path below, cancellation included.
        let _lifecycle = Lifecycle::init(&runtime);

        let rendered: Vec<Option<PixelBuffer>> = pool.install(|| {
            tiles
                .par_iter()
                .map(|tile| {
                    if ctx.is_cancelled() {
                        return None;
                    }
                    let buffer = render_tile(&runtime, terminal_index, *tile, channels);
                    progress.tile_finished();
                    Some(buffer)
                })
                .collect()
        });

        if ctx.is_cancelled() {
            progress.cancelled();
            return Err(ExecutionError::Cancelled.into());
        }

        let mut output = PixelBuffer::new(region, channels);
        for tile in rendered.into_iter().flatten() {
            output.blit_from(&tile);
        }

        progress.completed();
        Ok(output)
    }
}

/// Render one tile by demanding every pixel from the terminal operation.
fn render_tile(runtime: &Runtime<'_>, terminal: usize, rect: Rect, channels: usize) -> PixelBuffer {
    PixelBuffer::from_fn(rect, channels, |x, y| {
        let mut pixel = [0.0; 4];
        runtime.evaluate_pixel(terminal, &mut pixel, x as f32, y as f32, PixelSampler::Nearest);
        pixel
    })
}

/// Split a region into row-major tiles of at most `tile_size` edge length.
fn partition(region: Rect, tile_size: u32) -> Vec<Rect> {
    let mut tiles = Vec::new();
    let mut y = region.y;
    while y < region.bottom() {
        let height = tile_size.min(region.bottom() - y);
        let mut x = region.x;
        while x < region.right() {
            let width = tile_size.min(region.right() - x);
            tiles.push(Rect::new(x, y, width, height));
            x += width;
        }
        y += height;
    }
    tiles
}

/// Pairs `init_execution` with `deinit_execution` on every exit path.
///
/// Construction initializes operations upstream-first; Drop deinitializes
/// in reverse order exactly once, whether the execution completed, was
/// cancelled, or unwound.
struct Lifecycle<'r, 'g> {
    runtime: &'r Runtime<'g>,
}

impl<'r, 'g> Lifecycle<'r, 'g> {
    fn init(runtime: &'r Runtime<'g>) -> Self {
        for rop in runtime.ops() {
            trace!("init_execution {}", rop.id);
            rop.op.init_execution();
        }
        Self { runtime }
    }
}

impl Drop for Lifecycle<'_, '_> {
    fn drop(&mut self) {
        for rop in self.runtime.ops().iter().rev() {
            rop.op.deinit_execution();
        }
        debug!("execution teardown complete ({} operations)", self.runtime.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::{BufferExtend, Pixel};
    use crate::core::geometry::Size;
    use crate::execution::cache::ComputeOnce;
    use crate::execution::reader::Inputs;
    use crate::graph::operation::{Operation, Signature, TileData};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fixed-size source writing its coordinates into red/green.
    struct CoordSource(Size);

    impl Operation for CoordSource {
        fn signature(&self) -> Signature {
            Signature::new("coord_source")
        }

        fn determine_resolution(&self, _input_sizes: &[Option<Size>]) -> Option<Size> {
            Some(self.0)
        }

        fn execute_pixel(
            &self,
            out: &mut Pixel,
            x: f32,
            y: f32,
            _sampler: PixelSampler,
            _inputs: &Inputs<'_>,
            _tile: Option<&TileData>,
        ) {
            *out = [x, y, 0.0, 1.0];
        }
    }

    /// Pass-through that counts lifecycle transitions.
    struct LifecycleProbe {
        inits: Arc<AtomicUsize>,
        deinits: Arc<AtomicUsize>,
    }

    impl Operation for LifecycleProbe {
        fn signature(&self) -> Signature {
            Signature::new("lifecycle_probe").color_input("color", [0.0, 0.0, 0.0, 1.0])
        }

        fn init_execution(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn deinit_execution(&self) {
            self.deinits.fetch_add(1, Ordering::SeqCst);
        }

        fn execute_pixel(
            &self,
            out: &mut Pixel,
            x: f32,
            y: f32,
            sampler: PixelSampler,
            inputs: &Inputs<'_>,
            _tile: Option<&TileData>,
        ) {
            inputs.read(0, out, x, y, sampler);
        }
    }

    /// Complex operation whose setup pass counts its own executions.
    struct CountingComplex {
        setups: Arc<AtomicUsize>,
        cached: ComputeOnce<f32>,
    }

    impl Operation for CountingComplex {
        fn signature(&self) -> Signature {
            Signature::new("counting_complex").color_input("image", [0.0, 0.0, 0.0, 1.0])
        }

        fn is_complex(&self) -> bool {
            true
        }

        fn deinit_execution(&self) {
            self.cached.clear();
        }

        fn depending_area_of_interest(&self, _input: usize, _output: Rect, input_extent: Rect) -> Rect {
            input_extent
        }

        fn initialize_tile_data(&self, rect: Rect, inputs: &Inputs<'_>) -> Option<TileData> {
            let full = self.depending_area_of_interest(0, rect, inputs.extent(0).unwrap_or(rect));
            let mean = self.cached.get_or_compute(|| {
                self.setups.fetch_add(1, Ordering::SeqCst);
                let buffer = inputs.materialize(0, full);
                let sum: f32 = buffer.as_slice().iter().sum();
                sum / buffer.as_slice().len() as f32
            });
            Some(mean)
        }

        fn execute_pixel(
            &self,
            out: &mut Pixel,
            x: f32,
            y: f32,
            sampler: PixelSampler,
            inputs: &Inputs<'_>,
            tile: Option<&TileData>,
        ) {
            let mean = tile
                .and_then(|t| t.downcast_ref::<f32>())
                .copied()
                .unwrap_or(0.0);
            let mut color = [0.0; 4];
            inputs.read(0, &mut color, x, y, sampler);
            *out = [color[0] - mean, color[1] - mean, color[2] - mean, color[3]];
        }
    }

    #[test]
    fn test_full_render_assembles_all_tiles() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(40, 24))));

        let scheduler = TileScheduler::new().with_tile_size(16);
        let ctx = ExecutionContext::new();
        let output = scheduler.execute(&graph, source, &ctx).unwrap();

        assert_eq!(output.rect(), Rect::new(0, 0, 40, 24));
        let mut px = [0.0; 4];
        output.read(&mut px, 33.0, 17.0, PixelSampler::Nearest, BufferExtend::Extend);
        assert_eq!(px, [33.0, 17.0, 0.0, 1.0]);
    }

    #[test]
    fn test_viewer_crop_renders_sub_region() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(64, 64))));

        let scheduler = TileScheduler::new().with_tile_size(16);
        let ctx = ExecutionContext::new().with_region(Rect::new(8, 8, 16, 16));
        let output = scheduler.execute(&graph, source, &ctx).unwrap();

        assert_eq!(output.rect(), Rect::new(8, 8, 16, 16));
        let mut px = [0.0; 4];
        output.read(&mut px, 10.0, 12.0, PixelSampler::Nearest, BufferExtend::Extend);
        assert_eq!(px, [10.0, 12.0, 0.0, 1.0]);
    }

    #[test]
    fn test_region_outside_extent_is_rejected() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(16, 16))));

        let ctx = ExecutionContext::new().with_region(Rect::new(100, 100, 8, 8));
        let result = TileScheduler::new().execute(&graph, source, &ctx);
        assert!(matches!(
            result,
            Err(crate::core::error::ChitraError::Execution(
                ExecutionError::InvalidRegion { .. }
            ))
        ));
    }

    #[test]
    fn test_unresolved_size_surfaces_before_init() {
        let inits = Arc::new(AtomicUsize::new(0));
        let deinits = Arc::new(AtomicUsize::new(0));

        let mut graph = OperationGraph::new();
        let probe = graph.add(Box::new(LifecycleProbe {
            inits: inits.clone(),
            deinits: deinits.clone(),
        }));

        let result = TileScheduler::new().execute(&graph, probe, &ExecutionContext::new());
        assert!(matches!(
            result,
            Err(crate::core::error::ChitraError::Graph(
                crate::core::error::GraphError::UnresolvedSize(_)
            ))
        ));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
        assert_eq!(deinits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lifecycle_runs_once_on_success() {
        let inits = Arc::new(AtomicUsize::new(0));
        let deinits = Arc::new(AtomicUsize::new(0));

        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(32, 32))));
        let probe = graph.add(Box::new(LifecycleProbe {
            inits: inits.clone(),
            deinits: deinits.clone(),
        }));
        graph.connect(source, probe, 0).unwrap();

        TileScheduler::new()
            .execute(&graph, probe, &ExecutionContext::new())
            .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_discards_output_and_tears_down() {
        let inits = Arc::new(AtomicUsize::new(0));
        let deinits = Arc::new(AtomicUsize::new(0));

        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(128, 128))));
        let probe = graph.add(Box::new(LifecycleProbe {
            inits: inits.clone(),
            deinits: deinits.clone(),
        }));
        graph.connect(source, probe, 0).unwrap();

        // Cancel as soon as the first tile reports completion.
        let ctx = ExecutionContext::new().with_threads(2);
        let handle = ctx.cancel_handle();
        let cancel = handle.clone();
        let ctx = ctx.with_progress(move |event| {
            if matches!(
                event,
                crate::execution::progress::RenderEvent::TileFinished { .. }
            ) {
                cancel.cancel();
            }
        });

        let scheduler = TileScheduler::new().with_tile_size(16);
        let result = scheduler.execute(&graph, probe, &ctx);

        assert!(handle.is_cancelled());
        assert!(matches!(
            result,
            Err(crate::core::error::ChitraError::Execution(ExecutionError::Cancelled))
        ));
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_complex_setup_runs_once_across_workers() {
        let setups = Arc::new(AtomicUsize::new(0));

        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(100, 100))));
        let complex = graph.add(Box::new(CountingComplex {
            setups: setups.clone(),
            cached: ComputeOnce::new(),
        }));
        graph.connect(source, complex, 0).unwrap();

        let scheduler = TileScheduler::new().with_tile_size(16);
        let ctx = ExecutionContext::new().with_threads(8);
        scheduler.execute(&graph, complex, &ctx).unwrap();

        assert_eq!(setups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_render_is_deterministic_across_runs() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(48, 48))));

        let scheduler = TileScheduler::new().with_tile_size(8);
        let a = scheduler
            .execute(&graph, source, &ExecutionContext::new().with_threads(4))
            .unwrap();
        let b = scheduler
            .execute(&graph, source, &ExecutionContext::new().with_threads(4))
            .unwrap();

        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_partition_clips_edge_tiles() {
        let tiles = partition(Rect::new(0, 0, 40, 24), 16);
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[2], Rect::new(32, 0, 8, 16));
        assert_eq!(tiles[5], Rect::new(32, 16, 8, 8));
        let total: u64 = tiles.iter().map(|t| t.area()).sum();
        assert_eq!(total, 40 * 24);
    }
}
