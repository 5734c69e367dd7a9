//! Demand-driven access to an operation's resolved inputs.
//!
//! During execution every operation sees its inputs through [`Inputs`]:
//! either a socket constant or the upstream operation's kernel, evaluated
//! recursively on demand. Recursion depth is bounded by graph depth.
//! Complex upstream operations get their setup data resolved (and cached
//! through their compute-once slot) before their kernel runs.

use crate::core::buffer::{Pixel, PixelBuffer, PixelSampler};
use crate::core::error::{GraphResult, OperationId};
use crate::core::geometry::{Rect, Size};
use crate::graph::operation::{DataType, Operation};
use crate::graph::structure::OperationGraph;
use crate::graph::topology::{ResolutionResolver, TopologyAnalyzer};
use log::debug;
use std::collections::HashMap;

/// How one input socket is satisfied during execution.
pub(crate) enum Binding {
    /// Unlinked socket: the signature's constant default.
    Constant(Pixel),
    /// Linked socket: dense index of the upstream operation.
    Link(usize),
}

pub(crate) struct RuntimeOp<'g> {
    pub id: OperationId,
    pub op: &'g dyn Operation,
    pub bindings: Vec<Binding>,
    pub resolution: Size,
    pub output: DataType,
    pub complex: bool,
}

/// The per-execution evaluation state: the demanded subgraph in
/// topological order, with resolutions and socket bindings resolved.
pub(crate) struct Runtime<'g> {
    ops: Vec<RuntimeOp<'g>>,
    terminal: usize,
}

impl<'g> Runtime<'g> {
    /// Build the runtime for the subgraph feeding `terminal`.
    ///
    /// Validates acyclicity over the whole graph and resolves every
    /// demanded operation's output size, so structural errors surface
    /// here, before any pixel work.
    pub fn build(graph: &'g OperationGraph, terminal: OperationId) -> GraphResult<Self> {
        let analyzer = TopologyAnalyzer::new(graph);
        let order = analyzer.topological_order()?;
        let demanded = analyzer.upstream_closure(terminal)?;

        let mut resolver = ResolutionResolver::new(graph);
        let mut index_of: HashMap<OperationId, usize> = HashMap::new();
        let mut ops = Vec::with_capacity(demanded.len());

        for id in order.into_iter().filter(|id| demanded.contains(id)) {
            let node = graph.node(id)?;
            let resolution = resolver.resolve(id)?;

            let bindings = node
                .signature()
                .inputs()
                .iter()
                .enumerate()
                .map(|(socket, def)| match graph.link_to_socket(id, socket) {
                    // Upstream ops precede their consumers in the order.
                    Some(link) => Binding::Link(index_of[&link.from]),
                    None => Binding::Constant(def.default()),
                })
                .collect();

            index_of.insert(id, ops.len());
            ops.push(RuntimeOp {
                id,
                op: node.op(),
                bindings,
                resolution,
                output: node.signature().output(),
                complex: node.op().is_complex(),
            });
        }

        debug!(
            "runtime built: {} of {} operations demanded",
            ops.len(),
            graph.node_count()
        );

        Ok(Self {
            ops,
            terminal: index_of[&terminal],
        })
    }

    /// Dense index of the terminal operation.
    pub fn terminal_index(&self) -> usize {
        self.terminal
    }

    /// Number of demanded operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The operations, upstream before downstream.
    pub fn ops(&self) -> &[RuntimeOp<'g>] {
        &self.ops
    }

    /// Resolved output size of an operation.
    pub fn resolution(&self, index: usize) -> Size {
        self.ops[index].resolution
    }

    /// Output data type of an operation.
    pub fn output_type(&self, index: usize) -> DataType {
        self.ops[index].output
    }

    /// Evaluate one pixel of one operation.
    ///
    /// Complex operations have their setup data resolved first; their
    /// compute-once slot makes that at-most-once per execution.
    pub fn evaluate_pixel(&self, index: usize, out: &mut Pixel, x: f32, y: f32, sampler: PixelSampler) {
        let rop = &self.ops[index];
        let inputs = Inputs {
            runtime: self,
            bindings: &rop.bindings,
        };
        if rop.complex {
            let tile = rop.op.initialize_tile_data(rop.resolution.to_rect(), &inputs);
            rop.op.execute_pixel(out, x, y, sampler, &inputs, tile.as_ref());
        } else {
            rop.op.execute_pixel(out, x, y, sampler, &inputs, None);
        }
    }
}

/// An operation's resolved inputs, indexed by socket.
pub struct Inputs<'r> {
    runtime: &'r Runtime<'r>,
    bindings: &'r [Binding],
}

impl<'r> Inputs<'r> {
    /// Number of input sockets.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the operation has no inputs.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Read the input at `socket` for position `(x, y)`.
    ///
    /// Constants fill `out` directly; linked sockets evaluate the
    /// upstream kernel at the same coordinates.
    pub fn read(&self, socket: usize, out: &mut Pixel, x: f32, y: f32, sampler: PixelSampler) {
        match &self.bindings[socket] {
            Binding::Constant(pixel) => *out = *pixel,
            Binding::Link(index) => self.runtime.evaluate_pixel(*index, out, x, y, sampler),
        }
    }

    /// Full extent of the upstream producer, or `None` for constants.
    pub fn extent(&self, socket: usize) -> Option<Rect> {
        match &self.bindings[socket] {
            Binding::Constant(_) => None,
            Binding::Link(index) => Some(self.runtime.resolution(*index).to_rect()),
        }
    }

    /// Render the input region into an owned buffer.
    ///
    /// Used by whole-image setup passes; simple chains never materialize.
    pub fn materialize(&self, socket: usize, rect: Rect) -> PixelBuffer {
        match &self.bindings[socket] {
            Binding::Constant(pixel) => PixelBuffer::from_fn(rect, 4, |_, _| *pixel),
            Binding::Link(index) => {
                let channels = match self.runtime.output_type(*index) {
                    DataType::Value => 1,
                    DataType::Color => 4,
                };
                let mut buffer = PixelBuffer::new(rect, channels);
                let mut pixel = [0.0; 4];
                for y in rect.y..rect.bottom() {
                    for x in rect.x..rect.right() {
                        self.runtime.evaluate_pixel(
                            *index,
                            &mut pixel,
                            x as f32,
                            y as f32,
                            PixelSampler::Nearest,
                        );
                        buffer.write_pixel(x, y, &pixel);
                    }
                }
                buffer
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::BufferExtend;
    use crate::graph::operation::{Signature, TileData};

    /// Fixed-size source whose red channel encodes x and green y.
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

    /// Halves every channel of its input.
    struct Halve;

    impl Operation for Halve {
        fn signature(&self) -> Signature {
            Signature::new("halve").color_input("color", [0.0, 0.0, 0.0, 1.0])
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
            let mut color = [0.0; 4];
            inputs.read(0, &mut color, x, y, sampler);
            *out = [color[0] * 0.5, color[1] * 0.5, color[2] * 0.5, color[3]];
        }
    }

    #[test]
    fn test_recursive_pull_through_chain() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(8, 8))));
        let first = graph.add(Box::new(Halve));
        let second = graph.add(Box::new(Halve));
        graph.connect(source, first, 0).unwrap();
        graph.connect(first, second, 0).unwrap();

        let runtime = Runtime::build(&graph, second).unwrap();
        let mut out = [0.0; 4];
        runtime.evaluate_pixel(
            runtime.terminal_index(),
            &mut out,
            4.0,
            2.0,
            PixelSampler::Nearest,
        );
        assert_eq!(out, [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_unlinked_socket_reads_constant_default() {
        let mut graph = OperationGraph::new();
        let halve = graph.add(Box::new(Halve));
        graph
            .set_resolution_override(halve, Size::new(4, 4))
            .unwrap();

        let runtime = Runtime::build(&graph, halve).unwrap();
        let mut out = [9.0; 4];
        runtime.evaluate_pixel(
            runtime.terminal_index(),
            &mut out,
            0.0,
            0.0,
            PixelSampler::Nearest,
        );
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_runtime_restricted_to_demanded_subgraph() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(8, 8))));
        let used = graph.add(Box::new(Halve));
        let _unused = graph.add(Box::new(CoordSource(Size::new(2, 2))));
        graph.connect(source, used, 0).unwrap();

        let runtime = Runtime::build(&graph, used).unwrap();
        assert_eq!(runtime.len(), 2);
    }

    #[test]
    fn test_materialize_renders_subregion() {
        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(CoordSource(Size::new(16, 16))));
        let halve = graph.add(Box::new(Halve));
        graph.connect(source, halve, 0).unwrap();

        let runtime = Runtime::build(&graph, halve).unwrap();
        let rop = &runtime.ops()[runtime.terminal_index()];
        let inputs = Inputs {
            runtime: &runtime,
            bindings: &rop.bindings,
        };

        let rect = Rect::new(2, 3, 4, 4);
        let buffer = inputs.materialize(0, rect);
        assert_eq!(buffer.rect(), rect);

        let mut out = [0.0; 4];
        buffer.read(&mut out, 5.0, 6.0, PixelSampler::Nearest, BufferExtend::Extend);
        assert_eq!(out, [5.0, 6.0, 0.0, 1.0]);
    }
}
