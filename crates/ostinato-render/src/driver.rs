//! Pull-based block renderer.
//!
//! Owns the root node, the sample rate and two reusable scratch buffers.
//! Each host pull fills an absolute time ramp, pulls the root, and
//! converts to the output's interleaved f32 layout, broadcasting the mono
//! stream to every channel. Never allocates on the pull path.

use ostinato_graph::{GateCell, Node, MAX_BLOCK};
use std::sync::Arc;

/// Outcome of one block pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The block carries rendered audio.
    Rendered,
    /// The block is silence (all gates closed, or a safety violation).
    Silence,
}

pub struct BlockRenderer {
    root: Node,
    gates: Vec<Arc<GateCell>>,
    sample_rate: f64,
    time_buf: Box<[f64]>,
    val_buf: Box<[f64]>,
    overruns: u64,
}

impl BlockRenderer {
    /// Wrap a compiled root. `gates` are the presets' gate cells: pending
    /// delayed closes are applied at block start, and a fully closed graph
    /// takes the silence fast path. The sample rate is propagated here,
    /// once, before the first pull.
    pub fn new(mut root: Node, gates: Vec<Arc<GateCell>>, sample_rate: f64) -> Self {
        root.set_sample_rate(sample_rate);
        Self {
            root,
            gates,
            sample_rate,
            time_buf: vec![0.0; MAX_BLOCK].into_boxed_slice(),
            val_buf: vec![0.0; MAX_BLOCK].into_boxed_slice(),
            overruns: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Count of oversized host requests answered with silence.
    pub fn overrun_count(&self) -> u64 {
        self.overruns
    }

    /// Render `output.len() / channels` frames starting at absolute frame
    /// index `first_frame`, interleaved across `channels`.
    pub fn render(&mut self, first_frame: u64, output: &mut [f32], channels: usize) -> RenderStatus {
        debug_assert!(channels > 0);
        let frames = output.len() / channels.max(1);
        let block_start = first_frame as f64 / self.sample_rate;

        for gate in &self.gates {
            gate.maybe_close(block_start);
        }

        if !self.gates.is_empty() && self.gates.iter().all(|g| !g.is_open()) {
            output.fill(0.0);
            return RenderStatus::Silence;
        }

        if frames > MAX_BLOCK {
            output.fill(0.0);
            self.overruns += 1;
            return RenderStatus::Silence;
        }

        for (i, t) in self.time_buf[..frames].iter_mut().enumerate() {
            *t = (first_frame + i as u64) as f64 / self.sample_rate;
        }
        self.root
            .process(&self.time_buf[..frames], &mut self.val_buf[..frames]);

        for frame in 0..frames {
            let value = self.val_buf[frame] as f32;
            for ch in 0..channels {
                output[frame * channels + ch] = value;
            }
        }
        RenderStatus::Rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_graph::{ConstCell, ConstShape};

    fn const_node(v: f64) -> Node {
        Node::constant(Arc::new(ConstCell::new(None, ConstShape::Raw, v)))
    }

    #[test]
    fn test_renders_and_broadcasts_channels() {
        let mut renderer = BlockRenderer::new(const_node(0.25), vec![], 44_100.0);
        let mut out = vec![0.0f32; 8];
        let status = renderer.render(0, &mut out, 2);
        assert_eq!(status, RenderStatus::Rendered);
        assert!(out.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_closed_gates_short_circuit() {
        let gate = Arc::new(GateCell::new());
        let node = Node::gate(const_node(1.0), gate.clone());
        let mut renderer = BlockRenderer::new(node, vec![gate.clone()], 44_100.0);
        let mut out = vec![1.0f32; 8];

        assert_eq!(renderer.render(0, &mut out, 2), RenderStatus::Silence);
        assert!(out.iter().all(|&v| v == 0.0));

        gate.set_open(true);
        assert_eq!(renderer.render(0, &mut out, 2), RenderStatus::Rendered);
        assert!(out.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_pending_gate_close_applied_at_block_start() {
        let gate = Arc::new(GateCell::new());
        gate.set_open(true);
        let node = Node::gate(const_node(1.0), gate.clone());
        let mut renderer = BlockRenderer::new(node, vec![gate.clone()], 1000.0);
        let mut out = vec![0.0f32; 4];

        gate.request_close(0.0);
        // Block at t=0.01s: delay not elapsed.
        assert_eq!(renderer.render(10, &mut out, 1), RenderStatus::Rendered);
        // Block past the 50 ms deadline closes the gate first.
        assert_eq!(renderer.render(100, &mut out, 1), RenderStatus::Silence);
    }

    #[test]
    fn test_oversized_request_is_counted_silence() {
        let mut renderer = BlockRenderer::new(const_node(1.0), vec![], 44_100.0);
        let mut out = vec![1.0f32; (MAX_BLOCK + 1) * 2];
        assert_eq!(renderer.render(0, &mut out, 2), RenderStatus::Silence);
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(renderer.overrun_count(), 1);
    }

    #[test]
    fn test_time_ramp_is_absolute() {
        // Identity root exposes the time ramp directly.
        let mut renderer = BlockRenderer::new(Node::Identity, vec![], 1000.0);
        let mut out = vec![0.0f32; 4];
        renderer.render(2000, &mut out, 1);
        assert!((out[0] - 2.0).abs() < 1e-6);
        assert!((out[3] - 2.003).abs() < 1e-6);
    }
}
