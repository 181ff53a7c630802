//! Block-processing signal nodes.
//!
//! A `Node` consumes a block of input samples and writes an equal-length
//! block of outputs. The top-level node of a graph is driven with an
//! absolute time ramp (`t0 + i/rate`); oscillators expect frequency-scaled
//! time, produced upstream by multiplying a "freq" constant with the ramp.
//!
//! Nodes own whatever scratch buffers their combinator shape needs, sized
//! once at construction to `MAX_BLOCK`, so the render pull never allocates.
//! Structural mutation (recompiling, attaching) happens only outside the
//! render pull; per-parameter mutation goes through the cells in
//! [`crate::params`].

use crate::adsr::Adsr;
use crate::kernel;
use crate::params::{ChorusCell, ConstCell, EventCell, EventField, GateCell, OscCell, OscShape};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Maximum frames per process call. Larger host requests are treated as a
/// render-local safety violation and produce silence.
pub const MAX_BLOCK: usize = 4096;

fn scratch() -> Box<[f64]> {
    vec![0.0; MAX_BLOCK].into_boxed_slice()
}

/// A signal-processing unit over `f64` blocks.
pub enum Node {
    /// Copies its input (the time ramp, at the top level).
    Identity,
    /// Named constant; ignores its input.
    Const(Arc<ConstCell>),
    /// `1 / inner(t)`, with zero mapped to zero.
    Reciprocal { inner: Box<Node>, buf: Box<[f64]> },
    /// Pointwise sum of its terms, each driven by the same input.
    Sum { terms: Vec<Node>, buf: Box<[f64]> },
    /// Pointwise product of its factors, each driven by the same input.
    Prod { factors: Vec<Node>, buf: Box<[f64]> },
    /// Serial composition: the first stage sees the input, each later stage
    /// sees its predecessor's output.
    Chain { stages: Vec<Node>, buf: Box<[f64]> },
    /// Waveform oscillator over frequency-scaled time. `width` is itself a
    /// node, evaluated per sample (pulse width for square).
    Osc {
        cell: Arc<OscCell>,
        width: Box<Node>,
        width_buf: Box<[f64]>,
        rng: SmallRng,
    },
    /// ADSR envelope over absolute time.
    Envelope(Arc<Adsr>),
    /// Second-order low-pass. Cutoff and resonance are nodes evaluated
    /// against the filter's input block; coefficients are recomputed only
    /// when they change.
    LowPass {
        cutoff: Box<Node>,
        resonance: Box<Node>,
        cut_buf: Box<[f64]>,
        res_buf: Box<[f64]>,
        filter: DirectForm2Transposed<f64>,
        coeff_key: (f64, f64),
        sample_rate: f64,
    },
    /// Detuned mix over independently compiled copies of a subtree. The
    /// detune ratios live in the copies' captured constant cells.
    Chorus {
        copies: Vec<Node>,
        cell: Arc<ChorusCell>,
        buf: Box<[f64]>,
    },
    /// Mix-weighted blend across its inputs; `mix` in [0, 1] spans the
    /// whole input list, blending the two adjacent entries.
    Crossfade {
        inputs: Vec<Node>,
        bufs: Vec<Box<[f64]>>,
        mix: Box<Node>,
        mix_buf: Box<[f64]>,
        equal_power: bool,
    },
    /// Low-rate stepped random in [min, max], smoothstep-interpolated
    /// between steps of length `1/freq` seconds.
    SteppedNoise {
        freq: f64,
        min: f64,
        max: f64,
        seed: u64,
    },
    /// Uniform random constant, sampled at construction and on reset.
    RandConst {
        min: f64,
        max: f64,
        value: f64,
        rng: SmallRng,
    },
    /// Log-uniform random constant, sampled at construction and on reset.
    ExpRandConst {
        min: f64,
        max: f64,
        value: f64,
        rng: SmallRng,
    },
    /// Linear ramp from `from` to `to` over `duration` seconds, anchored at
    /// the first input time seen after construction or reset.
    Line {
        duration: f64,
        from: f64,
        to: f64,
        origin: Option<f64>,
    },
    /// Pass-through while open, hard zero while closed.
    Gate {
        inner: Box<Node>,
        cell: Arc<GateCell>,
    },
    /// Value derived from the currently bound chord event.
    Event {
        cell: Arc<EventCell>,
        field: EventField,
    },
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Node::Identity => "Identity",
            Node::Const(_) => "Const",
            Node::Reciprocal { .. } => "Reciprocal",
            Node::Sum { .. } => "Sum",
            Node::Prod { .. } => "Prod",
            Node::Chain { .. } => "Chain",
            Node::Osc { .. } => "Osc",
            Node::Envelope(_) => "Envelope",
            Node::LowPass { .. } => "LowPass",
            Node::Chorus { .. } => "Chorus",
            Node::Crossfade { .. } => "Crossfade",
            Node::SteppedNoise { .. } => "SteppedNoise",
            Node::RandConst { .. } => "RandConst",
            Node::ExpRandConst { .. } => "ExpRandConst",
            Node::Line { .. } => "Line",
            Node::Gate { .. } => "Gate",
            Node::Event { .. } => "Event",
        };
        f.write_str(name)
    }
}

impl Node {
    pub fn constant(cell: Arc<ConstCell>) -> Self {
        Node::Const(cell)
    }

    pub fn reciprocal(inner: Node) -> Self {
        Node::Reciprocal {
            inner: Box::new(inner),
            buf: scratch(),
        }
    }

    pub fn sum(terms: Vec<Node>) -> Self {
        Node::Sum {
            terms,
            buf: scratch(),
        }
    }

    pub fn prod(factors: Vec<Node>) -> Self {
        Node::Prod {
            factors,
            buf: scratch(),
        }
    }

    pub fn chain(stages: Vec<Node>) -> Self {
        Node::Chain {
            stages,
            buf: scratch(),
        }
    }

    pub fn osc(cell: Arc<OscCell>, width: Node, seed: u64) -> Self {
        Node::Osc {
            cell,
            width: Box::new(width),
            width_buf: scratch(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn low_pass(cutoff: Node, resonance: Node, sample_rate: f64) -> Self {
        let coeffs = initial_coeffs(sample_rate);
        Node::LowPass {
            cutoff: Box::new(cutoff),
            resonance: Box::new(resonance),
            cut_buf: scratch(),
            res_buf: scratch(),
            filter: DirectForm2Transposed::<f64>::new(coeffs),
            coeff_key: (f64::NAN, f64::NAN),
            sample_rate,
        }
    }

    pub fn chorus(copies: Vec<Node>, cell: Arc<ChorusCell>) -> Self {
        Node::Chorus {
            copies,
            cell,
            buf: scratch(),
        }
    }

    pub fn crossfade(inputs: Vec<Node>, mix: Node, equal_power: bool) -> Self {
        let bufs = inputs.iter().map(|_| scratch()).collect();
        Node::Crossfade {
            inputs,
            bufs,
            mix: Box::new(mix),
            mix_buf: scratch(),
            equal_power,
        }
    }

    pub fn rand_const(min: f64, max: f64, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let value = sample_uniform(&mut rng, min, max);
        Node::RandConst {
            min,
            max,
            value,
            rng,
        }
    }

    pub fn exp_rand_const(min: f64, max: f64, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let value = sample_log_uniform(&mut rng, min, max);
        Node::ExpRandConst {
            min,
            max,
            value,
            rng,
        }
    }

    pub fn line(duration: f64, from: f64, to: f64) -> Self {
        Node::Line {
            duration,
            from,
            to,
            origin: None,
        }
    }

    pub fn gate(inner: Node, cell: Arc<GateCell>) -> Self {
        Node::Gate {
            inner: Box::new(inner),
            cell,
        }
    }

    /// Process one block. `input` and `output` must be the same length,
    /// at most `MAX_BLOCK`.
    pub fn process(&mut self, input: &[f64], output: &mut [f64]) {
        debug_assert_eq!(input.len(), output.len());
        debug_assert!(output.len() <= MAX_BLOCK);
        let n = output.len();

        match self {
            Node::Identity => output.copy_from_slice(input),

            Node::Const(cell) => output.fill(cell.read()),

            Node::Reciprocal { inner, buf } => {
                inner.process(input, &mut buf[..n]);
                for (o, &v) in output.iter_mut().zip(buf[..n].iter()) {
                    *o = if v == 0.0 { 0.0 } else { v.recip() };
                }
            }

            Node::Sum { terms, buf } => {
                output.fill(0.0);
                for term in terms.iter_mut() {
                    term.process(input, &mut buf[..n]);
                    for (o, &v) in output.iter_mut().zip(buf[..n].iter()) {
                        *o += v;
                    }
                }
            }

            Node::Prod { factors, buf } => {
                output.fill(1.0);
                for factor in factors.iter_mut() {
                    factor.process(input, &mut buf[..n]);
                    for (o, &v) in output.iter_mut().zip(buf[..n].iter()) {
                        *o *= v;
                    }
                }
            }

            Node::Chain { stages, buf } => {
                if stages.is_empty() {
                    output.copy_from_slice(input);
                    return;
                }
                stages[0].process(input, output);
                for stage in stages[1..].iter_mut() {
                    buf[..n].copy_from_slice(&output[..n]);
                    stage.process(&buf[..n], output);
                }
            }

            Node::Osc {
                cell,
                width,
                width_buf,
                rng,
            } => {
                let shape = cell.shape();
                match shape {
                    OscShape::Noise => {
                        for o in output.iter_mut() {
                            *o = rng.gen::<f64>();
                        }
                    }
                    OscShape::Square => {
                        width.process(input, &mut width_buf[..n]);
                        for (i, o) in output.iter_mut().enumerate() {
                            *o = kernel::osc_square(input[i], width_buf[i]);
                        }
                    }
                    OscShape::Sine => {
                        for (o, &x) in output.iter_mut().zip(input.iter()) {
                            *o = kernel::osc_sine(x);
                        }
                    }
                    OscShape::Triangle => {
                        for (o, &x) in output.iter_mut().zip(input.iter()) {
                            *o = kernel::osc_triangle(x);
                        }
                    }
                    OscShape::Sawtooth => {
                        for (o, &x) in output.iter_mut().zip(input.iter()) {
                            *o = kernel::osc_sawtooth(x);
                        }
                    }
                }
            }

            Node::Envelope(adsr) => {
                for (o, &t) in output.iter_mut().zip(input.iter()) {
                    *o = adsr.value_at(t);
                }
            }

            Node::LowPass {
                cutoff,
                resonance,
                cut_buf,
                res_buf,
                filter,
                coeff_key,
                sample_rate,
            } => {
                cutoff.process(input, &mut cut_buf[..n]);
                resonance.process(input, &mut res_buf[..n]);
                let nyquist_guard = *sample_rate * 0.49;
                for i in 0..n {
                    let fc = cut_buf[i].clamp(1.0e-3, nyquist_guard);
                    let q = res_buf[i].max(1.0e-2);
                    if (fc, q) != *coeff_key {
                        if let Ok(coeffs) = Coefficients::<f64>::from_params(
                            Type::LowPass,
                            sample_rate.hz(),
                            fc.hz(),
                            q,
                        ) {
                            filter.update_coefficients(coeffs);
                            *coeff_key = (fc, q);
                        }
                    }
                    output[i] = filter.run(input[i]);
                }
            }

            Node::Chorus { copies, cell, buf } => {
                if copies.is_empty() {
                    output.fill(0.0);
                    return;
                }
                copies[0].process(input, output);
                for copy in copies[1..].iter_mut() {
                    copy.process(input, &mut buf[..n]);
                    for (o, &v) in output.iter_mut().zip(buf[..n].iter()) {
                        *o += v;
                    }
                }
                let inv = 1.0 / cell.num_copies().max(1) as f64;
                if inv != 1.0 {
                    for o in output.iter_mut() {
                        *o *= inv;
                    }
                }
            }

            Node::Crossfade {
                inputs,
                bufs,
                mix,
                mix_buf,
                equal_power,
            } => {
                if inputs.is_empty() {
                    output.fill(0.0);
                    return;
                }
                if inputs.len() == 1 {
                    inputs[0].process(input, output);
                    return;
                }
                for (node, buf) in inputs.iter_mut().zip(bufs.iter_mut()) {
                    node.process(input, &mut buf[..n]);
                }
                mix.process(input, &mut mix_buf[..n]);
                let span = (inputs.len() - 1) as f64;
                for i in 0..n {
                    let pos = mix_buf[i].clamp(0.0, 1.0) * span;
                    let lo = (pos.floor() as usize).min(inputs.len() - 2);
                    let frac = pos - lo as f64;
                    let (wa, wb) = if *equal_power {
                        let theta = frac * std::f64::consts::FRAC_PI_2;
                        (theta.cos(), theta.sin())
                    } else {
                        (1.0 - frac, frac)
                    };
                    output[i] = wa * bufs[lo][i] + wb * bufs[lo + 1][i];
                }
            }

            Node::SteppedNoise {
                freq,
                min,
                max,
                seed,
            } => {
                for (o, &t) in output.iter_mut().zip(input.iter()) {
                    let x = t * *freq;
                    let k = x.floor() as i64;
                    let a = kernel::step_noise(*seed, k);
                    let b = kernel::step_noise(*seed, k + 1);
                    let v = a + (b - a) * kernel::smooth_step(x - k as f64);
                    *o = *min + v * (*max - *min);
                }
            }

            Node::RandConst { value, .. } | Node::ExpRandConst { value, .. } => {
                output.fill(*value);
            }

            Node::Line {
                duration,
                from,
                to,
                origin,
            } => {
                for (o, &t) in output.iter_mut().zip(input.iter()) {
                    let t0 = *origin.get_or_insert(t);
                    let u = if *duration <= 0.0 {
                        1.0
                    } else {
                        ((t - t0) / *duration).clamp(0.0, 1.0)
                    };
                    *o = *from + (*to - *from) * u;
                }
            }

            Node::Gate { inner, cell } => {
                if cell.is_open() {
                    inner.process(input, output);
                } else {
                    output.fill(0.0);
                }
            }

            Node::Event { cell, field } => output.fill(cell.read(*field)),
        }
    }

    /// Evaluate the node at a single point. Control-domain convenience for
    /// modulators, which are sampled once per event.
    pub fn eval(&mut self, t: f64) -> f64 {
        let mut out = [0.0];
        self.process(&[t], &mut out);
        out[0]
    }

    /// Propagate the sample rate through the subtree. Called once at graph
    /// start and on any recompile, before the first process call.
    pub fn set_sample_rate(&mut self, rate: f64) {
        if let Node::LowPass {
            sample_rate,
            coeff_key,
            ..
        } = self
        {
            *sample_rate = rate;
            *coeff_key = (f64::NAN, f64::NAN);
        }
        self.for_each_child(|child| child.set_sample_rate(rate));
    }

    /// Return the subtree to its initial processing state: filter memory
    /// cleared, random constants resampled, ramps re-anchored, envelopes
    /// closed.
    pub fn reset(&mut self) {
        match self {
            Node::LowPass { filter, .. } => filter.reset_state(),
            Node::Envelope(adsr) => adsr.reset(),
            Node::RandConst {
                min,
                max,
                value,
                rng,
            } => *value = sample_uniform(rng, *min, *max),
            Node::ExpRandConst {
                min,
                max,
                value,
                rng,
            } => *value = sample_log_uniform(rng, *min, *max),
            Node::Line { origin, .. } => *origin = None,
            _ => {}
        }
        self.for_each_child(|child| child.reset());
    }

    /// Visit every direct child, including parameter sub-nodes.
    fn for_each_child(&mut self, mut f: impl FnMut(&mut Node)) {
        match self {
            Node::Reciprocal { inner, .. } => f(inner),
            Node::Sum { terms, .. } => terms.iter_mut().for_each(f),
            Node::Prod { factors, .. } => factors.iter_mut().for_each(f),
            Node::Chain { stages, .. } => stages.iter_mut().for_each(f),
            Node::Osc { width, .. } => f(width),
            Node::LowPass {
                cutoff, resonance, ..
            } => {
                f(cutoff);
                f(resonance);
            }
            Node::Chorus { copies, .. } => copies.iter_mut().for_each(f),
            Node::Crossfade { inputs, mix, .. } => {
                inputs.iter_mut().for_each(&mut f);
                f(mix);
            }
            Node::Gate { inner, .. } => f(inner),
            _ => {}
        }
    }
}

fn sample_uniform(rng: &mut SmallRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

/// Log-uniform in [min, max]; falls back to uniform when the range touches
/// or crosses zero.
fn sample_log_uniform(rng: &mut SmallRng, min: f64, max: f64) -> f64 {
    if min > 0.0 && max > min {
        let u = rng.gen::<f64>();
        min * (max / min).powf(u)
    } else {
        sample_uniform(rng, min, max)
    }
}

fn initial_coeffs(sample_rate: f64) -> Coefficients<f64> {
    // 1 kHz Butterworth placeholder; real coefficients land on the first
    // process call once the cutoff input is known.
    Coefficients::<f64>::from_params(Type::LowPass, sample_rate.hz(), 1000.0.hz(), 0.707)
        .unwrap_or(Coefficients {
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ConstShape;

    fn cell(name: &str, v: f64) -> Arc<ConstCell> {
        Arc::new(ConstCell::new(Some(name.into()), ConstShape::Raw, v))
    }

    fn ramp(n: usize, rate: f64, first: u64) -> Vec<f64> {
        (0..n).map(|i| (first + i as u64) as f64 / rate).collect()
    }

    #[test]
    fn test_const_block() {
        let mut node = Node::constant(cell("x", 42.0));
        let input = ramp(10, 44100.0, 0);
        let mut out = vec![0.0; 10];
        node.process(&input, &mut out);
        assert_eq!(out, vec![42.0; 10]);
    }

    #[test]
    fn test_prod_of_consts() {
        let mut node = Node::prod(vec![Node::constant(cell("a", 3.0)), Node::constant(cell("b", 7.0))]);
        let input = ramp(16, 44100.0, 0);
        let mut out = vec![0.0; 16];
        node.process(&input, &mut out);
        for v in out {
            assert!((v - 21.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_sum_and_identity() {
        let mut node = Node::sum(vec![Node::Identity, Node::constant(cell("c", 1.0))]);
        let input = vec![0.0, 1.0, 2.0];
        let mut out = vec![0.0; 3];
        node.process(&input, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_chain_applies_first_to_last() {
        // (t + 1) then reciprocal
        let add_one = Node::sum(vec![Node::Identity, Node::constant(cell("one", 1.0))]);
        let mut node = Node::chain(vec![add_one, Node::reciprocal(Node::Identity)]);
        let input = vec![0.0, 1.0, 3.0];
        let mut out = vec![0.0; 3];
        node.process(&input, &mut out);
        assert_eq!(out, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_gate_open_and_closed() {
        let gate = Arc::new(GateCell::new());
        let mut node = Node::gate(Node::constant(cell("v", 5.0)), gate.clone());
        let input = vec![0.0; 4];
        let mut out = vec![0.0; 4];

        gate.set_open(true);
        node.process(&input, &mut out);
        assert_eq!(out[0], 5.0);

        gate.set_open(false);
        node.process(&input, &mut out);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_sine_zero_crossings_track_frequency() {
        let rate = 44100.0;
        let count = |freq: f64| {
            let freq_cell = cell("freq", freq);
            let osc_cell = Arc::new(OscCell::new(None, OscShape::Sine));
            let scaled_time = Node::prod(vec![Node::constant(freq_cell), Node::Identity]);
            let osc = Node::osc(osc_cell, Node::constant(cell("w", 0.5)), 1);
            let mut node = Node::chain(vec![scaled_time, osc]);
            node.set_sample_rate(rate);

            let mut crossings = 0usize;
            let mut prev = 0.0f64;
            let mut first = true;
            let mut out = vec![0.0; 512];
            let mut frame = 0u64;
            while frame < rate as u64 {
                let n = 512.min(rate as u64 - frame) as usize;
                let input = ramp(n, rate, frame);
                node.process(&input, &mut out[..n]);
                for &v in &out[..n] {
                    if !first && (prev < 0.0) != (v < 0.0) {
                        crossings += 1;
                    }
                    prev = v;
                    first = false;
                }
                frame += n as u64;
            }
            crossings
        };

        let c440 = count(440.0);
        assert!((875..=885).contains(&c440), "440 Hz crossings: {c440}");
        let c880 = count(880.0);
        let ratio = c880 as f64 / c440 as f64;
        assert!((ratio - 2.0).abs() < 0.02, "octave ratio: {ratio}");
    }

    #[test]
    fn test_oscillator_bounds() {
        let rate = 44100.0;
        for shape in [OscShape::Sine, OscShape::Triangle, OscShape::Sawtooth] {
            let osc_cell = Arc::new(OscCell::new(None, shape));
            let scaled = Node::prod(vec![Node::constant(cell("freq", 997.0)), Node::Identity]);
            let osc = Node::osc(osc_cell, Node::constant(cell("w", 0.5)), 3);
            let mut node = Node::chain(vec![scaled, osc]);
            let input = ramp(4096, rate, 0);
            let mut out = vec![0.0; 4096];
            node.process(&input, &mut out);
            for &v in &out {
                assert!(v >= -1.0 - 1e-3 && v <= 1.0 + 1e-3, "{shape:?} out of range: {v}");
            }
        }
    }

    #[test]
    fn test_square_is_bipolar_unit() {
        let osc_cell = Arc::new(OscCell::new(None, OscShape::Square));
        let scaled = Node::prod(vec![Node::constant(cell("freq", 313.0)), Node::Identity]);
        let osc = Node::osc(osc_cell, Node::constant(cell("w", 0.5)), 3);
        let mut node = Node::chain(vec![scaled, osc]);
        let input = ramp(2048, 44100.0, 0);
        let mut out = vec![0.0; 2048];
        node.process(&input, &mut out);
        for &v in &out {
            assert!(v == 1.0 || v == -1.0);
        }
    }

    #[test]
    fn test_noise_is_unipolar() {
        let osc_cell = Arc::new(OscCell::new(None, OscShape::Noise));
        let mut node = Node::osc(osc_cell, Node::constant(cell("w", 0.5)), 11);
        let input = ramp(1024, 44100.0, 0);
        let mut out = vec![0.0; 1024];
        node.process(&input, &mut out);
        let mut distinct = 0;
        for w in out.windows(2) {
            assert!((0.0..=1.0).contains(&w[0]));
            if w[0] != w[1] {
                distinct += 1;
            }
        }
        assert!(distinct > 1000, "noise redraws every sample");
    }

    #[test]
    fn test_low_pass_attenuates_when_cutoff_drops() {
        let rate = 44100.0;
        let rms = |cutoff_hz: f64| {
            let scaled = Node::prod(vec![Node::constant(cell("freq", 440.0)), Node::Identity]);
            let osc = Node::osc(Arc::new(OscCell::new(None, OscShape::Sawtooth)), Node::constant(cell("w", 0.5)), 5);
            let lp = Node::low_pass(
                Node::constant(cell("cutoff", cutoff_hz)),
                Node::constant(cell("res", 0.707)),
                rate,
            );
            let mut node = Node::chain(vec![scaled, osc, lp]);
            node.set_sample_rate(rate);
            let input = ramp(4096, rate, 0);
            let mut out = vec![0.0; 4096];
            node.process(&input, &mut out);
            // Skip the settle-in portion.
            let tail = &out[1024..];
            (tail.iter().map(|v| v * v).sum::<f64>() / tail.len() as f64).sqrt()
        };

        let wide = rms(8000.0);
        let mid = rms(800.0);
        let narrow = rms(120.0);
        assert!(wide > mid && mid > narrow, "rms {wide} > {mid} > {narrow}");
    }

    #[test]
    fn test_crossfade_endpoints() {
        let a = Node::constant(cell("a", 1.0));
        let b = Node::constant(cell("b", 3.0));
        let mix = cell("mix", 0.0);
        let mut node = Node::crossfade(vec![a, b], Node::constant(mix.clone()), false);
        let input = vec![0.0; 4];
        let mut out = vec![0.0; 4];

        node.process(&input, &mut out);
        assert!((out[0] - 1.0).abs() < 1e-12);

        mix.set_value(1.0);
        node.process(&input, &mut out);
        assert!((out[0] - 3.0).abs() < 1e-12);

        mix.set_value(0.5);
        node.process(&input, &mut out);
        assert!((out[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_power_crossfade_midpoint() {
        let a = Node::constant(cell("a", 1.0));
        let b = Node::constant(cell("b", 1.0));
        let mut node = Node::crossfade(vec![a, b], Node::constant(cell("mix", 0.5)), true);
        let input = vec![0.0; 1];
        let mut out = vec![0.0; 1];
        node.process(&input, &mut out);
        // cos(pi/4) + sin(pi/4) = sqrt(2)
        assert!((out[0] - std::f64::consts::SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn test_line_ramp() {
        let mut node = Node::line(2.0, 1.0, 5.0);
        let mut out = vec![0.0; 3];
        node.process(&[10.0, 11.0, 12.0], &mut out);
        assert_eq!(out, vec![1.0, 3.0, 5.0]);
        // Holds the end value afterwards.
        node.process(&[20.0, 21.0, 22.0], &mut out);
        assert_eq!(out, vec![5.0, 5.0, 5.0]);
        // Reset re-anchors.
        node.reset();
        node.process(&[30.0, 31.0, 32.0], &mut out);
        assert_eq!(out, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_stepped_noise_holds_between_steps() {
        let mut node = Node::SteppedNoise {
            freq: 2.0,
            min: -1.0,
            max: 1.0,
            seed: 99,
        };
        let input: Vec<f64> = (0..100).map(|i| i as f64 * 0.001).collect();
        let mut out = vec![0.0; 100];
        node.process(&input, &mut out);
        for &v in &out {
            assert!((-1.0..=1.0).contains(&v));
        }
        // Within a fraction of one step the value moves smoothly.
        let spread = out
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f64, f64::max);
        assert!(spread < 0.05, "max per-sample jump {spread}");
    }

    #[test]
    fn test_rand_const_is_stable_until_reset() {
        let mut node = Node::rand_const(10.0, 20.0, 42);
        let mut out = vec![0.0; 8];
        node.process(&vec![0.0; 8], &mut out);
        let first = out[0];
        assert!((10.0..20.0).contains(&first));
        assert!(out.iter().all(|&v| v == first));

        node.process(&vec![9.0; 8], &mut out);
        assert!(out.iter().all(|&v| v == first), "stable across blocks");
    }

    #[test]
    fn test_exp_rand_in_range() {
        for seed in 0..32 {
            let mut node = Node::exp_rand_const(100.0, 1000.0, seed);
            let mut out = [0.0];
            node.process(&[0.0], &mut out);
            assert!((100.0..=1000.0).contains(&out[0]));
        }
    }

    #[test]
    fn test_event_node_reads_binding() {
        let cell = Arc::new(EventCell::new());
        let mut node = Node::Event {
            cell: cell.clone(),
            field: EventField::Velocity,
        };
        let mut out = [0.0];
        node.process(&[0.0], &mut out);
        assert_eq!(out[0], 0.0);
        cell.bind(crate::params::EventSnapshot {
            velocity: 0.9,
            note_hz: vec![440.0],
        });
        node.process(&[0.0], &mut out);
        assert_eq!(out[0], 0.9);
    }
}
