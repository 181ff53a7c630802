//! Lock-free parameter cells shared between the control and render domains.
//!
//! Every post-compile mutation of the graph flows through one of these
//! cells: the control domain stores, the render callback loads. Stores and
//! loads are single-word relaxed atomics - a parameter transitioning
//! mid-block is audible only at human rate, so no stronger ordering is
//! needed. The render callback never takes a lock.

use arc_swap::ArcSwapOption;
use atomic_float::AtomicF64;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Delay between the last amp envelope closing and the gate actually
/// closing. Absorbs re-attacks during fast trills without an audible click.
pub const GATE_CLOSE_DELAY: f64 = 0.050;

/// Cache-line aligned atomic sample value.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicSample {
    value: AtomicF64,
}

impl AtomicSample {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        self.value.swap(value, Ordering::Relaxed)
    }
}

impl Default for AtomicSample {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::Relaxed)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// How a constant cell maps its stored value to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstShape {
    /// Output the value as-is.
    #[default]
    Raw,
    /// Output `2^v` (octave offset).
    Octave,
    /// Output `2^(v/1200)` (cent offset).
    Cent,
    /// Output `1/v` (zero maps to zero).
    Reciprocal,
}

impl ConstShape {
    #[inline]
    pub fn apply(self, v: f64) -> f64 {
        match self {
            ConstShape::Raw => v,
            ConstShape::Octave => v.exp2(),
            ConstShape::Cent => (v / 1200.0).exp2(),
            ConstShape::Reciprocal => {
                if v == 0.0 {
                    0.0
                } else {
                    v.recip()
                }
            }
        }
    }
}

/// A named constant in the graph.
///
/// `value` is what name-based setters write; `detune` is a multiplicative
/// ratio owned by an enclosing chorus stage. Keeping them separate means a
/// scheduler writing "freq" never compounds with the chorus detune.
#[derive(Debug)]
pub struct ConstCell {
    name: Option<String>,
    shape: ConstShape,
    value: AtomicSample,
    detune: AtomicSample,
}

impl ConstCell {
    pub fn new(name: Option<String>, shape: ConstShape, value: f64) -> Self {
        Self {
            name,
            shape,
            value: AtomicSample::new(value),
            detune: AtomicSample::new(1.0),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn shape(&self) -> ConstShape {
        self.shape
    }

    /// The stored (pre-shape) value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value.get()
    }

    #[inline]
    pub fn set_value(&self, v: f64) {
        self.value.set(v);
    }

    #[inline]
    pub fn set_detune(&self, ratio: f64) {
        self.detune.set(ratio);
    }

    /// The value the graph observes.
    #[inline]
    pub fn read(&self) -> f64 {
        self.shape.apply(self.value.get()) * self.detune.get()
    }
}

/// Gate control shared between envelope callbacks and the render driver.
///
/// Envelope `finish` callbacks request a delayed close; the render driver
/// applies it at the start of the first block past the deadline. A `start`
/// callback cancels any pending close, so a re-attack inside the delay
/// window keeps the gate open.
#[derive(Debug, Default)]
pub struct GateCell {
    open: AtomicFlag,
    close_at: AtomicSample,
    close_pending: AtomicFlag,
}

impl GateCell {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    #[inline]
    pub fn set_open(&self, open: bool) {
        self.open.set(open);
    }

    /// Request a close `GATE_CLOSE_DELAY` seconds after `now`.
    pub fn request_close(&self, now: f64) {
        self.close_at.set(now + GATE_CLOSE_DELAY);
        self.close_pending.set(true);
    }

    pub fn cancel_close(&self) {
        self.close_pending.set(false);
    }

    /// Apply a pending close if its deadline has passed. Called by the
    /// render driver at the start of each block.
    pub fn maybe_close(&self, now: f64) {
        if self.close_pending.get() && now >= self.close_at.get() {
            self.close_pending.set(false);
            self.open.set(false);
        }
    }
}

/// Oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OscShape {
    Sine,
    Triangle,
    Sawtooth,
    Square,
    Noise,
}

impl OscShape {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => OscShape::Sine,
            1 => OscShape::Triangle,
            2 => OscShape::Sawtooth,
            3 => OscShape::Square,
            _ => OscShape::Noise,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            OscShape::Sine => 0,
            OscShape::Triangle => 1,
            OscShape::Sawtooth => 2,
            OscShape::Square => 3,
            OscShape::Noise => 4,
        }
    }
}

/// A named oscillator's mutable state: the waveform can be switched by name
/// while the stream runs.
#[derive(Debug)]
pub struct OscCell {
    name: Option<String>,
    shape: AtomicU8,
}

impl OscCell {
    pub fn new(name: Option<String>, shape: OscShape) -> Self {
        Self {
            name,
            shape: AtomicU8::new(shape.as_u8()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn shape(&self) -> OscShape {
        OscShape::from_u8(self.shape.load(Ordering::Relaxed))
    }

    pub fn set_shape(&self, shape: OscShape) {
        self.shape.store(shape.as_u8(), Ordering::Relaxed);
    }
}

/// Chorus detune control.
///
/// Holds, per detuned copy, the target constant cells captured at compile
/// time. `set_cents` recomputes the symmetric ratios `2^(k*c/1200)` for
/// offsets `k` centered on zero and writes them into the captured cells.
#[derive(Debug)]
pub struct ChorusCell {
    name: Option<String>,
    cents: AtomicSample,
    copies: Vec<Vec<Arc<ConstCell>>>,
}

impl ChorusCell {
    pub fn new(name: Option<String>, cents: f64, copies: Vec<Vec<Arc<ConstCell>>>) -> Self {
        let cell = Self {
            name,
            cents: AtomicSample::new(cents),
            copies,
        };
        cell.apply_detunes();
        cell
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn cents(&self) -> f64 {
        self.cents.get()
    }

    pub fn num_copies(&self) -> usize {
        self.copies.len()
    }

    /// Symmetric offset for copy `i` of `n`: `i - (n-1)/2`.
    pub fn offset(i: usize, n: usize) -> f64 {
        i as f64 - (n as f64 - 1.0) / 2.0
    }

    pub fn set_cents(&self, cents: f64) {
        self.cents.set(cents);
        self.apply_detunes();
    }

    fn apply_detunes(&self) {
        let n = self.copies.len();
        let cents = self.cents.get();
        for (i, cells) in self.copies.iter().enumerate() {
            let ratio = (Self::offset(i, n) * cents / 1200.0).exp2();
            for cell in cells {
                cell.set_detune(ratio);
            }
        }
    }
}

/// Chord data bound to the graph for one event's lifetime.
#[derive(Debug, Clone, Default)]
pub struct EventSnapshot {
    /// Normalized velocity of the chord (0.0 - 1.0).
    pub velocity: f64,
    /// Frequencies of the chord members, ascending not guaranteed.
    pub note_hz: Vec<f64>,
}

impl EventSnapshot {
    pub fn note_count(&self) -> usize {
        self.note_hz.len()
    }

    pub fn lowest_hz(&self) -> f64 {
        self.note_hz.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn highest_hz(&self) -> f64 {
        self.note_hz
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Which event field an event-driven node outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventField {
    Velocity,
    NoteCount,
    LowestHz,
    HighestHz,
}

/// Binding slot for event-driven nodes. The scheduler stores a snapshot
/// here just before evaluating modulators; the graph reads it lock-free.
#[derive(Default)]
pub struct EventCell {
    bound: ArcSwapOption<EventSnapshot>,
}

impl std::fmt::Debug for EventCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCell")
            .field("bound", &self.bound.load().as_deref())
            .finish()
    }
}

impl EventCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, snapshot: EventSnapshot) {
        self.bound.store(Some(Arc::new(snapshot)));
    }

    pub fn clear(&self) {
        self.bound.store(None);
    }

    /// Evaluate `field` against the bound event; 0.0 when nothing is bound
    /// or the chord is empty.
    pub fn read(&self, field: EventField) -> f64 {
        match self.bound.load().as_deref() {
            None => 0.0,
            Some(s) => match field {
                EventField::Velocity => s.velocity,
                EventField::NoteCount => s.note_count() as f64,
                EventField::LowestHz => {
                    if s.note_hz.is_empty() {
                        0.0
                    } else {
                        s.lowest_hz()
                    }
                }
                EventField::HighestHz => {
                    if s.note_hz.is_empty() {
                        0.0
                    } else {
                        s.highest_hz()
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_shapes() {
        assert_eq!(ConstShape::Raw.apply(3.0), 3.0);
        assert_eq!(ConstShape::Octave.apply(1.0), 2.0);
        assert!((ConstShape::Cent.apply(1200.0) - 2.0).abs() < 1e-12);
        assert_eq!(ConstShape::Reciprocal.apply(4.0), 0.25);
        assert_eq!(ConstShape::Reciprocal.apply(0.0), 0.0);
    }

    #[test]
    fn test_const_cell_detune_does_not_compound() {
        let cell = ConstCell::new(Some("freq".into()), ConstShape::Raw, 440.0);
        cell.set_detune(2.0);
        assert!((cell.read() - 880.0).abs() < 1e-9);
        // A scheduler write replaces the value; the detune ratio is stable.
        cell.set_value(220.0);
        assert!((cell.read() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_gate_delayed_close() {
        let gate = GateCell::new();
        gate.set_open(true);
        gate.request_close(1.0);
        gate.maybe_close(1.0);
        assert!(gate.is_open(), "close must wait out the delay");
        gate.maybe_close(1.0 + GATE_CLOSE_DELAY);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_gate_close_cancelled_by_reattack() {
        let gate = GateCell::new();
        gate.set_open(true);
        gate.request_close(0.0);
        gate.cancel_close();
        gate.maybe_close(10.0);
        assert!(gate.is_open());
    }

    #[test]
    fn test_chorus_ratios_symmetric() {
        let mk = || Arc::new(ConstCell::new(Some("freq".into()), ConstShape::Raw, 100.0));
        let copies = vec![vec![mk()], vec![mk()], vec![mk()]];
        let refs: Vec<_> = copies.iter().map(|v| v[0].clone()).collect();
        let _cell = ChorusCell::new(Some("ch".into()), 10.0, copies);

        let low = refs[0].read() / 100.0;
        let mid = refs[1].read() / 100.0;
        let high = refs[2].read() / 100.0;
        assert!((mid - 1.0).abs() < 1e-12);
        assert!((low * high - 1.0).abs() < 1e-12, "detune is symmetric");
        assert!(high > 1.0 && low < 1.0);
    }

    #[test]
    fn test_chorus_zero_cents_is_identity() {
        let cell = Arc::new(ConstCell::new(Some("freq".into()), ConstShape::Raw, 123.0));
        let _ch = ChorusCell::new(None, 0.0, vec![vec![cell.clone()]]);
        assert_eq!(cell.read(), 123.0);
    }

    #[test]
    fn test_event_cell_fields() {
        let cell = EventCell::new();
        assert_eq!(cell.read(EventField::Velocity), 0.0);
        cell.bind(EventSnapshot {
            velocity: 0.75,
            note_hz: vec![220.0, 440.0, 330.0],
        });
        assert_eq!(cell.read(EventField::Velocity), 0.75);
        assert_eq!(cell.read(EventField::NoteCount), 3.0);
        assert_eq!(cell.read(EventField::LowestHz), 220.0);
        assert_eq!(cell.read(EventField::HighestHz), 440.0);
    }
}
