//! ADSR envelope state machine with lifecycle callbacks.
//!
//! The envelope is `Arc`-shared between the compiled graph, the handle
//! index and the enclosing voice bank. Parameter fields are one atomic
//! each, snapshotted at the start of every `value_at` call; stage
//! transitions driven by time happen inside `value_at` on the render
//! thread, while `note_on` / `note_off` flip the stage from the control
//! thread and stamp their time origins from the *next* rendered sample.
//! `value_at` never reads a system clock.

use crate::params::{AtomicFlag, AtomicSample};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Fired when a `note_on` opens the envelope. Control domain.
pub type StartFn = Arc<dyn Fn() + Send + Sync>;

/// Fired exactly once when the release segment completes, with the render
/// time at which it did. Runs on the render thread: bodies must be
/// wait-free (atomic stores, bounded-channel `try_send`).
pub type FinishFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Envelope stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Closed = 0,
    Attack = 1,
    Decay = 2,
    Sustain = 3,
    Release = 4,
}

impl Stage {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Stage::Attack,
            2 => Stage::Decay,
            3 => Stage::Sustain,
            4 => Stage::Release,
            _ => Stage::Closed,
        }
    }
}

/// Parameter snapshot taken once per `value_at` call.
#[derive(Debug, Clone, Copy)]
pub struct AdsrParams {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub scale: f64,
}

/// Partial parameter update for name-based write-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdsrUpdate {
    pub attack: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
    pub scale: Option<f64>,
}

pub struct Adsr {
    name: Option<String>,
    attack: AtomicSample,
    decay: AtomicSample,
    sustain: AtomicSample,
    release: AtomicSample,
    scale: AtomicSample,

    stage: AtomicU8,
    time_origin: AtomicSample,
    release_origin: AtomicSample,
    level_at_release: AtomicSample,
    last_level: AtomicSample,
    origin_pending: AtomicFlag,
    release_pending: AtomicFlag,

    on_start: ArcSwap<Vec<StartFn>>,
    on_finish: ArcSwap<Vec<FinishFn>>,
}

impl std::fmt::Debug for Adsr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adsr")
            .field("name", &self.name)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}

impl Adsr {
    pub fn new(
        name: Option<String>,
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
        scale: f64,
    ) -> Self {
        Self {
            name,
            attack: AtomicSample::new(attack.max(0.0)),
            decay: AtomicSample::new(decay.max(0.0)),
            sustain: AtomicSample::new(sustain),
            release: AtomicSample::new(release.max(0.0)),
            scale: AtomicSample::new(scale),
            stage: AtomicU8::new(Stage::Closed as u8),
            time_origin: AtomicSample::new(0.0),
            release_origin: AtomicSample::new(0.0),
            level_at_release: AtomicSample::new(0.0),
            last_level: AtomicSample::new(0.0),
            origin_pending: AtomicFlag::new(false),
            release_pending: AtomicFlag::new(false),
            on_start: ArcSwap::from_pointee(Vec::new()),
            on_finish: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Relaxed))
    }

    pub fn is_closed(&self) -> bool {
        self.stage() == Stage::Closed
    }

    pub fn params(&self) -> AdsrParams {
        AdsrParams {
            attack: self.attack.get(),
            decay: self.decay.get(),
            sustain: self.sustain.get(),
            release: self.release.get(),
            scale: self.scale.get(),
        }
    }

    pub fn apply(&self, update: &AdsrUpdate) {
        if let Some(v) = update.attack {
            self.attack.set(v.max(0.0));
        }
        if let Some(v) = update.decay {
            self.decay.set(v.max(0.0));
        }
        if let Some(v) = update.sustain {
            self.sustain.set(v);
        }
        if let Some(v) = update.release {
            self.release.set(v.max(0.0));
        }
        if let Some(v) = update.scale {
            self.scale.set(v);
        }
    }

    /// Register a start callback. Registration happens before the stream
    /// starts; the swap keeps render-side reads lock-free.
    pub fn on_start(&self, f: StartFn) {
        let mut v: Vec<StartFn> = self.on_start.load().as_ref().clone();
        v.push(f);
        self.on_start.store(Arc::new(v));
    }

    /// Register a finish callback; callbacks fire in registration order.
    pub fn on_finish(&self, f: FinishFn) {
        let mut v: Vec<FinishFn> = self.on_finish.load().as_ref().clone();
        v.push(f);
        self.on_finish.store(Arc::new(v));
    }

    /// Open the envelope: next `value_at` call stamps its time origin and
    /// the attack ramp starts from zero. Retriggering restarts the attack.
    pub fn note_on(&self) {
        self.origin_pending.set(true);
        self.release_pending.set(false);
        self.last_level.set(0.0);
        self.stage.store(Stage::Attack as u8, Ordering::Relaxed);
        for f in self.on_start.load().iter() {
            f();
        }
    }

    /// Begin the release segment from the most recently observed level.
    /// Ignored when the envelope is already closed or releasing.
    pub fn note_off(&self) {
        match self.stage() {
            Stage::Closed | Stage::Release => return,
            _ => {}
        }
        self.level_at_release.set(self.last_level.get());
        self.release_pending.set(true);
        self.stage.store(Stage::Release as u8, Ordering::Relaxed);
    }

    /// Force-close without firing callbacks.
    pub fn reset(&self) {
        self.stage.store(Stage::Closed as u8, Ordering::Relaxed);
        self.last_level.set(0.0);
        self.origin_pending.set(false);
        self.release_pending.set(false);
    }

    /// Evaluate the envelope at render time `t` (seconds).
    pub fn value_at(&self, t: f64) -> f64 {
        if self.origin_pending.swap(false) {
            self.time_origin.set(t);
        }
        if self.release_pending.swap(false) {
            self.release_origin.set(t);
        }

        let mut stage = self.stage();
        if stage == Stage::Closed {
            return 0.0;
        }

        let p = self.params();
        let u = t - self.time_origin.get();
        let mut level = 0.0;

        if stage == Stage::Attack {
            level = if p.attack <= 0.0 {
                p.scale
            } else {
                p.scale * (u / p.attack).clamp(0.0, 1.0)
            };
            if u >= p.attack {
                stage = Stage::Decay;
                self.stage.store(Stage::Decay as u8, Ordering::Relaxed);
            }
        }
        if stage == Stage::Decay {
            level = if p.decay <= 0.0 {
                p.scale * p.sustain
            } else {
                let d = ((u - p.attack) / p.decay).clamp(0.0, 1.0);
                p.scale * (1.0 + (p.sustain - 1.0) * d)
            };
            if u >= p.attack + p.decay {
                stage = Stage::Sustain;
                self.stage.store(Stage::Sustain as u8, Ordering::Relaxed);
            }
        }
        if stage == Stage::Sustain {
            level = p.scale * p.sustain;
        }
        if stage == Stage::Release {
            let r0 = self.release_origin.get();
            let v0 = self.level_at_release.get();
            level = if p.release <= 0.0 {
                0.0
            } else {
                (v0 * (1.0 - (t - r0) / p.release)).max(0.0)
            };
            if t >= r0 + p.release {
                level = 0.0;
                // compare_exchange guards the exactly-once finish contract
                // against a concurrent note_on.
                if self
                    .stage
                    .compare_exchange(
                        Stage::Release as u8,
                        Stage::Closed as u8,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    self.last_level.set(0.0);
                    for f in self.on_finish.load().iter() {
                        f(t);
                    }
                }
                return 0.0;
            }
        }

        self.last_level.set(level);
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn env() -> Adsr {
        Adsr::new(Some("ampEnv".into()), 1.0, 0.5, 0.5, 1.0, 1.0)
    }

    #[test]
    fn test_closed_envelope_is_silent() {
        let e = env();
        assert_eq!(e.value_at(0.0), 0.0);
        assert_eq!(e.value_at(100.0), 0.0);
        assert_eq!(e.stage(), Stage::Closed);
    }

    #[test]
    fn test_attack_decay_sustain_profile() {
        let e = env();
        e.note_on();

        assert_eq!(e.value_at(100.0), 0.0, "origin stamps at first call");
        let a = e.value_at(100.2);
        let b = e.value_at(100.5);
        assert!(a > 0.0 && b > a);
        assert!((e.value_at(101.0) - 1.0).abs() < 1e-2, "peak at attack end");

        // Mid-decay: scale * (1 + (0.5 - 1) * 0.5)
        assert!((e.value_at(101.25) - 0.75).abs() < 1e-9);
        // Past attack+decay: sustain plateau.
        assert!((e.value_at(102.0) - 0.5).abs() < 0.05);
        assert_eq!(e.stage(), Stage::Sustain);
        assert!((e.value_at(150.0) - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_release_ramp_and_finish_once() {
        let e = env();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        e.on_finish(Arc::new(move |_t| {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));

        e.note_on();
        e.value_at(0.0);
        e.value_at(2.0); // sustain at 0.5

        e.note_off();
        let v0 = e.value_at(10.0);
        assert!((v0 - 0.5).abs() < 1e-9, "release starts at held level");
        let v1 = e.value_at(10.5);
        assert!(v1 < v0 && v1 > 0.0);

        assert_eq!(e.value_at(11.0), 0.0);
        assert_eq!(e.stage(), Stage::Closed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Further evaluation stays closed and never re-fires.
        assert_eq!(e.value_at(12.0), 0.0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_note_off_during_attack_releases_from_current_level() {
        let e = env();
        e.note_on();
        e.value_at(0.0);
        let mid = e.value_at(0.4); // mid-attack, 0.4
        assert!((mid - 0.4).abs() < 1e-9);

        e.note_off();
        let v = e.value_at(0.4);
        assert!((v - 0.4).abs() < 1e-9);
        let half = e.value_at(0.9);
        assert!((half - 0.2).abs() < 1e-9, "linear release from held level");
    }

    #[test]
    fn test_retrigger_restarts_attack() {
        let e = env();
        e.note_on();
        e.value_at(0.0);
        e.value_at(2.0);
        e.note_off();
        e.value_at(3.0);

        e.note_on();
        assert_eq!(e.stage(), Stage::Attack);
        assert_eq!(e.value_at(5.0), 0.0, "attack restarts from zero");
        assert!(e.value_at(5.5) > 0.0);
    }

    #[test]
    fn test_finish_callbacks_fire_in_registration_order() {
        let e = Adsr::new(None, 0.0, 0.0, 1.0, 0.1, 1.0);
        let order = Arc::new(TagLog::default());
        for tag in [1usize, 2, 3] {
            let log = order.clone();
            e.on_finish(Arc::new(move |_| {
                log.push(tag);
            }));
        }
        e.note_on();
        e.value_at(0.0);
        e.note_off();
        e.value_at(1.0); // stamps the release origin
        e.value_at(1.1); // release complete, callbacks fire
        assert_eq!(order.take(), vec![1, 2, 3]);
    }

    // Tiny append log for callback-order assertions.
    #[derive(Default)]
    struct TagLog(std::sync::Mutex<Vec<usize>>);
    impl TagLog {
        fn push(&self, v: usize) {
            self.0.lock().unwrap().push(v);
        }
        fn take(&self) -> Vec<usize> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_duplicate_note_off_is_ignored() {
        let e = env();
        e.note_on();
        e.value_at(0.0);
        e.value_at(2.0);
        e.note_off();
        e.value_at(3.0);
        let v = e.value_at(3.4);
        e.note_off(); // must not re-stamp the release origin
        let w = e.value_at(3.5);
        assert!(w < v);
    }
}
