//! Iterator combinators for pattern material.
//!
//! All randomness flows through a caller-seeded `SmallRng`, so patterns
//! replay identically for a given seed.

use crate::clock::Clock;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

/// Endless repetition of a list: `x[i mod n]`.
#[derive(Debug, Clone)]
pub struct Cyclic<T> {
    items: Vec<T>,
    idx: usize,
}

impl<T: Clone> Cyclic<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, idx: 0 }
    }
}

impl<T: Clone> Iterator for Cyclic<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items[self.idx % self.items.len()].clone();
        self.idx = (self.idx + 1) % self.items.len();
        Some(item)
    }
}

/// A full random permutation per length-n window: every element appears
/// exactly once before any reappears.
#[derive(Debug, Clone)]
pub struct Shuffled<T> {
    items: Vec<T>,
    order: Vec<usize>,
    pos: usize,
    rng: SmallRng,
}

impl<T: Clone> Shuffled<T> {
    pub fn new(items: Vec<T>, seed: u64) -> Self {
        let mut s = Self {
            order: (0..items.len()).collect(),
            items,
            pos: 0,
            rng: SmallRng::seed_from_u64(seed),
        };
        s.order.shuffle(&mut s.rng);
        s
    }
}

impl<T: Clone> Iterator for Shuffled<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        if self.pos >= self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.pos = 0;
        }
        let item = self.items[self.order[self.pos]].clone();
        self.pos += 1;
        Some(item)
    }
}

/// Uniform choice with replacement.
#[derive(Debug, Clone)]
pub struct RandomPick<T> {
    items: Vec<T>,
    rng: SmallRng,
}

impl<T: Clone> RandomPick<T> {
    pub fn new(items: Vec<T>, seed: u64) -> Self {
        Self {
            items,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl<T: Clone> Iterator for RandomPick<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.items.len());
        Some(self.items[idx].clone())
    }
}

/// Distribution used by [`FloatSampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatDist {
    Uniform,
    /// Gaussian centered mid-range with the range spanning ~4 sigma,
    /// clamped to [min, max].
    Gaussian,
}

/// Endless stream of floats in [min, max].
#[derive(Debug, Clone)]
pub struct FloatSampler {
    min: f64,
    max: f64,
    dist: FloatDist,
    rng: SmallRng,
}

impl FloatSampler {
    pub fn new(min: f64, max: f64, dist: FloatDist, seed: u64) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
            dist,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Iterator for FloatSampler {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.max <= self.min {
            return Some(self.min);
        }
        let v = match self.dist {
            FloatDist::Uniform => self.rng.gen_range(self.min..self.max),
            FloatDist::Gaussian => {
                let mean = (self.min + self.max) / 2.0;
                let sigma = (self.max - self.min) / 4.0;
                match Normal::new(mean, sigma) {
                    Ok(normal) => normal.sample(&mut self.rng),
                    Err(_) => mean,
                }
            }
        };
        Some(v.clamp(self.min, self.max))
    }
}

/// Advances its inner iterator at most once per `interval` seconds of the
/// injected clock; in between it repeats the held value.
pub struct Waiting<I: Iterator> {
    inner: I,
    interval: f64,
    clock: Arc<dyn Clock>,
    last_advance: Option<f64>,
    held: Option<I::Item>,
}

impl<I: Iterator> Waiting<I>
where
    I::Item: Clone,
{
    pub fn new(inner: I, interval: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            interval: interval.max(0.0),
            clock,
            last_advance: None,
            held: None,
        }
    }
}

impl<I: Iterator> Iterator for Waiting<I>
where
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        let now = self.clock.now();
        let due = match self.last_advance {
            None => true,
            Some(at) => now - at >= self.interval,
        };
        if due {
            self.held = self.inner.next();
            self.last_advance = Some(now);
        }
        self.held.clone()
    }
}
