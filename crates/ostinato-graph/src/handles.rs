//! Name-keyed handle index over a compiled graph.
//!
//! Compilation records every named cell here; after compile the maps are
//! read-only and name-based setters are the sole mechanism for mutating
//! graph parameters. Setters return whether any handle was written, so a
//! misspelled name is observable instead of failing silently.

use crate::adsr::{Adsr, AdsrUpdate};
use crate::params::{ChorusCell, ConstCell, EventCell, OscCell, OscShape};
use std::collections::HashMap;
use std::sync::Arc;

/// Kind tag for parameter catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Const,
    Envelope,
    Oscillator,
    Choruser,
}

/// One user-facing parameter discovered at compile time.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    pub id: String,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

/// Name → ordered handle lists for every mutable cell in a compiled graph.
#[derive(Debug, Default)]
pub struct Handles {
    pub consts: HashMap<String, Vec<Arc<ConstCell>>>,
    pub adsrs: HashMap<String, Vec<Arc<Adsr>>>,
    pub oscs: HashMap<String, Vec<Arc<OscCell>>>,
    pub basic_oscs: HashMap<String, Vec<Arc<OscCell>>>,
    pub chorusers: HashMap<String, Vec<Arc<ChorusCell>>>,
    /// Event binding slots, in compile order; not name-addressed.
    pub events: Vec<Arc<EventCell>>,
}

impl Handles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_const(&mut self, name: &str, cell: Arc<ConstCell>) {
        self.consts.entry(name.to_owned()).or_default().push(cell);
    }

    pub fn add_adsr(&mut self, name: &str, adsr: Arc<Adsr>) {
        self.adsrs.entry(name.to_owned()).or_default().push(adsr);
    }

    pub fn add_basic_osc(&mut self, name: &str, cell: Arc<OscCell>) {
        self.basic_oscs
            .entry(name.to_owned())
            .or_default()
            .push(cell);
    }

    pub fn add_choruser(&mut self, name: &str, cell: Arc<ChorusCell>) {
        self.chorusers
            .entry(name.to_owned())
            .or_default()
            .push(cell);
    }

    pub fn add_event(&mut self, cell: Arc<EventCell>) {
        self.events.push(cell);
    }

    /// Concatenate another index into this one, per name, preserving
    /// insertion order. Duplicate names are expected (one entry per voice).
    pub fn merge(&mut self, other: Handles) {
        for (name, mut cells) in other.consts {
            self.consts.entry(name).or_default().append(&mut cells);
        }
        for (name, mut cells) in other.adsrs {
            self.adsrs.entry(name).or_default().append(&mut cells);
        }
        for (name, mut cells) in other.oscs {
            self.oscs.entry(name).or_default().append(&mut cells);
        }
        for (name, mut cells) in other.basic_oscs {
            self.basic_oscs.entry(name).or_default().append(&mut cells);
        }
        for (name, mut cells) in other.chorusers {
            self.chorusers.entry(name).or_default().append(&mut cells);
        }
        self.events.extend(other.events);
    }

    /// Write `value` into every constant named `name`.
    pub fn set_const(&self, name: &str, value: f64) -> bool {
        match self.consts.get(name) {
            Some(cells) if !cells.is_empty() => {
                for cell in cells {
                    cell.set_value(value);
                }
                true
            }
            _ => false,
        }
    }

    /// Apply a partial ADSR update to every envelope named `name`.
    pub fn set_adsr(&self, name: &str, update: &AdsrUpdate) -> bool {
        match self.adsrs.get(name) {
            Some(envs) if !envs.is_empty() => {
                for env in envs {
                    env.apply(update);
                }
                true
            }
            _ => false,
        }
    }

    /// Switch the waveform of every oscillator named `name`. Both
    /// oscillator maps are consulted; either registration site behaves the
    /// same.
    pub fn set_osc_shape(&self, name: &str, shape: OscShape) -> bool {
        let mut wrote = false;
        for map in [&self.oscs, &self.basic_oscs] {
            if let Some(cells) = map.get(name) {
                for cell in cells {
                    cell.set_shape(shape);
                    wrote = true;
                }
            }
        }
        wrote
    }

    /// Re-detune every chorus stage named `name`.
    pub fn set_choruser_cents(&self, name: &str, cents: f64) -> bool {
        match self.chorusers.get(name) {
            Some(cells) if !cells.is_empty() => {
                for cell in cells {
                    cell.set_cents(cents);
                }
                true
            }
            _ => false,
        }
    }

    /// First envelope list under `name`, for lifecycle wiring.
    pub fn adsrs_named(&self, name: &str) -> &[Arc<Adsr>] {
        self.adsrs.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Walk the index once and produce the user-facing parameter catalog.
    ///
    /// Frequency-like constants get a logarithmic audio range; everything
    /// else gets a linear range around its compiled default.
    pub fn catalog(&self) -> Vec<ParamDescriptor> {
        let mut out = Vec::new();
        let mut const_names: Vec<&String> = self.consts.keys().collect();
        const_names.sort();
        for name in const_names {
            let cells = &self.consts[name];
            let default = cells.first().map(|c| c.value()).unwrap_or(0.0);
            let (min, max) = if is_freq_like(name) {
                (20.0, 20_000.0)
            } else if default.abs() <= 1.0 {
                (0.0, 1.0)
            } else {
                (0.0, default.abs() * 2.0)
            };
            out.push(ParamDescriptor {
                id: name.clone(),
                kind: ParamKind::Const,
                min,
                max,
                default,
            });
        }

        let mut adsr_names: Vec<&String> = self.adsrs.keys().collect();
        adsr_names.sort();
        for name in adsr_names {
            let default = self.adsrs[name]
                .first()
                .map(|e| e.params().scale)
                .unwrap_or(1.0);
            out.push(ParamDescriptor {
                id: name.clone(),
                kind: ParamKind::Envelope,
                min: 0.0,
                max: default.abs().max(1.0),
                default,
            });
        }

        let mut osc_names: Vec<&String> = self.oscs.keys().chain(self.basic_oscs.keys()).collect();
        osc_names.sort();
        osc_names.dedup();
        for name in osc_names {
            out.push(ParamDescriptor {
                id: name.clone(),
                kind: ParamKind::Oscillator,
                min: 0.0,
                max: 4.0,
                default: 0.0,
            });
        }

        let mut chorus_names: Vec<&String> = self.chorusers.keys().collect();
        chorus_names.sort();
        for name in chorus_names {
            let default = self.chorusers[name]
                .first()
                .map(|c| c.cents())
                .unwrap_or(0.0);
            out.push(ParamDescriptor {
                id: name.clone(),
                kind: ParamKind::Choruser,
                min: 0.0,
                max: 100.0,
                default,
            });
        }
        out
    }
}

fn is_freq_like(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("freq") || lower.contains("cutoff")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ConstShape;

    fn cc(name: &str, v: f64) -> Arc<ConstCell> {
        Arc::new(ConstCell::new(Some(name.into()), ConstShape::Raw, v))
    }

    #[test]
    fn test_set_const_write_through() {
        let mut handles = Handles::new();
        let a = cc("freq", 440.0);
        let b = cc("freq", 440.0);
        handles.add_const("freq", a.clone());
        handles.add_const("freq", b.clone());

        assert!(handles.set_const("freq", 880.0));
        assert_eq!(a.value(), 880.0);
        assert_eq!(b.value(), 880.0);

        assert!(!handles.set_const("nope", 1.0), "unknown name reports false");
    }

    #[test]
    fn test_merge_concatenates_per_name() {
        let mut left = Handles::new();
        left.add_const("freq", cc("freq", 1.0));
        let mut right = Handles::new();
        right.add_const("freq", cc("freq", 2.0));
        right.add_const("amp", cc("amp", 0.5));

        left.merge(right);
        assert_eq!(left.consts["freq"].len(), 2);
        assert_eq!(left.consts["freq"][0].value(), 1.0);
        assert_eq!(left.consts["freq"][1].value(), 2.0);
        assert_eq!(left.consts["amp"].len(), 1);
    }

    #[test]
    fn test_catalog_lists_named_params() {
        let mut handles = Handles::new();
        handles.add_const("freq", cc("freq", 440.0));
        handles.add_const("mix", cc("mix", 0.3));
        handles.add_adsr("ampEnv", Arc::new(Adsr::new(Some("ampEnv".into()), 0.1, 0.1, 0.5, 0.2, 1.0)));

        let catalog = handles.catalog();
        assert_eq!(catalog.len(), 3);
        let freq = catalog.iter().find(|d| d.id == "freq").unwrap();
        assert_eq!(freq.kind, ParamKind::Const);
        assert_eq!(freq.min, 20.0);
        assert_eq!(freq.default, 440.0);
        let mix = catalog.iter().find(|d| d.id == "mix").unwrap();
        assert_eq!((mix.min, mix.max), (0.0, 1.0));
        assert!(catalog.iter().any(|d| d.kind == ParamKind::Envelope));
    }
}
