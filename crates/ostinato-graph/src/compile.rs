//! Lowering from declarative syntax to a live graph.
//!
//! A straightforward recursive walk: every named cell is appended to the
//! handle index as it is created, so repeated compilation of the same spec
//! yields handle lists of identical length and order. Errors carry the
//! path of the offending node (e.g. `root.compose[1].osc.width`); no
//! partial graph is ever returned.

use crate::adsr::Adsr;
use crate::error::{Error, Result};
use crate::handles::Handles;
use crate::node::Node;
use crate::params::{ChorusCell, ConstCell, ConstShape, EventCell, GateCell, OscCell};
use crate::syntax::{NodeSyntax, PresetSyntax};
use std::collections::HashMap;
use std::sync::Arc;

/// A compiled graph: the root node plus the index of its named cells.
pub struct Compiled {
    pub root: Node,
    pub handles: Handles,
}

impl std::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiled")
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

/// Compile a full preset, resolving its library section first.
pub fn compile_preset(spec: &PresetSyntax, seed: u64) -> Result<Compiled> {
    let root = resolve_library(spec)?;
    compile_node(&root, seed)
}

/// Compile a bare node tree (used for modulator programs).
pub fn compile_node(syntax: &NodeSyntax, seed: u64) -> Result<Compiled> {
    let mut ctx = Context {
        handles: Handles::new(),
        seed,
        counter: 0,
    };
    let root = ctx.lower(syntax, "root")?;
    Ok(Compiled {
        root,
        handles: ctx.handles,
    })
}

/// Inline library references. Entry `k` may only reference entries `< k`,
/// which makes self-references and cycles unrepresentable; violations are
/// reported as invalid specs.
fn resolve_library(spec: &PresetSyntax) -> Result<NodeSyntax> {
    let mut resolved: HashMap<&str, NodeSyntax> = HashMap::new();
    for entry in &spec.library {
        let inlined = inline_refs(&entry.def, &resolved, &format!("library.{}", entry.name))?;
        resolved.insert(entry.name.as_str(), inlined);
    }
    inline_refs(&spec.root, &resolved, "root")
}

fn inline_refs(
    syntax: &NodeSyntax,
    resolved: &HashMap<&str, NodeSyntax>,
    at: &str,
) -> Result<NodeSyntax> {
    let recurse_list = |items: &[NodeSyntax], tag: &str| -> Result<Vec<NodeSyntax>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| inline_refs(item, resolved, &format!("{at}.{tag}[{i}]")))
            .collect()
    };

    Ok(match syntax {
        NodeSyntax::Lib { name } => match resolved.get(name.as_str()) {
            Some(def) => def.clone(),
            None => {
                return Err(Error::SpecInvalid {
                    at: at.to_owned(),
                    reason: format!(
                        "library entry '{name}' is not defined earlier in the library \
                         (forward and cyclic references are not allowed)"
                    ),
                })
            }
        },
        NodeSyntax::Reciprocal { input } => NodeSyntax::Reciprocal {
            input: Box::new(inline_refs(input, resolved, &format!("{at}.reciprocal"))?),
        },
        NodeSyntax::Sum(items) => NodeSyntax::Sum(recurse_list(items, "sum")?),
        NodeSyntax::Prod(items) => NodeSyntax::Prod(recurse_list(items, "prod")?),
        NodeSyntax::Compose(items) => NodeSyntax::Compose(recurse_list(items, "compose")?),
        NodeSyntax::Osc { name, shape, width } => NodeSyntax::Osc {
            name: name.clone(),
            shape: *shape,
            width: match width {
                Some(w) => Some(Box::new(inline_refs(w, resolved, &format!("{at}.osc.width"))?)),
                None => None,
            },
        },
        NodeSyntax::LowPassFilter {
            input,
            cutoff,
            resonance,
        } => NodeSyntax::LowPassFilter {
            input: Box::new(inline_refs(input, resolved, &format!("{at}.lowPassFilter"))?),
            cutoff: Box::new(inline_refs(
                cutoff,
                resolved,
                &format!("{at}.lowPassFilter.cutoff"),
            )?),
            resonance: Box::new(inline_refs(
                resonance,
                resolved,
                &format!("{at}.lowPassFilter.resonance"),
            )?),
        },
        NodeSyntax::Choruser {
            name,
            target,
            cents,
            num_voices,
            input,
        } => NodeSyntax::Choruser {
            name: name.clone(),
            target: target.clone(),
            cents: *cents,
            num_voices: *num_voices,
            input: Box::new(inline_refs(input, resolved, &format!("{at}.choruser"))?),
        },
        NodeSyntax::Crossfade { inputs, mix } => NodeSyntax::Crossfade {
            inputs: recurse_list(inputs, "crossfade")?,
            mix: Box::new(inline_refs(mix, resolved, &format!("{at}.crossfade.mix"))?),
        },
        NodeSyntax::CrossfadeEqPow { inputs, mix } => NodeSyntax::CrossfadeEqPow {
            inputs: recurse_list(inputs, "crossfadeEqPow")?,
            mix: Box::new(inline_refs(
                mix,
                resolved,
                &format!("{at}.crossfadeEqPow.mix"),
            )?),
        },
        NodeSyntax::Gate { input } => NodeSyntax::Gate {
            input: Box::new(inline_refs(input, resolved, &format!("{at}.gate"))?),
        },
        leaf => leaf.clone(),
    })
}

struct Context {
    handles: Handles,
    seed: u64,
    counter: u64,
}

impl Context {
    /// Per-node deterministic RNG seed.
    fn next_seed(&mut self) -> u64 {
        self.counter += 1;
        self.seed.wrapping_mul(0x0100_0000_01b3).wrapping_add(self.counter)
    }

    fn lower(&mut self, syntax: &NodeSyntax, at: &str) -> Result<Node> {
        let node = match syntax {
            NodeSyntax::Identity => Node::Identity,

            NodeSyntax::Const { name, value } => self.lower_const(name, ConstShape::Raw, *value),
            NodeSyntax::ConstOctave { name, value } => {
                self.lower_const(name, ConstShape::Octave, *value)
            }
            NodeSyntax::ConstCent { name, value } => {
                self.lower_const(name, ConstShape::Cent, *value)
            }
            NodeSyntax::ReciprocalConst { name, value } => {
                if *value == 0.0 {
                    return Err(Error::SpecInvalid {
                        at: at.to_owned(),
                        reason: "reciprocalConst of zero".into(),
                    });
                }
                self.lower_const(name, ConstShape::Reciprocal, *value)
            }

            NodeSyntax::Reciprocal { input } => {
                Node::reciprocal(self.lower(input, &format!("{at}.reciprocal"))?)
            }

            NodeSyntax::Sum(items) => {
                Node::sum(self.lower_list(items, at, "sum")?)
            }
            NodeSyntax::Prod(items) => {
                Node::prod(self.lower_list(items, at, "prod")?)
            }
            NodeSyntax::Compose(items) => {
                Node::chain(self.lower_list(items, at, "compose")?)
            }

            NodeSyntax::Osc { name, shape, width } => {
                let width_node = match width {
                    Some(w) => self.lower(w, &format!("{at}.osc.width"))?,
                    None => Node::constant(Arc::new(ConstCell::new(None, ConstShape::Raw, 0.5))),
                };
                let cell = Arc::new(OscCell::new(name.clone(), *shape));
                if let Some(name) = name {
                    self.handles.add_basic_osc(name, cell.clone());
                }
                let seed = self.next_seed();
                Node::osc(cell, width_node, seed)
            }

            NodeSyntax::Envelope {
                name,
                attack,
                decay,
                sustain,
                release,
                scale,
            } => {
                let adsr = Arc::new(Adsr::new(
                    name.clone(),
                    *attack,
                    *decay,
                    *sustain,
                    *release,
                    scale.unwrap_or(1.0),
                ));
                if let Some(name) = name {
                    self.handles.add_adsr(name, adsr.clone());
                }
                Node::Envelope(adsr)
            }

            NodeSyntax::LowPassFilter {
                input,
                cutoff,
                resonance,
            } => {
                let input = self.lower(input, &format!("{at}.lowPassFilter"))?;
                let cutoff = self.lower(cutoff, &format!("{at}.lowPassFilter.cutoff"))?;
                let resonance = self.lower(resonance, &format!("{at}.lowPassFilter.resonance"))?;
                // Rate is propagated before the first process call.
                Node::chain(vec![input, Node::low_pass(cutoff, resonance, 44_100.0)])
            }

            NodeSyntax::Choruser {
                name,
                target,
                cents,
                num_voices,
                input,
            } => self.lower_choruser(name, target, *cents, *num_voices, input, at)?,

            NodeSyntax::Crossfade { inputs, mix } => {
                let inputs = self.lower_list(inputs, at, "crossfade")?;
                let mix = self.lower(mix, &format!("{at}.crossfade.mix"))?;
                Node::crossfade(inputs, mix, false)
            }
            NodeSyntax::CrossfadeEqPow { inputs, mix } => {
                let inputs = self.lower_list(inputs, at, "crossfadeEqPow")?;
                let mix = self.lower(mix, &format!("{at}.crossfadeEqPow.mix"))?;
                Node::crossfade(inputs, mix, true)
            }

            NodeSyntax::NoiseSmoothStep { freq, min, max } => {
                if *freq <= 0.0 {
                    return Err(Error::SpecInvalid {
                        at: at.to_owned(),
                        reason: "noiseSmoothStep freq must be positive".into(),
                    });
                }
                Node::SteppedNoise {
                    freq: *freq,
                    min: *min,
                    max: *max,
                    seed: self.next_seed(),
                }
            }

            NodeSyntax::Rand { min, max } => {
                let seed = self.next_seed();
                Node::rand_const(*min, *max, seed)
            }
            NodeSyntax::ExpRand { min, max } => {
                let seed = self.next_seed();
                Node::exp_rand_const(*min, *max, seed)
            }

            NodeSyntax::Line { duration, from, to } => Node::line(*duration, *from, *to),

            NodeSyntax::Gate { input } => {
                let inner = self.lower(input, &format!("{at}.gate"))?;
                // Spec-authored gates pass through until something closes
                // them; only the preset's lifecycle gate starts closed.
                let cell = Arc::new(GateCell::new());
                cell.set_open(true);
                Node::gate(inner, cell)
            }

            NodeSyntax::Event { field } => {
                let cell = Arc::new(EventCell::new());
                self.handles.add_event(cell.clone());
                Node::Event {
                    cell,
                    field: *field,
                }
            }

            NodeSyntax::Lib { name } => {
                return Err(Error::SpecInvalid {
                    at: at.to_owned(),
                    reason: format!("unresolved library reference '{name}'"),
                })
            }
        };
        Ok(node)
    }

    fn lower_const(&mut self, name: &Option<String>, shape: ConstShape, value: f64) -> Node {
        let cell = Arc::new(ConstCell::new(name.clone(), shape, value));
        if let Some(name) = name {
            self.handles.add_const(name, cell.clone());
        }
        Node::constant(cell)
    }

    fn lower_list(&mut self, items: &[NodeSyntax], at: &str, tag: &str) -> Result<Vec<Node>> {
        if items.is_empty() {
            return Err(Error::SpecInvalid {
                at: at.to_owned(),
                reason: format!("{tag} needs at least one input"),
            });
        }
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.lower(item, &format!("{at}.{tag}[{i}]")))
            .collect()
    }

    /// Compile `num_voices` independent copies of the subtree, capture each
    /// copy's target constants, and hand the detune schedule to a
    /// [`ChorusCell`]. Every copy's handles are merged into the parent so
    /// name-based writes (e.g. "freq") reach all copies.
    fn lower_choruser(
        &mut self,
        name: &Option<String>,
        target: &str,
        cents: f64,
        num_voices: usize,
        input: &NodeSyntax,
        at: &str,
    ) -> Result<Node> {
        if num_voices == 0 {
            return Err(Error::SpecInvalid {
                at: at.to_owned(),
                reason: "choruser numVoices must be at least 1".into(),
            });
        }

        let mut copies = Vec::with_capacity(num_voices);
        let mut captured = Vec::with_capacity(num_voices);
        for i in 0..num_voices {
            let mut copy_ctx = Context {
                handles: Handles::new(),
                seed: self.next_seed(),
                counter: 0,
            };
            let copy = copy_ctx.lower(input, &format!("{at}.choruser[{i}]"))?;
            let targets = copy_ctx
                .handles
                .consts
                .get(target)
                .cloned()
                .unwrap_or_default();
            if targets.is_empty() {
                return Err(Error::MissingResource(format!(
                    "{at}: choruser target const '{target}' not found in its subtree"
                )));
            }
            captured.push(targets);
            copies.push(copy);
            self.handles.merge(copy_ctx.handles);
        }

        let cell = Arc::new(ChorusCell::new(name.clone(), cents, captured));
        if let Some(name) = name {
            self.handles.add_choruser(name, cell.clone());
        }
        Ok(Node::chorus(copies, cell))
    }
}
