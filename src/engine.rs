//! Top-level engine coordinating presets, patterns and the render path.

use crate::error::{Error, Result};
use ostinato_graph::{GateCell, Node, PresetSyntax};
use ostinato_pattern::{Clock, OfflineClock, Pattern, PatternHandle, PatternSyntax, SystemClock};
use ostinato_render::{render_to_wav, BlockRenderer, LiveOutput};
use ostinato_synth::Preset;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seconds the live shutdown path waits for release tails after
/// cancelling schedulers.
const FADE_OUT: f64 = 0.5;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Offline sample rate; live playback follows the device.
    pub sample_rate: f64,
    /// Polyphony for patterns that don't specify `numVoices`.
    pub default_voices: usize,
    /// Seed for all pattern and graph randomness.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            default_voices: 8,
            seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384_000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.default_voices == 0 {
            return Err(Error::InvalidConfig(
                "default_voices must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`Engine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.sample_rate = rate;
        self
    }

    pub fn default_voices(mut self, voices: usize) -> Self {
        self.config.default_voices = voices;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        Ok(Engine {
            config: self.config,
            presets: HashMap::new(),
            patterns: Vec::new(),
        })
    }
}

/// A materialized session: the mixed render graph plus one
/// (pattern, preset) pair per loaded pattern, ready to spawn.
struct Session {
    renderer: BlockRenderer,
    players: Vec<(Pattern, Arc<Mutex<Preset>>)>,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    presets: HashMap<String, PresetSyntax>,
    patterns: Vec<PatternSyntax>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an instrument spec under `name`; patterns reference it by
    /// that name.
    pub fn add_preset(&mut self, name: impl Into<String>, spec: PresetSyntax) {
        self.presets.insert(name.into(), spec);
    }

    pub fn load_preset_json(&mut self, name: impl Into<String>, json: &str) -> Result<()> {
        let spec = PresetSyntax::from_json(json)?;
        self.add_preset(name, spec);
        Ok(())
    }

    pub fn add_pattern(&mut self, pattern: PatternSyntax) {
        self.patterns.push(pattern);
    }

    pub fn load_pattern_json(&mut self, json: &str) -> Result<()> {
        let pattern = PatternSyntax::from_json(json)?;
        self.add_pattern(pattern);
        Ok(())
    }

    /// Compile every pattern's preset at `sample_rate` and mix their gated
    /// roots into one renderer.
    fn materialize(&self, sample_rate: f64, clock: Arc<dyn Clock>) -> Result<Session> {
        let mut roots: Vec<Node> = Vec::new();
        let mut gates: Vec<Arc<GateCell>> = Vec::new();
        let mut players = Vec::new();

        for (i, syntax) in self.patterns.iter().enumerate() {
            let spec = self
                .presets
                .get(&syntax.name)
                .ok_or_else(|| Error::UnknownPreset(syntax.name.clone()))?;
            let voices = syntax.num_voices.unwrap_or(self.config.default_voices);
            let seed = self.config.seed.wrapping_add((i as u64) << 32);

            let (preset, root) = Preset::build(&syntax.name, spec, voices, sample_rate, seed)?;
            let pattern = Pattern::from_syntax(syntax, seed ^ 0xa5a5, clock.clone())?;

            gates.push(preset.gate());
            roots.push(root);
            players.push((pattern, Arc::new(Mutex::new(preset))));
        }

        let mix = match roots.len() {
            1 => roots.pop().expect("one root"),
            _ => Node::sum(roots),
        };
        Ok(Session {
            renderer: BlockRenderer::new(mix, gates, sample_rate),
            players,
        })
    }

    /// Play through the speakers. With a duration the call returns after
    /// that many seconds; otherwise it runs until every pattern completes
    /// or `interrupted` is set (Ctrl-C). Shutdown cancels the schedulers,
    /// which issue their outstanding note-offs, and waits out the release
    /// tails before dropping the stream.
    pub fn run_live(&self, duration: Option<f64>, interrupted: Arc<AtomicBool>) -> Result<()> {
        let device_rate = LiveOutput::device_sample_rate(None)?;
        let clock = Arc::new(SystemClock::new());
        let session = self.materialize(device_rate, clock.clone())?;

        let handles: Vec<PatternHandle> = session
            .players
            .into_iter()
            .map(|(pattern, preset)| pattern.spawn(preset, clock.clone() as Arc<dyn Clock>))
            .collect();

        let output = LiveOutput::start(session.renderer, None)?;
        log::info!(
            "playing {} pattern(s) at {} Hz",
            handles.len(),
            output.sample_rate()
        );

        let started = Instant::now();
        loop {
            if interrupted.load(Ordering::Relaxed) {
                log::info!("interrupted, fading out");
                break;
            }
            match duration {
                Some(secs) if started.elapsed().as_secs_f64() >= secs => break,
                None if handles.iter().all(|h| h.is_finished()) => break,
                _ => std::thread::sleep(Duration::from_millis(50)),
            }
        }

        for handle in &handles {
            handle.cancel();
        }
        // Let the cancelled schedulers' note-offs ring out.
        std::thread::sleep(Duration::from_secs_f64(FADE_OUT));
        for handle in handles {
            handle.join();
        }
        Ok(())
    }

    /// Render `duration` seconds to a 32-bit float stereo WAV file at the
    /// configured sample rate. Pattern tasks run against an offline clock
    /// advanced once per rendered block.
    pub fn render_offline(&self, path: &Path, duration: f64) -> Result<u64> {
        let clock = Arc::new(OfflineClock::new());
        let mut session = self.materialize(self.config.sample_rate, clock.clone())?;

        let handles: Vec<PatternHandle> = session
            .players
            .into_iter()
            .map(|(pattern, preset)| pattern.spawn(preset, clock.clone() as Arc<dyn Clock>))
            .collect();

        // Give the pattern tasks a moment to issue their first events.
        std::thread::sleep(Duration::from_millis(5));

        let frames = render_to_wav(&mut session.renderer, duration, path, |dt| {
            clock.advance(dt)
        })?;

        for handle in &handles {
            handle.cancel();
        }
        for handle in handles {
            handle.join();
        }
        log::info!("wrote {} frames to {}", frames, path.display());
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_validates_rate() {
        assert!(Engine::builder().sample_rate(100.0).build().is_err());
        assert!(Engine::builder().sample_rate(48_000.0).build().is_ok());
    }

    #[test]
    fn test_builder_validates_voices() {
        assert!(Engine::builder().default_voices(0).build().is_err());
    }

    #[test]
    fn test_unknown_preset_reported() {
        let mut engine = Engine::builder().build().unwrap();
        engine
            .load_pattern_json(
                r#"{ "name": "ghost", "noteGenerator": { "fixed": { "events": [] } } }"#,
            )
            .unwrap();
        let clock = Arc::new(OfflineClock::new());
        let err = engine.materialize(44_100.0, clock).err().unwrap();
        assert!(matches!(err, Error::UnknownPreset(ref n) if n == "ghost"));
    }
}
