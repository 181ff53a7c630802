//! Command-line host: play a pattern through the speakers or render it to
//! a WAV file.
//!
//! ```text
//! ostinato score.json --resources ./resources
//! ostinato score.json --resources ./resources --duration 30 --output take.wav
//! ```
//!
//! The pattern's `name` selects `<resources>/presets/<name>.json`. Live
//! mode runs until the pattern completes, the optional duration elapses,
//! or Ctrl-C triggers a short fade-out.

use clap::Parser;
use ostinato::{Engine, Error, PatternSyntax, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "ostinato", version, about = "Pattern-driven polyphonic synthesis")]
struct Cli {
    /// Pattern JSON file.
    pattern: PathBuf,

    /// Root directory holding presets/<name>.json.
    #[arg(long)]
    resources: PathBuf,

    /// Seconds to play; required with --output, optional live.
    #[arg(long)]
    duration: Option<f64>,

    /// Render offline to this WAV file instead of the speakers.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Sample rate for offline rendering.
    #[arg(long, default_value_t = 44_100.0)]
    sample_rate: f64,

    /// Seed for pattern randomness.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Polyphony for patterns that don't specify numVoices.
    #[arg(long, default_value_t = 8)]
    voices: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let pattern_json = std::fs::read_to_string(&cli.pattern)?;
    let pattern = PatternSyntax::from_json(&pattern_json)?;

    let preset_path = cli
        .resources
        .join("presets")
        .join(format!("{}.json", pattern.name));
    let preset_json =
        std::fs::read_to_string(&preset_path).map_err(|_| Error::UnknownPreset(pattern.name.clone()))?;

    let mut engine = Engine::builder()
        .sample_rate(cli.sample_rate)
        .default_voices(cli.voices)
        .seed(cli.seed)
        .build()?;
    engine.load_preset_json(pattern.name.clone(), &preset_json)?;
    engine.add_pattern(pattern);

    match cli.output {
        Some(path) => {
            let duration = cli.duration.ok_or(Error::MissingDuration)?;
            let frames = engine.render_offline(&path, duration)?;
            log::info!("done: {frames} frames");
        }
        None => {
            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = interrupted.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .map_err(|e| Error::Signal(e.to_string()))?;
            engine.run_live(cli.duration, interrupted)?;
        }
    }
    Ok(())
}
