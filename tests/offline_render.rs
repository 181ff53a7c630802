//! End-to-end offline render: engine, pattern thread, offline clock, WAV
//! readback.

use hound::SampleFormat;
use ostinato::Engine;

const PRESET_JSON: &str = r#"
{
    "name": "pluck",
    "root": {
        "prod": [
            { "envelope": { "name": "ampEnv", "attack": 0.005, "decay": 0.02, "sustain": 0.7, "release": 0.05 } },
            {
                "compose": [
                    { "prod": [ { "const": { "name": "freq", "value": 220.0 } }, "identity" ] },
                    { "osc": { "name": "osc1", "shape": "sine" } }
                ]
            }
        ]
    }
}"#;

const PATTERN_JSON: &str = r#"
{
    "name": "pluck",
    "noteGenerator": { "fixed": { "events": [
        { "notes": [ { "midi": 57 } ] },
        { "notes": [ { "midi": 60 }, { "midi": 64 } ] }
    ] } },
    "sustain": { "fixed": 0.1 },
    "gap": { "fixed": 0.05 },
    "numVoices": 4
}"#;

#[test]
fn offline_render_produces_audible_float_stereo() {
    let mut engine = Engine::builder()
        .sample_rate(22_050.0)
        .seed(3)
        .build()
        .unwrap();
    engine.load_preset_json("pluck", PRESET_JSON).unwrap();
    engine.load_pattern_json(PATTERN_JSON).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let frames = engine.render_offline(&path, 1.0).unwrap();
    assert_eq!(frames, 22_050);

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 22_050);
    assert_eq!(spec.bits_per_sample, 32);
    assert_eq!(spec.sample_format, SampleFormat::Float);
    assert_eq!(reader.duration(), 22_050);

    let samples: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 2 * 22_050);

    // The pattern actually sounded.
    let peak = samples.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    assert!(peak > 0.05, "peak {peak}");
    assert!(peak <= 2.0, "two summed unit voices bound the mix: {peak}");

    // Channel 0 is broadcast to channel 1.
    for pair in samples.chunks_exact(2).take(1000) {
        assert_eq!(pair[0], pair[1]);
    }

    // The score ends ~0.3s in; the tail of the file is silence once the
    // gate closed.
    let tail = &samples[samples.len() - 4000..];
    assert!(tail.iter().all(|&v| v.abs() < 1e-6), "tail is gated silence");
}

#[test]
fn offline_render_rejects_missing_preset() {
    let mut engine = Engine::builder().build().unwrap();
    engine.load_pattern_json(PATTERN_JSON).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let err = engine
        .render_offline(&dir.path().join("x.wav"), 0.1)
        .unwrap_err();
    assert!(err.to_string().contains("pluck"));
}
