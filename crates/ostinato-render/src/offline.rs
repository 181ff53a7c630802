//! Offline rendering to a 32-bit float stereo WAV file.

use crate::driver::BlockRenderer;
use crate::error::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Frames per offline block. Smaller than the live maximum so scheduled
/// events land within ~12 ms of their nominal time.
pub const OFFLINE_BLOCK: usize = 512;

const CHANNELS: usize = 2;

/// Drive `renderer` for `duration` seconds and write the result as
/// interleaved 32-bit float stereo.
///
/// `on_block(seconds)` fires after each rendered block; the engine uses it
/// to advance the offline clock so pattern tasks schedule against rendered
/// time. Progress is logged once per second of produced audio. Returns the
/// number of frames written.
pub fn render_to_wav(
    renderer: &mut BlockRenderer,
    duration: f64,
    path: &Path,
    mut on_block: impl FnMut(f64),
) -> Result<u64> {
    let sample_rate = renderer.sample_rate();
    let total_frames = (duration.max(0.0) * sample_rate).round() as u64;

    let spec = WavSpec {
        channels: CHANNELS as u16,
        sample_rate: sample_rate as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let mut block = vec![0.0f32; OFFLINE_BLOCK * CHANNELS];
    let mut frame: u64 = 0;
    let mut next_report: u64 = sample_rate as u64;

    while frame < total_frames {
        let frames = ((total_frames - frame) as usize).min(OFFLINE_BLOCK);
        let out = &mut block[..frames * CHANNELS];
        renderer.render(frame, out, CHANNELS);
        for &sample in out.iter() {
            writer.write_sample(sample)?;
        }

        frame += frames as u64;
        on_block(frames as f64 / sample_rate);

        if frame >= next_report {
            log::info!(
                "rendered {:.1}s / {:.1}s",
                frame as f64 / sample_rate,
                duration
            );
            next_report += sample_rate as u64;
        }
    }

    writer.finalize()?;
    Ok(total_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_graph::{ConstCell, ConstShape, Node};
    use std::sync::Arc;

    #[test]
    fn test_offline_render_writes_expected_duration() {
        let node = Node::constant(Arc::new(ConstCell::new(None, ConstShape::Raw, 0.5)));
        let mut renderer = BlockRenderer::new(node, vec![], 8000.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let mut advanced = 0.0;
        let frames = render_to_wav(&mut renderer, 0.25, &path, |dt| advanced += dt).unwrap();

        assert_eq!(frames, 2000);
        assert!((advanced - 0.25).abs() < 1e-9, "clock advanced per block");

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(reader.duration(), 2000);

        let samples: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4000);
        assert!(samples.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }
}
