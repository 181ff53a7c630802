//! CPAL live output.
//!
//! Negotiates a device, builds the stream for its native sample format and
//! hands the callback to a [`BlockRenderer`]. The callback's only work is
//! pulling blocks of at most `MAX_BLOCK` frames; a panic inside the pull
//! is caught and answered with silence so the device never starves.

use crate::error::{Error, Result};
use crate::driver::BlockRenderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ostinato_graph::MAX_BLOCK;

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. This is safe
/// because the stream is only dropped from the thread that owns
/// `LiveOutput`'s enclosing engine.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

/// A running audio stream.
pub struct LiveOutput {
    sample_rate: f64,
    channels: usize,
    _stream: StreamHandle,
}

impl LiveOutput {
    /// Sample rate the default (or indexed) output device will run at.
    /// Graphs must be compiled against this before starting the stream.
    pub fn device_sample_rate(device_index: Option<usize>) -> Result<f64> {
        let device = get_device(device_index)?;
        let config = device.default_output_config()?;
        Ok(config.sample_rate().0 as f64)
    }

    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
            .collect()
    }

    /// Start pulling `renderer` into the device.
    pub fn start(renderer: BlockRenderer, device_index: Option<usize>) -> Result<LiveOutput> {
        let device = get_device(device_index)?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0 as f64;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), renderer)?,
            format => {
                return Err(Error::UnsupportedFormat(format!("{format:?}")));
            }
        };

        stream.play()?;
        log::info!("live output started: {sample_rate} Hz, {channels} channels");

        Ok(LiveOutput {
            sample_rate,
            channels,
            _stream: StreamHandle(stream),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("no output device available".into())),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: BlockRenderer,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;

    // Pre-allocated intermediate buffer; the callback never allocates.
    let mut inter = vec![0.0f32; MAX_BLOCK * channels];
    let mut next_frame: u64 = 0;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let total_frames = data.len() / channels;
                let mut done = 0usize;
                while done < total_frames {
                    let chunk = (total_frames - done).min(MAX_BLOCK);
                    let inter = &mut inter[..chunk * channels];
                    renderer.render(next_frame, inter, channels);
                    let out = &mut data[done * channels..(done + chunk) * channels];
                    for (dst, &src) in out.iter_mut().zip(inter.iter()) {
                        *dst = T::from_sample(src);
                    }
                    next_frame += chunk as u64;
                    done += chunk;
                }
            }));

            if result.is_err() {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }
        },
        |err| log::warn!("audio stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
