use std::path::Path;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use cpal::{
    SampleFormat, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use log::{debug, error};

use crate::clip::Clip;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DRAIN_GRACE: Duration = Duration::from_millis(250);

type SharedCursor = Arc<Mutex<PlaybackCursor>>;

/// Walks a mono clip at the device rate.
pub struct PlaybackCursor {
    samples: Vec<f32>,
    position: f64,
    step: f64,
    finished: Arc<AtomicBool>,
}

impl PlaybackCursor {
    pub fn new(clip: Clip, device_rate: u32) -> Self {
        let step = clip.sample_rate as f64 / device_rate.max(1) as f64;
        Self {
            samples: clip.samples,
            position: 0.0,
            step,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    /// Nearest-sample resampling; silence once the clip has run out.
    pub fn next_sample(&mut self) -> f32 {
        match self.samples.get(self.position as usize) {
            Some(sample) => {
                self.position += self.step;
                *sample
            }
            None => {
                self.finished.store(true, Ordering::Release);
                0.0
            }
        }
    }
}

/// Plays artifacts on the default output device.
#[derive(Clone, Debug, Default)]
pub struct ClipPlayer;

impl ClipPlayer {
    pub fn new() -> Self {
        Self
    }

    /// Blocks until the clip has been played out.
    pub fn play(&self, path: &Path) -> Result<()> {
        let clip = Clip::load(path)?;
        let expected = Duration::from_secs_f32(clip.seconds());

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default audio output"))?;
        let supported = device.default_output_config()?;
        let config = supported.config();
        let cursor = PlaybackCursor::new(clip, config.sample_rate.0);
        let finished = cursor.finished_flag();
        let cursor = Arc::new(Mutex::new(cursor));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream_f32(&device, &config, cursor)?,
            SampleFormat::I16 => build_stream_i16(&device, &config, cursor)?,
            SampleFormat::U16 => build_stream_u16(&device, &config, cursor)?,
            _ => build_stream_f32(&device, &config, cursor)?,
        };
        stream.play()?;
        debug!("playing {} ({:.2}s)", path.display(), expected.as_secs_f32());

        let deadline = Instant::now() + expected + DRAIN_GRACE * 4;
        while !finished.load(Ordering::Acquire) {
            if Instant::now() > deadline {
                return Err(anyhow!("audio device stopped consuming samples"));
            }
            thread::sleep(POLL_INTERVAL);
        }
        thread::sleep(DRAIN_GRACE);
        Ok(())
    }
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    cursor: SharedCursor,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [f32], _| {
            fill_output_buffer(output, channels, &cursor, |sample| sample);
        },
        move |err| error!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_stream_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    cursor: SharedCursor,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [i16], _| {
            fill_output_buffer(output, channels, &cursor, |sample| {
                (sample * i16::MAX as f32) as i16
            });
        },
        move |err| error!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_stream_u16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    cursor: SharedCursor,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [u16], _| {
            fill_output_buffer(output, channels, &cursor, |sample| {
                let scaled = (sample * 0.5 + 0.5).clamp(0.0, 1.0);
                (scaled * u16::MAX as f32) as u16
            });
        },
        move |err| error!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn fill_output_buffer<T, F>(output: &mut [T], channels: usize, cursor: &SharedCursor, mut convert: F)
where
    F: FnMut(f32) -> T,
    T: Copy,
{
    let Ok(mut cursor) = cursor.lock() else {
        return;
    };
    for frame in output.chunks_mut(channels.max(1)) {
        let value = convert(cursor.next_sample().clamp(-0.98, 0.98));
        for channel in frame {
            *channel = value;
        }
    }
}
