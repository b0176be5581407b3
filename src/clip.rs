use std::f32::consts::TAU;
use std::fmt;
use std::iter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use rustfft::{FftPlanner, num_complex::Complex};

const SPECTRUM_WINDOW: usize = 4096;

/// PLAY or LOOP asked for an artifact that GENERATE has not produced yet.
#[derive(Debug)]
pub struct MissingArtifact(pub PathBuf);

impl fmt::Display for MissingArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NO SOUND FILE: {}", self.0.display())
    }
}

impl std::error::Error for MissingArtifact {}

/// A decoded artifact, folded down to mono.
#[derive(Clone, Debug)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MissingArtifact(path.to_path_buf()).into());
        }
        let mut reader =
            WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }

    pub fn preview(&self, points: usize) -> ClipPreview {
        let window = &self.samples[..self.samples.len().min(SPECTRUM_WINDOW)];
        ClipPreview {
            waveform: peak_envelope(&self.samples, points),
            spectrum: compute_spectrum(window),
            sample_rate: self.sample_rate as f32,
            seconds: self.seconds(),
        }
    }
}

/// What the scope panel draws for the last generated clip.
#[derive(Clone, Debug, Default)]
pub struct ClipPreview {
    pub waveform: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub sample_rate: f32,
    pub seconds: f32,
}

/// Signed peak per bucket, so quiet tails stay visible at any zoom.
pub fn peak_envelope(samples: &[f32], points: usize) -> Vec<f32> {
    if samples.is_empty() || points == 0 {
        return Vec::new();
    }
    let bucket = samples.len().div_ceil(points);
    samples
        .chunks(bucket)
        .map(|chunk| {
            chunk
                .iter()
                .copied()
                .fold(0.0f32, |peak, s| if s.abs() > peak.abs() { s } else { peak })
        })
        .collect()
}

/// Single-sided amplitude spectrum of a Hann-windowed block, zero padded to
/// the next power of two.
pub fn compute_spectrum(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let size = samples.len().next_power_of_two().max(8);
    let span = samples.len() as f32;
    let mut buffer: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(n, sample)| {
            let hann = 0.5 - 0.5 * (TAU * n as f32 / span).cos();
            Complex::new(sample * hann, 0.0)
        })
        .chain(iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    FftPlanner::new().plan_fft_forward(size).process(&mut buffer);
    // Hann halves the coherent gain, the one-sided fold doubles it back.
    let gain = 4.0 / span;
    buffer[..size / 2].iter().map(|bin| bin.norm() * gain).collect()
}
