use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::rhythm::onset_strength;
use super::stft::{centred_frame, frame_count, hann_window, Padding, POWER_FLOOR};
use super::{ensure_usable, hop_seconds, FeatureResult, FrameSeries, NoiseProfile};
use crate::audio::AudioSample;
use crate::config::AnalysisConfig;
use crate::error::ComputeError;

/// Magnitudes at or below this count as zero (and therefore positive).
const ZERO_THRESHOLD: f32 = 1e-10;

/// Fraction of adjacent sample pairs whose sign differs, per centred frame.
pub fn compute_zero_crossing_rate(
    sample: &AudioSample,
    config: &AnalysisConfig,
) -> Result<FeatureResult, ComputeError> {
    ensure_usable(sample, config)?;

    let samples = sample.samples();
    let values = (0..frame_count(samples.len(), config.hop_length))
        .map(|idx| {
            let frame = centred_frame(samples, idx, config.n_fft, config.hop_length, Padding::Edge);
            let crossings = frame
                .windows(2)
                .filter(|pair| is_negative(pair[0]) != is_negative(pair[1]))
                .count();
            crossings as f32 / config.n_fft as f32
        })
        .collect();

    Ok(FeatureResult::ZeroCrossingRate(FrameSeries {
        values,
        hop_seconds: hop_seconds(sample, config),
    }))
}

fn is_negative(x: f32) -> bool {
    x < -ZERO_THRESHOLD
}

/// Per-frame noise and distortion indicators.
///
/// A frame is flagged when more than `clip_ratio_threshold` of its samples sit
/// at or above `clip_level`, or when its spectral flatness exceeds
/// `flatness_threshold`. Frames at or below the silence floor are never flagged.
pub fn compute_noise(sample: &AudioSample, config: &AnalysisConfig) -> Result<FeatureResult, ComputeError> {
    ensure_usable(sample, config)?;

    let samples = sample.samples();
    let n_fft = config.n_fft;
    let window = hann_window(n_fft);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
    let bins = n_fft / 2 + 1;

    let per_frame: Vec<(f32, f32, bool)> = (0..frame_count(samples.len(), config.hop_length))
        .into_par_iter()
        .map(|idx| {
            let frame = centred_frame(samples, idx, n_fft, config.hop_length, Padding::Zero);

            let clipped = frame.iter().filter(|s| s.abs() >= config.clip_level).count();
            let clip_ratio = clipped as f32 / n_fft as f32;

            let rms = (frame.iter().map(|s| s * s).sum::<f32>() / n_fft as f32).sqrt();
            if rms <= config.silence_floor {
                return (0.0, clip_ratio, false);
            }

            let mut buffer: Vec<Complex<f32>> = frame
                .iter()
                .zip(window.iter())
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            let flatness = spectral_flatness(buffer[..bins].iter().map(|c| c.norm_sqr()));

            let flagged = clip_ratio > config.clip_ratio_threshold || flatness > config.flatness_threshold;
            (flatness, clip_ratio, flagged)
        })
        .collect();

    let hop = hop_seconds(sample, config);
    let onset = if sample.peak() > config.silence_floor {
        onset_strength(sample, config)
    } else {
        vec![0.0; per_frame.len()]
    };

    Ok(FeatureResult::Noise(NoiseProfile {
        onset_strength: FrameSeries {
            values: onset,
            hop_seconds: hop,
        },
        flatness: FrameSeries {
            values: per_frame.iter().map(|f| f.0).collect(),
            hop_seconds: hop,
        },
        clip_ratio: FrameSeries {
            values: per_frame.iter().map(|f| f.1).collect(),
            hop_seconds: hop,
        },
        flagged: per_frame.iter().map(|f| f.2).collect(),
    }))
}

/// Geometric over arithmetic mean of a power spectrum.
fn spectral_flatness(power: impl Iterator<Item = f32>) -> f32 {
    let (mut log_sum, mut sum, mut n) = (0.0f64, 0.0f64, 0usize);
    for p in power {
        let p = p.max(POWER_FLOOR) as f64;
        log_sum += p.ln();
        sum += p;
        n += 1;
    }
    if n == 0 || sum <= 0.0 {
        return 0.0;
    }
    ((log_sum / n as f64).exp() / (sum / n as f64)) as f32
}
