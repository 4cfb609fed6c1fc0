//! Feature extraction.
//!
//! Every feature is a plain function over the shared, immutable
//! [`AudioSample`]. None of them reads another feature's output, so the
//! registry can be evaluated in any order or in parallel.

pub mod mel;
pub mod rhythm;
pub mod signal;
pub mod spectral;
pub mod stft;
pub mod timbre;

use rayon::prelude::*;
use serde::Deserialize;
use std::time::Instant;

use crate::audio::AudioSample;
use crate::config::AnalysisConfig;
use crate::error::ComputeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    Waveform,
    Spectrogram,
    Tempo,
    Mfcc,
    Chroma,
    ZeroCrossingRate,
    Noise,
    FrequencyBalance,
    SpectralCentroid,
}

impl FeatureKind {
    /// Grid order, row-major.
    pub const ALL: [FeatureKind; 9] = [
        FeatureKind::Waveform,
        FeatureKind::Spectrogram,
        FeatureKind::Tempo,
        FeatureKind::Mfcc,
        FeatureKind::Chroma,
        FeatureKind::ZeroCrossingRate,
        FeatureKind::Noise,
        FeatureKind::FrequencyBalance,
        FeatureKind::SpectralCentroid,
    ];

    pub fn title(self) -> &'static str {
        match self {
            FeatureKind::Waveform => "Waveform",
            FeatureKind::Spectrogram => "Spectrogram",
            FeatureKind::Tempo => "Tempo",
            FeatureKind::Mfcc => "MFCC",
            FeatureKind::Chroma => "Chroma Feature",
            FeatureKind::ZeroCrossingRate => "Zero Crossing Rate",
            FeatureKind::Noise => "Noise and Distortion Detection",
            FeatureKind::FrequencyBalance => "Frequency Balance",
            FeatureKind::SpectralCentroid => "Spectral Centroid (Timbre)",
        }
    }
}

/// A per-frame scalar track. Frame `i` is centred at `i * hop_seconds`.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSeries {
    pub values: Vec<f32>,
    pub hop_seconds: f32,
}

/// A feature matrix, `rows[r][frame]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: Vec<Vec<f32>>,
    pub hop_seconds: f32,
}

impl Matrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_frames(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.rows
            .iter()
            .flatten()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spectrogram {
    /// Magnitude in dB relative to the loudest bin, `rows[bin][frame]`.
    pub db: Matrix,
    pub bin_hz: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f32,
    /// Normalized autocorrelation at the winning lag, 0 when nothing periodic was found.
    pub confidence: f32,
    /// Strongest local maxima, best first.
    pub candidates: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NoiseProfile {
    pub onset_strength: FrameSeries,
    pub flatness: FrameSeries,
    pub clip_ratio: FrameSeries,
    pub flagged: Vec<bool>,
}

impl NoiseProfile {
    pub fn flagged_fraction(&self) -> f32 {
        if self.flagged.is_empty() {
            return 0.0;
        }
        self.flagged.iter().filter(|&&f| f).count() as f32 / self.flagged.len() as f32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub low_hz: f32,
    pub high_hz: Option<f32>,
    /// Mean level relative to the band's loudest bin. `None` when no FFT bin falls in the band.
    pub mean_db: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CentroidTrack {
    /// `None` marks a frame without spectral energy.
    pub hz: Vec<Option<f32>>,
    pub hop_seconds: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeatureResult {
    Waveform(Waveform),
    Spectrogram(Spectrogram),
    Tempo(TempoEstimate),
    Mfcc(Matrix),
    Chroma(Matrix),
    ZeroCrossingRate(FrameSeries),
    Noise(NoiseProfile),
    FrequencyBalance(Vec<Band>),
    SpectralCentroid(CentroidTrack),
}

pub type FeatureFn = fn(&AudioSample, &AnalysisConfig) -> Result<FeatureResult, ComputeError>;

pub const REGISTRY: [(FeatureKind, FeatureFn); 9] = [
    (FeatureKind::Waveform, spectral::compute_waveform),
    (FeatureKind::Spectrogram, spectral::compute_spectrogram),
    (FeatureKind::Tempo, rhythm::compute_tempo),
    (FeatureKind::Mfcc, timbre::compute_mfcc),
    (FeatureKind::Chroma, timbre::compute_chroma),
    (FeatureKind::ZeroCrossingRate, signal::compute_zero_crossing_rate),
    (FeatureKind::Noise, signal::compute_noise),
    (FeatureKind::FrequencyBalance, spectral::compute_frequency_balance),
    (FeatureKind::SpectralCentroid, spectral::compute_spectral_centroid),
];

pub type FeatureOutcome = (FeatureKind, Result<FeatureResult, ComputeError>);

/// Run every registered feature in parallel. Results come back in grid order;
/// disabled kinds yield `ComputeError::Disabled` without running.
pub fn compute_all(
    sample: &AudioSample,
    config: &AnalysisConfig,
    disabled: &[FeatureKind],
) -> Vec<FeatureOutcome> {
    REGISTRY
        .par_iter()
        .map(|&(kind, compute)| {
            if disabled.contains(&kind) {
                return (kind, Err(ComputeError::Disabled));
            }
            let started = Instant::now();
            let result = compute(sample, config);
            match &result {
                Ok(_) => log::debug!("{} computed in {:?}", kind.title(), started.elapsed()),
                Err(e) => log::warn!("{} unavailable: {}", kind.title(), e),
            }
            (kind, result)
        })
        .collect()
}

/// Checks shared by every feature before any work is done.
pub(crate) fn ensure_usable(sample: &AudioSample, config: &AnalysisConfig) -> Result<(), ComputeError> {
    if sample.is_empty() {
        return Err(ComputeError::EmptySample);
    }
    if sample.sample_rate() == 0 {
        return Err(ComputeError::Numeric("sample rate is zero".into()));
    }
    config.validate().map_err(ComputeError::InvalidConfig)
}

/// Extra check for features defined relative to the signal's own energy.
pub(crate) fn ensure_audible(sample: &AudioSample, config: &AnalysisConfig) -> Result<(), ComputeError> {
    ensure_usable(sample, config)?;
    if sample.peak() <= config.silence_floor {
        return Err(ComputeError::Silent);
    }
    Ok(())
}

pub(crate) fn hop_seconds(sample: &AudioSample, config: &AnalysisConfig) -> f32 {
    config.hop_length as f32 / sample.sample_rate() as f32
}


#[cfg(test)]
mod tests {
    use super::test_signals::*;
    use super::*;

    #[test]
    fn registry_matches_grid_order() {
        let kinds: Vec<FeatureKind> = REGISTRY.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, FeatureKind::ALL.to_vec());
    }

    #[test]
    fn compute_all_keeps_order_and_honours_disabled() {
        let sample = sine(440.0, 1.0, 22050, 0.5);
        let out = compute_all(&sample, &AnalysisConfig::default(), &[FeatureKind::Tempo]);
        let kinds: Vec<FeatureKind> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, FeatureKind::ALL.to_vec());
        for (kind, result) in &out {
            if *kind == FeatureKind::Tempo {
                assert_eq!(result, &Err(ComputeError::Disabled));
            } else {
                assert!(result.is_ok(), "{:?} failed: {:?}", kind, result);
            }
        }
    }

    #[test]
    fn every_feature_is_deterministic() {
        let sample = noise(1.5, 22050, 0.3);
        let config = AnalysisConfig::default();
        for (kind, compute) in REGISTRY {
            let a = compute(&sample, &config);
            let b = compute(&sample, &config);
            assert_eq!(a, b, "{:?} is not deterministic", kind);
        }
    }

    #[test]
    fn empty_sample_fails_every_feature() {
        let sample = AudioSample::new(Vec::new(), 22050);
        for (kind, compute) in REGISTRY {
            assert_eq!(
                compute(&sample, &AnalysisConfig::default()),
                Err(ComputeError::EmptySample),
                "{:?}",
                kind
            );
        }
    }

    #[test]
    fn silence_policy_is_consistent() {
        let sample = silence(1.0, 22050);
        let out = compute_all(&sample, &AnalysisConfig::default(), &[]);
        for (kind, result) in out {
            let expect_silent = matches!(
                kind,
                FeatureKind::Spectrogram
                    | FeatureKind::Tempo
                    | FeatureKind::Mfcc
                    | FeatureKind::Chroma
                    | FeatureKind::FrequencyBalance
            );
            if expect_silent {
                assert_eq!(result, Err(ComputeError::Silent), "{:?}", kind);
            } else {
                assert!(result.is_ok(), "{:?}", kind);
            }
        }
    }

    #[test]
    fn invalid_config_is_reported() {
        let sample = sine(440.0, 0.5, 22050, 0.5);
        let config = AnalysisConfig {
            hop_length: 0,
            ..AnalysisConfig::default()
        };
        let err = spectral::compute_spectrogram(&sample, &config).unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
    }
}
