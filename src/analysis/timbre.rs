use super::mel::{chroma_filterbank, dct_ortho, mel_filterbank, project};
use super::stft::{magnitude_frames, power_to_db};
use super::{ensure_audible, hop_seconds, FeatureResult, Matrix};
use crate::audio::AudioSample;
use crate::config::AnalysisConfig;
use crate::error::ComputeError;

/// Log-power mel spectrogram, `[mel][frame]`, dB relative to 1.0 and clipped to
/// `top_db` below its peak.
pub(crate) fn mel_db_spectrogram(sample: &AudioSample, config: &AnalysisConfig) -> Vec<Vec<f32>> {
    let power: Vec<Vec<f32>> = magnitude_frames(sample.samples(), config.n_fft, config.hop_length)
        .into_iter()
        .map(|frame| frame.into_iter().map(|m| m * m).collect())
        .collect();
    let sr = sample.sample_rate();
    let fb = mel_filterbank(sr, config.n_fft, config.n_mels, 0.0, sr as f32 / 2.0);
    let mut mel = project(&fb, &power);

    let n_frames = power.len();
    let mut flat: Vec<f32> = mel.iter().flatten().copied().collect();
    power_to_db(&mut flat, 1.0, config.top_db);
    for (row, chunk) in mel.iter_mut().zip(flat.chunks(n_frames.max(1))) {
        row.copy_from_slice(chunk);
    }
    mel
}

/// First `n_mfcc` cepstral coefficients per frame, `[coefficient][frame]`.
pub fn compute_mfcc(sample: &AudioSample, config: &AnalysisConfig) -> Result<FeatureResult, ComputeError> {
    ensure_audible(sample, config)?;

    let mel = mel_db_spectrogram(sample, config);
    let n_frames = mel.first().map_or(0, Vec::len);

    let mut rows = vec![Vec::with_capacity(n_frames); config.n_mfcc];
    for t in 0..n_frames {
        let column: Vec<f32> = mel.iter().map(|band| band[t]).collect();
        for (row, c) in rows.iter_mut().zip(dct_ortho(&column, config.n_mfcc)) {
            row.push(c);
        }
    }

    Ok(FeatureResult::Mfcc(Matrix {
        rows,
        hop_seconds: hop_seconds(sample, config),
    }))
}

/// Energy per pitch class (C..B) per frame, each frame scaled so its
/// strongest class is 1. Frames without energy stay at zero.
pub fn compute_chroma(sample: &AudioSample, config: &AnalysisConfig) -> Result<FeatureResult, ComputeError> {
    ensure_audible(sample, config)?;

    let power: Vec<Vec<f32>> = magnitude_frames(sample.samples(), config.n_fft, config.hop_length)
        .into_iter()
        .map(|frame| frame.into_iter().map(|m| m * m).collect())
        .collect();
    let mut rows = project(&chroma_filterbank(sample.sample_rate(), config.n_fft), &power);

    for t in 0..power.len() {
        let peak = rows.iter().map(|r| r[t]).fold(0.0f32, f32::max);
        if peak > 0.0 {
            for row in rows.iter_mut() {
                row[t] /= peak;
            }
        }
    }

    Ok(FeatureResult::Chroma(Matrix {
        rows,
        hop_seconds: hop_seconds(sample, config),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_signals::*;
    use super::*;

    #[test]
    fn mfcc_has_configured_coefficient_count() {
        let sample = sine(440.0, 1.0, 22050, 0.5);
        let config = AnalysisConfig::default();
        let FeatureResult::Mfcc(m) = compute_mfcc(&sample, &config).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(m.n_rows(), 13);
        assert_eq!(m.n_frames(), 1 + 22050 / config.hop_length);
        assert!(m.rows.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn mfcc_count_follows_config() {
        let sample = sine(440.0, 0.5, 22050, 0.5);
        let config = AnalysisConfig {
            n_mfcc: 20,
            ..AnalysisConfig::default()
        };
        let FeatureResult::Mfcc(m) = compute_mfcc(&sample, &config).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(m.n_rows(), 20);
    }

    #[test]
    fn chroma_of_a440_peaks_on_a() {
        let sample = sine(440.0, 1.0, 22050, 0.5);
        let FeatureResult::Chroma(c) = compute_chroma(&sample, &AnalysisConfig::default()).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(c.n_rows(), 12);
        let t = c.n_frames() / 2;
        assert!((c.rows[9][t] - 1.0).abs() < 1e-6);
        assert!(c.rows.iter().flatten().all(|&v| (0.0..=1.0 + 1e-6).contains(&v)));
    }
}
