use super::timbre::mel_db_spectrogram;
use super::{ensure_audible, FeatureResult, TempoEstimate};
use crate::audio::AudioSample;
use crate::config::AnalysisConfig;
use crate::error::ComputeError;

const MAX_CANDIDATES: usize = 3;

/// Mean positive frame-to-frame rise of the mel dB spectrogram. Frame 0 is 0.
pub(crate) fn onset_strength(sample: &AudioSample, config: &AnalysisConfig) -> Vec<f32> {
    let mel = mel_db_spectrogram(sample, config);
    let n_frames = mel.first().map_or(0, Vec::len);
    let n_bands = mel.len().max(1) as f32;

    (0..n_frames)
        .map(|t| {
            if t == 0 {
                return 0.0;
            }
            mel.iter().map(|band| (band[t] - band[t - 1]).max(0.0)).sum::<f32>() / n_bands
        })
        .collect()
}

/// Global tempo from the autocorrelation of the onset envelope.
///
/// Lags are weighted by a log-normal prior centred on `tempo_start_bpm`.
/// Scanning runs from short to long lags and only a strictly better score
/// replaces the current best, so ties resolve to the faster tempo.
pub fn compute_tempo(sample: &AudioSample, config: &AnalysisConfig) -> Result<FeatureResult, ComputeError> {
    ensure_audible(sample, config)?;

    let envelope = onset_strength(sample, config);
    let frame_rate = sample.sample_rate() as f32 / config.hop_length as f32;
    Ok(FeatureResult::Tempo(estimate_tempo(&envelope, frame_rate, config)))
}

pub(crate) fn estimate_tempo(envelope: &[f32], frame_rate: f32, config: &AnalysisConfig) -> TempoEstimate {
    let flat = TempoEstimate {
        bpm: config.tempo_start_bpm,
        confidence: 0.0,
        candidates: Vec::new(),
    };

    let max_lag = ((config.tempo_window_seconds * frame_rate) as usize).min(envelope.len().saturating_sub(1));
    if max_lag < 1 {
        return flat;
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centred: Vec<f32> = envelope.iter().map(|v| v - mean).collect();
    let autocorr: Vec<f32> = (0..=max_lag)
        .map(|lag| centred.iter().zip(&centred[lag..]).map(|(a, b)| a * b).sum())
        .collect();

    let energy = autocorr[0];
    if !(energy > 1e-12) {
        return flat;
    }

    let log_start = config.tempo_start_bpm.log2();
    let scores: Vec<(usize, f32, f32)> = (1..=max_lag)
        .filter_map(|lag| {
            let bpm = 60.0 * frame_rate / lag as f32;
            if bpm < config.tempo_min_bpm || bpm > config.tempo_max_bpm {
                return None;
            }
            let prior = (-0.5 * ((bpm.log2() - log_start) / config.tempo_std_octaves).powi(2)).exp();
            Some((lag, bpm, autocorr[lag] / energy * prior))
        })
        .collect();

    let mut best: Option<(usize, f32, f32)> = None;
    for &entry in &scores {
        if entry.2 > 0.0 && best.map_or(true, |b| entry.2 > b.2) {
            best = Some(entry);
        }
    }
    let Some((best_lag, best_bpm, _)) = best else {
        return flat;
    };

    let mut peaks: Vec<(f32, f32)> = scores
        .iter()
        .enumerate()
        .filter(|&(i, &(_, _, score))| {
            let left = i.checked_sub(1).map_or(f32::NEG_INFINITY, |j| scores[j].2);
            let right = scores.get(i + 1).map_or(f32::NEG_INFINITY, |s| s.2);
            score > 0.0 && score >= left && score >= right
        })
        .map(|(_, &(_, bpm, score))| (bpm, score))
        .collect();
    // Stable sort keeps the faster tempo first among equal scores.
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    let candidates = peaks.into_iter().take(MAX_CANDIDATES).map(|(bpm, _)| bpm).collect();

    TempoEstimate {
        bpm: best_bpm,
        confidence: (autocorr[best_lag] / energy).clamp(0.0, 1.0),
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_signals::*;
    use super::*;

    #[test]
    fn click_track_tempo() {
        // One click every 22 hops: 60 * 22050 / 512 / 22 = 117.45 BPM.
        let sample = clicks(22 * 512, 10.0, 22050);
        let FeatureResult::Tempo(t) = compute_tempo(&sample, &AnalysisConfig::default()).unwrap() else {
            panic!("wrong variant");
        };
        assert!((t.bpm - 117.45).abs() < 0.1, "bpm = {}", t.bpm);
        assert!(t.confidence > 0.0);
        assert!(!t.candidates.is_empty() && t.candidates.len() <= MAX_CANDIDATES);
        assert_eq!(t.candidates[0], t.bpm);
    }

    #[test]
    fn steady_tone_does_not_fail() {
        let sample = sine(440.0, 3.0, 44100, 0.5);
        let FeatureResult::Tempo(t) = compute_tempo(&sample, &AnalysisConfig::default()).unwrap() else {
            panic!("wrong variant");
        };
        assert!(t.bpm.is_finite() && t.bpm > 0.0);
        assert!((0.0..=1.0).contains(&t.confidence));
    }

    #[test]
    fn flat_envelope_falls_back_to_prior_centre() {
        let t = estimate_tempo(&[0.5; 500], 43.0, &AnalysisConfig::default());
        assert_eq!(t.bpm, 120.0);
        assert_eq!(t.confidence, 0.0);
        assert!(t.candidates.is_empty());
    }

    #[test]
    fn periodic_envelope_picks_fundamental_lag() {
        // Every multiple of lag 4 correlates; the prior and the larger overlap
        // at the shortest lag must put the estimate on lag 4.
        let envelope: Vec<f32> = (0..400).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        let frame_rate = 8.0; // lag 4 -> 120 BPM, lag 8 -> 60 BPM
        let config = AnalysisConfig {
            tempo_start_bpm: 120.0,
            ..AnalysisConfig::default()
        };
        let t = estimate_tempo(&envelope, frame_rate, &config);
        assert_eq!(t.bpm, 120.0);
        assert_eq!(t.candidates[0], 120.0);
    }
}
