use super::stft::{amplitude_to_db, bin_frequencies, magnitude_frames, transpose};
use super::{
    ensure_audible, ensure_usable, hop_seconds, Band, CentroidTrack, FeatureResult, Matrix, Spectrogram,
    Waveform,
};
use crate::audio::AudioSample;
use crate::config::AnalysisConfig;
use crate::error::ComputeError;

/// Frames whose magnitude sum is below this have no defined centroid.
const CENTROID_ENERGY_FLOOR: f32 = 1e-10;

pub fn compute_waveform(sample: &AudioSample, config: &AnalysisConfig) -> Result<FeatureResult, ComputeError> {
    ensure_usable(sample, config)?;
    Ok(FeatureResult::Waveform(Waveform {
        samples: sample.samples().to_vec(),
        sample_rate: sample.sample_rate(),
    }))
}

/// Magnitude STFT in dB relative to the loudest bin of the whole file.
pub fn compute_spectrogram(sample: &AudioSample, config: &AnalysisConfig) -> Result<FeatureResult, ComputeError> {
    ensure_audible(sample, config)?;

    let mut rows = transpose(&magnitude_frames(sample.samples(), config.n_fft, config.hop_length));
    let peak = rows.iter().flatten().copied().fold(0.0f32, f32::max);

    let n_frames = rows.first().map_or(0, Vec::len);
    let mut flat: Vec<f32> = rows.iter().flatten().copied().collect();
    amplitude_to_db(&mut flat, peak, config.top_db);
    for (row, chunk) in rows.iter_mut().zip(flat.chunks(n_frames.max(1))) {
        row.copy_from_slice(chunk);
    }

    Ok(FeatureResult::Spectrogram(Spectrogram {
        db: Matrix {
            rows,
            hop_seconds: hop_seconds(sample, config),
        },
        bin_hz: sample.sample_rate() as f32 / config.n_fft as f32,
    }))
}

/// Mean level of Bass / Midrange / Treble, each relative to its own loudest bin.
pub fn compute_frequency_balance(
    sample: &AudioSample,
    config: &AnalysisConfig,
) -> Result<FeatureResult, ComputeError> {
    ensure_audible(sample, config)?;

    let frames = magnitude_frames(sample.samples(), config.n_fft, config.hop_length);
    let freqs = bin_frequencies(sample.sample_rate(), config.n_fft);

    let bands = [
        ("Bass", 0.0, Some(config.bass_max_hz)),
        ("Midrange", config.bass_max_hz, Some(config.treble_min_hz)),
        ("Treble", config.treble_min_hz, None),
    ];

    let balance = bands
        .iter()
        .map(|&(name, low_hz, high_hz)| {
            let bins: Vec<usize> = (0..freqs.len())
                .filter(|&k| in_band(freqs[k], low_hz, high_hz))
                .collect();
            let mut values: Vec<f32> = frames
                .iter()
                .flat_map(|frame| bins.iter().map(move |&k| frame[k]))
                .collect();

            let mean_db = if values.is_empty() {
                None
            } else {
                let reference = values.iter().copied().fold(0.0f32, f32::max);
                amplitude_to_db(&mut values, reference, config.top_db);
                Some(values.iter().sum::<f32>() / values.len() as f32)
            };

            Band {
                name,
                low_hz,
                high_hz,
                mean_db,
            }
        })
        .collect();

    Ok(FeatureResult::FrequencyBalance(balance))
}

/// Half-open band membership. A band starting at 0 Hz leaves out the DC bin.
fn in_band(f: f32, low_hz: f32, high_hz: Option<f32>) -> bool {
    let above = if low_hz <= 0.0 { f > 0.0 } else { f >= low_hz };
    above && high_hz.map_or(true, |high| f < high)
}

/// Magnitude-weighted mean frequency per frame.
pub fn compute_spectral_centroid(
    sample: &AudioSample,
    config: &AnalysisConfig,
) -> Result<FeatureResult, ComputeError> {
    ensure_usable(sample, config)?;

    let freqs = bin_frequencies(sample.sample_rate(), config.n_fft);
    let hz = magnitude_frames(sample.samples(), config.n_fft, config.hop_length)
        .iter()
        .map(|frame| {
            let total: f32 = frame.iter().sum();
            if total < CENTROID_ENERGY_FLOOR {
                return None;
            }
            let weighted: f32 = frame.iter().zip(freqs.iter()).map(|(m, f)| m * f).sum();
            Some(weighted / total)
        })
        .collect();

    Ok(FeatureResult::SpectralCentroid(CentroidTrack {
        hz,
        hop_seconds: hop_seconds(sample, config),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_signals::*;
    use super::*;

    #[test]
    fn waveform_passes_samples_through() {
        let sample = sine(5.0, 0.1, 1000, 1.0);
        let FeatureResult::Waveform(w) = compute_waveform(&sample, &AnalysisConfig::default()).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(w.samples, sample.samples());
        assert_eq!(w.sample_rate, 1000);
    }

    #[test]
    fn spectrogram_shape_and_reference() {
        let sample = sine(440.0, 1.0, 22050, 0.5);
        let config = AnalysisConfig::default();
        let FeatureResult::Spectrogram(s) = compute_spectrogram(&sample, &config).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(s.db.n_rows(), config.n_fft / 2 + 1);
        assert_eq!(s.db.n_frames(), 1 + 22050 / config.hop_length);
        let (lo, hi) = s.db.min_max();
        assert!(hi.abs() < 1e-3, "peak should sit at 0 dB, got {hi}");
        assert!(lo >= -config.top_db - 1e-3);
    }

    #[test]
    fn centroid_of_sine_tracks_its_frequency() {
        let sample = sine(440.0, 3.0, 44100, 0.8);
        let FeatureResult::SpectralCentroid(track) =
            compute_spectral_centroid(&sample, &AnalysisConfig::default()).unwrap()
        else {
            panic!("wrong variant");
        };
        let n = track.hz.len();
        for value in &track.hz[4..n - 4] {
            let hz = value.expect("tone frames carry energy");
            assert!((hz - 440.0).abs() < 30.0, "centroid {hz}");
        }
    }

    #[test]
    fn centroid_of_silence_is_flagged() {
        let sample = silence(1.0, 22050);
        let FeatureResult::SpectralCentroid(track) =
            compute_spectral_centroid(&sample, &AnalysisConfig::default()).unwrap()
        else {
            panic!("wrong variant");
        };
        assert!(!track.hz.is_empty());
        assert!(track.hz.iter().all(Option::is_none));
    }

    #[test]
    fn balance_reports_three_bands() {
        let sample = sine(100.0, 1.0, 22050, 0.5);
        let FeatureResult::FrequencyBalance(bands) =
            compute_frequency_balance(&sample, &AnalysisConfig::default()).unwrap()
        else {
            panic!("wrong variant");
        };
        let names: Vec<&str> = bands.iter().map(|b| b.name).collect();
        assert_eq!(names, ["Bass", "Midrange", "Treble"]);
        for band in &bands {
            let db = band.mean_db.unwrap();
            assert!(db <= 0.0 && db >= -80.0, "{}: {db}", band.name);
        }
    }

    #[test]
    fn balance_bands_can_be_empty_at_low_rates() {
        // Nyquist 1 kHz leaves no bins at or above 2 kHz.
        let sample = sine(100.0, 1.0, 2000, 0.5);
        let config = AnalysisConfig {
            n_fft: 256,
            hop_length: 64,
            ..AnalysisConfig::default()
        };
        let FeatureResult::FrequencyBalance(bands) = compute_frequency_balance(&sample, &config).unwrap() else {
            panic!("wrong variant");
        };
        assert!(bands[2].mean_db.is_none());
        assert!(bands[0].mean_db.is_some());
    }

    #[test]
    fn band_edges_ignore_labels_and_skip_dc() {
        assert!(!in_band(0.0, 0.0, Some(150.0)));
        assert!(in_band(10.7, 0.0, Some(150.0)));
        assert!(!in_band(150.0, 0.0, Some(150.0)));
        assert!(in_band(150.0, 150.0, Some(2000.0)));
        assert!(in_band(9000.0, 2000.0, None));
        assert!(!in_band(1999.0, 2000.0, None));
    }
}
