//! Filterbanks and transforms shared by the MFCC, chroma and onset features.

use super::stft::bin_frequencies;

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// Triangular mel filters with Slaney area normalization, `weights[mel][bin]`.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Vec<Vec<f32>> {
    let fft_freqs = bin_frequencies(sample_rate, n_fft);
    let (mel_min, mel_max) = (hz_to_mel(fmin), hz_to_mel(fmax));
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, centre, hi) = (edges[m], edges[m + 1], edges[m + 2]);
            let enorm = 2.0 / (hi - lo);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - lo) / (centre - lo);
                    let upper = (hi - f) / (hi - centre);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Apply `weights[out][bin]` to every frame of `frames[frame][bin]`,
/// returning `[out][frame]`.
pub fn project(weights: &[Vec<f32>], frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    weights
        .iter()
        .map(|w| {
            frames
                .iter()
                .map(|frame| w.iter().zip(frame.iter()).map(|(a, b)| a * b).sum())
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II of `input`, keeping the first `n_out` coefficients.
pub fn dct_ortho(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len() as f32;
    (0..n_out)
        .map(|k| {
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (std::f32::consts::PI / n * (i as f32 + 0.5) * k as f32).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// Octave (in A440/16 units) around which chroma energy is weighted.
const CHROMA_CENTRE_OCTAVE: f32 = 5.0;
const CHROMA_OCTAVE_WIDTH: f32 = 2.0;

/// Pitch-class filterbank, `weights[class][bin]`, class 0 = C.
///
/// Each bin spreads over nearby pitch classes with a Gaussian whose width is
/// the bin's own width in semitones, then gets a Gaussian octave weight so very
/// low and very high bins contribute less.
pub fn chroma_filterbank(sample_rate: u32, n_fft: usize) -> Vec<Vec<f32>> {
    let freqs = bin_frequencies(sample_rate, n_fft);
    let bin_hz = sample_rate as f32 / n_fft as f32;
    let mut weights = vec![vec![0.0f32; freqs.len()]; 12];

    for (k, &f) in freqs.iter().enumerate().skip(1) {
        let midi = 69.0 + 12.0 * (f / 440.0).log2();
        let lower = (f - bin_hz * 0.5).max(bin_hz * 0.5);
        let width = (12.0 * ((f + bin_hz * 0.5) / lower).log2()).max(1.0);
        let octave = (f / (440.0 / 16.0)).log2();
        let octave_weight = (-0.5 * ((octave - CHROMA_CENTRE_OCTAVE) / CHROMA_OCTAVE_WIDTH).powi(2)).exp();

        let mut column = [0.0f32; 12];
        for (class, slot) in column.iter_mut().enumerate() {
            let d = (midi - class as f32).rem_euclid(12.0);
            let d = if d > 6.0 { d - 12.0 } else { d };
            *slot = (-0.5 * (2.0 * d / width).powi(2)).exp();
        }
        let norm = column.iter().map(|w| w * w).sum::<f32>().sqrt().max(1e-12);
        for (class, w) in column.iter().enumerate() {
            weights[class][k] = w / norm * octave_weight;
        }
    }

    weights
}
