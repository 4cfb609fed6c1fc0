use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Smallest amplitude considered when converting to dB.
pub const AMPLITUDE_FLOOR: f32 = 1e-5;
/// Smallest power considered when converting to dB.
pub const POWER_FLOOR: f32 = 1e-10;

/// Periodic Hann window, the variant used for spectral analysis.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos())
        .collect()
}

/// Number of centred frames for a signal of `len` samples.
pub fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Centred frame `index` (window start at `index * hop - n_fft / 2`), with
/// out-of-range samples produced by `pad`.
pub fn centred_frame(samples: &[f32], index: usize, n_fft: usize, hop: usize, pad: Padding) -> Vec<f32> {
    let start = (index * hop) as isize - (n_fft / 2) as isize;
    (0..n_fft as isize)
        .map(|i| {
            let pos = start + i;
            if pos >= 0 && (pos as usize) < samples.len() {
                samples[pos as usize]
            } else {
                match pad {
                    Padding::Zero => 0.0,
                    Padding::Edge if pos < 0 => samples.first().copied().unwrap_or(0.0),
                    Padding::Edge => samples.last().copied().unwrap_or(0.0),
                }
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    Zero,
    Edge,
}

/// Magnitude STFT of a mono signal, `frames[frame][bin]` with `n_fft / 2 + 1` bins.
pub fn magnitude_frames(samples: &[f32], n_fft: usize, hop: usize) -> Vec<Vec<f32>> {
    let window = hann_window(n_fft);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
    let bins = n_fft / 2 + 1;

    (0..frame_count(samples.len(), hop))
        .into_par_iter()
        .map(|idx| {
            let frame = centred_frame(samples, idx, n_fft, hop, Padding::Zero);
            let mut buffer: Vec<Complex<f32>> = frame
                .iter()
                .zip(window.iter())
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            buffer[..bins].iter().map(|c| c.norm()).collect()
        })
        .collect()
}

/// Swap `[frame][bin]` into `[bin][frame]`.
pub fn transpose(frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let rows = frames.first().map_or(0, Vec::len);
    (0..rows)
        .map(|r| frames.iter().map(|frame| frame[r]).collect())
        .collect()
}

pub fn bin_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..=n_fft / 2)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Amplitude to dB relative to `reference`, clipped to `top_db` below the peak.
pub fn amplitude_to_db(values: &mut [f32], reference: f32, top_db: f32) {
    let ref_db = 20.0 * reference.max(AMPLITUDE_FLOOR).log10();
    to_db_in_place(values, |v| 20.0 * v.max(AMPLITUDE_FLOOR).log10() - ref_db, top_db);
}

/// Power to dB relative to `reference`, clipped to `top_db` below the peak.
pub fn power_to_db(values: &mut [f32], reference: f32, top_db: f32) {
    let ref_db = 10.0 * reference.max(POWER_FLOOR).log10();
    to_db_in_place(values, |v| 10.0 * v.max(POWER_FLOOR).log10() - ref_db, top_db);
}

fn to_db_in_place(values: &mut [f32], convert: impl Fn(f32) -> f32, top_db: f32) {
    let mut peak = f32::NEG_INFINITY;
    for v in values.iter_mut() {
        *v = convert(*v);
        peak = peak.max(*v);
    }
    let floor = peak - top_db;
    for v in values.iter_mut() {
        *v = v.max(floor);
    }
}
