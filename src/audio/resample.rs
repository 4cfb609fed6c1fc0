use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::DecodeError;

/// Sinc filter length in input samples.
const SINC_LEN: usize = 256;

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The whole signal is processed as one chunk, padded with a filter length of
/// zeros so even very short inputs clear the filter delay. The result always
/// holds `round(len * to_rate / from_rate)` samples, and at least one.
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, DecodeError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let fail = |reason: String| DecodeError::Resample {
        from: from_rate,
        to: to_rate,
        reason,
    };

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut padded = samples.to_vec();
    padded.resize(samples.len() + SINC_LEN, 0.0);

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        params,
        padded.len(),
        1, // mono
    )
    .map_err(|e| fail(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = ((samples.len() as f64 * ratio).round() as usize).max(1);

    let input = vec![padded];
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| fail(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();
    // Flush the filter tail; the zero padding is usually enough on its own.
    if output.len() < delay + expected {
        let flush = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| fail(e.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();
        output.extend(flush);
    }

    let mut trimmed: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    if trimmed.len() < expected {
        log::debug!("Resampler came up {} samples short, zero-filling", expected - trimmed.len());
        trimmed.resize(expected, 0.0);
    }
    Ok(trimmed)
}
