//! Turning feature results into drawable plot descriptions.
//!
//! Nothing here touches plotters' drawing API; a `PlotSpec` is plain data so
//! the mapping from feature to visual can be tested without rasterizing.

use plotters::style::{RGBColor, BLUE, CYAN, GREEN, RED, WHITE};

use crate::analysis::{
    Band, CentroidTrack, FeatureKind, FeatureOutcome, FeatureResult, FrameSeries, Matrix, NoiseProfile,
    Spectrogram, TempoEstimate, Waveform,
};
use crate::error::ComputeError;

const MAX_ENVELOPE_COLUMNS: usize = 1200;
const MAX_HEAT_COLUMNS: usize = 400;
const MAX_HEAT_ROWS: usize = 160;

pub const PITCH_CLASSES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

#[derive(Clone, Debug)]
pub struct PlotSpec {
    pub kind: FeatureKind,
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub visual: Visual,
}

#[derive(Clone, Debug)]
pub enum Visual {
    /// Min/max amplitude per time column.
    Envelope {
        columns: Vec<(f64, f64, f64)>,
        duration: f64,
        peak: f64,
    },
    Lines {
        series: Vec<Vec<(f64, f64)>>,
        color: RGBColor,
        /// Time spans drawn as red bands behind the lines.
        shaded: Vec<(f64, f64)>,
        x_max: f64,
        y_range: (f64, f64),
    },
    Heatmap(HeatGrid),
    Bars(Vec<BarSpec>),
    Readout {
        headline: String,
        detail: String,
        /// 0..1, drawn as a meter under the text.
        level: f32,
    },
    Placeholder {
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YAxis {
    Linear,
    /// Y values are log2(Hz).
    Log2Hz,
    PitchClass,
}

#[derive(Clone, Debug)]
pub struct HeatGrid {
    /// `cells[row][col]`, row 0 at the bottom.
    pub cells: Vec<Vec<f32>>,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub y_axis: YAxis,
    pub value_range: (f32, f32),
    /// How the colorbar labels its values.
    pub unit: ValueUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueUnit {
    Decibels,
    Plain,
}

#[derive(Clone, Debug)]
pub struct BarSpec {
    pub label: String,
    /// Frequency range, drawn under the label.
    pub detail: String,
    pub value: Option<f64>,
    pub color: RGBColor,
}

impl PlotSpec {
    pub fn from_outcome((kind, outcome): &FeatureOutcome) -> PlotSpec {
        let (x_label, y_label) = axis_labels(*kind);
        let visual = match outcome {
            Ok(result) => visual_for(result),
            Err(ComputeError::Disabled) => Visual::Placeholder {
                reason: "disabled".into(),
            },
            Err(e) => Visual::Placeholder {
                reason: format!("unavailable: {e}"),
            },
        };
        PlotSpec {
            kind: *kind,
            title: kind.title().to_string(),
            x_label,
            y_label,
            visual,
        }
    }
}

pub fn build_plots(outcomes: &[FeatureOutcome]) -> Vec<PlotSpec> {
    outcomes.iter().map(PlotSpec::from_outcome).collect()
}

fn axis_labels(kind: FeatureKind) -> (&'static str, &'static str) {
    match kind {
        FeatureKind::Waveform => ("Time (s)", "Amplitude"),
        FeatureKind::Spectrogram => ("Time (s)", "Frequency (Hz)"),
        FeatureKind::Tempo => ("", ""),
        FeatureKind::Mfcc => ("Time (s)", "MFCC Coefficients"),
        FeatureKind::Chroma => ("Time (s)", "Pitch Class"),
        FeatureKind::ZeroCrossingRate => ("Time (s)", "Rate"),
        FeatureKind::Noise => ("Time (s)", "Onset Strength"),
        FeatureKind::FrequencyBalance => ("", "Amplitude (dB)"),
        FeatureKind::SpectralCentroid => ("Time (s)", "Hz"),
    }
}

fn visual_for(result: &FeatureResult) -> Visual {
    match result {
        FeatureResult::Waveform(w) => envelope(w),
        FeatureResult::Spectrogram(s) => spectrogram_grid(s),
        FeatureResult::Tempo(t) => tempo_readout(t),
        FeatureResult::Mfcc(m) => {
            let range = m.min_max();
            Visual::Heatmap(index_grid(m, YAxis::Linear, range))
        }
        FeatureResult::Chroma(m) => Visual::Heatmap(index_grid(m, YAxis::PitchClass, (0.0, 1.0))),
        FeatureResult::ZeroCrossingRate(z) => series_lines(z, CYAN),
        FeatureResult::Noise(n) => noise_lines(n),
        FeatureResult::FrequencyBalance(bands) => balance_bars(bands),
        FeatureResult::SpectralCentroid(c) => centroid_lines(c),
    }
}

fn envelope(w: &Waveform) -> Visual {
    let n = w.samples.len();
    let sr = w.sample_rate.max(1) as f64;
    let columns_count = n.clamp(1, MAX_ENVELOPE_COLUMNS);
    let columns = (0..columns_count)
        .filter_map(|c| {
            let start = c * n / columns_count;
            let end = ((c + 1) * n / columns_count).max(start + 1).min(n);
            let chunk = w.samples.get(start..end)?;
            let lo = chunk.iter().copied().fold(f32::INFINITY, f32::min) as f64;
            let hi = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
            Some((start as f64 / sr, lo, hi))
        })
        .collect();
    let peak = w.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max) as f64;
    Visual::Envelope {
        columns,
        duration: (n as f64 / sr).max(1e-3),
        peak: if peak > 0.0 { peak * 1.05 } else { 1.0 },
    }
}

/// Spectrogram rows resampled onto a log2 frequency axis from the first
/// non-DC bin to Nyquist.
fn spectrogram_grid(s: &Spectrogram) -> Visual {
    let bins = s.db.n_rows();
    if bins == 0 || s.db.n_frames() == 0 {
        return Visual::Placeholder {
            reason: "no spectral frames".into(),
        };
    }
    let bin_hz = s.bin_hz as f64;
    let y_min = bin_hz.max(1e-3).log2();
    let y_max = (bin_hz * (bins.saturating_sub(1)).max(2) as f64).log2();
    let rows_out = bins.clamp(1, MAX_HEAT_ROWS);
    let step = (y_max - y_min) / rows_out as f64;

    let cells = (0..rows_out)
        .map(|r| {
            let lo_hz = (y_min + r as f64 * step).exp2();
            let hi_hz = (y_min + (r + 1) as f64 * step).exp2();
            let first = (lo_hz / bin_hz).ceil() as usize;
            let last = ((hi_hz / bin_hz).ceil() as usize).min(bins);
            let picked: Vec<&Vec<f32>> = if first < last {
                s.db.rows[first..last].iter().collect()
            } else {
                let centre = ((lo_hz * hi_hz).sqrt() / bin_hz).round() as usize;
                vec![&s.db.rows[centre.min(bins - 1)]]
            };
            let merged: Vec<f32> = (0..s.db.n_frames())
                .map(|t| picked.iter().map(|row| row[t]).fold(f32::NEG_INFINITY, f32::max))
                .collect();
            pool_columns(&merged, MAX_HEAT_COLUMNS)
        })
        .collect();

    Visual::Heatmap(HeatGrid {
        cells,
        x_max: frames_duration(s.db.n_frames(), s.db.hop_seconds),
        y_min,
        y_max,
        y_axis: YAxis::Log2Hz,
        value_range: s.db.min_max(),
        unit: ValueUnit::Decibels,
    })
}

/// Row `i` is centred on y = i so integer ticks land on row centres.
fn index_grid(m: &Matrix, y_axis: YAxis, value_range: (f32, f32)) -> HeatGrid {
    HeatGrid {
        cells: m.rows.iter().map(|row| pool_columns(row, MAX_HEAT_COLUMNS)).collect(),
        x_max: frames_duration(m.n_frames(), m.hop_seconds),
        y_min: -0.5,
        y_max: m.n_rows().max(1) as f64 - 0.5,
        y_axis,
        value_range,
        unit: ValueUnit::Plain,
    }
}

/// Average adjacent columns down to at most `max_cols`.
fn pool_columns(row: &[f32], max_cols: usize) -> Vec<f32> {
    let n = row.len();
    if n <= max_cols {
        return row.to_vec();
    }
    (0..max_cols)
        .map(|c| {
            let chunk = &row[c * n / max_cols..(c + 1) * n / max_cols];
            chunk.iter().sum::<f32>() / chunk.len().max(1) as f32
        })
        .collect()
}

fn frames_duration(n_frames: usize, hop_seconds: f32) -> f64 {
    (n_frames as f64 * hop_seconds as f64).max(1e-3)
}

fn tempo_readout(t: &TempoEstimate) -> Visual {
    let detail = if t.candidates.is_empty() {
        format!("confidence {:.2}, no periodic onsets", t.confidence)
    } else {
        let others: Vec<String> = t.candidates.iter().map(|bpm| format!("{bpm:.1}")).collect();
        format!("confidence {:.2}, candidates {}", t.confidence, others.join(" / "))
    };
    Visual::Readout {
        headline: format!("Tempo: {:.2} BPM", t.bpm),
        detail,
        level: t.confidence,
    }
}

fn series_points(s: &FrameSeries) -> Vec<(f64, f64)> {
    s.values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64 * s.hop_seconds as f64, v as f64))
        .collect()
}

fn y_range_for(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let max = values.fold(0.0f64, f64::max);
    (0.0, if max > 0.0 { max * 1.1 } else { 1.0 })
}

fn series_lines(s: &FrameSeries, color: RGBColor) -> Visual {
    let points = series_points(s);
    Visual::Lines {
        y_range: y_range_for(points.iter().map(|p| p.1)),
        x_max: frames_duration(s.values.len(), s.hop_seconds),
        series: vec![points],
        color,
        shaded: Vec::new(),
    }
}

fn noise_lines(n: &NoiseProfile) -> Visual {
    let hop = n.onset_strength.hop_seconds as f64;
    let mut shaded: Vec<(f64, f64)> = Vec::new();
    for (i, _) in n.flagged.iter().enumerate().filter(|&(_, &f)| f) {
        let (start, end) = ((i as f64 - 0.5) * hop, (i as f64 + 0.5) * hop);
        match shaded.last_mut() {
            Some(span) if (span.1 - start).abs() < 1e-9 => span.1 = end,
            _ => shaded.push((start.max(0.0), end)),
        }
    }

    let points = series_points(&n.onset_strength);
    Visual::Lines {
        y_range: y_range_for(points.iter().map(|p| p.1)),
        x_max: frames_duration(n.flagged.len().max(n.onset_strength.values.len()), n.onset_strength.hop_seconds),
        series: vec![points],
        color: WHITE,
        shaded,
    }
}

fn centroid_lines(c: &CentroidTrack) -> Visual {
    let mut series: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    for (i, hz) in c.hz.iter().enumerate() {
        match hz {
            Some(hz) => current.push((i as f64 * c.hop_seconds as f64, *hz as f64)),
            None if !current.is_empty() => series.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        series.push(current);
    }

    Visual::Lines {
        y_range: y_range_for(series.iter().flatten().map(|p| p.1)),
        x_max: frames_duration(c.hz.len(), c.hop_seconds),
        series,
        color: WHITE,
        shaded: Vec::new(),
    }
}

fn balance_bars(bands: &[Band]) -> Visual {
    let colors = [BLUE, GREEN, RED];
    Visual::Bars(
        bands
            .iter()
            .enumerate()
            .map(|(i, band)| BarSpec {
                label: band.name.to_string(),
                detail: match band.high_hz {
                    Some(high) => format!("{:.0}-{:.0} Hz", band.low_hz, high),
                    None => format!(">{:.0} Hz", band.low_hz),
                },
                value: band.mean_db.map(f64::from),
                color: colors[i % colors.len()],
            })
            .collect(),
    )
}
