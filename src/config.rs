use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::FeatureKind;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Features to leave out of the figure (rendered as placeholders).
    #[serde(default)]
    pub disabled: Vec<FeatureKind>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Directory for PNGs. `None` writes next to the input file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Draw titles, axis labels and tick labels.
    #[serde(default = "default_text")]
    pub text: bool,
}

/// Framing, filterbank and threshold settings shared by every feature.
///
/// Every value here changes numeric output, so they are kept together and
/// validated before a run instead of being scattered through the analysis code.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Analysis sample rate in Hz. `0` keeps the file's native rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,
    #[serde(default = "default_n_mfcc")]
    pub n_mfcc: usize,
    /// Dynamic range kept below the reference when converting to dB.
    #[serde(default = "default_top_db")]
    pub top_db: f32,
    /// Peak amplitude at or below which a sample counts as silent.
    #[serde(default = "default_silence_floor")]
    pub silence_floor: f32,
    #[serde(default = "default_tempo_start_bpm")]
    pub tempo_start_bpm: f32,
    #[serde(default = "default_tempo_std_octaves")]
    pub tempo_std_octaves: f32,
    #[serde(default = "default_tempo_min_bpm")]
    pub tempo_min_bpm: f32,
    #[serde(default = "default_tempo_max_bpm")]
    pub tempo_max_bpm: f32,
    #[serde(default = "default_tempo_window_seconds")]
    pub tempo_window_seconds: f32,
    #[serde(default = "default_clip_level")]
    pub clip_level: f32,
    #[serde(default = "default_clip_ratio_threshold")]
    pub clip_ratio_threshold: f32,
    #[serde(default = "default_flatness_threshold")]
    pub flatness_threshold: f32,
    #[serde(default = "default_bass_max_hz")]
    pub bass_max_hz: f32,
    #[serde(default = "default_treble_min_hz")]
    pub treble_min_hz: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            dir: None,
            text: default_text(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            n_fft: default_n_fft(),
            hop_length: default_hop_length(),
            n_mels: default_n_mels(),
            n_mfcc: default_n_mfcc(),
            top_db: default_top_db(),
            silence_floor: default_silence_floor(),
            tempo_start_bpm: default_tempo_start_bpm(),
            tempo_std_octaves: default_tempo_std_octaves(),
            tempo_min_bpm: default_tempo_min_bpm(),
            tempo_max_bpm: default_tempo_max_bpm(),
            tempo_window_seconds: default_tempo_window_seconds(),
            clip_level: default_clip_level(),
            clip_ratio_threshold: default_clip_ratio_threshold(),
            flatness_threshold: default_flatness_threshold(),
            bass_max_hz: default_bass_max_hz(),
            treble_min_hz: default_treble_min_hz(),
        }
    }
}

impl AnalysisConfig {
    /// Reject settings the feature functions cannot work with.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_fft < 16 {
            return Err(format!("n_fft must be at least 16, got {}", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(format!(
                "hop_length must be in 1..={}, got {}",
                self.n_fft, self.hop_length
            ));
        }
        if self.n_mels == 0 {
            return Err("n_mels must be positive".into());
        }
        if self.n_mfcc == 0 || self.n_mfcc > self.n_mels {
            return Err(format!(
                "n_mfcc must be in 1..={}, got {}",
                self.n_mels, self.n_mfcc
            ));
        }
        if !(self.top_db > 0.0) {
            return Err("top_db must be positive".into());
        }
        if !(self.tempo_min_bpm > 0.0 && self.tempo_min_bpm < self.tempo_max_bpm) {
            return Err(format!(
                "tempo range {}..{} BPM is empty",
                self.tempo_min_bpm, self.tempo_max_bpm
            ));
        }
        if !(self.tempo_std_octaves > 0.0) || !(self.tempo_start_bpm > 0.0) {
            return Err("tempo prior must have a positive centre and width".into());
        }
        if !(self.tempo_window_seconds > 0.0) {
            return Err("tempo_window_seconds must be positive".into());
        }
        if !(0.0 < self.bass_max_hz && self.bass_max_hz < self.treble_min_hz) {
            return Err(format!(
                "band edges must satisfy 0 < bass_max_hz ({}) < treble_min_hz ({})",
                self.bass_max_hz, self.treble_min_hz
            ));
        }
        Ok(())
    }
}

fn default_width() -> u32 { 2500 }
fn default_height() -> u32 { 1400 }
fn default_text() -> bool { true }
fn default_sample_rate() -> u32 { 22050 }
fn default_n_fft() -> usize { 2048 }
fn default_hop_length() -> usize { 512 }
fn default_n_mels() -> usize { 128 }
fn default_n_mfcc() -> usize { 13 }
fn default_top_db() -> f32 { 80.0 }
fn default_silence_floor() -> f32 { 1e-4 }
fn default_tempo_start_bpm() -> f32 { 120.0 }
fn default_tempo_std_octaves() -> f32 { 1.0 }
fn default_tempo_min_bpm() -> f32 { 30.0 }
fn default_tempo_max_bpm() -> f32 { 300.0 }
fn default_tempo_window_seconds() -> f32 { 8.0 }
fn default_clip_level() -> f32 { 0.99 }
fn default_clip_ratio_threshold() -> f32 { 0.01 }
fn default_flatness_threshold() -> f32 { 0.4 }
fn default_bass_max_hz() -> f32 { 150.0 }
fn default_treble_min_hz() -> f32 { 2000.0 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Explicit path, else `sonoscope.toml` in the working directory, else the
/// per-user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("sonoscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonoscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonoscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
