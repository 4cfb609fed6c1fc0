use clap::Parser;
use std::path::PathBuf;

use crate::analysis::FeatureKind;

#[derive(Parser, Debug)]
#[command(name = "sonoscope", about = "Audio feature analyzer that saves a 3x3 grid of plots as PNG")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG, AAC)
    pub inputs: Vec<PathBuf>,

    /// Directory for the PNGs (default: next to each input)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Config file (default: sonoscope.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Figure width in pixels
    #[arg(long, default_value_t = 2500)]
    pub width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 1400)]
    pub height: u32,

    /// Analysis sample rate in Hz (0 keeps the file's rate)
    #[arg(long, default_value_t = 22050)]
    pub sample_rate: u32,

    /// Render without titles, labels or tick text
    #[arg(long)]
    pub no_text: bool,

    /// Features to skip (comma-separated)
    #[arg(long, value_delimiter = ',', value_enum)]
    pub disable: Vec<FeatureKind>,

    /// Open the "Load Music File" dialog instead of running headless
    #[arg(long)]
    pub gui: bool,
}
