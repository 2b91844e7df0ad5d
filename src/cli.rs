use clap::Parser;
use specmatch::audio::fft::{MagnitudeMode, WindowFunction};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "specmatch",
    about = "Compare the spectral envelope of a track against a reference"
)]
pub struct Cli {
    /// Track to analyse (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Reference track analysed over the same range
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Range start in milliseconds
    #[arg(long, default_value_t = 0.0)]
    pub start_ms: f64,

    /// Range end in milliseconds (defaults to the end of each track)
    #[arg(long)]
    pub end_ms: Option<f64>,

    /// Spectrum bins per window; each window holds twice as many samples
    #[arg(long, default_value_t = 512)]
    pub bin_size: usize,

    /// Share of values around the median kept inside the band (0.0-1.0]
    #[arg(long, default_value_t = 0.4)]
    pub window_amount: f64,

    /// Channel index to analyse
    #[arg(long, default_value_t = 0)]
    pub channel: usize,

    /// Magnitude formula
    #[arg(long, value_enum)]
    pub magnitude: Option<MagnitudeMode>,

    /// Taper applied to each window
    #[arg(long, value_enum)]
    pub window: Option<WindowFunction>,

    /// Milliseconds of work between progress updates (at least 1)
    #[arg(long, default_value_t = 30)]
    pub slice_ms: u64,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./specmatch.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,
}
