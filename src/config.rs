use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::analysis::{AnalysisRequest, AnalysisSettings};
use crate::audio::fft::{MagnitudeMode, WindowFunction};
use crate::audio::sampler::DEFAULT_DB_FLOOR;
use crate::audio::schedule::SchedulePolicy;

/// Bin sizes offered to users: powers of two from 128 to 32768.
pub const BIN_SIZES: [usize; 9] = [128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768];

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub range: RangeConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_bin_size")]
    pub bin_size: usize,
    #[serde(default = "default_window_amount")]
    pub window_amount: f64,
    #[serde(default = "default_db_floor")]
    pub db_floor: f64,
    #[serde(default)]
    pub magnitude: MagnitudeMode,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default)]
    pub channel: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeConfig {
    #[serde(default)]
    pub start_ms: f64,
    #[serde(default)]
    pub end_ms: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_slice_ms")]
    pub slice_ms: u64,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bin_size: default_bin_size(),
            window_amount: default_window_amount(),
            db_floor: default_db_floor(),
            magnitude: MagnitudeMode::default(),
            window: WindowFunction::default(),
            channel: 0,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slice_ms: default_slice_ms(),
            pause_ms: default_pause_ms(),
        }
    }
}

fn default_bin_size() -> usize { 512 }
fn default_window_amount() -> f64 { 0.4 }
fn default_db_floor() -> f64 { DEFAULT_DB_FLOOR }
fn default_slice_ms() -> u64 { 30 }
fn default_pause_ms() -> u64 { 1 }

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !BIN_SIZES.contains(&self.analysis.bin_size) {
            anyhow::bail!(
                "bin_size must be one of {:?}, got {}",
                BIN_SIZES,
                self.analysis.bin_size
            );
        }
        let w = self.analysis.window_amount;
        if !(w > 0.0 && w <= 1.0) {
            anyhow::bail!("window_amount must be in (0, 1], got {}", w);
        }
        if self.schedule.slice_ms == 0 {
            anyhow::bail!("slice_ms must be at least 1");
        }
        if let Some(end) = self.range.end_ms {
            if end < self.range.start_ms {
                log::warn!(
                    "Range end {}ms precedes start {}ms; the range is empty",
                    end,
                    self.range.start_ms
                );
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            bin_size: self.analysis.bin_size,
            window_amount: self.analysis.window_amount,
            window: self.analysis.window,
            db_floor: self.analysis.db_floor,
            schedule: SchedulePolicy {
                slice: Duration::from_millis(self.schedule.slice_ms),
                pause: Duration::from_millis(self.schedule.pause_ms),
            },
        }
    }

    pub fn request(&self) -> AnalysisRequest {
        AnalysisRequest {
            start_ms: self.range.start_ms,
            end_ms: self.range.end_ms,
            channel: self.analysis.channel,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Explicit path, then `./specmatch.toml`, then the user config directories.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("specmatch.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("specmatch").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("specmatch").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
