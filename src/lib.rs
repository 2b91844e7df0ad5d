//! Spectral envelope analysis for comparing a track against a reference.
//!
//! Audio in a sample range is cut into power-of-two windows, each window is
//! transformed into a dB magnitude spectrum, and a trimmed band is estimated
//! per frequency bin. Long runs are split into cooperative slices so callers
//! get progress reports and can cancel between slices.

pub mod audio;
pub mod config;
pub mod error;

pub use error::{Error, Result};
