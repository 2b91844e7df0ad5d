use serde::Serialize;

use crate::error::{Error, Result};

/// Decoded PCM: one `Vec` of normalised samples per channel.
#[derive(Clone, Debug, Default)]
pub struct PcmBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Result<&[f32]> {
        self.channels
            .get(index)
            .map(Vec::as_slice)
            .ok_or(Error::ChannelOutOfRange {
                channel: index,
                available: self.channels.len(),
            })
    }
}

/// Spectra (in dB) of consecutive non-overlapping windows, in window order.
/// Every spectrum has `window_len / 2` bins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralCorpus {
    spectra: Vec<Vec<f64>>,
    bins: usize,
}

impl SpectralCorpus {
    pub(crate) fn with_capacity(bins: usize, windows: usize) -> Self {
        Self {
            spectra: Vec::with_capacity(windows),
            bins,
        }
    }

    pub(crate) fn push(&mut self, spectrum: Vec<f64>) {
        debug_assert_eq!(spectrum.len(), self.bins);
        self.spectra.push(spectrum);
    }

    /// Build a corpus from existing spectra, rejecting ragged input.
    pub fn from_spectra(spectra: Vec<Vec<f64>>) -> Result<Self> {
        let bins = spectra.first().map_or(0, Vec::len);
        if let Some((index, spectrum)) = spectra.iter().enumerate().find(|(_, s)| s.len() != bins) {
            return Err(Error::RaggedCorpus {
                index,
                expected: bins,
                got: spectrum.len(),
            });
        }
        Ok(Self { spectra, bins })
    }

    pub fn spectra(&self) -> &[Vec<f64>] {
        &self.spectra
    }

    /// Number of spectra (windows).
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Bins per spectrum.
    pub fn bins(&self) -> usize {
        self.bins
    }
}

/// Low/high dB band for one frequency bin. `low <= high`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// One point of an envelope series, as handed to a chart.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnvelopePoint {
    pub frequency_hz: f64,
    pub low_db: f64,
    pub high_db: f64,
}

/// One point of a line spectrum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpectrumPoint {
    pub frequency_hz: f64,
    pub db: f64,
}

/// Ceiling applied to plotted dB values so nothing lands on or above 0 dB.
pub const CHART_CEILING_DB: f64 = -0.01;

/// Centre frequency of `bin` in a spectrum of `total_bins` bins.
pub fn bin_frequency(bin: usize, sample_rate: u32, total_bins: usize) -> f64 {
    if total_bins == 0 {
        return 0.0;
    }
    bin as f64 * (sample_rate as f64 / 2.0) / total_bins as f64
}

pub fn envelope_points(envelope: &[Band], sample_rate: u32) -> Vec<EnvelopePoint> {
    envelope
        .iter()
        .enumerate()
        .map(|(bin, band)| EnvelopePoint {
            frequency_hz: bin_frequency(bin, sample_rate, envelope.len()),
            low_db: band.low.min(CHART_CEILING_DB),
            high_db: band.high.min(CHART_CEILING_DB),
        })
        .collect()
}

pub fn spectrum_points(spectrum: &[f64], sample_rate: u32) -> Vec<SpectrumPoint> {
    spectrum
        .iter()
        .enumerate()
        .map(|(bin, &db)| SpectrumPoint {
            frequency_hz: bin_frequency(bin, sample_rate, spectrum.len()),
            db,
        })
        .collect()
}
