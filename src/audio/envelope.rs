//! Per-bin trimmed envelope over a spectral corpus.
//!
//! For each bin the values are ranked by distance from the median. A central
//! share of the ranking, sized by `window_amount`, is skipped; the first value
//! below and the first value above the median after that point become the
//! band edges. Missing edges fall back to the bin's global min/max.

use super::features::{Band, SpectralCorpus};
use super::schedule::{run_chunked, CancelToken, ChunkedTask, SchedulePolicy};
use crate::error::{Error, Result};

pub struct EnvelopeEstimator<'a> {
    corpus: &'a SpectralCorpus,
    window_amount: f64,
    column: Vec<f64>,
    bands: Vec<Band>,
}

impl<'a> EnvelopeEstimator<'a> {
    /// `window_amount` must lie in `(0, 1]`; the corpus must be non-empty.
    pub fn new(corpus: &'a SpectralCorpus, window_amount: f64) -> Result<Self> {
        if !(window_amount > 0.0 && window_amount <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "window_amount",
                value: window_amount.to_string(),
                reason: "must be in (0, 1]",
            });
        }
        if corpus.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        Ok(Self {
            corpus,
            window_amount,
            column: Vec::with_capacity(corpus.len()),
            bands: Vec::with_capacity(corpus.bins()),
        })
    }
}

impl ChunkedTask for EnvelopeEstimator<'_> {
    type Output = Vec<Band>;

    fn total_steps(&self) -> usize {
        self.corpus.bins()
    }

    fn step(&mut self, bin: usize) -> Result<()> {
        self.column.clear();
        self.column
            .extend(self.corpus.spectra().iter().map(|spectrum| spectrum[bin]));
        let band = trimmed_band(&self.column, self.window_amount).ok_or(Error::EmptyCorpus)?;
        self.bands.push(band);
        Ok(())
    }

    fn finish(self) -> Vec<Band> {
        self.bands
    }
}

/// Trimmed band of one bin's values. `None` for an empty slice.
pub fn trimmed_band(values: &[f64], window_amount: f64) -> Option<Band> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let median = sorted[sorted.len() / 2];

    // Stable: equal distances keep ascending value order.
    let mut ranked: Vec<(f64, f64)> = sorted.iter().map(|&v| ((v - median).abs(), v)).collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let skip = (sorted.len() as f64 * (1.0 - window_amount) / 2.0).floor() as usize;
    let mut low = None;
    let mut high = None;
    for &(_, value) in ranked.iter().skip(skip) {
        if low.is_none() && value < median {
            low = Some(value);
        }
        if high.is_none() && value > median {
            high = Some(value);
        }
        if low.is_some() && high.is_some() {
            break;
        }
    }

    Some(Band {
        low: low.unwrap_or(min),
        high: high.unwrap_or(max),
    })
}

/// Reduce `corpus` to one band per bin, yielding per `policy`.
pub fn estimate<F>(
    corpus: &SpectralCorpus,
    window_amount: f64,
    policy: &SchedulePolicy,
    cancel: &CancelToken,
    on_progress: F,
) -> Result<Vec<Band>>
where
    F: FnMut(f64),
{
    let estimator = EnvelopeEstimator::new(corpus, window_amount)?;
    run_chunked(estimator, policy, cancel, on_progress)
}

/// Per-bin mean of the corpus in dB. Non-finite values are left out, finite
/// ones are raised to `floor` first; a bin with nothing finite reads `floor`.
pub fn mean_spectrum(corpus: &SpectralCorpus, floor: f64) -> Vec<f64> {
    (0..corpus.bins())
        .map(|bin| {
            let (sum, count) = corpus
                .spectra()
                .iter()
                .map(|spectrum| spectrum[bin])
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v.max(floor), count + 1));
            if count == 0 {
                floor
            } else {
                sum / count as f64
            }
        })
        .collect()
}
