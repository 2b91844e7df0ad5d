//! Windowed spectral sampling over a sample range.

use std::ops::Range;

use super::features::SpectralCorpus;
use super::fft::{magnitude_to_db, TransformEngine, WindowFunction};
use super::schedule::{run_chunked, CancelToken, ChunkedTask, SchedulePolicy};
use crate::error::{Error, Result};

/// dB value substituted for silent or degenerate bins.
pub const DEFAULT_DB_FLOOR: f64 = -180.0;

/// Steps through `[start, end)` in non-overlapping windows of `bin_size * 2`
/// samples, one transform per step.
pub struct SpectralSampler<'a> {
    engine: &'a TransformEngine,
    waveform: &'a [f32],
    start: usize,
    end: usize,
    window_len: usize,
    window_fn: WindowFunction,
    db_floor: f64,
    scratch: Vec<f64>,
    corpus: SpectralCorpus,
}

impl<'a> SpectralSampler<'a> {
    /// `range.end` is clamped to the waveform length. An empty effective range
    /// is valid and produces an empty corpus.
    pub fn new(
        engine: &'a TransformEngine,
        waveform: &'a [f32],
        bin_size: usize,
        range: Range<usize>,
    ) -> Result<Self> {
        if bin_size == 0 || !bin_size.is_power_of_two() {
            return Err(Error::InvalidParameter {
                name: "bin_size",
                value: bin_size.to_string(),
                reason: "must be a non-zero power of two",
            });
        }
        let window_len = bin_size.checked_mul(2).ok_or_else(|| Error::InvalidParameter {
            name: "bin_size",
            value: bin_size.to_string(),
            reason: "window length overflows",
        })?;
        let end = range.end.min(waveform.len());
        let start = range.start.min(end);
        let windows = (end - start).div_ceil(window_len);

        Ok(Self {
            engine,
            waveform,
            start,
            end,
            window_len,
            window_fn: WindowFunction::default(),
            db_floor: DEFAULT_DB_FLOOR,
            scratch: Vec::with_capacity(window_len),
            corpus: SpectralCorpus::with_capacity(bin_size, windows),
        })
    }

    pub fn with_window(mut self, window_fn: WindowFunction) -> Self {
        self.window_fn = window_fn;
        self
    }

    pub fn with_db_floor(mut self, db_floor: f64) -> Self {
        self.db_floor = db_floor;
        self
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }
}

impl ChunkedTask for SpectralSampler<'_> {
    type Output = SpectralCorpus;

    fn total_steps(&self) -> usize {
        (self.end - self.start).div_ceil(self.window_len)
    }

    fn step(&mut self, index: usize) -> Result<()> {
        let offset = self.start + index * self.window_len;
        // The final window may read past `end` into the rest of the buffer;
        // only the end of the buffer itself is zero-padded.
        let stop = (offset + self.window_len).min(self.waveform.len());

        self.scratch.clear();
        self.scratch
            .extend(self.waveform[offset..stop].iter().map(|&s| f64::from(s)));
        self.scratch.resize(self.window_len, 0.0);
        self.window_fn.apply(&mut self.scratch);

        let magnitudes = self.engine.transform(&self.scratch)?;
        let normalization = magnitudes.len() as f64;
        let spectrum = magnitudes
            .into_iter()
            .map(|m| magnitude_to_db(m, normalization, self.db_floor))
            .collect();
        self.corpus.push(spectrum);
        Ok(())
    }

    fn progress(&self, completed: usize) -> f64 {
        let total = self.end - self.start;
        if total == 0 {
            return 1.0;
        }
        (completed * self.window_len).min(total) as f64 / total as f64
    }

    fn finish(self) -> SpectralCorpus {
        self.corpus
    }
}

/// Build the spectral corpus for `range` of `waveform`, yielding per
/// `policy`.
pub fn sample<F>(
    engine: &TransformEngine,
    waveform: &[f32],
    bin_size: usize,
    range: Range<usize>,
    policy: &SchedulePolicy,
    cancel: &CancelToken,
    on_progress: F,
) -> Result<SpectralCorpus>
where
    F: FnMut(f64),
{
    let sampler = SpectralSampler::new(engine, waveform, bin_size, range)?;
    run_chunked(sampler, policy, cancel, on_progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::schedule::tests::SteppingClock;
    use crate::audio::schedule::{drive, Job};
    use std::f32::consts::PI;
    use std::time::Duration;

    fn quick() -> SchedulePolicy {
        SchedulePolicy {
            slice: Duration::from_millis(30),
            pause: Duration::ZERO,
        }
    }

    fn sine(freq: f32, rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / rate).sin())
            .collect()
    }

    fn peak_bin(spectrum: &[f64]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn empty_range_gives_empty_corpus() {
        let engine = TransformEngine::default();
        let waveform = sine(440.0, 48000.0, 4096);
        let mut seen = Vec::new();
        let corpus = sample(&engine, &waveform, 512, 0..0, &quick(), &CancelToken::new(), |p| {
            seen.push(p)
        })
        .unwrap();
        assert!(corpus.is_empty());
        assert_eq!(seen, vec![1.0]);

        let backwards = sample(&engine, &waveform, 512, 3000..100, &quick(), &CancelToken::new(), |_| {})
            .unwrap();
        assert!(backwards.is_empty());
    }

    #[test]
    fn end_is_clamped_and_tail_is_padded() {
        let engine = TransformEngine::default();
        let waveform = sine(1000.0, 48000.0, 3000);
        let corpus = sample(&engine, &waveform, 512, 0..10_000, &quick(), &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.bins(), 512);
        assert!(corpus.spectra().iter().all(|s| s.len() == 512));
    }

    #[test]
    fn spectra_follow_window_order() {
        let engine = TransformEngine::default();
        let mut waveform = vec![0.0f32; 1024];
        waveform.extend(sine(3000.0, 48000.0, 1024));
        let corpus = sample(&engine, &waveform, 512, 0..2048, &quick(), &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(corpus.len(), 2);
        assert!(corpus.spectra()[0].iter().all(|&db| db == DEFAULT_DB_FLOOR));
        assert_eq!(peak_bin(&corpus.spectra()[1]), 64);
    }

    #[test]
    fn range_start_offsets_windows() {
        let engine = TransformEngine::default();
        let mut waveform = sine(3000.0, 48000.0, 1024);
        waveform.extend(vec![0.0f32; 1024]);
        let corpus = sample(&engine, &waveform, 512, 1024..2048, &quick(), &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(corpus.len(), 1);
        assert!(corpus.spectra()[0].iter().all(|&db| db == DEFAULT_DB_FLOOR));
    }

    #[test]
    fn full_scale_sine_sits_near_zero_db() {
        let engine = TransformEngine::default();
        // 64 cycles in 1024 samples: exactly on bin 64, no leakage.
        let waveform = sine(3000.0, 48000.0, 1024);
        let corpus = sample(&engine, &waveform, 512, 0..1024, &quick(), &CancelToken::new(), |_| {})
            .unwrap();
        let peak = corpus.spectra()[0][64];
        assert!(peak.abs() < 1e-3, "peak {}", peak);
    }

    #[test]
    fn progress_tracks_consumed_samples() {
        let engine = TransformEngine::default();
        let waveform = sine(1000.0, 48000.0, 48000);
        let sampler = SpectralSampler::new(&engine, &waveform, 256, 0..48000).unwrap();
        assert_eq!(sampler.total_steps(), 94);
        assert_eq!(sampler.progress(47), 47.0 * 512.0 / 48000.0);
        assert_eq!(sampler.progress(94), 1.0);

        let clock = SteppingClock::new(Duration::from_millis(10));
        let job = Job::with_clock(sampler, Duration::from_millis(30), clock);
        let mut seen = Vec::new();
        let corpus = drive(job, Duration::ZERO, |p| seen.push(p)).unwrap();

        assert_eq!(corpus.len(), 94);
        assert!(seen.len() > 2);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 1.0);
    }

    #[test]
    fn rejects_bad_bin_size() {
        let engine = TransformEngine::default();
        let waveform = vec![0.0f32; 4096];
        assert!(matches!(
            SpectralSampler::new(&engine, &waveform, 500, 0..4096),
            Err(Error::InvalidParameter { name: "bin_size", .. })
        ));
        assert!(SpectralSampler::new(&engine, &waveform, 0, 0..4096).is_err());
        assert!(matches!(
            SpectralSampler::new(&engine, &waveform, 1 << (usize::BITS - 1), 0..4096),
            Err(Error::InvalidParameter { name: "bin_size", .. })
        ));
    }

    #[test]
    fn cancelled_sampling_returns_no_corpus() {
        let engine = TransformEngine::default();
        let waveform = vec![0.0f32; 4096];
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = sample(&engine, &waveform, 512, 0..4096, &quick(), &cancel, |_| {});
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
