use std::fmt;
use std::ops::Range;

use super::envelope::{mean_spectrum, EnvelopeEstimator};
use super::features::{
    envelope_points, spectrum_points, Band, EnvelopePoint, PcmBuffer, SpectralCorpus,
    SpectrumPoint,
};
use super::fft::{TransformEngine, WindowFunction};
use super::sampler::{SpectralSampler, DEFAULT_DB_FLOOR};
use super::schedule::{run_chunked, CancelToken, SchedulePolicy};
use crate::error::Result;

/// Share of the overall progress bar given to building spectra; the envelope
/// pass gets the rest.
const SAMPLING_SHARE: f64 = 0.2;

/// Parameters of one range analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSettings {
    /// Half the transform length; spectra have this many bins.
    pub bin_size: usize,
    pub window_amount: f64,
    pub window: WindowFunction,
    pub db_floor: f64,
    pub schedule: SchedulePolicy,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            bin_size: 512,
            window_amount: 0.4,
            window: WindowFunction::Rectangular,
            db_floor: DEFAULT_DB_FLOOR,
            schedule: SchedulePolicy::default(),
        }
    }
}

/// Which part of a buffer to analyse.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnalysisRequest {
    pub start_ms: f64,
    /// `None` runs to the end of the buffer.
    pub end_ms: Option<f64>,
    pub channel: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    BuildingSpectra,
    ComputingAverages,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::BuildingSpectra => write!(f, "building spectra"),
            Phase::ComputingAverages => write!(f, "computing averages"),
        }
    }
}

/// Progress update from [`analyze`]. `fraction` is within the phase,
/// `overall` across both phases.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    pub phase: Phase,
    pub fraction: f64,
    pub overall: f64,
}

impl Progress {
    fn new(phase: Phase, fraction: f64) -> Self {
        let overall = match phase {
            Phase::BuildingSpectra => SAMPLING_SHARE * fraction,
            Phase::ComputingAverages => SAMPLING_SHARE + (1.0 - SAMPLING_SHARE) * fraction,
        };
        Self {
            phase,
            fraction,
            overall,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisStatus {
    Complete,
    /// The range held no samples; there is nothing to plot.
    InsufficientData,
}

/// Result of analysing one range of one buffer.
#[derive(Clone, Debug)]
pub struct RangeAnalysis {
    pub sample_rate: u32,
    /// Effective sample range after clamping.
    pub samples: Range<usize>,
    pub corpus: SpectralCorpus,
    pub envelope: Vec<Band>,
    pub mean_spectrum: Vec<f64>,
}

impl RangeAnalysis {
    pub fn status(&self) -> AnalysisStatus {
        if self.corpus.is_empty() {
            AnalysisStatus::InsufficientData
        } else {
            AnalysisStatus::Complete
        }
    }

    pub fn envelope_points(&self) -> Vec<EnvelopePoint> {
        envelope_points(&self.envelope, self.sample_rate)
    }

    pub fn mean_spectrum_points(&self) -> Vec<SpectrumPoint> {
        spectrum_points(&self.mean_spectrum, self.sample_rate)
    }
}

/// `ms × rate / 1000`, floored. Negative times map to sample 0.
pub fn ms_to_sample(ms: f64, sample_rate: u32) -> usize {
    (ms * sample_rate as f64 / 1000.0).max(0.0).floor() as usize
}

/// Build spectra for the requested range, then reduce them to an envelope.
///
/// An empty range is not an error: the result carries
/// [`AnalysisStatus::InsufficientData`] and empty series.
pub fn analyze<F>(
    engine: &TransformEngine,
    buffer: &PcmBuffer,
    request: &AnalysisRequest,
    settings: &AnalysisSettings,
    cancel: &CancelToken,
    mut on_progress: F,
) -> Result<RangeAnalysis>
where
    F: FnMut(Progress),
{
    let waveform = buffer.channel(request.channel)?;
    let start = ms_to_sample(request.start_ms, buffer.sample_rate);
    let end = request
        .end_ms
        .map_or(waveform.len(), |ms| ms_to_sample(ms, buffer.sample_rate))
        .min(waveform.len());
    let samples = start.min(end)..end;

    log::info!(
        "Building spectra: samples {}..{} of channel {}, bin size {}",
        samples.start,
        samples.end,
        request.channel,
        settings.bin_size
    );
    let sampler = SpectralSampler::new(engine, waveform, settings.bin_size, samples.clone())?
        .with_window(settings.window)
        .with_db_floor(settings.db_floor);
    let corpus = run_chunked(sampler, &settings.schedule, cancel, |f| {
        on_progress(Progress::new(Phase::BuildingSpectra, f))
    })?;

    if corpus.is_empty() {
        log::warn!("Range {}..{} holds no samples, nothing to average", samples.start, samples.end);
        on_progress(Progress::new(Phase::ComputingAverages, 1.0));
        return Ok(RangeAnalysis {
            sample_rate: buffer.sample_rate,
            samples,
            corpus,
            envelope: Vec::new(),
            mean_spectrum: Vec::new(),
        });
    }

    log::info!(
        "Computing averages: {} spectra x {} bins (window amount {:.2})",
        corpus.len(),
        corpus.bins(),
        settings.window_amount
    );
    let estimator = EnvelopeEstimator::new(&corpus, settings.window_amount)?;
    let envelope = run_chunked(estimator, &settings.schedule, cancel, |f| {
        on_progress(Progress::new(Phase::ComputingAverages, f))
    })?;
    let mean_spectrum = mean_spectrum(&corpus, settings.db_floor);

    Ok(RangeAnalysis {
        sample_rate: buffer.sample_rate,
        samples,
        corpus,
        envelope,
        mean_spectrum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::f64::consts::PI;
    use std::time::Duration;

    fn sine_buffer(freq: f64, rate: u32, seconds: f64) -> PcmBuffer {
        let len = (rate as f64 * seconds) as usize;
        let samples = (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / rate as f64).sin() as f32)
            .collect();
        PcmBuffer::mono(samples, rate)
    }

    fn settings() -> AnalysisSettings {
        AnalysisSettings {
            schedule: SchedulePolicy {
                slice: Duration::from_millis(30),
                pause: Duration::ZERO,
            },
            ..AnalysisSettings::default()
        }
    }

    fn run(buffer: &PcmBuffer, request: AnalysisRequest) -> Result<RangeAnalysis> {
        let engine = TransformEngine::default();
        analyze(&engine, buffer, &request, &settings(), &CancelToken::new(), |_| {})
    }

    #[test]
    fn sine_stands_out_in_envelope() {
        let buffer = sine_buffer(1000.0, 48000, 2.0);
        let analysis = run(&buffer, AnalysisRequest::default()).unwrap();

        assert_eq!(analysis.status(), AnalysisStatus::Complete);
        assert_eq!(analysis.corpus.len(), 94);
        assert_eq!(analysis.envelope.len(), 512);

        let points = analysis.envelope_points();
        let peak = points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.frequency_hz - 1000.0)
                    .abs()
                    .total_cmp(&(b.frequency_hz - 1000.0).abs())
            })
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 21);

        let high = |bin: usize| analysis.envelope[bin].high;
        assert!(high(peak) > high(peak - 5) + 10.0, "{} vs {}", high(peak), high(peak - 5));
        assert!(high(peak) > high(peak + 5) + 10.0, "{} vs {}", high(peak), high(peak + 5));
        assert!(analysis.envelope.iter().all(|b| b.low <= b.high));
        assert!(points.iter().all(|p| p.high_db < 0.0 && p.low_db < 0.0));
    }

    #[test]
    fn empty_range_is_insufficient_data() {
        let buffer = sine_buffer(1000.0, 48000, 0.5);
        let analysis = run(
            &buffer,
            AnalysisRequest {
                start_ms: 0.0,
                end_ms: Some(0.0),
                channel: 0,
            },
        )
        .unwrap();
        assert_eq!(analysis.status(), AnalysisStatus::InsufficientData);
        assert!(analysis.envelope_points().is_empty());
        assert!(analysis.mean_spectrum_points().is_empty());
    }

    #[test]
    fn range_past_end_is_clamped() {
        let buffer = sine_buffer(1000.0, 48000, 0.5);
        let analysis = run(
            &buffer,
            AnalysisRequest {
                start_ms: 250.0,
                end_ms: Some(30_000.0),
                channel: 0,
            },
        )
        .unwrap();
        assert_eq!(analysis.samples, 12000..24000);
        assert_eq!(analysis.corpus.len(), 12);
    }

    #[test]
    fn progress_runs_through_both_phases() {
        let buffer = sine_buffer(440.0, 44100, 1.0);
        let engine = TransformEngine::default();
        let mut seen = Vec::new();
        analyze(
            &engine,
            &buffer,
            &AnalysisRequest::default(),
            &settings(),
            &CancelToken::new(),
            |p| seen.push(p),
        )
        .unwrap();

        assert!(seen.windows(2).all(|w| w[0].overall <= w[1].overall));
        let first_average = seen
            .iter()
            .position(|p| p.phase == Phase::ComputingAverages)
            .unwrap();
        assert!(seen[..first_average].iter().all(|p| p.phase == Phase::BuildingSpectra));
        assert!(seen[first_average..].iter().all(|p| p.phase == Phase::ComputingAverages));
        assert_eq!(seen[first_average - 1].overall, SAMPLING_SHARE);
        assert_eq!(seen.last().unwrap().overall, 1.0);
    }

    #[test]
    fn missing_channel_is_an_error() {
        let buffer = sine_buffer(1000.0, 48000, 0.1);
        let result = run(
            &buffer,
            AnalysisRequest {
                channel: 2,
                ..AnalysisRequest::default()
            },
        );
        assert!(matches!(result, Err(Error::ChannelOutOfRange { channel: 2, .. })));
    }

    #[test]
    fn cancelled_analysis_yields_nothing() {
        let buffer = sine_buffer(1000.0, 48000, 0.1);
        let engine = TransformEngine::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = analyze(
            &engine,
            &buffer,
            &AnalysisRequest::default(),
            &settings(),
            &cancel,
            |_| {},
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn ms_conversion() {
        assert_eq!(ms_to_sample(1000.0, 48000), 48000);
        assert_eq!(ms_to_sample(0.5, 44100), 22);
        assert_eq!(ms_to_sample(-10.0, 44100), 0);
    }

    #[test]
    fn phase_labels() {
        assert_eq!(Phase::BuildingSpectra.to_string(), "building spectra");
        assert_eq!(Phase::ComputingAverages.to_string(), "computing averages");
    }
}
