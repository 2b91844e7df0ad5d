use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use specmatch::audio::analysis::{AnalysisStatus, RangeAnalysis};
use specmatch::audio::features::{EnvelopePoint, SpectrumPoint};
use specmatch::audio::fft::{MagnitudeMode, WindowFunction};

/// Everything the chart side needs to overlay the analysed tracks.
#[derive(Debug, Serialize)]
pub struct Report {
    pub start_ms: f64,
    pub end_ms: Option<f64>,
    pub bin_size: usize,
    pub window_amount: f64,
    pub magnitude: MagnitudeMode,
    pub window: WindowFunction,
    pub tracks: Vec<TrackReport>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Ok,
    InsufficientData,
}

#[derive(Debug, Serialize)]
pub struct TrackReport {
    pub label: String,
    pub path: String,
    pub sample_rate: u32,
    pub start_sample: usize,
    pub end_sample: usize,
    pub windows: usize,
    pub status: TrackStatus,
    pub envelope: Vec<EnvelopePoint>,
    pub mean_spectrum: Vec<SpectrumPoint>,
}

impl TrackReport {
    pub fn from_analysis(label: &str, path: &Path, analysis: &RangeAnalysis) -> Self {
        let status = match analysis.status() {
            AnalysisStatus::Complete => TrackStatus::Ok,
            AnalysisStatus::InsufficientData => TrackStatus::InsufficientData,
        };
        Self {
            label: label.to_string(),
            path: path.display().to_string(),
            sample_rate: analysis.sample_rate,
            start_sample: analysis.samples.start,
            end_sample: analysis.samples.end,
            windows: analysis.corpus.len(),
            status,
            envelope: analysis.envelope_points(),
            mean_spectrum: analysis.mean_spectrum_points(),
        }
    }
}

pub fn write_report(report: &Report, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create report: {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report).context("Failed to write report")?;
            writer.flush()?;
            log::info!("Report written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, report).context("Failed to write report")?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use specmatch::audio::analysis::{analyze, AnalysisRequest, AnalysisSettings};
    use specmatch::audio::features::PcmBuffer;
    use specmatch::audio::fft::TransformEngine;
    use specmatch::audio::schedule::CancelToken;

    fn analysis_of(samples: Vec<f32>) -> RangeAnalysis {
        analyze(
            &TransformEngine::default(),
            &PcmBuffer::mono(samples, 8000),
            &AnalysisRequest::default(),
            &AnalysisSettings {
                bin_size: 128,
                ..AnalysisSettings::default()
            },
            &CancelToken::new(),
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn empty_track_reports_insufficient_data() {
        let track = TrackReport::from_analysis("track", Path::new("a.wav"), &analysis_of(Vec::new()));
        assert_eq!(track.status, TrackStatus::InsufficientData);
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["status"], "insufficient_data");
        assert_eq!(json["envelope"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn envelope_serialises_as_chart_points() {
        let samples: Vec<f32> = (0..2048).map(|i| ((i % 16) as f32 / 8.0) - 1.0).collect();
        let track = TrackReport::from_analysis("reference", Path::new("b.wav"), &analysis_of(samples));
        assert_eq!(track.status, TrackStatus::Ok);
        assert_eq!(track.windows, 8);
        assert_eq!(track.envelope.len(), 128);

        let json = serde_json::to_value(&track).unwrap();
        let point = &json["envelope"][1];
        assert_eq!(point["frequency_hz"], 31.25);
        assert!(point["low_db"].as_f64().unwrap() <= point["high_db"].as_f64().unwrap());
        assert_eq!(json["mean_spectrum"].as_array().map(Vec::len), Some(128));
    }
}
