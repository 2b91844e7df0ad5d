mod cli;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;

use cli::Cli;
use report::{Report, TrackReport};
use specmatch::audio::analysis::{analyze, AnalysisRequest, AnalysisSettings, AnalysisStatus};
use specmatch::audio::decode::decode_audio;
use specmatch::audio::fft::TransformEngine;
use specmatch::audio::schedule::CancelToken;
use specmatch::config::{self, Config};

/// Progress bars count in thousandths.
const BAR_LEN: u64 = 1000;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };
    merge_cli(&cli, &mut config);
    config.validate()?;

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }
    if let Some(ref reference) = cli.reference {
        if !reference.exists() {
            anyhow::bail!("Reference file not found: {}", reference.display());
        }
    }

    let settings = config.settings();
    let request = config.request();
    log::info!(
        "Range: {}ms..{}, bin size {}, window amount {:.2}, magnitude {:?}",
        request.start_ms,
        request
            .end_ms
            .map_or_else(|| "end".to_string(), |ms| format!("{}ms", ms)),
        settings.bin_size,
        settings.window_amount,
        config.analysis.magnitude
    );

    let engine = TransformEngine::new(config.analysis.magnitude);
    let cancel = CancelToken::new();
    let multi = if cli.no_progress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")?
        .progress_chars("=>-");
    let new_bar = || multi.add(ProgressBar::new(BAR_LEN).with_style(style.clone()));

    let track = TrackJob {
        label: "track",
        path: &cli.input,
        bar: new_bar(),
    };
    let tracks = match cli.reference {
        Some(ref reference) => {
            let reference = TrackJob {
                label: "reference",
                path: reference,
                bar: new_bar(),
            };
            // Each analysis stays single-threaded; the two run side by side
            // and share the twiddle cache.
            let (a, b) = rayon::join(
                || track.run(&engine, &request, &settings, &cancel),
                || reference.run(&engine, &request, &settings, &cancel),
            );
            vec![a?, b?]
        }
        None => vec![track.run(&engine, &request, &settings, &cancel)?],
    };

    log::debug!("Twiddle tables cached for sizes {:?}", engine.cached_sizes());

    let report = Report {
        start_ms: request.start_ms,
        end_ms: request.end_ms,
        bin_size: settings.bin_size,
        window_amount: settings.window_amount,
        magnitude: config.analysis.magnitude,
        window: settings.window,
        tracks,
    };
    report::write_report(&report, cli.output.as_deref())?;

    log::info!("Done");
    Ok(())
}

/// Config values stand unless the flag was moved off its default.
fn merge_cli(cli: &Cli, config: &mut Config) {
    if cli.start_ms != 0.0 { config.range.start_ms = cli.start_ms; }
    if cli.end_ms.is_some() { config.range.end_ms = cli.end_ms; }
    if cli.bin_size != 512 { config.analysis.bin_size = cli.bin_size; }
    if cli.window_amount != 0.4 { config.analysis.window_amount = cli.window_amount; }
    if cli.channel != 0 { config.analysis.channel = cli.channel; }
    if let Some(magnitude) = cli.magnitude { config.analysis.magnitude = magnitude; }
    if let Some(window) = cli.window { config.analysis.window = window; }
    if cli.slice_ms != 30 { config.schedule.slice_ms = cli.slice_ms; }
}

struct TrackJob<'a> {
    label: &'static str,
    path: &'a Path,
    bar: ProgressBar,
}

impl TrackJob<'_> {
    fn run(
        &self,
        engine: &TransformEngine,
        request: &AnalysisRequest,
        settings: &AnalysisSettings,
        cancel: &CancelToken,
    ) -> Result<TrackReport> {
        let result = self.analyze(engine, request, settings, cancel);
        if result.is_err() {
            // No point finishing the other track.
            cancel.cancel();
            self.bar.abandon_with_message(format!("{}: failed", self.label));
        }
        result
    }

    fn analyze(
        &self,
        engine: &TransformEngine,
        request: &AnalysisRequest,
        settings: &AnalysisSettings,
        cancel: &CancelToken,
    ) -> Result<TrackReport> {
        self.bar.set_message(format!("{}: decoding", self.label));
        let buffer = decode_audio(self.path)?;

        let analysis = analyze(engine, &buffer, request, settings, cancel, |progress| {
            self.bar.set_position((progress.overall * BAR_LEN as f64) as u64);
            self.bar.set_message(format!("{}: {}", self.label, progress.phase));
        })
        .with_context(|| format!("Failed to analyse {}", self.path.display()))?;

        match analysis.status() {
            AnalysisStatus::Complete => {
                self.bar.finish_with_message(format!(
                    "{}: {} windows",
                    self.label,
                    analysis.corpus.len()
                ));
            }
            AnalysisStatus::InsufficientData => {
                log::warn!("{}: insufficient data in range", self.path.display());
                self.bar.finish_with_message(format!("{}: insufficient data", self.label));
            }
        }

        Ok(TrackReport::from_analysis(self.label, self.path, &analysis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_only_moved_flags() {
        let mut config = config::parse_config(
            "[analysis]\nbin_size = 2048\nwindow_amount = 0.6\n[range]\nstart_ms = 500\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from(["specmatch", "a.wav", "--window-amount", "0.3"]).unwrap();
        merge_cli(&cli, &mut config);

        assert_eq!(config.analysis.bin_size, 2048);
        assert_eq!(config.analysis.window_amount, 0.3);
        assert_eq!(config.range.start_ms, 500.0);
    }
}
