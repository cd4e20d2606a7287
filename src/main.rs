use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use motion_experiment::{
    CsvSink, ExperimentConfig, JsonLinesSink, Participant, RecordSink, ResponsePolicy,
    SessionError, SessionReport, SessionRunner, SimObserver, SimPresenter, TrialController,
    VirtualClock,
};
use motion_timing::{Clock, HighPrecisionTimer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

mod logging;

/// Exit status after the participant pressed the quit key.
const EXIT_CANCELLED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "motion-threshold",
    version,
    about = "Duration thresholds for motion-direction discrimination, measured with interleaved staircases"
)]
struct Cli {
    /// Experiment configuration (JSON). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "anonymous")]
    observer: String,
    #[arg(long, default_value = "")]
    gender: String,
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,
    #[arg(long, value_enum, default_value_t = RecordFormat::Csv)]
    format: RecordFormat,
    /// Overrides the seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,
    /// Duration threshold of the simulated observer, in seconds.
    #[arg(long, default_value_t = 0.12, value_parser = positive_finite)]
    sim_threshold: f64,
    #[arg(long, default_value_t = 60.0, value_parser = positive_finite)]
    sim_refresh_hz: f64,
    /// Pace the simulated display in wall-clock time.
    #[arg(long)]
    realtime: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RecordFormat {
    Csv,
    Jsonl,
}

impl RecordFormat {
    fn extension(self) -> &'static str {
        match self {
            RecordFormat::Csv => "csv",
            RecordFormat::Jsonl => "jsonl",
        }
    }

    fn open(self, path: &Path) -> Result<Box<dyn RecordSink>> {
        let sink: Box<dyn RecordSink> = match self {
            RecordFormat::Csv => Box::new(CsvSink::create(path)?),
            RecordFormat::Jsonl => Box::new(JsonLinesSink::create(path)?),
        };
        Ok(sink)
    }
}

fn positive_finite(arg: &str) -> Result<f64, String> {
    let value: f64 = arg.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} must be a positive number"))
    }
}

fn main() -> Result<ExitCode> {
    logging::init_tracing().context("failed to initialise logging")?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("invalid configuration {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;
    let stem = format!("{}_motion_temporal_threshold", cli.observer);
    let records_path = cli
        .output_dir
        .join(format!("{stem}.{}", cli.format.extension()));
    let summary_path = cli.output_dir.join(format!("{stem}_summary.json"));

    info!(
        observer = %cli.observer,
        style = %config.staircase_style,
        conditions = config.conditions.len(),
        runs = config.runs,
        seed,
        records = %records_path.display(),
        "starting session"
    );

    let sink = cli
        .format
        .open(&records_path)
        .with_context(|| format!("failed to create {}", records_path.display()))?;
    let (report, cancelled) = if cli.realtime {
        run_session(&cli, config, seed, HighPrecisionTimer::new(), sink)?
    } else {
        run_session(&cli, config, seed, VirtualClock::new(), sink)?
    };

    write_summary(&summary_path, &report)?;
    for (label, threshold) in report.mean_thresholds() {
        info!(%label, threshold_ms = threshold * 1e3, "mean threshold");
    }

    if cancelled {
        warn!(summary = %summary_path.display(), "session cancelled");
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }
    info!(summary = %summary_path.display(), "session finished");
    Ok(ExitCode::SUCCESS)
}

/// Runs a session against the simulated display and observer. Returns the
/// report and whether the session was cancelled.
fn run_session<C: Clock + Clone>(
    cli: &Cli,
    config: ExperimentConfig,
    seed: u64,
    clock: C,
    sink: Box<dyn RecordSink>,
) -> Result<(SessionReport, bool)> {
    let presenter = SimPresenter::new(clock.clone(), cli.sim_refresh_hz);
    let observer = SimObserver::new(
        clock.clone(),
        presenter.view(),
        ResponsePolicy::Psychometric {
            function: config.quest.psychometric,
            threshold_s: cli.sim_threshold,
        },
        StdRng::seed_from_u64(seed.wrapping_add(1)),
    );
    let controller = TrialController::new(
        clock,
        presenter,
        observer,
        sink,
        StdRng::seed_from_u64(seed),
    );
    let participant = Participant {
        observer_id: cli.observer.clone(),
        gender: cli.gender.clone(),
    };

    let mut runner = SessionRunner::new(config, participant, controller)?;
    match runner.run() {
        Ok(report) => Ok((report, false)),
        Err(SessionError::CancellationRequested) => Ok((runner.report().clone(), true)),
        Err(err) => Err(err.into()),
    }
}

fn write_summary(path: &Path, report: &SessionReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
