use std::sync::Arc;

use motion_core::{Condition, SessionPhase};
use motion_staircase::{StairSummary, StaircaseError, StaircasePool, StaircaseStyle};
use motion_timing::{Clock, FrameSource, FrameTimer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ExperimentConfig};
use crate::controller::{Participant, TrialController, TrialError, TrialPlan, TrialTiming};
use crate::envelope::ContrastModulation;
use crate::io::{InputSource, Presenter, RecordSink, Screen, SinkError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session cancelled by the participant")]
    CancellationRequested,
    #[error(transparent)]
    Staircase(#[from] StaircaseError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl From<TrialError> for SessionError {
    fn from(err: TrialError) -> Self {
        match err {
            TrialError::Cancelled { .. } => SessionError::CancellationRequested,
            TrialError::Sink(e) => SessionError::Sink(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_index: usize,
    pub trials: usize,
    pub staircases: Vec<StairSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub observer_id: String,
    pub style: StaircaseStyle,
    pub frame_rate_hz: f64,
    pub frame_duration_s: f64,
    pub frame_rate_measured: bool,
    pub practice_trials: usize,
    pub runs: Vec<RunReport>,
    pub completed: bool,
}

impl SessionReport {
    /// Threshold per condition label, averaged over every staircase and run
    /// that produced an estimate. Labels keep their first-seen order.
    pub fn mean_thresholds(&self) -> Vec<(String, f64)> {
        let mut sums: Vec<(String, f64, usize)> = Vec::new();
        for stair in self.runs.iter().flat_map(|r| &r.staircases) {
            let Some(threshold) = stair.threshold_s else {
                continue;
            };
            match sums.iter_mut().find(|(label, _, _)| *label == stair.label) {
                Some((_, sum, n)) => {
                    *sum += threshold;
                    *n += 1;
                }
                None => sums.push((stair.label.clone(), threshold, 1)),
            }
        }
        sums.into_iter()
            .map(|(label, sum, n)| (label, sum / n as f64))
            .collect()
    }
}

/// Calibration, practice, then `runs` adaptive runs, each over a fresh
/// staircase pool.
pub struct SessionRunner<C, P, I, S, R> {
    config: ExperimentConfig,
    conditions: Vec<Arc<Condition>>,
    practice_condition: Arc<Condition>,
    controller: TrialController<C, P, I, S, R>,
    phase: SessionPhase,
    report: SessionReport,
}

impl<C, P, I, S, R> SessionRunner<C, P, I, S, R>
where
    C: Clock,
    P: Presenter,
    I: InputSource,
    S: RecordSink,
    R: Rng,
{
    pub fn new(
        config: ExperimentConfig,
        participant: Participant,
        controller: TrialController<C, P, I, S, R>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let report = SessionReport {
            observer_id: participant.observer_id.clone(),
            style: config.staircase_style,
            frame_rate_hz: config.nominal_frame_rate_hz,
            frame_duration_s: 1.0 / config.nominal_frame_rate_hz,
            frame_rate_measured: false,
            practice_trials: 0,
            runs: Vec::new(),
            completed: false,
        };
        let controller = controller
            .with_timing(TrialTiming::from_config(&config))
            .with_participant(participant)
            .with_frame_timer(FrameTimer::new(config.nominal_frame_rate_hz));
        Ok(Self {
            conditions: config.conditions.iter().cloned().map(Arc::new).collect(),
            practice_condition: Arc::new(config.practice.condition.clone()),
            config,
            controller,
            phase: SessionPhase::default(),
            report,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Progress so far; complete once `run` has returned.
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn controller(&self) -> &TrialController<C, P, I, S, R> {
        &self.controller
    }

    pub fn into_controller(self) -> TrialController<C, P, I, S, R> {
        self.controller
    }

    /// Runs the whole session. The sink is closed on every exit path; on
    /// cancellation the interrupted trial has been written first.
    pub fn run(&mut self) -> Result<SessionReport, SessionError> {
        let result = self.run_phases();
        let closed = self.controller.close_sink();
        match result {
            Ok(()) => {
                closed?;
                self.report.completed = true;
                info!(runs = self.report.runs.len(), "session complete");
                Ok(self.report.clone())
            }
            Err(err) => {
                if let Err(close_err) = closed {
                    warn!(%close_err, "failed to close the record sink");
                }
                if matches!(err, SessionError::CancellationRequested) {
                    warn!(phase = ?self.phase, "session cancelled, partial data kept");
                }
                Err(err)
            }
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            info!(from = ?self.phase, to = ?next, "session phase");
            self.phase = next;
        }
    }

    fn run_phases(&mut self) -> Result<(), SessionError> {
        self.phase = SessionPhase::Calibration;
        self.controller.calibrate(self.config.calibration_frames);
        let frame = self.controller.frame_timer().estimate();
        self.report.frame_rate_hz = frame.rate_hz;
        self.report.frame_duration_s = frame.duration_s;
        self.report.frame_rate_measured = frame.source == FrameSource::Measured;

        self.advance();
        self.run_practice()?;

        self.advance();
        for run in 1..=self.config.runs {
            if run > 1 {
                self.controller.await_key(&Screen::RunBreak {
                    next_run: run,
                    total_runs: self.config.runs,
                })?;
            }
            self.run_staircases(run)?;
        }

        self.advance();
        self.controller.show(&Screen::Finished);
        Ok(())
    }

    /// Practice trials run at constant contrast and reach the sink only when
    /// practice recording is on.
    fn plan(
        &self,
        run_index: usize,
        trial_index: usize,
        condition: Arc<Condition>,
        stim_duration_s: f64,
    ) -> TrialPlan {
        let practice = self.phase.is_practice();
        TrialPlan {
            run_index,
            trial_index,
            condition,
            stim_duration_s,
            modulation: if practice {
                ContrastModulation::None
            } else {
                self.config.contrast_mod_type
            },
            record: !practice || self.config.practice.record,
        }
    }

    fn run_practice(&mut self) -> Result<(), SessionError> {
        let trials = self.config.practice.trials;
        let duration = self.config.practice.stim_duration_s;
        if trials > 0 {
            info!(trials, "practice started");
        }
        for trial_index in 1..=trials {
            let plan = self.plan(0, trial_index, Arc::clone(&self.practice_condition), duration);
            self.controller.run_trial(&plan)?;
            self.report.practice_trials += 1;
        }
        Ok(())
    }

    fn run_staircases(&mut self, run: usize) -> Result<(), SessionError> {
        let seed: u64 = self.controller.rng_mut().random();
        let mut pool = StaircasePool::new(self.config.selection, StdRng::seed_from_u64(seed));
        let spec = self.config.staircase_spec();
        let stop = self.config.stop_rule();
        for condition in &self.conditions {
            for _ in 0..self.config.staircases_per_condition {
                pool.push(
                    Arc::clone(condition),
                    spec.build(stop, condition.duration_bounds)?,
                );
            }
        }
        info!(run, staircases = pool.len(), style = %spec.style(), "run started");

        let mut trials = 0;
        let result = loop {
            let selection = match pool.pick_next() {
                Ok(selection) => selection,
                Err(StaircaseError::PoolExhausted) => break Ok(()),
                Err(e) => break Err(SessionError::from(e)),
            };
            trials += 1;
            let plan = self.plan(run, trials, selection.condition, selection.intensity);
            let outcome = match self.controller.run_trial(&plan) {
                Ok(outcome) => outcome,
                Err(e) => break Err(e.into()),
            };
            if let Err(e) = pool.feed_response(selection.id, outcome.correct) {
                break Err(e.into());
            }
        };

        let summary = RunReport {
            run_index: run,
            trials,
            staircases: pool.summaries(),
        };
        for stair in &summary.staircases {
            info!(
                run,
                staircase = %stair.id,
                label = %stair.label,
                trials = stair.trials,
                reversals = stair.reversals.len(),
                threshold_s = ?stair.threshold_s,
                "staircase summary"
            );
        }
        self.report.runs.push(summary);
        result
    }
}
