use std::sync::Arc;
use std::time::Duration;

use motion_core::{Condition, Key, KeyResponse, MotionDirection, TrialRecord, TrialState};
use motion_timing::{CalibrationStats, Clock, FrameTimer};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ExperimentConfig;
use crate::envelope::{self, ContrastModulation};
use crate::io::{AudioCue, FrameReport, GratingFrame, InputSource, Presenter, RecordSink, Screen, SinkError};

/// Waits and display options shared by every trial of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialTiming {
    pub isi_s: f64,
    pub feedback_s: f64,
    pub iti_s: f64,
    pub orientation_deg: f64,
    pub show_response_cue: bool,
    pub success_tone: bool,
}

impl TrialTiming {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            isi_s: config.fixation_grating_isi_s,
            feedback_s: config.feedback_s,
            iti_s: config.iti_s,
            orientation_deg: config.grating_ori_deg,
            show_response_cue: config.show_response_cue,
            success_tone: config.success_tone,
        }
    }
}

impl Default for TrialTiming {
    fn default() -> Self {
        Self::from_config(&ExperimentConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Participant {
    pub observer_id: String,
    pub gender: String,
}

/// What to show on one trial.
#[derive(Debug, Clone)]
pub struct TrialPlan {
    pub run_index: usize,
    pub trial_index: usize,
    pub condition: Arc<Condition>,
    pub stim_duration_s: f64,
    pub modulation: ContrastModulation,
    /// Whether the trial's record goes to the sink.
    pub record: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub record: TrialRecord,
    pub correct: bool,
}

#[derive(Debug, Error)]
pub enum TrialError {
    /// The quit key was pressed. The partial record has already been written.
    #[error("trial cancelled by the participant during {state:?}")]
    Cancelled { state: TrialState },
    #[error(transparent)]
    Sink(#[from] SinkError),
}

struct Quit;

fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

/// Runs single trials against the injected clock, display, keyboard and
/// record store.
pub struct TrialController<C, P, I, S, R> {
    clock: C,
    presenter: P,
    input: I,
    sink: S,
    rng: R,
    timing: TrialTiming,
    participant: Participant,
    frames: FrameTimer,
    state: TrialState,
}

impl<C, P, I, S, R> TrialController<C, P, I, S, R>
where
    C: Clock,
    P: Presenter,
    I: InputSource,
    S: RecordSink,
    R: Rng,
{
    pub fn new(clock: C, presenter: P, input: I, sink: S, rng: R) -> Self {
        Self {
            clock,
            presenter,
            input,
            sink,
            rng,
            timing: TrialTiming::default(),
            participant: Participant::default(),
            frames: FrameTimer::new(60.0),
            state: TrialState::Idle,
        }
    }

    pub fn with_timing(mut self, timing: TrialTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_participant(mut self, participant: Participant) -> Self {
        self.participant = participant;
        self
    }

    pub fn with_frame_timer(mut self, frames: FrameTimer) -> Self {
        self.frames = frames;
        self
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frames
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn close_sink(&mut self) -> Result<(), SinkError> {
        self.sink.close()
    }

    /// Presents `screen` once and feeds the frame report to the frame timer.
    pub fn show(&mut self, screen: &Screen) -> FrameReport {
        let report = self.presenter.present(screen);
        if let Err(anomaly) = self.frames.record_report(report.frame_duration_s) {
            debug!(%anomaly, state = ?self.state, "unusable frame report");
        }
        report
    }

    /// Presents blank frames to measure the refresh interval.
    pub fn calibrate(&mut self, frames: usize) -> CalibrationStats {
        let mut span: Option<(f64, f64)> = None;
        for _ in 0..frames {
            let elapsed = self.show(&Screen::Blank).elapsed_s;
            let first = span.map_or(elapsed, |(first, _)| first);
            span = Some((first, elapsed));
        }
        let stats = self.frames.calibration_stats();
        let estimate = self.frames.estimate();
        info!(
            frame_ms = estimate.duration_s * 1e3,
            rate_hz = estimate.rate_hz,
            jitter_ms = stats.jitter_ns / 1e6,
            span_s = span.map_or(0.0, |(first, last)| last - first),
            source = ?estimate.source,
            "frame calibration"
        );
        stats
    }

    /// Shows `screen` and blocks for any key. The quit key cancels.
    pub fn await_key(&mut self, screen: &Screen) -> Result<Key, TrialError> {
        self.show(screen);
        let key = self.input.wait_for_key();
        if key.is_quit() {
            info!(%key, "cancelled while waiting");
            return Err(TrialError::Cancelled { state: self.state });
        }
        Ok(key)
    }

    fn transition(&mut self, next: TrialState) {
        debug!(from = ?self.state, to = ?next, "trial state");
        self.state = next;
    }

    pub fn run_trial(&mut self, plan: &TrialPlan) -> Result<TrialOutcome, TrialError> {
        let frame = self.frames.estimate();
        let condition = &plan.condition;
        let mut record = TrialRecord {
            observer_id: self.participant.observer_id.clone(),
            gender: self.participant.gender.clone(),
            run_index: plan.run_index,
            trial_index: plan.trial_index,
            motion_direction: None,
            grating_orientation: self.timing.orientation_deg,
            response_key: None,
            grating_size: condition.grating_deg,
            max_contrast: condition.max_contrast,
            spatial_freq: condition.spatial_freq_cpd,
            temporal_freq: condition.temporal_freq_hz,
            stim_duration_s: plan.stim_duration_s,
            frame_rate_hz: frame.rate_hz,
            frame_duration_s: frame.duration_s,
            correct: None,
            reaction_time_s: None,
            stimulus_onset: None,
            stimulus_offset: None,
        };
        self.transition(TrialState::Idle);

        let correct = match self.present_trial(plan, &mut record) {
            Ok(correct) => correct,
            Err(Quit) => {
                let state = self.state;
                self.transition(TrialState::Aborted);
                if plan.record {
                    self.sink.append(&record)?;
                }
                info!(
                    run = plan.run_index,
                    trial = plan.trial_index,
                    state = ?state,
                    "trial aborted"
                );
                return Err(TrialError::Cancelled { state });
            }
        };

        self.transition(TrialState::IntertrialInterval);
        self.show(&Screen::Blank);
        if plan.record {
            self.sink.append(&record)?;
        }
        self.clock.sleep(secs(self.timing.iti_s));
        if self.check_quit(&mut record).is_err() {
            // the record is already in the sink
            self.transition(TrialState::Aborted);
            info!(
                run = plan.run_index,
                trial = plan.trial_index,
                "cancelled after the trial"
            );
            return Err(TrialError::Cancelled {
                state: TrialState::IntertrialInterval,
            });
        }
        self.transition(TrialState::Complete);

        info!(
            run = plan.run_index,
            trial = plan.trial_index,
            label = %condition.label,
            duration_s = plan.stim_duration_s,
            correct,
            rt_s = ?record.reaction_time_s,
            "trial complete"
        );
        Ok(TrialOutcome { record, correct })
    }

    fn check_quit(&mut self, record: &mut TrialRecord) -> Result<(), Quit> {
        match self.input.poll_keys().into_iter().find(Key::is_quit) {
            Some(key) => {
                record.response_key.get_or_insert_with(|| key.to_string());
                Err(Quit)
            }
            None => Ok(()),
        }
    }

    /// Fixation through feedback. Returns whether the response was correct.
    fn present_trial(&mut self, plan: &TrialPlan, record: &mut TrialRecord) -> Result<bool, Quit> {
        let condition = &plan.condition;

        self.transition(TrialState::FixationWait);
        self.show(&Screen::Fixation);
        let key = self.input.wait_for_key();
        if key.is_quit() {
            record.response_key = Some(key.to_string());
            return Err(Quit);
        }

        self.transition(TrialState::InterStimInterval);
        self.show(&Screen::Blank);
        self.clock.sleep(secs(self.timing.isi_s));
        self.check_quit(record)?;

        self.transition(TrialState::StimulusPresentation);
        let direction = if self.rng.random_bool(0.5) {
            MotionDirection::Leftward
        } else {
            MotionDirection::Rightward
        };
        record.motion_direction = Some(direction);
        let cycle_s = condition.cycle_period_s();
        let frame_s = self.frames.estimate().duration_s;
        let onset = self.clock.now();
        record.stimulus_onset = Some(onset);
        loop {
            self.check_quit(record)?;
            let elapsed = self.clock.elapsed(onset);
            let grating = GratingFrame {
                phase: direction.sign() * elapsed / cycle_s,
                contrast: envelope::intensity(
                    elapsed,
                    plan.stim_duration_s,
                    condition.max_contrast,
                    plan.modulation,
                    frame_s,
                ),
                orientation_deg: self.timing.orientation_deg,
                size_deg: condition.grating_deg,
                spatial_freq_cpd: condition.spatial_freq_cpd,
                mask: condition.mask_type,
                direction,
            };
            self.show(&Screen::Grating(grating));
            if self.clock.elapsed(onset) > plan.stim_duration_s {
                break;
            }
        }
        record.stimulus_offset = Some(self.clock.now());
        let frame = self.frames.estimate();
        record.frame_rate_hz = frame.rate_hz;
        record.frame_duration_s = frame.duration_s;

        self.transition(TrialState::ResponseWait);
        self.show(&Screen::Blank);
        if self.timing.show_response_cue {
            self.show(&Screen::ResponseCue);
        }
        let window_start = self.clock.now();
        let correct = loop {
            let key = self.input.wait_for_key();
            match direction.classify(&key) {
                KeyResponse::Judged { correct } => {
                    record.reaction_time_s = Some(self.clock.elapsed(window_start));
                    record.response_key = Some(key.to_string());
                    break correct;
                }
                KeyResponse::Quit => {
                    record.response_key = Some(key.to_string());
                    return Err(Quit);
                }
                KeyResponse::Ignored => debug!(%key, "ignored key in response window"),
            }
        };
        record.correct = Some(correct);

        self.transition(TrialState::Feedback);
        self.show(&Screen::Feedback { correct });
        if correct && self.timing.success_tone {
            self.presenter.play_cue(AudioCue::Success);
        }
        self.clock.sleep(secs(self.timing.feedback_s));
        self.check_quit(record)?;
        Ok(correct)
    }
}
