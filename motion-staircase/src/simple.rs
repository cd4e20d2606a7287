use motion_core::DurationBounds;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::StairHistory;
use crate::{Staircase, StaircaseError, StaircaseStyle, StopRule, ThresholdEstimate};

/// Scale on which step sizes are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Linear,
    /// Steps in log10 units.
    Log,
    /// Steps in decibels, 20·log10.
    Db,
}

impl StepType {
    fn to_scale(self, intensity: f64) -> f64 {
        match self {
            StepType::Linear => intensity,
            StepType::Log => intensity.log10(),
            StepType::Db => 20.0 * intensity.log10(),
        }
    }

    fn from_scale(self, value: f64) -> f64 {
        match self {
            StepType::Linear => value,
            StepType::Log => 10f64.powf(value),
            StepType::Db => 10f64.powf(value / 20.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleSettings {
    pub start_s: f64,
    /// Step schedule: advances one entry per reversal, then stays on the last.
    pub step_sizes: Vec<f64>,
    /// Consecutive correct responses needed before stepping down.
    #[serde(default = "default_n_down")]
    pub n_down: usize,
    #[serde(default)]
    pub step_type: StepType,
    /// How many final reversals are averaged into the threshold estimate.
    #[serde(default = "default_estimate_reversals")]
    pub estimate_reversals: usize,
}

fn default_n_down() -> usize {
    1
}

fn default_estimate_reversals() -> usize {
    5
}

impl Default for SimpleSettings {
    fn default() -> Self {
        Self {
            start_s: 0.5,
            step_sizes: vec![0.1],
            n_down: 1,
            step_type: StepType::Linear,
            estimate_reversals: 5,
        }
    }
}

impl SimpleSettings {
    pub fn validate(&self, bounds: DurationBounds) -> Result<(), StaircaseError> {
        let invalid = |msg: String| Err(StaircaseError::InvalidSettings(msg));
        if !bounds.contains(self.start_s) {
            return invalid(format!(
                "start {} s lies outside [{}, {}]",
                self.start_s, bounds.min_s, bounds.max_s
            ));
        }
        if self.step_sizes.is_empty() {
            return invalid("step_sizes must not be empty".into());
        }
        if let Some(bad) = self.step_sizes.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return invalid(format!("step size {bad} must be positive"));
        }
        if self.n_down == 0 {
            return invalid("n_down must be at least 1".into());
        }
        if self.estimate_reversals == 0 {
            return invalid("estimate_reversals must be at least 1".into());
        }
        Ok(())
    }
}

/// N-down/1-up staircase: `n_down` correct responses in a row shorten the
/// duration by one step, any incorrect response lengthens it immediately.
#[derive(Debug, Clone)]
pub struct SimpleStaircase {
    settings: SimpleSettings,
    stop: StopRule,
    bounds: DurationBounds,
    intensity: f64,
    correct_run: usize,
    step_index: usize,
    history: StairHistory,
    finished: bool,
}

impl SimpleStaircase {
    pub fn new(
        settings: SimpleSettings,
        stop: StopRule,
        bounds: DurationBounds,
    ) -> Result<Self, StaircaseError> {
        settings.validate(bounds)?;
        stop.validate()?;
        let intensity = settings.start_s;
        Ok(Self {
            settings,
            stop,
            bounds,
            intensity,
            correct_run: 0,
            step_index: 0,
            history: StairHistory::new(intensity),
            finished: false,
        })
    }

    pub fn step_size(&self) -> f64 {
        self.settings.step_sizes[self.step_index]
    }

    fn shifted(&self, delta: f64) -> f64 {
        let step_type = self.settings.step_type;
        let moved = step_type.from_scale(step_type.to_scale(self.intensity) + delta);
        self.bounds.clamp(moved)
    }
}

impl Staircase for SimpleStaircase {
    fn style(&self) -> StaircaseStyle {
        StaircaseStyle::Simple
    }

    fn next_intensity(&self) -> f64 {
        self.intensity
    }

    fn register_response(&mut self, correct: bool) -> Result<(), StaircaseError> {
        if self.finished {
            return Err(StaircaseError::Finished {
                trials: self.history.trial_count(),
            });
        }
        let tested = self.intensity;
        let step = self.step_size();

        let next = if correct {
            self.correct_run += 1;
            if self.correct_run >= self.settings.n_down {
                self.correct_run = 0;
                self.shifted(-step)
            } else {
                tested
            }
        } else {
            self.correct_run = 0;
            self.shifted(step)
        };

        if self.history.record(tested, correct, next) {
            debug!(intensity = tested, reversals = self.history.reversal_count(), "reversal");
            if self.step_index + 1 < self.settings.step_sizes.len() {
                self.step_index += 1;
            }
        }
        self.intensity = next;

        if self
            .stop
            .is_met(self.history.trial_count(), self.history.reversal_count())
        {
            self.finished = true;
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn history(&self) -> &StairHistory {
        &self.history
    }

    fn threshold_estimate(&self) -> Option<ThresholdEstimate> {
        self.history
            .last_reversals_mean(self.settings.estimate_reversals)
            .map(|(threshold_s, spread)| ThresholdEstimate {
                threshold_s,
                spread_s: Some(spread),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staircase(settings: SimpleSettings) -> SimpleStaircase {
        SimpleStaircase::new(settings, StopRule::Trials(30), DurationBounds::new(0.01, 1.0)).unwrap()
    }

    fn stopping(stop: StopRule) -> SimpleStaircase {
        SimpleStaircase::new(SimpleSettings::default(), stop, DurationBounds::new(0.01, 1.0)).unwrap()
    }

    fn sign_flips(sequence: &[f64]) -> usize {
        let signs: Vec<bool> = sequence
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d != 0.0)
            .map(|d| d > 0.0)
            .collect();
        signs.windows(2).filter(|w| w[0] != w[1]).count()
    }

    #[test]
    fn one_down_one_up_sequence() {
        let mut stair = staircase(SimpleSettings::default());
        for correct in [true, true, false, true, true] {
            stair.register_response(correct).unwrap();
        }
        let expected = [0.5, 0.4, 0.3, 0.4, 0.3, 0.2];
        let realized = stair.history().intensities();
        assert_eq!(expected.len(), realized.len());
        for (e, r) in expected.iter().zip(realized) {
            assert!((e - r).abs() < 1e-9, "expected {e}, got {r}");
        }
        let reversals = stair.history().reversals();
        assert_eq!(2, reversals.len());
        assert!((reversals[0] - 0.3).abs() < 1e-9);
        assert!((reversals[1] - 0.4).abs() < 1e-9);
        assert_eq!(sign_flips(realized), stair.history().reversal_count());
    }

    #[test]
    fn two_down_waits_for_a_run_of_correct() {
        let mut stair = staircase(SimpleSettings {
            n_down: 2,
            ..SimpleSettings::default()
        });
        stair.register_response(true).unwrap();
        assert!((stair.next_intensity() - 0.5).abs() < 1e-12);
        stair.register_response(true).unwrap();
        assert!((stair.next_intensity() - 0.4).abs() < 1e-9);
        stair.register_response(true).unwrap();
        stair.register_response(false).unwrap();
        assert!((stair.next_intensity() - 0.5).abs() < 1e-9);
        assert_eq!(1, stair.history().reversal_count());
    }

    #[test]
    fn clamping_is_not_a_reversal() {
        let mut stair = SimpleStaircase::new(
            SimpleSettings {
                start_s: 0.15,
                ..SimpleSettings::default()
            },
            StopRule::Trials(30),
            DurationBounds::new(0.1, 1.0),
        )
        .unwrap();
        for _ in 0..4 {
            stair.register_response(true).unwrap();
        }
        assert!((stair.next_intensity() - 0.1).abs() < 1e-12);
        assert_eq!(0, stair.history().reversal_count());
        stair.register_response(false).unwrap();
        assert_eq!(1, stair.history().reversal_count());
        assert_eq!(sign_flips(stair.history().intensities()), 1);
    }

    #[test]
    fn step_schedule_advances_on_reversals() {
        let mut stair = staircase(SimpleSettings {
            step_sizes: vec![0.2, 0.1, 0.05],
            ..SimpleSettings::default()
        });
        stair.register_response(true).unwrap(); // 0.5 -> 0.3
        assert!((stair.step_size() - 0.2).abs() < 1e-12);
        stair.register_response(false).unwrap(); // reversal, 0.3 -> 0.5
        assert!((stair.step_size() - 0.1).abs() < 1e-12);
        stair.register_response(true).unwrap(); // reversal, 0.5 -> 0.4
        stair.register_response(false).unwrap(); // reversal
        stair.register_response(true).unwrap(); // reversal
        assert!((stair.step_size() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn log_steps_are_multiplicative() {
        let mut stair = staircase(SimpleSettings {
            start_s: 0.4,
            step_sizes: vec![0.30103],
            step_type: StepType::Log,
            ..SimpleSettings::default()
        });
        stair.register_response(true).unwrap();
        assert!((stair.next_intensity() - 0.2).abs() < 1e-4);
        stair.register_response(false).unwrap();
        assert!((stair.next_intensity() - 0.4).abs() < 1e-4);
    }

    #[test]
    fn stops_after_reversal_count() {
        let mut stair = stopping(StopRule::Reversals(3));
        let mut correct = true;
        while !stair.is_finished() {
            stair.register_response(correct).unwrap();
            correct = !correct;
        }
        assert_eq!(3, stair.history().reversal_count());
        assert_eq!(
            Err(StaircaseError::Finished { trials: 4 }),
            stair.register_response(true)
        );
    }

    #[test]
    fn finished_staircase_rejects_responses() {
        let mut stair = stopping(StopRule::Trials(2));
        stair.register_response(true).unwrap();
        stair.register_response(true).unwrap();
        assert!(stair.is_finished());
        assert!(stair.register_response(false).is_err());
        assert_eq!(2, stair.history().trial_count());
    }

    #[test]
    fn estimate_averages_final_reversals() {
        let mut stair = staircase(SimpleSettings {
            estimate_reversals: 2,
            ..SimpleSettings::default()
        });
        for correct in [true, true, false, true, true] {
            stair.register_response(correct).unwrap();
        }
        let estimate = stair.threshold_estimate().unwrap();
        assert!((estimate.threshold_s - 0.35).abs() < 1e-9);
    }

    #[test]
    fn rejects_start_outside_bounds() {
        let result = SimpleStaircase::new(
            SimpleSettings {
                start_s: 2.0,
                ..SimpleSettings::default()
            },
            StopRule::Trials(30),
            DurationBounds::new(0.01, 1.0),
        );
        assert!(matches!(result, Err(StaircaseError::InvalidSettings(_))));
    }
}
