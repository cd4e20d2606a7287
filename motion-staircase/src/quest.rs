use motion_core::DurationBounds;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::StairHistory;
use crate::psychometric::Psychometric;
use crate::{Staircase, StaircaseError, StaircaseStyle, StopRule, ThresholdEstimate};

/// How the next duration is read off the posterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestRule {
    /// Posterior mean over the threshold grid.
    #[default]
    Mean,
    /// Grid point with the highest posterior mass.
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Prior {
    /// Normal density centred on the start value.
    Gaussian { sd_s: f64 },
    Uniform,
}

impl Default for Prior {
    fn default() -> Self {
        Prior::Gaussian { sd_s: 0.2 }
    }
}

/// Evenly spaced candidate thresholds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSpec {
    pub min_s: f64,
    pub max_s: f64,
    pub points: usize,
}

impl GridSpec {
    pub fn over(bounds: DurationBounds, points: usize) -> Self {
        Self {
            min_s: bounds.min_s,
            max_s: bounds.max_s,
            points,
        }
    }

    fn values(&self) -> Vec<f64> {
        let step = (self.max_s - self.min_s) / (self.points - 1) as f64;
        (0..self.points)
            .map(|i| self.min_s + step * i as f64)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestSettings {
    /// Initial guess; first tested duration and prior centre.
    pub start_s: f64,
    #[serde(default)]
    pub prior: Prior,
    /// Defaults to the condition's duration bounds with 200 points.
    #[serde(default)]
    pub grid: Option<GridSpec>,
    #[serde(default)]
    pub psychometric: Psychometric,
    #[serde(default)]
    pub rule: QuestRule,
}

impl Default for QuestSettings {
    fn default() -> Self {
        Self {
            start_s: 0.2,
            prior: Prior::default(),
            grid: None,
            psychometric: Psychometric::default(),
            rule: QuestRule::Mean,
        }
    }
}

const DEFAULT_GRID_POINTS: usize = 200;

impl QuestSettings {
    pub fn grid_for(&self, bounds: DurationBounds) -> GridSpec {
        self.grid
            .unwrap_or_else(|| GridSpec::over(bounds, DEFAULT_GRID_POINTS))
    }

    pub fn validate(&self, bounds: DurationBounds) -> Result<(), StaircaseError> {
        let invalid = |msg: String| Err(StaircaseError::InvalidSettings(msg));
        if !bounds.contains(self.start_s) {
            return invalid(format!(
                "start {} s lies outside [{}, {}]",
                self.start_s, bounds.min_s, bounds.max_s
            ));
        }
        let grid = self.grid_for(bounds);
        if grid.points < 2 {
            return invalid("QUEST grid needs at least 2 points".into());
        }
        if !(grid.min_s > 0.0 && grid.min_s < grid.max_s && grid.max_s.is_finite()) {
            return invalid(format!(
                "QUEST grid [{}, {}] must be positive and increasing",
                grid.min_s, grid.max_s
            ));
        }
        if let Prior::Gaussian { sd_s } = self.prior {
            if !(sd_s.is_finite() && sd_s > 0.0) {
                return invalid(format!("prior sd {sd_s} must be positive"));
            }
        }
        self.psychometric.validate()
    }
}

/// Bayesian staircase over a discretised threshold grid.
///
/// The posterior lives in log space and is renormalised with log-sum-exp
/// after every update, so it cannot underflow to all-zero however long the
/// run.
#[derive(Debug, Clone)]
pub struct QuestStaircase {
    settings: QuestSettings,
    stop: StopRule,
    bounds: DurationBounds,
    grid: Vec<f64>,
    log_posterior: Vec<f64>,
    intensity: f64,
    history: StairHistory,
    finished: bool,
}

impl QuestStaircase {
    pub fn new(
        settings: QuestSettings,
        stop: StopRule,
        bounds: DurationBounds,
    ) -> Result<Self, StaircaseError> {
        settings.validate(bounds)?;
        stop.validate()?;
        let grid = settings.grid_for(bounds).values();
        let log_posterior = grid
            .iter()
            .map(|t| match settings.prior {
                Prior::Gaussian { sd_s } => -0.5 * ((t - settings.start_s) / sd_s).powi(2),
                Prior::Uniform => 0.0,
            })
            .collect();
        let intensity = settings.start_s;
        let mut quest = Self {
            settings,
            stop,
            bounds,
            grid,
            log_posterior,
            intensity,
            history: StairHistory::new(intensity),
            finished: false,
        };
        quest.normalize();
        Ok(quest)
    }

    fn normalize(&mut self) {
        let max = self
            .log_posterior
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let log_sum = max
            + self
                .log_posterior
                .iter()
                .map(|l| (l - max).exp())
                .sum::<f64>()
                .ln();
        for l in &mut self.log_posterior {
            *l -= log_sum;
        }
    }

    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// Normalised posterior mass per grid point.
    pub fn posterior(&self) -> Vec<f64> {
        self.log_posterior.iter().map(|l| l.exp()).collect()
    }

    pub fn posterior_mean(&self) -> f64 {
        self.grid
            .iter()
            .zip(&self.log_posterior)
            .map(|(t, l)| t * l.exp())
            .sum()
    }

    pub fn posterior_mode(&self) -> f64 {
        self.grid
            .iter()
            .zip(&self.log_posterior)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(t, _)| *t)
            .unwrap_or(self.settings.start_s)
    }

    pub fn posterior_sd(&self) -> f64 {
        let mean = self.posterior_mean();
        self.grid
            .iter()
            .zip(&self.log_posterior)
            .map(|(t, l)| (t - mean).powi(2) * l.exp())
            .sum::<f64>()
            .sqrt()
    }

    fn select(&self) -> f64 {
        match self.settings.rule {
            QuestRule::Mean => self.posterior_mean(),
            QuestRule::Mode => self.posterior_mode(),
        }
    }
}

impl Staircase for QuestStaircase {
    fn style(&self) -> StaircaseStyle {
        StaircaseStyle::Quest
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
        let psychometric = self.settings.psychometric;
        for (l, t) in self.log_posterior.iter_mut().zip(&self.grid) {
            *l += psychometric.likelihood(tested, *t, correct).ln();
        }
        self.normalize();

        let next = self.bounds.clamp(self.select());
        if self.history.record(tested, correct, next) {
            debug!(intensity = tested, "quest reversal");
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
        Some(ThresholdEstimate {
            threshold_s: self.select(),
            spread_s: Some(self.posterior_sd()),
        })
    }
}
