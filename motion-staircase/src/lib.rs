//! Adaptive staircases for duration-threshold estimation.
//!
//! A [`Staircase`] proposes the next stimulus duration and learns from the
//! correctness of each response. Two procedures are provided: the classic
//! up-down rule ([`SimpleStaircase`]) and a grid-based Bayesian QUEST
//! ([`QuestStaircase`]). A [`StaircasePool`] interleaves several staircases
//! within one run.

use std::fmt;

use motion_core::DurationBounds;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod history;
pub mod pool;
pub mod psychometric;
pub mod quest;
pub mod simple;

pub use history::{StairHistory, StairResponse, Travel};
pub use pool::{SelectionMethod, Selection, StairSummary, StaircasePool};
pub use psychometric::{Psychometric, PsychometricShape};
pub use quest::{GridSpec, Prior, QuestRule, QuestSettings, QuestStaircase};
pub use simple::{SimpleSettings, SimpleStaircase, StepType};

/// Identifies a staircase within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StairId(pub usize);

impl fmt::Display for StairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StaircaseError {
    #[error("staircase already finished after {trials} trials")]
    Finished { trials: usize },
    #[error("no active staircase remains in the pool")]
    PoolExhausted,
    #[error("unknown staircase {0}")]
    UnknownStaircase(StairId),
    #[error("invalid staircase settings: {0}")]
    InvalidSettings(String),
}

/// Which procedure drives the staircases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaircaseStyle {
    #[default]
    Simple,
    #[serde(alias = "QUEST")]
    Quest,
}

impl fmt::Display for StaircaseStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaircaseStyle::Simple => f.write_str("simple"),
            StaircaseStyle::Quest => f.write_str("quest"),
        }
    }
}

/// When a staircase stops accepting responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRule {
    Trials(usize),
    Reversals(usize),
    FirstOf { trials: usize, reversals: usize },
}

impl StopRule {
    pub fn is_met(&self, trials: usize, reversals: usize) -> bool {
        match *self {
            StopRule::Trials(n) => trials >= n,
            StopRule::Reversals(n) => reversals >= n,
            StopRule::FirstOf {
                trials: t,
                reversals: r,
            } => trials >= t || reversals >= r,
        }
    }

    pub fn validate(&self) -> Result<(), StaircaseError> {
        let zero = match *self {
            StopRule::Trials(n) | StopRule::Reversals(n) => n == 0,
            StopRule::FirstOf { trials, reversals } => trials == 0 || reversals == 0,
        };
        if zero {
            return Err(StaircaseError::InvalidSettings(format!(
                "stop rule {self:?} would finish before the first trial"
            )));
        }
        Ok(())
    }
}

/// Terminal threshold estimate of one staircase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdEstimate {
    pub threshold_s: f64,
    /// Posterior SD for QUEST; spread of the averaged reversals otherwise.
    pub spread_s: Option<f64>,
}

/// One adaptive sequence over stimulus duration.
pub trait Staircase: fmt::Debug {
    fn style(&self) -> StaircaseStyle;

    /// Duration to test on the next trial. Always within the bounds.
    fn next_intensity(&self) -> f64;

    /// Feeds the outcome of a trial run at `next_intensity()`.
    fn register_response(&mut self, correct: bool) -> Result<(), StaircaseError>;

    fn is_finished(&self) -> bool;

    fn history(&self) -> &StairHistory;

    fn threshold_estimate(&self) -> Option<ThresholdEstimate>;
}

/// Staircase settings for one style, ready to instantiate per condition.
#[derive(Debug, Clone, PartialEq)]
pub enum StaircaseSpec {
    Simple(SimpleSettings),
    Quest(QuestSettings),
}

impl StaircaseSpec {
    pub fn style(&self) -> StaircaseStyle {
        match self {
            StaircaseSpec::Simple(_) => StaircaseStyle::Simple,
            StaircaseSpec::Quest(_) => StaircaseStyle::Quest,
        }
    }

    pub fn build(
        &self,
        stop: StopRule,
        bounds: DurationBounds,
    ) -> Result<Box<dyn Staircase>, StaircaseError> {
        Ok(match self {
            StaircaseSpec::Simple(settings) => {
                Box::new(SimpleStaircase::new(settings.clone(), stop, bounds)?)
            }
            StaircaseSpec::Quest(settings) => {
                Box::new(QuestStaircase::new(settings.clone(), stop, bounds)?)
            }
        })
    }
}
