use serde::{Deserialize, Serialize};

use crate::StaircaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsychometricShape {
    #[default]
    Weibull,
    Logistic,
}

/// Probability of a correct response as a function of duration, given a
/// hypothesised threshold.
///
/// Weibull: `γ + (1 − γ − δ)·(1 − exp(−(x/t)^β))`.
/// Logistic: `γ + (1 − γ − δ) / (1 + exp(−β·(x − t)))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Psychometric {
    #[serde(default)]
    pub shape: PsychometricShape,
    /// β
    pub slope: f64,
    /// γ, chance performance; 0.5 for two-alternative direction judgements.
    pub guess_rate: f64,
    /// δ
    pub lapse_rate: f64,
}

impl Default for Psychometric {
    fn default() -> Self {
        Self {
            shape: PsychometricShape::Weibull,
            slope: 3.5,
            guess_rate: 0.5,
            lapse_rate: 0.01,
        }
    }
}

impl Psychometric {
    pub fn p_correct(&self, intensity: f64, threshold: f64) -> f64 {
        let range = 1.0 - self.guess_rate - self.lapse_rate;
        let rise = match self.shape {
            PsychometricShape::Weibull => {
                if intensity <= 0.0 {
                    0.0
                } else {
                    1.0 - (-(intensity / threshold).powf(self.slope)).exp()
                }
            }
            PsychometricShape::Logistic => 1.0 / (1.0 + (-self.slope * (intensity - threshold)).exp()),
        };
        self.guess_rate + range * rise
    }

    /// Likelihood of the observed outcome, floored so it is never zero.
    pub fn likelihood(&self, intensity: f64, threshold: f64, correct: bool) -> f64 {
        let p = self.p_correct(intensity, threshold);
        let l = if correct { p } else { 1.0 - p };
        l.max(f64::MIN_POSITIVE)
    }

    pub fn validate(&self) -> Result<(), StaircaseError> {
        let invalid = |msg: String| Err(StaircaseError::InvalidSettings(msg));
        if !(self.slope.is_finite() && self.slope > 0.0) {
            return invalid(format!("psychometric slope {} must be positive", self.slope));
        }
        if !(0.0..1.0).contains(&self.guess_rate) {
            return invalid(format!("guess rate {} must lie in [0, 1)", self.guess_rate));
        }
        if !(self.lapse_rate >= 0.0 && self.guess_rate + self.lapse_rate < 1.0) {
            return invalid(format!(
                "lapse rate {} must be non-negative and leave room above the guess rate",
                self.lapse_rate
            ));
        }
        Ok(())
    }
}
