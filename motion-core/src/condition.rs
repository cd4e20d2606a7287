use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aperture applied to the grating texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskType {
    #[default]
    Gauss,
    Circle,
    RaisedCos,
    None,
}

/// Range the controlled stimulus duration may take, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DurationBounds {
    pub min_s: f64,
    pub max_s: f64,
}

impl DurationBounds {
    pub const fn new(min_s: f64, max_s: f64) -> Self {
        Self { min_s, max_s }
    }

    pub fn clamp(&self, duration_s: f64) -> f64 {
        duration_s.clamp(self.min_s, self.max_s)
    }

    pub fn contains(&self, duration_s: f64) -> bool {
        (self.min_s..=self.max_s).contains(&duration_s)
    }

    fn is_valid(&self) -> bool {
        self.min_s.is_finite() && self.max_s.is_finite() && self.min_s > 0.0 && self.min_s < self.max_s
    }
}

impl Default for DurationBounds {
    fn default() -> Self {
        Self::new(0.005, 1.0)
    }
}

/// One stimulus parameter bundle. Staircases share conditions but never
/// mutate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub label: String,
    pub grating_deg: f64,
    pub spatial_freq_cpd: f64,
    pub temporal_freq_hz: f64,
    pub max_contrast: f64,
    #[serde(default)]
    pub mask_type: MaskType,
    #[serde(default)]
    pub duration_bounds: DurationBounds,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("condition label must not be empty")]
    EmptyLabel,
    #[error("condition `{label}`: {field} must be a positive number, got {value}")]
    NonPositive {
        label: String,
        field: &'static str,
        value: f64,
    },
    #[error("condition `{label}`: max_contrast must lie in [0, 1], got {value}")]
    ContrastOutOfRange { label: String, value: f64 },
    #[error("condition `{label}`: duration bounds [{min_s}, {max_s}] must be positive and increasing")]
    InvalidBounds { label: String, min_s: f64, max_s: f64 },
}

impl Condition {
    /// A 4 deg, 1.2 cpd, 4 Hz grating at 0.98 contrast.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            grating_deg: 4.0,
            spatial_freq_cpd: 1.2,
            temporal_freq_hz: 4.0,
            max_contrast: 0.98,
            mask_type: MaskType::Gauss,
            duration_bounds: DurationBounds::default(),
        }
    }

    /// Seconds per drift cycle of the grating.
    pub fn cycle_period_s(&self) -> f64 {
        1.0 / self.temporal_freq_hz
    }

    pub fn validate(&self) -> Result<(), ConditionError> {
        if self.label.trim().is_empty() {
            return Err(ConditionError::EmptyLabel);
        }
        for (field, value) in [
            ("grating_deg", self.grating_deg),
            ("spatial_freq_cpd", self.spatial_freq_cpd),
            ("temporal_freq_hz", self.temporal_freq_hz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConditionError::NonPositive {
                    label: self.label.clone(),
                    field,
                    value,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.max_contrast) {
            return Err(ConditionError::ContrastOutOfRange {
                label: self.label.clone(),
                value: self.max_contrast,
            });
        }
        if !self.duration_bounds.is_valid() {
            return Err(ConditionError::InvalidBounds {
                label: self.label.clone(),
                min_s: self.duration_bounds.min_s,
                max_s: self.duration_bounds.max_s,
            });
        }
        Ok(())
    }
}
