use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use motion_core::{Condition, ConditionError};
use motion_staircase::{
    QuestSettings, SelectionMethod, SimpleSettings, StaircaseError, StaircaseSpec, StaircaseStyle,
    StopRule,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::ContrastModulation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("at least one condition must be configured")]
    NoConditions,
    #[error("condition label `{0}` is used more than once")]
    DuplicateLabel(String),
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error("condition `{label}`: {source}")]
    Staircase {
        label: String,
        source: StaircaseError,
    },
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}

/// The warm-up block run before the staircases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PracticeConfig {
    pub trials: usize,
    pub stim_duration_s: f64,
    pub condition: Condition,
    /// Write practice trials to the record sink, with `run_index` 0.
    pub record: bool,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            trials: 10,
            stim_duration_s: 0.5,
            condition: Condition::new("practice"),
            record: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExperimentConfig {
    pub staircase_style: StaircaseStyle,
    pub conditions: Vec<Condition>,
    /// Independent staircases started for every condition in a run.
    pub staircases_per_condition: usize,
    pub staircase_ntrials: usize,
    /// Simple staircases also stop after this many reversals.
    pub stop_reversals: Option<usize>,
    pub simple: SimpleSettings,
    pub quest: QuestSettings,
    pub selection: SelectionMethod,
    pub runs: usize,
    pub practice: PracticeConfig,
    pub fixation_grating_isi_s: f64,
    pub feedback_s: f64,
    pub iti_s: f64,
    pub contrast_mod_type: ContrastModulation,
    pub grating_ori_deg: f64,
    pub show_response_cue: bool,
    pub success_tone: bool,
    pub nominal_frame_rate_hz: f64,
    pub calibration_frames: usize,
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            staircase_style: StaircaseStyle::Simple,
            conditions: vec![
                Condition {
                    grating_deg: 2.0,
                    ..Condition::new("small")
                },
                Condition {
                    grating_deg: 8.0,
                    ..Condition::new("large")
                },
            ],
            staircases_per_condition: 1,
            staircase_ntrials: 30,
            stop_reversals: None,
            simple: SimpleSettings::default(),
            quest: QuestSettings::default(),
            selection: SelectionMethod::Random,
            runs: 4,
            practice: PracticeConfig::default(),
            fixation_grating_isi_s: 0.5,
            feedback_s: 0.2,
            iti_s: 0.5,
            contrast_mod_type: ContrastModulation::FixedTrapezoidal,
            grating_ori_deg: 90.0,
            show_response_cue: true,
            success_tone: true,
            nominal_frame_rate_hz: 60.0,
            calibration_frames: 120,
            seed: None,
        }
    }
}

impl ExperimentConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn staircase_spec(&self) -> StaircaseSpec {
        match self.staircase_style {
            StaircaseStyle::Simple => StaircaseSpec::Simple(self.simple.clone()),
            StaircaseStyle::Quest => StaircaseSpec::Quest(self.quest.clone()),
        }
    }

    pub fn stop_rule(&self) -> StopRule {
        match (self.staircase_style, self.stop_reversals) {
            (StaircaseStyle::Simple, Some(reversals)) => StopRule::FirstOf {
                trials: self.staircase_ntrials,
                reversals,
            },
            _ => StopRule::Trials(self.staircase_ntrials),
        }
    }

    /// Checks everything a session needs before the first trial, including
    /// that a staircase can be built for every condition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conditions.is_empty() {
            return Err(ConfigError::NoConditions);
        }
        let mut seen = HashSet::new();
        for condition in &self.conditions {
            condition.validate()?;
            if !seen.insert(condition.label.as_str()) {
                return Err(ConfigError::DuplicateLabel(condition.label.clone()));
            }
        }
        self.practice.condition.validate()?;

        positive("fixation_grating_isi_s", self.fixation_grating_isi_s, true)?;
        positive("feedback_s", self.feedback_s, true)?;
        positive("iti_s", self.iti_s, true)?;
        positive("nominal_frame_rate_hz", self.nominal_frame_rate_hz, false)?;
        positive("practice.stim_duration_s", self.practice.stim_duration_s, false)?;
        if !self.grating_ori_deg.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "grating_ori_deg",
                expected: "finite",
                value: self.grating_ori_deg,
            });
        }
        for (field, count) in [
            ("runs", self.runs),
            ("staircase_ntrials", self.staircase_ntrials),
            ("staircases_per_condition", self.staircases_per_condition),
        ] {
            if count == 0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    expected: "at least 1",
                    value: 0.0,
                });
            }
        }

        let spec = self.staircase_spec();
        let stop = self.stop_rule();
        for condition in &self.conditions {
            spec.build(stop, condition.duration_bounds)
                .map_err(|source| ConfigError::Staircase {
                    label: condition.label.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected: if allow_zero { "non-negative" } else { "positive" },
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(4, config.runs);
        assert_eq!(10, config.practice.trials);
        assert_eq!(StopRule::Trials(30), config.stop_rule());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = ExperimentConfig::from_json(
            r#"{
                "staircase_style": "QUEST",
                "staircase_ntrials": 12,
                "contrast_mod_type": "variable_triangular",
                "conditions": [
                    {"label": "a", "grating_deg": 4, "spatial_freq_cpd": 1.2,
                     "temporal_freq_hz": 4, "max_contrast": 0.5}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(StaircaseStyle::Quest, config.staircase_style);
        assert_eq!(ContrastModulation::VariableTriangular, config.contrast_mod_type);
        assert_eq!(1, config.conditions.len());
        assert!(matches!(config.staircase_spec(), StaircaseSpec::Quest(_)));
        assert_eq!(0.5, config.fixation_grating_isi_s);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ExperimentConfig::from_json(r#"{"stair_count": 3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let config = ExperimentConfig {
            conditions: vec![Condition::new("x"), Condition::new("x")],
            ..ExperimentConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateLabel(l)) if l == "x"));
    }

    #[test]
    fn staircase_start_must_fit_every_condition() {
        let mut narrow = Condition::new("narrow");
        narrow.duration_bounds = motion_core::DurationBounds::new(0.01, 0.2);
        let config = ExperimentConfig {
            conditions: vec![Condition::new("wide"), narrow],
            ..ExperimentConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Staircase { label, .. }) => assert_eq!("narrow", label),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reversal_stop_applies_to_simple_only() {
        let mut config = ExperimentConfig {
            stop_reversals: Some(8),
            ..ExperimentConfig::default()
        };
        assert_eq!(
            StopRule::FirstOf {
                trials: 30,
                reversals: 8
            },
            config.stop_rule()
        );
        config.staircase_style = StaircaseStyle::Quest;
        assert_eq!(StopRule::Trials(30), config.stop_rule());
    }

    #[test]
    fn bad_timing_values_are_rejected() {
        let config = ExperimentConfig {
            iti_s: -0.1,
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "iti_s", .. })
        ));
        let config = ExperimentConfig {
            runs: 0,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_conditions_are_rejected() {
        let config = ExperimentConfig {
            conditions: Vec::new(),
            ..ExperimentConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoConditions)));
    }
}
