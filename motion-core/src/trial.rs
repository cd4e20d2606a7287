use serde::{Deserialize, Serialize};

use crate::response::MotionDirection;

/// Trial state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Idle,
    FixationWait,
    InterStimInterval,
    StimulusPresentation,
    ResponseWait,
    Feedback,
    IntertrialInterval,
    Complete,
    Aborted,
}

/// Column order of the trial stream.
pub const RECORD_COLUMNS: [&str; 18] = [
    "observer",
    "gender",
    "run_index",
    "trial_index",
    "motion_dir",
    "grating_orientation",
    "key_resp",
    "grating_deg",
    "contrast",
    "spatial_freq",
    "temporal_freq_hz",
    "stim_duration_s",
    "frame_rate_hz",
    "frame_duration_s",
    "correct",
    "reaction_time_s",
    "stim_onset",
    "stim_offset",
];

/// Written in place of fields an aborted trial never reached.
pub const MISSING: &str = "NA";

/// Recorded result per trial. Fields the trial never reached stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    #[serde(rename = "observer")]
    pub observer_id: String,
    pub gender: String,
    pub run_index: usize,
    pub trial_index: usize,
    #[serde(rename = "motion_dir")]
    pub motion_direction: Option<MotionDirection>,
    pub grating_orientation: f64,
    #[serde(rename = "key_resp")]
    pub response_key: Option<String>,
    #[serde(rename = "grating_deg")]
    pub grating_size: f64,
    #[serde(rename = "contrast")]
    pub max_contrast: f64,
    pub spatial_freq: f64,
    #[serde(rename = "temporal_freq_hz")]
    pub temporal_freq: f64,
    pub stim_duration_s: f64,
    pub frame_rate_hz: f64,
    pub frame_duration_s: f64,
    pub correct: Option<bool>,
    pub reaction_time_s: Option<f64>,
    #[serde(rename = "stim_onset")]
    pub stimulus_onset: Option<f64>,
    #[serde(rename = "stim_offset")]
    pub stimulus_offset: Option<f64>,
}

impl TrialRecord {
    /// Cells in `RECORD_COLUMNS` order.
    pub fn to_row(&self) -> Vec<String> {
        fn opt<T>(value: Option<T>, fmt: impl Fn(T) -> String) -> String {
            value.map(fmt).unwrap_or_else(|| MISSING.to_string())
        }
        let secs = |v: f64| format!("{v:.6}");

        vec![
            self.observer_id.clone(),
            self.gender.clone(),
            self.run_index.to_string(),
            self.trial_index.to_string(),
            opt(self.motion_direction, |d| d.label().to_string()),
            format!("{:.1}", self.grating_orientation),
            opt(self.response_key.clone(), |k| k),
            format!("{:.2}", self.grating_size),
            format!("{:.3}", self.max_contrast),
            format!("{:.3}", self.spatial_freq),
            format!("{:.3}", self.temporal_freq),
            format!("{:.9}", self.stim_duration_s),
            format!("{:.3}", self.frame_rate_hz),
            format!("{:.6}", self.frame_duration_s),
            opt(self.correct, |c| u8::from(c).to_string()),
            opt(self.reaction_time_s, secs),
            opt(self.stimulus_onset, secs),
            opt(self.stimulus_offset, secs),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TrialRecord {
        TrialRecord {
            observer_id: "20260101".into(),
            gender: "f".into(),
            run_index: 1,
            trial_index: 3,
            motion_direction: Some(MotionDirection::Rightward),
            grating_orientation: 90.0,
            response_key: Some("right".into()),
            grating_size: 4.0,
            max_contrast: 0.98,
            spatial_freq: 1.2,
            temporal_freq: 4.0,
            stim_duration_s: 0.05,
            frame_rate_hz: 60.0,
            frame_duration_s: 1.0 / 60.0,
            correct: Some(true),
            reaction_time_s: Some(0.4),
            stimulus_onset: Some(12.0),
            stimulus_offset: Some(12.05),
        }
    }

    #[test]
    fn row_matches_column_count_and_order() {
        let row = record().to_row();
        assert_eq!(RECORD_COLUMNS.len(), row.len());
        assert_eq!("right", row[4]);
        assert_eq!("1", row[14]);
    }

    #[test]
    fn missing_fields_use_sentinel() {
        let mut partial = record();
        partial.correct = None;
        partial.reaction_time_s = None;
        partial.stimulus_offset = None;
        let row = partial.to_row();
        assert_eq!(MISSING, row[14]);
        assert_eq!(MISSING, row[15]);
        assert_eq!(MISSING, row[17]);
    }

    #[test]
    fn serialises_with_column_names() {
        let value = serde_json::to_value(record()).unwrap();
        let object = value.as_object().unwrap();
        for column in RECORD_COLUMNS {
            assert!(object.contains_key(column), "missing {column}");
        }
        assert_eq!("right", object["motion_dir"]);
    }
}
