//! Boundaries to the display, the keyboard and the trial store.

use motion_core::{Key, MaskType, MotionDirection, TrialRecord};
use thiserror::Error;

/// Parameters of one grating frame.
#[derive(Debug, Clone, PartialEq)]
pub struct GratingFrame {
    /// Drift phase in cycles; grows for leftward motion, shrinks for rightward.
    pub phase: f64,
    pub contrast: f64,
    pub orientation_deg: f64,
    pub size_deg: f64,
    pub spatial_freq_cpd: f64,
    pub mask: MaskType,
    pub direction: MotionDirection,
}

/// What the presenter should draw on the next refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Blank,
    Fixation,
    Grating(GratingFrame),
    ResponseCue,
    Feedback { correct: bool },
    RunBreak { next_run: usize, total_runs: usize },
    Finished,
}

/// Timing of a presented frame as seen by the display backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Seconds since the presenter was created.
    pub elapsed_s: f64,
    /// Measured duration of this refresh, if the backend can tell.
    pub frame_duration_s: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    Success,
}

pub trait Presenter {
    /// Draws `screen` and returns once it is on the display.
    fn present(&mut self, screen: &Screen) -> FrameReport;

    fn play_cue(&mut self, _cue: AudioCue) {}
}

pub trait InputSource {
    /// Blocks until a key is pressed.
    fn wait_for_key(&mut self) -> Key;

    /// Keys pressed since the last call, without blocking.
    fn poll_keys(&mut self) -> Vec<Key>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write trial record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode trial record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record sink is already closed")]
    Closed,
}

/// Ordered, append-only store of trial records.
pub trait RecordSink {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}
