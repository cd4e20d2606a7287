//! Trial sequencing for the motion-duration threshold experiment.
//!
//! A [`SessionRunner`] owns a [`TrialController`], which owns the clock, the
//! display, the keyboard and the record sink. Nothing here talks to real
//! hardware; backends plug in through [`Presenter`], [`InputSource`] and
//! [`RecordSink`].

pub mod config;
pub mod controller;
pub mod envelope;
pub mod io;
pub mod session;
pub mod sim;
pub mod sink;

pub use config::{ConfigError, ExperimentConfig, PracticeConfig};
pub use controller::{
    Participant, TrialController, TrialError, TrialOutcome, TrialPlan, TrialTiming,
};
pub use envelope::ContrastModulation;
pub use io::{
    AudioCue, FrameReport, GratingFrame, InputSource, Presenter, RecordSink, Screen, SinkError,
};
pub use session::{RunReport, SessionError, SessionReport, SessionRunner};
pub use sim::{ResponsePolicy, SharedView, SimObserver, SimPresenter, ViewLog, VirtualClock};
pub use sink::{CsvSink, JsonLinesSink, MemorySink};
