pub mod frame;
pub mod timer;

pub use frame::{CalibrationStats, FrameEstimate, FrameSource, FrameTimer, TimingAnomaly};
pub use timer::{Clock, HighPrecisionTimer};
