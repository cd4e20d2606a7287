use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
    pub samples: usize,
}

/// The presenter reported a frame duration that cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimingAnomaly {
    #[error("presenter did not report a frame duration")]
    Unreported,
    #[error("unmeasurable frame duration {0} s")]
    Unmeasurable(f64),
}

/// Where a frame-duration estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Measured,
    Nominal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEstimate {
    pub duration_s: f64,
    pub rate_hz: f64,
    pub source: FrameSource,
}

/// Rolling window of presenter frame durations with a nominal fallback.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    frame_times: VecDeque<Duration>,
    max_samples: usize,
    nominal_rate_hz: f64,
    anomalies: usize,
}

impl FrameTimer {
    pub fn new(nominal_rate_hz: f64) -> Self {
        Self::with_capacity(nominal_rate_hz, 1000)
    }

    pub fn with_capacity(nominal_rate_hz: f64, max_samples: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            nominal_rate_hz,
            anomalies: 0,
        }
    }

    pub fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }

    /// Records a presenter report. Unusable reports are counted and logged
    /// once; the estimate keeps using earlier samples or the nominal rate.
    pub fn record_report(&mut self, frame_duration_s: Option<f64>) -> Result<(), TimingAnomaly> {
        let anomaly = match frame_duration_s {
            None => TimingAnomaly::Unreported,
            Some(s) if s.is_finite() && s > 0.0 => {
                self.record_frame(Duration::from_secs_f64(s));
                return Ok(());
            }
            Some(s) => TimingAnomaly::Unmeasurable(s),
        };
        if self.anomalies == 0 {
            warn!(
                "{anomaly}; falling back to nominal {:.1} Hz",
                self.nominal_rate_hz
            );
        }
        self.anomalies += 1;
        Err(anomaly)
    }

    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    pub fn samples(&self) -> usize {
        self.frame_times.len()
    }

    pub fn calibration_stats(&self) -> CalibrationStats {
        let times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return CalibrationStats {
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
                samples: 0,
            };
        }
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
            samples: times.len(),
        }
    }

    /// Mean measured frame duration, or the nominal rate when nothing usable
    /// has been recorded.
    pub fn estimate(&self) -> FrameEstimate {
        let stats = self.calibration_stats();
        if stats.samples > 0 && stats.average_frame_time_ns > 0.0 {
            let duration_s = stats.average_frame_time_ns / 1e9;
            FrameEstimate {
                duration_s,
                rate_hz: 1.0 / duration_s,
                source: FrameSource::Measured,
            }
        } else {
            FrameEstimate {
                duration_s: 1.0 / self.nominal_rate_hz,
                rate_hz: self.nominal_rate_hz,
                source: FrameSource::Nominal,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timer_falls_back_to_nominal() {
        let timer = FrameTimer::new(60.0);
        let estimate = timer.estimate();
        assert_eq!(FrameSource::Nominal, estimate.source);
        assert!((estimate.duration_s - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn measured_frames_drive_the_estimate() {
        let mut timer = FrameTimer::new(60.0);
        for _ in 0..10 {
            timer.record_report(Some(0.01)).unwrap();
        }
        let estimate = timer.estimate();
        assert_eq!(FrameSource::Measured, estimate.source);
        assert!((estimate.rate_hz - 100.0).abs() < 1e-6);
        assert!(timer.calibration_stats().jitter_ns < 1.0);
    }

    #[test]
    fn bad_reports_are_anomalies_not_samples() {
        let mut timer = FrameTimer::new(75.0);
        assert_eq!(Err(TimingAnomaly::Unreported), timer.record_report(None));
        assert_eq!(
            Err(TimingAnomaly::Unmeasurable(0.0)),
            timer.record_report(Some(0.0))
        );
        assert!(timer.record_report(Some(f64::NAN)).is_err());
        assert_eq!(3, timer.anomalies());
        assert_eq!(0, timer.samples());
        assert_eq!(FrameSource::Nominal, timer.estimate().source);
    }

    #[test]
    fn window_keeps_only_recent_samples() {
        let mut timer = FrameTimer::with_capacity(60.0, 3);
        for ms in [100, 10, 10, 10] {
            timer.record_frame(Duration::from_millis(ms));
        }
        assert_eq!(3, timer.samples());
        assert!((timer.estimate().duration_s - 0.01).abs() < 1e-9);
    }
}
