use serde::Serialize;

/// Direction the realized intensity last moved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Travel {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StairResponse {
    pub intensity: f64,
    pub correct: bool,
}

/// Responses, realized intensities and reversals of one staircase.
///
/// A reversal is recorded when the sign of a realized intensity change
/// differs from the sign of the last non-zero change. Changes that clamping
/// reduced to zero leave the direction of travel untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StairHistory {
    responses: Vec<StairResponse>,
    intensities: Vec<f64>,
    reversals: Vec<f64>,
    travel: Option<Travel>,
}

impl StairHistory {
    pub fn new(start: f64) -> Self {
        Self {
            responses: Vec::new(),
            intensities: vec![start],
            reversals: Vec::new(),
            travel: None,
        }
    }

    /// Appends one trial: `tested` was shown, `next` is the intensity after
    /// the update. Returns whether the trial was a reversal.
    pub fn record(&mut self, tested: f64, correct: bool, next: f64) -> bool {
        self.responses.push(StairResponse {
            intensity: tested,
            correct,
        });
        self.intensities.push(next);

        let delta = next - tested;
        if delta == 0.0 {
            return false;
        }
        let travel = if delta > 0.0 { Travel::Up } else { Travel::Down };
        let reversed = self.travel.is_some_and(|prev| prev != travel);
        if reversed {
            self.reversals.push(tested);
        }
        self.travel = Some(travel);
        reversed
    }

    pub fn trial_count(&self) -> usize {
        self.responses.len()
    }

    pub fn reversal_count(&self) -> usize {
        self.reversals.len()
    }

    pub fn responses(&self) -> &[StairResponse] {
        &self.responses
    }

    /// Realized intensity sequence, starting with the initial intensity.
    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn reversals(&self) -> &[f64] {
        &self.reversals
    }

    pub fn travel(&self) -> Option<Travel> {
        self.travel
    }

    /// Mean and SD of the last `k` reversal intensities (all of them when
    /// fewer than `k` exist).
    pub fn last_reversals_mean(&self, k: usize) -> Option<(f64, f64)> {
        let tail = &self.reversals[self.reversals.len().saturating_sub(k)..];
        if tail.is_empty() {
            return None;
        }
        let n = tail.len() as f64;
        let mean = tail.iter().sum::<f64>() / n;
        let var = tail.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Some((mean, var.sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_move_is_never_a_reversal() {
        let mut history = StairHistory::new(0.5);
        assert!(!history.record(0.5, true, 0.4));
        assert_eq!(Some(Travel::Down), history.travel());
        assert_eq!(0, history.reversal_count());
    }

    #[test]
    fn zero_change_keeps_direction() {
        let mut history = StairHistory::new(0.2);
        history.record(0.2, false, 0.3);
        // clamped at the ceiling
        assert!(!history.record(0.3, false, 0.3));
        assert_eq!(Some(Travel::Up), history.travel());
        assert!(history.record(0.3, true, 0.2));
        assert_eq!(&[0.3], history.reversals());
    }

    #[test]
    fn mean_of_last_reversals() {
        let mut history = StairHistory::new(0.5);
        for (tested, next) in [(0.5, 0.4), (0.4, 0.5), (0.5, 0.3), (0.3, 0.6), (0.6, 0.2)] {
            history.record(tested, true, next);
        }
        assert_eq!(4, history.reversal_count());
        let (mean, _) = history.last_reversals_mean(2).unwrap();
        assert!((mean - 0.45).abs() < 1e-12);
        let (all, _) = history.last_reversals_mean(10).unwrap();
        assert!((all - 0.45).abs() < 1e-12);
        assert!(StairHistory::new(0.1).last_reversals_mean(5).is_none());
    }
}
