use std::collections::VecDeque;
use std::sync::Arc;

use motion_core::Condition;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{StairId, Staircase, StaircaseError, StaircaseStyle};

/// Order in which active staircases are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Shuffled blocks: every active staircase runs once per block, in random
    /// order.
    #[default]
    Random,
    /// Declaration order, one trial each in turn.
    Sequential,
}

/// The staircase to run next, its duration and its condition.
#[derive(Debug, Clone)]
pub struct Selection {
    pub id: StairId,
    pub intensity: f64,
    pub condition: Arc<Condition>,
}

/// Final state of one staircase, kept after its pool is discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StairSummary {
    pub id: StairId,
    pub label: String,
    pub style: StaircaseStyle,
    pub trials: usize,
    pub finished: bool,
    pub reversals: Vec<f64>,
    pub threshold_s: Option<f64>,
    pub spread_s: Option<f64>,
}

#[derive(Debug)]
struct PoolEntry {
    condition: Arc<Condition>,
    staircase: Box<dyn Staircase>,
}

/// Interleaves the staircases of one run.
pub struct StaircasePool<R: Rng> {
    entries: Vec<PoolEntry>,
    block: VecDeque<usize>,
    method: SelectionMethod,
    rng: R,
}

impl<R: Rng> StaircasePool<R> {
    pub fn new(method: SelectionMethod, rng: R) -> Self {
        Self {
            entries: Vec::new(),
            block: VecDeque::new(),
            method,
            rng,
        }
    }

    pub fn push(&mut self, condition: Arc<Condition>, staircase: Box<dyn Staircase>) -> StairId {
        self.entries.push(PoolEntry {
            condition,
            staircase,
        });
        StairId(self.entries.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.staircase.is_finished())
            .count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.active_count() == 0
    }

    pub fn staircase(&self, id: StairId) -> Option<&dyn Staircase> {
        self.entries.get(id.0).map(|e| e.staircase.as_ref())
    }

    fn refill_block(&mut self) {
        let mut active: Vec<usize> = (0..self.entries.len())
            .filter(|&i| !self.entries[i].staircase.is_finished())
            .collect();
        if self.method == SelectionMethod::Random {
            active.shuffle(&mut self.rng);
        }
        self.block.extend(active);
    }

    /// Next staircase to run. `PoolExhausted` once every staircase finished.
    pub fn pick_next(&mut self) -> Result<Selection, StaircaseError> {
        if self.is_exhausted() {
            return Err(StaircaseError::PoolExhausted);
        }
        loop {
            if self.block.is_empty() {
                self.refill_block();
            }
            let Some(index) = self.block.pop_front() else {
                return Err(StaircaseError::PoolExhausted);
            };
            let entry = &self.entries[index];
            if entry.staircase.is_finished() {
                continue;
            }
            return Ok(Selection {
                id: StairId(index),
                intensity: entry.staircase.next_intensity(),
                condition: Arc::clone(&entry.condition),
            });
        }
    }

    /// Routes a response to its staircase. Returns whether that staircase
    /// finished with this response.
    pub fn feed_response(&mut self, id: StairId, correct: bool) -> Result<bool, StaircaseError> {
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(StaircaseError::UnknownStaircase(id))?;
        entry.staircase.register_response(correct)?;
        let finished = entry.staircase.is_finished();
        if finished {
            debug!(
                staircase = %id,
                label = %entry.condition.label,
                trials = entry.staircase.history().trial_count(),
                "staircase finished"
            );
        }
        Ok(finished)
    }

    pub fn summaries(&self) -> Vec<StairSummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let estimate = e.staircase.threshold_estimate();
                StairSummary {
                    id: StairId(i),
                    label: e.condition.label.clone(),
                    style: e.staircase.style(),
                    trials: e.staircase.history().trial_count(),
                    finished: e.staircase.is_finished(),
                    reversals: e.staircase.history().reversals().to_vec(),
                    threshold_s: estimate.map(|est| est.threshold_s),
                    spread_s: estimate.and_then(|est| est.spread_s),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QuestSettings, SimpleSettings, StaircaseSpec, StopRule};
    use motion_core::DurationBounds;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pool(n: usize, trials: usize, seed: u64) -> StaircasePool<StdRng> {
        let mut pool = StaircasePool::new(SelectionMethod::Random, StdRng::seed_from_u64(seed));
        for i in 0..n {
            let spec = if i % 2 == 0 {
                StaircaseSpec::Simple(SimpleSettings::default())
            } else {
                StaircaseSpec::Quest(QuestSettings::default())
            };
            let condition = Arc::new(Condition::new(format!("c{i}")));
            pool.push(
                condition,
                spec.build(StopRule::Trials(trials), DurationBounds::new(0.01, 1.0))
                    .unwrap(),
            );
        }
        pool
    }

    #[test]
    fn exhausted_after_n_times_t_responses() {
        for seed in 0..20 {
            let (n, t) = (4, 7);
            let mut pool = pool(n, t, seed);
            let mut fed = 0;
            while let Ok(selection) = pool.pick_next() {
                assert!(!pool.staircase(selection.id).unwrap().is_finished());
                pool.feed_response(selection.id, fed % 3 != 0).unwrap();
                fed += 1;
            }
            assert_eq!(n * t, fed);
            assert!(pool.is_exhausted());
            assert!(matches!(pool.pick_next(), Err(StaircaseError::PoolExhausted)));
        }
    }

    #[test]
    fn no_staircase_falls_more_than_one_trial_behind() {
        let mut pool = pool(5, 10, 42);
        let mut counts = vec![0usize; 5];
        while let Ok(selection) = pool.pick_next() {
            counts[selection.id.0] += 1;
            pool.feed_response(selection.id, true).unwrap();
            let active: Vec<usize> = counts.iter().copied().filter(|&c| c < 10).collect();
            if let (Some(max), Some(min)) = (active.iter().max(), active.iter().min()) {
                assert!(max - min <= 1, "{counts:?}");
            }
        }
        assert_eq!(vec![10; 5], counts);
    }

    #[test]
    fn each_block_covers_every_active_staircase() {
        let mut pool = pool(6, 50, 7);
        let first: Vec<StairId> = (0..6)
            .map(|_| {
                let s = pool.pick_next().unwrap();
                pool.feed_response(s.id, true).unwrap();
                s.id
            })
            .collect();
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!((0..6).map(StairId).collect::<Vec<_>>(), sorted);
        let second: Vec<StairId> = (0..6)
            .map(|_| {
                let s = pool.pick_next().unwrap();
                pool.feed_response(s.id, true).unwrap();
                s.id
            })
            .collect();
        let mut sorted_second = second.clone();
        sorted_second.sort();
        assert_eq!(sorted, sorted_second);
    }

    #[test]
    fn sequential_serves_in_declaration_order() {
        let mut pool = pool(3, 2, 0);
        pool.method = SelectionMethod::Sequential;
        let order: Vec<usize> = std::iter::from_fn(|| {
            let s = pool.pick_next().ok()?;
            pool.feed_response(s.id, false).unwrap();
            Some(s.id.0)
        })
        .collect();
        assert_eq!(vec![0, 1, 2, 0, 1, 2], order);
    }

    #[test]
    fn finished_staircases_reject_responses() {
        let mut pool = pool(1, 1, 0);
        let s = pool.pick_next().unwrap();
        assert!(pool.feed_response(s.id, true).unwrap());
        assert_eq!(
            Err(StaircaseError::Finished { trials: 1 }),
            pool.feed_response(s.id, true)
        );
        assert_eq!(
            Err(StaircaseError::UnknownStaircase(StairId(9))),
            pool.feed_response(StairId(9), true)
        );
    }

    #[test]
    fn summaries_carry_labels_and_estimates() {
        let mut pool = pool(2, 6, 3);
        while let Ok(s) = pool.pick_next() {
            let correct = pool.staircase(s.id).unwrap().history().trial_count() % 2 == 0;
            pool.feed_response(s.id, correct).unwrap();
        }
        let summaries = pool.summaries();
        assert_eq!("c0", summaries[0].label);
        assert_eq!(StaircaseStyle::Simple, summaries[0].style);
        assert_eq!(StaircaseStyle::Quest, summaries[1].style);
        assert!(summaries.iter().all(|s| s.finished && s.trials == 6));
        assert!(summaries[0].threshold_s.is_some());
        assert!(summaries[1].threshold_s.is_some());
    }
}
