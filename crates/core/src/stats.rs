use std::collections::VecDeque;

use crate::protocol::Step;

const RECENT_WINDOW: usize = 200;

/// Running summary of episode scores.
#[derive(Debug, Clone)]
pub struct OutcomeStats {
    pub episodes: u64,
    pub total_score: i64,
    pub best_score: Option<i64>,
    pub best_path: Vec<Step>,
    pub recent: VecDeque<i64>,
}

impl OutcomeStats {
    pub fn new() -> Self {
        Self {
            episodes: 0,
            total_score: 0,
            best_score: None,
            best_path: Vec::new(),
            recent: VecDeque::with_capacity(RECENT_WINDOW + 1),
        }
    }

    /// Returns true if `score` is a new best (ties keep the earlier path).
    pub fn record(&mut self, path: &[Step], score: i64) -> bool {
        self.episodes += 1;
        self.total_score = self.total_score.saturating_add(score);

        self.recent.push_back(score);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }

        let improved = self.best_score.map_or(true, |best| score > best);
        if improved {
            self.best_score = Some(score);
            self.best_path = path.to_vec();
        }
        improved
    }

    pub fn mean_score(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_score as f64 / self.episodes as f64
        }
    }

    pub fn recent_mean(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        // Scores near the i64 limits would overflow an integer sum.
        let sum: i128 = self.recent.iter().map(|&s| i128::from(s)).sum();
        sum as f64 / self.recent.len() as f64
    }
}

impl Default for OutcomeStats {
    fn default() -> Self {
        Self::new()
    }
}
