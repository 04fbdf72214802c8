use crate::stats;
use serde::{Deserialize, Serialize};

/// One recorded fusion measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    /// 1 / period at the instant fusion was reported
    pub frequency_hz: f64,
    pub timestamp_ns: u64,
}

/// One full run of the test: a fixed number of trials and their results.
///
/// A retry replaces the session wholesale; results are never removed or
/// rewritten once recorded.
#[derive(Debug, Clone)]
pub struct TestSession {
    total_trials: usize,
    results: Vec<TrialResult>,
}

impl TestSession {
    pub const DEFAULT_TRIALS: usize = 7;

    pub fn new(total_trials: usize) -> Self {
        Self {
            total_trials: total_trials.max(1),
            results: Vec::with_capacity(total_trials.max(1)),
        }
    }

    pub fn total_trials(&self) -> usize {
        self.total_trials
    }

    pub fn completed_trials(&self) -> usize {
        self.results.len()
    }

    /// Appends a result. Returns false (and records nothing) once the
    /// session already holds its full count.
    pub fn record(&mut self, result: TrialResult) -> bool {
        if self.is_complete() {
            return false;
        }
        self.results.push(result);
        true
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.total_trials
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.frequency_hz).collect()
    }

    pub fn median_frequency(&self) -> f64 {
        stats::median(&self.frequencies())
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TRIALS)
    }
}
