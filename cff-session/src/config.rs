use cff_core::{PulseState, TestSession};

/// Session parameters.
///
/// Defaults reproduce the original test: seven trials, a 0.3 s starting
/// period decaying by 0.992 per cycle down to one 60 Hz frame, a 100 ms
/// startup delay before flashing begins, and a 1 s pause between trials.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub total_trials: usize,
    pub initial_period_s: f64,
    pub decay_factor: f64,
    pub floor_period_s: f64,
    pub start_delay_ms: u64,
    pub inter_trial_pause_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_trials: TestSession::DEFAULT_TRIALS,
            initial_period_s: PulseState::DEFAULT_PERIOD_S,
            decay_factor: PulseState::DEFAULT_DECAY,
            floor_period_s: PulseState::DEFAULT_FLOOR_S,
            start_delay_ms: 100,
            inter_trial_pause_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn pulse_state(&self) -> PulseState {
        PulseState::new(self.initial_period_s, self.decay_factor, self.floor_period_s)
    }
}
