use cff_core::{LightLevels, PulseState};

/// Emitted by [`PulseScheduler::advance`] as toggles come due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// One light source toggled (half a cycle elapsed)
    Toggled,
    /// Both sources toggled once; decay was applied to the period
    CycleCompleted,
}

/// Anti-phase alternation of the two light sources.
///
/// Poll-driven: the caller feeds monotonic nanosecond timestamps into
/// `advance`, and the scheduler performs whatever toggles have come due.
/// Toggles are `period / 2` apart; after every full cycle the period decays
/// geometrically and clamps at the floor. Nothing here blocks, so stopping
/// takes effect immediately and no toggle can fire after `stop`.
#[derive(Debug, Clone)]
pub struct PulseScheduler {
    pulse: PulseState,
    running: bool,
    lead_lit: bool,
    next_toggle_ns: Option<u64>,
    half_cycles: u64,
}

impl PulseScheduler {
    pub fn new(pulse: PulseState) -> Self {
        Self {
            pulse,
            running: false,
            lead_lit: true,
            next_toggle_ns: None,
            half_cycles: 0,
        }
    }

    fn half_period_ns(&self) -> u64 {
        (self.pulse.period_s() * 0.5 * 1e9) as u64
    }

    /// Begins alternating from the current period. No-op while running.
    pub fn start(&mut self, now_ns: u64) {
        if self.running {
            return;
        }
        self.running = true;
        self.lead_lit = true;
        self.next_toggle_ns = Some(now_ns + self.half_period_ns());
    }

    /// Performs all toggles due at `now_ns`, catching up if more than one
    /// half-cycle has elapsed since the last poll.
    pub fn advance(&mut self, now_ns: u64) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }
        while let Some(deadline) = self.next_toggle_ns {
            if now_ns < deadline {
                break;
            }
            self.lead_lit = !self.lead_lit;
            self.half_cycles += 1;
            events.push(SchedulerEvent::Toggled);
            if self.half_cycles % 2 == 0 {
                self.pulse.advance_cycle();
                events.push(SchedulerEvent::CycleCompleted);
            }
            // Deadlines chain from each other, not from now_ns, so jittery
            // polling does not stretch the cycle.
            self.next_toggle_ns = Some(deadline + self.half_period_ns());
        }
        events
    }

    /// Halts toggling and returns the period in effect. Idempotent: calling
    /// again (or before any toggle) returns the same, last-known period.
    pub fn stop(&mut self) -> f64 {
        self.running = false;
        self.next_toggle_ns = None;
        self.pulse.period_s()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pulse(&self) -> &PulseState {
        &self.pulse
    }

    /// Sampled visibility: complementary while alternating, both lit at rest.
    pub fn levels(&self) -> LightLevels {
        if self.running {
            LightLevels {
                lead: self.lead_lit,
                trail: !self.lead_lit,
            }
        } else {
            LightLevels::BOTH_LIT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn scheduler() -> PulseScheduler {
        PulseScheduler::new(PulseState::new(0.3, 0.992, 1.0 / 60.0))
    }

    #[test]
    fn levels_complementary_at_any_sampled_instant() {
        let mut sched = scheduler();
        sched.start(0);
        for step in 1..500u64 {
            // Deliberately irregular polling.
            sched.advance(step * step * 100_000 % (5_000 * MS));
            sched.advance(step * 37 * MS);
            assert!(sched.levels().complementary());
        }
    }

    #[test]
    fn toggle_spacing_is_half_period() {
        let mut sched = scheduler();
        sched.start(0);
        // 0.3 s period: first toggle due at 150 ms.
        assert!(sched.advance(149 * MS).is_empty());
        let events = sched.advance(150 * MS);
        assert_eq!(events, vec![SchedulerEvent::Toggled]);
    }

    #[test]
    fn decay_applied_once_per_full_cycle() {
        let mut sched = scheduler();
        sched.start(0);
        let before = sched.pulse().period_s();
        // One full cycle = two toggles = 300 ms.
        let events = sched.advance(300 * MS);
        assert!(events.contains(&SchedulerEvent::CycleCompleted));
        let after = sched.pulse().period_s();
        assert!((after - before * 0.992).abs() < 1e-12);
    }

    #[test]
    fn period_monotonically_non_increasing_and_floored() {
        let mut sched = scheduler();
        sched.start(0);
        let mut prev = sched.pulse().period_s();
        for t in (0..60_000 * MS).step_by((10 * MS) as usize) {
            sched.advance(t);
            let period = sched.pulse().period_s();
            assert!(period <= prev);
            assert!(period >= sched.pulse().floor_s());
            prev = period;
        }
        // A minute of decay from 0.3 s is far past the staircase floor.
        assert!(sched.pulse().at_floor());
    }

    #[test]
    fn stop_before_any_toggle_returns_initial_period() {
        let mut sched = scheduler();
        sched.start(0);
        assert_eq!(sched.stop(), 0.3);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut sched = scheduler();
        sched.start(0);
        sched.advance(2_000 * MS);
        let first = sched.stop();
        let second = sched.stop();
        assert_eq!(first, second);
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let mut sched = scheduler();
        sched.start(0);
        sched.advance(450 * MS); // mid-cycle, lead dark
        let levels = sched.levels();
        let period = sched.pulse().period_s();
        sched.start(451 * MS);
        assert_eq!(sched.levels(), levels);
        assert_eq!(sched.pulse().period_s(), period);
    }

    #[test]
    fn no_toggles_after_stop() {
        let mut sched = scheduler();
        sched.start(0);
        sched.advance(600 * MS);
        sched.stop();
        assert!(sched.advance(10_000 * MS).is_empty());
        assert_eq!(sched.levels(), LightLevels::BOTH_LIT);
    }
}
