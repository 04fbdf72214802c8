use crate::config::SessionConfig;
use crate::scheduler::PulseScheduler;
use cff_core::{LightLevels, SessionPhase, TestSession, TrialResult};
use cff_timing::Timer;

/// Events surfaced by [`SessionStateMachine::update`]; feed them back
/// through `handle_event` to perform the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Startup delay elapsed; the lights are now alternating
    TrialStarted,
    /// Inter-trial pause elapsed; the next trial may begin
    PauseElapsed,
    /// The last trial was recorded
    SessionComplete,
}

/// Drives one session: `Idle -> Armed -> Running -> InterTrial -> ...
/// -> Finished`, recording one frequency per trial.
///
/// Poll-driven off the host's redraw loop: call `update` once per frame and
/// hand any returned events back to `handle_event`. The active trial's
/// scheduler is owned here exclusively; a fresh one is built per trial, so a
/// stale toggle from a previous trial can never fire into a new one.
pub struct SessionStateMachine<T: Timer<Timestamp = u64>> {
    pub timer: T,
    pub config: SessionConfig,
    phase: SessionPhase,
    scheduler: Option<PulseScheduler>,
    session: TestSession,
    phase_entered_ns: u64,
    complete_announced: bool,
}

impl<T: Timer<Timestamp = u64>> SessionStateMachine<T> {
    pub fn new(config: SessionConfig, timer: T) -> Self {
        let session = TestSession::new(config.total_trials);
        Self {
            timer,
            config,
            phase: SessionPhase::Idle,
            scheduler: None,
            session,
            phase_entered_ns: 0,
            complete_announced: false,
        }
    }

    /// Arms a fresh trial at the configured starting period. No-op while a
    /// trial is already active or once the session has finished.
    pub fn begin_trial(&mut self) {
        if self.phase.has_active_trial() || self.phase.is_finished() {
            return;
        }
        self.scheduler = Some(PulseScheduler::new(self.config.pulse_state()));
        self.phase = SessionPhase::Armed;
        self.phase_entered_ns = self.timer.now();
        println!(
            "Trial {}/{} armed",
            self.session.completed_trials() + 1,
            self.session.total_trials()
        );
    }

    /// Advances time-driven state: starts an armed trial once the startup
    /// delay elapses, performs due toggles while running, and reports the
    /// end of the inter-trial pause.
    pub fn update(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let now_ns = self.timer.now();

        match self.phase {
            SessionPhase::Armed => {
                if now_ns - self.phase_entered_ns >= self.config.start_delay_ms * 1_000_000 {
                    if let Some(scheduler) = self.scheduler.as_mut() {
                        scheduler.start(now_ns);
                    }
                    self.phase = SessionPhase::Running;
                    self.phase_entered_ns = now_ns;
                    events.push(SessionEvent::TrialStarted);
                }
            }
            SessionPhase::Running => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.advance(now_ns);
                }
            }
            SessionPhase::InterTrial => {
                if now_ns - self.phase_entered_ns >= self.config.inter_trial_pause_ms * 1_000_000 {
                    events.push(SessionEvent::PauseElapsed);
                }
            }
            SessionPhase::Finished => {
                if !self.complete_announced {
                    events.push(SessionEvent::SessionComplete);
                }
            }
            SessionPhase::Idle => {}
        }

        events
    }

    /// Performs the transition for an event. Returns false for events that
    /// do not apply in the current phase.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match (self.phase, event) {
            (SessionPhase::InterTrial, SessionEvent::PauseElapsed) => {
                self.phase = SessionPhase::Idle;
                self.begin_trial();
                true
            }
            (SessionPhase::Finished, SessionEvent::SessionComplete) => {
                self.complete_announced = true;
                println!(
                    "Session complete: median {:.2} Hz over {} trials",
                    self.median_frequency(),
                    self.session.completed_trials()
                );
                true
            }
            (SessionPhase::Running, SessionEvent::TrialStarted) => true,
            _ => false,
        }
    }

    /// Participant reported fusion: stop the scheduler, record 1 / period,
    /// and either pause before the next trial or finish the session.
    /// Ignored in every phase but `Running`.
    pub fn report_fusion_detected(&mut self) {
        if !self.phase.accepts_fusion_report() {
            return;
        }
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        let period_s = scheduler.stop();
        let now_ns = self.timer.now();
        let result = TrialResult {
            trial_id: self.session.completed_trials(),
            frequency_hz: 1.0 / period_s,
            timestamp_ns: now_ns,
        };
        println!(
            "Trial {}: fusion reported at {:.2} Hz",
            result.trial_id + 1,
            result.frequency_hz
        );
        self.session.record(result);
        self.scheduler = None;

        if self.session.is_complete() {
            self.phase = SessionPhase::Finished;
        } else {
            self.phase = SessionPhase::InterTrial;
        }
        self.phase_entered_ns = now_ns;
    }

    /// Discards the session and returns to `Idle` (retry).
    pub fn reset(&mut self) {
        self.session = TestSession::new(self.config.total_trials);
        self.scheduler = None;
        self.phase = SessionPhase::Idle;
        self.phase_entered_ns = self.timer.now();
        self.complete_announced = false;
        println!("Session reset");
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    pub fn results(&self) -> &[TrialResult] {
        self.session.results()
    }

    pub fn median_frequency(&self) -> f64 {
        self.session.median_frequency()
    }

    /// Visibility of the two light sources for the current frame.
    pub fn light_levels(&self) -> LightLevels {
        self.scheduler
            .as_ref()
            .map(|s| s.levels())
            .unwrap_or(LightLevels::BOTH_LIT)
    }

    /// (current trial, total) while the session is underway.
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        match self.phase {
            SessionPhase::Armed | SessionPhase::Running | SessionPhase::InterTrial => Some((
                (self.session.completed_trials() + 1).min(self.session.total_trials()),
                self.session.total_trials(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cff_timing::ManualTimer;

    fn machine() -> SessionStateMachine<ManualTimer> {
        SessionStateMachine::new(SessionConfig::default(), ManualTimer::new())
    }

    /// One update/handle_event round, the way the app pumps the machine.
    fn pump(sm: &mut SessionStateMachine<ManualTimer>) {
        for event in sm.update() {
            sm.handle_event(event);
        }
    }

    /// Advances through the startup delay and some alternation, then
    /// reports fusion.
    fn run_one_trial(sm: &mut SessionStateMachine<ManualTimer>, watch_ms: u64) {
        sm.timer.advance_ms(sm.config.start_delay_ms);
        pump(sm);
        assert!(sm.phase().is_running());
        for _ in 0..watch_ms / 10 {
            sm.timer.advance_ms(10);
            pump(sm);
        }
        sm.report_fusion_detected();
    }

    #[test]
    fn full_session_of_seven_trials() {
        let mut sm = machine();
        assert!(sm.phase().is_idle());
        sm.begin_trial();

        for trial in 0..7 {
            run_one_trial(&mut sm, 500);
            if trial < 6 {
                assert!(sm.phase().is_inter_trial());
                sm.timer.advance_ms(sm.config.inter_trial_pause_ms);
                pump(&mut sm);
            }
        }

        assert!(sm.is_complete());
        assert!(sm.phase().is_finished());
        assert_eq!(sm.results().len(), 7);
        assert!(sm.median_frequency() > 0.0);

        // An eighth report before a new session starts is a no-op.
        sm.report_fusion_detected();
        assert_eq!(sm.results().len(), 7);
        assert!(sm.phase().is_finished());
    }

    #[test]
    fn longer_watching_yields_higher_frequency() {
        let mut sm = machine();
        sm.begin_trial();
        run_one_trial(&mut sm, 200);
        let quick = sm.results()[0].frequency_hz;

        sm.timer.advance_ms(sm.config.inter_trial_pause_ms);
        pump(&mut sm);
        run_one_trial(&mut sm, 20_000);
        let patient = sm.results()[1].frequency_hz;

        assert!(patient > quick);
        // Frequency can never exceed the floor's rate.
        assert!(patient <= 60.0 + 1e-9);
    }

    #[test]
    fn report_before_any_trial_is_ignored() {
        let mut sm = machine();
        sm.report_fusion_detected();
        assert!(sm.results().is_empty());
        assert!(sm.phase().is_idle());
    }

    #[test]
    fn report_during_startup_delay_is_ignored() {
        let mut sm = machine();
        sm.begin_trial();
        // Still armed: the 100 ms delay has not elapsed.
        sm.report_fusion_detected();
        assert!(sm.results().is_empty());
        assert_eq!(sm.phase(), SessionPhase::Armed);
    }

    #[test]
    fn begin_trial_while_running_is_a_no_op() {
        let mut sm = machine();
        sm.begin_trial();
        sm.timer.advance_ms(sm.config.start_delay_ms);
        pump(&mut sm);
        sm.timer.advance_ms(5_000);
        pump(&mut sm);
        let levels = sm.light_levels();
        sm.begin_trial();
        assert!(sm.phase().is_running());
        assert_eq!(sm.light_levels(), levels);
    }

    #[test]
    fn pause_separates_trials() {
        let mut sm = machine();
        sm.begin_trial();
        run_one_trial(&mut sm, 300);
        assert!(sm.phase().is_inter_trial());

        // Not yet: one millisecond short of the pause.
        sm.timer.advance_ms(sm.config.inter_trial_pause_ms - 1);
        pump(&mut sm);
        assert!(sm.phase().is_inter_trial());

        sm.timer.advance_ms(1);
        pump(&mut sm);
        assert_eq!(sm.phase(), SessionPhase::Armed);
    }

    #[test]
    fn levels_complementary_while_running() {
        let mut sm = machine();
        sm.begin_trial();
        sm.timer.advance_ms(sm.config.start_delay_ms);
        pump(&mut sm);
        for _ in 0..200 {
            sm.timer.advance_ms(17);
            pump(&mut sm);
            assert!(sm.light_levels().complementary());
        }
    }

    #[test]
    fn session_complete_event_fires_once() {
        let mut sm = machine();
        sm.begin_trial();
        for _ in 0..7 {
            run_one_trial(&mut sm, 100);
            if !sm.is_complete() {
                sm.timer.advance_ms(sm.config.inter_trial_pause_ms);
                pump(&mut sm);
            }
        }
        assert!(sm.phase().is_finished());
        let events = sm.update();
        assert_eq!(events, vec![SessionEvent::SessionComplete]);
        for event in events {
            sm.handle_event(event);
        }
        assert!(sm.update().is_empty());
    }

    #[test]
    fn reset_starts_a_new_session() {
        let mut sm = machine();
        sm.begin_trial();
        for _ in 0..7 {
            run_one_trial(&mut sm, 100);
            sm.timer.advance_ms(sm.config.inter_trial_pause_ms);
            pump(&mut sm);
        }
        assert!(sm.is_complete());
        sm.reset();
        assert!(sm.phase().is_idle());
        assert!(sm.results().is_empty());
        assert_eq!(sm.median_frequency(), 0.0);
        sm.begin_trial();
        run_one_trial(&mut sm, 100);
        assert_eq!(sm.results().len(), 1);
    }

    #[test]
    fn stopped_period_matches_recorded_frequency() {
        let mut sm = machine();
        sm.begin_trial();
        run_one_trial(&mut sm, 1_000);
        let hz = sm.results()[0].frequency_hz;
        // 1 s of decay from 0.3 s leaves the period between floor and start.
        assert!(hz >= 1.0 / 0.3 - 1e-9);
        assert!(hz <= 60.0 + 1e-9);
    }
}
