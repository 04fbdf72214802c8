/// Session phases, in the order a run moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Waiting for the participant to begin
    #[default]
    Idle,
    /// Trial created, short startup delay before the lights start alternating
    Armed,
    /// Lights alternating, waiting for a fusion report
    Running,
    /// Fixed pause that visually separates consecutive trials
    InterTrial,
    /// All trials recorded; terminal until the session is reset
    Finished,
}

impl SessionPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionPhase::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionPhase::Running)
    }

    pub fn is_inter_trial(&self) -> bool {
        matches!(self, SessionPhase::InterTrial)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionPhase::Finished)
    }

    /// True while a trial owns a live scheduler (armed or alternating)
    pub fn has_active_trial(&self) -> bool {
        matches!(self, SessionPhase::Armed | SessionPhase::Running)
    }

    /// True when the participant's report key should do something
    pub fn accepts_fusion_report(&self) -> bool {
        self.is_running()
    }
}
