/// Timing state of one flicker trial.
///
/// `period_s` is the full on/off cycle duration of one light source; each
/// source toggles every half period. After every completed cycle the period
/// shrinks geometrically by `decay` and clamps at `floor_s`, so the flicker
/// rate walks an adaptive staircase toward the fusion threshold without ever
/// outrunning what the display can present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseState {
    period_s: f64,
    decay: f64,
    floor_s: f64,
}

impl PulseState {
    /// Starting period of the original test: 0.3 s, i.e. ~3.3 Hz.
    pub const DEFAULT_PERIOD_S: f64 = 0.3;
    pub const DEFAULT_DECAY: f64 = 0.992;
    /// One frame at 60 Hz, the fastest toggle a typical display can honor.
    pub const DEFAULT_FLOOR_S: f64 = 1.0 / 60.0;

    /// Builds a pulse state, clamping out-of-range inputs instead of
    /// panicking: the period never starts below the floor and the decay is
    /// forced into (0, 1].
    pub fn new(period_s: f64, decay: f64, floor_s: f64) -> Self {
        let floor_s = if floor_s > 0.0 {
            floor_s
        } else {
            Self::DEFAULT_FLOOR_S
        };
        let period_s = if period_s > 0.0 {
            period_s.max(floor_s)
        } else {
            Self::DEFAULT_PERIOD_S.max(floor_s)
        };
        let decay = if decay > 0.0 && decay <= 1.0 {
            decay
        } else {
            Self::DEFAULT_DECAY
        };
        Self {
            period_s,
            decay,
            floor_s,
        }
    }

    pub fn period_s(&self) -> f64 {
        self.period_s
    }

    pub fn floor_s(&self) -> f64 {
        self.floor_s
    }

    /// Current flicker rate in cycles per second.
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.period_s
    }

    /// Applies one cycle of geometric decay, clamped at the floor.
    pub fn advance_cycle(&mut self) {
        self.period_s = (self.period_s * self.decay).max(self.floor_s);
    }

    pub fn at_floor(&self) -> bool {
        self.period_s <= self.floor_s
    }
}

impl Default for PulseState {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_PERIOD_S,
            Self::DEFAULT_DECAY,
            Self::DEFAULT_FLOOR_S,
        )
    }
}

/// Sampled visibility of the two light sources.
///
/// While a trial is alternating the two are complementary: exactly one is
/// lit at any sampled instant. Both rest lit when nothing is alternating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightLevels {
    pub lead: bool,
    pub trail: bool,
}

impl LightLevels {
    pub const BOTH_LIT: Self = Self {
        lead: true,
        trail: true,
    };

    pub fn complementary(&self) -> bool {
        self.lead != self.trail
    }
}
