pub mod phase;
pub mod pulse;
pub mod session;
pub mod stats;

pub use phase::SessionPhase;
pub use pulse::{LightLevels, PulseState};
pub use session::{TestSession, TrialResult};
pub use stats::median;
