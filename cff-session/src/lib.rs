pub mod config;
pub mod scheduler;
pub mod state;

pub use config::SessionConfig;
pub use scheduler::{PulseScheduler, SchedulerEvent};
pub use state::{SessionEvent, SessionStateMachine};
