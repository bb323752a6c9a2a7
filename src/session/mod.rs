mod controller;
mod state;
mod ticker;

pub use controller::{RunSessionController, SessionConfig};
pub use state::{project_runs, RunUiState, RunsStatus, SessionPhase};
pub use ticker::{SessionTimer, Tick};
