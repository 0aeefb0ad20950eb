pub mod guarded;
pub mod replay;
pub mod types;

use crate::scenario::Scenario;
use anyhow::Result;

pub use guarded::GuardedEngine;
pub use replay::ReplayEngine;
pub use types::{Completion, PathCheck, ToolDiag};

/// Runs a scenario to completion. `Err` means the child never started;
/// failures after spawn are reported as [`Completion::WaitFailed`].
pub trait Engine {
    fn execute(&self, scenario: &Scenario) -> Result<Completion>;
}
