pub mod actions;
pub mod universal;

use crate::agent_engine::state::Action;
use crate::errors::MobiClawResult;
use crate::memory::MemoryFragment;
use crate::perception::types::PerceptionResult;

/// Decides the next action from the task, plan, current screen and memory.
pub trait Reasoner: Send {
    /// Returns the decoded action together with the raw model response.
    fn think(
        &self,
        task: &str,
        plan: &str,
        perception: &PerceptionResult,
        context: &[MemoryFragment],
    ) -> MobiClawResult<(Action, String)>;
}
