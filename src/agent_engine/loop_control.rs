use std::time::Instant;

use crate::agent_engine::state::{Action, ActionType, LoopConfig, TaskOutcome};

/// Enforces the runner's budgets: step count, wall-clock time and runs of
/// consecutive `Wait` actions.
pub struct LoopController {
    config: LoopConfig,
    start_time: Instant,
    steps: u32,
    consecutive_waits: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            steps: 0,
            consecutive_waits: 0,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Claims the next step, or says why the run must end instead.
    pub fn begin_step(&mut self) -> Result<u32, TaskOutcome> {
        if self.steps >= self.config.max_steps {
            return Err(TaskOutcome::BudgetExhausted);
        }
        if let Some(max_min) = self.config.max_duration_minutes {
            if self.start_time.elapsed().as_secs() / 60 >= max_min as u64 {
                return Err(TaskOutcome::BudgetExhausted);
            }
        }
        self.steps += 1;
        Ok(self.steps)
    }

    pub fn record(&mut self, action: &Action) -> Result<(), TaskOutcome> {
        if action.kind == ActionType::Wait {
            self.consecutive_waits += 1;
        } else {
            self.consecutive_waits = 0;
        }
        match self.config.max_consecutive_waits {
            Some(max) if self.consecutive_waits >= max => Err(TaskOutcome::Aborted {
                reason: format!("{} consecutive waits", self.consecutive_waits),
            }),
            _ => Ok(()),
        }
    }
}
