use std::path::Path;

use crate::agent_engine::state::{Action, AgentRuntimeState};
use crate::memory::{FragmentKind, Memory, MemoryFragment, Role};
use crate::perception::traits::Perception;
use crate::perception::types::PerceptionResult;
use crate::planner::{PlanResult, Planner};
use crate::reasoning::Reasoner;
use crate::verifier::Verifier;

pub const DEFAULT_PLAN: &str = "No specific plan, execute step by step.";

/// Per-task agent state machine.
///
/// `reset` starts a task; every `step` runs verification of the previous
/// action, perception with strategy fallback, the experience fast path and
/// finally the reasoning slow path. `step` never errors: failures surface as
/// `Fail` or `Wait` actions.
pub struct AgentEngine {
    strategies: Vec<Box<dyn Perception>>,
    reasoner: Box<dyn Reasoner>,
    memory: Box<dyn Memory>,
    planner: Option<Box<dyn Planner>>,
    verifier: Option<Box<dyn Verifier>>,
    verbose: bool,

    state: AgentRuntimeState,
    task: String,
    plan: PlanResult,
}

impl AgentEngine {
    pub fn new(strategies: Vec<Box<dyn Perception>>, reasoner: Box<dyn Reasoner>, memory: Box<dyn Memory>) -> Self {
        Self {
            strategies,
            reasoner,
            memory,
            planner: None,
            verifier: None,
            verbose: true,
            state: AgentRuntimeState::default(),
            task: String::new(),
            plan: PlanResult::new(DEFAULT_PLAN),
        }
    }

    pub fn with_planner(mut self, planner: Box<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_verifier(mut self, verifier: Box<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn plan(&self) -> &PlanResult {
        &self.plan
    }

    pub fn runtime_state(&self) -> &AgentRuntimeState {
        &self.state
    }

    pub fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn reset(&mut self, task: &str) {
        tracing::info!(task = %task, "agent reset");
        self.task = task.to_string();
        self.state = AgentRuntimeState::default();

        self.memory.clear();
        self.memory
            .add(MemoryFragment::text(Role::System, format!("New task started: {task}")));

        self.plan = match &self.planner {
            None => PlanResult::new(DEFAULT_PLAN),
            Some(planner) => match planner.make_plan(task) {
                Ok(plan) => {
                    tracing::info!(plan = %plan.plan, "plan ready");
                    self.memory.add(
                        MemoryFragment::new(Role::System, FragmentKind::Plan, format!("Plan: {}", plan.plan))
                            .with_metadata_map(plan.data.clone()),
                    );
                    plan
                }
                Err(e) => {
                    tracing::warn!(error = %e, "planning failed; continuing without a plan");
                    PlanResult::new(DEFAULT_PLAN)
                }
            },
        };
    }

    pub fn step(&mut self, screenshot: &Path, width: u32, height: u32) -> Action {
        self.verify_previous(screenshot);

        let perception = match self.perceive(screenshot, width, height) {
            Ok(p) => p,
            Err(reason) => return Action::fail(format!("All perception strategies crashed: {reason}")),
        };
        if self.verbose {
            tracing::info!(mode = %perception.mode, elements = perception.elements.len(), "perception done");
        }

        // Fast path: a stored trace for this screen and task.
        match self.memory.retrieve_experience(screenshot, &self.task) {
            Ok(Some(cached)) => {
                tracing::info!(action = %cached.kind, "fast path hit");
                self.memory.add(
                    MemoryFragment::action(Role::Assistant, cached.clone()).with_metadata("source", "memory_cache"),
                );
                self.remember(screenshot, &cached);
                return cached;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "experience lookup failed"),
        }

        if let Err(e) = self.memory.load_knowledge(&self.task) {
            tracing::warn!(error = %e, "knowledge refresh failed");
        }
        let context = self.memory.working_context();

        let (action, response) = match self.reasoner.think(&self.task, &self.plan.plan, &perception, &context) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(error = %e, "reasoning failed");
                return Action::fail(format!("Brain Error: {e}"));
            }
        };

        self.memory
            .add(MemoryFragment::action(Role::Assistant, action.clone()).with_metadata("source", "brain"));
        self.memory
            .add(MemoryFragment::text(Role::Assistant, response).with_metadata("source", "brain"));
        self.remember(screenshot, &action);

        if self.verbose {
            tracing::info!(action = %action.kind, params = %serde_json::Value::Object(action.params.clone()), "decision");
        }
        action
    }

    fn remember(&mut self, screenshot: &Path, action: &Action) {
        self.state.last_screenshot_path = Some(screenshot.to_path_buf());
        self.state.last_action = Some(action.clone());
    }

    fn verify_previous(&mut self, screenshot: &Path) {
        let Some(verifier) = &self.verifier else { return };
        let (Some(before), Some(last)) = (&self.state.last_screenshot_path, &self.state.last_action) else {
            return;
        };
        if !last.kind.is_observable() {
            return;
        }

        let result = verifier.verify(last, before, screenshot);
        if result.is_success {
            if self.verbose {
                tracing::info!(feedback = %result.feedback, "verification passed");
            }
            if self.state.current_strategy_idx != 0 {
                tracing::info!("returning to primary perception strategy");
                self.state.current_strategy_idx = 0;
            }
            return;
        }

        tracing::warn!(feedback = %result.feedback, "previous action failed verification");
        if self.state.current_strategy_idx + 1 < self.strategies.len() {
            self.state.current_strategy_idx += 1;
            let next = self.strategies[self.state.current_strategy_idx].name();
            tracing::info!(strategy = %next, "switching perception strategy");
            self.memory.add(MemoryFragment::new(
                Role::System,
                FragmentKind::Error,
                format!(
                    "Previous action failed verification. Reason: {}. Switching perception strategy.",
                    result.feedback
                ),
            ));
        } else {
            tracing::warn!("no further perception strategy; keeping the current one");
        }
    }

    /// Runs the active strategy, advancing through the remaining ones on error
    /// or empty output. Each strategy is tried at most once per call.
    fn perceive(&mut self, screenshot: &Path, width: u32, height: u32) -> Result<PerceptionResult, String> {
        if self.strategies.is_empty() {
            return Err("no perception strategy configured".into());
        }
        self.state.current_strategy_idx = self.state.current_strategy_idx.min(self.strategies.len() - 1);

        loop {
            let adapter = &self.strategies[self.state.current_strategy_idx];
            let reason = match adapter.perceive(screenshot, width, height) {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => "Perception returned None".to_string(),
                Err(e) => e.to_string(),
            };
            tracing::error!(strategy = %adapter.name(), error = %reason, "perception failed");

            if self.state.current_strategy_idx + 1 >= self.strategies.len() {
                return Err(reason);
            }
            self.state.current_strategy_idx += 1;
            tracing::info!("trying next perception strategy");
        }
    }
}
