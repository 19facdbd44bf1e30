use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::history::{HistoryEntry, SessionHistory};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{Action, ActionType, LoopConfig, StepRecord, TaskOutcome};
use crate::device::{Device, SwipeDirection};
use crate::errors::MobiClawResult;
use crate::knowledge::KnowledgeSource;
use crate::perception::screenshot::probe_dimensions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub max_steps: u32,
    pub max_duration_minutes: Option<u32>,
    pub max_consecutive_waits: Option<u32>,
    pub screenshot_dir: PathBuf,
    /// Where session JSONL files go; the user data directory when unset.
    pub session_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub settle_ms: u64,
    pub wait_ms: u64,
    pub post_action_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_duration_minutes: None,
            max_consecutive_waits: None,
            screenshot_dir: PathBuf::from("temp").join("screenshots"),
            session_dir: None,
            log_dir: PathBuf::from("temp").join("log"),
            settle_ms: 1500,
            wait_ms: 2000,
            post_action_ms: 500,
        }
    }
}

impl RunnerConfig {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_steps: self.max_steps,
            max_duration_minutes: self.max_duration_minutes,
            max_consecutive_waits: self.max_consecutive_waits,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    pub trajectory: Vec<StepRecord>,
}

/// Seconds since the epoch; names screenshots, logs and session files.
pub fn new_task_id() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Maps the `dist` parameter of a swipe to a screen fraction.
pub fn swipe_scale(dist: &str) -> f64 {
    match dist.trim().to_ascii_lowercase().as_str() {
        "short" => 0.4,
        "long" => 0.8,
        _ => 0.6,
    }
}

/// Drives an [`AgentEngine`] against a device until the task ends.
pub struct Runner {
    engine: AgentEngine,
    device: Box<dyn Device>,
    config: RunnerConfig,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    stop: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(engine: AgentEngine, device: Box<dyn Device>, config: RunnerConfig) -> Self {
        Self {
            engine,
            device,
            config,
            knowledge: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Successful trajectories are stored here as experience traces.
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn engine(&self) -> &AgentEngine {
        &self.engine
    }

    pub fn run(&mut self, task_id: &str, task: &str) -> MobiClawResult<RunReport> {
        std::fs::create_dir_all(&self.config.screenshot_dir)?;
        let mut history = SessionHistory::new(task_id, self.config.session_dir.as_deref());
        history.record(HistoryEntry::Task {
            ts: chrono::Utc::now().timestamp_millis(),
            task_id: task_id.to_string(),
            task: task.to_string(),
        });

        tracing::info!(task_id = %task_id, task = %task, device = %self.device.name(), "task started");
        self.engine.reset(task);

        let mut ctl = LoopController::new(self.config.loop_config());
        let mut trajectory = Vec::new();

        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                tracing::info!("stop requested");
                break TaskOutcome::Cancelled;
            }
            let step = match ctl.begin_step() {
                Ok(n) => n,
                Err(outcome) => break outcome,
            };
            tracing::info!(step, max = self.config.max_steps, "step");

            if step > 1 {
                pause(self.config.settle_ms);
            }

            let path = self
                .config
                .screenshot_dir
                .join(format!("task_{task_id}_step_{step}.png"));
            let shot = match self.device.screenshot(&path) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "screenshot failed");
                    break TaskOutcome::Aborted {
                        reason: format!("screenshot failed: {e}"),
                    };
                }
            };
            let (width, height) = probe_dimensions(&shot).unwrap_or_else(|| self.device.size());

            let action = self.engine.step(&shot, width, height);
            tracing::info!(
                action = %action.kind,
                params = %serde_json::Value::Object(action.params.clone()),
                thought = action.thought.as_deref().unwrap_or(""),
                "agent action"
            );

            let record = StepRecord {
                step,
                screenshot_path: shot,
                action: action.clone(),
                timestamp: chrono::Utc::now(),
            };
            history.record(HistoryEntry::Step(record.clone()));
            trajectory.push(record);

            match action.kind {
                ActionType::Done => break TaskOutcome::Done,
                ActionType::Fail => {
                    break TaskOutcome::Failed {
                        reason: action.thought.clone().unwrap_or_default(),
                    }
                }
                ActionType::Wait => {
                    if let Err(outcome) = ctl.record(&action) {
                        break outcome;
                    }
                    pause(self.config.wait_ms);
                    continue;
                }
                _ => {}
            }
            if let Err(outcome) = ctl.record(&action) {
                break outcome;
            }

            execute_on_device(self.device.as_ref(), &action);
            pause(self.config.post_action_ms);
        };

        tracing::info!(outcome = ?outcome, steps = trajectory.len(), "task finished");
        history.record(HistoryEntry::Finished {
            ts: chrono::Utc::now().timestamp_millis(),
            outcome: outcome.clone(),
        });

        if outcome == TaskOutcome::Done {
            self.store_traces(task, &trajectory);
        }

        Ok(RunReport {
            task_id: task_id.to_string(),
            outcome,
            trajectory,
        })
    }

    fn store_traces(&self, task: &str, trajectory: &[StepRecord]) {
        let Some(knowledge) = &self.knowledge else { return };
        let mut stored = 0usize;
        for record in trajectory {
            if !(record.action.kind.is_observable() || record.action.kind == ActionType::Key) {
                continue;
            }
            match knowledge.add_trace(&record.screenshot_path, task, &record.action) {
                Ok(()) => stored += 1,
                Err(e) => tracing::warn!(step = record.step, error = %e, "trace not stored"),
            }
        }
        tracing::info!(stored, "experience traces saved");
    }
}

fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Device errors are logged and the run continues; the verifier catches
/// actions that had no effect.
pub fn execute_on_device(device: &dyn Device, action: &Action) {
    let result = match action.kind {
        ActionType::Tap => device.tap(action.param_i64("x").unwrap_or(0), action.param_i64("y").unwrap_or(0)),
        ActionType::Text => device.input_text(action.param_str("text").unwrap_or("")),
        ActionType::Swipe => device.swipe(
            SwipeDirection::parse(action.param_str("direction").unwrap_or("left")),
            swipe_scale(action.param_str("dist").unwrap_or("medium")),
        ),
        ActionType::Key => match action.param_str("code").unwrap_or("").to_ascii_lowercase().as_str() {
            "home" => device.go_home(),
            "back" => device.go_back(),
            "enter" => device.enter(),
            "del" | "clear" => device.clear_text(),
            other => {
                tracing::warn!(code = %other, "unknown key code");
                Ok(())
            }
        },
        ActionType::Done | ActionType::Fail | ActionType::Wait => Ok(()),
    };
    match result {
        Ok(()) => tracing::debug!(action = %action.kind, "device action finished"),
        Err(e) => tracing::error!(action = %action.kind, error = %e, "device action failed"),
    }
}
