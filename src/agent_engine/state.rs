use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter / metadata mapping carried by an [`Action`].
pub type Params = Map<String, Value>;

/// The closed set of device-level actions the agent can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Tap,
    Swipe,
    Text,
    Key,
    Done,
    Fail,
    Wait,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Tap => "tap",
            ActionType::Swipe => "swipe",
            ActionType::Text => "text",
            ActionType::Key => "key",
            ActionType::Done => "done",
            ActionType::Fail => "fail",
            ActionType::Wait => "wait",
        }
    }

    /// Actions expected to change what is on screen.
    pub fn is_observable(&self) -> bool {
        matches!(self, ActionType::Tap | ActionType::Swipe | ActionType::Text)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decided UI action. Immutable once handed out by the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default)]
    pub metadata: Params,
}

impl Action {
    pub fn new(kind: ActionType) -> Self {
        Self {
            kind,
            params: Params::new(),
            thought: None,
            metadata: Params::new(),
        }
    }

    pub fn tap(x: impl Into<Value>, y: impl Into<Value>) -> Self {
        Self::new(ActionType::Tap).with_param("x", x).with_param("y", y)
    }

    pub fn key(code: &str) -> Self {
        Self::new(ActionType::Key).with_param("code", code)
    }

    pub fn wait(thought: impl Into<String>) -> Self {
        Self::new(ActionType::Wait).with_thought(thought)
    }

    pub fn fail(thought: impl Into<String>) -> Self {
        Self::new(ActionType::Fail).with_thought(thought)
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Integer parameter; numeric strings such as `"100"` are accepted.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn raw_response(&self) -> Option<&str> {
        self.metadata.get("raw_response").and_then(Value::as_str)
    }
}

/// Loop-local state carried between two `step` calls of one task.
#[derive(Debug, Clone, Default)]
pub struct AgentRuntimeState {
    pub last_screenshot_path: Option<PathBuf>,
    pub last_action: Option<Action>,
    pub current_strategy_idx: usize,
}

/// One executed step, as persisted by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    pub screenshot_path: PathBuf,
    pub action: Action,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// How a task run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Done,
    Failed { reason: String },
    BudgetExhausted,
    Cancelled,
    Aborted { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub max_steps: u32,
    pub max_duration_minutes: Option<u32>,
    pub max_consecutive_waits: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_duration_minutes: None,
            max_consecutive_waits: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_string_params_are_coerced() {
        let action = Action::tap("100", 200);
        assert_eq!(action.param_i64("x"), Some(100));
        assert_eq!(action.param_i64("y"), Some(200));
        assert_eq!(action.param_i64("z"), None);
    }

    #[test]
    fn only_tap_swipe_text_are_observable() {
        assert!(ActionType::Tap.is_observable());
        assert!(ActionType::Text.is_observable());
        assert!(!ActionType::Key.is_observable());
        assert!(!ActionType::Wait.is_observable());
    }

    #[test]
    fn action_serializes_with_type_tag() {
        let action = Action::key("home");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "key");
        assert_eq!(json["params"]["code"], "home");
    }
}
