pub mod apps;
pub mod parsers;
pub mod universal;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::MobiClawResult;

/// Output of the planner, computed once per task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub plan: String,
    /// Structured extras such as `app_name`, `package_name`, `target_app`.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PlanResult {
    pub fn new(plan: impl Into<String>) -> Self {
        Self {
            plan: plan.into(),
            data: Map::new(),
        }
    }
}

pub trait Planner: Send {
    fn make_plan(&self, task: &str) -> MobiClawResult<PlanResult>;
}
