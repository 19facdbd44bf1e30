pub mod formatter;
pub mod hash;
pub mod local;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent_engine::state::Action;
use crate::errors::MobiClawResult;

/// A retrievable piece of reference material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    #[serde(default)]
    pub id: String,
    /// App the doc applies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    pub content: String,
    /// e.g. "manual", "user_profile", "constraint"; selects the prompt template.
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing)]
    pub score: f32,
}

fn default_category() -> String {
    "general".to_string()
}

/// Long-lived store of documents and successful experience traces.
///
/// Shared between the agent's memory (reads) and the runner (writes after a
/// successful task), hence `&self` methods and `Sync`.
pub trait KnowledgeSource: Send + Sync {
    fn add_document(
        &self,
        app: Option<&str>,
        content: &str,
        category: &str,
        metadata: Map<String, Value>,
    ) -> MobiClawResult<()>;

    fn search_docs(&self, query: &str) -> MobiClawResult<Vec<KnowledgeDoc>>;

    /// Remember that `action` was right for this screen during `task`.
    fn add_trace(&self, screenshot: &Path, task: &str, action: &Action) -> MobiClawResult<()>;

    fn match_trace(&self, screenshot: &Path, task: &str) -> MobiClawResult<Option<Action>>;
}
