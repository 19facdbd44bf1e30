pub mod sliding_window;
pub mod summary;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent_engine::state::{Action, Params};
use crate::errors::MobiClawResult;
use crate::knowledge::formatter::KnowledgeTemplates;
use crate::knowledge::KnowledgeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Text,
    Image,
    Action,
    Error,
    Plan,
    RagDoc,
    Profile,
    FewShot,
}

impl FragmentKind {
    /// Kind given to a retrieved document, by its knowledge category.
    pub fn for_knowledge_category(category: &str) -> Self {
        match category {
            "user_profile" => FragmentKind::Profile,
            "example" => FragmentKind::FewShot,
            _ => FragmentKind::RagDoc,
        }
    }

    pub fn is_knowledge(&self) -> bool {
        matches!(self, FragmentKind::RagDoc | FragmentKind::Profile | FragmentKind::FewShot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentContent {
    Action(Action),
    Text(String),
}

/// One entry of the agent's dialogue history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFragment {
    pub role: Role,
    pub kind: FragmentKind,
    pub content: FragmentContent,
    #[serde(default)]
    pub metadata: Params,
}

impl MemoryFragment {
    pub fn new(role: Role, kind: FragmentKind, text: impl Into<String>) -> Self {
        Self {
            role,
            kind,
            content: FragmentContent::Text(text.into()),
            metadata: Params::new(),
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, FragmentKind::Text, text)
    }

    pub fn action(role: Role, action: Action) -> Self {
        Self {
            role,
            kind: FragmentKind::Action,
            content: FragmentContent::Action(action),
            metadata: Params::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata_map(mut self, map: Params) -> Self {
        self.metadata.extend(map);
        self
    }

    /// Plain text of the content; actions are rendered as `<type> <params>`.
    pub fn content_text(&self) -> String {
        match &self.content {
            FragmentContent::Text(s) => s.clone(),
            FragmentContent::Action(a) => format!("{} {}", a.kind, Value::Object(a.params.clone())),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Render an action fragment the way the model reads it back:
/// `Thought: ...\nAction: <type> <params>\n(Raw Output: ...)`.
pub fn render_action(action: &Action, include_thought: bool, include_raw: bool) -> String {
    let mut line = format!("Action: {}", action.kind);
    if !action.params.is_empty() {
        line.push(' ');
        line.push_str(&Value::Object(action.params.clone()).to_string());
    }

    let mut out = match &action.thought {
        Some(t) if include_thought && !t.is_empty() => format!("Thought: {t}\n{line}"),
        _ => line,
    };
    if include_raw {
        if let Some(raw) = action.raw_response() {
            out.push_str(&format!("\n(Raw Output: {raw})"));
        }
    }
    out
}

/// Bounded dialogue memory with pluggable knowledge.
pub trait Memory: Send {
    fn add(&mut self, fragment: MemoryFragment);

    /// Fragments to hand the reasoning prompt, oldest first.
    fn working_context(&self) -> Vec<MemoryFragment>;

    fn clear(&mut self);

    /// Replace the knowledge buffer with docs relevant to `query`.
    fn load_knowledge(&mut self, query: &str) -> MobiClawResult<()>;

    /// Fast-path lookup of a remembered action for this screen and task.
    fn retrieve_experience(&self, screenshot: &Path, task: &str) -> MobiClawResult<Option<Action>>;
}

/// Knowledge plumbing shared by the memory implementations.
pub struct KnowledgeBuffer {
    source: Option<Arc<dyn KnowledgeSource>>,
    templates: KnowledgeTemplates,
    fragments: Vec<MemoryFragment>,
}

impl KnowledgeBuffer {
    pub fn new(source: Option<Arc<dyn KnowledgeSource>>, templates: KnowledgeTemplates) -> Self {
        Self {
            source,
            templates,
            fragments: Vec::new(),
        }
    }

    pub fn fragments(&self) -> &[MemoryFragment] {
        &self.fragments
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    pub fn load(&mut self, query: &str) -> MobiClawResult<()> {
        let Some(source) = &self.source else {
            return Ok(());
        };
        let docs = source.search_docs(query)?;
        self.fragments = docs
            .iter()
            .map(|d| {
                let kind = FragmentKind::for_knowledge_category(&d.category);
                MemoryFragment::new(Role::System, kind, self.templates.format(d))
                    .with_metadata("doc_id", d.id.as_str())
                    .with_metadata("category", d.category.as_str())
            })
            .collect();
        Ok(())
    }

    pub fn experience(&self, screenshot: &Path, task: &str) -> MobiClawResult<Option<Action>> {
        match &self.source {
            Some(source) => source.match_trace(screenshot, task),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::ActionType;

    #[test]
    fn rendered_action_contains_type_params_and_thought() {
        let action = Action::tap(100, 200)
            .with_thought("open the menu")
            .with_metadata("raw_response", "{...}");
        let full = render_action(&action, true, true);
        assert_eq!(
            full,
            "Thought: open the menu\nAction: tap {\"x\":100,\"y\":200}\n(Raw Output: {...})"
        );
        assert_eq!(render_action(&action, false, false), "Action: tap {\"x\":100,\"y\":200}");
    }

    #[test]
    fn parameterless_action_renders_type_only() {
        assert_eq!(render_action(&Action::new(ActionType::Done), true, false), "Action: done");
    }

    #[test]
    fn knowledge_categories_map_to_fragment_kinds() {
        assert_eq!(FragmentKind::for_knowledge_category("user_profile"), FragmentKind::Profile);
        assert_eq!(FragmentKind::for_knowledge_category("example"), FragmentKind::FewShot);
        assert_eq!(FragmentKind::for_knowledge_category("manual"), FragmentKind::RagDoc);
        assert!(FragmentKind::FewShot.is_knowledge());
        assert!(!FragmentKind::Plan.is_knowledge());
    }

    #[test]
    fn fragment_roundtrips_through_json_with_action_content() {
        let f = MemoryFragment::action(Role::Assistant, Action::key("back")).with_metadata("source", "brain");
        let json = serde_json::to_string(&f).unwrap();
        let back: MemoryFragment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }
}
