use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::Action;
use crate::decoder::{ActionDecoder, DecodeContext};
use crate::errors::{MobiClawError, MobiClawResult};
use crate::llm::LanguageModel;
use crate::memory::{render_action, FragmentContent, FragmentKind, MemoryFragment};
use crate::perception::types::{PerceptionResult, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::reasoning::actions::render_actions;
use crate::reasoning::Reasoner;

const GENERAL_TEMPLATE: &str = include_str!("../../prompts/reasoning_general.md");

/// Whether screenshots are attached to the reasoning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Image,
    Text,
}

/// Resolve a template: a readable file path wins, then a built-in preset name.
pub fn load_template(name_or_path: &str) -> MobiClawResult<String> {
    let path = Path::new(name_or_path);
    if path.is_file() {
        return Ok(std::fs::read_to_string(path)?);
    }
    match name_or_path {
        "general" | "general_vlm_type" | "reasoning_general.md" => Ok(GENERAL_TEMPLATE.to_string()),
        other => Err(MobiClawError::Config(format!(
            "reasoning template '{other}' is neither a file nor a built-in preset"
        ))),
    }
}

/// Prompt-template reasoning over any vision language model.
pub struct UniversalReasoner {
    model: Arc<dyn LanguageModel>,
    template: String,
    input_mode: InputMode,
    decoder: ActionDecoder,
}

impl UniversalReasoner {
    pub fn new(model: Arc<dyn LanguageModel>, template: String, input_mode: InputMode) -> Self {
        Self {
            model,
            template,
            input_mode,
            decoder: ActionDecoder::new(),
        }
    }

    pub fn with_default_template(model: Arc<dyn LanguageModel>) -> Self {
        Self::new(model, GENERAL_TEMPLATE.to_string(), InputMode::Image)
    }

    pub fn render_prompt(
        &self,
        task: &str,
        plan: &str,
        perception: &PerceptionResult,
        context: &[MemoryFragment],
    ) -> String {
        let (width, height) = match (perception.meta.width, perception.meta.height) {
            (0, _) | (_, 0) => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            dims => dims,
        };
        self.template
            .replace("{task}", task)
            .replace("{plan}", plan)
            .replace("{history_text}", &format_history(context))
            .replace("{width}", &width.to_string())
            .replace("{height}", &height.to_string())
            .replace("{perception_prompt}", &perception.prompt)
            .replace("{actions_def}", &render_actions(perception.mode))
    }
}

/// Flatten memory into the prompt's history section.
pub fn format_history(fragments: &[MemoryFragment]) -> String {
    let mut out = String::new();
    for f in fragments {
        let role = f.role.as_str().to_uppercase();
        match (f.kind, &f.content) {
            (kind, _) if kind.is_knowledge() => {
                out.push_str(&format!("\n[SYSTEM KNOWLEDGE]\n{}\n", f.content_text()));
            }
            (FragmentKind::Image, _) => out.push_str(&format!("[{role}]: [Screenshot Uploaded]\n")),
            (_, FragmentContent::Action(a)) => {
                out.push_str(&format!("[{role}]: {}\n", render_action(a, true, false)));
            }
            (_, FragmentContent::Text(t)) => out.push_str(&format!("[{role}]: {t}\n")),
        }
    }
    out
}

impl Reasoner for UniversalReasoner {
    fn think(
        &self,
        task: &str,
        plan: &str,
        perception: &PerceptionResult,
        context: &[MemoryFragment],
    ) -> MobiClawResult<(Action, String)> {
        let prompt = self.render_prompt(task, plan, perception, context);
        tracing::debug!(prompt_len = prompt.len(), mode = %perception.mode, "reasoning prompt rendered");

        let images = match self.input_mode {
            InputMode::Text => Vec::new(),
            InputMode::Image if perception.annotated_images.is_empty() => {
                vec![perception.screenshot_path.clone()]
            }
            InputMode::Image => perception.annotated_images.clone(),
        };

        let response = self.model.generate(&prompt, &images);
        tracing::info!(response = %response, "model response");

        let action = self.decoder.decode(&response, &DecodeContext::from_perception(perception));
        Ok((action, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::ActionType;
    use crate::memory::Role;
    use crate::perception::types::PerceptionMode;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct Scripted {
        reply: &'static str,
        calls: Mutex<Vec<(String, Vec<PathBuf>)>>,
    }

    impl LanguageModel for Scripted {
        fn generate(&self, prompt: &str, images: &[PathBuf]) -> String {
            self.calls.lock().unwrap().push((prompt.to_string(), images.to_vec()));
            self.reply.to_string()
        }
    }

    fn perception() -> PerceptionResult {
        let mut p = PerceptionResult::empty(PerceptionMode::Coordinate, PathBuf::from("shot.png"), 720, 1600);
        p.prompt = "ID: 0 | Text: Settings | Center: [100, 200]".into();
        p
    }

    #[test]
    fn prompt_placeholders_are_filled() {
        let model = Arc::new(Scripted {
            reply: "",
            calls: Mutex::new(Vec::new()),
        });
        let r = UniversalReasoner::new(
            model,
            "{task}|{plan}|{width}x{height}|{perception_prompt}|{history_text}|{actions_def}".into(),
            InputMode::Text,
        );
        let ctx = vec![MemoryFragment::text(Role::System, "New task started: x")];
        let prompt = r.render_prompt("open wifi", "1. settings", &perception(), &ctx);
        assert!(prompt.starts_with("open wifi|1. settings|720x1600|ID: 0 | Text: Settings"));
        assert!(prompt.contains("[SYSTEM]: New task started: x"));
        assert!(prompt.contains("- Tap(x, y):"));
        assert!(!prompt.contains("{task}"));
    }

    #[test]
    fn think_attaches_screenshot_and_decodes() {
        let model = Arc::new(Scripted {
            reply: r#"{"thought":"open it","name":"tap","arguments":{"x":100,"y":200}}"#,
            calls: Mutex::new(Vec::new()),
        });
        let r = UniversalReasoner::with_default_template(model.clone());
        let (action, raw) = r.think("open settings", "none", &perception(), &[]).unwrap();

        assert_eq!(action.kind, ActionType::Tap);
        assert_eq!(action.thought.as_deref(), Some("open it"));
        assert!(raw.contains("\"tap\""));
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec![PathBuf::from("shot.png")]);
    }

    #[test]
    fn history_renders_knowledge_and_actions() {
        let frags = vec![
            MemoryFragment::new(Role::System, FragmentKind::RagDoc, "--- Reference Info ---\nTip"),
            MemoryFragment::action(Role::Assistant, Action::key("back")),
            MemoryFragment::new(Role::User, FragmentKind::Image, "ignored"),
        ];
        let text = format_history(&frags);
        assert!(text.contains("\n[SYSTEM KNOWLEDGE]\n--- Reference Info ---\nTip\n"));
        assert!(text.contains("[ASSISTANT]: Action: key {\"code\":\"back\"}"));
        assert!(text.contains("[USER]: [Screenshot Uploaded]"));
    }

    #[test]
    fn unknown_template_is_config_error() {
        assert!(load_template("no_such_preset").is_err());
        assert!(load_template("general").unwrap().contains("{actions_def}"));
    }
}
