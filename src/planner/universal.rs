use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{MobiClawError, MobiClawResult};
use crate::knowledge::KnowledgeSource;
use crate::llm::LanguageModel;
use crate::planner::apps::AppResolver;
use crate::planner::parsers::PlanParser;
use crate::planner::{PlanResult, Planner};

const MANAGER_TEMPLATE: &str = include_str!("../../prompts/planner_manager.md");
const APP_ROUTER_TEMPLATE: &str = include_str!("../../prompts/planner_mobimind.md");

/// Template + reply parser + whether knowledge is injected as `{context}`.
#[derive(Debug, Clone)]
pub struct PlannerPreset {
    pub template: String,
    pub parser: PlanParser,
    pub use_knowledge: bool,
}

impl PlannerPreset {
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "manager_style" => Some(Self {
                template: MANAGER_TEMPLATE.to_string(),
                parser: PlanParser::Section,
                use_knowledge: false,
            }),
            "mobimind_style" => Some(Self {
                template: APP_ROUTER_TEMPLATE.to_string(),
                parser: PlanParser::AppJson,
                use_knowledge: true,
            }),
            _ => None,
        }
    }

    /// Start from a named preset and apply overrides. Without a known preset a
    /// template file is mandatory.
    pub fn resolve(
        preset: &str,
        prompt_file: Option<&Path>,
        parser: Option<PlanParser>,
        use_knowledge: Option<bool>,
    ) -> MobiClawResult<Self> {
        let mut out = match (Self::by_name(preset), prompt_file) {
            (Some(p), _) => p,
            (None, Some(_)) => Self {
                template: String::new(),
                parser: PlanParser::Section,
                use_knowledge: false,
            },
            (None, None) => {
                return Err(MobiClawError::Config(format!(
                    "unknown planner preset '{preset}' and no prompt_file given"
                )))
            }
        };
        if let Some(path) = prompt_file {
            let raw = std::fs::read_to_string(path)?;
            out.template = raw.replace("````markdown", "").replace("````", "").trim().to_string();
        }
        if let Some(p) = parser {
            out.parser = p;
        }
        if let Some(k) = use_knowledge {
            out.use_knowledge = k;
        }
        Ok(out)
    }
}

pub struct UniversalPlanner {
    model: Arc<dyn LanguageModel>,
    preset: PlannerPreset,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    apps: AppResolver,
}

impl UniversalPlanner {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        preset: PlannerPreset,
        knowledge: Option<Arc<dyn KnowledgeSource>>,
        apps: AppResolver,
    ) -> Self {
        Self {
            model,
            preset,
            knowledge,
            apps,
        }
    }

    fn knowledge_context(&self, task: &str) -> String {
        let Some(source) = self.knowledge.as_ref().filter(|_| self.preset.use_knowledge) else {
            return String::new();
        };
        match source.search_docs(task) {
            Ok(docs) => docs.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, "planner knowledge lookup failed");
                String::new()
            }
        }
    }
}

impl Planner for UniversalPlanner {
    fn make_plan(&self, task: &str) -> MobiClawResult<PlanResult> {
        let prompt = self
            .preset
            .template
            .replace("{task}", task)
            .replace("{context}", &self.knowledge_context(task));
        tracing::debug!(prompt = %prompt, "planner prompt");

        let response = self.model.generate(&prompt, &[]);
        if response.trim().is_empty() {
            return Err(MobiClawError::Planner("planner model returned nothing".into()));
        }
        tracing::info!(response = %response, "planner response");

        let mut result = self.preset.parser.parse(&response, task);
        if let Some(app) = result.data.get("app_name").and_then(Value::as_str) {
            let target = self.apps.resolve(app);
            result.data.insert("target_app".into(), Value::String(target));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct Canned {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl LanguageModel for Canned {
        fn generate(&self, prompt: &str, _: &[PathBuf]) -> String {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.to_string()
        }
    }

    #[test]
    fn app_router_resolves_target_app() {
        let model = Arc::new(Canned {
            reply: "```json\n{\"app_name\": \"wechat\", \"final_task_description\": \"Send hi to Bob\"}\n```",
            prompts: Mutex::new(Vec::new()),
        });
        let mut mapping = HashMap::new();
        mapping.insert(
            "wechat".to_string(),
            HashMap::from([("package_android".to_string(), "com.tencent.mm".to_string())]),
        );
        let planner = UniversalPlanner::new(
            model.clone(),
            PlannerPreset::by_name("mobimind_style").unwrap(),
            None,
            AppResolver::new(mapping, "android", "en"),
        );

        let plan = planner.make_plan("tell Bob hi on wechat").unwrap();
        assert_eq!(plan.plan, "Send hi to Bob");
        assert_eq!(plan.data["target_app"], "com.tencent.mm");
        assert!(model.prompts.lock().unwrap()[0].contains("tell Bob hi on wechat"));
    }

    #[test]
    fn manager_preset_uses_plan_section() {
        let model = Arc::new(Canned {
            reply: "### Thought ###\nx\n### Plan ###\n1. Open Settings",
            prompts: Mutex::new(Vec::new()),
        });
        let planner = UniversalPlanner::new(
            model,
            PlannerPreset::by_name("manager_style").unwrap(),
            None,
            AppResolver::default(),
        );
        let plan = planner.make_plan("turn on wifi").unwrap();
        assert_eq!(plan.plan, "1. Open Settings");
        assert!(plan.data.get("target_app").is_none());
    }

    #[test]
    fn unknown_preset_without_file_is_rejected() {
        assert!(PlannerPreset::resolve("fancy", None, None, None).is_err());
    }

    #[test]
    fn empty_reply_is_planner_error() {
        let model = Arc::new(Canned {
            reply: "",
            prompts: Mutex::new(Vec::new()),
        });
        let planner = UniversalPlanner::new(
            model,
            PlannerPreset::by_name("manager_style").unwrap(),
            None,
            AppResolver::default(),
        );
        assert!(matches!(planner.make_plan("x"), Err(MobiClawError::Planner(_))));
    }
}
