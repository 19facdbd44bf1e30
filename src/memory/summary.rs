use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::agent_engine::state::Action;
use crate::errors::MobiClawResult;
use crate::knowledge::formatter::KnowledgeTemplates;
use crate::knowledge::KnowledgeSource;
use crate::llm::LanguageModel;
use crate::memory::{FragmentKind, KnowledgeBuffer, Memory, MemoryFragment, Role};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub max_history_len: usize,
    /// Fraction of `max_history_len` folded into the summary per compression.
    pub compress_ratio: f32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_history_len: 10,
            compress_ratio: 0.5,
        }
    }
}

/// Rolling-summary memory: once active history grows past the limit, the
/// oldest slice is summarised by the model and dropped.
pub struct SummaryMemory {
    config: SummaryConfig,
    model: Arc<dyn LanguageModel>,
    system: Option<MemoryFragment>,
    summary: String,
    active: Vec<MemoryFragment>,
    knowledge: KnowledgeBuffer,
}

impl SummaryMemory {
    pub fn new(
        config: SummaryConfig,
        model: Arc<dyn LanguageModel>,
        source: Option<Arc<dyn KnowledgeSource>>,
        templates: KnowledgeTemplates,
    ) -> Self {
        Self {
            config,
            model,
            system: None,
            summary: String::new(),
            active: Vec::new(),
            knowledge: KnowledgeBuffer::new(source, templates),
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    fn compress(&mut self) {
        let cut = (self.config.max_history_len as f32 * self.config.compress_ratio) as usize;
        let cut = cut.min(self.active.len());
        if cut == 0 {
            return;
        }

        let history_text: String = self.active[..cut]
            .iter()
            .map(|f| format!("[{}]: {}\n", f.role, f.content_text()))
            .collect();
        let previous = if self.summary.is_empty() { "None" } else { &self.summary };
        let prompt = format!(
            "You are a helpful assistant summarizing a conversation history for a mobile agent.\n\n\
             Previous Summary:\n{previous}\n\n\
             New Conversation to Compress:\n{history_text}\n\
             Task:\nSummarize the new conversation and merge it with the previous summary.\n\
             Keep key information about what the user wanted and what actions the agent performed.\n\
             Be concise.\n"
        );

        let new_summary = self.model.generate(&prompt, &[]);
        if new_summary.trim().is_empty() {
            tracing::error!(active = self.active.len(), "history compression failed, keeping full history");
            return;
        }
        self.active.drain(..cut);
        tracing::info!(summary_len = new_summary.len(), remaining = self.active.len(), "history compressed");
        self.summary = new_summary;
    }
}

impl Memory for SummaryMemory {
    fn add(&mut self, fragment: MemoryFragment) {
        if fragment.is_system() && fragment.kind == FragmentKind::Text {
            self.system = Some(fragment);
            return;
        }
        self.active.push(fragment);
        if self.active.len() > self.config.max_history_len {
            self.compress();
        }
    }

    fn working_context(&self) -> Vec<MemoryFragment> {
        let mut ctx = Vec::with_capacity(self.active.len() + 4);
        ctx.extend(self.system.iter().cloned());
        ctx.extend(self.knowledge.fragments().iter().cloned());
        if !self.summary.is_empty() {
            ctx.push(MemoryFragment::text(
                Role::System,
                format!(
                    "--- Previous Conversation Summary ---\n{}\n-----------------------------------",
                    self.summary
                ),
            ));
        }
        ctx.extend(self.active.iter().cloned());
        ctx
    }

    fn clear(&mut self) {
        self.system = None;
        self.summary.clear();
        self.active.clear();
        self.knowledge.clear();
    }

    fn load_knowledge(&mut self, query: &str) -> MobiClawResult<()> {
        self.knowledge.load(query)
    }

    fn retrieve_experience(&self, screenshot: &Path, task: &str) -> MobiClawResult<Option<Action>> {
        self.knowledge.experience(screenshot, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct CannedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl LanguageModel for CannedModel {
        fn generate(&self, prompt: &str, _images: &[PathBuf]) -> String {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }
    }

    fn memory(reply: &str) -> (SummaryMemory, Arc<CannedModel>) {
        let model = Arc::new(CannedModel {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let m = SummaryMemory::new(
            SummaryConfig {
                max_history_len: 4,
                compress_ratio: 0.5,
            },
            model.clone(),
            None,
            KnowledgeTemplates::default(),
        );
        (m, model)
    }

    #[test]
    fn overflow_folds_oldest_into_summary() {
        let (mut m, model) = memory("user opened settings");
        m.add(MemoryFragment::text(Role::System, "New task started: open settings"));
        for i in 0..5 {
            m.add(MemoryFragment::text(Role::User, format!("u{i}")));
        }

        assert_eq!(m.summary(), "user opened settings");
        assert_eq!(m.active_len(), 3);
        assert!(model.prompts.lock().unwrap()[0].contains("[user]: u0\n[user]: u1\n"));

        let ctx = m.working_context();
        assert_eq!(ctx[0].content_text(), "New task started: open settings");
        assert!(ctx[1].content_text().starts_with("--- Previous Conversation Summary ---\nuser opened settings"));
        assert_eq!(ctx[2].content_text(), "u2");
    }

    #[test]
    fn empty_summary_leaves_history_over_limit() {
        let (mut m, _) = memory("   ");
        for i in 0..6 {
            m.add(MemoryFragment::text(Role::Assistant, format!("a{i}")));
        }
        assert_eq!(m.active_len(), 6);
        assert!(m.summary().is_empty());
    }

    #[test]
    fn plan_fragments_stay_in_active_history() {
        let (mut m, _) = memory("s");
        m.add(MemoryFragment::new(Role::System, FragmentKind::Plan, "1. open app"));
        m.add(MemoryFragment::text(Role::System, "first"));
        m.add(MemoryFragment::text(Role::System, "second"));
        let ctx = m.working_context();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].content_text(), "second");
        assert_eq!(ctx[1].kind, FragmentKind::Plan);
    }
}
