use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::agent_engine::state::Action;
use crate::errors::MobiClawResult;
use crate::knowledge::formatter::KnowledgeTemplates;
use crate::knowledge::KnowledgeSource;
use crate::memory::{
    render_action, FragmentContent, FragmentKind, KnowledgeBuffer, Memory, MemoryFragment,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlidingWindowConfig {
    pub window_size: usize,
    pub include_thought: bool,
    pub include_raw: bool,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            include_thought: true,
            include_raw: false,
        }
    }
}

/// Keeps every system fragment, the current knowledge, and only the most
/// recent `window_size` user/assistant fragments.
pub struct SlidingWindowMemory {
    config: SlidingWindowConfig,
    system: Vec<MemoryFragment>,
    history: Vec<MemoryFragment>,
    knowledge: KnowledgeBuffer,
}

impl SlidingWindowMemory {
    pub fn new(
        config: SlidingWindowConfig,
        source: Option<Arc<dyn KnowledgeSource>>,
        templates: KnowledgeTemplates,
    ) -> Self {
        Self {
            config,
            system: Vec::new(),
            history: Vec::new(),
            knowledge: KnowledgeBuffer::new(source, templates),
        }
    }
}

impl Memory for SlidingWindowMemory {
    fn add(&mut self, fragment: MemoryFragment) {
        if fragment.is_system() {
            self.system.push(fragment);
        } else {
            self.history.push(fragment);
        }
    }

    fn working_context(&self) -> Vec<MemoryFragment> {
        let skip = self.history.len().saturating_sub(self.config.window_size);
        let recent = self.history[skip..].iter().map(|f| match &f.content {
            FragmentContent::Action(action) if f.kind == FragmentKind::Action => MemoryFragment {
                role: f.role,
                kind: FragmentKind::Text,
                content: FragmentContent::Text(render_action(
                    action,
                    self.config.include_thought,
                    self.config.include_raw,
                )),
                metadata: f.metadata.clone(),
            },
            _ => f.clone(),
        });

        self.system
            .iter()
            .cloned()
            .chain(self.knowledge.fragments().iter().cloned())
            .chain(recent)
            .collect()
    }

    fn clear(&mut self) {
        self.system.clear();
        self.history.clear();
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
    use crate::memory::Role;

    fn memory(window: usize) -> SlidingWindowMemory {
        SlidingWindowMemory::new(
            SlidingWindowConfig {
                window_size: window,
                ..Default::default()
            },
            None,
            KnowledgeTemplates::default(),
        )
    }

    #[test]
    fn window_keeps_system_and_last_n_in_order() {
        let mut m = memory(2);
        m.add(MemoryFragment::text(Role::System, "sys-a"));
        for i in 0..5 {
            m.add(MemoryFragment::text(Role::User, format!("u{i}")));
            if i == 2 {
                m.add(MemoryFragment::text(Role::System, "sys-b"));
            }
        }

        let ctx: Vec<String> = m.working_context().iter().map(|f| f.content_text()).collect();
        assert_eq!(ctx, vec!["sys-a", "sys-b", "u3", "u4"]);
    }

    #[test]
    fn actions_are_rendered_at_read_time() {
        let mut m = memory(5);
        m.add(MemoryFragment::action(
            Role::Assistant,
            Action::tap(1, 2).with_thought("try it"),
        ));
        let ctx = m.working_context();
        assert_eq!(ctx[0].kind, FragmentKind::Text);
        assert_eq!(ctx[0].content_text(), "Thought: try it\nAction: tap {\"x\":1,\"y\":2}");
    }

    #[test]
    fn decoded_action_reads_back_with_type_params_and_thought() {
        use crate::decoder::{ActionDecoder, DecodeContext};
        use crate::perception::types::PerceptionMode;

        let ctx = DecodeContext {
            mode: PerceptionMode::Coordinate,
            width: 1080,
            height: 2340,
            grid: None,
            elements: &[],
        };
        let reply = r#"{"thought":"the wifi toggle is at the top","name":"tap","arguments":{"x":540,"y":312}}"#;
        let action = ActionDecoder::new().decode(reply, &ctx);

        let mut m = memory(5);
        m.add(MemoryFragment::action(Role::Assistant, action));
        let text = m.working_context()[0].content_text();
        assert!(text.contains("tap"), "{text}");
        assert!(text.contains("{\"x\":540,\"y\":312}"), "{text}");
        assert!(text.contains("Thought: the wifi toggle is at the top"), "{text}");
    }

    #[test]
    fn clear_empties_everything() {
        let mut m = memory(5);
        m.add(MemoryFragment::text(Role::System, "s"));
        m.add(MemoryFragment::text(Role::User, "u"));
        m.clear();
        assert!(m.working_context().is_empty());
    }
}
