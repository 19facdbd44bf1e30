use std::path::Path;

use crate::errors::MobiClawResult;
use crate::perception::traits::Perception;
use crate::perception::types::{PerceptionMeta, PerceptionMode, PerceptionResult};

/// Runs several adapters on the same screenshot and merges their output.
///
/// Element indices are namespaced as `<child>:<index>` so they stay unique
/// across children. A child that errors or yields nothing is skipped; the
/// compound only gives up when every child did.
pub struct CompoundPerception {
    name: String,
    children: Vec<Box<dyn Perception>>,
}

impl CompoundPerception {
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn Perception>>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }
}

impl Perception for CompoundPerception {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> PerceptionMode {
        PerceptionMode::Composite
    }

    fn perceive(
        &self,
        screenshot: &Path,
        width_hint: u32,
        height_hint: u32,
    ) -> MobiClawResult<Option<PerceptionResult>> {
        let mut merged = PerceptionResult {
            mode: PerceptionMode::Composite,
            screenshot_path: screenshot.to_path_buf(),
            elements: Vec::new(),
            meta: PerceptionMeta::default(),
            prompt: String::new(),
            annotated_images: Vec::new(),
        };
        let mut sections = Vec::new();
        let mut any = false;

        for child in &self.children {
            let sub = match child.perceive(screenshot, width_hint, height_hint) {
                Ok(Some(r)) => r,
                Ok(None) => {
                    tracing::warn!(child = %child.name(), "compound child returned nothing");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(child = %child.name(), error = %e, "compound child failed");
                    continue;
                }
            };
            any = true;

            if merged.meta.width == 0 && sub.meta.width > 0 {
                merged.meta.width = sub.meta.width;
                merged.meta.height = sub.meta.height;
            }
            if merged.meta.grid.is_none() {
                merged.meta.grid = sub.meta.grid;
            }
            for (k, v) in sub.meta.extra {
                merged.meta.extra.entry(k).or_insert(v);
            }

            merged.elements.extend(sub.elements.into_iter().map(|mut e| {
                e.index = format!("{}:{}", child.name(), e.index);
                e
            }));
            if !sub.prompt.is_empty() {
                sections.push(format!("[{}]\n{}", child.name(), sub.prompt));
            }
            merged.annotated_images.extend(sub.annotated_images);
        }

        if !any {
            return Ok(None);
        }
        merged.prompt = sections.join("\n");
        merged.prompt.push_str(&format!(
            "\nElement IDs are prefixed by their source view, e.g. `{}:1`.\n",
            self.children.first().map(|c| c.name()).unwrap_or("view"),
        ));
        Ok(Some(merged))
    }
}
