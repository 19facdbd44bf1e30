use std::collections::HashMap;

use serde_json::Value;

use crate::knowledge::KnowledgeDoc;

/// Category → prompt template. `{content}` and any `{metadata_key}` are filled in.
#[derive(Debug, Clone)]
pub struct KnowledgeTemplates {
    templates: HashMap<String, String>,
}

impl Default for KnowledgeTemplates {
    fn default() -> Self {
        let templates = [
            ("general", "--- Reference Info ---\n{content}"),
            ("manual", "--- App Operation Manual ---\nTip: {content}"),
            ("user_profile", "--- User Preference ---\nIMPORTANT: The user prefers: {content}"),
            ("constraint", "--- SAFETY CONSTRAINT ---\nWARNING: You MUST follow this rule: {content}"),
            ("example", "--- Success Example ---\nHere is how to do it: {content}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { templates }
    }
}

impl KnowledgeTemplates {
    /// Add or replace the template for `category`.
    pub fn register(&mut self, category: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(category.into(), template.into());
    }

    pub fn format(&self, doc: &KnowledgeDoc) -> String {
        let template = self
            .templates
            .get(&doc.category)
            .or_else(|| self.templates.get("general"))
            .map(String::as_str)
            .unwrap_or("{content}");

        fill(template, doc)
            .unwrap_or_else(|| format!("--- Knowledge ({}) ---\n{}", doc.category, doc.content))
    }
}

/// `None` when the template names a placeholder the doc cannot supply.
fn fill(template: &str, doc: &KnowledgeDoc) -> Option<String> {
    let mut out = String::with_capacity(template.len() + doc.content.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let close = rest[open..].find('}')? + open;
        let key = &rest[open + 1..close];
        if key == "content" {
            out.push_str(&doc.content);
        } else {
            match doc.metadata.get(key)? {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}
