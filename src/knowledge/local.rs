use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent_engine::state::Action;
use crate::errors::{MobiClawError, MobiClawResult};
use crate::knowledge::hash::{dhash, hamming};
use crate::knowledge::{KnowledgeDoc, KnowledgeSource};

/// A recorded (screen, task) → action decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceTrace {
    pub task: String,
    pub screen_hash: u64,
    pub action: Action,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalKnowledgeConfig {
    pub docs_path: Option<PathBuf>,
    /// JSONL file traces are loaded from and appended to.
    pub traces_path: Option<PathBuf>,
    pub top_k: usize,
    /// Maximum Hamming distance between screen hashes for a trace to match.
    pub max_hash_distance: u32,
}

impl Default for LocalKnowledgeConfig {
    fn default() -> Self {
        Self {
            docs_path: None,
            traces_path: None,
            top_k: 3,
            max_hash_distance: 5,
        }
    }
}

/// In-process knowledge base: keyword-ranked documents plus experience
/// traces matched by task text and screenshot perceptual hash.
pub struct LocalKnowledgeBase {
    config: LocalKnowledgeConfig,
    docs: Mutex<Vec<KnowledgeDoc>>,
    traces: Mutex<Vec<ExperienceTrace>>,
}

impl LocalKnowledgeBase {
    pub fn new(config: LocalKnowledgeConfig) -> MobiClawResult<Self> {
        let docs = match &config.docs_path {
            Some(p) => load_docs(p)?,
            None => Vec::new(),
        };
        let traces = match &config.traces_path {
            Some(p) if p.exists() => load_traces(p)?,
            _ => Vec::new(),
        };
        tracing::info!(docs = docs.len(), traces = traces.len(), "knowledge base loaded");
        Ok(Self {
            config,
            docs: Mutex::new(docs),
            traces: Mutex::new(traces),
        })
    }

    pub fn trace_count(&self) -> usize {
        self.traces.lock().map(|t| t.len()).unwrap_or(0)
    }
}

fn load_docs(path: &Path) -> MobiClawResult<Vec<KnowledgeDoc>> {
    let text = std::fs::read_to_string(path)?;
    let mut docs: Vec<KnowledgeDoc> = serde_json::from_str(&text)?;
    for (i, d) in docs.iter_mut().enumerate() {
        if d.id.is_empty() {
            d.id = format!("doc_{i}");
        }
    }
    Ok(docs)
}

fn load_traces(path: &Path) -> MobiClawResult<Vec<ExperienceTrace>> {
    let text = std::fs::read_to_string(path)?;
    let mut traces = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(t) => traces.push(t),
            Err(e) => tracing::warn!(error = %e, "skipping corrupt trace line"),
        }
    }
    Ok(traces)
}

fn poisoned<T>(_: T) -> MobiClawError {
    MobiClawError::Knowledge("knowledge store lock poisoned".to_string())
}

/// Lowercased word tokens; CJK characters count as one token each.
pub fn tokenize(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            word.push(c.to_ascii_lowercase());
            continue;
        }
        if !word.is_empty() {
            out.insert(std::mem::take(&mut word));
        }
        if c.is_alphanumeric() {
            out.insert(c.to_lowercase().collect());
        }
    }
    if !word.is_empty() {
        out.insert(word);
    }
    out
}

fn normalize_task(task: &str) -> String {
    task.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl KnowledgeSource for LocalKnowledgeBase {
    fn add_document(
        &self,
        app: Option<&str>,
        content: &str,
        category: &str,
        metadata: Map<String, Value>,
    ) -> MobiClawResult<()> {
        let mut docs = self.docs.lock().map_err(poisoned)?;
        let id = format!("doc_{}", docs.len());
        docs.push(KnowledgeDoc {
            id,
            app: app.map(str::to_string),
            content: content.to_string(),
            category: category.to_string(),
            metadata,
            score: 0.0,
        });
        Ok(())
    }

    fn search_docs(&self, query: &str) -> MobiClawResult<Vec<KnowledgeDoc>> {
        let q = tokenize(query);
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let query_lower = query.to_lowercase();
        let docs = self.docs.lock().map_err(poisoned)?;

        let mut scored: Vec<KnowledgeDoc> = docs
            .iter()
            .filter_map(|d| {
                let mut haystack = tokenize(&d.content);
                if let Some(app) = &d.app {
                    haystack.extend(tokenize(app));
                }
                let overlap = q.intersection(&haystack).count() as f32 / q.len() as f32;
                let app_bonus = match &d.app {
                    Some(app) if query_lower.contains(&app.to_lowercase()) => 1.0,
                    _ => 0.0,
                };
                let score = overlap + app_bonus;
                (score > 0.0).then(|| KnowledgeDoc {
                    score,
                    ..d.clone()
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.config.top_k);
        tracing::debug!(query, hits = scored.len(), "knowledge search");
        Ok(scored)
    }

    fn add_trace(&self, screenshot: &Path, task: &str, action: &Action) -> MobiClawResult<()> {
        let trace = ExperienceTrace {
            task: normalize_task(task),
            screen_hash: dhash(screenshot)?,
            action: action.clone(),
            created_at: chrono::Utc::now(),
        };

        if let Some(path) = &self.config.traces_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "{}", serde_json::to_string(&trace)?)?;
        }
        self.traces.lock().map_err(poisoned)?.push(trace);
        Ok(())
    }

    fn match_trace(&self, screenshot: &Path, task: &str) -> MobiClawResult<Option<Action>> {
        let task = normalize_task(task);
        let traces = self.traces.lock().map_err(poisoned)?;
        if !traces.iter().any(|t| t.task == task) {
            return Ok(None);
        }
        let hash = dhash(screenshot)?;

        let best = traces
            .iter()
            .filter(|t| t.task == task)
            .map(|t| (hamming(t.screen_hash, hash), t))
            .filter(|(d, _)| *d <= self.config.max_hash_distance)
            .min_by_key(|(d, _)| *d);

        Ok(best.map(|(distance, t)| {
            tracing::info!(distance, action = %t.action.kind, "experience trace matched");
            t.action.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(dir: &Path, name: &str, dark_left: bool) -> PathBuf {
        let p = dir.join(name);
        image::GrayImage::from_fn(90, 160, |x, _| {
            let v = (x * 255 / 90) as u8;
            image::Luma([if dark_left { v } else { 255 - v }])
        })
        .save(&p)
        .unwrap();
        p
    }

    #[test]
    fn keyword_search_ranks_and_truncates() {
        let kb = LocalKnowledgeBase::new(LocalKnowledgeConfig {
            top_k: 2,
            ..Default::default()
        })
        .unwrap();
        kb.add_document(Some("Clock"), "Tap the alarm tab then the plus button", "manual", Map::new())
            .unwrap();
        kb.add_document(None, "Never share passwords", "constraint", Map::new()).unwrap();
        kb.add_document(None, "The plus button adds items", "general", Map::new()).unwrap();

        let hits = kb.search_docs("set an alarm in Clock").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, "manual");

        let hits = kb.search_docs("plus button alarm").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "doc_0");
        assert!(kb.search_docs("   ").unwrap().is_empty());
    }

    #[test]
    fn docs_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("docs.json");
        std::fs::write(&p, r#"[{"content": "Use the search bar", "category": "manual", "app": "Maps"}]"#).unwrap();
        let kb = LocalKnowledgeBase::new(LocalKnowledgeConfig {
            docs_path: Some(p),
            ..Default::default()
        })
        .unwrap();
        let hits = kb.search_docs("open maps").unwrap();
        assert_eq!(hits[0].id, "doc_0");
    }

    #[test]
    fn traces_match_on_task_and_similar_screen_only() {
        let dir = tempfile::tempdir().unwrap();
        let a = screen(dir.path(), "a.png", false);
        let b = screen(dir.path(), "b.png", true);
        let traces = dir.path().join("traces.jsonl");

        let kb = LocalKnowledgeBase::new(LocalKnowledgeConfig {
            traces_path: Some(traces.clone()),
            ..Default::default()
        })
        .unwrap();
        kb.add_trace(&a, "Open  Settings", &Action::tap(5, 6)).unwrap();

        let hit = kb.match_trace(&a, "open settings").unwrap().unwrap();
        assert_eq!(hit.param_i64("x"), Some(5));
        assert!(kb.match_trace(&b, "open settings").unwrap().is_none());
        assert!(kb.match_trace(&a, "open camera").unwrap().is_none());

        let reloaded = LocalKnowledgeBase::new(LocalKnowledgeConfig {
            traces_path: Some(traces),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(reloaded.trace_count(), 1);
    }
}
