use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::{StepRecord, TaskOutcome};
use crate::errors::MobiClawResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Task { ts: i64, task_id: String, task: String },
    Step(StepRecord),
    Finished { ts: i64, outcome: TaskOutcome },
}

/// Append-only JSONL trajectory of one task run.
pub struct SessionHistory {
    pub task_id: String,
    entries: Vec<HistoryEntry>,
    file_path: PathBuf,
}

impl SessionHistory {
    /// Writes to `<dir>/session_<task_id>.jsonl`; without `dir` the per-user
    /// data directory is used.
    pub fn new(task_id: &str, dir: Option<&Path>) -> Self {
        let dir = match dir {
            Some(d) => d.to_path_buf(),
            None => data_dir_or_cwd(),
        };
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create session directory");
        }
        Self {
            task_id: task_id.to_string(),
            entries: Vec::new(),
            file_path: dir.join(format!("session_{task_id}.jsonl")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record an entry and append it to the file. Write failures are logged,
    /// the in-memory copy is kept either way.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.file_path.display(), error = %e, "history flush failed");
        }
    }

    /// Append the latest entry to the JSONL file.
    pub fn flush(&self) -> MobiClawResult<()> {
        if let Some(last) = self.entries.last() {
            let line = serde_json::to_string(last)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?;
            writeln!(file, "{}", line)?;
            tracing::debug!(path = %self.file_path.display(), "history entry flushed");
        }
        Ok(())
    }
}

/// `<data dir>/mobiclaw/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("mobiclaw").join("sessions"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::Action;

    #[test]
    fn entries_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SessionHistory::new("42", Some(dir.path()));
        history.record(HistoryEntry::Task {
            ts: 0,
            task_id: "42".into(),
            task: "open clock".into(),
        });
        history.record(HistoryEntry::Step(StepRecord {
            step: 1,
            screenshot_path: "s.png".into(),
            action: Action::tap(3, 4),
            timestamp: chrono::Utc::now(),
        }));
        history.record(HistoryEntry::Finished {
            ts: 1,
            outcome: TaskOutcome::Done,
        });

        let raw = std::fs::read_to_string(dir.path().join("session_42.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["kind"], "step");
        assert_eq!(lines[1]["action"]["type"], "tap");
        assert_eq!(lines[2]["outcome"]["outcome"], "done");
    }
}
