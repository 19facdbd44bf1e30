use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::planner::PlanResult;

const PLAN_MARKER: &str = "### Plan ###";

/// How a planner's raw reply is turned into a [`PlanResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanParser {
    /// Free text with a `### Plan ###` section.
    Section,
    /// JSON (optionally in a ```json fence) naming the target app.
    AppJson,
}

impl PlanParser {
    pub fn parse(&self, response: &str, task: &str) -> PlanResult {
        match self {
            PlanParser::Section => parse_section(response),
            PlanParser::AppJson => parse_app_json(response, task),
        }
    }
}

/// Everything after the last `### Plan ###`, flattened onto one line.
/// Without the marker the whole reply is the plan.
pub fn parse_section(response: &str) -> PlanResult {
    match response.rsplit_once(PLAN_MARKER) {
        Some((_, plan)) => PlanResult::new(plan.split_whitespace().collect::<Vec<_>>().join(" ")),
        None => {
            tracing::warn!("planner reply has no '{PLAN_MARKER}' section");
            PlanResult::new(response.trim())
        }
    }
}

fn json_fence() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").ok())
        .as_ref()
}

/// App-routing reply: `app_name`, `package_name` and `final_task_description`.
/// Unparseable replies fall back to the task itself with `error` set.
pub fn parse_app_json(response: &str, task: &str) -> PlanResult {
    let json_str = json_fence()
        .and_then(|re| re.captures(response))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| response.trim());

    let data: Map<String, Value> = match serde_json::from_str(json_str) {
        Ok(Value::Object(m)) => m,
        Ok(_) | Err(_) => {
            tracing::error!(raw = %json_str.chars().take(100).collect::<String>(), "planner JSON parse failed");
            let mut out = PlanResult::new(task);
            out.data.insert("error".into(), "json_parse_error".into());
            return out;
        }
    };

    let plan = data
        .get("final_task_description")
        .and_then(Value::as_str)
        .unwrap_or(task)
        .to_string();
    let mut out = PlanResult::new(plan);
    for key in ["app_name", "package_name"] {
        out.data
            .insert(key.to_string(), data.get(key).cloned().unwrap_or(Value::Null));
    }
    out.data.insert("raw_json".into(), Value::Object(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_takes_text_after_last_marker() {
        let r = parse_section("### Thought ###\nthink\n### Plan ###\n1. Open Clock\n2.  Tap Alarm\n");
        assert_eq!(r.plan, "1. Open Clock 2. Tap Alarm");
        assert_eq!(parse_section("  just do it ").plan, "just do it");
    }

    #[test]
    fn fenced_json_is_extracted() {
        let reply = "Here:\n```json\n{\"app_name\": \"Clock\", \"package_name\": \"com.android.deskclock\", \"final_task_description\": \"Set alarm 7am\"}\n```";
        let r = parse_app_json(reply, "wake me at 7");
        assert_eq!(r.plan, "Set alarm 7am");
        assert_eq!(r.data["app_name"], "Clock");
        assert_eq!(r.data["raw_json"]["package_name"], "com.android.deskclock");
    }

    #[test]
    fn bad_json_falls_back_to_task() {
        let r = parse_app_json("I think Clock", "wake me at 7");
        assert_eq!(r.plan, "wake me at 7");
        assert_eq!(r.data["error"], "json_parse_error");
    }
}
