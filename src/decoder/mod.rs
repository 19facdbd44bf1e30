/// Maps a language model's free-form reply onto a concrete [`Action`].
///
/// Expected reply shape (any surrounding prose is ignored):
/// `{"thought": "...", "name": "tap", "arguments": {...}}`
///
/// Failure classes:
/// - no JSON object, unknown element id, off-grid area, missing argument → `Wait`
/// - malformed JSON or values of the wrong shape → `Fail` carrying the error text
pub mod extract;

use serde_json::{Map, Value};

use crate::agent_engine::state::{Action, ActionType, Params};
use crate::errors::{MobiClawError, MobiClawResult};
use crate::perception::grid::{area_to_xy, Subarea, FALLBACK_COLS, FALLBACK_ROWS};
use crate::perception::types::{GridSpec, PerceptionMode, PerceptionResult, UIElement};

use extract::{first_json_object, fuzzy_get, strip_sentinels};

const NAME_KEYS: &[&str] = &["name", "action", "function", "tool"];
const ARG_KEYS: &[&str] = &["arguments", "args", "parameters", "params"];
const THOUGHT_KEYS: &[&str] = &["thought", "thoughts", "reasoning"];
const ELEMENT_KEYS: &[&str] = &["element_id", "id", "tag", "index"];

/// Everything the decoder needs from the current perception.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub mode: PerceptionMode,
    pub width: u32,
    pub height: u32,
    pub grid: Option<GridSpec>,
    pub elements: &'a [UIElement],
}

impl<'a> DecodeContext<'a> {
    pub fn from_perception(p: &'a PerceptionResult) -> Self {
        Self {
            mode: p.mode,
            width: p.meta.width,
            height: p.meta.height,
            grid: p.meta.grid,
            elements: &p.elements,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ActionDecoder;

impl ActionDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Never fails: every problem is folded into a `Wait` or `Fail` action.
    pub fn decode(&self, response: &str, ctx: &DecodeContext<'_>) -> Action {
        match self.try_decode(response, ctx) {
            Ok(action) => action.with_metadata("raw_response", response),
            Err(e) => {
                tracing::error!(error = %e, "action parse failed");
                Action::fail(e.to_string())
            }
        }
    }

    fn try_decode(&self, response: &str, ctx: &DecodeContext<'_>) -> MobiClawResult<Action> {
        let cleaned = strip_sentinels(response);
        let Some(json_str) = first_json_object(&cleaned) else {
            return Ok(Action::wait("JSON parse failed"));
        };

        let data: Value = serde_json::from_str(json_str)?;
        let data = data
            .as_object()
            .ok_or_else(|| MobiClawError::Decode("top-level JSON is not an object".into()))?;

        let name = match fuzzy_get(data, NAME_KEYS) {
            None => String::new(),
            Some(Value::String(s)) => s.to_lowercase(),
            Some(other) => {
                return Err(MobiClawError::Decode(format!("action name must be a string, got {other}")))
            }
        };
        let empty = Map::new();
        let args = match fuzzy_get(data, ARG_KEYS) {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(m)) => m,
            Some(other) => {
                return Err(MobiClawError::Decode(format!("arguments must be an object, got {other}")))
            }
        };
        let thought = match fuzzy_get(data, THOUGHT_KEYS) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let mut action = match name.as_str() {
            "tap" | "click" => self.decode_tap(args, ctx)?,
            "swipe" | "scroll" => Action {
                params: args.clone(),
                ..Action::new(ActionType::Swipe)
            },
            "type" | "input" => match args.get("text") {
                Some(text) if !text.is_null() => Action::new(ActionType::Text).with_param("text", text.clone()),
                _ => Action::wait("Missing 'text' for type action."),
            },
            "home" | "back" | "enter" | "del" => Action::key(&name),
            "clear" => Action::key("del"),
            "done" | "finish" | "complete" => Action::new(ActionType::Done),
            other => Action::wait(format!("Unknown action: {other}")),
        };

        if !thought.is_empty() {
            action.thought = Some(thought);
        }
        Ok(action)
    }

    fn decode_tap(&self, args: &Params, ctx: &DecodeContext<'_>) -> MobiClawResult<Action> {
        match ctx.mode {
            PerceptionMode::Grid => {
                let area = match args.get("area") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(as_i64(v, "area")?),
                };
                let subarea = Subarea::parse(args.get("subarea").and_then(Value::as_str).unwrap_or("center"));
                let (rows, cols) = ctx
                    .grid
                    .map(|g| (g.rows, g.cols))
                    .unwrap_or((FALLBACK_ROWS, FALLBACK_COLS));
                match area_to_xy(area, subarea, ctx.width, ctx.height, rows, cols) {
                    Some((x, y)) => Ok(Action::tap(x, y)),
                    None => Ok(Action::wait(format!(
                        "Area {} out of range (1-{}).",
                        area.unwrap_or_default(),
                        u64::from(rows) * u64::from(cols)
                    ))),
                }
            }
            PerceptionMode::SetOfMarks => Ok(self.resolve_element(args, ctx, false)),
            PerceptionMode::Composite if fuzzy_get(args, ELEMENT_KEYS).is_some() => {
                Ok(self.resolve_element(args, ctx, true))
            }
            PerceptionMode::Coordinate | PerceptionMode::Composite => {
                match (args.get("x"), args.get("y")) {
                    (Some(x), Some(y)) if !x.is_null() && !y.is_null() => {
                        Ok(Action::tap(as_i64(x, "x")?, as_i64(y, "y")?))
                    }
                    _ => Ok(Action::wait("Missing 'x'/'y' for tap action.")),
                }
            }
        }
    }

    /// Tag lookup by string equality. In composite mode a bare id also matches
    /// a namespaced `<child>:<id>` when exactly one element carries it.
    fn resolve_element(&self, args: &Params, ctx: &DecodeContext<'_>, namespaced: bool) -> Action {
        let Some(raw_id) = fuzzy_get(args, ELEMENT_KEYS).filter(|v| !v.is_null()) else {
            return Action::wait("Missing 'element_id' for SoM Tap action.");
        };
        let id = match raw_id {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        let mut target = ctx.elements.iter().find(|e| e.index == id);
        if target.is_none() && namespaced {
            let suffix = format!(":{id}");
            let mut hits = ctx.elements.iter().filter(|e| e.index.ends_with(&suffix));
            if let (Some(only), None) = (hits.next(), hits.next()) {
                target = Some(only);
            }
        }

        match target {
            Some(e) => {
                tracing::debug!(element = %id, x = e.center.0, y = e.center.1, "element mapped to coordinates");
                Action::tap(e.center.0, e.center.1)
            }
            None => Action::wait(format!("Element ID {id} not found in detection results.")),
        }
    }
}

fn as_i64(v: &Value, field: &str) -> MobiClawResult<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| MobiClawError::Decode(format!("'{field}' is not an integer: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.round() as i64)
            .map_err(|_| MobiClawError::Decode(format!("'{field}' is not a number: {s:?}"))),
        other => Err(MobiClawError::Decode(format!("'{field}' has unexpected type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::ElementType;

    fn ctx(mode: PerceptionMode) -> DecodeContext<'static> {
        DecodeContext {
            mode,
            width: 1000,
            height: 500,
            grid: Some(GridSpec {
                rows: 5,
                cols: 5,
                cell_width: 200,
                cell_height: 100,
            }),
            elements: &[],
        }
    }

    fn tag(index: &str, center: (i64, i64)) -> UIElement {
        UIElement {
            index: index.to_string(),
            text: "button".into(),
            node_type: ElementType::Button,
            center,
            bbox: [0.0; 4],
            confidence: 1.0,
        }
    }

    #[test]
    fn prose_wrapped_tap_is_decoded() {
        let resp = "I will tap now. {\"name\":\"Tap\",\"arguments\":{\"x\":10,\"y\":20}} Done.";
        let a = ActionDecoder::new().decode(resp, &ctx(PerceptionMode::Coordinate));
        assert_eq!(a.kind, ActionType::Tap);
        assert_eq!(a.param_i64("x"), Some(10));
        assert_eq!(a.param_i64("y"), Some(20));
        assert_eq!(a.raw_response(), Some(resp));
    }

    #[test]
    fn grid_area_maps_to_cell_centre() {
        let resp = r#"<|begin_of_box|>{"action": "click", "args": {"area": 25}}<|end_of_box|>"#;
        let a = ActionDecoder::new().decode(resp, &ctx(PerceptionMode::Grid));
        assert_eq!((a.param_i64("x"), a.param_i64("y")), (Some(900), Some(450)));
    }

    #[test]
    fn grid_without_metadata_uses_default_layout() {
        let mut c = ctx(PerceptionMode::Grid);
        c.grid = None;
        let a = ActionDecoder::new().decode(r#"{"name":"tap","arguments":{"area":"1","subarea":"top-left"}}"#, &c);
        // 10 rows x 5 cols on 1000x500: cell 200x50
        assert_eq!((a.param_i64("x"), a.param_i64("y")), (Some(50), Some(12)));
    }

    #[test]
    fn grid_areas_off_the_grid_wait_instead_of_tapping() {
        let d = ActionDecoder::new();
        let c = ctx(PerceptionMode::Grid);
        for resp in [
            r#"{"name":"tap","arguments":{"area":26}}"#,
            r#"{"name":"tap","arguments":{"area":-3}}"#,
            r#"{"name":"tap","arguments":{"area":1e30}}"#,
            r#"{"name":"tap","arguments":{"area":-9223372036854775808}}"#,
        ] {
            let a = d.decode(resp, &c);
            assert_eq!(a.kind, ActionType::Wait, "{resp}");
            assert!(a.thought.as_deref().unwrap_or_default().contains("out of range"), "{resp}");
        }
    }

    #[test]
    fn som_ids_resolve_or_wait() {
        let elements = vec![tag("1", (10, 10)), tag("2", (300, 40))];
        let c = DecodeContext {
            elements: &elements,
            ..ctx(PerceptionMode::SetOfMarks)
        };
        let hit = ActionDecoder::new().decode(r#"{"name":"tap","arguments":{"element_id":2}}"#, &c);
        assert_eq!((hit.param_i64("x"), hit.param_i64("y")), (Some(300), Some(40)));

        let miss = ActionDecoder::new().decode(r#"{"name":"tap","arguments":{"element_id":99}}"#, &c);
        assert_eq!(miss.kind, ActionType::Wait);
        assert!(miss.thought.unwrap().contains("99"));
    }

    #[test]
    fn composite_prefers_element_id_and_accepts_bare_suffix() {
        let elements = vec![tag("som:1", (10, 10)), tag("ui:3", (70, 80))];
        let c = DecodeContext {
            elements: &elements,
            ..ctx(PerceptionMode::Composite)
        };
        let a = ActionDecoder::new().decode(r#"{"name":"tap","arguments":{"id":"3"}}"#, &c);
        assert_eq!((a.param_i64("x"), a.param_i64("y")), (Some(70), Some(80)));

        let b = ActionDecoder::new().decode(r#"{"name":"tap","arguments":{"x":5,"y":6}}"#, &c);
        assert_eq!((b.param_i64("x"), b.param_i64("y")), (Some(5), Some(6)));
    }

    #[test]
    fn no_json_is_wait_and_malformed_is_fail() {
        let d = ActionDecoder::new();
        let wait = d.decode("I am not sure what to do", &ctx(PerceptionMode::Coordinate));
        assert_eq!(wait.kind, ActionType::Wait);
        assert_eq!(wait.thought.as_deref(), Some("JSON parse failed"));
        assert!(wait.raw_response().is_some());

        let fail = d.decode("{\"name\": \"tap\", ", &ctx(PerceptionMode::Coordinate));
        assert_eq!(fail.kind, ActionType::Fail);

        let shape = d.decode(r#"{"name":"tap","arguments":[1,2]}"#, &ctx(PerceptionMode::Coordinate));
        assert_eq!(shape.kind, ActionType::Fail);
    }

    #[test]
    fn keys_and_terminal_actions() {
        let d = ActionDecoder::new();
        let c = ctx(PerceptionMode::Coordinate);
        let clear = d.decode(r#"{"name":"clear"}"#, &c);
        assert_eq!((clear.kind, clear.param_str("code")), (ActionType::Key, Some("del")));
        assert_eq!(d.decode(r#"{"function":"BACK"}"#, &c).param_str("code"), Some("back"));
        assert_eq!(d.decode(r#"{"tool":"finish"}"#, &c).kind, ActionType::Done);

        let typed = d.decode(r#"{"name":"type","params":{"text":"hello"}}"#, &c);
        assert_eq!((typed.kind, typed.param_str("text")), (ActionType::Text, Some("hello")));

        let swipe = d.decode(r#"{"name":"scroll","arguments":{"direction":"up","distance":"long"}}"#, &c);
        assert_eq!(swipe.kind, ActionType::Swipe);
        assert_eq!(swipe.param_str("distance"), Some("long"));
    }

    #[test]
    fn unknown_action_waits_and_thought_overrides_when_present() {
        let d = ActionDecoder::new();
        let c = ctx(PerceptionMode::Coordinate);
        let bare = d.decode(r#"{"name":"fly"}"#, &c);
        assert_eq!(bare.kind, ActionType::Wait);
        assert_eq!(bare.thought.as_deref(), Some("Unknown action: fly"));

        let explained = d.decode(r#"{"Thought":"screen loading","name":"fly"}"#, &c);
        assert_eq!(explained.thought.as_deref(), Some("screen loading"));
    }
}
