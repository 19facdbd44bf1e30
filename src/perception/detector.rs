/// Clients for the external element-detection services.
///
/// Two wire shapes are supported:
/// - UI parser (`UiParserClient`): responds with `{"code": 200, "data": {"text_result": ...}}`
///   where `text_result` holds one dict literal per line with a normalized `bbox`.
/// - Box detector (`BoxDetectorClient`): responds with `{"detections": [...]}` carrying
///   pixel-space `box` coordinates, a `label` and a `score`.
///
/// Both normalise to [`Detection`] so adapters never see the wire format.
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{MobiClawError, MobiClawResult};

/// One detected region, bbox normalized to [0,1] as [x1, y1, x2, y2].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub label: String,
    /// Free-form type hint reported by the service ("text", "icon", ...).
    pub kind: String,
    pub score: f32,
}

impl Detection {
    pub fn pixel_box(&self, width: u32, height: u32) -> [i64; 4] {
        [
            (self.bbox[0] * width as f32) as i64,
            (self.bbox[1] * height as f32) as i64,
            (self.bbox[2] * width as f32) as i64,
            (self.bbox[3] * height as f32) as i64,
        ]
    }

    pub fn pixel_center(&self, width: u32, height: u32) -> (i64, i64) {
        (
            (((self.bbox[0] + self.bbox[2]) / 2.0) * width as f32) as i64,
            (((self.bbox[1] + self.bbox[3]) / 2.0) * height as f32) as i64,
        )
    }
}

/// Seam between perception adapters and whatever finds elements on screen.
pub trait ElementDetector: Send + Sync {
    fn detect(&self, screenshot: &Path, width: u32, height: u32) -> MobiClawResult<Vec<Detection>>;
}

fn http_client(timeout_secs: u64) -> MobiClawResult<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ── UI parser service ───────────────────────────────────────────────────────

pub struct UiParserClient {
    url: String,
    box_threshold: f32,
    iou_threshold: f32,
    use_ocr: bool,
    client: reqwest::blocking::Client,
}

impl UiParserClient {
    pub fn new(
        url: impl Into<String>,
        box_threshold: f32,
        iou_threshold: f32,
        use_ocr: bool,
        timeout_secs: u64,
    ) -> MobiClawResult<Self> {
        Ok(Self {
            url: url.into(),
            box_threshold,
            iou_threshold,
            use_ocr,
            client: http_client(timeout_secs)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UiParserResponse {
    code: Option<i64>,
    #[serde(default)]
    data: Option<UiParserData>,
}

#[derive(Debug, Deserialize)]
struct UiParserData {
    #[serde(default)]
    text_result: String,
}

impl ElementDetector for UiParserClient {
    fn detect(&self, screenshot: &Path, width: u32, height: u32) -> MobiClawResult<Vec<Detection>> {
        let form = reqwest::blocking::multipart::Form::new()
            .text("box_threshold", self.box_threshold.to_string())
            .text("iou_threshold", self.iou_threshold.to_string())
            .text("use_paddleocr", self.use_ocr.to_string())
            .text("imgsz", format!("({width}, {height})"))
            .file("image", screenshot)?;

        let resp: UiParserResponse = self.client.post(&self.url).multipart(form).send()?.json()?;
        match (resp.code, resp.data) {
            (Some(200), Some(data)) => Ok(parse_text_result(&data.text_result)),
            (code, _) => Err(MobiClawError::Perception(format!(
                "UI parser returned code {code:?}"
            ))),
        }
    }
}

/// Parse the UI parser's `text_result`: one `{...}` dict literal per line.
/// Lines that do not parse are skipped with a warning.
pub fn parse_text_result(text: &str) -> Vec<Detection> {
    let mut out = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (Some(start), Some(end)) = (line.find('{'), line.rfind('}')) else {
            continue;
        };
        if end < start {
            continue;
        }
        let json = py_literal_to_json(&line[start..=end]);
        let item: Value = match serde_json::from_str(&json) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(line, error = %e, "skipping unparsable UI parser line");
                continue;
            }
        };
        let Some(bbox) = read_box(item.get("bbox")) else {
            continue;
        };
        out.push(Detection {
            bbox,
            label: item
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            kind: item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("icon")
                .to_string(),
            score: item.get("score").and_then(Value::as_f64).unwrap_or(1.0) as f32,
        });
    }
    out
}

fn read_box(v: Option<&Value>) -> Option<[f32; 4]> {
    let arr = v?.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    let mut b = [0f32; 4];
    for (slot, n) in b.iter_mut().zip(arr) {
        *slot = n.as_f64()? as f32;
    }
    Some(b)
}

/// Rewrite a Python dict literal into JSON: single-quoted strings become
/// double-quoted, `True`/`False`/`None` become `true`/`false`/`null`, and
/// tuples become arrays.
pub fn py_literal_to_json(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut bare = String::new();

    let flush_bare = |bare: &mut String, out: &mut String| {
        match bare.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            other => out.push_str(other),
        }
        bare.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                flush_bare(&mut bare, &mut out);
                let quote = c;
                out.push('"');
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            if let Some(esc) = chars.next() {
                                if esc == '\'' {
                                    out.push('\'');
                                } else {
                                    out.push('\\');
                                    out.push(esc);
                                }
                            }
                        }
                        '"' if quote == '\'' => out.push_str("\\\""),
                        s if s == quote => break,
                        s => out.push(s),
                    }
                }
                out.push('"');
            }
            '(' => {
                flush_bare(&mut bare, &mut out);
                out.push('[');
            }
            ')' => {
                flush_bare(&mut bare, &mut out);
                out.push(']');
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' => bare.push(c),
            c => {
                flush_bare(&mut bare, &mut out);
                out.push(c);
            }
        }
    }
    flush_bare(&mut bare, &mut out);
    out
}

// ── Box detector service ────────────────────────────────────────────────────

pub struct BoxDetectorClient {
    url: String,
    prompt: String,
    box_threshold: f32,
    text_threshold: f32,
    client: reqwest::blocking::Client,
}

impl BoxDetectorClient {
    pub fn new(
        url: impl Into<String>,
        prompt: impl Into<String>,
        box_threshold: f32,
        text_threshold: f32,
        timeout_secs: u64,
    ) -> MobiClawResult<Self> {
        Ok(Self {
            url: url.into(),
            prompt: prompt.into(),
            box_threshold,
            text_threshold,
            client: http_client(timeout_secs)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BoxDetectorResponse {
    #[serde(default)]
    detections: Vec<PixelDetection>,
}

#[derive(Debug, Deserialize)]
struct PixelDetection {
    #[serde(rename = "box")]
    bbox: [f32; 4],
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    score: f32,
}

impl ElementDetector for BoxDetectorClient {
    fn detect(&self, screenshot: &Path, width: u32, height: u32) -> MobiClawResult<Vec<Detection>> {
        let form = reqwest::blocking::multipart::Form::new()
            .text("prompt", self.prompt.clone())
            .text("box_threshold", self.box_threshold.to_string())
            .text("text_threshold", self.text_threshold.to_string())
            .file("image", screenshot)?;

        let resp: BoxDetectorResponse = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(normalize_pixel_detections(resp.detections, width, height))
    }
}

fn normalize_pixel_detections(raw: Vec<PixelDetection>, width: u32, height: u32) -> Vec<Detection> {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    raw.into_iter()
        .map(|d| {
            let label = d.label.unwrap_or_else(|| "ui_element".to_string());
            Detection {
                bbox: [d.bbox[0] / w, d.bbox[1] / h, d.bbox[2] / w, d.bbox[3] / h],
                kind: label.clone(),
                label,
                score: d.score,
            }
        })
        .collect()
}
