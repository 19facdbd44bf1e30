use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fallback screen size when neither the image nor the caller can tell us.
pub const DEFAULT_WIDTH: u32 = 1080;
pub const DEFAULT_HEIGHT: u32 = 2340;

/// How a screenshot is turned into targets the model can refer to.
/// Shared by the adapters, the reasoning prompts and the action decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionMode {
    /// Elements carry literal pixel centres; the model answers with `x`/`y`.
    Coordinate,
    /// Numbered grid overlay; the model answers with `area`/`subarea`.
    Grid,
    /// Numbered boxes around detected elements; the model answers with `element_id`.
    SetOfMarks,
    /// Several adapters merged for one prompt.
    Composite,
}

impl PerceptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerceptionMode::Coordinate => "coordinate",
            PerceptionMode::Grid => "grid",
            PerceptionMode::SetOfMarks => "set_of_marks",
            PerceptionMode::Composite => "composite",
        }
    }
}

impl fmt::Display for PerceptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    Input,
    Text,
    Icon,
    Image,
    Unknown,
}

impl ElementType {
    /// Map a free-form detector label ("input box", "icon", ...) onto a type.
    pub fn from_label(label: &str) -> Self {
        let l = label.to_lowercase();
        if l.contains("button") || l.contains("btn") {
            ElementType::Button
        } else if l.contains("input") || l.contains("edit") || l.contains("field") {
            ElementType::Input
        } else if l.contains("icon") {
            ElementType::Icon
        } else if l.contains("image") || l.contains("img") {
            ElementType::Image
        } else if l.contains("text") {
            ElementType::Text
        } else {
            ElementType::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIElement {
    /// Identifier the model refers back to. Unique within one result.
    pub index: String,
    pub text: String,
    pub node_type: ElementType,
    /// Centre in pixel coordinates of the source screenshot.
    pub center: (i64, i64),
    /// Normalized bounding box [xmin, ymin, xmax, ymax] in range 0.0–1.0
    pub bbox: [f32; 4],
    #[serde(default)]
    pub confidence: f32,
}

impl UIElement {
    /// Pixel-space box for the given image size.
    pub fn bbox_pixels(&self, width: u32, height: u32) -> [i32; 4] {
        [
            (self.bbox[0] * width as f32).round() as i32,
            (self.bbox[1] * height as f32).round() as i32,
            (self.bbox[2] * width as f32).round() as i32,
            (self.bbox[3] * height as f32).round() as i32,
        ]
    }
}

/// Row/column partition of a grid overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceptionMeta {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSpec>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionResult {
    pub mode: PerceptionMode,
    pub screenshot_path: PathBuf,
    pub elements: Vec<UIElement>,
    pub meta: PerceptionMeta,
    /// Text summary of the screen handed to the model.
    pub prompt: String,
    /// Annotated images (grid overlay, marks) to attach instead of the raw screenshot.
    pub annotated_images: Vec<PathBuf>,
}

impl PerceptionResult {
    pub fn empty(mode: PerceptionMode, screenshot_path: PathBuf, width: u32, height: u32) -> Self {
        Self {
            mode,
            screenshot_path,
            elements: Vec::new(),
            meta: PerceptionMeta {
                width,
                height,
                ..Default::default()
            },
            prompt: "No elements detected.".to_string(),
            annotated_images: Vec::new(),
        }
    }
}
