use std::path::Path;

use crate::errors::MobiClawResult;
use crate::perception::annotator::annotate_marks;
use crate::perception::detector::ElementDetector;
use crate::perception::screenshot::{probe_dimensions, resolve_dimensions, sibling_path};
use crate::perception::traits::Perception;
use crate::perception::types::{ElementType, PerceptionMode, PerceptionResult, UIElement};

const MAX_PROMPT_TAGS: usize = 60;
/// Boxes narrower or shorter than this many pixels are discarded.
const MIN_BOX_PX: i64 = 10;

/// Set-of-marks perception: numbered boxes drawn over detected elements.
pub struct SetOfMarksPerception {
    name: String,
    detector: Box<dyn ElementDetector>,
}

impl SetOfMarksPerception {
    pub fn new(name: impl Into<String>, detector: Box<dyn ElementDetector>) -> Self {
        Self {
            name: name.into(),
            detector,
        }
    }
}

pub fn build_som_prompt(elements: &[UIElement]) -> String {
    let mut prompt = String::from(
        "--- Set-of-Marks (SoM) detected elements ---\nRefer to UI elements by their Tag ID (numbered box).\n",
    );
    for e in elements.iter().take(MAX_PROMPT_TAGS) {
        prompt.push_str(&format!("Tag ID: {} | Type: {}\n", e.index, e.text));
    }
    prompt.push_str("\nHint: Use 'element_id' in your action JSON.\n");
    prompt
}

impl Perception for SetOfMarksPerception {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> PerceptionMode {
        PerceptionMode::SetOfMarks
    }

    fn perceive(
        &self,
        screenshot: &Path,
        width_hint: u32,
        height_hint: u32,
    ) -> MobiClawResult<Option<PerceptionResult>> {
        let (width, height) = resolve_dimensions(screenshot, width_hint, height_hint);
        let mut result = PerceptionResult::empty(
            PerceptionMode::SetOfMarks,
            screenshot.to_path_buf(),
            width,
            height,
        );
        result.annotated_images = vec![screenshot.to_path_buf()];

        // Nothing to mark on an unreadable image.
        if probe_dimensions(screenshot).is_none() {
            return Ok(Some(result));
        }

        let detections = self.detector.detect(screenshot, width, height).unwrap_or_else(|e| {
            tracing::error!(adapter = %self.name, error = %e, "detector failed, continuing without marks");
            Vec::new()
        });

        let elements: Vec<UIElement> = detections
            .iter()
            .filter(|d| {
                let [x1, y1, x2, y2] = d.pixel_box(width, height);
                x2 - x1 >= MIN_BOX_PX && y2 - y1 >= MIN_BOX_PX
            })
            .enumerate()
            .map(|(i, d)| UIElement {
                index: (i + 1).to_string(),
                text: d.label.clone(),
                node_type: ElementType::from_label(&d.kind),
                center: d.pixel_center(width, height),
                bbox: d.bbox,
                confidence: d.score,
            })
            .collect();

        let marked = sibling_path(screenshot, "som");
        match annotate_marks(screenshot, &marked, &elements) {
            Ok(()) => {
                tracing::debug!(path = %marked.display(), "SoM image saved");
                result.annotated_images = vec![marked];
            }
            Err(e) => tracing::error!(error = %e, "failed to save SoM image"),
        }

        tracing::info!(adapter = %self.name, tags = elements.len(), "set-of-marks ready");
        result.prompt = build_som_prompt(&elements);
        result.elements = elements;
        Ok(Some(result))
    }
}
