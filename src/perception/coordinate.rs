use std::path::Path;

use crate::errors::MobiClawResult;
use crate::perception::detector::ElementDetector;
use crate::perception::screenshot::resolve_dimensions;
use crate::perception::traits::Perception;
use crate::perception::types::{ElementType, PerceptionMode, PerceptionResult, UIElement};

const MAX_PROMPT_ELEMENTS: usize = 50;

/// Literal-coordinate perception backed by the UI parser service.
///
/// Element indices are 0-based in detection order and centres are pixel
/// positions on the source screenshot, so the model can answer with `x`/`y`.
pub struct CoordinatePerception {
    name: String,
    detector: Box<dyn ElementDetector>,
}

impl CoordinatePerception {
    pub fn new(name: impl Into<String>, detector: Box<dyn ElementDetector>) -> Self {
        Self {
            name: name.into(),
            detector,
        }
    }
}

pub fn build_coordinate_prompt(elements: &[UIElement]) -> String {
    let mut prompt = String::from("--- Detected UI Elements ---\nFormat: ID | Text | Center Coordinates\n");
    for e in elements.iter().take(MAX_PROMPT_ELEMENTS) {
        prompt.push_str(&format!(
            "ID: {} | Text: {} | Center: [{}, {}]\n",
            e.index, e.text, e.center.0, e.center.1
        ));
    }
    prompt
}

impl Perception for CoordinatePerception {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> PerceptionMode {
        PerceptionMode::Coordinate
    }

    fn perceive(
        &self,
        screenshot: &Path,
        width_hint: u32,
        height_hint: u32,
    ) -> MobiClawResult<Option<PerceptionResult>> {
        let (width, height) = resolve_dimensions(screenshot, width_hint, height_hint);
        let mut empty = PerceptionResult::empty(
            PerceptionMode::Coordinate,
            screenshot.to_path_buf(),
            width,
            height,
        );

        let detections = match self.detector.detect(screenshot, width, height) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(adapter = %self.name, error = %e, "UI parser unavailable");
                return Ok(Some(empty));
            }
        };

        let elements: Vec<UIElement> = detections
            .iter()
            .enumerate()
            .map(|(i, d)| UIElement {
                index: i.to_string(),
                text: d.label.clone(),
                node_type: ElementType::from_label(&d.kind),
                center: d.pixel_center(width, height),
                bbox: d.bbox,
                confidence: d.score,
            })
            .collect();

        tracing::info!(adapter = %self.name, count = elements.len(), "UI elements parsed");

        empty.prompt = build_coordinate_prompt(&elements);
        empty.elements = elements;
        empty.annotated_images = vec![screenshot.to_path_buf()];
        Ok(Some(empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MobiClawError;
    use crate::perception::detector::Detection;

    struct FixedDetector(Vec<Detection>);

    impl ElementDetector for FixedDetector {
        fn detect(&self, _: &Path, _: u32, _: u32) -> MobiClawResult<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct DownDetector;

    impl ElementDetector for DownDetector {
        fn detect(&self, _: &Path, _: u32, _: u32) -> MobiClawResult<Vec<Detection>> {
            Err(MobiClawError::Perception("connection refused".into()))
        }
    }

    fn det(label: &str, bbox: [f32; 4]) -> Detection {
        Detection {
            bbox,
            label: label.to_string(),
            kind: "text".to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn centres_are_pixel_coordinates() {
        let p = CoordinatePerception::new(
            "ui_parser",
            Box::new(FixedDetector(vec![
                det("Settings", [0.0, 0.0, 0.5, 0.5]),
                det("OK", [0.5, 0.5, 1.0, 1.0]),
            ])),
        );
        let r = p.perceive(Path::new("/missing.png"), 1000, 2000).unwrap().unwrap();
        assert_eq!(r.elements.len(), 2);
        assert_eq!(r.elements[0].index, "0");
        assert_eq!(r.elements[1].center, (750, 1500));
        assert!(r.prompt.contains("ID: 1 | Text: OK | Center: [750, 1500]"));
    }

    #[test]
    fn prompt_is_capped() {
        let many: Vec<Detection> = (0..80).map(|i| det(&format!("e{i}"), [0.0, 0.0, 0.1, 0.1])).collect();
        let p = CoordinatePerception::new("ui_parser", Box::new(FixedDetector(many)));
        let r = p.perceive(Path::new("/missing.png"), 100, 100).unwrap().unwrap();
        assert_eq!(r.elements.len(), 80);
        assert_eq!(r.prompt.matches("ID: ").count(), MAX_PROMPT_ELEMENTS);
    }

    #[test]
    fn service_error_yields_empty_result() {
        let p = CoordinatePerception::new("ui_parser", Box::new(DownDetector));
        let r = p.perceive(Path::new("/missing.png"), 0, 0).unwrap().unwrap();
        assert!(r.elements.is_empty());
        assert_eq!((r.meta.width, r.meta.height), (1080, 2340));
    }
}
