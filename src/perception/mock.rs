use std::path::Path;

use crate::errors::MobiClawResult;
use crate::perception::traits::Perception;
use crate::perception::types::{ElementType, PerceptionMode, PerceptionResult, UIElement};
use crate::perception::coordinate::build_coordinate_prompt;

/// Fixed launcher-like element list for dry runs against the mock device.
pub struct MockPerception {
    name: String,
}

impl MockPerception {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Perception for MockPerception {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> PerceptionMode {
        PerceptionMode::Coordinate
    }

    fn perceive(
        &self,
        screenshot: &Path,
        _width_hint: u32,
        _height_hint: u32,
    ) -> MobiClawResult<Option<PerceptionResult>> {
        let (width, height) = (1080, 2340);
        let elements: Vec<UIElement> = [
            ("Messages", ElementType::Icon, [0.1, 0.1, 0.2, 0.2]),
            ("Contacts", ElementType::Icon, [0.4, 0.1, 0.5, 0.2]),
            ("Discover", ElementType::Icon, [0.8, 0.1, 0.9, 0.2]),
            ("Search", ElementType::Input, [0.2, 0.05, 0.8, 0.1]),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (text, node_type, bbox))| UIElement {
            index: i.to_string(),
            text: text.to_string(),
            node_type,
            center: (
                (((bbox[0] + bbox[2]) / 2.0) * width as f32) as i64,
                (((bbox[1] + bbox[3]) / 2.0) * height as f32) as i64,
            ),
            bbox,
            confidence: 1.0,
        })
        .collect();

        let mut result = PerceptionResult::empty(
            PerceptionMode::Coordinate,
            screenshot.to_path_buf(),
            width,
            height,
        );
        result.prompt = build_coordinate_prompt(&elements);
        result.elements = elements;
        Ok(Some(result))
    }
}
