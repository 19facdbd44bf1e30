/// Draw numbered set-of-marks boxes on a screenshot.
///
/// Each element gets a colour-coded rectangle and its tag number drawn just
/// above the top-left corner (inside the box when there is no room above).
use std::path::Path;

use crate::errors::{MobiClawError, MobiClawResult};
use crate::perception::glyphs::{draw_label, draw_rect};
use crate::perception::types::{ElementType, UIElement};

fn element_colour(et: ElementType) -> [u8; 4] {
    match et {
        ElementType::Button => [255, 68, 68, 220],
        ElementType::Input => [68, 200, 68, 220],
        ElementType::Icon => [255, 170, 0, 220],
        ElementType::Text => [120, 120, 255, 220],
        ElementType::Image => [255, 68, 255, 220],
        ElementType::Unknown => [0, 200, 220, 220],
    }
}

/// Annotate the image at `src` and write the PNG to `out`.
///
/// Labels are drawn at 3× on screens wider than 1000 px so they stay legible
/// after the model-side downscale.
pub fn annotate_marks(src: &Path, out: &Path, elements: &[UIElement]) -> MobiClawResult<()> {
    let img = image::open(src)
        .map_err(|e| MobiClawError::Perception(format!("annotate load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();

    let label_scale: u32 = if w > 1000 { 3 } else { 2 };
    let box_thickness: i32 = if w > 1000 { 4 } else { 2 };
    let label_h = 5 * label_scale + 4;

    for elem in elements {
        let [x1, y1, x2, y2] = elem.bbox_pixels(w, h);
        let col = element_colour(elem.node_type);
        draw_rect(&mut canvas, x1, y1, x2, y2, col, box_thickness);

        let lx = x1.max(0) as u32;
        let ly = if y1 >= label_h as i32 {
            (y1 - label_h as i32) as u32
        } else {
            y1.max(0) as u32 + box_thickness as u32
        };
        draw_label(
            &mut canvas,
            &elem.index,
            lx,
            ly,
            label_scale,
            [255, 255, 255],
            col,
        );
    }

    image::DynamicImage::ImageRgba8(canvas)
        .save_with_format(out, image::ImageFormat::Png)
        .map_err(|e| MobiClawError::Perception(format!("PNG encode: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(index: &str, bbox: [f32; 4]) -> UIElement {
        UIElement {
            index: index.to_string(),
            text: String::new(),
            node_type: ElementType::Button,
            center: (0, 0),
            bbox,
            confidence: 0.9,
        }
    }

    #[test]
    fn marks_change_pixels_inside_box_edges() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("shot.png");
        let out = dir.path().join("shot_som.png");
        image::RgbImage::from_pixel(200, 200, image::Rgb([255, 255, 255]))
            .save(&src)
            .unwrap();

        annotate_marks(&src, &out, &[element("1", [0.25, 0.25, 0.75, 0.75])]).unwrap();

        let marked = image::open(&out).unwrap().to_rgb8();
        assert_ne!(marked.get_pixel(100, 50).0, [255, 255, 255]);
        assert_eq!(marked.get_pixel(100, 100).0, [255, 255, 255]);
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = annotate_marks(&dir.path().join("nope.png"), &dir.path().join("o.png"), &[]);
        assert!(err.is_err());
    }
}
