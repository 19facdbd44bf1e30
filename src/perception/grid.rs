/// Numbered grid overlay perception.
///
/// The screenshot is partitioned into cells whose pixel size divides the
/// image dimension evenly (first divisor in 120–180 px, else 120 px). Each
/// cell carries a row-major 1-based numeric label drawn inside its top-left
/// corner, and the model answers with `{"area": n, "subarea": "..."}`.
use std::path::Path;

use crate::errors::{MobiClawError, MobiClawResult};
use crate::perception::glyphs::{draw_label, draw_rect};
use crate::perception::screenshot::{resolve_dimensions, sibling_path};
use crate::perception::traits::Perception;
use crate::perception::types::{GridSpec, PerceptionMeta, PerceptionMode, PerceptionResult};

pub const MIN_CELL_PX: u32 = 120;
pub const MAX_CELL_PX: u32 = 180;

/// Cell counts used by the decoder when the perception metadata has no grid.
pub const FALLBACK_ROWS: u32 = 10;
pub const FALLBACK_COLS: u32 = 5;

const LINE_COLOUR: [u8; 4] = [113, 116, 255, 200];

/// First divisor of `n` inside the nice range, or [`MIN_CELL_PX`] when none exists
/// (prime dimensions, or anything below 120 px).
pub fn nice_cell_len(n: u32) -> u32 {
    (MIN_CELL_PX..=MAX_CELL_PX.min(n))
        .find(|i| n % i == 0)
        .unwrap_or(MIN_CELL_PX)
}

impl GridSpec {
    pub fn for_image(width: u32, height: u32) -> Self {
        let cell_width = nice_cell_len(width);
        let cell_height = nice_cell_len(height);
        Self {
            rows: height / cell_height,
            cols: width / cell_width,
            cell_width,
            cell_height,
        }
    }

    pub fn cell_count(&self) -> u32 {
        self.rows * self.cols
    }
}

/// Point inside a grid cell the model can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subarea {
    Center,
    TopLeft,
    Top,
    TopRight,
    Left,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Subarea {
    /// Unrecognised names resolve to the centre.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "top-left" => Subarea::TopLeft,
            "top" => Subarea::Top,
            "top-right" => Subarea::TopRight,
            "left" => Subarea::Left,
            "right" => Subarea::Right,
            "bottom-left" => Subarea::BottomLeft,
            "bottom" => Subarea::Bottom,
            "bottom-right" => Subarea::BottomRight,
            _ => Subarea::Center,
        }
    }

    /// Offset in quarters of the cell (1 = ¼, 2 = ½, 3 = ¾) along x and y.
    fn quarters(&self) -> (i64, i64) {
        match self {
            Subarea::TopLeft => (1, 1),
            Subarea::Top => (2, 1),
            Subarea::TopRight => (3, 1),
            Subarea::Left => (1, 2),
            Subarea::Center => (2, 2),
            Subarea::Right => (3, 2),
            Subarea::BottomLeft => (1, 3),
            Subarea::Bottom => (2, 3),
            Subarea::BottomRight => (3, 3),
        }
    }
}

/// Resolve a 1-based grid `area` plus `subarea` to a pixel.
///
/// Cell size is `width / cols` × `height / rows`. A missing (or zero) area, or an
/// empty grid, resolves to the image centre. Areas outside `1..=rows*cols` give `None`.
pub fn area_to_xy(
    area: Option<i64>,
    subarea: Subarea,
    width: u32,
    height: u32,
    rows: u32,
    cols: u32,
) -> Option<(i64, i64)> {
    let (w, h) = (i64::from(width), i64::from(height));
    let area = match area {
        Some(a) if a != 0 && rows > 0 && cols > 0 => a,
        _ => return Some((w / 2, h / 2)),
    };
    let (rows, cols) = (i64::from(rows), i64::from(cols));
    if !(1..=rows.checked_mul(cols)?).contains(&area) {
        return None;
    }
    let idx = area - 1;
    let (row, col) = (idx / cols, idx % cols);

    let cell_w = w / cols;
    let cell_h = h / rows;
    let (qx, qy) = subarea.quarters();
    let x = col.checked_mul(cell_w)?.checked_add(cell_w.checked_mul(qx)? / 4)?;
    let y = row.checked_mul(cell_h)?.checked_add(cell_h.checked_mul(qy)? / 4)?;
    Some((x, y))
}

/// Overlay the numbered grid on `src` and write it to `out` as PNG.
pub fn draw_grid(src: &Path, out: &Path, spec: &GridSpec) -> MobiClawResult<()> {
    let img = image::open(src)
        .map_err(|e| MobiClawError::Perception(format!("load image: {e}")))?;
    let mut canvas = img.to_rgba8();

    let thickness = (spec.cell_width / 50).max(1) as i32;
    let scale: u32 = if spec.cell_width >= 120 { 3 } else { 2 };

    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let label = (row * spec.cols + col + 1).to_string();
            let left = col * spec.cell_width;
            let top = row * spec.cell_height;
            draw_rect(
                &mut canvas,
                left as i32,
                top as i32,
                (left + spec.cell_width) as i32,
                (top + spec.cell_height) as i32,
                LINE_COLOUR,
                thickness,
            );
            let lx = left + spec.cell_width / 20 + 3;
            let ly = top + spec.cell_height / 10 + 3;
            draw_label(&mut canvas, &label, lx, ly, scale, [113, 116, 255], [0, 0, 0, 170]);
        }
    }

    image::DynamicImage::ImageRgba8(canvas)
        .save_with_format(out, image::ImageFormat::Png)
        .map_err(|e| MobiClawError::Perception(format!("PNG encode: {e}")))?;
    Ok(())
}

/// Prompt section explaining how to read the overlay.
pub fn build_grid_prompt(spec: &GridSpec) -> String {
    format!(
        "--- Grid Overlay View ---\n\
         The image is overlaid with a {rows}x{cols} grid.\n\
         Each cell has a numeric ID (1 = top-left, {last} = bottom-right, counted row by row). \
         You can tap a cell by outputting its ID (area).\n",
        rows = spec.rows,
        cols = spec.cols,
        last = spec.cell_count(),
    )
}

pub struct GridPerception {
    name: String,
}

impl GridPerception {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Perception for GridPerception {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> PerceptionMode {
        PerceptionMode::Grid
    }

    fn perceive(
        &self,
        screenshot: &Path,
        width_hint: u32,
        height_hint: u32,
    ) -> MobiClawResult<Option<PerceptionResult>> {
        let (width, height) = resolve_dimensions(screenshot, width_hint, height_hint);
        let spec = GridSpec::for_image(width, height);

        let marked = sibling_path(screenshot, "grid");
        let annotated_images = match draw_grid(screenshot, &marked, &spec) {
            Ok(()) => vec![marked],
            Err(e) => {
                tracing::warn!(error = %e, "grid overlay failed, sending raw screenshot");
                Vec::new()
            }
        };

        tracing::debug!(rows = spec.rows, cols = spec.cols, width, height, "grid computed");

        Ok(Some(PerceptionResult {
            mode: PerceptionMode::Grid,
            screenshot_path: screenshot.to_path_buf(),
            elements: Vec::new(),
            meta: PerceptionMeta {
                width,
                height,
                grid: Some(spec),
                ..Default::default()
            },
            prompt: build_grid_prompt(&spec),
            annotated_images,
        }))
    }
}
