use std::path::{Path, PathBuf};

use crate::perception::types::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Read the pixel size from the image header without decoding the whole file.
pub fn probe_dimensions(path: &Path) -> Option<(u32, u32)> {
    match image::image_dimensions(path) {
        Ok(dims) => Some(dims),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read screenshot dimensions");
            None
        }
    }
}

/// Best-effort size: the image itself, then the caller's hints, then the default.
pub fn resolve_dimensions(path: &Path, width_hint: u32, height_hint: u32) -> (u32, u32) {
    if let Some(dims) = probe_dimensions(path) {
        return dims;
    }
    if width_hint > 0 && height_hint > 0 {
        (width_hint, height_hint)
    } else {
        (DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

/// `shots/step_1.png` + `grid` → `shots/step_1_grid.png`
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot".to_string());
    path.with_file_name(format!("{stem}_{suffix}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_path_keeps_directory() {
        let p = sibling_path(Path::new("shots/task_1_step_2.png"), "som");
        assert_eq!(p, PathBuf::from("shots/task_1_step_2_som.png"));
    }

    #[test]
    fn missing_image_falls_back_to_hints_then_default() {
        let missing = Path::new("/nonexistent/shot.png");
        assert_eq!(resolve_dimensions(missing, 720, 1600), (720, 1600));
        assert_eq!(resolve_dimensions(missing, 0, 0), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }
}
