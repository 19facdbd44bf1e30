use std::path::{Path, PathBuf};

use crate::device::{Device, SwipeDirection};
use crate::errors::MobiClawResult;
use crate::perception::types::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Offline device: every screenshot is a blank white screen and inputs are
/// only logged.
pub struct MockDevice {
    width: u32,
    height: u32,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for MockDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn tap(&self, x: i64, y: i64) -> MobiClawResult<()> {
        tracing::info!(x, y, "mock tap");
        Ok(())
    }

    fn swipe(&self, direction: SwipeDirection, scale: f64) -> MobiClawResult<()> {
        tracing::info!(direction = %direction, scale, "mock swipe");
        Ok(())
    }

    fn input_text(&self, text: &str) -> MobiClawResult<()> {
        tracing::info!(text = %text, "mock input");
        Ok(())
    }

    fn go_home(&self) -> MobiClawResult<()> {
        tracing::info!("mock home");
        Ok(())
    }

    fn go_back(&self) -> MobiClawResult<()> {
        tracing::info!("mock back");
        Ok(())
    }

    fn enter(&self) -> MobiClawResult<()> {
        tracing::info!("mock enter");
        Ok(())
    }

    fn clear_text(&self) -> MobiClawResult<()> {
        tracing::info!("mock clear");
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> MobiClawResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image::RgbImage::from_pixel(self.width, self.height, image::Rgb([255, 255, 255])).save(path)?;
        tracing::debug!(path = %path.display(), "mock screenshot written");
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_is_white_png_of_device_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("s.png");
        let out = MockDevice::new().screenshot(&path).unwrap();
        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
        assert_eq!(img.get_pixel(10, 10).0, [255, 255, 255]);
    }
}
