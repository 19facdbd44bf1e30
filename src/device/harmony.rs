use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use crate::device::{pause, run_tool, Device, InputTiming, SwipeDirection};
use crate::errors::{MobiClawError, MobiClawResult};
use crate::perception::types::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

const KEY_HOME: &str = "Home";
const KEY_BACK: &str = "Back";
const KEYCODE_ENTER: u32 = 2054;
const KEYCODE_DEL: u32 = 2055;
const REMOTE_SCREENSHOT: &str = "/data/local/tmp/mobiclaw_screenshot.jpeg";

/// HarmonyOS phone driven through the `hdc` binary and the on-device `uitest` tool.
pub struct HarmonyDevice {
    serial: String,
    width: u32,
    height: u32,
    timing: InputTiming,
}

impl HarmonyDevice {
    /// Binds to `serial`, or to the first target `hdc` reports.
    pub fn connect(serial: Option<String>, timing: InputTiming) -> MobiClawResult<Self> {
        let serial = match serial.filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => Self::list_devices()?
                .into_iter()
                .next()
                .ok_or_else(|| MobiClawError::Device("no HarmonyOS device attached to hdc".into()))?,
        };
        tracing::info!(serial = %serial, "harmony device bound");

        let mut device = Self {
            serial,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            timing,
        };
        let (w, h) = parse_display_mode(&device.shell("hidumper -s RenderService -a screen")?)
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        device.width = w;
        device.height = h;
        tracing::info!(width = w, height = h, "harmony display size");
        Ok(device)
    }

    pub fn list_devices() -> MobiClawResult<Vec<String>> {
        Ok(parse_target_list(&run_tool(Command::new("hdc").args(["list", "targets"]))?))
    }

    /// Bundle names of installed apps, from `bm dump -a`.
    pub fn installed_bundles(&self) -> MobiClawResult<Vec<String>> {
        let bundles = parse_bundle_list(&self.shell("bm dump -a")?);
        tracing::debug!(count = bundles.len(), "harmony bundles listed");
        Ok(bundles)
    }

    fn hdc(&self) -> Command {
        let mut cmd = Command::new("hdc");
        cmd.args(["-t", &self.serial]);
        cmd
    }

    fn shell(&self, cmd: &str) -> MobiClawResult<String> {
        tracing::debug!(serial = %self.serial, cmd = %cmd, "hdc shell");
        run_tool(self.hdc().args(["shell", cmd]))
    }

    fn key_event(&self, key: impl std::fmt::Display) -> MobiClawResult<()> {
        self.shell(&format!("uitest uiInput keyEvent {key}"))?;
        pause(self.timing.key_ms);
        Ok(())
    }
}

/// Targets from `hdc list targets`; `[Empty]` means none.
pub fn parse_target_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with('[')
                && !line.contains("List of devices")
                && !line.contains("attached")
        })
        .map(str::to_string)
        .collect()
}

fn display_mode_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"activeMode:\s*(\d+)x(\d+)").ok()).as_ref()
}

pub fn parse_display_mode(output: &str) -> Option<(u32, u32)> {
    let caps = display_mode_re()?.captures(output)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn bundle_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-zA-Z0-9_]+\.[a-zA-Z0-9_]+\.[a-zA-Z0-9_.]+\b").ok())
        .as_ref()
}

/// Sorted, de-duplicated reverse-domain bundle names.
pub fn parse_bundle_list(output: &str) -> Vec<String> {
    let Some(re) = bundle_re() else {
        return Vec::new();
    };
    re.find_iter(output)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Single-quote `text` for the device shell.
pub fn quote_shell_arg(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

impl Device for HarmonyDevice {
    fn name(&self) -> &str {
        &self.serial
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn tap(&self, x: i64, y: i64) -> MobiClawResult<()> {
        self.shell(&format!("uitest uiInput click {x} {y}"))?;
        pause(self.timing.tap_ms);
        Ok(())
    }

    fn swipe(&self, direction: SwipeDirection, scale: f64) -> MobiClawResult<()> {
        let ((x1, y1), (x2, y2)) = direction.endpoints(self.width, self.height, scale);
        self.shell(&format!(
            "uitest uiInput swipe {x1} {y1} {x2} {y2} {}",
            self.timing.swipe_speed
        ))?;
        pause(self.timing.swipe_ms);
        Ok(())
    }

    fn input_text(&self, text: &str) -> MobiClawResult<()> {
        self.shell(&format!("uitest uiInput text {}", quote_shell_arg(text)))?;
        pause(self.timing.text_ms);
        Ok(())
    }

    fn go_home(&self) -> MobiClawResult<()> {
        self.key_event(KEY_HOME)
    }

    fn go_back(&self) -> MobiClawResult<()> {
        self.key_event(KEY_BACK)
    }

    fn enter(&self) -> MobiClawResult<()> {
        self.key_event(KEYCODE_ENTER)
    }

    fn clear_text(&self) -> MobiClawResult<()> {
        let one = format!("uitest uiInput keyEvent {KEYCODE_DEL}");
        let all = vec![one; self.timing.clear_repeats.max(1) as usize].join(";");
        self.shell(&all)?;
        pause(self.timing.clear_ms);
        Ok(())
    }

    /// `snapshot_display` only writes JPEG, so the pulled file is re-encoded as PNG.
    fn screenshot(&self, path: &Path) -> MobiClawResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.shell(&format!("snapshot_display -f {REMOTE_SCREENSHOT}"))?;

        let pulled = path.with_extension("jpeg");
        run_tool(self.hdc().args(["file", "recv", REMOTE_SCREENSHOT]).arg(&pulled))?;
        image::open(&pulled)?.save_with_format(path, image::ImageFormat::Png)?;
        if let Err(e) = std::fs::remove_file(&pulled) {
            tracing::debug!(error = %e, "could not remove pulled jpeg");
        }
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_list_skips_banners_and_empty_marker() {
        assert_eq!(
            parse_target_list("FMR0223C13000649\n192.168.3.7:5555\n\n"),
            vec!["FMR0223C13000649", "192.168.3.7:5555"]
        );
        assert!(parse_target_list("[Empty]\n").is_empty());
    }

    #[test]
    fn display_mode_is_parsed() {
        let out = "-- ScreenInfo\nscreen[0]: id=0, powerstatus=POWER_STATUS_ON, backlight=51, screenType=EXTERNAL_TYPE, \
                   render size: 1260x2720, physical screen resolution: 1260x2720, isvirtual=false\n\
                   supportedMode[0]: id=0, 1260x2720, refreshrate=120\nactiveMode: 1260x2720, refreshrate=120\n";
        assert_eq!(parse_display_mode(out), Some((1260, 2720)));
        assert_eq!(parse_display_mode("[Fail]not found"), None);
    }

    #[test]
    fn bundles_are_deduplicated_and_sorted() {
        let out = "ID: 100:\n\tcom.huawei.hmos.settings\n\tcom.ohos.camera\n\tcom.huawei.hmos.settings\n";
        assert_eq!(parse_bundle_list(out), vec!["com.huawei.hmos.settings", "com.ohos.camera"]);
    }

    #[test]
    fn text_is_single_quoted_for_the_shell() {
        assert_eq!(quote_shell_arg("hello world"), "'hello world'");
        assert_eq!(quote_shell_arg("it's"), r"'it'\''s'");
    }
}
