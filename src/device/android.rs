use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use crate::device::{pause, run_tool, Device, InputTiming, SwipeDirection};
use crate::errors::{MobiClawError, MobiClawResult};
use crate::perception::types::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

const KEYCODE_HOME: u32 = 3;
const KEYCODE_BACK: u32 = 4;
const KEYCODE_ENTER: u32 = 66;
const KEYCODE_DEL: u32 = 67;
const REMOTE_SCREENSHOT: &str = "/sdcard/mobiclaw_screenshot.png";

/// Android phone or emulator driven through the `adb` binary.
pub struct AndroidDevice {
    serial: String,
    width: u32,
    height: u32,
    timing: InputTiming,
}

impl AndroidDevice {
    /// Binds to `serial`, or to the first attached device when none is given.
    pub fn connect(serial: Option<String>, timing: InputTiming) -> MobiClawResult<Self> {
        let serial = match serial.filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => Self::list_devices()?
                .into_iter()
                .next()
                .ok_or_else(|| MobiClawError::Device("no Android device attached to adb".into()))?,
        };
        tracing::info!(serial = %serial, "android device bound");

        let mut device = Self {
            serial,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            timing,
        };
        let (w, h) = parse_wm_size(&device.shell("wm size")?).unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        device.width = w;
        device.height = h;
        tracing::info!(width = w, height = h, "android display size");
        Ok(device)
    }

    /// Serials of attached devices in the `device` state.
    pub fn list_devices() -> MobiClawResult<Vec<String>> {
        Ok(parse_device_list(&run_tool(Command::new("adb").arg("devices"))?))
    }

    fn adb(&self) -> Command {
        let mut cmd = Command::new("adb");
        cmd.args(["-s", &self.serial]);
        cmd
    }

    fn shell(&self, cmd: &str) -> MobiClawResult<String> {
        tracing::debug!(serial = %self.serial, cmd = %cmd, "adb shell");
        run_tool(self.adb().args(["shell", cmd]))
    }

    fn keyevent(&self, code: u32) -> MobiClawResult<()> {
        self.shell(&format!("input keyevent {code}"))?;
        pause(self.timing.key_ms);
        Ok(())
    }
}

/// Serials of devices in the `device` state from `adb devices` output.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

fn wm_size_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Physical size:\s*(\d+)x(\d+)").ok()).as_ref()
}

pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let caps = wm_size_re()?.captures(output)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// `input text` treats spaces as separators and the argument is single-quoted.
pub fn escape_input_text(text: &str) -> String {
    text.replace(' ', "%s").replace('\'', "")
}

impl Device for AndroidDevice {
    fn name(&self) -> &str {
        &self.serial
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn tap(&self, x: i64, y: i64) -> MobiClawResult<()> {
        self.shell(&format!("input tap {x} {y}"))?;
        pause(self.timing.tap_ms);
        Ok(())
    }

    fn swipe(&self, direction: SwipeDirection, scale: f64) -> MobiClawResult<()> {
        let ((x1, y1), (x2, y2)) = direction.endpoints(self.width, self.height, scale);
        self.shell(&format!(
            "input swipe {x1} {y1} {x2} {y2} {}",
            self.timing.swipe_duration_ms
        ))?;
        pause(self.timing.swipe_ms);
        Ok(())
    }

    fn input_text(&self, text: &str) -> MobiClawResult<()> {
        self.shell(&format!("input text '{}'", escape_input_text(text)))?;
        pause(self.timing.text_ms);
        Ok(())
    }

    fn go_home(&self) -> MobiClawResult<()> {
        self.keyevent(KEYCODE_HOME)
    }

    fn go_back(&self) -> MobiClawResult<()> {
        self.keyevent(KEYCODE_BACK)
    }

    fn enter(&self) -> MobiClawResult<()> {
        self.keyevent(KEYCODE_ENTER)
    }

    fn clear_text(&self) -> MobiClawResult<()> {
        let one = format!("input keyevent {KEYCODE_DEL}");
        let all = vec![one; self.timing.clear_repeats.max(1) as usize].join(";");
        self.shell(&all)?;
        pause(self.timing.clear_ms);
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> MobiClawResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.shell(&format!("screencap -p {REMOTE_SCREENSHOT}"))?;
        run_tool(self.adb().arg("pull").arg(REMOTE_SCREENSHOT).arg(path))?;
        Ok(path.to_path_buf())
    }
}
