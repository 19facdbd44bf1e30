pub mod android;
pub mod harmony;
pub mod mock;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{MobiClawError, MobiClawResult};

pub use android::AndroidDevice;
pub use harmony::HarmonyDevice;
pub use mock::MockDevice;

/// Settle times after each input, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputTiming {
    pub tap_ms: u64,
    pub swipe_ms: u64,
    /// Gesture length for `adb input swipe`.
    pub swipe_duration_ms: u64,
    /// Pixels per second for `uitest uiInput swipe`.
    pub swipe_speed: u32,
    pub text_ms: u64,
    pub clear_ms: u64,
    pub key_ms: u64,
    pub clear_repeats: u32,
}

impl Default for InputTiming {
    fn default() -> Self {
        Self {
            tap_ms: 1000,
            swipe_ms: 1500,
            swipe_duration_ms: 500,
            swipe_speed: 1600,
            text_ms: 1000,
            clear_ms: 1000,
            key_ms: 1000,
            clear_repeats: 15,
        }
    }
}

/// Run a device tool and return its stdout; a non-zero exit is a `Device` error.
pub(crate) fn run_tool(cmd: &mut Command) -> MobiClawResult<String> {
    let tool = cmd.get_program().to_string_lossy().into_owned();
    let Output { status, stdout, stderr } = cmd
        .output()
        .map_err(|e| MobiClawError::Device(format!("cannot run {tool}: {e}")))?;
    if !status.success() {
        return Err(MobiClawError::Device(format!(
            "{tool} exited with {status}: {}",
            String::from_utf8_lossy(&stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

pub(crate) fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Harmony,
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Some(Platform::Android),
            "harmony" | "harmonyos" | "ohos" => Some(Platform::Harmony),
            _ => None,
        }
    }
}

/// Pick a device. A requested serial is looked up on both platforms; otherwise
/// the first device of the preferred platform, then Android, then HarmonyOS.
pub fn choose_device(
    serial: Option<&str>,
    preferred: Option<Platform>,
    android: &[String],
    harmony: &[String],
) -> Option<(Platform, String)> {
    if let Some(serial) = serial {
        let owner = if android.iter().any(|s| s == serial) {
            Platform::Android
        } else if harmony.iter().any(|s| s == serial) {
            Platform::Harmony
        } else {
            preferred?
        };
        return Some((owner, serial.to_string()));
    }
    let first = |p: Platform| {
        let list = match p {
            Platform::Android => android,
            Platform::Harmony => harmony,
        };
        list.first().map(|s| (p, s.clone()))
    };
    preferred
        .and_then(first)
        .or_else(|| first(Platform::Android))
        .or_else(|| first(Platform::Harmony))
}

/// Scan both `adb` and `hdc` and connect to whichever has a device attached.
/// A missing tool counts as no devices on that platform.
pub fn connect_any(
    serial: Option<&str>,
    preferred: Option<Platform>,
    timing: InputTiming,
) -> MobiClawResult<Box<dyn Device>> {
    let android = AndroidDevice::list_devices().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "adb scan failed");
        Vec::new()
    });
    let harmony = HarmonyDevice::list_devices().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "hdc scan failed");
        Vec::new()
    });
    tracing::info!(android = android.len(), harmony = harmony.len(), "device scan");

    match choose_device(serial, preferred, &android, &harmony) {
        Some((Platform::Android, serial)) => Ok(Box::new(AndroidDevice::connect(Some(serial), timing)?)),
        Some((Platform::Harmony, serial)) => Ok(Box::new(HarmonyDevice::connect(Some(serial), timing)?)),
        None => Err(MobiClawError::Device(
            "no devices found; connect a phone or start an emulator".into(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    /// Case-insensitive; anything unrecognised is `Left`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => SwipeDirection::Up,
            "down" => SwipeDirection::Down,
            "right" => SwipeDirection::Right,
            _ => SwipeDirection::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeDirection::Up => "up",
            SwipeDirection::Down => "down",
            SwipeDirection::Left => "left",
            SwipeDirection::Right => "right",
        }
    }

    /// Start and end points of a swipe across a `width`x`height` screen
    /// covering `scale` of the relevant axis, centred.
    pub fn endpoints(&self, width: u32, height: u32, scale: f64) -> ((i64, i64), (i64, i64)) {
        let (w, h) = (width as i64, height as i64);
        let scale = scale.clamp(0.0, 1.0);
        let h_off = (width as f64 * (1.0 - scale) / 2.0) as i64;
        let v_off = (height as f64 * (1.0 - scale) / 2.0) as i64;
        match self {
            SwipeDirection::Left => ((w - h_off, h / 2), (h_off, h / 2)),
            SwipeDirection::Right => ((h_off, h / 2), (w - h_off, h / 2)),
            SwipeDirection::Up => ((w / 2, h - v_off), (w / 2, v_off)),
            SwipeDirection::Down => ((w / 2, v_off), (w / 2, h - v_off)),
        }
    }
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A controllable phone. Only the runner talks to devices.
pub trait Device: Send {
    fn name(&self) -> &str;
    fn size(&self) -> (u32, u32);
    fn tap(&self, x: i64, y: i64) -> MobiClawResult<()>;
    fn swipe(&self, direction: SwipeDirection, scale: f64) -> MobiClawResult<()>;
    fn input_text(&self, text: &str) -> MobiClawResult<()>;
    fn go_home(&self) -> MobiClawResult<()>;
    fn go_back(&self) -> MobiClawResult<()>;
    fn enter(&self) -> MobiClawResult<()>;
    fn clear_text(&self) -> MobiClawResult<()>;
    /// Capture the screen into `path` and return where it was written.
    fn screenshot(&self, path: &Path) -> MobiClawResult<PathBuf>;
}
