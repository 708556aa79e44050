use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use vigil_core::DetectionConfig;

/// Sidecar started when no landmark command is configured.
pub const DEFAULT_LANDMARK_COMMAND: &str = "vigil-mesh";

/// Tunables for the capture/classify loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Camera index opened by `start()`; updated by camera cycling.
    pub camera_index: u32,
    pub detection: DetectionConfig,
    /// Classification rate cap. 0 disables the throttle.
    pub target_fps: u32,
    /// Notify the consumer on every Nth processed frame.
    pub notify_stride: u64,
    /// Length of the FPS measurement window, in seconds.
    pub fps_window_secs: f64,
    /// Camera cycling probes indices `0..probe_range`.
    pub probe_range: u32,
    /// Base alert duration in milliseconds; louder alerts use multiples of it.
    pub alert_base_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            detection: DetectionConfig::default(),
            target_fps: 30,
            notify_stride: 3,
            fps_window_secs: 1.0,
            probe_range: 5,
            alert_base_ms: 200,
        }
    }
}

impl MonitorConfig {
    /// Minimum spacing between processed frames.
    pub fn frame_interval(&self) -> Duration {
        if self.target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.target_fps
        }
    }

    pub fn fps_window(&self) -> Duration {
        Duration::try_from_secs_f64(self.fps_window_secs).unwrap_or(Duration::from_secs(1))
    }

    pub fn alert_base(&self) -> Duration {
        Duration::from_millis(self.alert_base_ms)
    }
}

/// Daemon configuration: an optional TOML file named by `VIGIL_CONFIG`,
/// overridden field by field from `VIGIL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub monitor: MonitorConfig,
    /// Landmark sidecar: program followed by its arguments.
    pub landmark_command: Vec<String>,
    /// Console device for alert tones.
    pub beep_device: String,
    /// Where the consumer writes the latest frame, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

/// On-disk layout of the `VIGIL_CONFIG` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    monitor: MonitorConfig,
    landmark_command: Option<Vec<String>>,
    beep_device: Option<String>,
    snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match var("VIGIL_CONFIG") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                toml::from_str::<FileConfig>(&text)
                    .with_context(|| format!("failed to parse config file {path}"))?
            }
            None => FileConfig::default(),
        };

        let mut monitor = file.monitor;
        monitor.camera_index = env_or(&var, "VIGIL_CAMERA_INDEX", monitor.camera_index);
        monitor.detection.movement_threshold = env_or(
            &var,
            "VIGIL_MOVEMENT_THRESHOLD",
            monitor.detection.movement_threshold,
        );
        monitor.detection.eye_open_threshold = env_or(
            &var,
            "VIGIL_EYE_OPEN_THRESHOLD",
            monitor.detection.eye_open_threshold,
        );
        monitor.target_fps = env_or(&var, "VIGIL_TARGET_FPS", monitor.target_fps);
        monitor.notify_stride = env_or(&var, "VIGIL_NOTIFY_STRIDE", monitor.notify_stride);
        monitor.fps_window_secs = env_or(&var, "VIGIL_FPS_WINDOW_SECS", monitor.fps_window_secs);
        monitor.probe_range = env_or(&var, "VIGIL_PROBE_RANGE", monitor.probe_range);
        monitor.alert_base_ms = env_or(&var, "VIGIL_ALERT_BASE_MS", monitor.alert_base_ms);

        Ok(Self {
            monitor,
            landmark_command: var("VIGIL_LANDMARK_COMMAND")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .or(file.landmark_command)
                .unwrap_or_else(|| vec![DEFAULT_LANDMARK_COMMAND.to_string()]),
            beep_device: var("VIGIL_BEEP_DEVICE")
                .or(file.beep_device)
                .unwrap_or_else(|| vigil_hw::beeper::DEFAULT_BEEP_DEVICE.to_string()),
            snapshot_path: var("VIGIL_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .or(file.snapshot_path),
        })
    }
}

fn env_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
