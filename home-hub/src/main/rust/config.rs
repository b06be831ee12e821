use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::domain::value_objects::{CameraConfig, RetryPolicy, Trigger, DEFAULT_LOG_SIZE};
use crate::infrastructure::devices::DEFAULT_PLUG_PORT;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "home-hub",
    version = "0.1.0",
    about = "Home automation hub: power supplies, lights and MJPEG camera streams over HTTP"
)]
pub struct Config {
    /// Device configuration file (JSON)
    #[arg(long, env = "HUB_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP API port, overrides the config file
    #[arg(long, env = "HUB_PORT")]
    pub port: Option<u16>,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9100")]
    pub metrics_port: u16,

    /// Decoder binary used for cameras
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// Root of the sysfs GPIO tree
    #[arg(long, env = "GPIO_ROOT", default_value = "/sys/class/gpio")]
    pub gpio_root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

/// HTTP port when neither the CLI nor the file sets one
const DEFAULT_HTTP_PORT: u16 = 8080;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_port(self.metrics_port, "metrics")?;
        if let Some(port) = self.port {
            Self::validate_port(port, "HTTP")?;
        }
        Ok(())
    }

    /// Effective HTTP port: CLI, then file, then default
    pub fn http_port(&self, file: &HubConfig) -> anyhow::Result<u16> {
        let port = self.port.or(file.port).unwrap_or(DEFAULT_HTTP_PORT);
        Self::validate_port(port, "HTTP")?;
        if port == self.metrics_port {
            anyhow::bail!("HTTP and metrics servers cannot share port {}", port);
        }
        Ok(port)
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PsuType {
    #[default]
    Gpio,
    #[serde(alias = "tp-link", alias = "smarthomeprotocol")]
    SmartPlug,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsuConfig {
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: PsuType,
    pub gpio: Option<u32>,
    pub address: Option<String>,
    #[serde(default = "default_plug_port")]
    pub plug_port: u16,
    #[serde(default)]
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightConfig {
    pub name: Option<String>,
    pub gpio: u32,
    #[serde(default)]
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraEntry {
    pub name: Option<String>,
    pub path: String,
    #[serde(default)]
    pub input_args: Vec<String>,
    #[serde(default)]
    pub output_args: Vec<String>,
    #[serde(default)]
    pub store_last_frame: bool,
    #[serde(default = "default_true")]
    pub logs: bool,
    #[serde(default = "default_log_size")]
    pub log_size: usize,
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default)]
    pub triggers: Vec<String>,
}

impl CameraEntry {
    pub fn to_camera_config(&self) -> crate::domain::errors::Result<CameraConfig> {
        Ok(CameraConfig::new(self.path.clone())?
            .with_input_args(self.input_args.clone())
            .with_output_args(self.output_args.clone())
            .with_last_frame(self.store_last_frame)
            .with_logs(self.logs, self.log_size))
    }
}

/// The device file, keyed by device id within each kind
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    pub port: Option<u16>,
    /// Milliseconds between drift checks; absent or 0 disables them
    pub state_check_interval: Option<u64>,
    /// Milliseconds before restarting a failed camera; absent or 0 disables retries
    pub camera_retry_interval: Option<u64>,
    pub camera_retry_max_interval: Option<u64>,
    #[serde(default = "default_retry_multiplier")]
    pub camera_retry_multiplier: f64,
    pub camera_off_path: Option<PathBuf>,
    pub camera_error_path: Option<PathBuf>,
    #[serde(default = "default_placeholder_fps")]
    pub placeholder_fps: u32,
    #[serde(default = "default_viewer_queue_capacity")]
    pub viewer_queue_capacity: usize,
    #[serde(default)]
    pub psus: BTreeMap<String, PsuConfig>,
    #[serde(default)]
    pub lights: BTreeMap<String, LightConfig>,
    #[serde(default)]
    pub cameras: BTreeMap<String, CameraEntry>,
}

fn default_true() -> bool {
    true
}

fn default_plug_port() -> u16 {
    DEFAULT_PLUG_PORT
}

fn default_log_size() -> usize {
    DEFAULT_LOG_SIZE
}

fn default_retry_multiplier() -> f64 {
    1.0
}

/// Placeholder frames are paced in whole milliseconds
const MAX_PLACEHOLDER_FPS: u32 = 1000;

fn default_placeholder_fps() -> u32 {
    5
}

fn default_viewer_queue_capacity() -> usize {
    16
}

impl HubConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that need more than one field. Trigger targets are checked when devices are registered.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.placeholder_fps == 0 || self.placeholder_fps > MAX_PLACEHOLDER_FPS {
            anyhow::bail!(
                "placeholderFps must be between 1 and {}, got {}",
                MAX_PLACEHOLDER_FPS,
                self.placeholder_fps
            );
        }
        if self.viewer_queue_capacity == 0 {
            anyhow::bail!("viewerQueueCapacity must be at least 1");
        }

        for (id, psu) in &self.psus {
            match psu.kind {
                PsuType::Gpio if psu.gpio.is_none() => {
                    anyhow::bail!("PSU {} uses GPIO but has no gpio pin", id)
                }
                PsuType::SmartPlug if psu.address.as_deref().map_or(true, str::is_empty) => {
                    anyhow::bail!("PSU {} is a smart plug but has no address", id)
                }
                _ => {}
            }
            parse_triggers(&psu.triggers).with_context(|| format!("PSU {}", id))?;
        }
        for (id, light) in &self.lights {
            parse_triggers(&light.triggers).with_context(|| format!("Light {}", id))?;
        }
        for (id, camera) in &self.cameras {
            camera
                .to_camera_config()
                .with_context(|| format!("Camera {}", id))?;
            parse_triggers(&camera.triggers).with_context(|| format!("Camera {}", id))?;
        }

        self.retry_policy()?;
        Ok(())
    }

    pub fn state_check_interval(&self) -> Option<Duration> {
        self.state_check_interval
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Restart policy for failed cameras. Without a multiplier above 1 the delay stays fixed.
    pub fn retry_policy(&self) -> crate::domain::errors::Result<Option<RetryPolicy>> {
        let Some(initial) = self.camera_retry_interval.filter(|ms| *ms > 0) else {
            return Ok(None);
        };
        let initial = Duration::from_millis(initial);
        let max = self
            .camera_retry_max_interval
            .map(Duration::from_millis)
            .unwrap_or(initial);

        RetryPolicy::new(initial, max, self.camera_retry_multiplier).map(Some)
    }

    pub fn placeholder_interval(&self) -> Duration {
        let fps = self.placeholder_fps.clamp(1, MAX_PLACEHOLDER_FPS);
        Duration::from_millis(1000 / u64::from(fps))
    }
}

pub fn parse_triggers(raw: &[String]) -> crate::domain::errors::Result<Vec<Trigger>> {
    raw.iter().map(|trigger| trigger.parse()).collect()
}
