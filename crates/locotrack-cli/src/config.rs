//! Operator configuration – reads/writes `~/.locotrack/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use locotrack_controller::{BridgeClosedLoopConfig, SupervisorConfig, DEFAULT_CLOSE_TIMEOUT};

/// Fastest and fallback console refresh.
const MIN_PRINT_PERIOD: Duration = Duration::from_millis(1);
const FALLBACK_PRINT_PERIOD: Duration = Duration::from_millis(100);

/// How pose updates are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Persisted operator configuration stored in `~/.locotrack/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the controller listens on for state datagrams.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// UDP port for state datagrams; `0` lets the OS choose.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Serial device handed to the bridge.
    #[serde(default = "default_device_path")]
    pub device_path: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Bridge executable, looked up on `PATH` when not absolute.
    #[serde(default = "default_bridge_program")]
    pub bridge_program: String,

    /// Extra arguments placed before the bridge's positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bridge_args: Vec<String>,

    /// Seconds the bridge gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: f64,

    /// Maximum pose lines printed per second.
    #[serde(default = "default_print_hz")]
    pub print_hz: f64,

    #[serde(default)]
    pub output: OutputFormat,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}
fn default_listen_port() -> u16 {
    33335
}
fn default_device_path() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_baud_rate() -> u32 {
    57600
}
fn default_bridge_program() -> String {
    "locotrack-bridge".to_string()
}
fn default_close_timeout_secs() -> f64 {
    DEFAULT_CLOSE_TIMEOUT.as_secs_f64()
}
fn default_print_hz() -> f64 {
    10.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            device_path: default_device_path(),
            baud_rate: default_baud_rate(),
            bridge_program: default_bridge_program(),
            bridge_args: Vec::new(),
            close_timeout_secs: default_close_timeout_secs(),
            print_hz: default_print_hz(),
            output: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Settings for the bridge-backed closed-loop source.
    pub fn adapter_config(&self) -> BridgeClosedLoopConfig {
        BridgeClosedLoopConfig {
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port,
            bridge: SupervisorConfig {
                program: self.bridge_program.clone(),
                program_args: self.bridge_args.clone(),
                host: self.listen_host.clone(),
                port: self.listen_port,
                device_path: self.device_path.clone(),
                baud_rate: self.baud_rate,
            },
            close_timeout: self.close_timeout(),
        }
    }

    /// `close_timeout_secs` as a [`Duration`]; nonsense values fall back to
    /// the default window.
    pub fn close_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.close_timeout_secs).unwrap_or(DEFAULT_CLOSE_TIMEOUT)
    }

    /// Interval between console pose lines.
    pub fn print_period(&self) -> Duration {
        if !(self.print_hz.is_finite() && self.print_hz > 0.0) {
            return FALLBACK_PRINT_PERIOD;
        }
        Duration::try_from_secs_f64(1.0 / self.print_hz)
            .map(|p| p.max(MIN_PRINT_PERIOD))
            .unwrap_or(FALLBACK_PRINT_PERIOD)
    }
}

/// Return the path to `~/.locotrack/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".locotrack").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path, then apply env overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `LOCOTRACK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LOCOTRACK_LISTEN_HOST` | `listen_host` |
/// | `LOCOTRACK_LISTEN_PORT` | `listen_port` |
/// | `LOCOTRACK_DEVICE` | `device_path` |
/// | `LOCOTRACK_BAUD_RATE` | `baud_rate` |
/// | `LOCOTRACK_BRIDGE_PROGRAM` | `bridge_program` |
/// | `LOCOTRACK_PRINT_HZ` | `print_hz` |
/// | `LOCOTRACK_OUTPUT` | `output` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LOCOTRACK_LISTEN_HOST") {
        cfg.listen_host = v;
    }
    if let Ok(v) = std::env::var("LOCOTRACK_LISTEN_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.listen_port = port;
        }
    if let Ok(v) = std::env::var("LOCOTRACK_DEVICE") {
        cfg.device_path = v;
    }
    if let Ok(v) = std::env::var("LOCOTRACK_BAUD_RATE")
        && let Ok(baud) = v.parse::<u32>() {
            cfg.baud_rate = baud;
        }
    if let Ok(v) = std::env::var("LOCOTRACK_BRIDGE_PROGRAM") {
        cfg.bridge_program = v;
    }
    if let Ok(v) = std::env::var("LOCOTRACK_PRINT_HZ")
        && let Ok(hz) = v.parse::<f64>() {
            cfg.print_hz = hz;
        }
    if let Ok(v) = std::env::var("LOCOTRACK_OUTPUT")
        && let Ok(format) = v.parse::<OutputFormat>() {
            cfg.output = format;
        }
}

/// Save the config to disk, creating `~/.locotrack/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
