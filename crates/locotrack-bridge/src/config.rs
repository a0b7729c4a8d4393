//! Bridge configuration.
//!
//! Values are layered, each layer overriding the previous one:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file named by `LOCOTRACK_BRIDGE_CONFIG`,
//! 3. `LOCOTRACK_*` environment variables,
//! 4. positional arguments `host port device_path baud_rate`, which is how
//!    the controller-side supervisor launches the bridge.

use std::fs;
use std::path::Path;
use std::time::Duration;

use locotrack_types::LocoError;
use serde::{Deserialize, Serialize};

use crate::odometry::WheelGeometry;

/// Runtime settings of one bridge process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Controller host state datagrams are sent to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Controller UDP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Serial device of the wheel encoder.
    #[serde(default = "default_device_path")]
    pub device_path: String,

    /// Must match the rate the encoder firmware writes at.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_wheel_radius_m")]
    pub wheel_radius_m: f64,

    #[serde(default = "default_ticks_per_revolution")]
    pub ticks_per_revolution: u32,

    /// Serial read timeout; bounds how long shutdown can take.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Sleep between empty polls of the command socket.
    #[serde(default = "default_command_idle_ms")]
    pub command_idle_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    33335
}
fn default_device_path() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_baud_rate() -> u32 {
    57600
}
fn default_wheel_radius_m() -> f64 {
    WheelGeometry::default().radius_m
}
fn default_ticks_per_revolution() -> u32 {
    WheelGeometry::default().ticks_per_revolution
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_command_idle_ms() -> u64 {
    1
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            device_path: default_device_path(),
            baud_rate: default_baud_rate(),
            wheel_radius_m: default_wheel_radius_m(),
            ticks_per_revolution: default_ticks_per_revolution(),
            read_timeout_ms: default_read_timeout_ms(),
            command_idle_ms: default_command_idle_ms(),
        }
    }
}

impl BridgeConfig {
    /// Resolve the full configuration for this process from the environment
    /// and the given positional arguments (program name excluded).
    pub fn resolve<I>(args: I) -> Result<Self, LocoError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cfg = match std::env::var("LOCOTRACK_BRIDGE_CONFIG") {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        cfg.apply_env_overrides();
        cfg.apply_args(args)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a TOML file; missing keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self, LocoError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            LocoError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| LocoError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Apply `LOCOTRACK_*` environment variable overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `LOCOTRACK_HOST` | `host` |
    /// | `LOCOTRACK_PORT` | `port` |
    /// | `LOCOTRACK_DEVICE` | `device_path` |
    /// | `LOCOTRACK_BAUD_RATE` | `baud_rate` |
    /// | `LOCOTRACK_WHEEL_RADIUS_M` | `wheel_radius_m` |
    /// | `LOCOTRACK_TICKS_PER_REV` | `ticks_per_revolution` |
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LOCOTRACK_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("LOCOTRACK_PORT")
            && let Ok(port) = v.parse() {
                self.port = port;
            }
        if let Ok(v) = std::env::var("LOCOTRACK_DEVICE") {
            self.device_path = v;
        }
        if let Ok(v) = std::env::var("LOCOTRACK_BAUD_RATE")
            && let Ok(baud) = parse_baud_rate(&v) {
                self.baud_rate = baud;
            }
        if let Ok(v) = std::env::var("LOCOTRACK_WHEEL_RADIUS_M")
            && let Ok(r) = v.parse() {
                self.wheel_radius_m = r;
            }
        if let Ok(v) = std::env::var("LOCOTRACK_TICKS_PER_REV")
            && let Ok(t) = v.parse() {
                self.ticks_per_revolution = t;
            }
    }

    /// Apply positional `host port device_path baud_rate` arguments.  Any
    /// suffix may be omitted.
    pub fn apply_args<I>(&mut self, args: I) -> Result<(), LocoError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        if let Some(host) = args.next() {
            self.host = host;
        }
        if let Some(port) = args.next() {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| LocoError::Config(format!("invalid port {port:?}: {e}")))?;
        }
        if let Some(device) = args.next() {
            self.device_path = device;
        }
        if let Some(baud) = args.next() {
            self.baud_rate = parse_baud_rate(&baud)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), LocoError> {
        if self.host.trim().is_empty() {
            return Err(LocoError::Config("host must not be empty".to_string()));
        }
        if !(self.wheel_radius_m.is_finite() && self.wheel_radius_m > 0.0) {
            return Err(LocoError::Config(format!(
                "wheel radius must be positive, got {}",
                self.wheel_radius_m
            )));
        }
        if self.ticks_per_revolution == 0 {
            return Err(LocoError::Config(
                "ticks_per_revolution must be non-zero".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(LocoError::Config("read_timeout_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn geometry(&self) -> WheelGeometry {
        WheelGeometry::new(self.wheel_radius_m, self.ticks_per_revolution)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn command_idle(&self) -> Duration {
        Duration::from_millis(self.command_idle_ms)
    }
}

/// Parse a baud rate, accepting integral float spellings such as
/// `"57600.0"`.
pub fn parse_baud_rate(raw: &str) -> Result<u32, LocoError> {
    let raw = raw.trim();
    if let Ok(baud) = raw.parse::<u32>() {
        return Ok(baud);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f > 0.0 && f <= f64::from(u32::MAX) => Ok(f as u32),
        _ => Err(LocoError::Config(format!("invalid baud rate {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_reference_rig() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 33335);
        assert_eq!(cfg.device_path, "/dev/ttyACM0");
        assert_eq!(cfg.baud_rate, 57600);
        assert_eq!(cfg.ticks_per_revolution, 1024);
        assert!((cfg.wheel_radius_m - 0.09525).abs() < 1e-12);
    }

    #[test]
    fn positional_args_override_all_four_fields() {
        let mut cfg = BridgeConfig::default();
        cfg.apply_args(args(&["10.0.0.2", "40000", "/dev/ttyUSB1", "115200"]))
            .unwrap();
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.port, 40000);
        assert_eq!(cfg.device_path, "/dev/ttyUSB1");
        assert_eq!(cfg.baud_rate, 115200);
    }

    #[test]
    fn partial_args_keep_remaining_defaults() {
        let mut cfg = BridgeConfig::default();
        cfg.apply_args(args(&["192.168.1.5"])).unwrap();
        assert_eq!(cfg.host, "192.168.1.5");
        assert_eq!(cfg.port, 33335);
        assert_eq!(cfg.device_path, "/dev/ttyACM0");
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut cfg = BridgeConfig::default();
        let err = cfg.apply_args(args(&["localhost", "99999"])).unwrap_err();
        assert!(matches!(err, LocoError::Config(_)));
    }

    #[test]
    fn float_baud_rate_is_accepted() {
        assert_eq!(parse_baud_rate("57600.0").unwrap(), 57600);
        assert_eq!(parse_baud_rate("9600").unwrap(), 9600);
        assert!(parse_baud_rate("9600.5").is_err());
        assert!(parse_baud_rate("fast").is_err());
        assert!(parse_baud_rate("-1").is_err());
    }

    #[test]
    fn toml_file_fills_missing_keys_with_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "port = 41000\nwheel_radius_m = 0.1\n").unwrap();

        let cfg = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(cfg.port, 41000);
        assert_eq!(cfg.wheel_radius_m, 0.1);
        assert_eq!(cfg.baud_rate, 57600);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(
            BridgeConfig::load_from(&path),
            Err(LocoError::Config(_))
        ));
    }

    #[test]
    fn validate_rejects_degenerate_wheel() {
        let cfg = BridgeConfig {
            ticks_per_revolution: 0,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = BridgeConfig {
            wheel_radius_m: -1.0,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn apply_env_overrides_changes_device() {
        let _env = crate::lock_env();
        // SAFETY: the env lock serialises every env mutation in this test
        // binary, and std's own env accessors are internally synchronised.
        unsafe { std::env::set_var("LOCOTRACK_DEVICE", "/dev/ttyS9") };
        let mut cfg = BridgeConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.device_path, "/dev/ttyS9");
        unsafe { std::env::remove_var("LOCOTRACK_DEVICE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_ticks() {
        let _env = crate::lock_env();
        // SAFETY: the env lock serialises every env mutation in this test
        // binary, and std's own env accessors are internally synchronised.
        unsafe { std::env::set_var("LOCOTRACK_TICKS_PER_REV", "lots") };
        let mut cfg = BridgeConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.ticks_per_revolution, 1024);
        unsafe { std::env::remove_var("LOCOTRACK_TICKS_PER_REV") };
    }
}
