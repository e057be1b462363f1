//! Configuration management for Aeolus
//!
//! This module handles loading, validation, and management of the application
//! configuration, one structure per file section, threaded explicitly through
//! component construction.

use crate::error::{AeolusError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial port connection configuration
    pub serial: SerialConfig,

    /// Companion CLI datagram channel configuration
    pub udp: UdpConfig,

    /// Broker connection and identity
    pub mqtt: MqttConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Command engine tunables
    #[serde(default)]
    pub engine: EngineConfig,

    /// Gateway-wide periodic duties
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Device clock reconciliation
    #[serde(default)]
    pub rtc: RtcConfig,

    /// Internet reachability probe used for clock master selection
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Time-of-day activity windows
    pub tod: TodConfig,

    /// Auxiliary relay operating mode and timer hours
    pub aux_relay: AuxRelayConfig,

    /// Per-instrument calibration, thresholds and publish policies
    pub instruments: InstrumentsConfig,

    /// Alarm script bindings
    pub scripts: ScriptsConfig,

    /// Local HTML snapshot page
    #[serde(default)]
    pub html: HtmlConfig,
}

/// Serial port parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. /dev/ttyUSB0
    pub port: String,

    /// Line speed; the controller supports 9600 and 57600
    pub baud: u32,
}

/// UDP companion channel parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Port datagram requests arrive on
    pub rx_port: u16,

    /// Port responses are sent to
    pub tx_port: u16,

    /// Multicast group for status replication
    #[serde(default)]
    pub multicast_ip: String,

    /// Whether to copy the live stream to the multicast group
    #[serde(default)]
    pub multicast_enabled: bool,
}

/// MQTT broker parameters and station identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Value of the `who` field in every payload
    pub id: String,

    /// Topic path segment identifying this station
    pub channel: String,

    /// Broker host
    pub host: String,

    /// Broker TCP port
    pub port: u16,

    /// Optional credentials
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// Broker keepalive in seconds
    pub keepalive: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory for rotated log files
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to the console as well
    pub console_output: bool,

    /// Whether to use JSON format in the file layer
    pub json_format: bool,
}

/// Command engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum commands in flight concurrently
    pub max_inflight: usize,

    /// Retransmissions after the initial attempt
    pub retries: u32,

    /// Per-command response timeout in seconds
    pub timeout_seconds: f64,
}

/// Gateway-wide periodic duties
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Reconcile device parameters with this file at startup
    pub sync: bool,

    /// Averaging and publish window in seconds
    pub upload_period: u64,

    /// Device watchdog keepalive window in seconds; pings go at half this
    pub keepalive: u64,

    /// Whether the host carries a battery-backed hardware clock
    pub host_rtc: bool,
}

/// Device clock reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// Maximum tolerated drift in seconds
    pub max_drift: u64,

    /// Hours between drift checks
    pub period_hours: u64,
}

/// Internet reachability probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// host:port endpoints tried in order
    pub sites: Vec<String>,

    /// Per-attempt connect timeout in seconds
    pub timeout_seconds: u64,
}

/// Time-of-day activity windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodConfig {
    /// Comma-separated `HH:MM-HH:MM` UTC intervals
    pub intervals: String,

    /// Schedule a host shutdown towards the end of each active window
    #[serde(default)]
    pub poweroff: bool,
}

/// Auxiliary relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxRelayConfig {
    /// Operating mode: Auto, Manual or Timed
    pub mode: String,

    /// Timer switch-on hour, `HH:MM`
    pub on: String,

    /// Timer switch-off hour, `HH:MM`
    pub off: String,

    /// Reconcile the three relay parameters at startup
    #[serde(default = "default_true")]
    pub sync: bool,

    /// Publish policy for relay state
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Where and what an instrument publishes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Sinks: any of "mqtt", "html"
    #[serde(rename = "where")]
    pub sinks: Vec<String>,

    /// Values: any of "current", "average"
    pub what: Vec<String>,
}

/// Per-instrument configuration container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentsConfig {
    pub voltmeter: VoltmeterConfig,
    pub anemometer: AnemometerConfig,
    pub barometer: BarometerConfig,
    pub cloud_sensor: CloudSensorConfig,
    pub photometer: PhotometerConfig,
    pub pluviometer: PluviometerConfig,
    pub pyranometer: PyranometerConfig,
    pub rain_sensor: RainSensorConfig,
    pub thermometer: ThermometerConfig,
    pub thermopile: ThermopileConfig,
    pub watchdog: WatchdogConfig,
    pub roof_relay: RoofRelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltmeterConfig {
    pub sync: bool,
    /// Power-off threshold in volts
    pub threshold: f64,
    /// Calibration offset in volts
    pub offset: f64,
    /// Margin above the threshold that still counts as low
    pub delta: f64,
    /// Sliding average window in seconds
    pub time: u64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnemometerConfig {
    pub sync: bool,
    /// Instantaneous wind speed threshold, km/h
    pub threshold: i64,
    /// 10-minute average wind speed threshold, km/h
    pub ave_threshold: i64,
    /// Calibration constant (arm length in mm for the simple rotor)
    pub calibration: i64,
    /// Rotor model: "TX20" or "Simple"
    pub model: String,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarometerConfig {
    pub sync: bool,
    /// Station height above sea level in metres
    pub height: i64,
    /// Calibration offset in mBar
    pub offset: i64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSensorConfig {
    pub sync: bool,
    /// Cloud level threshold, percent
    pub threshold: i64,
    /// Peltier sensor gain
    pub gain: f64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotometerConfig {
    pub sync: bool,
    /// Darkness threshold in visual magnitudes per arcsec^2
    pub threshold: f64,
    /// Gain offset in the same units
    pub offset: f64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluviometerConfig {
    pub sync: bool,
    /// Calibration constant in mm
    pub calibration: i64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PyranometerConfig {
    pub sync: bool,
    /// Sensor gain
    pub gain: f64,
    /// Sensor offset
    pub offset: i64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RainSensorConfig {
    pub sync: bool,
    /// Rain detection threshold, mm
    pub threshold: i64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermometerConfig {
    pub sync: bool,
    /// Ambient/dew point delta threshold, degrees C
    pub delta_threshold: f64,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermopileConfig {
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub sync: bool,
    /// Device-side keepalive window in seconds
    pub period: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoofRelayConfig {
    pub publish: PublishConfig,
}

/// One alarm script binding
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptEntry {
    /// Executable path; empty disables the binding
    #[serde(default)]
    pub path: String,

    /// Launch mode: Never, Once or Many
    #[serde(default)]
    pub mode: Option<String>,
}

/// Alarm script bindings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptsConfig {
    pub roof_relay: ScriptEntry,
    pub aux_relay: ScriptEntry,
    pub low_voltage: ScriptEntry,
}

/// Local HTML snapshot page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    /// Output file path; empty disables rendering
    pub file: String,

    /// Render period in seconds
    pub period: u64,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with an optional explicit override path.
    ///
    /// When `override_path` is provided, the configuration is loaded strictly
    /// from that path and any error (including file-not-found) is returned
    /// without falling back to default search locations.
    pub fn load_with_override<P: AsRef<Path>>(override_path: Option<P>) -> Result<Self> {
        if let Some(p) = override_path {
            return Self::from_file(p);
        }
        Self::load()
    }

    /// Load configuration from the default search locations
    pub fn load() -> Result<Self> {
        let default_paths = ["aeolus_config.yaml", "/etc/aeolus/config.yaml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(AeolusError::validation(
                "serial.port",
                "Serial device path cannot be empty",
            ));
        }

        if self.serial.baud != 9600 && self.serial.baud != 57600 {
            return Err(AeolusError::validation(
                "serial.baud",
                "Supported line speeds are 9600 and 57600",
            ));
        }

        if self.engine.max_inflight == 0 {
            return Err(AeolusError::validation(
                "engine.max_inflight",
                "At least one command must be allowed in flight",
            ));
        }

        if self.gateway.upload_period == 0 {
            return Err(AeolusError::validation(
                "gateway.upload_period",
                "Must be greater than 0",
            ));
        }

        if self.mqtt.host.is_empty() {
            return Err(AeolusError::validation(
                "mqtt.host",
                "Broker host cannot be empty",
            ));
        }

        if self.udp.multicast_enabled && self.udp.multicast_ip.is_empty() {
            return Err(AeolusError::validation(
                "udp.multicast_ip",
                "Multicast group required when replication is enabled",
            ));
        }

        match self.aux_relay.mode.as_str() {
            "Auto" | "Manual" | "Timed" => {}
            other => {
                return Err(AeolusError::validation(
                    "aux_relay.mode".to_string(),
                    format!("Unknown mode '{}': expected Auto, Manual or Timed", other),
                ));
            }
        }

        for (field, entry) in [
            ("scripts.roof_relay", &self.scripts.roof_relay),
            ("scripts.aux_relay", &self.scripts.aux_relay),
            ("scripts.low_voltage", &self.scripts.low_voltage),
        ] {
            if entry.path.is_empty() {
                continue;
            }
            match entry.mode.as_deref() {
                Some("Never") | Some("Once") | Some("Many") => {}
                Some(other) => {
                    return Err(AeolusError::validation(
                        format!("{}.mode", field),
                        format!("Unknown mode '{}': expected Never, Once or Many", other),
                    ));
                }
                None => {
                    return Err(AeolusError::validation(
                        format!("{}.mode", field),
                        "A script binding requires an explicit mode".to_string(),
                    ));
                }
            }
        }

        match self.instruments.anemometer.model.as_str() {
            "TX20" | "Simple" => {}
            other => {
                return Err(AeolusError::validation(
                    "instruments.anemometer.model".to_string(),
                    format!("Unknown model '{}': expected TX20 or Simple", other),
                ));
            }
        }

        Ok(())
    }
}

// Tests live in `tests/config_io_validate_test.rs`.
