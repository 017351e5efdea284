// Timing, topics, and driver configuration
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kangaroo::serial::DEFAULT_BAUDRATE;

// Control loop frequency
pub const LOOP_HZ: u64 = 100;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_JOINTS: &str = "kangaroo/cmd/joints"; // velocity commands
pub const TOPIC_STATE_JOINTS: &str = "kangaroo/state/joints"; // joint telemetry
pub const TOPIC_HEALTH: &str = "kangaroo/state/health"; // health status

// Serial port for the Kangaroo x2
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

// Joint names reported when none are configured
pub const DEFAULT_JOINT_NAMES: [&str; 2] = ["motor_1_joint", "motor_2_joint"];

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid ticks_per_rev: {0} (must be > 0)")]
    InvalidTicksPerRev(i32),

    #[error("Invalid baud_rate: {0} (must be > 0)")]
    InvalidBaudRate(u32),

    #[error("serial_port must not be empty")]
    EmptySerialPort,
}

/// Startup parameters for the driver node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub ticks_per_rev: i32,
    /// Labels for channel 1 and channel 2 in published joint states
    pub joint_names: [String; 2],
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            ticks_per_rev: 0,
            joint_names: DEFAULT_JOINT_NAMES.map(String::from),
        }
    }
}

impl DriverConfig {
    /// Load from a JSON file; missing fields fall back to defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject anything that would keep the driver from starting safely
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial_port.trim().is_empty() {
            return Err(ConfigError::EmptySerialPort);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate(self.baud_rate));
        }
        if self.ticks_per_rev <= 0 {
            return Err(ConfigError::InvalidTicksPerRev(self.ticks_per_rev));
        }
        Ok(())
    }
}

/// Command line for the driver node; flags override the config file
#[derive(Debug, Parser)]
#[command(version, about = "Kangaroo x2 dual-channel motor driver")]
pub struct CliArgs {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port of the Kangaroo
    #[arg(short, long)]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Encoder ticks per wheel revolution
    #[arg(short, long, allow_negative_numbers = true)]
    pub ticks_per_rev: Option<i32>,

    /// Joint names for channel 1 and channel 2
    #[arg(long, num_args = 2, value_names = ["JOINT_1", "JOINT_2"])]
    pub joint_names: Option<Vec<String>>,
}

impl CliArgs {
    /// Build the final, validated configuration
    pub fn resolve(self) -> Result<DriverConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => DriverConfig::load(path)?,
            None => DriverConfig::default(),
        };

        if let Some(port) = self.port {
            config.serial_port = port;
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(ticks) = self.ticks_per_rev {
            config.ticks_per_rev = ticks;
        }
        if let Some(Ok(names)) = self.joint_names.map(<[String; 2]>::try_from) {
            config.joint_names = names;
        }

        config.validate()?;
        Ok(config)
    }
}
