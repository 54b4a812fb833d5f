//! CLI configuration surface.
//!
//! Grounded on the teacher's `main.rs` (`clap::Parser` derive struct) and on
//! `protocol_handler.py`/`mqtt.py`'s `prepare_argparse` argument groups,
//! which this struct reproduces flag-for-flag.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::constants::{
    DEFAULT_DEVICE_ONLINE_TIMEOUT_SECS, DEFAULT_GIVE_UP_SECS, DEFAULT_HASS_DISCOVERY_ROOT,
    DEFAULT_HASS_STATUS_TOPIC, DEFAULT_MQTT_CLIENT_ID, DEFAULT_MQTT_PORT,
    DEFAULT_MQTT_ROOT_TOPIC, DEFAULT_RETRY_INTERVAL_SECS,
};

/// Relay operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Forward everything unchanged in both directions.
    Relay,
    /// Forward device traffic; answer selected cloud queries locally.
    Fallback,
    /// Never contact the cloud.
    Local,
}

#[derive(Debug, Parser)]
#[command(name = "timeguard-gateway")]
#[command(about = "Intercepting UDP gateway for Timeguard time-switches")]
pub struct Cli {
    /// Desired relay behaviour.
    #[arg(long, short = 'm', value_enum, default_value_t = Mode::Relay)]
    pub mode: Mode,

    /// Display communication data and other debug info.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Print the internal parsed structures to stdout.
    #[arg(long, short = 'p')]
    pub print_parsed_data: bool,

    /// Mask device ID and CRC in the debug output.
    #[arg(long, short = 's')]
    pub mask: bool,

    /// MQTT broker hostname. Bridge is disabled entirely if unset.
    #[arg(long)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port.
    #[arg(long, default_value_t = DEFAULT_MQTT_PORT)]
    pub mqtt_port: u16,

    /// MQTT client id.
    #[arg(long, default_value = DEFAULT_MQTT_CLIENT_ID)]
    pub mqtt_clientid: String,

    /// MQTT topic root under which all device topics are published.
    #[arg(long, default_value = DEFAULT_MQTT_ROOT_TOPIC)]
    pub mqtt_root_topic: String,

    /// MQTT username, if the broker requires authentication.
    #[arg(long)]
    pub mqtt_username: Option<String>,

    /// MQTT password, if the broker requires authentication.
    #[arg(long)]
    pub mqtt_password: Option<String>,

    /// Enable Home Assistant discovery, optionally under a custom root topic.
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_HASS_DISCOVERY_ROOT)]
    pub homeassistant_discovery: Option<String>,

    /// Home Assistant status topic to watch for restart recovery.
    #[arg(long, default_value = DEFAULT_HASS_STATUS_TOPIC)]
    pub homeassistant_status_topic: String,

    /// Seconds of silence before a device is marked offline.
    #[arg(long, default_value_t = DEFAULT_DEVICE_ONLINE_TIMEOUT_SECS)]
    pub device_online_timeout: u64,
}

impl Cli {
    pub fn device_online_timeout(&self) -> Duration {
        Duration::from_secs(self.device_online_timeout)
    }
}

/// Tunables for the Pending-Reply Table that spec.md leaves off the CLI
/// surface; kept as a config struct (not yet wired to a flag, per
/// SPEC_FULL.md's Open Question resolution) so a future flag is additive.
#[derive(Debug, Clone, Copy)]
pub struct PendingReplyConfig {
    pub retry_interval: Duration,
    pub give_up: Duration,
}

impl Default for PendingReplyConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            give_up: Duration::from_secs(DEFAULT_GIVE_UP_SECS),
        }
    }
}
