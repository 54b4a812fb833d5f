//! Protocol and transport constants.
//!
//! Mirrors the teacher's `constants.rs`: one flat module of named magic
//! numbers instead of inlining them at each call site.

/// Frame header, immediately before the payload-length field.
pub const FRAME_HEADER: [u8; 2] = [0xFA, 0xD4];

/// Frame footer, immediately after the CRC.
pub const FRAME_FOOTER: [u8; 2] = [0x2D, 0xDF];

/// Fixed size of the payload header preceding `params`.
pub const PAYLOAD_HEADER_LEN: usize = 12;

/// `message_type` / `message_flags` only use the low nibble; the high nibble
/// must be zero on parse.
pub const NIBBLE_MASK: u8 = 0x0F;

/// UDP port the gateway binds and the one the cloud listens on.
pub const UDP_PORT: u16 = 9997;

/// Fixed vendor cloud endpoint.
pub const CLOUD_IP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(31, 193, 128, 139);

/// `seq` value reserved for unsolicited / device-originated responses; never
/// tracked in the Pending-Reply Table.
pub const SEQ_UNSOLICITED: u8 = 0xFF;

/// Highest `seq` value the Pending-Reply Table will track.
pub const SEQ_MAX_TRACKED: u8 = 0xFE;

/// Default resend interval for the Pending-Reply Table.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 2;

/// Default give-up window for the Pending-Reply Table.
pub const DEFAULT_GIVE_UP_SECS: u64 = 15;

/// Default per-device idle window before the Bridge marks a device offline.
pub const DEFAULT_DEVICE_ONLINE_TIMEOUT_SECS: u64 = 50;

/// Idle sleep between relay-loop iterations when nothing was ready.
pub const RELAY_IDLE_SLEEP_MS: u64 = 100;

/// Number of schedule profiles a device carries, selectable by `schedule_id`.
pub const SCHEDULE_COUNT: usize = 10;

/// Number of on/off windows packed into a single `GetScheduleInfoResponse`.
///
/// spec.md states both "six Schedule records" and "4 bytes each" for a total
/// of 76 bytes; neither arithmetic works out (6 records at the documented
/// 6-byte encoded size plus the 1-byte id and 50-byte name come to 87). The
/// original implementation's `GetScheduleInfoResponse` is authoritative here:
/// six 6-byte `Schedule` records.
pub const SCHEDULE_WINDOWS_PER_ID: usize = 6;

/// Default MQTT root topic.
pub const DEFAULT_MQTT_ROOT_TOPIC: &str = "timeguard";

/// Default MQTT client id.
pub const DEFAULT_MQTT_CLIENT_ID: &str = "timeguard";

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default Home Assistant discovery topic root, used when
/// `--homeassistant-discovery` is passed with no value.
pub const DEFAULT_HASS_DISCOVERY_ROOT: &str = "homeassistant";

/// Default Home Assistant status topic to watch for restart recovery.
pub const DEFAULT_HASS_STATUS_TOPIC: &str = "homeassistant/status";
