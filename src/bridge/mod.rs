//! Bridge: the bus-facing half of the gateway. Owns per-device state,
//! Home Assistant discovery payloads, and translation between parsed
//! protocol events and the MQTT topic tree.

pub mod commands;
pub mod discovery;
pub mod engine;
pub mod state;

pub use engine::{Bridge, BridgeConfig};
pub use state::{BridgeStore, DeviceState};
