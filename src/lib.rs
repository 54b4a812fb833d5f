//! # timeguard-gateway
//!
//! A protocol-aware intercepting UDP gateway bridging Timeguard electrical
//! time-switch devices to an MQTT/Home-Assistant topic tree.
//!
//! The crate splits along the same lines as the system it implements:
//!
//! - [`codec`] parses and builds the device's binary wire protocol.
//! - [`relay`] owns the UDP socket, the Device Registry, and the
//!   Pending-Reply Table, and applies the `relay`/`fallback`/`local` mode
//!   policy to every frame it sees.
//! - [`bridge`] owns the MQTT client and per-device state, translating
//!   parsed protocol events into bus publications and bus commands into
//!   protocol frames.
//!
//! The Relay Engine and the Bridge run as independent `tokio` tasks
//! connected by two channels; neither owns the other's state.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod relay;

pub use bridge::{Bridge, BridgeConfig};
pub use codec::{Frame, ParseError};
pub use config::{Cli, Mode, PendingReplyConfig};
pub use error::GatewayError;
pub use logging::{init_logger, log_debug, log_error, log_info, log_warn};
pub use relay::{RelayEngine, RelayEngineConfig};
