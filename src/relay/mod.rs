//! Relay Engine: the UDP-facing half of the gateway.
//!
//! Owns the single UDP socket, the [`registry::DeviceRegistry`] mapping
//! device ids to source addresses, and the [`pending::PendingReplyTable`]
//! tracking server-originated commands awaiting acknowledgment. Talks to the
//! Bridge over a pair of `tokio::sync::mpsc` channels carrying parsed
//! [`crate::codec::Frame`]s.

pub mod engine;
pub mod mode;
pub mod pending;
pub mod registry;

pub use engine::{InboundEvent, OutboundCommand, RelayEngine};
pub use mode::{Decision, Direction};
pub use pending::{EnqueueError, PendingReplyTable};
pub use registry::DeviceRegistry;
