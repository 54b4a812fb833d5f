//! Crate-wide error handling.
//!
//! Reserved for unrecoverable startup/transport failures. Per-datagram and
//! per-bus-message failures are logged and dropped at the call site instead
//! of being propagated here (§7: never crash on remote input).

use thiserror::Error;

use crate::codec::ParseError;

/// Top-level error type returned from fallible setup paths.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Socket bind/configure failure.
    #[error("UDP socket error: {0}")]
    Socket(#[source] std::io::Error),

    /// MQTT client construction or connection failure.
    #[error("MQTT error: {0}")]
    Mqtt(#[source] rumqttc::ClientError),

    /// Frame codec failure surfaced during startup self-tests or CLI tooling
    /// (e.g. `--print-parsed-data` replay), as opposed to runtime datagrams.
    #[error("codec error: {0}")]
    Codec(#[from] ParseError),

    /// Malformed CLI configuration that `clap` itself didn't catch.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Generic I/O failure not covered above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
