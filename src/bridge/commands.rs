//! Bus command topic/payload → protocol `Frame` translation.

use rand::Rng;
use thiserror::Error;

use crate::codec::bitfields::{AdvanceState, BoostKind, WorkMode};
use crate::codec::messages::{MessageFlags, MessageType, Params};
use crate::codec::{Frame, ParseError, Payload};
use crate::constants::SEQ_MAX_TRACKED;

/// Why a bus command couldn't be turned into a `Frame`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown entity {0:?}")]
    UnknownEntity(String),
    #[error("unrecognized payload {payload:?} for entity {entity:?}")]
    UnknownPayload { entity: String, payload: String },
    #[error("payload is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
    #[error(transparent)]
    Codec(#[from] ParseError),
}

/// `<root>/<device-hex>/<entity>/set` split into its device id and entity
/// name; `None` if `topic` doesn't match the pattern under `root`.
pub fn parse_command_topic(root: &str, topic: &str) -> Option<(u32, String)> {
    let rest = topic.strip_prefix(root)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let device_hex = parts.next()?;
    let entity = parts.next()?;
    if parts.next() != Some("set") || parts.next().is_some() {
        return None;
    }
    let device_id = u32::from_str_radix(device_hex, 16).ok()?;
    Some((device_id, entity.to_string()))
}

fn random_seq() -> u8 {
    rand::thread_rng().gen_range(0..=SEQ_MAX_TRACKED)
}

fn request(device_id: u32, message_type: MessageType, write: bool, params: Params) -> Frame {
    Frame {
        message_id: rand::thread_rng().gen(),
        payload: Payload {
            message_type,
            message_flags: MessageFlags::server(write),
            seq: random_seq(),
            unknown: [0, 0, 0],
            device_id,
            params,
        },
    }
}

/// Builds the frame(s) produced by one bus command. `active_schedule`
/// produces two: the set, then a get to resync.
pub fn build_frames(device_id: u32, entity: &str, payload: &str) -> Result<Vec<Frame>, CommandError> {
    match entity {
        "raw_command" => {
            let bytes = hex::decode(payload)?;
            let frame = Frame::parse(&bytes)?;
            Ok(vec![frame])
        }
        "boost" => {
            let boost_type = match payload {
                "Off" => BoostKind::Off,
                "1 hour" => BoostKind::OneHour,
                "2 hours" => BoostKind::TwoHours,
                _ => return Err(unknown_payload(entity, payload)),
            };
            Ok(vec![request(
                device_id,
                MessageType::Boost,
                true,
                Params::BoostRequest { boost_type },
            )])
        }
        "advance_mode" => {
            let mode = match payload {
                "ON" => AdvanceState::On,
                "OFF" => AdvanceState::Off,
                _ => return Err(unknown_payload(entity, payload)),
            };
            Ok(vec![request(
                device_id,
                MessageType::Advance,
                true,
                Params::AdvanceModeRequest { mode },
            )])
        }
        "work_mode" => {
            let work_mode = match payload {
                "Auto" => WorkMode::Auto,
                "Always off" => WorkMode::AlwaysOff,
                "Always on" => WorkMode::AlwaysOn,
                "Holiday" => WorkMode::Holiday,
                _ => return Err(unknown_payload(entity, payload)),
            };
            Ok(vec![request(
                device_id,
                MessageType::WorkMode,
                true,
                Params::SetWorkmodeRequest { work_mode },
            )])
        }
        "active_schedule" => {
            let schedule_id = parse_schedule_selection(payload)
                .ok_or_else(|| unknown_payload(entity, payload))?;
            let set = request(
                device_id,
                MessageType::ActiveSchedule,
                true,
                Params::SetCurrentScheduleRequest { schedule_id },
            );
            let get = request(
                device_id,
                MessageType::ActiveSchedule,
                false,
                Params::GetCurrentScheduleRequest,
            );
            Ok(vec![set, get])
        }
        other => Err(CommandError::UnknownEntity(other.to_string())),
    }
}

/// Parses `"#<n>: ..."`, `1 <= n <= 10`, into a 0-based `schedule_id`.
fn parse_schedule_selection(payload: &str) -> Option<u8> {
    let rest = payload.strip_prefix('#')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let n: u8 = digits.parse().ok()?;
    if (1..=10).contains(&n) {
        Some(n - 1)
    } else {
        None
    }
}

fn unknown_payload(entity: &str, payload: &str) -> CommandError {
    CommandError::UnknownPayload {
        entity: entity.to_string(),
        payload: payload.to_string(),
    }
}
