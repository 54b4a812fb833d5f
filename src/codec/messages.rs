//! Payload header, message type/flags, and the per-type `params` bodies.

use bitflags::bitflags;

use crate::codec::bitfields::{AdvanceState, Boost, BoostKind, DeviceState, Schedule, WorkMode};
use crate::codec::ParseError;
use crate::constants::{NIBBLE_MASK, PAYLOAD_HEADER_LEN, SCHEDULE_WINDOWS_PER_ID};

/// The low nibble of the first payload byte. Values 1, 3, 4, 6 and 7 are
/// observed on the wire but their purpose is undocumented upstream; they are
/// kept distinct (not collapsed) so a capture can be replayed byte-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ping,
    Unknown1,
    CodeVersion,
    Unknown2,
    Unknown3,
    Schedule,
    Unknown4,
    Unknown5,
    WorkMode,
    Holiday,
    UpdateScheduleName,
    ActiveSchedule,
    Advance,
    Boost,
    /// Nibble value outside the 0-13 range the protocol is known to use.
    Other(u8),
}

impl MessageType {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0 => MessageType::Ping,
            1 => MessageType::Unknown1,
            2 => MessageType::CodeVersion,
            3 => MessageType::Unknown2,
            4 => MessageType::Unknown3,
            5 => MessageType::Schedule,
            6 => MessageType::Unknown4,
            7 => MessageType::Unknown5,
            8 => MessageType::WorkMode,
            9 => MessageType::Holiday,
            10 => MessageType::UpdateScheduleName,
            11 => MessageType::ActiveSchedule,
            12 => MessageType::Advance,
            13 => MessageType::Boost,
            other => MessageType::Other(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            MessageType::Ping => 0,
            MessageType::Unknown1 => 1,
            MessageType::CodeVersion => 2,
            MessageType::Unknown2 => 3,
            MessageType::Unknown3 => 4,
            MessageType::Schedule => 5,
            MessageType::Unknown4 => 6,
            MessageType::Unknown5 => 7,
            MessageType::WorkMode => 8,
            MessageType::Holiday => 9,
            MessageType::UpdateScheduleName => 10,
            MessageType::ActiveSchedule => 11,
            MessageType::Advance => 12,
            MessageType::Boost => 13,
            MessageType::Other(n) => n,
        }
    }
}

bitflags! {
    /// Flags carried in the payload's second byte. The high nibble of that
    /// byte is reserved and must be zero; only these four bits are defined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MessageFlags: u8 {
        const IS_SUCCESS = 1;
        const IS_UPDATE_REQUEST = 2;
        const UNKNOWN1 = 4;
        const IS_FROM_SERVER = 8;
    }
}

impl MessageFlags {
    /// Flags for a server-originated message: every server message carries
    /// `IS_FROM_SERVER | UNKNOWN1`, and a write (as opposed to a query) also
    /// sets `IS_UPDATE_REQUEST`.
    pub fn server(write: bool) -> Self {
        let base = MessageFlags::IS_FROM_SERVER | MessageFlags::UNKNOWN1;
        if write {
            base | MessageFlags::IS_UPDATE_REQUEST
        } else {
            base
        }
    }
}

/// `message_type | (message_flags << 4)`, the key used to pick a `params`
/// shape. Both operands are nibble-restricted so this always fits a byte.
pub fn message_type_id(message_type: MessageType, flags: MessageFlags) -> u8 {
    message_type.to_nibble() | (flags.bits() << 4)
}

fn parse_padded_str(bytes: &[u8], field: &'static str) -> Result<String, ParseError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|_| ParseError::InvalidUtf8 { field })
}

fn build_padded_str(value: &str, len: usize) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.truncate(len);
    bytes.resize(len, 0);
    bytes
}

fn require_len(bytes: &[u8], expected: usize) -> Result<(), ParseError> {
    if bytes.len() < expected {
        Err(ParseError::TooShort {
            expected,
            actual: bytes.len(),
        })
    } else {
        Ok(())
    }
}

/// Epoch-seconds timestamp, as carried by `PingResponse` and the holiday
/// window fields. Kept as a raw `u32`; callers convert to `chrono` types at
/// the point of use (state formatting, discovery payloads) rather than here.
pub type Timestamp = u32;

/// One schedule profile: six on/off windows plus a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub schedule_id: u8,
    pub windows: Vec<Schedule>,
    pub name: String,
}

impl ScheduleInfo {
    const NAME_LEN: usize = 50;

    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        require_len(bytes, 1)?;
        let schedule_id = bytes[0];
        let mut offset = 1;
        let mut windows = Vec::with_capacity(SCHEDULE_WINDOWS_PER_ID);
        for _ in 0..SCHEDULE_WINDOWS_PER_ID {
            require_len(&bytes[offset..], Schedule::ENCODED_LEN)?;
            windows.push(Schedule::parse(&bytes[offset..offset + Schedule::ENCODED_LEN])?);
            offset += Schedule::ENCODED_LEN;
        }
        require_len(&bytes[offset..], Self::NAME_LEN)?;
        let name = parse_padded_str(&bytes[offset..offset + Self::NAME_LEN], "name")?;
        Ok(ScheduleInfo {
            schedule_id,
            windows,
            name,
        })
    }

    fn build(&self, out: &mut Vec<u8>) {
        out.push(self.schedule_id);
        for window in &self.windows {
            window.build(out);
        }
        out.extend(build_padded_str(&self.name, Self::NAME_LEN));
    }
}

/// Holiday window: an active flag plus an end/start epoch-second pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolidaySettings {
    pub is_active: bool,
    pub unknown: [u8; 3],
    pub end: Timestamp,
    pub start: Timestamp,
}

impl HolidaySettings {
    const ENCODED_LEN: usize = 12;

    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        require_len(bytes, Self::ENCODED_LEN)?;
        Ok(HolidaySettings {
            is_active: bytes[0] != 0,
            unknown: [bytes[1], bytes[2], bytes[3]],
            end: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            start: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }

    fn build(&self, out: &mut Vec<u8>) {
        out.push(self.is_active as u8);
        out.extend_from_slice(&self.unknown);
        out.extend_from_slice(&self.end.to_le_bytes());
        out.extend_from_slice(&self.start.to_le_bytes());
    }
}

/// A device's ping heartbeat: its current state plus uptime and boost info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequestBody {
    pub state: DeviceState,
    pub unknown2: [u8; 3],
    pub work_mode: WorkMode,
    pub unknown3: [u8; 3],
    pub uptime: u32,
    pub boost: Boost,
    pub unknown4: u16,
}

impl PingRequestBody {
    const ENCODED_LEN: usize = 1 + 3 + 1 + 3 + 4 + 2 + 2;

    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        require_len(bytes, Self::ENCODED_LEN)?;
        Ok(PingRequestBody {
            state: DeviceState::from_byte(bytes[0])?,
            unknown2: [bytes[1], bytes[2], bytes[3]],
            work_mode: WorkMode::from_u8(bytes[4])?,
            unknown3: [bytes[5], bytes[6], bytes[7]],
            uptime: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            boost: Boost::from_bytes([bytes[12], bytes[13]]),
            unknown4: u16::from_le_bytes(bytes[14..16].try_into().unwrap()),
        })
    }

    fn build(&self, out: &mut Vec<u8>) {
        out.push(self.state.to_byte());
        out.extend_from_slice(&self.unknown2);
        out.push(self.work_mode.to_u8());
        out.extend_from_slice(&self.unknown3);
        out.extend_from_slice(&self.uptime.to_le_bytes());
        out.extend_from_slice(&self.boost.to_bytes());
        out.extend_from_slice(&self.unknown4.to_le_bytes());
    }
}

/// Message-type-specific body. Unrecognized `message_type_id`s are kept as
/// raw bytes rather than rejected, since vendor firmware revisions are known
/// to introduce new ids the gateway should still relay untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    ReportCodeVersionRequest { code_version: String },
    ReportCodeVersionResponse { code_version: String },
    GetCodeVersionRequest,
    GetCodeVersionResponse { code_version: String },

    PingRequest(PingRequestBody),
    PingResponse { now: Timestamp },

    BoostRequest { boost_type: BoostKind },
    BoostResponse { expected_finish_time: Boost, boost_start_config: Boost },

    AdvanceModeRequest { mode: AdvanceState },
    AdvanceModeResponse { mode: AdvanceState },

    SetWorkmodeRequest { work_mode: WorkMode },
    SetWorkmodeResponse { work_mode: WorkMode },

    SetHolidayRequest(HolidaySettings),
    SetHolidayResponse(HolidaySettings),
    GetHolidaySettingsRequest,
    GetHolidaySettingsResponse(HolidaySettings),

    GetCurrentScheduleRequest,
    GetCurrentScheduleResponse { schedule_id: u8 },
    SetCurrentScheduleRequest { schedule_id: u8 },
    SetCurrentScheduleResponse { schedule_id: u8 },

    SetScheduleNameRequest { schedule_id: u8, name: String },
    SetScheduleNameResponse { schedule_id: u8 },

    GetScheduleInfoRequest { schedule_id: u8 },
    GetScheduleInfoResponse(ScheduleInfo),
    SetScheduleInfoRequest(ScheduleInfo),
    SetScheduleInfoResponse(ScheduleInfo),

    /// Raw bytes for any `message_type_id` not named above.
    Unknown(Vec<u8>),
}

impl Params {
    pub fn parse(type_id: u8, bytes: &[u8]) -> Result<Self, ParseError> {
        use Params::*;
        Ok(match type_id {
            98 => ReportCodeVersionRequest {
                code_version: parse_padded_str(
                    require_slice(bytes, 13)?,
                    "code_version",
                )?,
            },
            178 => ReportCodeVersionResponse {
                code_version: parse_padded_str(require_slice(bytes, 13)?, "code_version")?,
            },
            194 => GetCodeVersionRequest,
            82 => GetCodeVersionResponse {
                code_version: parse_padded_str(require_slice(bytes, 13)?, "code_version")?,
            },

            96 => PingRequest(PingRequestBody::parse(bytes)?),
            240 => {
                require_len(bytes, 4)?;
                PingResponse {
                    now: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
                }
            }

            237 => {
                require_len(bytes, 1)?;
                BoostRequest {
                    boost_type: BoostKind::from_u8(bytes[0]),
                }
            }
            125 => {
                require_len(bytes, 4)?;
                BoostResponse {
                    expected_finish_time: Boost::from_bytes([bytes[0], bytes[1]]),
                    boost_start_config: Boost::from_bytes([bytes[2], bytes[3]]),
                }
            }

            236 => {
                require_len(bytes, 1)?;
                AdvanceModeRequest {
                    mode: parse_advance_state(bytes[0]),
                }
            }
            124 => {
                require_len(bytes, 1)?;
                AdvanceModeResponse {
                    mode: parse_advance_state(bytes[0]),
                }
            }

            232 => {
                require_len(bytes, 1)?;
                SetWorkmodeRequest {
                    work_mode: WorkMode::from_u8(bytes[0])?,
                }
            }
            120 => {
                require_len(bytes, 1)?;
                SetWorkmodeResponse {
                    work_mode: WorkMode::from_u8(bytes[0])?,
                }
            }

            233 => SetHolidayRequest(HolidaySettings::parse(bytes)?),
            121 => SetHolidayResponse(HolidaySettings::parse(bytes)?),
            201 => GetHolidaySettingsRequest,
            89 => GetHolidaySettingsResponse(HolidaySettings::parse(bytes)?),

            203 => GetCurrentScheduleRequest,
            91 => {
                require_len(bytes, 1)?;
                GetCurrentScheduleResponse {
                    schedule_id: bytes[0],
                }
            }
            235 => {
                require_len(bytes, 1)?;
                SetCurrentScheduleRequest {
                    schedule_id: bytes[0],
                }
            }
            123 => {
                require_len(bytes, 1)?;
                SetCurrentScheduleResponse {
                    schedule_id: bytes[0],
                }
            }

            234 => {
                require_len(bytes, 1)?;
                SetScheduleNameRequest {
                    schedule_id: bytes[0],
                    name: parse_padded_str(require_slice(&bytes[1..], 50)?, "name")?,
                }
            }
            122 => {
                require_len(bytes, 1)?;
                SetScheduleNameResponse {
                    schedule_id: bytes[0],
                }
            }

            197 => {
                require_len(bytes, 1)?;
                GetScheduleInfoRequest {
                    schedule_id: bytes[0],
                }
            }
            85 => GetScheduleInfoResponse(ScheduleInfo::parse(bytes)?),
            229 => SetScheduleInfoRequest(ScheduleInfo::parse(bytes)?),
            117 => SetScheduleInfoResponse(ScheduleInfo::parse(bytes)?),

            _ => Unknown(bytes.to_vec()),
        })
    }

    pub fn build(&self) -> Vec<u8> {
        use Params::*;
        let mut out = Vec::new();
        match self {
            ReportCodeVersionRequest { code_version }
            | ReportCodeVersionResponse { code_version }
            | GetCodeVersionResponse { code_version } => {
                out.extend(build_padded_str(code_version, 13));
            }
            GetCodeVersionRequest => {}

            PingRequest(req) => req.build(&mut out),
            PingResponse { now } => out.extend_from_slice(&now.to_le_bytes()),

            BoostRequest { boost_type } => out.push(boost_type.to_u8()),
            BoostResponse {
                expected_finish_time,
                boost_start_config,
            } => {
                out.extend_from_slice(&expected_finish_time.to_bytes());
                out.extend_from_slice(&boost_start_config.to_bytes());
            }

            AdvanceModeRequest { mode } | AdvanceModeResponse { mode } => {
                out.push(build_advance_state(*mode));
            }

            SetWorkmodeRequest { work_mode } | SetWorkmodeResponse { work_mode } => {
                out.push(work_mode.to_u8());
            }

            SetHolidayRequest(settings)
            | SetHolidayResponse(settings)
            | GetHolidaySettingsResponse(settings) => settings.build(&mut out),
            GetHolidaySettingsRequest => {}

            GetCurrentScheduleRequest => {}
            GetCurrentScheduleResponse { schedule_id }
            | SetCurrentScheduleRequest { schedule_id }
            | SetCurrentScheduleResponse { schedule_id }
            | SetScheduleNameResponse { schedule_id }
            | GetScheduleInfoRequest { schedule_id } => out.push(*schedule_id),

            SetScheduleNameRequest { schedule_id, name } => {
                out.push(*schedule_id);
                out.extend(build_padded_str(name, 50));
            }

            GetScheduleInfoResponse(info)
            | SetScheduleInfoRequest(info)
            | SetScheduleInfoResponse(info) => info.build(&mut out),

            Unknown(bytes) => out.extend_from_slice(bytes),
        }
        out
    }
}

fn require_slice(bytes: &[u8], len: usize) -> Result<&[u8], ParseError> {
    if bytes.len() < len {
        Err(ParseError::TooShort {
            expected: len,
            actual: bytes.len(),
        })
    } else {
        Ok(&bytes[..len])
    }
}

/// Only the LSB is meaningful; the remaining 7 reserved bits are ignored on
/// parse (some firmware revisions echo garbage there) and always built as 0.
fn parse_advance_state(byte: u8) -> AdvanceState {
    if byte & 1 != 0 {
        AdvanceState::On
    } else {
        AdvanceState::Off
    }
}

fn build_advance_state(state: AdvanceState) -> u8 {
    match state {
        AdvanceState::Off => 0,
        AdvanceState::On => 1,
    }
}

/// Fixed 12-byte header followed by the type-dependent `params` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub message_type: MessageType,
    pub message_flags: MessageFlags,
    pub seq: u8,
    pub unknown: [u8; 3],
    pub device_id: u32,
    pub params: Params,
}

impl Payload {
    pub fn message_type_id(&self) -> u8 {
        message_type_id(self.message_type, self.message_flags)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        require_len(bytes, PAYLOAD_HEADER_LEN)?;

        let type_byte = bytes[0];
        if type_byte & !NIBBLE_MASK != 0 {
            return Err(ParseError::ReservedNibbleSet(type_byte));
        }
        let flags_byte = bytes[1];
        if flags_byte & !NIBBLE_MASK != 0 {
            return Err(ParseError::ReservedNibbleSet(flags_byte));
        }

        let message_type = MessageType::from_nibble(type_byte);
        let message_flags = MessageFlags::from_bits_truncate(flags_byte);

        let params_size = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let seq = bytes[4];
        let unknown = [bytes[5], bytes[6], bytes[7]];
        let device_id = u32::from_le_bytes(bytes[8..12].try_into().unwrap());

        let params_bytes = &bytes[PAYLOAD_HEADER_LEN..];
        if params_bytes.len() < params_size {
            return Err(ParseError::TooShort {
                expected: PAYLOAD_HEADER_LEN + params_size,
                actual: bytes.len(),
            });
        }
        let type_id = message_type_id(message_type, message_flags);
        let params = Params::parse(type_id, &params_bytes[..params_size])?;

        Ok(Payload {
            message_type,
            message_flags,
            seq,
            unknown,
            device_id,
            params,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let params = self.params.build();
        let mut out = Vec::with_capacity(PAYLOAD_HEADER_LEN + params.len());
        out.push(self.message_type.to_nibble());
        out.push(self.message_flags.bits());
        out.extend_from_slice(&(params.len() as u16).to_le_bytes());
        out.push(self.seq);
        out.extend_from_slice(&self.unknown);
        out.extend_from_slice(&self.device_id.to_le_bytes());
        out.extend_from_slice(&params);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload(params: Params, message_type: MessageType, flags: MessageFlags) -> Payload {
        Payload {
            message_type,
            message_flags: flags,
            seq: 0x2A,
            unknown: [0, 0, 0],
            device_id: 0xdead_beef,
            params,
        }
    }

    #[test]
    fn ping_response_round_trips() {
        let payload = sample_payload(
            Params::PingResponse { now: 1_700_000_000 },
            MessageType::Ping,
            MessageFlags::server(false),
        );
        let bytes = payload.build();
        let parsed = Payload::parse(&bytes).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn unknown_type_id_round_trips_as_raw_bytes() {
        let payload = Payload {
            message_type: MessageType::Other(15),
            message_flags: MessageFlags::from_bits_truncate(0b1111),
            seq: 0xFF,
            unknown: [1, 2, 3],
            device_id: 1,
            params: Params::Unknown(vec![0xAA, 0xBB, 0xCC]),
        };
        let bytes = payload.build();
        let parsed = Payload::parse(&bytes).unwrap();
        assert_eq!(parsed.params, Params::Unknown(vec![0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn reserved_nibble_rejected() {
        let mut bytes = sample_payload(
            Params::GetCodeVersionRequest,
            MessageType::CodeVersion,
            MessageFlags::server(false),
        )
        .build();
        bytes[0] |= 0x80;
        assert!(matches!(
            Payload::parse(&bytes),
            Err(ParseError::ReservedNibbleSet(_))
        ));
    }

    #[test]
    fn code_version_strips_padding() {
        let payload = sample_payload(
            Params::ReportCodeVersionRequest {
                code_version: "1.2.3".to_string(),
            },
            MessageType::CodeVersion,
            MessageFlags::UNKNOWN1 | MessageFlags::IS_UPDATE_REQUEST,
        );
        let bytes = payload.build();
        let parsed = Payload::parse(&bytes).unwrap();
        match parsed.params {
            Params::ReportCodeVersionRequest { code_version } => {
                assert_eq!(code_version, "1.2.3");
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }
}
