//! Bit-packed sub-structures embedded in message params.
//!
//! `Boost` and `ScheduleTime` are two-byte groups whose underlying bytes are
//! swapped before their bitfields are extracted MSB-first; `DeviceState` is a
//! single byte whose *bits* are reversed before extraction (there is nothing
//! to byte-swap in one byte). All three are grouped here because they share
//! that "read backwards, then take fields MSB-first" shape.

use bitflags::bitflags;

use crate::codec::ParseError;

/// Reads fields MSB-first out of a fixed-width value, most-significant bits
/// first, narrowing as each field is consumed.
struct BitReader {
    value: u32,
    width: u32,
    pos: u32,
}

impl BitReader {
    fn new(value: u32, width: u32) -> Self {
        Self { value, width, pos: 0 }
    }

    fn take(&mut self, n: u32) -> u32 {
        let shift = self.width - self.pos - n;
        let mask = (1u32 << n) - 1;
        self.pos += n;
        (self.value >> shift) & mask
    }
}

/// Inverse of [`BitReader`]: accumulates fields MSB-first into a value of
/// the given bit width.
struct BitWriter {
    value: u32,
    width: u32,
    pos: u32,
}

impl BitWriter {
    fn new(width: u32) -> Self {
        Self { value: 0, width, pos: 0 }
    }

    fn put(&mut self, field: u32, n: u32) {
        let shift = self.width - self.pos - n;
        self.value |= (field & ((1u32 << n) - 1)) << shift;
        self.pos += n;
    }

    fn finish(self) -> u32 {
        self.value
    }
}

/// Boost duration selector, as carried in [`Boost::boost_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostKind {
    Off,
    OneHour,
    TwoHours,
    Unspecified,
}

impl BoostKind {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => BoostKind::Off,
            1 => BoostKind::OneHour,
            2 => BoostKind::TwoHours,
            _ => BoostKind::Unspecified,
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            BoostKind::Off => 0,
            BoostKind::OneHour => 1,
            BoostKind::TwoHours => 2,
            BoostKind::Unspecified => 3,
        }
    }

    fn duration_in_minutes(self) -> u32 {
        match self {
            BoostKind::OneHour => 60,
            BoostKind::TwoHours => 120,
            BoostKind::Off | BoostKind::Unspecified => 0,
        }
    }

    /// Parses the unpacked, single-byte form used by `BoostRequest`, as
    /// opposed to the 2-bit packed form inside [`Boost`].
    pub fn from_u8(byte: u8) -> Self {
        Self::from_bits(byte as u32)
    }

    pub fn to_u8(self) -> u8 {
        self.to_bits() as u8
    }
}

/// A device's boost window, in minutes since the most recent Sunday midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boost {
    pub boost_type: BoostKind,
    pub minutes_from_sunday: u32,
    pub duration_in_minutes: u32,
    pub expected_finish_time: u32,
}

impl Boost {
    /// Parses a byte-swapped, MSB-first-packed `{boost_type:2, minutes_from_sunday:14}`.
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let swapped = u16::from_be_bytes([bytes[1], bytes[0]]);
        let mut reader = BitReader::new(swapped as u32, 16);
        let boost_type = BoostKind::from_bits(reader.take(2));
        let minutes_from_sunday = reader.take(14);
        let duration_in_minutes = boost_type.duration_in_minutes();
        Boost {
            boost_type,
            minutes_from_sunday,
            duration_in_minutes,
            expected_finish_time: minutes_from_sunday + duration_in_minutes,
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        let mut writer = BitWriter::new(16);
        writer.put(self.boost_type.to_bits(), 2);
        writer.put(self.minutes_from_sunday, 14);
        let packed = writer.finish() as u16;
        let be = packed.to_be_bytes();
        [be[1], be[0]]
    }
}

/// Advance-mode toggle, independent of [`WorkMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceState {
    Off,
    On,
}

impl AdvanceState {
    fn from_bits(bits: u32) -> Self {
        if bits != 0 {
            AdvanceState::On
        } else {
            AdvanceState::Off
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            AdvanceState::Off => 0,
            AdvanceState::On => 1,
        }
    }
}

/// The switch's overall work mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    Auto,
    AlwaysOff,
    AlwaysOn,
    Holiday,
}

impl WorkMode {
    pub fn from_u8(byte: u8) -> Result<Self, ParseError> {
        match byte {
            0 => Ok(WorkMode::Auto),
            1 => Ok(WorkMode::AlwaysOff),
            2 => Ok(WorkMode::AlwaysOn),
            3 => Ok(WorkMode::Holiday),
            other => Err(ParseError::UnknownEnumValue {
                field: "work_mode",
                value: other as u32,
            }),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            WorkMode::Auto => 0,
            WorkMode::AlwaysOff => 1,
            WorkMode::AlwaysOn => 2,
            WorkMode::Holiday => 3,
        }
    }
}

/// Relay output state, as reported in [`DeviceState::switch_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Off,
    On,
}

impl SwitchState {
    fn from_bits(bits: u32) -> Result<Self, ParseError> {
        match bits {
            1 => Ok(SwitchState::Off),
            2 => Ok(SwitchState::On),
            other => Err(ParseError::UnknownEnumValue {
                field: "switch_state",
                value: other,
            }),
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            SwitchState::Off => 1,
            SwitchState::On => 2,
        }
    }
}

/// A device's instantaneous relay and load state, packed into a single byte
/// whose bits are reversed before MSB-first extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub switch_state: SwitchState,
    pub unknown1: u8,
    pub load_detected: bool,
    pub advance_mode_state: AdvanceState,
    pub load_was_detected_previously: bool,
    pub unknown2: u8,
}

impl DeviceState {
    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        let reversed = byte.reverse_bits();
        let mut reader = BitReader::new(reversed as u32, 8);
        let switch_state = SwitchState::from_bits(reader.take(2))?;
        let unknown1 = reader.take(1) as u8;
        let load_detected = reader.take(1) != 0;
        let advance_mode_state = AdvanceState::from_bits(reader.take(1));
        let load_was_detected_previously = reader.take(1) != 0;
        let unknown2 = reader.take(2) as u8;
        Ok(DeviceState {
            switch_state,
            unknown1,
            load_detected,
            advance_mode_state,
            load_was_detected_previously,
            unknown2,
        })
    }

    pub fn to_byte(self) -> u8 {
        let mut writer = BitWriter::new(8);
        writer.put(self.switch_state.to_bits(), 2);
        writer.put(self.unknown1 as u32, 1);
        writer.put(self.load_detected as u32, 1);
        writer.put(self.advance_mode_state.to_bits(), 1);
        writer.put(self.load_was_detected_previously as u32, 1);
        writer.put(self.unknown2 as u32, 2);
        (writer.finish() as u8).reverse_bits()
    }
}

/// One boundary of a `Schedule` window, byte-swapped before extraction like
/// [`Boost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub reserved: u8,
    pub is_enabled: bool,
    pub minutes_from_midnight: u16,
}

impl ScheduleTime {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let swapped = u16::from_be_bytes([bytes[1], bytes[0]]);
        let mut reader = BitReader::new(swapped as u32, 16);
        let reserved = reader.take(3) as u8;
        let is_enabled = reader.take(1) != 0;
        let minutes_from_midnight = reader.take(12) as u16;
        ScheduleTime {
            reserved,
            is_enabled,
            minutes_from_midnight,
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        let mut writer = BitWriter::new(16);
        writer.put(self.reserved as u32, 3);
        writer.put(self.is_enabled as u32, 1);
        writer.put(self.minutes_from_midnight as u32, 12);
        let packed = writer.finish() as u16;
        let be = packed.to_be_bytes();
        [be[1], be[0]]
    }
}

bitflags! {
    /// Days a schedule window repeats on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScheduleRepeat: u8 {
        const SUNDAY = 1;
        const MONDAY = 2;
        const TUESDAY = 4;
        const WEDNESDAY = 8;
        const THURSDAY = 16;
        const FRIDAY = 32;
        const SATURDAY = 64;
    }
}

/// One on/off window within a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub start: ScheduleTime,
    pub end: ScheduleTime,
    pub repeat: ScheduleRepeat,
    pub unknown: u8,
}

impl Schedule {
    pub const ENCODED_LEN: usize = 6;

    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(ParseError::TooShort {
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Schedule {
            start: ScheduleTime::from_bytes([bytes[0], bytes[1]]),
            end: ScheduleTime::from_bytes([bytes[2], bytes[3]]),
            repeat: ScheduleRepeat::from_bits_truncate(bytes[4]),
            unknown: bytes[5],
        })
    }

    pub fn build(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.start.to_bytes());
        out.extend_from_slice(&self.end.to_bytes());
        out.push(self.repeat.bits());
        out.push(self.unknown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_state_round_trips() {
        let state = DeviceState {
            switch_state: SwitchState::On,
            unknown1: 1,
            load_detected: true,
            advance_mode_state: AdvanceState::On,
            load_was_detected_previously: false,
            unknown2: 3,
        };
        let byte = state.to_byte();
        let parsed = DeviceState::from_byte(byte).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn boost_duration_follows_type() {
        let bytes = Boost {
            boost_type: BoostKind::OneHour,
            minutes_from_sunday: 1000,
            duration_in_minutes: 0,
            expected_finish_time: 0,
        }
        .to_bytes();
        let parsed = Boost::from_bytes(bytes);
        assert_eq!(parsed.boost_type, BoostKind::OneHour);
        assert_eq!(parsed.minutes_from_sunday, 1000);
        assert_eq!(parsed.duration_in_minutes, 60);
        assert_eq!(parsed.expected_finish_time, 1060);
    }

    #[test]
    fn schedule_time_round_trips() {
        let st = ScheduleTime {
            reserved: 0,
            is_enabled: true,
            minutes_from_midnight: 1439,
        };
        let bytes = st.to_bytes();
        assert_eq!(ScheduleTime::from_bytes(bytes), st);
    }

    #[test]
    fn schedule_round_trips() {
        let sched = Schedule {
            start: ScheduleTime {
                reserved: 0,
                is_enabled: true,
                minutes_from_midnight: 360,
            },
            end: ScheduleTime {
                reserved: 0,
                is_enabled: true,
                minutes_from_midnight: 1020,
            },
            repeat: ScheduleRepeat::MONDAY | ScheduleRepeat::TUESDAY,
            unknown: 0,
        };
        let mut buf = Vec::new();
        sched.build(&mut buf);
        assert_eq!(buf.len(), Schedule::ENCODED_LEN);
        assert_eq!(Schedule::parse(&buf).unwrap(), sched);
    }
}
