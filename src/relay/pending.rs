//! Pending-Reply Table: at-least-once delivery of server-originated commands.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::codec::Frame;
use crate::config::PendingReplyConfig;
use crate::constants::SEQ_MAX_TRACKED;

struct Entry {
    queued_at: Instant,
    resend_at: Instant,
    frame: Frame,
}

/// Tracks in-flight server→device commands, keyed by `seq`, so they can be
/// resent until acknowledged or given up on.
///
/// `seq = 0xFF` is the unsolicited sentinel and is never tracked here; valid
/// tracked seqs are `0..=0xFE`, bounding the table at 0xFE (254) entries.
pub struct PendingReplyTable {
    entries: HashMap<u8, Entry>,
    config: PendingReplyConfig,
}

/// Why [`PendingReplyTable::enqueue`] could not admit a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// All `0..=0xFE` seqs are occupied.
    TableFull,
}

impl PendingReplyTable {
    pub fn new(config: PendingReplyConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `frame` under its `payload.seq`, rotating to `(seq+1) % 255`
    /// on collision until a free slot is found. Mutates `frame.payload.seq`
    /// in place to match the slot actually used, so the caller sends the
    /// frame with the seq the table is tracking it under.
    ///
    /// The `% 255` rotation means seq 254 wraps to 0, not to the reserved
    /// 0xFF sentinel; whether that was intentional upstream is undocumented,
    /// but the behavior is preserved rather than "fixed".
    pub fn enqueue(&mut self, mut frame: Frame, now: Instant) -> Result<u8, EnqueueError> {
        if self.entries.len() >= SEQ_MAX_TRACKED as usize {
            return Err(EnqueueError::TableFull);
        }

        let mut seq = frame.payload.seq;
        let start = seq;
        loop {
            match self.entries.get(&seq) {
                None => break,
                Some(existing) if existing.frame == frame => break,
                Some(_) => {
                    seq = ((seq as u16 + 1) % 255) as u8;
                    if seq == start {
                        return Err(EnqueueError::TableFull);
                    }
                }
            }
        }

        frame.payload.seq = seq;
        self.entries.insert(
            seq,
            Entry {
                queued_at: now,
                resend_at: now + self.config.retry_interval,
                frame,
            },
        );
        Ok(seq)
    }

    /// Removes the entry for `seq`, if any. Any client-originated frame
    /// carrying `seq` is treated as an acknowledgment.
    pub fn on_client_reply(&mut self, seq: u8) {
        self.entries.remove(&seq);
    }

    /// Returns frames due for resend, advancing their `resend_at`, and drops
    /// entries that have exceeded the give-up window.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let give_up = self.config.give_up;
        let retry_interval = self.config.retry_interval;
        let mut due = Vec::new();

        self.entries.retain(|_, entry| {
            if entry.resend_at > now {
                return true;
            }
            entry.resend_at = now + retry_interval;
            if entry.resend_at.duration_since(entry.queued_at) > give_up {
                return false;
            }
            due.push(entry.frame.clone());
            true
        });

        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::messages::{MessageFlags, MessageType, Params, Payload};

    fn frame(seq: u8) -> Frame {
        Frame {
            message_id: 0,
            payload: Payload {
                message_type: MessageType::Advance,
                message_flags: MessageFlags::server(true),
                seq,
                unknown: [0, 0, 0],
                device_id: 1,
                params: Params::AdvanceModeRequest {
                    mode: crate::codec::bitfields::AdvanceState::On,
                },
            },
        }
    }

    #[test]
    fn enqueue_and_lookup() {
        let mut table = PendingReplyTable::new(PendingReplyConfig::default());
        let now = Instant::now();
        let seq = table.enqueue(frame(7), now).unwrap();
        assert_eq!(seq, 7);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reply_clears_entry() {
        let mut table = PendingReplyTable::new(PendingReplyConfig::default());
        let now = Instant::now();
        table.enqueue(frame(7), now).unwrap();
        table.on_client_reply(7);
        assert!(table.is_empty());
    }

    #[test]
    fn collision_rotates_seq() {
        let mut table = PendingReplyTable::new(PendingReplyConfig::default());
        let now = Instant::now();
        let first = table.enqueue(frame(10), now).unwrap();
        let second = table.enqueue(frame(10), now).unwrap();
        assert_eq!(first, 10);
        assert_eq!(second, 11);
    }

    #[test]
    fn tick_resends_and_gives_up() {
        let mut config = PendingReplyConfig::default();
        config.retry_interval = Duration::from_secs(2);
        config.give_up = Duration::from_secs(5);
        let mut table = PendingReplyTable::new(config);
        let t0 = Instant::now();
        table.enqueue(frame(1), t0).unwrap();

        let due = table.tick(t0 + Duration::from_secs(2));
        assert_eq!(due.len(), 1);

        let due = table.tick(t0 + Duration::from_secs(10));
        assert!(due.is_empty());
        assert!(table.is_empty());
    }
}
