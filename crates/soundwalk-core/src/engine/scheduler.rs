//! Sample-accurate event scheduling
//!
//! Start/stop events carry an absolute sample time. At the top of every
//! block the engine extracts the events falling inside the block and
//! renders in segments split exactly at their offsets, so a start at
//! sample N is audible at sample N regardless of block size.

use super::track::LoopConfig;

/// What a scheduled event does when it fires
pub enum EventKind {
    Start {
        /// Playback offset into the asset, in engine-rate samples
        offset: u64,
        loop_cfg: Option<LoopConfig>,
    },
    Stop,
}

/// An event waiting to fire
pub struct ScheduledEvent {
    pub kind: EventKind,
    /// Absolute engine sample time
    pub when: u64,
    pub track_id: String,
    /// Assignment order, giving FIFO tie-break at equal `when`
    pub seq: u64,
}

/// Pending event queue, drained block by block
///
/// Insertion happens during the command phase (allocation is fine there);
/// extraction is in place and allocation-free given the scratch vector's
/// pre-allocated capacity.
#[derive(Default)]
pub struct EventScheduler {
    pending: Vec<ScheduledEvent>,
    next_seq: u64,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event at an absolute sample time
    pub fn schedule(&mut self, track_id: String, when: u64, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(ScheduledEvent {
            kind,
            when,
            track_id,
            seq,
        });
    }

    /// Move the events with `when < end` into `out`, ordered by `(when, seq)`
    ///
    /// Events already in the past are clamped to `start` so they fire at
    /// the top of the current block instead of leaking.
    pub fn extract_block(&mut self, start: u64, end: u64, out: &mut Vec<ScheduledEvent>) {
        out.clear();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].when < end {
                let mut event = self.pending.swap_remove(i);
                if event.when < start {
                    event.when = start;
                }
                out.push(event);
            } else {
                i += 1;
            }
        }
        out.sort_unstable_by(|a, b| (a.when, a.seq).cmp(&(b.when, b.seq)));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
