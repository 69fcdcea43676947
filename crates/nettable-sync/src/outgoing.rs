//! Outgoing merge buffer.
//!
//! Mutations queued between two flushes are coalesced so that at most one
//! assign/update and at most one flags-update per entry reach the wire,
//! turning O(updates) traffic per entry into O(1) per flush interval.
//!
//! Merging replaces the *content* of a pending slot but never its
//! position: a superseded slot is tombstoned (`None`) rather than
//! removed, so the relative order of surviving messages is exactly the
//! order their final representation was appended.
//!
//! This structure is pure and unsynchronized; [`crate::Connection`] wraps
//! it in a mutex and serializes `queue` against `take`.

use nettable_core::{EntryId, Message, MessageKind};

use crate::queue::Batch;

/// Pending-slot positions for one entry id. Zero means "no live slot";
/// otherwise the value is the buffer position plus one.
#[derive(Debug, Default, Clone, Copy)]
struct Slots {
    assign_or_update: usize,
    flags_update: usize,
}

/// Buffer of not-yet-flushed outgoing messages with per-entry coalescing.
#[derive(Debug, Default)]
pub struct OutgoingBuffer {
    pending: Vec<Option<Message>>,
    index: Vec<Slots>,
}

impl OutgoingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Add one message, merging it with pending messages where the
    /// protocol allows.
    ///
    /// Messages carrying the unassigned-id sentinel, and all
    /// non-mutation kinds, are appended verbatim and never merged.
    pub fn queue(&mut self, msg: Message) {
        match msg.kind() {
            MessageKind::EntryAssign | MessageKind::EntryUpdate => self.queue_value(msg),
            MessageKind::EntryDelete => self.queue_delete(msg),
            MessageKind::FlagsUpdate => self.queue_flags(msg),
            MessageKind::ClearEntries => self.queue_clear(msg),
            _ => self.pending.push(Some(msg)),
        }
    }

    /// Move out everything pending (tombstones included; they are
    /// filtered at encode time) and reset the indices.
    pub fn take(&mut self) -> Batch {
        self.index.clear();
        std::mem::take(&mut self.pending)
    }

    fn queue_value(&mut self, msg: Message) {
        let id = entry_id_of(&msg);
        if id.is_unassigned() {
            self.pending.push(Some(msg));
            return;
        }
        let idx = id.raw() as usize;
        if let Some(pos) = self.live_slot(idx, SlotKind::Value) {
            // overwrite the pending message for this id; a pending assign
            // overwritten by an update must stay an assign, because the
            // receiver has not yet learned this is a fresh entry
            let replacement = match (&self.pending[pos], &msg) {
                (
                    Some(Message::EntryAssign { name, flags, .. }),
                    Message::EntryUpdate { seq_num, value, .. },
                ) => Message::EntryAssign {
                    name: name.clone(),
                    id,
                    seq_num: *seq_num,
                    value: value.clone(),
                    flags: *flags,
                },
                _ => msg,
            };
            self.pending[pos] = Some(replacement);
        } else {
            let pos = self.pending.len();
            self.pending.push(Some(msg));
            self.record_slot(idx, SlotKind::Value, pos);
        }
    }

    fn queue_delete(&mut self, msg: Message) {
        let id = entry_id_of(&msg);
        if id.is_unassigned() {
            self.pending.push(Some(msg));
            return;
        }
        // a delete obsoletes everything pending for this id
        let idx = id.raw() as usize;
        if let Some(slots) = self.index.get_mut(idx) {
            if slots.assign_or_update != 0 {
                self.pending[slots.assign_or_update - 1] = None;
                slots.assign_or_update = 0;
            }
            if slots.flags_update != 0 {
                self.pending[slots.flags_update - 1] = None;
                slots.flags_update = 0;
            }
        }
        self.pending.push(Some(msg));
    }

    fn queue_flags(&mut self, msg: Message) {
        let id = entry_id_of(&msg);
        if id.is_unassigned() {
            self.pending.push(Some(msg));
            return;
        }
        let idx = id.raw() as usize;
        if let Some(pos) = self.live_slot(idx, SlotKind::Flags) {
            self.pending[pos] = Some(msg);
        } else {
            let pos = self.pending.len();
            self.pending.push(Some(msg));
            self.record_slot(idx, SlotKind::Flags, pos);
        }
    }

    fn queue_clear(&mut self, msg: Message) {
        // a clear dominates every mutation queued before it, for all ids
        for slot in &mut self.pending {
            if slot.as_ref().is_some_and(Message::is_mutation) {
                *slot = None;
            }
        }
        self.index.clear();
        self.pending.push(Some(msg));
    }

    fn live_slot(&self, idx: usize, kind: SlotKind) -> Option<usize> {
        let slots = self.index.get(idx)?;
        let pos = match kind {
            SlotKind::Value => slots.assign_or_update,
            SlotKind::Flags => slots.flags_update,
        };
        (pos != 0).then(|| pos - 1)
    }

    fn record_slot(&mut self, idx: usize, kind: SlotKind, pos: usize) {
        if idx >= self.index.len() {
            self.index.resize_with(idx + 1, Slots::default);
        }
        let slots = &mut self.index[idx];
        match kind {
            SlotKind::Value => slots.assign_or_update = pos + 1,
            SlotKind::Flags => slots.flags_update = pos + 1,
        }
    }
}

#[derive(Clone, Copy)]
enum SlotKind {
    Value,
    Flags,
}

// `entry_id` is always Some for the kinds dispatched to the helpers
// above; the sentinel fallback keeps them total without a panic path.
fn entry_id_of(msg: &Message) -> EntryId {
    msg.entry_id().unwrap_or(EntryId::UNASSIGNED)
}
