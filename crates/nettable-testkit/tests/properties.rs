//! Property tests over generated protocol data.

use std::collections::HashMap;
use std::io::Cursor;

use proptest::prelude::*;

use nettable_core::{
    EntryId, EntryType, Message, MessageKind, WireDecoder, WireEncoder, PROTO_REV_3,
};
use nettable_sync::OutgoingBuffer;
use nettable_testkit::generators;

fn no_resolver(_kind: MessageKind, _id: EntryId) -> Option<EntryType> {
    None
}

proptest! {
    /// Encoding a batch and decoding it at the same revision yields the
    /// original messages.
    #[test]
    fn prop_rev3_batch_round_trips(msgs in prop::collection::vec(generators::message(), 1..16)) {
        let mut enc = WireEncoder::new(PROTO_REV_3);
        for msg in &msgs {
            enc.write_message(msg).unwrap();
        }
        let mut dec = WireDecoder::new(Cursor::new(enc.data().to_vec()), PROTO_REV_3);
        let mut decoded = Vec::new();
        while let Some(msg) = dec.read_message(&no_resolver).unwrap() {
            decoded.push(msg);
        }
        prop_assert_eq!(decoded, msgs);
    }

    /// However mutations interleave, a flushed batch never carries more
    /// than one assign/update and one flags-update per entry id.
    #[test]
    fn prop_merge_buffer_bounds_per_id_traffic(
        msgs in prop::collection::vec(generators::mutation(), 0..64)
    ) {
        let mut buf = OutgoingBuffer::new();
        for msg in msgs {
            buf.queue(msg);
        }
        let batch = buf.take();

        let mut value_slots: HashMap<EntryId, usize> = HashMap::new();
        let mut flags_slots: HashMap<EntryId, usize> = HashMap::new();
        for msg in batch.iter().flatten() {
            let Some(id) = msg.entry_id() else { continue };
            if id.is_unassigned() {
                continue;
            }
            match msg.kind() {
                MessageKind::EntryAssign | MessageKind::EntryUpdate => {
                    *value_slots.entry(id).or_default() += 1;
                }
                MessageKind::FlagsUpdate => {
                    *flags_slots.entry(id).or_default() += 1;
                }
                _ => {}
            }
        }
        prop_assert!(value_slots.values().all(|&n| n <= 1));
        prop_assert!(flags_slots.values().all(|&n| n <= 1));
    }

    /// Nothing pending survives a clear except the clear itself and
    /// whatever was queued after it.
    #[test]
    fn prop_clear_is_a_barrier(
        before in prop::collection::vec(generators::mutation(), 0..32),
        after in prop::collection::vec(generators::mutation(), 0..8)
    ) {
        let mut buf = OutgoingBuffer::new();
        for msg in before {
            buf.queue(msg);
        }
        buf.queue(Message::ClearEntries);
        let after_len = after.len();
        for msg in after {
            buf.queue(msg);
        }
        let batch = buf.take();

        let live: Vec<_> = batch.iter().flatten().collect();
        let clear_pos = live
            .iter()
            .position(|m| m.kind() == MessageKind::ClearEntries)
            .expect("the clear itself must survive");
        prop_assert_eq!(clear_pos, 0, "no mutation queued before the clear may survive it");
        // post-clear mutations may still merge among themselves, never away
        prop_assert!(live.len() - 1 <= after_len);
    }
}
