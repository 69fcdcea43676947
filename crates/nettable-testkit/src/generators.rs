//! Proptest generators for protocol data.

use bytes::Bytes;
use proptest::prelude::*;

use nettable_core::{EntryId, Message, SeqNum, Value};

/// Generate an assigned (non-sentinel) entry id.
pub fn entry_id() -> impl Strategy<Value = EntryId> {
    (0u16..0xFFFF).prop_map(EntryId::from_raw)
}

/// Generate any sequence number.
pub fn seq_num() -> impl Strategy<Value = SeqNum> {
    any::<u16>().prop_map(SeqNum::from_raw)
}

/// Generate an entry name in the conventional slash-rooted form.
pub fn entry_name() -> impl Strategy<Value = String> {
    "/[a-zA-Z0-9_/]{1,24}"
}

/// Generate a table value of any type, sized for fast shrinking.
pub fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Boolean),
        // finite doubles only: NaN breaks equality-based round-trips
        // without telling us anything about the codec
        (-1.0e12f64..1.0e12).prop_map(Value::Double),
        "[a-zA-Z0-9 ]{0,32}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(|b| Value::Raw(Bytes::from(b))),
        prop::collection::vec(any::<bool>(), 0..16).prop_map(Value::BooleanArray),
        prop::collection::vec(-1.0e12f64..1.0e12, 0..16).prop_map(Value::DoubleArray),
        prop::collection::vec("[a-z]{0,8}", 0..8).prop_map(Value::StringArray),
    ]
}

/// Generate any mutation message (the kinds the merge buffer coalesces).
pub fn mutation() -> impl Strategy<Value = Message> {
    prop_oneof![
        (entry_name(), entry_id(), seq_num(), value(), any::<u8>()).prop_map(
            |(name, id, seq_num, value, flags)| Message::EntryAssign {
                name,
                id,
                seq_num,
                value,
                flags,
            }
        ),
        (entry_id(), seq_num(), value()).prop_map(|(id, seq_num, value)| {
            Message::EntryUpdate { id, seq_num, value }
        }),
        (entry_id(), any::<u8>()).prop_map(|(id, flags)| Message::FlagsUpdate { id, flags }),
        entry_id().prop_map(|id| Message::EntryDelete { id }),
        Just(Message::ClearEntries),
    ]
}

/// Generate any message valid at revision 3.0.
pub fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        mutation(),
        Just(Message::KeepAlive),
        Just(Message::ServerHelloDone),
        Just(Message::ClientHelloDone),
        "[a-z]{0,12}".prop_map(|identity| Message::ClientHello {
            proto_rev: nettable_core::PROTO_REV_3,
            identity,
        }),
        ("[a-z]{0,12}", any::<u8>()).prop_map(|(identity, flags)| Message::ServerHello {
            flags,
            identity,
        }),
    ]
}
