//! Golden wire-format vectors.
//!
//! Each vector pins the exact bytes one message encodes to at one
//! protocol revision. These are contract tests: the byte layout is a
//! closed, versioned interop contract, and any change here is a protocol
//! break, not a refactor.

use bytes::Bytes;
use nettable_core::{EntryId, EntryType, Message, SeqNum, Value, PROTO_REV_2, PROTO_REV_3};

/// One pinned encoding.
pub struct WireVector {
    /// What the vector demonstrates.
    pub name: &'static str,
    /// Revision the bytes are valid at.
    pub proto_rev: u16,
    /// Expected wire bytes, hex-encoded.
    pub hex: &'static str,
    /// The decoded form.
    pub message: fn() -> Message,
    /// Entry type the decode-side resolver must supply, for revision-2.0
    /// updates whose value type is not on the wire.
    pub resolver_type: Option<EntryType>,
}

impl WireVector {
    /// Decoded wire bytes.
    pub fn bytes(&self) -> Vec<u8> {
        hex::decode(self.hex).expect("vector hex is well-formed")
    }
}

/// All pinned vectors.
pub fn wire_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "keep_alive",
            proto_rev: PROTO_REV_3,
            hex: "00",
            message: || Message::KeepAlive,
            resolver_type: None,
        },
        WireVector {
            name: "client_hello_rev3_carries_identity",
            proto_rev: PROTO_REV_3,
            hex: "01030005726f626f74",
            message: || Message::ClientHello {
                proto_rev: PROTO_REV_3,
                identity: "robot".to_owned(),
            },
            resolver_type: None,
        },
        WireVector {
            name: "client_hello_rev2_has_no_identity",
            proto_rev: PROTO_REV_2,
            hex: "010200",
            message: || Message::ClientHello {
                proto_rev: PROTO_REV_2,
                identity: String::new(),
            },
            resolver_type: None,
        },
        WireVector {
            name: "proto_unsupported",
            proto_rev: PROTO_REV_3,
            hex: "020300",
            message: || Message::ProtoUnsupported {
                proto_rev: PROTO_REV_3,
            },
            resolver_type: None,
        },
        WireVector {
            name: "server_hello_done",
            proto_rev: PROTO_REV_3,
            hex: "03",
            message: || Message::ServerHelloDone,
            resolver_type: None,
        },
        WireVector {
            name: "server_hello",
            proto_rev: PROTO_REV_3,
            hex: "040006736572766572",
            message: || Message::ServerHello {
                flags: 0,
                identity: "server".to_owned(),
            },
            resolver_type: None,
        },
        WireVector {
            name: "client_hello_done",
            proto_rev: PROTO_REV_3,
            hex: "05",
            message: || Message::ClientHelloDone,
            resolver_type: None,
        },
        WireVector {
            name: "entry_assign_double_rev3",
            proto_rev: PROTO_REV_3,
            hex: "10042f666f6f0100010002013fe0000000000000",
            message: || Message::EntryAssign {
                name: "/foo".to_owned(),
                id: EntryId(1),
                seq_num: SeqNum(2),
                value: Value::Double(0.5),
                flags: 0x01,
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_assign_bool_rev2_no_flags_u16_strings",
            proto_rev: PROTO_REV_2,
            hex: "1000022f61000001000101",
            message: || Message::EntryAssign {
                name: "/a".to_owned(),
                id: EntryId(1),
                seq_num: SeqNum(1),
                value: Value::Boolean(true),
                flags: 0,
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_update_bool_rev3",
            proto_rev: PROTO_REV_3,
            hex: "11000100030001",
            message: || Message::EntryUpdate {
                id: EntryId(1),
                seq_num: SeqNum(3),
                value: Value::Boolean(true),
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_update_rev2_type_from_resolver",
            proto_rev: PROTO_REV_2,
            hex: "11000100023ff0000000000000",
            message: || Message::EntryUpdate {
                id: EntryId(1),
                seq_num: SeqNum(2),
                value: Value::Double(1.0),
            },
            resolver_type: Some(EntryType::Double),
        },
        WireVector {
            name: "entry_update_string",
            proto_rev: PROTO_REV_3,
            hex: "110004000102026869",
            message: || Message::EntryUpdate {
                id: EntryId(4),
                seq_num: SeqNum(1),
                value: Value::String("hi".to_owned()),
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_update_boolean_array",
            proto_rev: PROTO_REV_3,
            hex: "11000500011003010001",
            message: || Message::EntryUpdate {
                id: EntryId(5),
                seq_num: SeqNum(1),
                value: Value::BooleanArray(vec![true, false, true]),
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_update_double_array",
            proto_rev: PROTO_REV_3,
            hex: "110007000111023ff0000000000000bff0000000000000",
            message: || Message::EntryUpdate {
                id: EntryId(7),
                seq_num: SeqNum(1),
                value: Value::DoubleArray(vec![1.0, -1.0]),
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_update_string_array",
            proto_rev: PROTO_REV_3,
            hex: "1100080001120201610162",
            message: || Message::EntryUpdate {
                id: EntryId(8),
                seq_num: SeqNum(1),
                value: Value::StringArray(vec!["a".to_owned(), "b".to_owned()]),
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_update_raw",
            proto_rev: PROTO_REV_3,
            hex: "11000600010302dead",
            message: || Message::EntryUpdate {
                id: EntryId(6),
                seq_num: SeqNum(1),
                value: Value::Raw(Bytes::from_static(&[0xDE, 0xAD])),
            },
            resolver_type: None,
        },
        WireVector {
            name: "flags_update",
            proto_rev: PROTO_REV_3,
            hex: "12000201",
            message: || Message::FlagsUpdate {
                id: EntryId(2),
                flags: 0x01,
            },
            resolver_type: None,
        },
        WireVector {
            name: "entry_delete",
            proto_rev: PROTO_REV_3,
            hex: "130002",
            message: || Message::EntryDelete { id: EntryId(2) },
            resolver_type: None,
        },
        WireVector {
            name: "clear_entries_magic",
            proto_rev: PROTO_REV_3,
            hex: "14d06cb27a",
            message: || Message::ClearEntries,
            resolver_type: None,
        },
        WireVector {
            name: "unassigned_id_on_the_wire",
            proto_rev: PROTO_REV_3,
            hex: "10052f74656d7001ffff0000004000000000000000",
            message: || Message::EntryAssign {
                name: "/temp".to_owned(),
                id: EntryId::UNASSIGNED,
                seq_num: SeqNum(0),
                value: Value::Double(2.0),
                flags: 0,
            },
            resolver_type: None,
        },
    ]
}
