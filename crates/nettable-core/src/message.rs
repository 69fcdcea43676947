//! Protocol message types.
//!
//! One [`Message`] is one protocol operation. Messages are immutable once
//! constructed; the outgoing merge buffer replaces pending messages with
//! new values rather than mutating them in place.

use crate::types::{EntryId, SeqNum};
use crate::value::Value;

/// On-wire message kind tags.
pub mod tag {
    pub const KEEP_ALIVE: u8 = 0x00;
    pub const CLIENT_HELLO: u8 = 0x01;
    pub const PROTO_UNSUPPORTED: u8 = 0x02;
    pub const SERVER_HELLO_DONE: u8 = 0x03;
    pub const SERVER_HELLO: u8 = 0x04;
    pub const CLIENT_HELLO_DONE: u8 = 0x05;
    pub const ENTRY_ASSIGN: u8 = 0x10;
    pub const ENTRY_UPDATE: u8 = 0x11;
    pub const FLAGS_UPDATE: u8 = 0x12;
    pub const ENTRY_DELETE: u8 = 0x13;
    pub const CLEAR_ENTRIES: u8 = 0x14;
}

/// Magic word guarding the clear-entries message against stray bytes.
pub const CLEAR_ALL_MAGIC: u32 = 0xD06C_B27A;

/// Kind discriminant for a [`Message`], independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    KeepAlive,
    ClientHello,
    ProtoUnsupported,
    ServerHelloDone,
    ServerHello,
    ClientHelloDone,
    EntryAssign,
    EntryUpdate,
    FlagsUpdate,
    EntryDelete,
    ClearEntries,
}

/// One protocol operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Content-free message preventing idle timeout.
    KeepAlive,
    /// First handshake message from the peer side.
    ClientHello {
        proto_rev: u16,
        /// Self-identification; only on the wire at revision >= 3.0.
        identity: String,
    },
    /// Rejection carrying the highest revision the sender supports.
    ProtoUnsupported { proto_rev: u16 },
    /// Coordinator has finished its half of the handshake.
    ServerHelloDone,
    /// Coordinator identification (revision >= 3.0 only).
    ServerHello { flags: u8, identity: String },
    /// Peer has finished its half of the handshake (revision >= 3.0 only).
    ClientHelloDone,
    /// Create an entry or re-announce it with a fresh sequence number.
    EntryAssign {
        name: String,
        id: EntryId,
        seq_num: SeqNum,
        value: Value,
        flags: u8,
    },
    /// New value for an existing entry.
    EntryUpdate {
        id: EntryId,
        seq_num: SeqNum,
        value: Value,
    },
    /// New flags for an existing entry (revision >= 3.0 only).
    FlagsUpdate { id: EntryId, flags: u8 },
    /// Remove one entry (revision >= 3.0 only).
    EntryDelete { id: EntryId },
    /// Remove every entry (revision >= 3.0 only).
    ClearEntries,
}

impl Message {
    /// Kind discriminant.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::KeepAlive => MessageKind::KeepAlive,
            Message::ClientHello { .. } => MessageKind::ClientHello,
            Message::ProtoUnsupported { .. } => MessageKind::ProtoUnsupported,
            Message::ServerHelloDone => MessageKind::ServerHelloDone,
            Message::ServerHello { .. } => MessageKind::ServerHello,
            Message::ClientHelloDone => MessageKind::ClientHelloDone,
            Message::EntryAssign { .. } => MessageKind::EntryAssign,
            Message::EntryUpdate { .. } => MessageKind::EntryUpdate,
            Message::FlagsUpdate { .. } => MessageKind::FlagsUpdate,
            Message::EntryDelete { .. } => MessageKind::EntryDelete,
            Message::ClearEntries => MessageKind::ClearEntries,
        }
    }

    /// Entry id this message targets, if it targets one.
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            Message::EntryAssign { id, .. }
            | Message::EntryUpdate { id, .. }
            | Message::FlagsUpdate { id, .. }
            | Message::EntryDelete { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Sequence number, for kinds that carry one.
    pub fn seq_num(&self) -> Option<SeqNum> {
        match self {
            Message::EntryAssign { seq_num, .. } | Message::EntryUpdate { seq_num, .. } => {
                Some(*seq_num)
            }
            _ => None,
        }
    }

    /// Whether this is a table-mutation kind (as opposed to handshake or
    /// keep-alive traffic).
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.kind(),
            MessageKind::EntryAssign
                | MessageKind::EntryUpdate
                | MessageKind::FlagsUpdate
                | MessageKind::EntryDelete
                | MessageKind::ClearEntries
        )
    }
}
