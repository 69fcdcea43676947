//! # Nettable Core
//!
//! Pure primitives for the nettable protocol: entry identifiers, typed
//! values, protocol messages, and the versioned binary wire codec.
//!
//! This crate contains no I/O scheduling, no threads, no transport. It is
//! pure computation over protocol data structures; the connection engine
//! lives in `nettable-sync`.
//!
//! ## Key Types
//!
//! - [`Message`] - One protocol operation (assign, update, delete, ...)
//! - [`Value`] - A typed table value
//! - [`EntryId`] - Integer key for a named entry (`0xFFFF` = unassigned)
//! - [`WireEncoder`] / [`WireDecoder`] - Batch codec for a negotiated
//!   protocol revision
//!
//! ## Wire Format
//!
//! The byte layout is a closed, versioned contract keyed by a 16-bit
//! protocol revision negotiated during the connection handshake. Both
//! codec halves can be re-targeted to a new revision mid-stream with
//! `set_proto_rev`, because negotiation happens inside the handshake.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod message;
pub mod types;
pub mod value;

pub use decoder::{EntryTypeResolver, WireDecoder};
pub use encoder::WireEncoder;
pub use error::{Result, WireError};
pub use message::{Message, MessageKind};
pub use types::{flags, EntryId, SeqNum, ProtoRev, PROTO_REV_2, PROTO_REV_3};
pub use value::{EntryType, Value};
