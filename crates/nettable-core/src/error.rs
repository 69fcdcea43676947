//! Error types for the wire codec.

use thiserror::Error;

use crate::types::EntryId;

/// Errors surfaced by the wire codec.
///
/// Decode errors are non-fatal to the process but fatal to the connection
/// that hit them; the engine logs and tears the connection down. A clean
/// end-of-stream is *not* an error (the decoder returns `Ok(None)`), so
/// callers can tell a malformed peer from a normal disconnect.
#[derive(Debug, Error)]
pub enum WireError {
    /// The stream ended in the middle of a message.
    #[error("unexpected end of stream inside a message")]
    TruncatedMessage,

    /// Underlying read failed.
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecognized message kind tag.
    #[error("unknown message kind {0:#04x}")]
    UnknownMessageKind(u8),

    /// Unrecognized value type tag.
    #[error("unknown value type {0:#04x}")]
    UnknownValueType(u8),

    /// Message or value type not available at the active revision.
    #[error("{what} not supported at protocol revision {proto_rev:#06x}")]
    UnsupportedAtRevision {
        what: &'static str,
        proto_rev: u16,
    },

    /// Clear-all message carried the wrong magic word.
    #[error("bad clear-entries magic {0:#010x}")]
    BadClearMagic(u32),

    /// Revision 2.0 update for an entry the resolver does not know,
    /// so the value payload cannot be decoded.
    #[error("no known type for entry id {0}")]
    UnknownEntry(EntryId),

    /// String field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// Variable-length quantity did not fit in 64 bits.
    #[error("length prefix overflow")]
    LengthOverflow,

    /// A previous decode failed, so the stream position is unknown and
    /// further reads are refused until the decoder is reset.
    #[error("decoder desynchronized by earlier error, reset required")]
    Desynchronized,
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, WireError>;
