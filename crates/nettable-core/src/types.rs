//! Strong type definitions for the nettable protocol.
//!
//! Identifiers are newtypes to prevent misuse at compile time.

use std::fmt;

/// Protocol revision, negotiated during the handshake.
pub type ProtoRev = u16;

/// Wire revision 2.0.
pub const PROTO_REV_2: ProtoRev = 0x0200;

/// Wire revision 3.0. Default for newly created connections.
pub const PROTO_REV_3: ProtoRev = 0x0300;

/// Entry flag bits carried in assign and flags-update messages.
pub mod flags {
    /// Entry survives coordinator restarts.
    pub const PERSISTENT: u8 = 0x01;
}

/// Integer key for a named entry, assigned once both sides agree the
/// entry exists.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u16);

impl EntryId {
    /// Sentinel meaning "not yet assigned / unknown".
    pub const UNASSIGNED: Self = Self(0xFFFF);

    /// Create from a raw wire value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Whether this is the unassigned sentinel.
    pub const fn is_unassigned(self) -> bool {
        self.0 == Self::UNASSIGNED.0
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unassigned() {
            write!(f, "EntryId(unassigned)")
        } else {
            write!(f, "EntryId({})", self.0)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EntryId {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// Per-entry sequence number with wraparound ordering.
///
/// Sequence numbers are 16 bits and wrap; recency is decided RFC-1982
/// style with a half-range window, so `0x0001` is newer than `0xFFF0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SeqNum(pub u16);

impl SeqNum {
    /// Half the sequence space; the comparison window.
    const WINDOW: u16 = 0x8000;

    /// Create from a raw wire value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Whether `self` is strictly newer than `other` under wraparound.
    pub fn newer_than(self, other: SeqNum) -> bool {
        if self.0 == other.0 {
            return false;
        }
        if self.0 > other.0 {
            self.0.wrapping_sub(other.0) < Self::WINDOW
        } else {
            other.0.wrapping_sub(self.0) > Self::WINDOW
        }
    }

    /// Next sequence number, wrapping at the 16-bit boundary.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
