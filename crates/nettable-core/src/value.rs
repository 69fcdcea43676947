//! Typed table values.

use bytes::Bytes;

/// Discriminator for the payload of an entry value.
///
/// Tag values are the on-wire encoding; `Raw` and `Rpc` require protocol
/// revision 3.0 or later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    Boolean = 0x00,
    Double = 0x01,
    String = 0x02,
    Raw = 0x03,
    BooleanArray = 0x10,
    DoubleArray = 0x11,
    StringArray = 0x12,
    Rpc = 0x20,
}

impl EntryType {
    /// Wire tag byte.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag byte.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Boolean),
            0x01 => Some(Self::Double),
            0x02 => Some(Self::String),
            0x03 => Some(Self::Raw),
            0x10 => Some(Self::BooleanArray),
            0x11 => Some(Self::DoubleArray),
            0x12 => Some(Self::StringArray),
            0x20 => Some(Self::Rpc),
            _ => None,
        }
    }

    /// Whether this type can appear on the wire at the given revision.
    pub fn supported_at(self, proto_rev: u16) -> bool {
        match self {
            Self::Raw | Self::Rpc => proto_rev >= crate::types::PROTO_REV_3,
            _ => true,
        }
    }
}

/// A table value. Immutable once constructed; replacing a pending value
/// means substituting a new one, never mutating in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Double(f64),
    String(String),
    Raw(Bytes),
    BooleanArray(Vec<bool>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
    /// Opaque RPC definition payload, encoded like `Raw`.
    Rpc(Bytes),
}

impl Value {
    /// The wire type of this value.
    pub fn entry_type(&self) -> EntryType {
        match self {
            Value::Boolean(_) => EntryType::Boolean,
            Value::Double(_) => EntryType::Double,
            Value::String(_) => EntryType::String,
            Value::Raw(_) => EntryType::Raw,
            Value::BooleanArray(_) => EntryType::BooleanArray,
            Value::DoubleArray(_) => EntryType::DoubleArray,
            Value::StringArray(_) => EntryType::StringArray,
            Value::Rpc(_) => EntryType::Rpc,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
