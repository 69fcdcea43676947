//! Wire encoder: messages to bytes under a negotiated protocol revision.
//!
//! One encoder instance serves one connection's writer. Each flush batch
//! is encoded into a single contiguous buffer so the transport sees one
//! write per batch, then [`WireEncoder::reset`] clears the buffer for the
//! next batch.

use bytes::BytesMut;

use crate::error::{Result, WireError};
use crate::message::{tag, Message, CLEAR_ALL_MAGIC};
use crate::types::PROTO_REV_3;
use crate::value::Value;

/// Batch encoder for the versioned wire format.
#[derive(Debug)]
pub struct WireEncoder {
    proto_rev: u16,
    buf: BytesMut,
}

impl WireEncoder {
    /// Create an encoder targeting the given protocol revision.
    pub fn new(proto_rev: u16) -> Self {
        Self {
            proto_rev,
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Re-target the encoder; negotiation happens mid-handshake so the
    /// revision can change between batches.
    pub fn set_proto_rev(&mut self, proto_rev: u16) {
        self.proto_rev = proto_rev;
    }

    /// Active protocol revision.
    pub fn proto_rev(&self) -> u16 {
        self.proto_rev
    }

    /// Clear the output buffer for a new batch.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Encoded bytes of the current batch.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Number of encoded bytes.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been encoded since the last reset.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one message to the batch.
    ///
    /// On error nothing is appended: a message that cannot be represented
    /// at the active revision never leaves partial bytes in the batch.
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        let start = self.buf.len();
        match self.encode(msg) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.buf.truncate(start);
                Err(e)
            }
        }
    }

    fn encode(&mut self, msg: &Message) -> Result<()> {
        match msg {
            Message::KeepAlive => self.write_u8(tag::KEEP_ALIVE),
            Message::ClientHello { proto_rev, identity } => {
                self.write_u8(tag::CLIENT_HELLO);
                self.write_u16(*proto_rev);
                // identity joined the hello in revision 3.0
                if *proto_rev >= PROTO_REV_3 {
                    self.write_str(identity)?;
                }
            }
            Message::ProtoUnsupported { proto_rev } => {
                self.write_u8(tag::PROTO_UNSUPPORTED);
                self.write_u16(*proto_rev);
            }
            Message::ServerHelloDone => self.write_u8(tag::SERVER_HELLO_DONE),
            Message::ServerHello { flags, identity } => {
                self.require_rev3("ServerHello")?;
                self.write_u8(tag::SERVER_HELLO);
                self.write_u8(*flags);
                self.write_str(identity)?;
            }
            Message::ClientHelloDone => {
                self.require_rev3("ClientHelloDone")?;
                self.write_u8(tag::CLIENT_HELLO_DONE);
            }
            Message::EntryAssign {
                name,
                id,
                seq_num,
                value,
                flags,
            } => {
                self.check_value(value)?;
                self.write_u8(tag::ENTRY_ASSIGN);
                self.write_str(name)?;
                self.write_u8(value.entry_type().tag());
                self.write_u16(id.raw());
                self.write_u16(seq_num.raw());
                if self.proto_rev >= PROTO_REV_3 {
                    self.write_u8(*flags);
                }
                self.write_value(value)?;
            }
            Message::EntryUpdate { id, seq_num, value } => {
                self.check_value(value)?;
                self.write_u8(tag::ENTRY_UPDATE);
                self.write_u16(id.raw());
                self.write_u16(seq_num.raw());
                if self.proto_rev >= PROTO_REV_3 {
                    self.write_u8(value.entry_type().tag());
                }
                self.write_value(value)?;
            }
            Message::FlagsUpdate { id, flags } => {
                self.require_rev3("FlagsUpdate")?;
                self.write_u8(tag::FLAGS_UPDATE);
                self.write_u16(id.raw());
                self.write_u8(*flags);
            }
            Message::EntryDelete { id } => {
                self.require_rev3("EntryDelete")?;
                self.write_u8(tag::ENTRY_DELETE);
                self.write_u16(id.raw());
            }
            Message::ClearEntries => {
                self.require_rev3("ClearEntries")?;
                self.write_u8(tag::CLEAR_ENTRIES);
                self.write_u32(CLEAR_ALL_MAGIC);
            }
        }
        Ok(())
    }

    fn require_rev3(&self, what: &'static str) -> Result<()> {
        if self.proto_rev < PROTO_REV_3 {
            return Err(WireError::UnsupportedAtRevision {
                what,
                proto_rev: self.proto_rev,
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        if !value.entry_type().supported_at(self.proto_rev) {
            return Err(WireError::UnsupportedAtRevision {
                what: "value type",
                proto_rev: self.proto_rev,
            });
        }
        Ok(())
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.extend_from_slice(&[v]);
    }

    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_uleb128(&mut self, mut v: u64) {
        loop {
            let mut byte = (v & 0x7F) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte);
            if v == 0 {
                break;
            }
        }
    }

    /// Length-prefixed string; u16 prefix at 2.0, ULEB128 at 3.0.
    fn write_str(&mut self, s: &str) -> Result<()> {
        if self.proto_rev < PROTO_REV_3 {
            let len = u16::try_from(s.len()).map_err(|_| WireError::LengthOverflow)?;
            self.write_u16(len);
        } else {
            self.write_uleb128(s.len() as u64);
        }
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_blob(&mut self, b: &[u8]) {
        self.write_uleb128(b.len() as u64);
        self.buf.extend_from_slice(b);
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Boolean(b) => self.write_u8(u8::from(*b)),
            Value::Double(d) => self.write_f64(*d),
            Value::String(s) => self.write_str(s)?,
            Value::Raw(b) | Value::Rpc(b) => self.write_blob(b),
            Value::BooleanArray(arr) => {
                // array lengths are capped at 255 on the wire
                let n = arr.len().min(0xFF);
                self.write_u8(n as u8);
                for b in &arr[..n] {
                    self.write_u8(u8::from(*b));
                }
            }
            Value::DoubleArray(arr) => {
                let n = arr.len().min(0xFF);
                self.write_u8(n as u8);
                for d in &arr[..n] {
                    self.write_f64(*d);
                }
            }
            Value::StringArray(arr) => {
                let n = arr.len().min(0xFF);
                self.write_u8(n as u8);
                for s in &arr[..n] {
                    self.write_str(s)?;
                }
            }
        }
        Ok(())
    }
}
