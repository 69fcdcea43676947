//! Wire decoder: bytes to messages under a negotiated protocol revision.
//!
//! The decoder pulls from a blocking [`Read`] stream one message at a
//! time. A clean end-of-stream at a message boundary is reported as
//! `Ok(None)`; running dry in the middle of a message is an error. After
//! any error the decoder refuses further reads until [`WireDecoder::reset`]
//! is called, because the stream position is no longer known.

use std::io::Read;

use bytes::Bytes;

use crate::error::{Result, WireError};
use crate::message::{tag, Message, MessageKind, CLEAR_ALL_MAGIC};
use crate::types::{EntryId, SeqNum, PROTO_REV_3};
use crate::value::{EntryType, Value};

/// Resolver for revision-2.0 entry updates, whose value payload carries
/// no inline type tag. Supplied by the table layer that owns the entries.
pub type EntryTypeResolver<'a> = &'a (dyn Fn(MessageKind, EntryId) -> Option<EntryType> + 'a);

/// Streaming decoder for the versioned wire format.
pub struct WireDecoder<R> {
    rd: R,
    proto_rev: u16,
    failed: bool,
}

impl<R: Read> WireDecoder<R> {
    /// Create a decoder over a blocking byte stream.
    pub fn new(rd: R, proto_rev: u16) -> Self {
        Self {
            rd,
            proto_rev,
            failed: false,
        }
    }

    /// Re-target the decoder to a newly negotiated revision.
    pub fn set_proto_rev(&mut self, proto_rev: u16) {
        self.proto_rev = proto_rev;
    }

    /// Active protocol revision.
    pub fn proto_rev(&self) -> u16 {
        self.proto_rev
    }

    /// Clear the failed state so another message may be attempted.
    pub fn reset(&mut self) {
        self.failed = false;
    }

    /// Decode one message.
    ///
    /// `Ok(None)` means the stream ended cleanly before a new message
    /// started; any `Err` means the peer is malformed or the transport
    /// died mid-message.
    pub fn read_message(&mut self, resolver: EntryTypeResolver<'_>) -> Result<Option<Message>> {
        if self.failed {
            return Err(WireError::Desynchronized);
        }
        match self.read_message_inner(resolver) {
            Ok(msg) => Ok(msg),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn read_message_inner(&mut self, resolver: EntryTypeResolver<'_>) -> Result<Option<Message>> {
        let Some(kind_tag) = self.read_tag()? else {
            return Ok(None);
        };
        let msg = match kind_tag {
            tag::KEEP_ALIVE => Message::KeepAlive,
            tag::CLIENT_HELLO => {
                let proto_rev = self.read_u16()?;
                // identity joined the hello in revision 3.0
                let identity = if proto_rev >= PROTO_REV_3 {
                    self.read_str()?
                } else {
                    String::new()
                };
                Message::ClientHello { proto_rev, identity }
            }
            tag::PROTO_UNSUPPORTED => Message::ProtoUnsupported {
                proto_rev: self.read_u16()?,
            },
            tag::SERVER_HELLO_DONE => Message::ServerHelloDone,
            tag::SERVER_HELLO => {
                self.require_rev3("ServerHello")?;
                let flags = self.read_u8()?;
                let identity = self.read_str()?;
                Message::ServerHello { flags, identity }
            }
            tag::CLIENT_HELLO_DONE => {
                self.require_rev3("ClientHelloDone")?;
                Message::ClientHelloDone
            }
            tag::ENTRY_ASSIGN => {
                let name = self.read_str()?;
                let ty = self.read_entry_type()?;
                let id = EntryId::from_raw(self.read_u16()?);
                let seq_num = SeqNum::from_raw(self.read_u16()?);
                let flags = if self.proto_rev >= PROTO_REV_3 {
                    self.read_u8()?
                } else {
                    0
                };
                let value = self.read_value(ty)?;
                Message::EntryAssign {
                    name,
                    id,
                    seq_num,
                    value,
                    flags,
                }
            }
            tag::ENTRY_UPDATE => {
                let id = EntryId::from_raw(self.read_u16()?);
                let seq_num = SeqNum::from_raw(self.read_u16()?);
                let ty = if self.proto_rev >= PROTO_REV_3 {
                    self.read_entry_type()?
                } else {
                    // no inline type tag at 2.0; ask the table layer
                    resolver(MessageKind::EntryUpdate, id).ok_or(WireError::UnknownEntry(id))?
                };
                let value = self.read_value(ty)?;
                Message::EntryUpdate { id, seq_num, value }
            }
            tag::FLAGS_UPDATE => {
                self.require_rev3("FlagsUpdate")?;
                Message::FlagsUpdate {
                    id: EntryId::from_raw(self.read_u16()?),
                    flags: self.read_u8()?,
                }
            }
            tag::ENTRY_DELETE => {
                self.require_rev3("EntryDelete")?;
                Message::EntryDelete {
                    id: EntryId::from_raw(self.read_u16()?),
                }
            }
            tag::CLEAR_ENTRIES => {
                self.require_rev3("ClearEntries")?;
                let magic = self.read_u32()?;
                if magic != CLEAR_ALL_MAGIC {
                    return Err(WireError::BadClearMagic(magic));
                }
                Message::ClearEntries
            }
            other => return Err(WireError::UnknownMessageKind(other)),
        };
        Ok(Some(msg))
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

    /// Read the next message kind tag, or `None` on clean end-of-stream.
    fn read_tag(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.rd.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(WireError::Io(e)),
            }
        }
    }

    /// Fill `buf` completely; end-of-stream here means a truncated message.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.rd.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(WireError::TruncatedMessage)
            }
            Err(e) => Err(WireError::Io(e)),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_full(&mut b)?;
        Ok(b[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_full(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_full(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        self.read_full(&mut b)?;
        Ok(f64::from_be_bytes(b))
    }

    fn read_uleb128(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(WireError::LengthOverflow);
            }
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Length-prefixed string; u16 prefix at 2.0, ULEB128 at 3.0.
    fn read_str(&mut self) -> Result<String> {
        let len = if self.proto_rev < PROTO_REV_3 {
            u64::from(self.read_u16()?)
        } else {
            self.read_uleb128()?
        };
        let len = usize::try_from(len).map_err(|_| WireError::LengthOverflow)?;
        let mut buf = vec![0u8; len];
        self.read_full(&mut buf)?;
        String::from_utf8(buf).map_err(|_| WireError::InvalidUtf8)
    }

    fn read_blob(&mut self) -> Result<Bytes> {
        let len = self.read_uleb128()?;
        let len = usize::try_from(len).map_err(|_| WireError::LengthOverflow)?;
        let mut buf = vec![0u8; len];
        self.read_full(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn read_entry_type(&mut self) -> Result<EntryType> {
        let raw = self.read_u8()?;
        let ty = EntryType::from_tag(raw).ok_or(WireError::UnknownValueType(raw))?;
        if !ty.supported_at(self.proto_rev) {
            return Err(WireError::UnsupportedAtRevision {
                what: "value type",
                proto_rev: self.proto_rev,
            });
        }
        Ok(ty)
    }

    fn read_value(&mut self, ty: EntryType) -> Result<Value> {
        let value = match ty {
            EntryType::Boolean => Value::Boolean(self.read_u8()? != 0),
            EntryType::Double => Value::Double(self.read_f64()?),
            EntryType::String => Value::String(self.read_str()?),
            EntryType::Raw => Value::Raw(self.read_blob()?),
            EntryType::Rpc => Value::Rpc(self.read_blob()?),
            EntryType::BooleanArray => {
                let n = self.read_u8()? as usize;
                let mut arr = Vec::with_capacity(n);
                for _ in 0..n {
                    arr.push(self.read_u8()? != 0);
                }
                Value::BooleanArray(arr)
            }
            EntryType::DoubleArray => {
                let n = self.read_u8()? as usize;
                let mut arr = Vec::with_capacity(n);
                for _ in 0..n {
                    arr.push(self.read_f64()?);
                }
                Value::DoubleArray(arr)
            }
            EntryType::StringArray => {
                let n = self.read_u8()? as usize;
                let mut arr = Vec::with_capacity(n);
                for _ in 0..n {
                    arr.push(self.read_str()?);
                }
                Value::StringArray(arr)
            }
        };
        Ok(value)
    }
}
