//! Minimal Thrift binary protocol codec (strict framing, big-endian).
//!
//! Covers what the note-store calls need: message envelopes, structs,
//! strings/binary, integers and lists, plus generic skipping of unknown
//! fields on read.

use std::error::Error;
use std::fmt::{Display, Formatter};

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;
const MAX_SKIP_DEPTH: usize = 64;

pub const T_STOP: u8 = 0;
pub const T_BOOL: u8 = 2;
pub const T_BYTE: u8 = 3;
pub const T_DOUBLE: u8 = 4;
pub const T_I16: u8 = 6;
pub const T_I32: u8 = 8;
pub const T_I64: u8 = 10;
pub const T_STRING: u8 = 11;
pub const T_STRUCT: u8 = 12;
pub const T_MAP: u8 = 13;
pub const T_SET: u8 = 14;
pub const T_LIST: u8 = 15;

/// Thrift message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Call),
            2 => Some(Self::Reply),
            3 => Some(Self::Exception),
            4 => Some(Self::Oneway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThriftError {
    UnexpectedEof { needed: usize, at: usize },
    BadVersion(u32),
    UnknownMessageType(u8),
    UnknownFieldType(u8),
    NegativeLength(i32),
    InvalidUtf8,
    TooDeep,
    TooLarge(usize),
}

impl Display for ThriftError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof { needed, at } => {
                write!(f, "unexpected end of message: need {needed} bytes at offset {at}")
            }
            Self::BadVersion(word) => write!(f, "bad protocol version word {word:#010x}"),
            Self::UnknownMessageType(value) => write!(f, "unknown message type {value}"),
            Self::UnknownFieldType(value) => write!(f, "unknown field type {value}"),
            Self::NegativeLength(value) => write!(f, "negative length {value}"),
            Self::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
            Self::TooDeep => write!(f, "nesting exceeds {MAX_SKIP_DEPTH} levels"),
            Self::TooLarge(len) => write!(f, "length {len} exceeds i32 range"),
        }
    }
}

impl Error for ThriftError {}

pub type ThriftResult<T> = Result<T, ThriftError>;

/// Appends binary-protocol values to an owned buffer.
#[derive(Debug, Default)]
pub struct ThriftWriter {
    buf: Vec<u8>,
}

impl ThriftWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn message_begin(
        &mut self,
        name: &str,
        kind: MessageType,
        seq_id: i32,
    ) -> ThriftResult<()> {
        self.buf
            .extend_from_slice(&(VERSION_1 | kind as u32).to_be_bytes());
        self.string(name)?;
        self.i32(seq_id);
        Ok(())
    }

    pub fn field_begin(&mut self, field_type: u8, id: i16) {
        self.buf.push(field_type);
        self.i16(id);
    }

    pub fn field_stop(&mut self) {
        self.buf.push(T_STOP);
    }

    pub fn list_begin(&mut self, elem_type: u8, size: usize) -> ThriftResult<()> {
        self.buf.push(elem_type);
        self.i32(len_to_i32(size)?);
        Ok(())
    }

    pub fn bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn binary(&mut self, value: &[u8]) -> ThriftResult<()> {
        self.i32(len_to_i32(value.len())?);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    pub fn string(&mut self, value: &str) -> ThriftResult<()> {
        self.binary(value.as_bytes())
    }

    /// Writes a string field when `value` is present.
    pub fn opt_string_field(&mut self, id: i16, value: Option<&str>) -> ThriftResult<()> {
        if let Some(value) = value {
            self.field_begin(T_STRING, id);
            self.string(value)?;
        }
        Ok(())
    }
}

fn len_to_i32(len: usize) -> ThriftResult<i32> {
    i32::try_from(len).map_err(|_| ThriftError::TooLarge(len))
}

/// Decoded message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageType,
    pub seq_id: i32,
}

/// Cursor over one binary-protocol message.
#[derive(Debug)]
pub struct ThriftReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ThriftReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> ThriftResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ThriftError::UnexpectedEof {
                needed: len,
                at: self.pos,
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> ThriftResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn message_begin(&mut self) -> ThriftResult<MessageHeader> {
        let word = u32::from_be_bytes(self.array::<4>()?);
        if word & VERSION_MASK != VERSION_1 {
            return Err(ThriftError::BadVersion(word));
        }
        let kind_byte = (word & 0xff) as u8;
        let kind =
            MessageType::from_u8(kind_byte).ok_or(ThriftError::UnknownMessageType(kind_byte))?;
        let name = self.string()?;
        let seq_id = self.i32()?;
        Ok(MessageHeader { name, kind, seq_id })
    }

    /// Returns `None` at the struct's stop marker.
    pub fn field_begin(&mut self) -> ThriftResult<Option<(u8, i16)>> {
        let field_type = self.byte()?;
        if field_type == T_STOP {
            return Ok(None);
        }
        Ok(Some((field_type, self.i16()?)))
    }

    pub fn byte(&mut self) -> ThriftResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i16(&mut self) -> ThriftResult<i16> {
        Ok(i16::from_be_bytes(self.array::<2>()?))
    }

    pub fn i32(&mut self) -> ThriftResult<i32> {
        Ok(i32::from_be_bytes(self.array::<4>()?))
    }

    pub fn i64(&mut self) -> ThriftResult<i64> {
        Ok(i64::from_be_bytes(self.array::<8>()?))
    }

    fn length(&mut self) -> ThriftResult<usize> {
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| ThriftError::NegativeLength(len))
    }

    pub fn binary(&mut self) -> ThriftResult<&'a [u8]> {
        let len = self.length()?;
        self.take(len)
    }

    pub fn string(&mut self) -> ThriftResult<String> {
        let bytes = self.binary()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ThriftError::InvalidUtf8)
    }

    /// Skips one value of `field_type`, recursing into containers.
    pub fn skip(&mut self, field_type: u8) -> ThriftResult<()> {
        self.skip_at_depth(field_type, 0)
    }

    fn skip_at_depth(&mut self, field_type: u8, depth: usize) -> ThriftResult<()> {
        if depth > MAX_SKIP_DEPTH {
            return Err(ThriftError::TooDeep);
        }
        match field_type {
            T_BOOL | T_BYTE => {
                self.take(1)?;
            }
            T_I16 => {
                self.take(2)?;
            }
            T_I32 => {
                self.take(4)?;
            }
            T_DOUBLE | T_I64 => {
                self.take(8)?;
            }
            T_STRING => {
                self.binary()?;
            }
            T_STRUCT => {
                while let Some((inner, _)) = self.field_begin()? {
                    self.skip_at_depth(inner, depth + 1)?;
                }
            }
            T_MAP => {
                let key_type = self.byte()?;
                let value_type = self.byte()?;
                let size = self.length()?;
                for _ in 0..size {
                    self.skip_at_depth(key_type, depth + 1)?;
                    self.skip_at_depth(value_type, depth + 1)?;
                }
            }
            T_SET | T_LIST => {
                let elem_type = self.byte()?;
                let size = self.length()?;
                for _ in 0..size {
                    self.skip_at_depth(elem_type, depth + 1)?;
                }
            }
            other => return Err(ThriftError::UnknownFieldType(other)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        MessageType, ThriftError, ThriftReader, ThriftWriter, T_I32, T_LIST, T_MAP, T_STRING,
        T_STRUCT,
    };

    #[test]
    fn message_header_uses_strict_version_word() {
        let mut writer = ThriftWriter::new();
        writer
            .message_begin("createNote", MessageType::Call, 7)
            .unwrap();
        let bytes = writer.into_bytes();

        assert_eq!(&bytes[..4], &[0x80, 0x01, 0x00, 0x01]);
        assert_eq!(&bytes[4..8], &10i32.to_be_bytes());
        assert_eq!(&bytes[8..18], b"createNote");
        assert_eq!(&bytes[18..], &7i32.to_be_bytes());

        let header = ThriftReader::new(&bytes).message_begin().unwrap();
        assert_eq!(header.name, "createNote");
        assert_eq!(header.kind, MessageType::Call);
        assert_eq!(header.seq_id, 7);
    }

    #[test]
    fn skips_nested_unknown_fields() {
        let mut writer = ThriftWriter::new();
        writer.field_begin(T_STRUCT, 9);
        writer.field_begin(T_LIST, 1);
        writer.list_begin(T_STRING, 2).unwrap();
        writer.string("a").unwrap();
        writer.string("bc").unwrap();
        writer.field_begin(T_MAP, 2);
        writer.buf.extend_from_slice(&[T_STRING, T_I32]);
        writer.i32(1);
        writer.string("k").unwrap();
        writer.i32(5);
        writer.field_stop();
        writer.field_begin(T_I32, 3);
        writer.i32(42);
        writer.field_stop();
        let bytes = writer.into_bytes();

        let mut reader = ThriftReader::new(&bytes);
        let (field_type, id) = reader.field_begin().unwrap().unwrap();
        assert_eq!((field_type, id), (T_STRUCT, 9));
        reader.skip(field_type).unwrap();
        assert_eq!(reader.field_begin().unwrap(), Some((T_I32, 3)));
        assert_eq!(reader.i32().unwrap(), 42);
        assert_eq!(reader.field_begin().unwrap(), None);
    }

    #[test]
    fn truncated_input_reports_eof() {
        let mut reader = ThriftReader::new(&[0x00, 0x00, 0x00, 0x05, b'a']);
        assert_eq!(
            reader.string().unwrap_err(),
            ThriftError::UnexpectedEof { needed: 5, at: 4 }
        );
    }

    #[test]
    fn rejects_unversioned_messages() {
        let mut reader = ThriftReader::new(&[0x00, 0x00, 0x00, 0x01]);
        assert!(matches!(
            reader.message_begin(),
            Err(ThriftError::BadVersion(1))
        ));
    }

    #[test]
    fn negative_lengths_are_rejected() {
        let binding = (-1i32).to_be_bytes();
        let mut reader = ThriftReader::new(&binding);
        assert_eq!(reader.binary().unwrap_err(), ThriftError::NegativeLength(-1));
    }
}
