use std::fmt::{self, Display};

use byteorder::{ByteOrder, LittleEndian};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};
use crate::intern::SymId;

/// Discriminant of a typed literal.
///
/// `List`, `Pair` and `Proc` are reserved by the format; encoding or
/// decoding one raises [`Error::UnsupportedTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Tag {
  Int = 0x01,
  Float = 0x02,
  Sym = 0x03,
  Str = 0x04,
  Bool = 0x05,
  Nil = 0x06,
  List = 0x07,
  Pair = 0x08,
  Proc = 0x09,
  Ident = 0x0a,
}

pub const TAG_SHIFT: u8 = 3;
pub const TAG_LOW_MASK: u8 = 0b111;

impl Tag {
  pub fn is_reserved(self) -> bool {
    matches!(self, Tag::List | Tag::Pair | Tag::Proc)
  }

  /// Split an encoded tag byte into its tag and low bits.
  pub fn from_byte(byte: u8) -> Option<(Tag, u8)> {
    let tag = Tag::try_from(byte >> TAG_SHIFT).ok()?;
    Some((tag, byte & TAG_LOW_MASK))
  }

  pub fn name(self) -> &'static str {
    match self {
      Tag::Int => "int",
      Tag::Float => "float",
      Tag::Sym => "sym",
      Tag::Str => "str",
      Tag::Bool => "bool",
      Tag::Nil => "nil",
      Tag::List => "list",
      Tag::Pair => "pair",
      Tag::Proc => "proc",
      Tag::Ident => "ident",
    }
  }
}

/// A typed literal value: constant-pool entry or instruction operand.
///
/// The canonical byte encoding is one tag byte, `(tag << 3) | low_bits`,
/// followed by the per-tag payload. BOOL packs its value into the low bit
/// and has no payload; NIL has neither. All multi-byte integers are
/// little-endian.
#[derive(Debug, Clone, PartialEq)]
pub enum BcData {
  Int(i32),
  Float(f64),
  Sym(SymId),
  Str(String),
  Bool(bool),
  Nil,
  Ident(SymId),
}

impl BcData {
  pub fn tag(&self) -> Tag {
    match self {
      BcData::Int(_) => Tag::Int,
      BcData::Float(_) => Tag::Float,
      BcData::Sym(_) => Tag::Sym,
      BcData::Str(_) => Tag::Str,
      BcData::Bool(_) => Tag::Bool,
      BcData::Nil => Tag::Nil,
      BcData::Ident(_) => Tag::Ident,
    }
  }

  pub fn tag_byte(&self) -> u8 {
    let low = match self {
      BcData::Bool(value) => *value as u8,
      _ => 0,
    };
    ((self.tag() as u8) << TAG_SHIFT) | low
  }

  pub fn payload_len(&self) -> usize {
    match self {
      BcData::Int(_) | BcData::Sym(_) | BcData::Ident(_) => 4,
      BcData::Float(_) => 8,
      BcData::Str(text) => 1 + text.len(),
      BcData::Bool(_) | BcData::Nil => 0,
    }
  }

  pub fn encoded_len(&self) -> usize {
    1 + self.payload_len()
  }

  /// Append the payload bytes, without the tag byte.
  pub fn encode_payload(&self, out: &mut Vec<u8>) -> Result<()> {
    match self {
      BcData::Int(value) => {
        let mut bytes = [0; 4];
        LittleEndian::write_i32(&mut bytes, *value);
        out.extend_from_slice(&bytes);
      }
      BcData::Float(value) => {
        let mut bytes = [0; 8];
        LittleEndian::write_f64(&mut bytes, *value);
        out.extend_from_slice(&bytes);
      }
      BcData::Sym(id) | BcData::Ident(id) => {
        let mut bytes = [0; 4];
        LittleEndian::write_u32(&mut bytes, id.0);
        out.extend_from_slice(&bytes);
      }
      BcData::Str(text) => {
        if text.len() > u8::MAX as usize {
          return Err(Error::StrTooLong(text.len()));
        }
        out.push(text.len() as u8);
        out.extend_from_slice(text.as_bytes());
      }
      BcData::Bool(_) | BcData::Nil => {}
    }
    Ok(())
  }

  /// Append the full encoding: tag byte plus payload.
  pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
    out.push(self.tag_byte());
    self.encode_payload(out)
  }

  /// Decode one value from `buf` at `*pos`, advancing `*pos` past it.
  /// Error offsets are relative to the start of `buf`.
  pub fn decode(buf: &[u8], pos: &mut usize) -> Result<BcData> {
    let at = *pos;
    let byte = *buf.get(at).ok_or(Error::TruncatedBinary { offset: at })?;
    *pos += 1;
    let (tag, low) = split_tag_byte(byte, at)?;
    Self::decode_payload(tag, low, buf, pos)
  }

  /// Decode the payload of an already-validated tag byte.
  pub fn decode_payload(tag: Tag, low: u8, buf: &[u8], pos: &mut usize) -> Result<BcData> {
    match tag {
      Tag::Int => Ok(BcData::Int(LittleEndian::read_i32(take(buf, pos, 4)?))),
      Tag::Float => Ok(BcData::Float(LittleEndian::read_f64(take(buf, pos, 8)?))),
      Tag::Sym => Ok(BcData::Sym(SymId(LittleEndian::read_u32(take(buf, pos, 4)?)))),
      Tag::Ident => Ok(BcData::Ident(SymId(LittleEndian::read_u32(take(
        buf, pos, 4,
      )?)))),
      Tag::Str => {
        let len = take(buf, pos, 1)?[0] as usize;
        let text_at = *pos;
        let bytes = take(buf, pos, len)?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| Error::MalformedBinary {
          offset: text_at,
          reason: "invalid utf-8 in string payload".to_string(),
        })?;
        Ok(BcData::Str(text))
      }
      Tag::Bool => Ok(BcData::Bool(low & 1 == 1)),
      Tag::Nil => Ok(BcData::Nil),
      Tag::List | Tag::Pair | Tag::Proc => Err(Error::UnsupportedTag(tag)),
    }
  }

  pub fn as_int(&self) -> Option<i32> {
    if let BcData::Int(value) = self {
      Some(*value)
    } else {
      None
    }
  }

  pub fn as_ident(&self) -> Option<SymId> {
    if let BcData::Ident(id) = self {
      Some(*id)
    } else {
      None
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    if let BcData::Str(text) = self {
      Some(text)
    } else {
      None
    }
  }
}

/// Validate an encoded tag byte found at offset `at`.
pub fn split_tag_byte(byte: u8, at: usize) -> Result<(Tag, u8)> {
  let Some((tag, low)) = Tag::from_byte(byte) else {
    return Err(Error::UnknownTag { byte, offset: at });
  };
  if tag.is_reserved() {
    return Err(Error::UnsupportedTag(tag));
  }
  if tag != Tag::Bool && low != 0 {
    return Err(Error::MalformedBinary {
      offset: at,
      reason: format!("nonzero low bits in tag byte 0x{byte:02x}"),
    });
  }
  Ok((tag, low))
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
  let at = *pos;
  let end = at
    .checked_add(n)
    .filter(|end| *end <= buf.len())
    .ok_or(Error::TruncatedBinary { offset: at })?;
  *pos = end;
  Ok(&buf[at..end])
}

impl Display for BcData {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BcData::Int(value) => Display::fmt(value, f),
      BcData::Float(value) => Display::fmt(value, f),
      BcData::Sym(id) | BcData::Ident(id) => Display::fmt(&id.0, f),
      BcData::Str(text) => f.write_str(text),
      BcData::Bool(true) => f.write_str("#t"),
      BcData::Bool(false) => f.write_str("#f"),
      BcData::Nil => f.write_str("nil"),
    }
  }
}
