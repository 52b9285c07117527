use thiserror::Error;

use crate::bytecode::data::Tag;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Every failure in the toolchain is fatal to the operation that produced
/// it; there is no partial-success path. Loader errors carry the byte
/// offset at which the fault was detected.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
  #[error("bad magic bytes {found:02x?}")]
  BadMagic { found: [u8; 4] },

  #[error("unsupported bytecode version {0}")]
  UnsupportedVersion(u16),

  #[error("malformed binary at offset {offset}: {reason}")]
  MalformedBinary { offset: usize, reason: String },

  #[error("truncated binary at offset {offset}")]
  TruncatedBinary { offset: usize },

  #[error("missing required section `{0}`")]
  MissingSection(&'static str),

  #[error("label pseudo-instruction in binary at offset {offset}")]
  IllegalLabelInBinary { offset: usize },

  #[error("unknown label `{0}`")]
  UnknownLabel(String),

  #[error("jump operand still refers to label `{0}` after patching")]
  UnpatchedLabel(String),

  #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
  UnknownOpcode { byte: u8, offset: usize },

  #[error("data tag {0:?} is reserved and not implemented")]
  UnsupportedTag(Tag),

  #[error("unknown data tag byte 0x{byte:02x} at offset {offset}")]
  UnknownTag { byte: u8, offset: usize },

  #[error("reference to unknown symbol id {id}")]
  UnknownSymbol { id: u32 },

  #[error("output of {requested} bytes exceeds the buffer cap of {max}")]
  BufferOverflow { requested: usize, max: usize },

  #[error("string of {0} bytes does not fit its length prefix")]
  StrTooLong(usize),

  #[error("invalid form: {0}")]
  InvalidForm(String),

  #[error("malformed literal `{0}`")]
  MalformedLiteral(String),
}
