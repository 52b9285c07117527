pub mod reader;
pub mod writer;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bytecode::{BcData, Instruction};
use crate::intern::Interner;

pub use reader::load;
pub use writer::serialize;

pub const MAGIC: [u8; 4] = *b"(bc)";
pub const VERSION: u16 = 1;
pub const WORD_SIZE: u8 = 8;

/// Fixed bytes before the section count: magic, version, word size,
/// flags.
pub const HEADER_SIZE: usize = 8;
/// Section table entry: tag byte plus two u32s (offset, size).
pub const SECTION_ENTRY_SIZE: usize = 9;

bitflags! {
  /// Feature bits in the container header. Reserved bits must be zero.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct UnitFlags: u8 {
    const DEBUG = 1 << 0;
    const OPTIMIZED = 1 << 1;
    const SOURCE_MAP = 1 << 2;
    const ATTRIBUTE = 1 << 3;
    const LINE_INFO = 1 << 4;
    const TYPE_INFO = 1 << 5;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SectionTag {
  SymbolTable = 1,
  ConstantPool = 2,
  ProcedureTable = 3,
  Bytecode = 4,
}

impl SectionTag {
  pub const ALL: [SectionTag; 4] = [
    SectionTag::SymbolTable,
    SectionTag::ConstantPool,
    SectionTag::ProcedureTable,
    SectionTag::Bytecode,
  ];

  pub fn name(self) -> &'static str {
    match self {
      SectionTag::SymbolTable => "symbol_table",
      SectionTag::ConstantPool => "constant_pool",
      SectionTag::ProcedureTable => "procedure_table",
      SectionTag::Bytecode => "bytecode",
    }
  }
}

/// A bytecode unit reconstructed from its binary container.
///
/// `code` pairs each instruction with its byte offset within the
/// BYTECODE section; jump operands hold byte deltas relative to that
/// offset.
#[derive(Debug)]
pub struct LoadedUnit {
  pub version: u16,
  pub word_size: u8,
  pub flags: UnitFlags,
  pub interner: Interner,
  pub pool: Vec<BcData>,
  pub code: Vec<(usize, Instruction)>,
  pub code_size: usize,
}
