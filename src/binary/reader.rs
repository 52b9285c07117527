use byteorder::{ByteOrder, LittleEndian};

use super::{LoadedUnit, SectionTag, UnitFlags, MAGIC, VERSION};
use crate::bytecode::data;
use crate::bytecode::{BcData, Instruction, Opcode};
use crate::error::{Error, Result};
use crate::intern::Interner;

/// Bounded cursor over the input buffer. Positions (and therefore error
/// offsets) are absolute within the buffer, even when the cursor is
/// restricted to a single section.
struct Cursor<'a> {
  bytes: &'a [u8],
  pos: usize,
  end: usize,
}

impl<'a> Cursor<'a> {
  fn new(bytes: &'a [u8], pos: usize) -> Self {
    Self {
      bytes,
      pos,
      end: bytes.len(),
    }
  }

  fn section(bytes: &'a [u8], offset: usize, size: usize) -> Self {
    Self {
      bytes,
      pos: offset,
      end: offset + size,
    }
  }

  fn position(&self) -> usize {
    self.pos
  }

  fn at_end(&self) -> bool {
    self.pos >= self.end
  }

  fn take(&mut self, n: usize) -> Result<&'a [u8]> {
    let at = self.pos;
    let end = at
      .checked_add(n)
      .filter(|end| *end <= self.end)
      .ok_or(Error::TruncatedBinary { offset: at })?;
    self.pos = end;
    Ok(&self.bytes[at..end])
  }

  fn u8(&mut self) -> Result<u8> {
    Ok(self.take(1)?[0])
  }

  fn u16(&mut self) -> Result<u16> {
    Ok(LittleEndian::read_u16(self.take(2)?))
  }

  fn u32(&mut self) -> Result<u32> {
    Ok(LittleEndian::read_u32(self.take(4)?))
  }

  fn data(&mut self) -> Result<BcData> {
    BcData::decode(&self.bytes[..self.end], &mut self.pos)
  }
}

/// Load and validate a binary container.
///
/// Every failure is fatal and reports the absolute byte offset at which
/// it was detected.
pub fn load(bytes: &[u8]) -> Result<LoadedUnit> {
  // The magic check reads exactly four bytes and nothing else.
  let magic: [u8; 4] = bytes
    .get(..4)
    .and_then(|magic| magic.try_into().ok())
    .ok_or(Error::TruncatedBinary { offset: 0 })?;
  if magic != MAGIC {
    return Err(Error::BadMagic { found: magic });
  }

  let mut cursor = Cursor::new(bytes, 4);
  let version = cursor.u16()?;
  if version != VERSION {
    return Err(Error::UnsupportedVersion(version));
  }
  let word_size = cursor.u8()?;
  let flags_at = cursor.position();
  let flags_byte = cursor.u8()?;
  let flags = UnitFlags::from_bits(flags_byte).ok_or_else(|| Error::MalformedBinary {
    offset: flags_at,
    reason: format!("reserved flag bits set in 0x{flags_byte:02x}"),
  })?;

  let section_count = cursor.u8()?;
  let mut sections = Vec::with_capacity(section_count as usize);
  for _ in 0..section_count {
    let entry_at = cursor.position();
    let byte = cursor.u8()?;
    let tag = SectionTag::try_from(byte).map_err(|_| Error::MalformedBinary {
      offset: entry_at,
      reason: format!("unknown section tag 0x{byte:02x}"),
    })?;
    let offset = cursor.u32()? as usize;
    let size = cursor.u32()? as usize;
    if offset.checked_add(size).map_or(true, |end| end > bytes.len()) {
      return Err(Error::MalformedBinary {
        offset: entry_at,
        reason: format!("section `{}` lies outside the buffer", tag.name()),
      });
    }
    sections.push((tag, offset, size));
  }

  let section = |tag: SectionTag| -> Result<(usize, usize)> {
    sections
      .iter()
      .find(|(found, ..)| *found == tag)
      .map(|&(_, offset, size)| (offset, size))
      .ok_or(Error::MissingSection(tag.name()))
  };
  for tag in SectionTag::ALL {
    section(tag)?;
  }

  let (offset, size) = section(SectionTag::SymbolTable)?;
  let interner = read_symbol_table(&mut Cursor::section(bytes, offset, size))?;

  let (offset, size) = section(SectionTag::ConstantPool)?;
  let pool = read_constant_pool(&mut Cursor::section(bytes, offset, size), &interner)?;

  let (offset, size) = section(SectionTag::ProcedureTable)?;
  read_procedure_table(&mut Cursor::section(bytes, offset, size))?;

  let (offset, code_size) = section(SectionTag::Bytecode)?;
  let code = read_code(
    &mut Cursor::section(bytes, offset, code_size),
    offset,
    &interner,
    &pool,
  )?;

  Ok(LoadedUnit {
    version,
    word_size,
    flags,
    interner,
    pool,
    code,
    code_size,
  })
}

fn read_symbol_table(cursor: &mut Cursor) -> Result<Interner> {
  let count = cursor.u32()?;
  let mut interner = Interner::new();
  for _ in 0..count {
    let entry_at = cursor.position();
    let id = cursor.u32()?;
    let len = cursor.u16()? as usize;
    let bytes = cursor.take(len)?;
    let name = std::str::from_utf8(bytes).map_err(|_| Error::MalformedBinary {
      offset: entry_at,
      reason: "invalid utf-8 in symbol name".to_string(),
    })?;
    let assigned = interner.intern(name);
    if assigned.0 != id {
      return Err(Error::MalformedBinary {
        offset: entry_at,
        reason: format!("symbol id {id} out of insertion order"),
      });
    }
  }
  expect_section_end(cursor, "symbol table")?;
  Ok(interner)
}

fn read_constant_pool(cursor: &mut Cursor, interner: &Interner) -> Result<Vec<BcData>> {
  let count = cursor.u32()?;
  let mut pool = Vec::new();
  for _ in 0..count {
    let entry_at = cursor.position();
    let tag_byte = cursor.u8()?;
    let len = cursor.u16()? as usize;
    let payload = cursor.take(len)?;

    let (tag, low) = data::split_tag_byte(tag_byte, entry_at)?;

    // The payload bytes are the canonical per-tag encoding, so pool
    // entries and instruction operands decode through one code path.
    let payload_at = entry_at + 3;
    let mut pos = 0;
    let entry =
      BcData::decode_payload(tag, low, payload, &mut pos).map_err(|err| rebase(err, payload_at))?;
    if pos != payload.len() {
      return Err(Error::MalformedBinary {
        offset: entry_at,
        reason: format!("constant payload length {len} does not match its tag"),
      });
    }
    match entry {
      BcData::Sym(id) | BcData::Ident(id) if !interner.contains(id) => {
        return Err(Error::UnknownSymbol { id: id.0 });
      }
      _ => {}
    }
    pool.push(entry);
  }
  expect_section_end(cursor, "constant pool")?;
  Ok(pool)
}

fn read_procedure_table(cursor: &mut Cursor) -> Result<()> {
  let at = cursor.position();
  let count = cursor.u32()?;
  if count != 0 {
    return Err(Error::MalformedBinary {
      offset: at,
      reason: format!("procedure table is reserved but holds {count} entries"),
    });
  }
  expect_section_end(cursor, "procedure table")
}

fn read_code(
  cursor: &mut Cursor,
  section_start: usize,
  interner: &Interner,
  pool: &[BcData],
) -> Result<Vec<(usize, Instruction)>> {
  let size = cursor.end - section_start;
  let mut code = Vec::new();
  while !cursor.at_end() {
    let at = cursor.position();
    let offset = at - section_start;
    let byte = cursor.u8()?;
    let op = Opcode::try_from(byte).map_err(|_| Error::UnknownOpcode { byte, offset: at })?;
    if op == Opcode::Label {
      return Err(Error::IllegalLabelInBinary { offset: at });
    }
    let mut operands = Vec::with_capacity(op.arity());
    for _ in 0..op.arity() {
      operands.push(cursor.data()?);
    }
    let instruction = Instruction::with(op, operands);
    validate_instruction(&instruction, offset, size, interner, pool, at)?;
    code.push((offset, instruction));
  }
  Ok(code)
}

fn validate_instruction(
  instruction: &Instruction,
  offset: usize,
  section_size: usize,
  interner: &Interner,
  pool: &[BcData],
  at: usize,
) -> Result<()> {
  let first = instruction.operands.first();
  match instruction.op {
    Opcode::LoadVar | Opcode::StoreVar => {
      let id = first.and_then(BcData::as_ident).ok_or_else(|| Error::MalformedBinary {
        offset: at,
        reason: format!("{} expects an ident operand", instruction.op),
      })?;
      if !interner.contains(id) {
        return Err(Error::UnknownSymbol { id: id.0 });
      }
    }
    Opcode::LoadConst => {
      let index = first.and_then(BcData::as_int).ok_or_else(|| Error::MalformedBinary {
        offset: at,
        reason: "load_const expects an int operand".to_string(),
      })?;
      if usize::try_from(index).map_or(true, |index| index >= pool.len()) {
        return Err(Error::MalformedBinary {
          offset: at,
          reason: format!("constant index {index} out of range"),
        });
      }
    }
    op if op.takes_label() => {
      let delta = first.and_then(BcData::as_int).ok_or_else(|| Error::MalformedBinary {
        offset: at,
        reason: format!("{} expects a resolved target operand", instruction.op),
      })?;
      let target = offset as i64 + delta as i64;
      if target < 0 || target > section_size as i64 {
        return Err(Error::MalformedBinary {
          offset: at,
          reason: format!("jump target {target} outside the code section"),
        });
      }
    }
    _ => {}
  }
  Ok(())
}

fn expect_section_end(cursor: &Cursor, what: &str) -> Result<()> {
  if cursor.at_end() {
    Ok(())
  } else {
    Err(Error::MalformedBinary {
      offset: cursor.position(),
      reason: format!("trailing bytes in {what}"),
    })
  }
}

fn rebase(err: Error, base: usize) -> Error {
  match err {
    Error::TruncatedBinary { offset } => Error::TruncatedBinary {
      offset: offset + base,
    },
    Error::MalformedBinary { offset, reason } => Error::MalformedBinary {
      offset: offset + base,
      reason,
    },
    Error::UnknownTag { byte, offset } => Error::UnknownTag {
      byte,
      offset: offset + base,
    },
    other => other,
  }
}
