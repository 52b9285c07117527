use byteorder::{ByteOrder, LittleEndian};

use super::{SectionTag, UnitFlags, HEADER_SIZE, MAGIC, SECTION_ENTRY_SIZE, VERSION, WORD_SIZE};
use crate::bytecode::{BcData, Instruction, Opcode};
use crate::emit::Unit;
use crate::error::{Error, Result};

pub const INITIAL_BUFFER_SIZE: usize = 256;
pub const GROWTH_FACTOR: usize = 2;
pub const MAX_BUFFER_SIZE: usize = 1 << 26;

/// Output buffer that grows geometrically up to a hard cap.
///
/// Capacity is managed explicitly: a write that would push the buffer
/// past [`MAX_BUFFER_SIZE`] fails with `BufferOverflow` instead of
/// allocating.
#[derive(Debug)]
pub struct ByteWriter {
  buf: Vec<u8>,
  cap: usize,
}

impl ByteWriter {
  pub fn new() -> Self {
    Self {
      buf: Vec::with_capacity(INITIAL_BUFFER_SIZE),
      cap: INITIAL_BUFFER_SIZE,
    }
  }

  fn grow_for(&mut self, extra: usize) -> Result<()> {
    let needed = self
      .buf
      .len()
      .checked_add(extra)
      .ok_or(Error::BufferOverflow {
        requested: usize::MAX,
        max: MAX_BUFFER_SIZE,
      })?;
    if needed <= self.cap {
      return Ok(());
    }
    if needed > MAX_BUFFER_SIZE {
      return Err(Error::BufferOverflow {
        requested: needed,
        max: MAX_BUFFER_SIZE,
      });
    }
    let mut cap = self.cap;
    while cap < needed {
      cap = (cap * GROWTH_FACTOR).min(MAX_BUFFER_SIZE);
    }
    self.buf.reserve_exact(cap - self.buf.len());
    self.cap = cap;
    Ok(())
  }

  pub fn u8(&mut self, value: u8) -> Result<()> {
    self.grow_for(1)?;
    self.buf.push(value);
    Ok(())
  }

  pub fn u16(&mut self, value: u16) -> Result<()> {
    let mut bytes = [0; 2];
    LittleEndian::write_u16(&mut bytes, value);
    self.bytes(&bytes)
  }

  pub fn u32(&mut self, value: u32) -> Result<()> {
    let mut bytes = [0; 4];
    LittleEndian::write_u32(&mut bytes, value);
    self.bytes(&bytes)
  }

  pub fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
    self.grow_for(bytes.len())?;
    self.buf.extend_from_slice(bytes);
    Ok(())
  }

  /// Overwrite four bytes written earlier, for section table fixups.
  pub fn patch_u32(&mut self, at: usize, value: u32) {
    LittleEndian::write_u32(&mut self.buf[at..at + 4], value);
  }

  pub fn position(&self) -> usize {
    self.buf.len()
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.buf
  }
}

impl Default for ByteWriter {
  fn default() -> Self {
    Self::new()
  }
}

/// Pack a compiled unit into its binary container.
pub fn serialize(unit: &Unit) -> Result<Vec<u8>> {
  let mut w = ByteWriter::new();
  w.bytes(&MAGIC)?;
  w.u16(VERSION)?;
  w.u8(WORD_SIZE)?;
  w.u8(UnitFlags::empty().bits())?;
  debug_assert_eq!(w.position(), HEADER_SIZE);

  w.u8(SectionTag::ALL.len() as u8)?;
  let table_at = w.position();
  for tag in SectionTag::ALL {
    w.u8(tag.into())?;
    w.u32(0)?;
    w.u32(0)?;
  }

  for (slot, tag) in SectionTag::ALL.into_iter().enumerate() {
    let start = w.position();
    match tag {
      SectionTag::SymbolTable => write_symbol_table(&mut w, unit)?,
      SectionTag::ConstantPool => write_constant_pool(&mut w, unit)?,
      SectionTag::ProcedureTable => w.u32(0)?,
      SectionTag::Bytecode => write_code(&mut w, &unit.code)?,
    }
    let entry = table_at + slot * SECTION_ENTRY_SIZE;
    w.patch_u32(entry + 1, start as u32);
    w.patch_u32(entry + 5, (w.position() - start) as u32);
  }

  Ok(w.into_bytes())
}

fn write_symbol_table(w: &mut ByteWriter, unit: &Unit) -> Result<()> {
  w.u32(unit.interner.len() as u32)?;
  for (id, name) in unit.interner.iter() {
    let len = u16::try_from(name.len()).map_err(|_| Error::StrTooLong(name.len()))?;
    w.u32(id.0)?;
    w.u16(len)?;
    w.bytes(name.as_bytes())?;
  }
  Ok(())
}

fn write_constant_pool(w: &mut ByteWriter, unit: &Unit) -> Result<()> {
  w.u32(unit.pool.len() as u32)?;
  let mut payload = Vec::new();
  for entry in &unit.pool {
    payload.clear();
    entry.encode_payload(&mut payload)?;
    w.u8(entry.tag_byte())?;
    w.u16(payload.len() as u16)?;
    w.bytes(&payload)?;
  }
  Ok(())
}

fn write_code(w: &mut ByteWriter, code: &[Instruction]) -> Result<()> {
  // First pass: the byte offset every instruction will land at, with
  // labels resolving to the offset of the next real instruction.
  let mut offsets = Vec::with_capacity(code.len());
  let mut at = 0usize;
  for instruction in code {
    offsets.push(at);
    if instruction.op != Opcode::Label {
      at += 1
        + instruction
          .operands
          .iter()
          .map(BcData::encoded_len)
          .sum::<usize>();
    }
  }

  let mut scratch = Vec::new();
  for (index, instruction) in code.iter().enumerate() {
    if instruction.op == Opcode::Label {
      continue;
    }
    w.u8(instruction.op.into())?;
    let here = offsets[index];
    for (slot, operand) in instruction.operands.iter().enumerate() {
      let rebased;
      let operand = if slot == 0 && instruction.op.takes_label() {
        match operand {
          // Patched target index becomes a byte delta relative to this
          // instruction, so the loaded form is position-independent.
          BcData::Int(target) => {
            let target_offset = usize::try_from(*target)
              .ok()
              .and_then(|index| offsets.get(index).copied())
              .ok_or_else(|| {
                Error::InvalidForm(format!("jump target index {target} out of range"))
              })?;
            rebased = BcData::Int((target_offset as i64 - here as i64) as i32);
            &rebased
          }
          BcData::Str(name) => return Err(Error::UnpatchedLabel(name.clone())),
          other => other,
        }
      } else {
        operand
      };
      scratch.clear();
      operand.encode(&mut scratch)?;
      w.bytes(&scratch)?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writer_grows_geometrically() {
    let mut w = ByteWriter::new();
    let chunk = [0u8; 1000];
    w.bytes(&chunk).unwrap();
    assert_eq!(w.position(), 1000);
    // 256 doubled until it covers 1000.
    assert!(w.cap >= 1024);
  }

  #[test]
  fn writer_rejects_overflow() {
    let mut w = ByteWriter::new();
    let err = w.grow_for(MAX_BUFFER_SIZE + 1).unwrap_err();
    assert_eq!(
      err,
      Error::BufferOverflow {
        requested: MAX_BUFFER_SIZE + 1,
        max: MAX_BUFFER_SIZE
      }
    );
  }

  #[test]
  fn unpatched_jump_does_not_serialize() {
    let code = [Instruction::unary(
      Opcode::Jmp,
      BcData::Str("end".to_string()),
    )];
    let mut w = ByteWriter::new();
    let err = write_code(&mut w, &code).unwrap_err();
    assert_eq!(err, Error::UnpatchedLabel("end".to_string()));
  }

  #[test]
  fn labels_are_stripped_and_jumps_rebased() {
    // jmp -> index 3 (the label), which resolves to the halt at byte 6.
    let code = [
      Instruction::unary(Opcode::Jmp, BcData::Int(3)),
      Instruction::new(Opcode::Pop),
      Instruction::new(Opcode::Pop),
      Instruction::unary(Opcode::Label, BcData::Str("end".to_string())),
      Instruction::new(Opcode::Halt),
    ];
    let mut w = ByteWriter::new();
    write_code(&mut w, &code).unwrap();
    let bytes = w.into_bytes();
    assert_eq!(
      bytes,
      [
        u8::from(Opcode::Jmp), 0x08, 8, 0, 0, 0, // delta 8 - 0 = 8
        u8::from(Opcode::Pop),
        u8::from(Opcode::Pop),
        u8::from(Opcode::Halt),
      ]
    );
  }
}
