use std::fmt::{self, Display};

use super::builder::Instruction;
use super::data::BcData;
use super::opcode::Opcode;
use crate::ast::quote_symbol;
use crate::binary::LoadedUnit;
use crate::intern::Interner;
use crate::util::num_digits;

/// Human-readable report over a loaded unit: header block, symbol table,
/// constant pool, and the instruction listing.
pub struct Disassembly<'a> {
  unit: &'a LoadedUnit,
}

impl<'a> Disassembly<'a> {
  pub fn new(unit: &'a LoadedUnit) -> Self {
    Self { unit }
  }
}

impl Display for Disassembly<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let unit = self.unit;

    writeln!(f, "parens bytecode v{}", unit.version)?;
    writeln!(f, "word size: {}", unit.word_size)?;
    if unit.flags.is_empty() {
      writeln!(f, "flags: (none)")?;
    } else {
      let names: Vec<String> = unit
        .flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
      writeln!(f, "flags: {}", names.join(", "))?;
    }

    writeln!(f)?;
    writeln!(f, "symbols ({}):", unit.interner.len())?;
    for (id, name) in unit.interner.iter() {
      writeln!(f, "  {id}: {name}")?;
    }

    writeln!(f)?;
    writeln!(f, "constants ({}):", unit.pool.len())?;
    for (index, entry) in unit.pool.iter().enumerate() {
      writeln!(f, "  {index}: {}", constant_entry(entry, &unit.interner))?;
    }

    writeln!(f)?;
    writeln!(f, "code ({} bytes):", unit.code_size)?;
    let width = num_digits(unit.code_size);
    for (offset, instruction) in &unit.code {
      writeln!(
        f,
        "  {}",
        line(*offset, width, instruction, &unit.interner, &unit.pool)
      )?;
    }
    Ok(())
  }
}

/// One listing line: zero-padded offset, mnemonic, operands, and the
/// resolved annotation where the instruction has one.
fn line(
  offset: usize,
  width: usize,
  instruction: &Instruction,
  interner: &Interner,
  pool: &[BcData],
) -> String {
  let mut out = format!("{offset:0width$} | {}", instruction.op.name());
  for operand in &instruction.operands {
    out.push(' ');
    out.push_str(&operand.to_string());
  }

  let first = instruction.operands.first();
  match instruction.op {
    Opcode::LoadConst => {
      let entry = first
        .and_then(BcData::as_int)
        .and_then(|index| usize::try_from(index).ok())
        .and_then(|index| pool.get(index));
      if let Some(entry) = entry {
        out.push_str(" ; ");
        out.push_str(&constant_value(entry, interner));
      }
    }
    Opcode::LoadVar | Opcode::StoreVar => {
      if let Some(name) = first.and_then(BcData::as_ident).and_then(|id| interner.get(id)) {
        out.push_str(" ; ");
        out.push_str(name);
      }
    }
    op if op.takes_label() => {
      if let Some(delta) = first.and_then(BcData::as_int) {
        out.push_str(&format!(" => {}", offset as i64 + delta as i64));
      }
    }
    _ => {}
  }
  out
}

/// A constant-pool listing entry: tag name plus rendered value.
fn constant_entry(entry: &BcData, interner: &Interner) -> String {
  match entry {
    BcData::Nil => "nil".to_string(),
    _ => format!("{} {}", entry.tag().name(), constant_value(entry, interner)),
  }
}

/// The value half of an annotation, with symbol ids resolved.
fn constant_value(entry: &BcData, interner: &Interner) -> String {
  match entry {
    BcData::Sym(id) => match interner.get(*id) {
      Some(name) => quote_symbol(name),
      None => format!("'#{}", id.0),
    },
    BcData::Ident(id) => match interner.get(*id) {
      Some(name) => name.to_string(),
      None => format!("#{}", id.0),
    },
    BcData::Str(text) => format!("{text:?}"),
    other => other.to_string(),
  }
}
