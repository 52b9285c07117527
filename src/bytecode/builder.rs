use indexmap::IndexMap;

use super::data::BcData;
use super::opcode::Opcode;
use crate::error::{Error, Result};

/// One instruction: an opcode plus the operand values it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
  pub op: Opcode,
  pub operands: Vec<BcData>,
}

impl Instruction {
  pub fn new(op: Opcode) -> Self {
    Self {
      op,
      operands: Vec::new(),
    }
  }

  pub fn unary(op: Opcode, operand: BcData) -> Self {
    Self {
      op,
      operands: vec![operand],
    }
  }

  pub fn with(op: Opcode, operands: Vec<BcData>) -> Self {
    Self { op, operands }
  }
}

/// Ordered pool of literal constants, deduplicated on insertion.
#[derive(Debug, Default)]
pub struct ConstantPool {
  entries: Vec<BcData>,
  index: IndexMap<PoolKey, usize>,
}

impl ConstantPool {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the index of `value`, inserting it if the pool does not hold
  /// an equal entry yet.
  pub fn insert(&mut self, value: BcData) -> u32 {
    let key = PoolKey::of(&value);
    if let Some(&index) = self.index.get(&key) {
      return index as u32;
    }
    let index = self.entries.len();
    self.index.insert(key, index);
    self.entries.push(value);
    index as u32
  }

  pub fn get(&self, index: u32) -> Option<&BcData> {
    self.entries.get(index as usize)
  }

  pub fn entries(&self) -> &[BcData] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

// Hashable stand-in for a pool entry; floats key on their bit pattern.
#[derive(Debug, Hash, PartialEq, Eq)]
enum PoolKey {
  Int(i32),
  Float(u64),
  Sym(u32),
  Str(String),
  Bool(bool),
  Nil,
  Ident(u32),
}

impl PoolKey {
  fn of(value: &BcData) -> Self {
    match value {
      BcData::Int(v) => PoolKey::Int(*v),
      BcData::Float(v) => PoolKey::Float(v.to_bits()),
      BcData::Sym(id) => PoolKey::Sym(id.0),
      BcData::Str(text) => PoolKey::Str(text.clone()),
      BcData::Bool(v) => PoolKey::Bool(*v),
      BcData::Nil => PoolKey::Nil,
      BcData::Ident(id) => PoolKey::Ident(id.0),
    }
  }
}

/// Sequential instruction emitter.
///
/// Label positions are recorded as `LABEL` pseudo-instructions are
/// emitted; jumps (and `MAKE_CLOSURE`) referring to a label by name are
/// collected for patching. Forward references are therefore fine as long
/// as the label is bound before `patch_labels` runs.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
  code: Vec<Instruction>,
  labels: IndexMap<String, usize>,
  patches: Vec<(usize, String)>,
  pool: ConstantPool,
}

impl BytecodeBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append an instruction.
  pub fn emit(&mut self, instruction: Instruction) {
    match instruction.op {
      Opcode::Label => {
        let Some(BcData::Str(name)) = instruction.operands.first() else {
          panic!("label instruction without a name operand");
        };
        let previous = self.labels.insert(name.clone(), self.code.len());
        assert!(previous.is_none(), "label `{name}` bound twice");
      }
      op if op.takes_label() => {
        if let Some(BcData::Str(name)) = instruction.operands.first() {
          self.patches.push((self.code.len(), name.clone()));
        }
      }
      _ => {}
    }
    self.code.push(instruction);
  }

  /// Bind `name` at the current position.
  pub fn label(&mut self, name: impl Into<String>) {
    self.emit(Instruction::unary(Opcode::Label, BcData::Str(name.into())));
  }

  pub fn pool(&mut self) -> &mut ConstantPool {
    &mut self.pool
  }

  pub fn position(&self) -> usize {
    self.code.len()
  }

  pub fn code(&self) -> &[Instruction] {
    &self.code
  }

  /// Resolve every pending label reference to the absolute index of its
  /// target in the instruction list. Labels stay in the list; they are
  /// stripped during serialization.
  pub fn patch_labels(&mut self) -> Result<()> {
    for (index, name) in std::mem::take(&mut self.patches) {
      let Some(&target) = self.labels.get(&name) else {
        return Err(Error::UnknownLabel(name));
      };
      self.code[index].operands[0] = BcData::Int(target as i32);
    }
    Ok(())
  }

  pub fn finish(self) -> (Vec<Instruction>, Vec<BcData>) {
    (self.code, self.pool.entries)
  }
}
