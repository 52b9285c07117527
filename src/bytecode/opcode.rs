use std::fmt::{self, Display};

use num_enum::{IntoPrimitive, TryFromPrimitive};

// The ISA in one block: variant, encoded byte, operand count, mnemonic.
// Operands are `BcData` values, so instruction width is variable and the
// stream stays self-describing.
macro_rules! instructions {
  ($Opcode:ident; $($name:ident = $byte:literal, $arity:literal, $render:literal;)*) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
    #[repr(u8)]
    pub enum $Opcode {
      $($name = $byte,)*
    }

    impl $Opcode {
      /// Mnemonic used in disassembly listings.
      pub fn name(self) -> &'static str {
        match self {
          $(Self::$name => $render,)*
        }
      }

      /// Number of operands the instruction carries.
      pub fn arity(self) -> usize {
        match self {
          $(Self::$name => $arity,)*
        }
      }
    }
  };
}

instructions! {
  Opcode;
  Return       = 0x01, 0, "return";
  LoadConst    = 0x02, 1, "load_const";
  LoadVar      = 0x03, 1, "load_var";
  StoreVar     = 0x04, 1, "store_var";
  Jmp          = 0x05, 1, "jmp";
  JmpTrue      = 0x06, 1, "jmp_true";
  JmpFalse     = 0x07, 1, "jmp_false";
  Label        = 0x08, 1, "label";
  Call         = 0x09, 1, "call";
  TailCall     = 0x0a, 1, "tailcall";
  MakeClosure  = 0x0b, 2, "make_closure";
  LoadClosure  = 0x0c, 1, "load_closure";
  StoreClosure = 0x0d, 1, "store_closure";
  Pop          = 0x0e, 0, "pop";
  Halt         = 0x0f, 0, "halt";
  Add          = 0x10, 0, "add";
  Sub          = 0x11, 0, "sub";
  Mul          = 0x12, 0, "mul";
  Div          = 0x13, 0, "div";
  Neg          = 0x14, 0, "neg";
  And          = 0x15, 0, "and";
  Or           = 0x16, 0, "or";
  Not          = 0x17, 0, "not";
  Xor          = 0x18, 0, "xor";
  CmpEq        = 0x19, 0, "cmp_eq";
  CmpLt        = 0x1a, 0, "cmp_lt";
  CmpGt        = 0x1b, 0, "cmp_gt";
}

impl Opcode {
  pub fn is_jump(self) -> bool {
    matches!(self, Opcode::Jmp | Opcode::JmpTrue | Opcode::JmpFalse)
  }

  /// Instructions whose first operand names a label until patching
  /// resolves it to an instruction index.
  pub fn takes_label(self) -> bool {
    self.is_jump() || self == Opcode::MakeClosure
  }
}

impl Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn byte_round_trip() {
    for byte in 0x01..=0x1bu8 {
      let op = Opcode::try_from(byte).unwrap();
      assert_eq!(u8::from(op), byte);
    }
    assert!(Opcode::try_from(0x00).is_err());
    assert!(Opcode::try_from(0x1c).is_err());
    assert!(Opcode::try_from(0xff).is_err());
  }

  #[test]
  fn arity_table() {
    assert_eq!(Opcode::MakeClosure.arity(), 2);
    for op in [
      Opcode::LoadConst,
      Opcode::LoadVar,
      Opcode::StoreVar,
      Opcode::Jmp,
      Opcode::JmpTrue,
      Opcode::JmpFalse,
      Opcode::Label,
      Opcode::Call,
      Opcode::TailCall,
      Opcode::LoadClosure,
      Opcode::StoreClosure,
    ] {
      assert_eq!(op.arity(), 1, "{op}");
    }
    for op in [Opcode::Return, Opcode::Pop, Opcode::Halt, Opcode::Add, Opcode::CmpGt] {
      assert_eq!(op.arity(), 0, "{op}");
    }
  }
}
