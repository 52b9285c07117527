use std::collections::VecDeque;

use crate::anf::{Anf, App, If, Lambda, Let, Program, Symbol};
use crate::ast::{Token, TokenKind};
use crate::bytecode::data::Tag;
use crate::bytecode::{BcData, BytecodeBuilder, Instruction, Opcode};
use crate::error::{Error, Result};
use crate::intern::{Interner, SymId};
use crate::util::with_stack;

/// A compiled program: the flat instruction list plus the tables its
/// operands index into.
#[derive(Debug)]
pub struct Unit {
  pub name: String,
  pub code: Vec<Instruction>,
  pub interner: Interner,
  pub pool: Vec<BcData>,
}

/// Lower an ANF program to a label-patched instruction list.
pub fn emit(program: &Program<'_>) -> Result<Unit> {
  let mut state = State::new();
  state.node(&program.body, false)?;
  state.builder.emit(Instruction::new(Opcode::Halt));

  // Lambda bodies compile into separate blocks after the main stream;
  // compiling one may queue more.
  while let Some((label, lambda)) = state.pending.pop_front() {
    state.builder.label(label);
    state.node(&lambda.body, true)?;
    state.builder.emit(Instruction::new(Opcode::Return));
  }

  state.builder.patch_labels()?;
  let (code, pool) = state.builder.finish();
  Ok(Unit {
    name: program.name.clone(),
    code,
    interner: state.interner,
    pool,
  })
}

struct State<'a, 'src> {
  interner: Interner,
  builder: BytecodeBuilder,
  next_label: u32,
  pending: VecDeque<(String, &'a Lambda<'src>)>,
}

impl<'a, 'src> State<'a, 'src> {
  fn new() -> Self {
    Self {
      interner: Interner::new(),
      builder: BytecodeBuilder::new(),
      next_label: 0,
      pending: VecDeque::new(),
    }
  }

  fn label_name(&mut self, kind: &str) -> String {
    let n = self.next_label;
    self.next_label += 1;
    format!("{kind}_{n}")
  }

  fn symbol(&mut self, sym: &Symbol<'src>) -> SymId {
    if sym.interned {
      self.interner.intern(sym.name.as_ref())
    } else {
      self.interner.intern(&sym.to_string())
    }
  }

  fn load_const(&mut self, value: BcData) {
    let index = self.builder.pool().insert(value);
    self
      .builder
      .emit(Instruction::unary(Opcode::LoadConst, BcData::Int(index as i32)));
  }

  /// Every node leaves exactly one value on the operand stack.
  fn node(&mut self, node: &'a Anf<'src>, tail: bool) -> Result<()> {
    with_stack(|| match node {
      Anf::Literal(token) => {
        let value = self.literal(token)?;
        self.load_const(value);
        Ok(())
      }
      Anf::Var(sym) => {
        let id = self.symbol(sym);
        self
          .builder
          .emit(Instruction::unary(Opcode::LoadVar, BcData::Ident(id)));
        Ok(())
      }
      Anf::Let(binding) => self.binding(binding, tail),
      Anf::If(branch) => self.branch(branch, tail),
      Anf::App(app) => self.app(app, tail),
      Anf::Lambda(lambda) => {
        let label = self.label_name("lambda");
        self.builder.emit(Instruction::with(
          Opcode::MakeClosure,
          vec![
            BcData::Str(label.clone()),
            BcData::Int(lambda.params.len() as i32),
          ],
        ));
        self.pending.push_back((label, lambda));
        Ok(())
      }
    })
  }

  fn binding(&mut self, binding: &'a Let<'src>, tail: bool) -> Result<()> {
    self.node(&binding.value, false)?;
    let id = self.symbol(&binding.name);
    self
      .builder
      .emit(Instruction::unary(Opcode::StoreVar, BcData::Ident(id)));
    self.node(&binding.body, tail)
  }

  fn branch(&mut self, branch: &'a If<'src>, tail: bool) -> Result<()> {
    let else_label = self.label_name("else");
    let end_label = self.label_name("end");
    self.node(&branch.cond, false)?;
    self.builder.emit(Instruction::unary(
      Opcode::JmpFalse,
      BcData::Str(else_label.clone()),
    ));
    self.node(&branch.then, tail)?;
    self
      .builder
      .emit(Instruction::unary(Opcode::Jmp, BcData::Str(end_label.clone())));
    self.builder.label(else_label);
    self.node(&branch.otherwise, tail)?;
    self.builder.label(end_label);
    Ok(())
  }

  fn app(&mut self, app: &'a App<'src>, tail: bool) -> Result<()> {
    if let Anf::Var(sym) = &app.callee {
      if sym.interned {
        match sym.name.as_ref() {
          "begin" => return self.begin(&app.args, tail),
          "set!" => return self.set_var(&app.args),
          "while" => return self.while_loop(&app.args),
          "void" if app.args.is_empty() => {
            self.load_const(BcData::Nil);
            return Ok(());
          }
          name => {
            if let Some(op) = builtin_op(name, app.args.len()) {
              for arg in &app.args {
                self.node(arg, false)?;
              }
              self.builder.emit(Instruction::new(op));
              return Ok(());
            }
          }
        }
      }
    }

    for arg in &app.args {
      self.node(arg, false)?;
    }
    self.node(&app.callee, false)?;
    let op = if tail { Opcode::TailCall } else { Opcode::Call };
    self
      .builder
      .emit(Instruction::unary(op, BcData::Int(app.args.len() as i32)));
    Ok(())
  }

  fn begin(&mut self, args: &'a [Anf<'src>], tail: bool) -> Result<()> {
    let Some((last, rest)) = args.split_last() else {
      self.load_const(BcData::Nil);
      return Ok(());
    };
    for arg in rest {
      self.node(arg, false)?;
      // Discard the sequencing result.
      self.builder.emit(Instruction::new(Opcode::Pop));
    }
    self.node(last, tail)
  }

  fn set_var(&mut self, args: &'a [Anf<'src>]) -> Result<()> {
    let [Anf::Var(sym), value] = args else {
      return Err(Error::InvalidForm(
        "set! expects a variable and a value".to_string(),
      ));
    };
    self.node(value, false)?;
    let id = self.symbol(sym);
    self
      .builder
      .emit(Instruction::unary(Opcode::StoreVar, BcData::Ident(id)));
    self.load_const(BcData::Nil);
    Ok(())
  }

  fn while_loop(&mut self, args: &'a [Anf<'src>]) -> Result<()> {
    let [cond, body] = args else {
      return Err(Error::InvalidForm(
        "while expects a condition and a body".to_string(),
      ));
    };
    let loop_label = self.label_name("loop");
    let end_label = self.label_name("end");

    self.builder.label(loop_label.clone());
    self.node(cond, false)?;
    // The guard is a strict boolean test.
    self.load_const(BcData::Bool(true));
    self.builder.emit(Instruction::new(Opcode::CmpEq));
    self.builder.emit(Instruction::unary(
      Opcode::JmpFalse,
      BcData::Str(end_label.clone()),
    ));
    self.node(body, false)?;
    self.builder.emit(Instruction::new(Opcode::Pop));
    self
      .builder
      .emit(Instruction::unary(Opcode::Jmp, BcData::Str(loop_label)));
    self.builder.label(end_label);
    self.load_const(BcData::Nil);
    Ok(())
  }

  fn literal(&mut self, token: &Token<'src>) -> Result<BcData> {
    let text = token.text.as_ref();
    match token.kind {
      TokenKind::Num => {
        if let Ok(value) = text.parse::<i32>() {
          Ok(BcData::Int(value))
        } else if let Ok(value) = text.parse::<f64>() {
          Ok(BcData::Float(value))
        } else {
          Err(Error::MalformedLiteral(text.to_string()))
        }
      }
      TokenKind::Str => Ok(BcData::Str(text.to_string())),
      TokenKind::Bool => match text {
        "#t" => Ok(BcData::Bool(true)),
        "#f" => Ok(BcData::Bool(false)),
        _ => Err(Error::MalformedLiteral(text.to_string())),
      },
      TokenKind::Sym => Ok(BcData::Sym(self.interner.intern(text))),
      // Characters travel as one-character strings.
      TokenKind::Char => Ok(BcData::Str(text.to_string())),
      TokenKind::Void => Ok(BcData::Nil),
      TokenKind::Ident => Ok(BcData::Ident(self.interner.intern(text))),
      TokenKind::List | TokenKind::Multi => Err(Error::UnsupportedTag(Tag::List)),
      TokenKind::Procedure => Err(Error::UnsupportedTag(Tag::Proc)),
      _ => Err(Error::MalformedLiteral(text.to_string())),
    }
  }
}

/// Operators the compiler opens directly into arithmetic/logic opcodes
/// when called with the matching arity. Anything else goes through
/// `CALL`.
fn builtin_op(name: &str, argc: usize) -> Option<Opcode> {
  Some(match (name, argc) {
    ("+", 2) => Opcode::Add,
    ("-", 2) => Opcode::Sub,
    ("-", 1) | ("neg", 1) => Opcode::Neg,
    ("*", 2) => Opcode::Mul,
    ("/", 2) => Opcode::Div,
    ("=", 2) => Opcode::CmpEq,
    ("<", 2) => Opcode::CmpLt,
    (">", 2) => Opcode::CmpGt,
    ("and", 2) => Opcode::And,
    ("or", 2) => Opcode::Or,
    ("xor", 2) => Opcode::Xor,
    ("not", 1) => Opcode::Not,
    _ => return None,
  })
}
