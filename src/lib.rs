//! Core toolchain for a small s-expression language: macro expansion and
//! lowering to ANF, compilation to a stack bytecode, a self-describing
//! binary container, and the inverse renderings (disassembler and
//! decompiler).

#[macro_use]
pub mod util;

pub mod anf;
pub mod ast;
pub mod binary;
pub mod bytecode;
pub mod emit;
pub mod error;
pub mod intern;
pub mod lower;
pub mod print;

pub use anf::{Anf, Program, Symbol};
pub use ast::{MacroKind, SExpr, Token, TokenKind};
pub use emit::{emit, Unit};
pub use error::{Error, Result};
pub use intern::{Interner, SymId};
pub use lower::{expand_macros, lower};
pub use print::{decompile_anf, decompile_ast, PrintOptions};

/// Compile an ANF program into its binary container.
pub fn compile(program: &Program<'_>) -> Result<Vec<u8>> {
  let unit = emit::emit(program)?;
  binary::serialize(&unit)
}

/// Load a binary container and render the full human-readable report:
/// header, symbol table, constant pool, and instruction listing.
pub fn disassemble(bytes: &[u8]) -> Result<String> {
  let unit = binary::load(bytes)?;
  Ok(bytecode::disasm::Disassembly::new(&unit).to_string())
}
