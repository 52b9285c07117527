use parens::anf::Symbol;
use parens::ast::Token;
use parens::bytecode::Tag;
use parens::{compile, decompile_anf, disassemble, lower, Anf, Error, Program, SExpr};

// x := 10; while x > 0: x := x - 1
fn countdown() -> Program<'static> {
  let cond = Anf::app(
    Anf::var(">"),
    vec![Anf::var("x"), Anf::literal(Token::num("0"))],
  );
  let step = Anf::app(
    Anf::var("set!"),
    vec![
      Anf::var("x"),
      Anf::app(
        Anf::var("-"),
        vec![Anf::var("x"), Anf::literal(Token::num("1"))],
      ),
    ],
  );
  Program::new(
    "countdown",
    Anf::let_(
      Symbol::interned("x"),
      Anf::literal(Token::num("10")),
      Anf::app(Anf::var("while"), vec![cond, step]),
    ),
  )
}

fn section_entry(bytes: &[u8], slot: usize) -> (u8, usize, usize) {
  let at = 9 + slot * 9;
  let tag = bytes[at];
  let offset = u32::from_le_bytes(bytes[at + 1..at + 5].try_into().unwrap()) as usize;
  let size = u32::from_le_bytes(bytes[at + 5..at + 9].try_into().unwrap()) as usize;
  (tag, offset, size)
}

#[test]
fn countdown_compiles_and_disassembles() {
  let bytes = compile(&countdown()).unwrap();
  let report = disassemble(&bytes).unwrap();

  assert!(report.contains("parens bytecode v1"), "{report}");
  assert!(report.contains("symbols (1):"), "{report}");
  assert!(report.contains("  0: x"), "{report}");
  assert!(report.contains("constants (5):"), "{report}");
  assert!(report.contains("code (77 bytes):"), "{report}");
  assert!(report.contains("jmp_false 38 => 70"), "{report}");
  assert!(report.contains("jmp -52 => 12"), "{report}");

  // Labels are stripped; each of the remaining instructions is listed
  // exactly once.
  let listed = report.lines().filter(|line| line.contains(" | ")).count();
  assert_eq!(listed, 17);
  assert!(!report.contains("label"), "{report}");
}

#[test]
fn compilation_is_deterministic() {
  assert_eq!(compile(&countdown()).unwrap(), compile(&countdown()).unwrap());
}

#[test]
fn header_layout_holds() {
  let bytes = compile(&countdown()).unwrap();

  assert_eq!(&bytes[..4], b"(bc)");
  assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
  assert_eq!(bytes[6], 8);
  assert_eq!(bytes[7], 0);
  assert_eq!(bytes[8], 4);

  let mut seen = Vec::new();
  for slot in 0..4 {
    let (tag, offset, size) = section_entry(&bytes, slot);
    assert!(offset + size <= bytes.len());
    seen.push(tag);
  }
  seen.sort_unstable();
  assert_eq!(seen, [1, 2, 3, 4]);
}

#[test]
fn bad_magic_fails_before_anything_else() {
  let mut bytes = compile(&countdown()).unwrap();
  bytes[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
  assert_eq!(
    disassemble(&bytes).unwrap_err(),
    Error::BadMagic {
      found: [0xde, 0xad, 0xbe, 0xef]
    }
  );
}

#[test]
fn unsupported_version_is_rejected() {
  let mut bytes = compile(&countdown()).unwrap();
  bytes[4] = 2;
  assert_eq!(disassemble(&bytes).unwrap_err(), Error::UnsupportedVersion(2));
}

#[test]
fn reserved_flag_bits_are_rejected() {
  let mut bytes = compile(&countdown()).unwrap();
  bytes[7] = 0x80;
  assert!(matches!(
    disassemble(&bytes).unwrap_err(),
    Error::MalformedBinary { offset: 7, .. }
  ));
}

#[test]
fn missing_section_is_rejected() {
  let mut bytes = compile(&countdown()).unwrap();
  // Drop the last section table entry (the bytecode section).
  bytes[8] = 3;
  assert_eq!(
    disassemble(&bytes).unwrap_err(),
    Error::MissingSection("bytecode")
  );
}

#[test]
fn label_opcodes_do_not_load() {
  let mut bytes = compile(&countdown()).unwrap();
  let (_, offset, size) = section_entry(&bytes, 3);
  let halt_at = offset + size - 1;
  bytes[halt_at] = 0x08;
  assert_eq!(
    disassemble(&bytes).unwrap_err(),
    Error::IllegalLabelInBinary { offset: halt_at }
  );
}

#[test]
fn unknown_opcodes_do_not_load() {
  let mut bytes = compile(&countdown()).unwrap();
  let (_, offset, size) = section_entry(&bytes, 3);
  let halt_at = offset + size - 1;
  bytes[halt_at] = 0xee;
  assert_eq!(
    disassemble(&bytes).unwrap_err(),
    Error::UnknownOpcode {
      byte: 0xee,
      offset: halt_at
    }
  );
}

#[test]
fn truncated_code_sections_do_not_load() {
  let mut bytes = compile(&countdown()).unwrap();
  let (_, offset, size) = section_entry(&bytes, 3);
  // Turn the final halt into an instruction that expects an operand.
  let halt_at = offset + size - 1;
  bytes[halt_at] = 0x02;
  assert_eq!(
    disassemble(&bytes).unwrap_err(),
    Error::TruncatedBinary { offset: halt_at + 1 }
  );
}

#[test]
fn reserved_pool_tags_do_not_load() {
  let mut bytes = compile(&countdown()).unwrap();
  let (_, offset, _) = section_entry(&bytes, 1);
  // First entry's tag byte sits right after the u32 count.
  bytes[offset + 4] = 0x07 << 3;
  assert_eq!(disassemble(&bytes).unwrap_err(), Error::UnsupportedTag(Tag::List));
}

#[test]
fn dangling_symbol_references_do_not_load() {
  let program = Program::new("sym", Anf::literal(Token::sym("foo")));
  let mut bytes = compile(&program).unwrap();
  let (_, offset, _) = section_entry(&bytes, 1);
  // Rewrite the SYM entry's payload to an id the table does not hold.
  bytes[offset + 7..offset + 11].copy_from_slice(&99u32.to_le_bytes());
  assert_eq!(disassemble(&bytes).unwrap_err(), Error::UnknownSymbol { id: 99 });
}

#[test]
fn pool_entries_round_trip_through_the_container() {
  use parens::bytecode::BcData;

  let program = Program::new(
    "literals",
    Anf::app(
      Anf::var("begin"),
      vec![
        Anf::literal(Token::string("hi")),
        Anf::literal(Token::num("2.5")),
        Anf::literal(Token::sym("foo")),
        Anf::literal(Token::num("42")),
      ],
    ),
  );
  let bytes = compile(&program).unwrap();
  let unit = parens::binary::load(&bytes).unwrap();

  assert_eq!(
    unit.pool,
    [
      BcData::Str("hi".to_string()),
      BcData::Float(2.5),
      BcData::Sym(parens::SymId(0)),
      BcData::Int(42),
    ]
  );
  assert_eq!(unit.interner.get(parens::SymId(0)), Some("foo"));
}

#[test]
fn deeply_nested_programs_compile_and_print() {
  let mut body = Anf::literal(Token::num("0"));
  for i in (0..10_000).rev() {
    body = Anf::let_(
      Symbol::interned(format!("x{i}")),
      Anf::literal(Token::num("1")),
      body,
    );
  }
  let program = Program::new("deep", body);

  let bytes = compile(&program).unwrap();
  assert_eq!(&bytes[..4], b"(bc)");

  let text = decompile_anf(&program.body);
  assert!(text.starts_with("(let ((x0 1))"));
}

#[test]
fn deeply_nested_surface_forms_lower() {
  let mut expr = SExpr::ident("x");
  for _ in 0..10_000 {
    expr = SExpr::form(vec![SExpr::ident("not"), expr]);
  }
  let anf = lower(&expr).unwrap();
  let program = Program::new("deep", anf);
  compile(&program).unwrap();
}
