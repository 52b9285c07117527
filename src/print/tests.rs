use indoc::indoc;

use super::*;
use crate::anf::Symbol;
use crate::lower::expand_macros;

fn no_unexpand() -> PrintOptions {
  PrintOptions {
    unexpand_macros: false,
    ..PrintOptions::default()
  }
}

fn if_form<'src>(
  test: SExpr<'src>,
  then: SExpr<'src>,
  otherwise: SExpr<'src>,
) -> SExpr<'src> {
  SExpr::form(vec![SExpr::ident("if"), test, then, otherwise])
}

#[test]
fn and_unexpansion_is_optional() {
  let lowered = if_form(
    SExpr::ident("a"),
    SExpr::ident("b"),
    SExpr::atom(Token::boolean(false)),
  );
  assert_eq!(decompile_ast(&lowered, &PrintOptions::default()), "(and a b)");
  assert_eq!(decompile_ast(&lowered, &no_unexpand()), "(if a b #f)");
}

#[test]
fn or_and_when_unexpand() {
  let or = if_form(
    SExpr::ident("a"),
    SExpr::atom(Token::boolean(true)),
    SExpr::ident("b"),
  );
  assert_eq!(decompile_ast(&or, &PrintOptions::default()), "(or a b)");

  let when = if_form(
    SExpr::ident("t"),
    SExpr::ident("x"),
    SExpr::atom(Token::void()),
  );
  assert_eq!(decompile_ast(&when, &PrintOptions::default()), "(when t x)");
}

#[test]
fn disagreeing_hint_vetoes_unexpansion() {
  let lowered = SExpr::form_with_hint(
    vec![
      SExpr::ident("if"),
      SExpr::ident("a"),
      SExpr::ident("b"),
      SExpr::atom(Token::boolean(false)),
    ],
    MacroKind::Or,
  );
  assert_eq!(decompile_ast(&lowered, &PrintOptions::default()), "(if a b #f)");
}

#[test]
fn nested_and_flattens() {
  let surface = SExpr::form(vec![
    SExpr::ident("and"),
    SExpr::ident("a"),
    SExpr::ident("b"),
    SExpr::ident("c"),
  ]);
  let lowered = expand_macros(&surface);
  assert_eq!(decompile_ast(&lowered, &PrintOptions::default()), "(and a b c)");
}

#[test]
fn nested_or_flattens() {
  let surface = SExpr::form(vec![
    SExpr::ident("or"),
    SExpr::ident("a"),
    SExpr::ident("b"),
    SExpr::ident("c"),
  ]);
  let lowered = expand_macros(&surface);
  assert_eq!(decompile_ast(&lowered, &PrintOptions::default()), "(or a b c)");
}

#[test]
fn void_call_unexpands_to_the_void_token() {
  let call = SExpr::form(vec![SExpr::ident("void")]);
  assert_eq!(decompile_ast(&call, &PrintOptions::default()), "#<void>");
  assert_eq!(decompile_ast(&call, &no_unexpand()), "(void)");
}

#[test]
fn hinted_cond_round_trips() {
  let surface = SExpr::form(vec![
    SExpr::ident("cond"),
    SExpr::form(vec![SExpr::ident("a"), SExpr::atom(Token::num("1"))]),
    SExpr::form(vec![SExpr::ident("else"), SExpr::atom(Token::num("2"))]),
  ]);
  let lowered = expand_macros(&surface);
  assert_eq!(
    decompile_ast(&lowered, &PrintOptions::default()),
    "(cond (a 1) (else 2))"
  );
}

#[test]
fn unhinted_if_chains_stay_if_chains() {
  // Looks like a cond expansion, but carries no hint.
  let lowered = if_form(
    SExpr::ident("a"),
    SExpr::atom(Token::num("1")),
    if_form(
      SExpr::ident("b"),
      SExpr::atom(Token::num("2")),
      SExpr::atom(Token::num("3")),
    ),
  );
  assert_eq!(
    decompile_ast(&lowered, &PrintOptions::default()),
    "(if a 1 (if b 2 3))"
  );
}

#[test]
fn unexpand_then_reexpand_is_structural_identity() {
  let surfaces = [
    SExpr::form(vec![
      SExpr::ident("and"),
      SExpr::ident("a"),
      SExpr::ident("b"),
      SExpr::ident("c"),
    ]),
    SExpr::form(vec![
      SExpr::ident("or"),
      SExpr::ident("a"),
      SExpr::ident("b"),
    ]),
    SExpr::form(vec![
      SExpr::ident("when"),
      SExpr::ident("t"),
      SExpr::ident("x"),
    ]),
  ];
  for surface in surfaces {
    let lowered = expand_macros(&surface);
    let recovered = unexpand(&lowered).expect("lowered shape should un-expand");
    assert_eq!(expand_macros(&recovered), lowered);
  }
}

#[test]
fn long_forms_wrap() {
  let form = SExpr::form(vec![
    SExpr::ident("f"),
    SExpr::ident("a"),
    SExpr::ident("b"),
    SExpr::ident("c"),
    SExpr::ident("d"),
  ]);
  assert_eq!(
    decompile_ast(&form, &PrintOptions::default()),
    indoc! {"
      (f
        a
        b
        c
        d)"}
  );
  let closing = PrintOptions {
    closing_on_new_line: true,
    ..PrintOptions::default()
  };
  assert_eq!(
    decompile_ast(&form, &closing),
    indoc! {"
      (f
        a
        b
        c
        d
      )"}
  );
}

#[test]
fn wrapped_children_propagate_wrapping() {
  let inner = SExpr::form(vec![
    SExpr::ident("g"),
    SExpr::ident("a"),
    SExpr::ident("b"),
    SExpr::ident("c"),
    SExpr::ident("d"),
  ]);
  let outer = SExpr::form(vec![SExpr::ident("f"), inner]);
  assert_eq!(
    decompile_ast(&outer, &PrintOptions::default()),
    indoc! {"
      (f
        (g
          a
          b
          c
          d))"}
  );
}

#[test]
fn literal_rendering() {
  let options = PrintOptions::default();
  assert_eq!(
    decompile_ast(&SExpr::atom(Token::sym("foo")), &options),
    "'foo"
  );
  assert_eq!(
    decompile_ast(&SExpr::atom(Token::sym("a b")), &options),
    "'|a b|"
  );
  assert_eq!(
    decompile_ast(&SExpr::atom(Token::string("hi \"there\"")), &options),
    r#""hi \"there\"""#
  );
  assert_eq!(
    decompile_ast(&SExpr::atom(Token::character("c")), &options),
    "#\\c"
  );
  assert_eq!(
    decompile_ast(&SExpr::atom(Token::boolean(true)), &options),
    "#t"
  );
  assert_eq!(decompile_ast(&SExpr::atom(Token::void()), &options), "#<void>");
  assert_eq!(
    decompile_ast(
      &SExpr::quoted(vec![
        SExpr::atom(Token::num("1")),
        SExpr::atom(Token::num("2")),
      ]),
      &options,
    ),
    "'(1 2)"
  );
}

#[test]
fn anf_rendering() {
  let binding = Anf::let_(
    Symbol::interned("x"),
    Anf::literal(Token::num("1")),
    Anf::app(Anf::var("+"), vec![Anf::var("x"), Anf::var("x")]),
  );
  assert_eq!(decompile_anf(&binding), "(let ((x 1)) (+ x x))");

  let lambda = Anf::lambda(
    vec![Symbol::interned("n")],
    Anf::app(Anf::var("f"), vec![Anf::var("n")]),
  );
  assert_eq!(decompile_anf(&lambda), "(lambda (n) (f n))");

  let branch = Anf::if_(Anf::var("p"), Anf::var("a"), Anf::var("b"));
  assert_eq!(decompile_anf(&branch), "(if p a b)");

  let temp = Anf::Var(Symbol::fresh("%t", 0));
  assert_eq!(decompile_anf(&temp), "%t0");
}
