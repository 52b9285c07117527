use beef::lean::Cow;

/// Token kinds handed over by the surface lexer/parser.
///
/// The toolchain itself only ever constructs the literal-ish subset, but
/// the whole set is part of the input contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Num,
  Sym,
  Str,
  Bool,
  Char,
  Void,
  List,
  Form,
  Meta,
  Quote,
  Procedure,
  Multi,
  LParen,
  RParen,
  Eof,
  Error,
  Any,
}

/// A parsed token: its kind plus the printable form the lexer saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
  pub kind: TokenKind,
  pub text: Cow<'src, str>,
}

impl<'src> Token<'src> {
  pub fn new(kind: TokenKind, text: impl Into<Cow<'src, str>>) -> Self {
    Self {
      kind,
      text: text.into(),
    }
  }

  pub fn ident(text: impl Into<Cow<'src, str>>) -> Self {
    Self::new(TokenKind::Ident, text)
  }

  pub fn num(text: impl Into<Cow<'src, str>>) -> Self {
    Self::new(TokenKind::Num, text)
  }

  pub fn sym(text: impl Into<Cow<'src, str>>) -> Self {
    Self::new(TokenKind::Sym, text)
  }

  pub fn string(text: impl Into<Cow<'src, str>>) -> Self {
    Self::new(TokenKind::Str, text)
  }

  pub fn boolean(value: bool) -> Self {
    Self::new(TokenKind::Bool, if value { "#t" } else { "#f" })
  }

  pub fn character(text: impl Into<Cow<'src, str>>) -> Self {
    Self::new(TokenKind::Char, text)
  }

  pub fn void() -> Self {
    Self::new(TokenKind::Void, "#<void>")
  }
}

/// The surface macro a lowered form originated from.
///
/// Lowering attaches this to the `if` shape it produces so that
/// un-expansion can tell `(and a b)` from a hand-written
/// `(if a b #f)` with the same structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
  And,
  Or,
  When,
  Cond,
  Void,
}

impl MacroKind {
  pub fn name(self) -> &'static str {
    match self {
      MacroKind::And => "and",
      MacroKind::Or => "or",
      MacroKind::When => "when",
      MacroKind::Cond => "cond",
      MacroKind::Void => "void",
    }
  }
}

/// Whether a list node is code or quoted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
  /// `(...)` — an application or special form.
  Form,
  /// `'(...)` — quoted data.
  List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListExpr<'src> {
  pub kind: ListKind,
  pub items: Vec<SExpr<'src>>,
  pub hint: Option<MacroKind>,
}

/// A surface s-expression: an atom or a (possibly quoted) list.
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr<'src> {
  Atom(Token<'src>),
  List(Box<ListExpr<'src>>),
}

impl<'src> SExpr<'src> {
  pub fn atom(token: Token<'src>) -> Self {
    SExpr::Atom(token)
  }

  pub fn ident(name: impl Into<Cow<'src, str>>) -> Self {
    SExpr::Atom(Token::ident(name))
  }

  pub fn form(items: Vec<SExpr<'src>>) -> Self {
    SExpr::List(Box::new(ListExpr {
      kind: ListKind::Form,
      items,
      hint: None,
    }))
  }

  pub fn form_with_hint(items: Vec<SExpr<'src>>, hint: MacroKind) -> Self {
    SExpr::List(Box::new(ListExpr {
      kind: ListKind::Form,
      items,
      hint: Some(hint),
    }))
  }

  pub fn quoted(items: Vec<SExpr<'src>>) -> Self {
    SExpr::List(Box::new(ListExpr {
      kind: ListKind::List,
      items,
      hint: None,
    }))
  }

  pub fn as_atom(&self) -> Option<&Token<'src>> {
    match self {
      SExpr::Atom(token) => Some(token),
      SExpr::List(_) => None,
    }
  }

  pub fn as_list(&self) -> Option<&ListExpr<'src>> {
    match self {
      SExpr::Atom(_) => None,
      SExpr::List(list) => Some(list),
    }
  }

  /// The items of a `Form` list, if that is what this node is.
  pub fn as_form(&self) -> Option<&[SExpr<'src>]> {
    match self {
      SExpr::List(list) if list.kind == ListKind::Form => Some(&list.items),
      _ => None,
    }
  }

  /// The identifier in head position of a `Form` list.
  pub fn head_name(&self) -> Option<&str> {
    let items = self.as_form()?;
    let head = items.first()?.as_atom()?;
    (head.kind == TokenKind::Ident).then_some(head.text.as_ref())
  }

  pub fn is_bool(&self, value: bool) -> bool {
    matches!(
      self.as_atom(),
      Some(token) if token.kind == TokenKind::Bool
        && token.text.as_ref() == if value { "#t" } else { "#f" }
    )
  }

  /// True for the void literal and for a bare `(void)` call.
  pub fn is_void(&self) -> bool {
    matches!(self.as_atom(), Some(token) if token.kind == TokenKind::Void)
      || matches!(self.head_name(), Some("void") if self.as_form().map_or(false, |items| items.len() == 1))
  }
}

// See the matching comment on `Anf`'s `Drop` impl: `SExpr` nests through a
// `Vec` behind a `Box`, so the derived drop glue recurses once per nesting
// level and can overflow the stack for deeply nested surface forms. Unwind
// iteratively instead.
impl<'src> Drop for SExpr<'src> {
  fn drop(&mut self) {
    fn take_children<'src>(node: &mut SExpr<'src>, stack: &mut Vec<SExpr<'src>>) {
      if let SExpr::List(list) = node {
        stack.extend(list.items.drain(..));
      }
    }

    let mut stack = Vec::new();
    take_children(self, &mut stack);
    while let Some(mut node) = stack.pop() {
      take_children(&mut node, &mut stack);
    }
  }
}

/// Characters the lexer refuses inside a bare identifier. Symbols whose
/// name contains one of these are printed in `'|...|` form.
pub fn is_illegal_ident_char(c: char) -> bool {
  c.is_whitespace()
    || matches!(
      c,
      '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\'' | '`' | ',' | ';' | '|' | '\\' | '#'
    )
}

/// Render a symbol name in quoted form: `'name`, or `'|name|` when the
/// name could not be re-read as a bare identifier.
pub fn quote_symbol(name: &str) -> String {
  if name.is_empty() || name.chars().any(is_illegal_ident_char) {
    format!("'|{name}|")
  } else {
    format!("'{name}")
  }
}
