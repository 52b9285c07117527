use crate::anf::{Anf, Symbol};
use crate::ast::{ListKind, MacroKind, SExpr, Token, TokenKind};
use crate::error::{Error, Result};
use crate::print::{decompile_ast, PrintOptions};
use crate::util::with_stack;

/// Rewrite surface `and`/`or`/`when`/`cond` forms into their `if` shape.
///
/// Each produced `if` carries the [`MacroKind`] it came from, so that
/// un-expansion during decompilation is deterministic even for shapes a
/// user could have written by hand.
pub fn expand_macros<'src>(expr: &SExpr<'src>) -> SExpr<'src> {
  with_stack(|| {
    let Some(list) = expr.as_list() else {
      return expr.clone();
    };
    if list.kind == ListKind::List {
      // Quoted data is inert.
      return expr.clone();
    }
    match expr.head_name() {
      Some("and") => expand_and(&list.items[1..]),
      Some("or") => expand_or(&list.items[1..]),
      Some("when") => expand_when(&list.items[1..]),
      Some("cond") => expand_cond(&list.items[1..]),
      _ => {
        let items = list.items.iter().map(expand_macros).collect();
        match list.hint {
          Some(hint) => SExpr::form_with_hint(items, hint),
          None => SExpr::form(items),
        }
      }
    }
  })
}

fn expand_and<'src>(tests: &[SExpr<'src>]) -> SExpr<'src> {
  with_stack(|| match tests {
    [] => SExpr::atom(Token::boolean(true)),
    [test] => expand_macros(test),
    [test, rest @ ..] => SExpr::form_with_hint(
      vec![
        SExpr::ident("if"),
        expand_macros(test),
        expand_and(rest),
        SExpr::atom(Token::boolean(false)),
      ],
      MacroKind::And,
    ),
  })
}

fn expand_or<'src>(tests: &[SExpr<'src>]) -> SExpr<'src> {
  with_stack(|| match tests {
    [] => SExpr::atom(Token::boolean(false)),
    [test] => expand_macros(test),
    [test, rest @ ..] => SExpr::form_with_hint(
      vec![
        SExpr::ident("if"),
        expand_macros(test),
        SExpr::atom(Token::boolean(true)),
        expand_or(rest),
      ],
      MacroKind::Or,
    ),
  })
}

fn expand_when<'src>(items: &[SExpr<'src>]) -> SExpr<'src> {
  let [test, body @ ..] = items else {
    return SExpr::atom(Token::void());
  };
  let body = match body {
    [] => SExpr::atom(Token::void()),
    [single] => expand_macros(single),
    _ => sequence(body),
  };
  SExpr::form_with_hint(
    vec![
      SExpr::ident("if"),
      expand_macros(test),
      body,
      SExpr::atom(Token::void()),
    ],
    MacroKind::When,
  )
}

fn expand_cond<'src>(clauses: &[SExpr<'src>]) -> SExpr<'src> {
  with_stack(|| expand_cond_inner(clauses))
}

fn expand_cond_inner<'src>(clauses: &[SExpr<'src>]) -> SExpr<'src> {
  let [clause, rest @ ..] = clauses else {
    return SExpr::atom(Token::void());
  };
  let Some([test, body @ ..]) = clause.as_form() else {
    // Not a clause; leave the whole form for the compiler to reject.
    return clause.clone();
  };
  let value = match body {
    [] => expand_macros(test),
    [single] => expand_macros(single),
    _ => sequence(body),
  };
  if matches!(test.as_atom(), Some(token) if token.kind == TokenKind::Ident && token.text.as_ref() == "else")
  {
    return value;
  }
  SExpr::form_with_hint(
    vec![
      SExpr::ident("if"),
      expand_macros(test),
      value,
      expand_cond(rest),
    ],
    MacroKind::Cond,
  )
}

fn sequence<'src>(body: &[SExpr<'src>]) -> SExpr<'src> {
  let mut items = vec![SExpr::ident("begin")];
  items.extend(body.iter().map(expand_macros));
  SExpr::form(items)
}

/// Lower a surface program to ANF: expand macros, then normalize so that
/// every non-trivial argument of an application is bound to an
/// administrative `let`.
pub fn lower<'src>(expr: &SExpr<'src>) -> Result<Anf<'src>> {
  let expanded = expand_macros(expr);
  Normalize { next_temp: 0 }.expr(&expanded)
}

struct Normalize {
  next_temp: u32,
}

impl Normalize {
  fn expr<'src>(&mut self, expr: &SExpr<'src>) -> Result<Anf<'src>> {
    with_stack(|| match expr {
      SExpr::Atom(token) => match token.kind {
        TokenKind::Ident => Ok(Anf::Var(Symbol::interned(token.text.clone()))),
        TokenKind::Num
        | TokenKind::Str
        | TokenKind::Bool
        | TokenKind::Char
        | TokenKind::Void
        | TokenKind::Sym => Ok(Anf::Literal(token.clone())),
        _ => Err(Error::InvalidForm(format!(
          "unexpected {:?} token `{}`",
          token.kind,
          token.text.as_ref()
        ))),
      },
      SExpr::List(list) if list.kind == ListKind::List => Ok(Anf::Literal(Token::new(
        TokenKind::List,
        decompile_ast(expr, &PrintOptions::default()),
      ))),
      SExpr::List(list) => self.form(&list.items),
    })
  }

  fn form<'src>(&mut self, items: &[SExpr<'src>]) -> Result<Anf<'src>> {
    let head = items
      .first()
      .ok_or_else(|| Error::InvalidForm("empty application".to_string()))?;
    match head.as_atom().map(|token| token.text.as_ref()) {
      Some("lambda") => self.lambda(items),
      Some("let") => self.let_form(items),
      Some("if") => self.if_form(items),
      Some("quote") => self.quote(items),
      // Forms the compiler opens itself; their arguments normalize in
      // place so evaluation order survives.
      Some(name @ ("begin" | "set!" | "while" | "void")) => {
        let args = items[1..]
          .iter()
          .map(|item| self.expr(item))
          .collect::<Result<Vec<_>>>()?;
        Ok(Anf::app(Anf::var(name.to_string()), args))
      }
      _ => self.application(items),
    }
  }

  fn lambda<'src>(&mut self, items: &[SExpr<'src>]) -> Result<Anf<'src>> {
    let [_, params, body @ ..] = items else {
      return Err(Error::InvalidForm("lambda without a parameter list".to_string()));
    };
    let Some(param_items) = params.as_form() else {
      return Err(Error::InvalidForm("lambda parameters must be a list".to_string()));
    };
    let params = param_items
      .iter()
      .map(|param| match param.as_atom() {
        Some(token) if token.kind == TokenKind::Ident => Ok(Symbol::interned(token.text.clone())),
        _ => Err(Error::InvalidForm("lambda parameter is not an identifier".to_string())),
      })
      .collect::<Result<Vec<_>>>()?;
    let body = self.body(body, "lambda")?;
    Ok(Anf::lambda(params, body))
  }

  fn let_form<'src>(&mut self, items: &[SExpr<'src>]) -> Result<Anf<'src>> {
    let [_, bindings, body @ ..] = items else {
      return Err(Error::InvalidForm("let without bindings".to_string()));
    };
    let Some(binding_items) = bindings.as_form() else {
      return Err(Error::InvalidForm("let bindings must be a list".to_string()));
    };
    let mut lowered = Vec::with_capacity(binding_items.len());
    for binding in binding_items {
      let Some([name, value]) = binding.as_form() else {
        return Err(Error::InvalidForm("let binding must pair a name with a value".to_string()));
      };
      let Some(token) = name.as_atom().filter(|token| token.kind == TokenKind::Ident) else {
        return Err(Error::InvalidForm("let binding name is not an identifier".to_string()));
      };
      lowered.push((Symbol::interned(token.text.clone()), self.expr(value)?));
    }
    let mut result = self.body(body, "let")?;
    for (name, value) in lowered.into_iter().rev() {
      result = Anf::let_(name, value, result);
    }
    Ok(result)
  }

  fn if_form<'src>(&mut self, items: &[SExpr<'src>]) -> Result<Anf<'src>> {
    match items {
      [_, cond, then] => Ok(Anf::if_(
        self.expr(cond)?,
        self.expr(then)?,
        Anf::literal(Token::void()),
      )),
      [_, cond, then, otherwise] => Ok(Anf::if_(
        self.expr(cond)?,
        self.expr(then)?,
        self.expr(otherwise)?,
      )),
      _ => Err(Error::InvalidForm("if expects a test and one or two arms".to_string())),
    }
  }

  fn quote<'src>(&mut self, items: &[SExpr<'src>]) -> Result<Anf<'src>> {
    let [_, datum] = items else {
      return Err(Error::InvalidForm("quote expects exactly one datum".to_string()));
    };
    match datum {
      SExpr::Atom(token) if token.kind == TokenKind::Ident => {
        Ok(Anf::Literal(Token::sym(token.text.clone())))
      }
      SExpr::Atom(token) => Ok(Anf::Literal(token.clone())),
      SExpr::List(list) => {
        let quoted = SExpr::quoted(list.items.clone());
        Ok(Anf::Literal(Token::new(
          TokenKind::List,
          decompile_ast(&quoted, &PrintOptions::default()),
        )))
      }
    }
  }

  fn application<'src>(&mut self, items: &[SExpr<'src>]) -> Result<Anf<'src>> {
    let mut bindings = Vec::new();
    let callee = self.expr(&items[0])?;
    let callee = self.atomic(callee, &mut bindings);
    let mut args = Vec::with_capacity(items.len() - 1);
    for item in &items[1..] {
      let arg = self.expr(item)?;
      args.push(self.atomic(arg, &mut bindings));
    }
    let mut result = Anf::app(callee, args);
    for (name, value) in bindings.into_iter().rev() {
      result = Anf::let_(name, value, result);
    }
    Ok(result)
  }

  /// Return `anf` if it is already atomic, otherwise bind it to a fresh
  /// temporary and return a reference to that.
  fn atomic<'src>(
    &mut self,
    anf: Anf<'src>,
    bindings: &mut Vec<(Symbol<'src>, Anf<'src>)>,
  ) -> Anf<'src> {
    match anf {
      Anf::Literal(_) | Anf::Var(_) => anf,
      other => {
        let name = Symbol::fresh("%t", self.next_temp);
        self.next_temp += 1;
        bindings.push((name.clone(), other));
        Anf::Var(name)
      }
    }
  }

  fn body<'src>(&mut self, body: &[SExpr<'src>], of: &str) -> Result<Anf<'src>> {
    match body {
      [] => Err(Error::InvalidForm(format!("{of} body is empty"))),
      [single] => self.expr(single),
      _ => {
        let args = body
          .iter()
          .map(|item| self.expr(item))
          .collect::<Result<Vec<_>>>()?;
        Ok(Anf::app(Anf::var("begin"), args))
      }
    }
  }
}
