use crate::anf::Anf;
use crate::ast::{quote_symbol, ListExpr, ListKind, MacroKind, SExpr, Token, TokenKind};
use crate::util::{with_stack, JoinIter};

/// Rendering options for the decompiler.
#[derive(Debug, Clone)]
pub struct PrintOptions {
  /// Recover `and`/`or`/`when`/`cond`/`void` surface forms from their
  /// lowered `if` shape.
  pub unexpand_macros: bool,
  /// Put the closing parenthesis of a wrapped form on its own line
  /// instead of appending it to the last child.
  pub closing_on_new_line: bool,
  pub indent_width: usize,
}

impl Default for PrintOptions {
  fn default() -> Self {
    Self {
      unexpand_macros: true,
      closing_on_new_line: false,
      indent_width: 2,
    }
  }
}

/// A form with more children than this (or any wrapped child) renders
/// across multiple lines.
const MAX_INLINE_CHILDREN: usize = 3;

/// Render a surface tree back to source-equivalent text.
pub fn decompile_ast(expr: &SExpr<'_>, options: &PrintOptions) -> String {
  render_sexpr(expr, options)
}

/// Render an ANF tree back to source-equivalent text.
pub fn decompile_anf(anf: &Anf<'_>) -> String {
  render_anf(anf, &PrintOptions::default())
}

fn render_sexpr(expr: &SExpr<'_>, options: &PrintOptions) -> String {
  with_stack(|| match expr {
    SExpr::Atom(token) => atom(token),
    SExpr::List(list) => {
      if options.unexpand_macros && list.kind == ListKind::Form {
        if let Some(rewritten) = unexpand(expr) {
          return render_sexpr(&rewritten, options);
        }
      }
      list_text(list, options)
    }
  })
}

fn list_text(list: &ListExpr<'_>, options: &PrintOptions) -> String {
  let rendered: Vec<String> = list
    .items
    .iter()
    .map(|item| render_sexpr(item, options))
    .collect();
  let text = wrap(&rendered, options);
  match list.kind {
    ListKind::List => format!("'{text}"),
    ListKind::Form => text,
  }
}

/// Lay out one form. The head shares the first line with the opening
/// parenthesis; when the form wraps, every following child is indented
/// one step.
fn wrap(elements: &[String], options: &PrintOptions) -> String {
  if elements.is_empty() {
    return "()".to_string();
  }
  let children = elements.len() - 1;
  let inline =
    children <= MAX_INLINE_CHILDREN && elements.iter().all(|element| !element.contains('\n'));
  if inline {
    return format!("({})", elements.iter().join(" "));
  }

  let indent = " ".repeat(options.indent_width);
  let mut out = format!("({}", elements[0]);
  for element in &elements[1..] {
    for line in element.lines() {
      out.push('\n');
      out.push_str(&indent);
      out.push_str(line);
    }
  }
  if options.closing_on_new_line {
    out.push('\n');
  }
  out.push(')');
  out
}

fn atom(token: &Token<'_>) -> String {
  let text = token.text.as_ref();
  match token.kind {
    TokenKind::Sym => quote_symbol(text),
    TokenKind::Str => format!("{text:?}"),
    TokenKind::Char => format!("#\\{text}"),
    TokenKind::Void => "#<void>".to_string(),
    TokenKind::Procedure => {
      if text.is_empty() {
        "#<procedure>".to_string()
      } else {
        format!("#<procedure:{text}>")
      }
    }
    // Identifiers, numbers, booleans, and pre-rendered list tokens print
    // as their lexeme.
    _ => text.to_string(),
  }
}

/// Recover the surface macro call a lowered `if` shape came from, or
/// `None` when nothing matches.
///
/// A node carrying a [`MacroKind`] hint only un-expands as that macro;
/// a hint that disagrees with the node's actual shape vetoes the
/// rewrite. Unhinted nodes match `and`, `or`, then `when`; `cond` is
/// recovered only from hinted nodes, so hand-written `if` chains stay
/// intact.
fn unexpand<'src>(expr: &SExpr<'src>) -> Option<SExpr<'src>> {
  with_stack(|| unexpand_inner(expr))
}

fn unexpand_inner<'src>(expr: &SExpr<'src>) -> Option<SExpr<'src>> {
  let list = expr.as_list()?;
  if list.kind != ListKind::Form {
    return None;
  }

  if expr.head_name() == Some("void") && list.items.len() == 1 {
    if list.hint.map_or(true, |hint| hint == MacroKind::Void) {
      return Some(SExpr::atom(Token::void()));
    }
    return None;
  }

  let [head, test, then, otherwise] = list.items.as_slice() else {
    return None;
  };
  if head.as_atom().map(|token| token.text.as_ref()) != Some("if") {
    return None;
  }

  match list.hint {
    Some(MacroKind::And) => unexpand_and(test, then, otherwise),
    Some(MacroKind::Or) => unexpand_or(test, then, otherwise),
    Some(MacroKind::When) => unexpand_when(test, then, otherwise),
    Some(MacroKind::Cond) => unexpand_cond(test, then, otherwise),
    Some(MacroKind::Void) => None,
    None => unexpand_and(test, then, otherwise)
      .or_else(|| unexpand_or(test, then, otherwise))
      .or_else(|| unexpand_when(test, then, otherwise)),
  }
}

fn unexpand_and<'src>(
  test: &SExpr<'src>,
  then: &SExpr<'src>,
  otherwise: &SExpr<'src>,
) -> Option<SExpr<'src>> {
  if !otherwise.is_bool(false) {
    return None;
  }
  let mut items = vec![SExpr::ident("and")];
  splice("and", unexpand_or_clone(test), &mut items);
  splice("and", unexpand_or_clone(then), &mut items);
  Some(SExpr::form(items))
}

fn unexpand_or<'src>(
  test: &SExpr<'src>,
  then: &SExpr<'src>,
  otherwise: &SExpr<'src>,
) -> Option<SExpr<'src>> {
  if !then.is_bool(true) {
    return None;
  }
  let mut items = vec![SExpr::ident("or")];
  splice("or", unexpand_or_clone(test), &mut items);
  splice("or", unexpand_or_clone(otherwise), &mut items);
  Some(SExpr::form(items))
}

fn unexpand_when<'src>(
  test: &SExpr<'src>,
  then: &SExpr<'src>,
  otherwise: &SExpr<'src>,
) -> Option<SExpr<'src>> {
  if !otherwise.is_void() {
    return None;
  }
  Some(SExpr::form(vec![
    SExpr::ident("when"),
    unexpand_or_clone(test),
    unexpand_or_clone(then),
  ]))
}

fn unexpand_cond<'src>(
  test: &SExpr<'src>,
  then: &SExpr<'src>,
  otherwise: &SExpr<'src>,
) -> Option<SExpr<'src>> {
  let mut items = vec![
    SExpr::ident("cond"),
    SExpr::form(vec![unexpand_or_clone(test), unexpand_or_clone(then)]),
  ];
  let mut rest = unexpand_or_clone(otherwise);
  if rest.head_name() == Some("cond") {
    if let SExpr::List(list) = &mut rest {
      items.extend(std::mem::take(&mut list.items).into_iter().skip(1));
    }
  } else if !rest.is_void() {
    items.push(SExpr::form(vec![SExpr::ident("else"), rest]));
  }
  Some(SExpr::form(items))
}

fn unexpand_or_clone<'src>(expr: &SExpr<'src>) -> SExpr<'src> {
  unexpand(expr).unwrap_or_else(|| expr.clone())
}

/// Fold a nested `and`/`or` into its parent's argument list.
fn splice<'src>(kind: &str, mut expr: SExpr<'src>, out: &mut Vec<SExpr<'src>>) {
  if expr.head_name() == Some(kind) {
    if let SExpr::List(list) = &mut expr {
      out.extend(std::mem::take(&mut list.items).into_iter().skip(1));
      return;
    }
  }
  out.push(expr);
}

fn render_anf(anf: &Anf<'_>, options: &PrintOptions) -> String {
  with_stack(|| match anf {
    Anf::Literal(token) => atom(token),
    Anf::Var(sym) => sym.to_string(),
    Anf::Lambda(lambda) => {
      let params = format!("({})", lambda.params.iter().join(" "));
      wrap(
        &[
          "lambda".to_string(),
          params,
          render_anf(&lambda.body, options),
        ],
        options,
      )
    }
    Anf::App(app) => {
      let mut elements = vec![render_anf(&app.callee, options)];
      elements.extend(app.args.iter().map(|arg| render_anf(arg, options)));
      wrap(&elements, options)
    }
    Anf::Let(binding) => {
      let pair = wrap(
        &[
          binding.name.to_string(),
          render_anf(&binding.value, options),
        ],
        options,
      );
      wrap(
        &[
          "let".to_string(),
          format!("({pair})"),
          render_anf(&binding.body, options),
        ],
        options,
      )
    }
    Anf::If(branch) => wrap(
      &[
        "if".to_string(),
        render_anf(&branch.cond, options),
        render_anf(&branch.then, options),
        render_anf(&branch.otherwise, options),
      ],
      options,
    ),
  })
}

#[cfg(test)]
mod tests;
