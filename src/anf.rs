use std::fmt::{self, Display};

use beef::lean::Cow;

use crate::ast::Token;

/// A runtime variable name as it appears in ANF.
///
/// Source-level variables are `interned` and print as their bare name.
/// Administrative temporaries introduced by lowering are not, and print as
/// `name` followed by `id` so that distinct temporaries stay distinct.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol<'src> {
  pub name: Cow<'src, str>,
  pub id: u32,
  pub interned: bool,
}

impl<'src> Symbol<'src> {
  pub fn interned(name: impl Into<Cow<'src, str>>) -> Self {
    Self {
      name: name.into(),
      id: 0,
      interned: true,
    }
  }

  pub fn fresh(name: impl Into<Cow<'src, str>>, id: u32) -> Self {
    Self {
      name: name.into(),
      id,
      interned: false,
    }
  }
}

impl Display for Symbol<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.interned {
      write!(f, "{}", self.name.as_ref())
    } else {
      write!(f, "{}{}", self.name.as_ref(), self.id)
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda<'src> {
  pub params: Vec<Symbol<'src>>,
  pub body: Anf<'src>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct App<'src> {
  pub callee: Anf<'src>,
  pub args: Vec<Anf<'src>>,
}

/// Single-binding `let`; multi-binding surface forms lower to a nest of
/// these.
#[derive(Debug, Clone, PartialEq)]
pub struct Let<'src> {
  pub name: Symbol<'src>,
  pub value: Anf<'src>,
  pub body: Anf<'src>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If<'src> {
  pub cond: Anf<'src>,
  pub then: Anf<'src>,
  pub otherwise: Anf<'src>,
}

/// Administrative normal form, the substrate the compiler consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Anf<'src> {
  Literal(Token<'src>),
  Var(Symbol<'src>),
  Lambda(Box<Lambda<'src>>),
  App(Box<App<'src>>),
  Let(Box<Let<'src>>),
  If(Box<If<'src>>),
}

impl<'src> Anf<'src> {
  pub fn literal(token: Token<'src>) -> Self {
    Anf::Literal(token)
  }

  pub fn var(name: impl Into<Cow<'src, str>>) -> Self {
    Anf::Var(Symbol::interned(name))
  }

  pub fn lambda(params: Vec<Symbol<'src>>, body: Anf<'src>) -> Self {
    Anf::Lambda(Box::new(Lambda { params, body }))
  }

  pub fn app(callee: Anf<'src>, args: Vec<Anf<'src>>) -> Self {
    Anf::App(Box::new(App { callee, args }))
  }

  pub fn let_(name: Symbol<'src>, value: Anf<'src>, body: Anf<'src>) -> Self {
    Anf::Let(Box::new(Let { name, value, body }))
  }

  pub fn if_(cond: Anf<'src>, then: Anf<'src>, otherwise: Anf<'src>) -> Self {
    Anf::If(Box::new(If {
      cond,
      then,
      otherwise,
    }))
  }
}

// `Anf` nests through `Box`, so the compiler's derived drop glue recurses
// once per tree level. Programs with thousands of nested forms (e.g. from
// macro lowering) can then overflow the stack on drop alone, even though
// every traversal that *builds* or *visits* the tree already routes through
// `with_stack`. Unwind the tree iteratively instead: pull each node's
// children out into an explicit work stack before letting the node's own
// (now child-free) fields drop trivially.
impl<'src> Drop for Anf<'src> {
  fn drop(&mut self) {
    fn take_children<'src>(node: &mut Anf<'src>, stack: &mut Vec<Anf<'src>>) {
      let placeholder = || Anf::Literal(Token::void());
      match node {
        Anf::Literal(_) | Anf::Var(_) => {}
        Anf::Lambda(lambda) => stack.push(std::mem::replace(&mut lambda.body, placeholder())),
        Anf::App(app) => {
          stack.push(std::mem::replace(&mut app.callee, placeholder()));
          stack.extend(app.args.drain(..));
        }
        Anf::Let(let_) => {
          stack.push(std::mem::replace(&mut let_.value, placeholder()));
          stack.push(std::mem::replace(&mut let_.body, placeholder()));
        }
        Anf::If(if_) => {
          stack.push(std::mem::replace(&mut if_.cond, placeholder()));
          stack.push(std::mem::replace(&mut if_.then, placeholder()));
          stack.push(std::mem::replace(&mut if_.otherwise, placeholder()));
        }
      }
    }

    let mut stack = Vec::new();
    take_children(self, &mut stack);
    while let Some(mut node) = stack.pop() {
      take_children(&mut node, &mut stack);
    }
  }
}

/// A named top-level program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program<'src> {
  pub name: String,
  pub body: Anf<'src>,
}

impl<'src> Program<'src> {
  pub fn new(name: impl Into<String>, body: Anf<'src>) -> Self {
    Self {
      name: name.into(),
      body,
    }
  }
}
