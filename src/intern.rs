use std::fmt::{self, Display};

use indexmap::IndexSet;

/// Dense id assigned to an interned symbol name.
///
/// Ids start at zero and grow monotonically in insertion order, which is
/// also the order the symbol table is serialized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

impl SymId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

impl Display for SymId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    Display::fmt(&self.0, f)
  }
}

/// Bidirectional map between symbol names and dense ids.
///
/// Lookup by id and by name are both O(1); iteration yields insertion
/// order. Interning never fails.
#[derive(Debug, Default)]
pub struct Interner {
  names: IndexSet<String>,
}

impl Interner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the id already assigned to `name`, or assign the next one.
  pub fn intern(&mut self, name: &str) -> SymId {
    if let Some(index) = self.names.get_index_of(name) {
      return SymId(index as u32);
    }
    let (index, _) = self.names.insert_full(name.to_string());
    SymId(index as u32)
  }

  pub fn get(&self, id: SymId) -> Option<&str> {
    self.names.get_index(id.index()).map(|name| name.as_str())
  }

  pub fn contains(&self, id: SymId) -> bool {
    id.index() < self.names.len()
  }

  /// The id the next `intern` of a fresh name would return.
  pub fn next_id(&self) -> u32 {
    self.names.len() as u32
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (SymId, &str)> {
    self
      .names
      .iter()
      .enumerate()
      .map(|(index, name)| (SymId(index as u32), name.as_str()))
  }
}
