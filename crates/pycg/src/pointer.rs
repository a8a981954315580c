//! Value-set abstractions for points-to state.
//!
//! A pointer is a lattice of namespaces (or literal tags) a name may refer
//! to. Union is the only mutation; sets only grow, which is what makes the
//! fixed-point solver in [`crate::definitions`] terminate.

use ahash::{AHashMap, AHashSet};

use crate::constants::{Namespace, STRING_LIT, UNKNOWN_LIT};

/// Either a real namespace or one of the collapsed literal tags, stored
/// together in a `NamePointer`'s argument bindings the way the original
/// analysis conflates them — simpler than a typed enum and behaviorally
/// identical under the solver's "skip if not a known definition" rule.
pub type ArgSet = AHashSet<Namespace>;

/// Set of namespaces a name currently resolves to.
#[derive(Debug, Clone, Default)]
pub struct NamePointer {
    pub values: AHashSet<Namespace>,
    pub pos_to_name: AHashMap<u32, Namespace>,
    pub name_to_pos: AHashMap<Namespace, u32>,
    pub args: AHashMap<Namespace, ArgSet>,
}

impl NamePointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: Namespace) -> bool {
        self.values.insert(item)
    }

    pub fn add_set(&mut self, items: impl IntoIterator<Item = Namespace>) -> bool {
        let mut grew = false;
        for item in items {
            grew |= self.values.insert(item);
        }
        grew
    }

    pub fn merge(&mut self, other: &NamePointer) -> bool {
        let mut grew = false;
        for v in &other.values {
            grew |= self.values.insert(v.clone());
        }
        for (pos, name) in &other.pos_to_name {
            self.pos_to_name.insert(*pos, name.clone());
            self.name_to_pos.insert(name.clone(), *pos);
        }
        for (name, arg) in &other.args {
            grew |= self.add_arg(name.clone(), arg.iter().cloned());
        }
        grew
    }

    fn get_or_create(&mut self, name: Namespace) -> &mut ArgSet {
        self.args.entry(name).or_default()
    }

    pub fn add_arg(&mut self, name: Namespace, items: impl IntoIterator<Item = Namespace>) -> bool {
        let arg = self.get_or_create(name);
        let mut grew = false;
        for item in items {
            grew |= arg.insert(item);
        }
        grew
    }

    pub fn add_lit_arg(&mut self, name: Namespace, tag: &str) -> bool {
        self.get_or_create(name).insert(Namespace::from(tag))
    }

    /// Binds a positional call argument. When `name` is `None`, reuses the
    /// parameter name already recorded for `pos` (if any call site earlier
    /// established it), falling back to the stringified position.
    pub fn add_pos_arg(&mut self, pos: u32, name: Option<Namespace>, items: impl IntoIterator<Item = Namespace>) {
        let name = name
            .or_else(|| self.pos_to_name.get(&pos).cloned())
            .unwrap_or_else(|| Namespace::from(pos.to_string()));
        self.pos_to_name.insert(pos, name.clone());
        self.name_to_pos.insert(name.clone(), pos);
        self.add_arg(name, items);
    }

    pub fn add_pos_lit_arg(&mut self, pos: u32, name: Option<Namespace>, tag: &str) {
        let name = name.unwrap_or_else(|| Namespace::from(pos.to_string()));
        self.pos_to_name.insert(pos, name.clone());
        self.name_to_pos.insert(name.clone(), pos);
        self.add_lit_arg(name, tag);
    }

    pub fn get_pos_arg(&self, pos: u32) -> Option<&ArgSet> {
        self.pos_to_name.get(&pos).and_then(|name| self.args.get(name))
    }

    pub fn get_arg(&self, name: &str) -> Option<&ArgSet> {
        self.args.get(name)
    }

    pub fn get_pos_of_name(&self, name: &str) -> Option<u32> {
        self.name_to_pos.get(name).copied()
    }
}

/// Set of literal values (strings/ints kept verbatim so container keys can
/// be matched; everything else collapses to `UNKNOWN`).
#[derive(Debug, Clone, Default)]
pub struct LiteralPointer {
    pub values: AHashSet<Namespace>,
}

#[derive(Debug, Clone, Copy)]
pub enum Literal<'a> {
    Str(&'a str),
    Int(i64),
    Other,
}

impl LiteralPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: Literal<'_>) -> bool {
        match item {
            Literal::Str(s) => self.values.insert(Namespace::from(s)),
            Literal::Int(i) => self.values.insert(Namespace::from(i.to_string())),
            Literal::Other => self.values.insert(Namespace::from(UNKNOWN_LIT)),
        }
    }

    pub fn merge(&mut self, other: &LiteralPointer) -> bool {
        let mut grew = false;
        for v in &other.values {
            grew |= self.values.insert(v.clone());
        }
        grew
    }
}

/// Tag used when an argument's literal type is known but its exact value
/// is not tracked (matches the original's `STRING`/`INTEGER`/`UNKNOWN`
/// collapse for argument binding, as opposed to container-key literals
/// which keep exact values in [`LiteralPointer`]).
pub fn literal_tag(item: Literal<'_>) -> &'static str {
    match item {
        Literal::Str(_) => STRING_LIT,
        Literal::Int(_) => crate::constants::INTEGER_LIT,
        Literal::Other => UNKNOWN_LIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_pos_arg_reuses_recorded_name() {
        let mut ptr = NamePointer::new();
        ptr.add_pos_arg(0, Some(Namespace::from("x")), [Namespace::from("a.b")]);
        ptr.add_pos_arg(0, None, [Namespace::from("a.c")]);
        let arg = ptr.get_arg("x").expect("arg present");
        assert!(arg.contains("a.b"));
        assert!(arg.contains("a.c"));
    }

    #[test]
    fn merge_unions_values_and_args() {
        let mut a = NamePointer::new();
        a.add(Namespace::from("x"));
        let mut b = NamePointer::new();
        b.add(Namespace::from("y"));
        b.add_arg(Namespace::from("p"), [Namespace::from("z")]);
        assert!(a.merge(&b));
        assert!(a.values.contains("y"));
        assert!(a.get_arg("p").unwrap().contains("z"));
        assert!(!a.merge(&b));
    }

    #[test]
    fn literal_pointer_collapses_non_primitive() {
        let mut lit = LiteralPointer::new();
        lit.add(Literal::Str("k"));
        lit.add(Literal::Other);
        assert!(lit.values.contains("k"));
        assert!(lit.values.contains(UNKNOWN_LIT));
    }
}
