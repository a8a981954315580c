//! Lexical scope tree: short-name lookup with parent fallthrough, and the
//! per-scope anonymous-object counters used to synthesize stable names for
//! lambdas, dict/list literals across repeated AST traversals.

use ahash::AHashMap;

use crate::constants::{AnonCounters, Namespace};

#[derive(Debug, Clone)]
pub struct Scope {
    pub ns: Namespace,
    pub parent: Option<Namespace>,
    pub defs: AHashMap<Namespace, Namespace>,
    pub counters: AnonCounters,
}

impl Scope {
    fn new(ns: Namespace, parent: Option<Namespace>) -> Self {
        Self {
            ns,
            parent,
            defs: AHashMap::default(),
            counters: AnonCounters::default(),
        }
    }

    pub fn reset_counters(&mut self) {
        self.counters.reset();
    }
}

#[derive(Debug, Default)]
pub struct ScopeManager {
    scopes: AHashMap<Namespace, Scope>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_scope(&self, ns: &str) -> Option<&Scope> {
        self.scopes.get(ns)
    }

    pub fn get_scope_mut(&mut self, ns: &str) -> Option<&mut Scope> {
        self.scopes.get_mut(ns)
    }

    pub fn create_scope(&mut self, ns: Namespace, parent: Option<Namespace>) -> &mut Scope {
        self.scopes.entry(ns.clone()).or_insert_with(|| Scope::new(ns, parent))
    }

    /// Registers `name` as bound to `defi_ns` in the scope at `parent_ns`.
    pub fn handle_assign(&mut self, parent_ns: &str, name: Namespace, defi_ns: Namespace) {
        if let Some(scope) = self.scopes.get_mut(parent_ns) {
            scope.defs.insert(name, defi_ns);
        }
    }

    /// Walks from `current_ns` up through parent scopes looking for
    /// `short_name`; returns the namespace it's bound to, or `None`.
    pub fn get_def(&self, current_ns: &str, short_name: &str) -> Option<&Namespace> {
        let mut cursor = self.scopes.get(current_ns);
        while let Some(scope) = cursor {
            if let Some(found) = scope.defs.get(short_name) {
                return Some(found);
            }
            cursor = scope.parent.as_deref().and_then(|p| self.scopes.get(p));
        }
        None
    }

    pub fn reset_scope_counters(&mut self, ns: &str) {
        if let Some(scope) = self.scopes.get_mut(ns) {
            scope.reset_counters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_falls_through_to_parent() {
        let mut mgr = ScopeManager::new();
        mgr.create_scope(Namespace::from("mod"), None);
        mgr.create_scope(Namespace::from("mod.f"), Some(Namespace::from("mod")));
        mgr.handle_assign("mod", Namespace::from("g"), Namespace::from("mod.g"));
        assert_eq!(mgr.get_def("mod.f", "g").map(|n| n.as_ref()), Some("mod.g"));
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let mut mgr = ScopeManager::new();
        mgr.create_scope(Namespace::from("mod"), None);
        mgr.create_scope(Namespace::from("mod.f"), Some(Namespace::from("mod")));
        mgr.handle_assign("mod", Namespace::from("x"), Namespace::from("mod.x"));
        mgr.handle_assign("mod.f", Namespace::from("x"), Namespace::from("mod.f.x"));
        assert_eq!(mgr.get_def("mod.f", "x").map(|n| n.as_ref()), Some("mod.f.x"));
    }

    #[test]
    fn counters_reset_independently_per_scope() {
        let mut mgr = ScopeManager::new();
        mgr.create_scope(Namespace::from("mod"), None);
        mgr.get_scope_mut("mod").unwrap().counters.next_lambda();
        mgr.get_scope_mut("mod").unwrap().counters.next_lambda();
        mgr.reset_scope_counters("mod");
        assert_eq!(mgr.get_scope("mod").unwrap().counters.lambda, 0);
    }
}
