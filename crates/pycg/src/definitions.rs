//! Per-namespace entities with points-to state, plus the transitive-closure
//! and fixed-point argument-propagation solvers.

use ahash::AHashMap;
use indexmap::IndexSet;

use crate::{
    constants::{Namespace, join2},
    error::StoreError,
    pointer::{LiteralPointer, NamePointer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefType {
    Fun,
    Mod,
    Name,
    Cls,
    Ext,
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub fullns: Namespace,
    pub def_type: DefType,
    pub name_pointer: NamePointer,
    pub literal_pointer: LiteralPointer,
    /// Only meaningful for `DefType::Fun`.
    pub decorator_names: IndexSet<Namespace>,
}

impl Definition {
    fn new(fullns: Namespace, def_type: DefType) -> Self {
        Self {
            fullns,
            def_type,
            name_pointer: NamePointer::new(),
            literal_pointer: LiteralPointer::new(),
            decorator_names: IndexSet::new(),
        }
    }

    pub fn is_function_def(&self) -> bool {
        self.def_type == DefType::Fun
    }

    pub fn is_class_def(&self) -> bool {
        self.def_type == DefType::Cls
    }

    pub fn is_ext_def(&self) -> bool {
        self.def_type == DefType::Ext
    }

    pub fn is_callable(&self) -> bool {
        self.is_function_def() || self.is_ext_def()
    }

    pub fn short_name(&self) -> &str {
        self.fullns.rsplit('.').next().unwrap_or(&self.fullns)
    }

    pub fn merge(&mut self, other: &Definition) -> bool {
        let a = self.name_pointer.merge(&other.name_pointer);
        let b = self.literal_pointer.merge(&other.literal_pointer);
        a || b
    }
}

/// Owns every `Definition` created during analysis, keyed by namespace.
#[derive(Debug, Default)]
pub struct DefinitionManager {
    defs: AHashMap<Namespace, Definition>,
}

impl DefinitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, ns: Namespace, def_type: DefType) -> Result<&mut Definition, StoreError> {
        if ns.is_empty() {
            return Err(StoreError::EmptyNamespace);
        }
        if self.defs.contains_key(&ns) {
            return Err(StoreError::DuplicateDefinition { ns: ns.to_string() });
        }
        self.defs.insert(ns.clone(), Definition::new(ns.clone(), def_type));
        Ok(self.defs.get_mut(&ns).expect("just inserted"))
    }

    /// Creates a fresh definition at `ns` by merging `src` into it. Used for
    /// import aliasing: `ns` gets `src`'s type and points-to state, and if
    /// `src` is a function, a matching `<ns>.<return>` is created too.
    pub fn assign(&mut self, ns: Namespace, src: &Definition) -> &Definition {
        let mut fresh = Definition::new(ns.clone(), src.def_type);
        fresh.merge(src);
        let is_fun = src.is_function_def();
        let src_fullns = src.fullns.clone();
        self.defs.insert(ns.clone(), fresh);

        if is_fun {
            let return_ns = join2(&ns, crate::constants::RETURN_NAME);
            let mut return_def = Definition::new(return_ns.clone(), DefType::Name);
            return_def
                .name_pointer
                .add(join2(&src_fullns, crate::constants::RETURN_NAME));
            self.defs.insert(return_ns, return_def);
        }
        self.defs.get(&ns).expect("just inserted")
    }

    pub fn get(&self, ns: &str) -> Option<&Definition> {
        self.defs.get(ns)
    }

    pub fn get_mut(&mut self, ns: &str) -> Option<&mut Definition> {
        self.defs.get_mut(ns)
    }

    pub fn contains(&self, ns: &str) -> bool {
        self.defs.contains_key(ns)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Namespace, &Definition)> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Idempotent function-definition creator: returns the existing FUN at
    /// `parent.fn_name` or creates it, ensuring its `<return>` companion
    /// exists either way.
    pub fn handle_function_def(&mut self, parent_ns: &str, fn_name: &str) -> Namespace {
        let full_ns = join2(parent_ns, fn_name);
        if !self.defs.contains_key(&full_ns) {
            let mut def = Definition::new(full_ns.clone(), DefType::Fun);
            def.decorator_names = IndexSet::new();
            self.defs.insert(full_ns.clone(), def);
        }
        let return_ns = join2(&full_ns, crate::constants::RETURN_NAME);
        self.defs
            .entry(return_ns.clone())
            .or_insert_with(|| Definition::new(return_ns, DefType::Name));
        full_ns
    }

    pub fn handle_class_def(&mut self, parent_ns: &str, cls_name: &str) -> Namespace {
        let full_ns = join2(parent_ns, cls_name);
        self.defs
            .entry(full_ns.clone())
            .or_insert_with(|| Definition::new(full_ns.clone(), DefType::Cls));
        full_ns
    }

    /// Reflexive-transitive closure of `name_pointer.values`, computed by
    /// memoized depth-first traversal. A definition with an empty name
    /// pointer closes over itself; otherwise its image is the union of the
    /// closures of everything it points to (substituting `{n}` for any
    /// target `n` whose own closure is empty).
    pub fn transitive_closure(&self) -> AHashMap<Namespace, IndexSet<Namespace>> {
        let mut closured: AHashMap<Namespace, IndexSet<Namespace>> = AHashMap::default();

        fn dfs(
            defs: &AHashMap<Namespace, Definition>,
            closured: &mut AHashMap<Namespace, IndexSet<Namespace>>,
            ns: &Namespace,
        ) -> IndexSet<Namespace> {
            if let Some(existing) = closured.get(ns) {
                return existing.clone();
            }
            let defi = &defs[ns];
            let mut new_set = IndexSet::new();
            if defi.name_pointer.values.is_empty() {
                new_set.insert(ns.clone());
            }
            closured.insert(ns.clone(), new_set.clone());

            for name in &defi.name_pointer.values {
                if !defs.contains_key(name) {
                    continue;
                }
                let items = dfs(defs, closured, name);
                if items.is_empty() {
                    new_set.insert(name.clone());
                } else {
                    new_set.extend(items);
                }
            }
            closured.insert(ns.clone(), new_set.clone());
            new_set
        }

        for ns in self.defs.keys() {
            if !closured.contains_key(ns) {
                dfs(&self.defs, &mut closured, ns);
            }
        }
        closured
    }

    /// Iterated propagation of argument points-to sets across call edges.
    /// Bounded by `|defs|` outer iterations; exits early on a pass with no
    /// growth, which is what proves termination (argument sets only grow
    /// over a finite namespace universe).
    pub fn complete_definitions(&mut self) {
        let n = self.defs.len();
        for _ in 0..n {
            let mut changed_something = false;
            let ns_list: Vec<Namespace> = self.defs.keys().cloned().collect();

            for ns in &ns_list {
                let current_values: Vec<Namespace> = self.defs[ns].name_pointer.values.iter().cloned().collect();
                let current_args: Vec<(Namespace, Vec<Namespace>, Option<u32>)> = self.defs[ns]
                    .name_pointer
                    .args
                    .iter()
                    .map(|(arg_name, set)| {
                        let pos = self.defs[ns].name_pointer.name_to_pos.get(arg_name).copied();
                        (arg_name.clone(), set.iter().cloned().collect(), pos)
                    })
                    .collect();

                for name in current_values {
                    if name == *ns {
                        continue;
                    }
                    if !self.defs.contains_key(&name) {
                        continue;
                    }

                    for (arg_name, arg, pos) in &current_args {
                        if let Some(pos) = pos {
                            if self.defs[&name].name_pointer.get_pos_arg(*pos).is_none() {
                                self.defs
                                    .get_mut(&name)
                                    .unwrap()
                                    .name_pointer
                                    .add_pos_arg(*pos, None, arg.iter().cloned());
                                continue;
                            }
                        } else if self.defs[&name].name_pointer.get_arg(arg_name).is_none() {
                            self.defs
                                .get_mut(&name)
                                .unwrap()
                                .name_pointer
                                .add_arg(arg_name.clone(), arg.iter().cloned());
                            continue;
                        }

                        let pointsto_args: Vec<Namespace> = if let Some(pos) = pos {
                            self.defs[&name]
                                .name_pointer
                                .get_pos_arg(*pos)
                                .map(|s| s.iter().cloned().collect())
                                .unwrap_or_default()
                        } else {
                            self.defs[&name]
                                .name_pointer
                                .get_arg(arg_name)
                                .map(|s| s.iter().cloned().collect())
                                .unwrap_or_default()
                        };

                        changed_something |= self.update_pointsto_args(&pointsto_args, arg, ns);
                    }
                }
            }

            if !changed_something {
                break;
            }
        }
    }

    /// Mirrors the original solver's inner helper: unions `arg` into the
    /// name pointer of every namespace already present in `pointsto_args`,
    /// skipping self-references to `name` (the caller whose args are being
    /// pushed) and removing `arg` elements that coincide with the target
    /// itself to avoid trivial self-cycles.
    fn update_pointsto_args(&mut self, pointsto_args: &[Namespace], arg: &[Namespace], name: &str) -> bool {
        if arg == pointsto_args {
            return false;
        }
        let mut changed = false;
        let mut arg: Vec<Namespace> = arg.to_vec();

        for pointsto_arg in pointsto_args {
            if !self.defs.contains_key(pointsto_arg) {
                continue;
            }
            if pointsto_arg.as_ref() == name {
                continue;
            }

            if let Some(idx) = arg.iter().position(|a| a == pointsto_arg) {
                arg.remove(idx);
            }

            for item in &arg {
                let existing = &self.defs[pointsto_arg].name_pointer.values;
                if !existing.contains(item) && self.defs.contains_key(item) {
                    changed = true;
                }
                if !self.defs.contains_key(item) {
                    continue;
                }
                self.defs
                    .get_mut(pointsto_arg)
                    .unwrap()
                    .name_pointer
                    .add(item.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_function_def_creates_return_companion() {
        let mut mgr = DefinitionManager::new();
        let ns = mgr.handle_function_def("pkg.mod", "f");
        assert_eq!(ns.as_ref(), "pkg.mod.f");
        assert!(mgr.contains("pkg.mod.f.<return>"));
    }

    #[test]
    fn transitive_closure_self_closes_unpointed_def() {
        let mut mgr = DefinitionManager::new();
        mgr.create(Namespace::from("a"), DefType::Name).unwrap();
        let closure = mgr.transitive_closure();
        assert_eq!(closure["a"], IndexSet::from([Namespace::from("a")]));
    }

    #[test]
    fn transitive_closure_follows_aliases() {
        let mut mgr = DefinitionManager::new();
        mgr.create(Namespace::from("a"), DefType::Name).unwrap();
        mgr.create(Namespace::from("b"), DefType::Name).unwrap();
        mgr.get_mut("a").unwrap().name_pointer.add(Namespace::from("b"));
        let closure = mgr.transitive_closure();
        assert_eq!(closure["a"], IndexSet::from([Namespace::from("b")]));
    }

    #[test]
    fn complete_definitions_is_idempotent_on_stable_store() {
        let mut mgr = DefinitionManager::new();
        mgr.create(Namespace::from("caller"), DefType::Fun).unwrap();
        mgr.create(Namespace::from("callee"), DefType::Fun).unwrap();
        mgr.get_mut("caller")
            .unwrap()
            .name_pointer
            .add(Namespace::from("callee"));
        mgr.get_mut("caller")
            .unwrap()
            .name_pointer
            .add_pos_arg(0, None, [Namespace::from("caller")]);
        mgr.complete_definitions();
        let before = format!("{:?}", mgr.defs.get("callee").unwrap().name_pointer.args);
        mgr.complete_definitions();
        let after = format!("{:?}", mgr.defs.get("callee").unwrap().name_pointer.args);
        assert_eq!(before, after);
    }
}
