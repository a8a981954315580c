//! Method-resolution-order storage. Two linearization routines coexist by
//! design: [`ClassNode::add_parent`]/[`ClassNode::fix_mro`] incrementally
//! append while bases are being walked (dropping a duplicate unless it's the
//! last occurrence), while [`ClassNode::compute_mro`] is the final
//! canonicalization invoked once per class during postprocessing (keeping
//! the first occurrence once the list is read in reverse). Neither is C3
//! linearization; both are sufficient for an imprecise analysis.

use ahash::AHashMap;
use indexmap::IndexSet;

use crate::constants::Namespace;

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub ns: Namespace,
    pub module: Namespace,
    pub mro: Vec<Namespace>,
}

impl ClassNode {
    fn new(ns: Namespace, module: Namespace) -> Self {
        Self {
            mro: vec![ns.clone()],
            ns,
            module,
        }
    }

    pub fn add_parent_name(&mut self, parent: Namespace) {
        self.mro.push(parent);
        self.fix_mro();
    }

    pub fn add_parent_mro(&mut self, parent_mro: &[Namespace]) {
        if self.mro != parent_mro {
            self.mro.extend(parent_mro.iter().cloned());
        }
        self.fix_mro();
    }

    /// Drops a duplicate entry unless it is the last occurrence in the list.
    fn fix_mro(&mut self) {
        let mro = std::mem::take(&mut self.mro);
        let mut new_mro = Vec::with_capacity(mro.len());
        for (idx, item) in mro.iter().enumerate() {
            if mro[idx + 1..].contains(item) {
                continue;
            }
            new_mro.push(item.clone());
        }
        self.mro = new_mro;
    }

    /// Final canonicalization: reverse, keep first occurrence, reverse back.
    pub fn compute_mro(&mut self) {
        let mut res: Vec<Namespace> = Vec::with_capacity(self.mro.len());
        for parent in self.mro.iter().rev() {
            if !res.contains(parent) {
                res.push(parent.clone());
            }
        }
        res.reverse();
        self.mro = res;
    }

    pub fn clear_mro(&mut self) {
        self.mro = vec![self.ns.clone()];
    }
}

/// Owns every `ClassNode`, plus the raw (pre-MRO) child-to-parent-name
/// inheritance relation recorded during preprocessing. The raw relation is
/// a Rust-native addition: the retrieved reference implementation records
/// it via a method not present in this analysis's copy of the class store
/// (see DESIGN.md), so bases are tracked here as plain name references and
/// only spliced into MRO lists during postprocessing once every class and
/// alias in the program is known.
#[derive(Debug, Default)]
pub struct ClassTable {
    nodes: AHashMap<Namespace, ClassNode>,
    raw_bases: AHashMap<Namespace, IndexSet<Namespace>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ns: &str) -> Option<&ClassNode> {
        self.nodes.get(ns)
    }

    pub fn get_mut(&mut self, ns: &str) -> Option<&mut ClassNode> {
        self.nodes.get_mut(ns)
    }

    pub fn create(&mut self, ns: Namespace, module: Namespace) -> &mut ClassNode {
        self.nodes
            .entry(ns.clone())
            .or_insert_with(|| ClassNode::new(ns, module))
    }

    pub fn contains(&self, ns: &str) -> bool {
        self.nodes.contains_key(ns)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Namespace, &ClassNode)> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Namespace, &mut ClassNode)> {
        self.nodes.iter_mut()
    }

    /// Records that `child` textually inherits from the base named
    /// `base_name` (a short or dotted name, resolved to a namespace later
    /// during postprocessing's MRO finalization pass).
    pub fn add_inheritance(&mut self, child: Namespace, base_name: Namespace) {
        self.raw_bases.entry(child).or_default().insert(base_name);
    }

    pub fn raw_bases(&self, child: &str) -> Option<&IndexSet<Namespace>> {
        self.raw_bases.get(child)
    }

    /// Looks up `attr` on `ns` by walking its MRO, skipping `ns` itself
    /// (`mro[1:]`), returning the namespace of the first ancestor that
    /// declares it — `lookup` is a caller-supplied "does this class declare
    /// this short name" predicate (backed by the scope/definition stores).
    pub fn find_in_mro<'a>(
        &'a self,
        ns: &str,
        attr: &str,
        mut declares: impl FnMut(&str, &str) -> bool,
    ) -> Option<&'a Namespace> {
        let node = self.nodes.get(ns)?;
        for ancestor in node.mro.iter().skip(1) {
            if declares(ancestor, attr) {
                return Some(ancestor);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_mro_keeps_last_occurrence() {
        let mut node = ClassNode::new(Namespace::from("C"), Namespace::from("m"));
        node.mro = vec!["C", "A", "B", "A"].into_iter().map(Namespace::from).collect();
        node.fix_mro();
        assert_eq!(
            node.mro,
            vec!["C", "B", "A"].into_iter().map(Namespace::from).collect::<Vec<_>>()
        );
    }

    #[test]
    fn compute_mro_keeps_first_occurrence_reversed() {
        let mut node = ClassNode::new(Namespace::from("C"), Namespace::from("m"));
        node.mro = vec!["C", "A", "B", "A"].into_iter().map(Namespace::from).collect();
        node.compute_mro();
        assert_eq!(
            node.mro,
            vec!["C", "A", "B"].into_iter().map(Namespace::from).collect::<Vec<_>>()
        );
    }

    #[test]
    fn mro_starts_with_self_and_has_no_duplicates_after_compute() {
        let mut node = ClassNode::new(Namespace::from("C"), Namespace::from("m"));
        node.add_parent_name(Namespace::from("A"));
        node.add_parent_name(Namespace::from("B"));
        node.compute_mro();
        assert_eq!(node.mro[0].as_ref(), "C");
        let unique: std::collections::HashSet<_> = node.mro.iter().collect();
        assert_eq!(unique.len(), node.mro.len());
    }
}
