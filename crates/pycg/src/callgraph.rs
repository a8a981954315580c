//! The output graph: `cg` maps caller to callees, `cg_extended` carries
//! per-edge and per-node metadata the emitter records as it walks calls.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexSet;

use crate::constants::Namespace;

#[derive(Debug, Clone)]
pub struct EdgeMeta {
    pub dst: Namespace,
    pub lineno: i64,
    pub mod_name: Namespace,
    pub ext_mod: Namespace,
}

#[derive(Debug, Clone, Default)]
pub struct NodeMeta {
    pub modname: Namespace,
    pub decl_line: Option<u32>,
    pub arg_count: usize,
    pub arg_names: Vec<Namespace>,
    /// Argument types are always `"N/A"`: this analysis never infers types.
    pub arg_types: Vec<&'static str>,
    pub if_count: u32,
    pub expr_count: u32,
    pub raises: IndexSet<Namespace>,
}

#[derive(Debug, Clone)]
pub struct NodeExtended {
    pub dsts: Vec<EdgeMeta>,
    pub meta: NodeMeta,
}

#[derive(Debug, Default)]
pub struct CallGraph {
    pub cg: AHashMap<Namespace, AHashSet<Namespace>>,
    pub cg_extended: AHashMap<Namespace, NodeExtended>,
    pub modnames: AHashMap<Namespace, Namespace>,
    pub entrypoints: Vec<(Namespace, Namespace)>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: Namespace, modname: Namespace) {
        let entry = self.cg_extended.entry(name.clone()).or_insert_with(|| NodeExtended {
            dsts: Vec::new(),
            meta: NodeMeta {
                modname: modname.clone(),
                ..Default::default()
            },
        });
        if entry.meta.modname.is_empty() && !modname.is_empty() {
            entry.meta.modname = modname.clone();
        }
        self.cg.entry(name.clone()).or_default();
        let slot = self.modnames.entry(name).or_insert_with(|| Namespace::from(""));
        if slot.is_empty() {
            *slot = modname;
        }
    }

    pub fn add_edge(&mut self, src: Namespace, dest: Namespace, lineno: i64, mod_name: Namespace, ext_mod: Namespace) {
        self.add_node(src.clone(), mod_name.clone());
        self.add_node(dest.clone(), Namespace::from(""));
        self.cg.entry(src.clone()).or_default().insert(dest.clone());
        self.cg_extended.get_mut(&src).unwrap().dsts.push(EdgeMeta {
            dst: dest,
            lineno,
            mod_name,
            ext_mod,
        });
    }

    pub fn add_entrypoint(&mut self, ep: Namespace, modname: Namespace) {
        self.entrypoints.push((ep, modname));
    }

    pub fn edges(&self) -> Vec<(Namespace, Namespace)> {
        let mut out = Vec::new();
        for (src, dsts) in &self.cg {
            for dst in dsts {
                out.push((src.clone(), dst.clone()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_creates_both_endpoints_as_nodes() {
        let mut cg = CallGraph::new();
        cg.add_edge(
            Namespace::from("a.f"),
            Namespace::from("a.g"),
            3,
            Namespace::from("a"),
            Namespace::from(""),
        );
        assert!(cg.cg.contains_key("a.f"));
        assert!(cg.cg.contains_key("a.g"));
        assert!(cg.cg["a.f"].contains("a.g"));
    }

    #[test]
    fn add_node_does_not_clobber_existing_modname() {
        let mut cg = CallGraph::new();
        cg.add_node(Namespace::from("a.f"), Namespace::from("a"));
        cg.add_node(Namespace::from("a.f"), Namespace::from(""));
        assert_eq!(cg.modnames["a.f"].as_ref(), "a");
    }
}
