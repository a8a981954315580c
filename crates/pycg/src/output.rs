//! JSON encoders for the finished call graph: the plain `{caller: [callees]}`
//! mapping used by default, and a FASTEN-format encoding for package-level
//! dependency tooling.

use serde_json::{Map, Value, json};

use crate::{callgraph::CallGraph, constants::Namespace};

/// `{"caller.ns": ["callee.ns", ...], ...}`, matching the default (non-FASTEN)
/// output `__main__.py` prints: every node, even one with no outgoing edges.
pub fn default_output(graph: &CallGraph) -> Value {
    let mut out = Map::new();
    let mut keys: Vec<&Namespace> = graph.cg.keys().collect();
    keys.sort();
    for key in keys {
        let mut callees: Vec<&str> = graph.cg[key].iter().map(std::convert::AsRef::as_ref).collect();
        callees.sort_unstable();
        out.insert(key.to_string(), json!(callees));
    }
    Value::Object(out)
}

pub struct FastenMetadata {
    pub product: String,
    pub forge: String,
    pub version: String,
    pub timestamp: i64,
}

/// A FASTEN-format revision call graph. `depset` is left empty: computing it
/// requires resolving the analyzed package's declared dependencies, which
/// has no counterpart in this analysis (the retrieved reference sources
/// don't include the original's separate dependency-set resolver either).
pub fn fasten_output(graph: &CallGraph, meta: &FastenMetadata) -> Value {
    let mut edges = Vec::new();
    for (src, dsts) in &graph.cg {
        let src_mod = graph.modnames.get(src).cloned().unwrap_or_default();
        let mut sorted: Vec<&Namespace> = dsts.iter().collect();
        sorted.sort();
        for dst in sorted {
            let dst_mod = graph.modnames.get(dst).cloned().unwrap_or_default();
            edges.push(json!([to_uri(&meta.product, &src_mod, src), to_uri(&meta.product, &dst_mod, dst)]));
        }
    }

    json!({
        "product": meta.product,
        "forge": meta.forge,
        "depset": [],
        "version": meta.version,
        "timestamp": meta.timestamp,
        "cha": {},
        "graph": edges,
    })
}

fn to_uri(product: &str, module: &str, fqn: &str) -> String {
    if module.is_empty() {
        format!("//{product}/{fqn}")
    } else {
        format!("//{product}/{module}/{fqn}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_includes_nodes_with_no_callees() {
        let mut graph = CallGraph::new();
        graph.add_node(Namespace::from("m.f"), Namespace::from("m"));
        let out = default_output(&graph);
        assert!(out.get("m.f").is_some());
    }
}
