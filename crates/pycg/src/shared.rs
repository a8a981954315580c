//! Traversal-independent logic shared by all three passes: node decoding,
//! attribute/subscript/call-argument resolution, and assignment handling.
//!
//! Each pass (preprocess, postprocess, emit) owns an [`AnalysisCore`] and a
//! small amount of its own traversal state (a name stack / method stack);
//! the bulk of the non-trivial resolution logic lives here as plain methods
//! so the three passes share it by composition rather than through a
//! generic visitor trait.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexSet;
use ruff_python_ast::{self as ast, Expr as AstExpr, Number};

use crate::{
    classes::ClassTable,
    constants::{self, Namespace, join2},
    definitions::{DefType, Definition, DefinitionManager},
    imports::ImportResolver,
    modules::ModuleTable,
    pointer::Literal,
    scope::ScopeManager,
};

/// A single decoded value: either a reference to an existing `Definition`,
/// or a literal collapsed by [`Literal`].
#[derive(Debug, Clone)]
pub enum Decoded {
    Def(Namespace),
    Lit(Literal<'static>),
}

impl Decoded {
    pub fn as_def(&self) -> Option<&Namespace> {
        match self {
            Self::Def(ns) => Some(ns),
            Self::Lit(_) => None,
        }
    }
}

/// Owns every store mutated across a single analysis run. `closured` is
/// `None` during preprocessing and populated before postprocess/emit run,
/// mirroring the original's `getattr(self, "closured", None)` duck-typed
/// check for "has the fixed point been computed yet".
pub struct AnalysisCore {
    pub defs: DefinitionManager,
    pub scopes: ScopeManager,
    pub classes: ClassTable,
    pub modules: ModuleTable,
    pub imports: ImportResolver,
    pub closured: Option<AHashMap<Namespace, IndexSet<Namespace>>>,
    /// Modules already preprocessed, shared across recursive submodule
    /// analysis so a diamond import graph is only walked once.
    pub modules_analyzed: AHashSet<Namespace>,
}

impl AnalysisCore {
    pub fn new(package_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            defs: DefinitionManager::new(),
            scopes: ScopeManager::new(),
            classes: ClassTable::new(),
            modules: ModuleTable::new(),
            imports: ImportResolver::new(package_root),
            closured: None,
            modules_analyzed: AHashSet::default(),
        }
    }

    pub fn recompute_closure(&mut self) {
        self.closured = Some(self.defs.transitive_closure());
    }

    fn closure_of(&self, ns: &str) -> IndexSet<Namespace> {
        self.closured
            .as_ref()
            .and_then(|c| c.get(ns))
            .cloned()
            .unwrap_or_default()
    }

    /// Resolves `target`'s `<def>.<attr>` namespace into a definition,
    /// creating an EXT definition when `def` is external (mirrors
    /// `_retrieve_attribute_names`'s per-closured-member expansion, but at
    /// the single-definition granularity a.b resolution needs).
    fn resolve_attr_on(&mut self, def_ns: &str, attr: &str, out: &mut IndexSet<Namespace>) {
        let Some(defi) = self.defs.get(def_ns) else { return };
        if defi.is_class_def() {
            if let Some(names) = self.find_cls_fun_ns(def_ns, attr) {
                out.extend(names);
            }
        } else if matches!(defi.def_type, DefType::Fun | DefType::Mod) {
            out.insert(join2(def_ns, attr));
        } else if defi.is_ext_def() {
            if attr.is_empty() || def_ns.contains(attr) {
                return;
            }
            let ext_name = join2(def_ns, attr);
            if !self.defs.contains(&ext_name) {
                let _ = self.defs.create(ext_name.clone(), DefType::Ext);
                self.add_ext_mod_node(&ext_name);
            }
            out.insert(ext_name);
        }
    }

    /// Decodes the base expression of an attribute access into the set of
    /// namespaces reachable through its closure (used both for plain
    /// attribute targets/reads and for base-class resolution).
    pub fn retrieve_parent_names(&mut self, current_ns: &str, base: &AstExpr) -> IndexSet<Namespace> {
        let decoded = self.decode_node(current_ns, base);
        let mut names = IndexSet::new();
        for d in decoded {
            let Decoded::Def(ns) = d else { continue };
            let closure = self.closure_of(&ns);
            if closure.is_empty() {
                names.insert(ns);
            } else {
                names.extend(closure);
            }
        }
        names
    }

    pub fn retrieve_attribute_names(&mut self, current_ns: &str, value: &AstExpr, attr: &str) -> IndexSet<Namespace> {
        if self.closured.is_none() {
            return IndexSet::new();
        }
        let parents = self.retrieve_parent_names(current_ns, value);
        let mut names = IndexSet::new();
        for parent in parents {
            for name in self.closure_of(&parent).into_iter().chain(std::iter::once(parent.clone())) {
                self.resolve_attr_on(&name, attr, &mut names);
            }
        }
        names
    }

    /// Decodes an expression into zero or more values. The single place
    /// that maps an AST node to what it "currently is": a name lookup, a
    /// call's return value(s), a literal, or a container/attribute/
    /// subscript reference.
    pub fn decode_node(&mut self, current_ns: &str, node: &AstExpr) -> Vec<Decoded> {
        match node {
            AstExpr::Name(ast::ExprName { id, .. }) => self
                .scopes
                .get_def(current_ns, id.as_str())
                .cloned()
                .map(|ns| vec![Decoded::Def(ns)])
                .unwrap_or_default(),
            AstExpr::Call(ast::ExprCall { func, .. }) => {
                let decoded = self.decode_node(current_ns, func);
                let mut out = Vec::new();
                for d in decoded {
                    let Decoded::Def(ns) = d else { continue };
                    let Some(defi) = self.defs.get(&ns) else { continue };
                    let return_ns = if defi.is_function_def() {
                        Some(join2(&defi.fullns, constants::RETURN_NAME))
                    } else if defi.is_class_def() {
                        Some(defi.fullns.clone())
                    } else if defi.is_ext_def() {
                        defi.name_pointer.values.iter().next().cloned()
                    } else {
                        None
                    };
                    if let Some(return_ns) = return_ns {
                        if self.defs.contains(&return_ns) {
                            out.push(Decoded::Def(return_ns));
                        }
                    }
                }
                out
            }
            AstExpr::Lambda(_) => {
                let lambda_name = {
                    let scope = self.scopes.get_scope(current_ns);
                    scope.map(|s| format!("<lambda{}>", s.counters.lambda))
                };
                lambda_name
                    .and_then(|name| self.scopes.get_def(current_ns, &name).cloned())
                    .map(|ns| vec![Decoded::Def(ns)])
                    .unwrap_or_default()
            }
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => {
                elts.iter().flat_map(|e| self.decode_node(current_ns, e)).collect()
            }
            AstExpr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                let left_d = self.decode_node(current_ns, left);
                if left_d.iter().any(|d| d.as_def().is_none()) || left_d.is_empty() {
                    return left_d;
                }
                self.decode_node(current_ns, right)
            }
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => self
                .retrieve_attribute_names(current_ns, value, attr.id())
                .into_iter()
                .filter(|ns| self.defs.contains(ns))
                .map(Decoded::Def)
                .collect(),
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, .. }) => match value {
                Number::Int(i) => vec![Decoded::Lit(Literal::Int(i.as_i64().unwrap_or_default()))],
                _ => vec![Decoded::Lit(Literal::Other)],
            },
            AstExpr::StringLiteral(_) => {
                // Container-key resolution keeps exact string values via
                // `retrieve_subscript_names`; plain decode only needs the tag,
                // so an empty borrow is fine (`literal_tag` never reads it).
                vec![Decoded::Lit(Literal::Str(""))]
            }
            AstExpr::BooleanLiteral(_) | AstExpr::NoneLiteral(_) | AstExpr::EllipsisLiteral(_) => {
                vec![Decoded::Lit(Literal::Other)]
            }
            AstExpr::Dict(_) => {
                let dict_name = self
                    .scopes
                    .get_scope(current_ns)
                    .map(|s| format!("<dict{}>", s.counters.dict));
                dict_name
                    .and_then(|name| self.scopes.get_def(current_ns, &name).cloned())
                    .map(|ns| vec![Decoded::Def(ns)])
                    .unwrap_or_default()
            }
            AstExpr::List(ast::ExprList { .. }) => {
                let list_name = self
                    .scopes
                    .get_scope(current_ns)
                    .map(|s| format!("<list{}>", s.counters.list));
                list_name
                    .and_then(|name| self.scopes.get_def(current_ns, &name).cloned())
                    .map(|ns| vec![Decoded::Def(ns)])
                    .unwrap_or_default()
            }
            AstExpr::Subscript(sub) => self
                .retrieve_subscript_names(current_ns, sub)
                .into_iter()
                .filter(|ns| self.defs.contains(ns))
                .map(Decoded::Def)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Resolves `container[key]` to the set of `<container>.<key>`
    /// namespaces the closure says `container` and `key` may be, for every
    /// combination (container values x literal keys).
    pub fn retrieve_subscript_names(&mut self, current_ns: &str, node: &ast::ExprSubscript) -> IndexSet<Namespace> {
        if self.closured.is_none() {
            return IndexSet::new();
        }

        let mut keys: IndexSet<Namespace> = IndexSet::new();
        match node.slice.as_ref() {
            AstExpr::StringLiteral(s) => {
                keys.insert(Namespace::from(s.value.to_string()));
            }
            AstExpr::NumberLiteral(ast::ExprNumberLiteral {
                value: Number::Int(i), ..
            }) => {
                if let Some(i) = i.as_i64() {
                    keys.insert(Namespace::from(format!("<int{i}>")));
                }
            }
            other => {
                for s in self.decode_node(current_ns, other) {
                    if let Decoded::Def(ns) = s {
                        for name in self.closure_of(&ns) {
                            if let Some(defi) = self.defs.get(&name) {
                                keys.extend(defi.literal_pointer.values.iter().cloned());
                            }
                        }
                    }
                }
            }
        }

        let val_names = self.decode_node(current_ns, &node.value);
        let mut decoded_vals: IndexSet<Namespace> = IndexSet::new();
        for n in val_names {
            if let Decoded::Def(ns) = n {
                decoded_vals.extend(self.closure_of(&ns));
            }
        }

        let mut full_names = IndexSet::new();
        for d in &decoded_vals {
            for key in &keys {
                full_names.insert(join2(d, key));
            }
        }
        full_names
    }

    /// Resolves the namespace(s) a call expression's callee may be, using
    /// the closure. Distinct from `decode_node` on a `Call`, which resolves
    /// the call's *return value*; this resolves the call's *target*.
    pub fn retrieve_call_names(&mut self, current_ns: &str, func: &AstExpr) -> IndexSet<Namespace> {
        match func {
            AstExpr::Name(ast::ExprName { id, .. }) => self
                .scopes
                .get_def(current_ns, id.as_str())
                .map(|ns| self.closure_of(ns))
                .unwrap_or_default(),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                self.retrieve_attribute_names(current_ns, value, attr.id())
            }
            AstExpr::Subscript(sub) => {
                let full_names = self.retrieve_subscript_names(current_ns, sub);
                let mut out = IndexSet::new();
                for n in full_names {
                    out.extend(self.closure_of(&n));
                }
                out
            }
            _ => IndexSet::new(),
        }
    }

    /// Binds `decoded` into the definition at `target_ns`, creating it as a
    /// plain NAME if it doesn't exist, and registers the binding in the
    /// enclosing scope.
    pub fn handle_assign(&mut self, target_ns: &str, decoded: &[Decoded]) {
        if !self.defs.contains(target_ns) {
            let _ = self.defs.create(Namespace::from(target_ns), DefType::Name);
        }
        for d in decoded {
            match d {
                Decoded::Def(ns) => {
                    self.defs.get_mut(target_ns).unwrap().name_pointer.add(ns.clone());
                }
                Decoded::Lit(lit) => {
                    self.defs.get_mut(target_ns).unwrap().literal_pointer.add(*lit);
                }
            }
        }
        if let Some((parent, short)) = target_ns.rsplit_once('.') {
            self.scopes
                .handle_assign(parent, Namespace::from(short), Namespace::from(target_ns));
        }
    }

    /// Binds the actual arguments of a call expression into the matching
    /// formal parameter pointers of `callee_ns`.
    pub fn iterate_call_args(&mut self, current_ns: &str, callee_ns: &str, call: &ast::ExprCall) {
        let is_fun = self.defs.get(callee_ns).is_some_and(Definition::is_function_def);

        for (pos, arg) in call.arguments.args.iter().enumerate() {
            let decoded = self.decode_node(current_ns, arg);
            if is_fun {
                let pos_arg_names: Vec<Namespace> = self
                    .defs
                    .get(callee_ns)
                    .and_then(|d| d.name_pointer.get_pos_arg(pos as u32))
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                for name in pos_arg_names {
                    for d in &decoded {
                        match d {
                            Decoded::Def(ns) => {
                                if let Some(arg_def) = self.defs.get_mut(&name) {
                                    arg_def.name_pointer.add(ns.clone());
                                }
                            }
                            Decoded::Lit(lit) => {
                                if let Some(arg_def) = self.defs.get_mut(&name) {
                                    arg_def.literal_pointer.add(*lit);
                                }
                            }
                        }
                    }
                }
            } else if let Some(callee) = self.defs.get_mut(callee_ns) {
                for d in &decoded {
                    match d {
                        Decoded::Def(ns) => callee.name_pointer.add_pos_arg(pos as u32, None, [ns.clone()]),
                        Decoded::Lit(lit) => {
                            callee
                                .name_pointer
                                .add_pos_lit_arg(pos as u32, None, crate::pointer::literal_tag(*lit));
                        }
                    }
                }
            }
        }

        for kw in call.arguments.keywords.iter() {
            let Some(arg_name) = kw.arg.as_ref() else { continue };
            let decoded = self.decode_node(current_ns, &kw.value);
            let kw_name = Namespace::from(arg_name.id());
            if is_fun {
                let arg_names: Vec<Namespace> = self
                    .defs
                    .get(callee_ns)
                    .and_then(|d| d.name_pointer.get_arg(&kw_name))
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                for name in arg_names {
                    for d in &decoded {
                        match d {
                            Decoded::Def(ns) => {
                                if let Some(arg_def) = self.defs.get_mut(&name) {
                                    arg_def.name_pointer.add(ns.clone());
                                }
                            }
                            Decoded::Lit(lit) => {
                                if let Some(arg_def) = self.defs.get_mut(&name) {
                                    arg_def.literal_pointer.add(*lit);
                                }
                            }
                        }
                    }
                }
            } else if let Some(callee) = self.defs.get_mut(callee_ns) {
                for d in &decoded {
                    match d {
                        Decoded::Def(ns) => callee.name_pointer.add_arg(kw_name.clone(), [ns.clone()]),
                        Decoded::Lit(lit) => {
                            callee.name_pointer.add_lit_arg(kw_name.clone(), crate::pointer::literal_tag(*lit));
                        }
                    }
                }
            }
        }
    }

    /// Looks up `fn_name` through `cls_name`'s MRO, returning the closure
    /// of the first ancestor where a definition exists, materializing
    /// external placeholders along the way for ancestors known to be
    /// external (mirrors `find_cls_fun_ns`).
    pub fn find_cls_fun_ns(&mut self, cls_name: &str, fn_name: &str) -> Option<IndexSet<Namespace>> {
        let mro = self.classes.get(cls_name)?.mro.clone();
        let mut ext_names = IndexSet::new();

        for item in &mro {
            let ns = join2(item, fn_name);
            let names = self.closure_of(&ns);
            let names = if names.is_empty() {
                IndexSet::from([ns.clone()])
            } else {
                names
            };

            if self.defs.contains(&ns) {
                return Some(names);
            }

            if self.defs.get(item).is_some_and(Definition::is_ext_def) {
                ext_names.insert(ns);
            }
        }

        for name in &ext_names {
            if !self.defs.contains(name) {
                let _ = self.defs.create(name.clone(), DefType::Ext);
            }
            self.add_ext_mod_node(name);
        }
        Some(ext_names)
    }

    pub fn add_ext_mod_node(&mut self, name: &str) {
        let ext_modname = name.split('.').next().unwrap_or(name);
        if self.modules.get(ext_modname).is_none() {
            let modname = Namespace::from(ext_modname);
            let module = self.modules.create(modname.clone(), None, true);
            module.add_method(modname, None, None);
        }
        if let Some(module) = self.modules.get_mut(ext_modname) {
            module.add_method(Namespace::from(name), None, None);
        }
    }
}
