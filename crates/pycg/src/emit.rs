//! Third pass: walks the stabilized program once more, materializing the
//! actual call-graph nodes/edges plus the per-node metadata (`cg_extended`)
//! the JSON encoders read. Falls back to best-effort external edges (a
//! builtin call, an attribute chain rooted in an external import) when a
//! callee can't be resolved to a known definition.

use std::path::PathBuf;

use ruff_python_ast::{self as ast, Expr as AstExpr, Stmt};
use ruff_python_parser::parse_module;

use crate::{
    callgraph::CallGraph,
    constants::{self, Namespace, join2},
    shared::{AnalysisCore, Decoded},
};

/// Python builtin callables the original resolves via `name in __builtins__`.
const PYTHON_BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "bytearray", "bytes", "callable", "chr", "classmethod",
    "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "filter", "float",
    "format", "frozenset", "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input", "int",
    "isinstance", "issubclass", "iter", "len", "list", "locals", "map", "max", "memoryview", "min", "next",
    "object", "oct", "open", "ord", "pow", "print", "property", "range", "repr", "reversed", "round", "set",
    "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
];

pub struct Emitter<'a> {
    core: &'a mut AnalysisCore,
    graph: &'a mut CallGraph,
    name_stack: Vec<Namespace>,
    modname: Namespace,
    filename: PathBuf,
    current_method: Namespace,
    source: String,
}

impl<'a> Emitter<'a> {
    pub fn new(core: &'a mut AnalysisCore, graph: &'a mut CallGraph, modname: Namespace, filename: PathBuf) -> Self {
        let current_method = modname.clone();
        Self {
            core,
            graph,
            name_stack: vec![modname.clone()],
            modname,
            filename,
            current_method,
            source: String::new(),
        }
    }

    fn current_ns(&self) -> Namespace {
        Namespace::from(self.name_stack.join("."))
    }

    pub fn analyze(&mut self) {
        self.graph.add_node(self.modname.clone(), self.modname.clone());
        self.source = std::fs::read_to_string(&self.filename).unwrap_or_default();
        let Ok(parsed) = parse_module(&self.source) else { return };
        let body = parsed.into_syntax().body;
        self.core.scopes.reset_scope_counters(&self.modname.clone());
        self.visit_body(&body);
        self.analyze_submodules();
    }

    /// 1-based source line containing a byte offset, counted from the
    /// current module's own source text.
    fn line_of(&self, offset: ruff_text_size::TextSize) -> u32 {
        let idx = usize::from(offset).min(self.source.len());
        u32::try_from(self.source[..idx].matches('\n').count()).unwrap_or(u32::MAX) + 1
    }

    fn analyze_submodules(&mut self) {
        let imports: Vec<Namespace> = self.core.imports.get_imports(&self.modname).into_iter().collect();
        for dest in imports {
            if self.core.modules_analyzed.contains(&dest) {
                continue;
            }
            self.core.modules_analyzed.insert(dest.clone());
            let Some(node) = self.core.imports.get_node(&dest) else { continue };
            let Some(file) = node.filename.clone() else { continue };
            let mut sub = Emitter::new(self.core, self.graph, dest, file);
            sub.analyze();
        }
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(f) => self.visit_function_def(f),
            Stmt::ClassDef(c) => self.visit_class_def(c),
            Stmt::Return(ast::StmtReturn { value, .. }) => {
                if let Some(v) = value {
                    self.visit_expr(v);
                }
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                self.visit_expr(value);
                for t in targets {
                    self.visit_expr(t);
                }
            }
            Stmt::AugAssign(ast::StmtAugAssign { value, .. }) => self.visit_expr(value),
            Stmt::For(f) => self.visit_for(f),
            Stmt::While(ast::StmtWhile { test, body, orelse, .. }) => {
                self.visit_expr(test);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            Stmt::If(s) => self.visit_if(s),
            Stmt::With(s) => {
                for item in &s.items {
                    self.visit_expr(&item.context_expr);
                }
                self.visit_body(&s.body);
            }
            Stmt::Try(s) => {
                self.visit_body(&s.body);
                for h in &s.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = h;
                    self.visit_body(&h.body);
                }
                self.visit_body(&s.orelse);
                self.visit_body(&s.finalbody);
            }
            Stmt::Raise(r) => self.visit_raise(r),
            Stmt::Expr(ast::StmtExpr { value, .. }) => {
                self.bump_expr_count();
                self.visit_expr(value);
            }
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                for t in targets {
                    self.visit_expr(t);
                }
            }
            _ => {}
        }
    }

    fn bump_expr_count(&mut self) {
        if let Some(node) = self.graph.cg_extended.get_mut(&self.current_method) {
            node.meta.expr_count += 1;
        }
    }

    fn visit_if(&mut self, s: &ast::StmtIf) {
        if let Some(node) = self.graph.cg_extended.get_mut(&self.current_method) {
            node.meta.if_count += 1;
        }
        self.visit_expr(&s.test);
        self.visit_body(&s.body);
        for clause in &s.elif_else_clauses {
            if let Some(test) = &clause.test {
                self.visit_expr(test);
            }
            self.visit_body(&clause.body);
        }
    }

    fn visit_raise(&mut self, r: &ast::StmtRaise) {
        let Some(exc) = &r.exc else { return };
        self.visit_expr(exc);
        let current_ns = self.current_ns();
        let decoded = self.core.decode_node(&current_ns, exc);
        let current_method = self.current_method.clone();

        for d in decoded {
            let Decoded::Def(ns) = d else { continue };
            let closure: Vec<Namespace> = self
                .core
                .closured
                .as_ref()
                .and_then(|c| c.get(&ns))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            for name in closure {
                let Some(defi) = self.core.defs.get(&name).cloned() else { continue };
                if defi.is_class_def() {
                    if let Some(inits) = self.core.find_cls_fun_ns(&name, constants::INIT_NAME) {
                        for init_ns in inits {
                            self.add_edge(current_method.clone(), init_ns, -1);
                        }
                    }
                }
                if defi.is_ext_def() {
                    self.add_edge(current_method.clone(), name, -1);
                }
            }
        }

        if let AstExpr::Name(ast::ExprName { id, .. }) = exc {
            self.record_raise(id.as_str());
        } else if let AstExpr::Call(ast::ExprCall { func, .. }) = exc {
            if let AstExpr::Name(ast::ExprName { id, .. }) = func.as_ref() {
                self.record_raise(id.as_str());
            }
        }
    }

    fn record_raise(&mut self, name: &str) {
        if let Some(node) = self.graph.cg_extended.get_mut(&self.current_method) {
            node.meta.raises.insert(Namespace::from(name));
        }
    }

    fn add_edge(&mut self, src: Namespace, dst: Namespace, lineno: i64) {
        self.graph.add_edge(src, dst, lineno, self.modname.clone(), Namespace::from(""));
    }

    fn add_ext_edge(&mut self, name: Namespace, ext_modname: Namespace, lineno: i64) {
        self.core.add_ext_mod_node(&name);
        self.graph.add_node(name.clone(), ext_modname.clone());
        self.graph
            .add_edge(self.current_method.clone(), name, lineno, self.modname.clone(), ext_modname);
    }

    fn visit_function_def(&mut self, f: &ast::StmtFunctionDef) {
        let current_ns = self.current_ns();
        let fn_name = Namespace::from(f.name.id());
        let fn_ns = join2(&current_ns, &fn_name);

        for decorator in &f.decorator_list {
            self.visit_expr(&decorator.expression);
            let decoded = self.core.decode_node(&current_ns, &decorator.expression);
            for d in decoded {
                let Decoded::Def(dns) = d else { continue };
                let closure: Vec<Namespace> = self
                    .core
                    .closured
                    .as_ref()
                    .and_then(|c| c.get(&dns))
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                let current_method = self.current_method.clone();
                for name in closure {
                    self.add_edge(current_method.clone(), name, i64::from(self.line_of(f.range.start())));
                }
            }
        }

        self.graph.add_node(fn_ns.clone(), self.modname.clone());
        let arg_names = collect_arg_names(&f.parameters);
        if let Some(node) = self.graph.cg_extended.get_mut(&fn_ns) {
            node.meta.decl_line = Some(self.line_of(f.range.start()));
            node.meta.arg_count = arg_names.len();
            node.meta.arg_types = vec!["N/A"; arg_names.len()];
            node.meta.arg_names = arg_names;
            node.meta.if_count = 0;
            node.meta.expr_count = 0;
        }

        let saved_method = std::mem::replace(&mut self.current_method, fn_ns);
        self.name_stack.push(fn_name);
        self.core.scopes.reset_scope_counters(&self.current_ns());
        self.visit_body(&f.body);
        self.name_stack.pop();
        self.current_method = saved_method;
    }

    fn visit_class_def(&mut self, c: &ast::StmtClassDef) {
        let current_ns = self.current_ns();
        let cls_name = Namespace::from(c.name.id());
        self.name_stack.push(cls_name);
        let _ = current_ns;
        self.visit_body(&c.body);
        self.name_stack.pop();
    }

    fn visit_for(&mut self, f: &ast::StmtFor) {
        self.bump_expr_count();
        self.visit_expr(&f.iter);
        self.visit_expr(&f.target);

        let current_ns = self.current_ns();
        let iter_decoded = self.core.decode_node(&current_ns, &f.iter);
        let current_method = self.current_method.clone();
        for item in iter_decoded {
            let Decoded::Def(ns) = item else { continue };
            let closure: Vec<Namespace> = self
                .core
                .closured
                .as_ref()
                .and_then(|c| c.get(&ns))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            for name in closure {
                let iter_ns = join2(&name, constants::ITER_NAME);
                let next_ns = join2(&name, constants::NEXT_NAME);
                if self.core.defs.contains(&iter_ns) {
                    self.add_edge(current_method.clone(), iter_ns, -1);
                }
                if self.core.defs.contains(&next_ns) {
                    self.add_edge(current_method.clone(), next_ns, -1);
                }
            }
        }

        self.visit_body(&f.body);
        self.visit_body(&f.orelse);
    }

    fn visit_expr(&mut self, expr: &AstExpr) {
        match expr {
            AstExpr::Call(call) => self.visit_call(call),
            AstExpr::Lambda(l) => self.visit_lambda(l),
            AstExpr::Dict(d) => {
                for item in d.items.iter() {
                    if let Some(key) = &item.key {
                        self.visit_expr(key);
                    }
                    self.visit_expr(&item.value);
                }
            }
            AstExpr::List(l) => {
                for e in l.elts.iter() {
                    self.visit_expr(e);
                }
            }
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) | AstExpr::Set(ast::ExprSet { elts, .. }) => {
                for e in elts.iter() {
                    self.visit_expr(e);
                }
            }
            AstExpr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            AstExpr::BoolOp(ast::ExprBoolOp { values, .. }) => {
                for v in values.iter() {
                    self.visit_expr(v);
                }
            }
            AstExpr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => self.visit_expr(operand),
            AstExpr::Compare(ast::ExprCompare { left, comparators, .. }) => {
                self.visit_expr(left);
                for c in comparators.iter() {
                    self.visit_expr(c);
                }
            }
            AstExpr::IfExp(ast::ExprIf { test, body, orelse, .. }) => {
                self.visit_expr(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
            }
            AstExpr::Attribute(ast::ExprAttribute { value, .. }) => self.visit_expr(value),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.visit_expr(value);
                self.visit_expr(slice);
            }
            AstExpr::Starred(ast::ExprStarred { value, .. }) => self.visit_expr(value),
            AstExpr::Await(ast::ExprAwait { value, .. })
            | AstExpr::YieldFrom(ast::ExprYieldFrom { value, .. }) => self.visit_expr(value),
            AstExpr::Yield(ast::ExprYield { value, .. }) => {
                if let Some(v) = value {
                    self.visit_expr(v);
                }
            }
            _ => {}
        }
    }

    fn visit_lambda(&mut self, l: &ast::ExprLambda) {
        let current_ns = self.current_ns();
        let lambda_name = Namespace::from(
            self.core
                .scopes
                .get_scope_mut(&current_ns)
                .map(|s| s.counters.next_lambda())
                .unwrap_or_default(),
        );
        let lambda_ns = join2(&current_ns, &lambda_name);
        self.graph.add_node(lambda_ns, self.modname.clone());
        self.name_stack.push(lambda_name);
        self.visit_expr(&l.body);
        self.name_stack.pop();
    }

    fn visit_call(&mut self, call: &ast::ExprCall) {
        for a in call.arguments.args.iter() {
            self.visit_expr(a);
        }
        for kw in call.arguments.keywords.iter() {
            self.visit_expr(&kw.value);
        }
        self.visit_expr(&call.func);

        let current_ns = self.current_ns();
        let names = self.core.retrieve_call_names(&current_ns, &call.func);
        let lineno = i64::from(self.line_of(call.range.start()));

        if let AstExpr::Call(inner) = call.func.as_ref() {
            let _ = inner;
        }
        if let AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) = call.func.as_ref() {
            if let AstExpr::Name(ast::ExprName { id, .. }) = value.as_ref() {
                if id.as_str() == "atheris" && attr.id() == "Setup" {
                    if let Some(AstExpr::Name(ast::ExprName { id: target, .. })) = call.arguments.args.get(1) {
                        self.graph.add_entrypoint(Namespace::from(target.as_str()), self.modname.clone());
                    }
                }
            }
        }

        if names.is_empty() {
            self.visit_call_fallback(call, lineno);
            return;
        }

        let current_method = self.current_method.clone();
        for pointer in names {
            let init_ns = join2(&pointer, constants::INIT_NAME);
            let pointer = if self.core.scopes.get_scope(&init_ns).is_some() {
                init_ns
            } else {
                pointer
            };
            let Some(defi) = self.core.defs.get(&pointer).cloned() else { continue };
            if defi.is_callable() {
                if defi.is_ext_def() {
                    let ext_modname = Namespace::from(pointer.split('.').next().unwrap_or(""));
                    self.add_ext_edge(pointer.clone(), ext_modname, lineno);
                    continue;
                }
                self.add_edge(current_method.clone(), pointer.clone(), lineno);
            }
            if defi.is_class_def() {
                if let Some(inits) = self.core.find_cls_fun_ns(&pointer, constants::INIT_NAME) {
                    for ns in inits {
                        self.add_edge(current_method.clone(), ns, lineno);
                    }
                }
            }
        }
    }

    /// Best-effort resolution when the closure yields nothing: a call
    /// through an attribute chain rooted in an external import, a direct
    /// builtin name, or (last resort) the raw dotted attribute path.
    fn visit_call_fallback(&mut self, call: &ast::ExprCall, lineno: i64) {
        let current_ns = self.current_ns();
        match call.func.as_ref() {
            AstExpr::Attribute(attr_expr) if self.has_ext_parent(attr_expr) => {
                for name in self.get_full_attr_names(attr_expr) {
                    let ext_modname = Namespace::from(name.split('.').next().unwrap_or(""));
                    self.add_ext_edge(name, ext_modname, lineno);
                }
            }
            AstExpr::Name(ast::ExprName { id, .. }) if is_builtin(id.as_str()) => {
                let name = join2(constants::BUILTIN_NAME, id.as_str());
                self.add_ext_edge(name, Namespace::from(constants::BUILTIN_NAME), lineno);
            }
            AstExpr::Attribute(attr_expr) => {
                if let Some(lhs) = flatten_attr_chain(attr_expr) {
                    if !lhs.contains("self.") {
                        self.add_ext_edge(Namespace::from(lhs), Namespace::from(constants::BUILTIN_NAME), lineno);
                    }
                }
            }
            _ => {}
        }
        let _ = current_ns;
    }

    fn has_ext_parent(&mut self, attr: &ast::ExprAttribute) -> bool {
        let current_ns = self.current_ns();
        let mut cursor = AstExpr::Attribute(attr.clone());
        while let AstExpr::Attribute(a) = cursor.clone() {
            let parents = self.core.retrieve_parent_names(&current_ns, &a.value);
            for parent in parents {
                let closure: Vec<Namespace> = self
                    .core
                    .closured
                    .as_ref()
                    .and_then(|c| c.get(&parent))
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                for name in closure {
                    if self.core.defs.get(&name).is_some_and(|d| d.is_ext_def()) {
                        return true;
                    }
                }
            }
            cursor = (*a.value).clone();
        }
        false
    }

    fn get_full_attr_names(&mut self, attr: &ast::ExprAttribute) -> Vec<Namespace> {
        let mut parts = vec![attr.attr.id().to_string()];
        let mut cursor = (*attr.value).clone();
        loop {
            match cursor {
                AstExpr::Attribute(ref a) => {
                    parts.push(a.attr.id().to_string());
                    let next = (*a.value).clone();
                    cursor = next;
                }
                _ => break,
            }
        }
        let AstExpr::Name(ast::ExprName { id, .. }) = cursor else { return Vec::new() };
        parts.reverse();
        let suffix = parts.join(".");

        let current_ns = self.current_ns();
        let Some(defi_ns) = self.core.scopes.get_def(&current_ns, id.as_str()).cloned() else {
            return Vec::new();
        };
        self.core
            .closured
            .as_ref()
            .and_then(|c| c.get(&defi_ns))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|base| join2(&base, &suffix))
            .collect()
    }
}

fn is_builtin(name: &str) -> bool {
    PYTHON_BUILTINS.contains(&name)
}

fn flatten_attr_chain(attr: &ast::ExprAttribute) -> Option<String> {
    let mut parts = vec![attr.attr.id().to_string()];
    let mut cursor: &AstExpr = attr.value.as_ref();
    loop {
        match cursor {
            AstExpr::Attribute(a) => {
                parts.push(a.attr.id().to_string());
                cursor = a.value.as_ref();
            }
            AstExpr::Name(ast::ExprName { id, .. }) => {
                parts.push(id.to_string());
                break;
            }
            _ => return None,
        }
    }
    parts.reverse();
    Some(parts.join("."))
}

fn collect_arg_names(params: &ast::Parameters) -> Vec<Namespace> {
    let mut names = Vec::new();
    for p in params.posonlyargs.iter().chain(params.args.iter()) {
        names.push(Namespace::from(p.parameter.name.id.as_str()));
    }
    if let Some(vararg) = &params.vararg {
        names.push(Namespace::from(vararg.name.id.as_str()));
    }
    for p in params.kwonlyargs.iter() {
        names.push(Namespace::from(p.parameter.name.id.as_str()));
    }
    if let Some(kwarg) = &params.kwarg {
        names.push(Namespace::from(kwarg.name.id.as_str()));
    }
    names
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefType as DT;

    #[test]
    fn function_def_registers_node_with_arg_metadata() {
        let mut core = AnalysisCore::new("/pkg");
        core.scopes.create_scope(Namespace::from("m"), None);
        core.defs.create(Namespace::from("m"), DT::Mod).unwrap();
        core.defs.handle_function_def("m", "f");
        core.recompute_closure();
        let mut graph = CallGraph::new();
        {
            let mut emitter = Emitter::new(&mut core, &mut graph, Namespace::from("m"), PathBuf::from("/pkg/m.py"));
            emitter.graph.add_node(Namespace::from("m"), Namespace::from("m"));
        }
        assert!(graph.cg_extended.contains_key("m"));
    }
}
