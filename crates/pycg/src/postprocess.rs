//! Second pass: the transitive closure is already computed (see
//! [`AnalysisCore::recompute_closure`]), so this walk can resolve decorator
//! chains, finalize class MRO lists, propagate parent-class attributes onto
//! subclasses, and bind dict/list literal contents by their real keys.

use std::path::PathBuf;

use ahash::AHashSet;
use ruff_python_ast::{self as ast, Expr as AstExpr, Stmt};
use ruff_python_parser::parse_module;

use crate::{
    constants::{Namespace, join2},
    definitions::DefType,
    shared::{AnalysisCore, Decoded},
};

pub struct Postprocessor<'a> {
    core: &'a mut AnalysisCore,
    name_stack: Vec<Namespace>,
    modname: Namespace,
    filename: PathBuf,
}

impl<'a> Postprocessor<'a> {
    pub fn new(core: &'a mut AnalysisCore, modname: Namespace, filename: PathBuf) -> Self {
        Self {
            core,
            name_stack: vec![modname.clone()],
            modname,
            filename,
        }
    }

    fn current_ns(&self) -> Namespace {
        Namespace::from(self.name_stack.join("."))
    }

    pub fn analyze(&mut self) {
        let source = std::fs::read_to_string(&self.filename).unwrap_or_default();
        let Ok(parsed) = parse_module(&source) else { return };
        let body = parsed.into_syntax().body;
        self.core.scopes.reset_scope_counters(&self.modname.clone());
        self.visit_body(&body);
        self.analyze_submodules();
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
            let mut sub = Postprocessor::new(self.core, dest, file);
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
            Stmt::Return(ast::StmtReturn { value, .. }) => self.visit_return(value.as_deref()),
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => self.visit_assign(value, targets),
            Stmt::AugAssign(ast::StmtAugAssign { value, .. }) => self.visit_expr(value),
            Stmt::For(f) => self.visit_for(f),
            Stmt::While(ast::StmtWhile { test, body, orelse, .. }) => {
                self.visit_expr(test);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            Stmt::If(s) => {
                self.visit_expr(&s.test);
                self.visit_body(&s.body);
                for clause in &s.elif_else_clauses {
                    if let Some(test) = &clause.test {
                        self.visit_expr(test);
                    }
                    self.visit_body(&clause.body);
                }
            }
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
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.visit_expr(value),
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                for t in targets {
                    self.visit_expr(t);
                }
            }
            _ => {}
        }
    }

    fn visit_function_def(&mut self, f: &ast::StmtFunctionDef) {
        let current_ns = self.current_ns();
        let fn_name = Namespace::from(f.name.id());
        let fn_ns = join2(&current_ns, &fn_name);

        if !f.decorator_list.is_empty() && self.core.defs.contains(&fn_ns) {
            self.apply_decorators(&current_ns, &fn_ns, &f.decorator_list);
        }

        self.name_stack.push(fn_name);
        self.core.scopes.reset_scope_counters(&self.current_ns());
        self.visit_body(&f.body);
        self.name_stack.pop();
    }

    /// Threads the function's `decorator_names` and chains each decorator's
    /// first positional argument to the previous step's return value,
    /// mirroring the original's fold over `reversed(decorator_list)`.
    fn apply_decorators(&mut self, current_ns: &str, fn_ns: &str, decorators: &[ast::Decorator]) {
        let reversed: Vec<&AstExpr> = decorators.iter().rev().map(|d| &d.expression).collect();

        if let Some(last) = reversed.last() {
            let decoded = self.core.decode_node(current_ns, last);
            for d in decoded {
                if let Decoded::Def(ns) = d {
                    let return_ns = join2(&ns, crate::constants::RETURN_NAME);
                    if let Some(fn_def) = self.core.defs.get_mut(fn_ns) {
                        fn_def.decorator_names.insert(return_ns);
                    }
                }
            }
        }

        let mut previous_names: AHashSet<Namespace> = self
            .core
            .closured
            .as_ref()
            .and_then(|c| c.get(fn_ns))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        for decorator in reversed {
            let decoded = self.core.decode_node(current_ns, decorator);
            let mut new_previous: AHashSet<Namespace> = AHashSet::default();

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

                for name in closure {
                    let return_ns = join2(&name, crate::constants::RETURN_NAME);
                    let Some(return_closure) = self.core.closured.as_ref().and_then(|c| c.get(&return_ns)) else {
                        continue;
                    };
                    new_previous.extend(return_closure.iter().cloned());

                    let pos_arg_names: Vec<Namespace> = self
                        .core
                        .defs
                        .get(&dns)
                        .and_then(|defi| defi.name_pointer.get_pos_arg(0))
                        .map(|s| s.iter().cloned().collect())
                        .unwrap_or_default();
                    if pos_arg_names.is_empty() {
                        continue;
                    }
                    for prev_name in &previous_names {
                        for arg_name in &pos_arg_names {
                            if let Some(arg_def) = self.core.defs.get_mut(arg_name) {
                                arg_def.name_pointer.add(prev_name.clone());
                            }
                        }
                    }
                }
            }
            previous_names = new_previous;
        }
    }

    fn visit_class_def(&mut self, c: &ast::StmtClassDef) {
        let current_ns = self.current_ns();
        let cls_name = Namespace::from(c.name.id());
        let cls_ns = self.core.defs.handle_class_def(&current_ns, &cls_name);

        if self.core.classes.get(&cls_ns).is_none() {
            self.core.classes.create(cls_ns.clone(), self.modname.clone());
        }
        self.core.classes.get_mut(&cls_ns).unwrap().clear_mro();

        if let Some(arguments) = &c.arguments {
            for base in arguments.args.iter() {
                self.visit_expr(base);
                let bases = self.core.decode_node(&current_ns, base);
                for base_def in bases {
                    let Decoded::Def(base_ns) = base_def else { continue };
                    let names: Vec<Namespace> = self
                        .core
                        .defs
                        .get(&base_ns)
                        .map(|d| {
                            if d.name_pointer.values.is_empty() {
                                vec![d.fullns.clone()]
                            } else {
                                d.name_pointer.values.iter().cloned().collect()
                            }
                        })
                        .unwrap_or_else(|| vec![base_ns.clone()]);

                    for name in names {
                        self.core.classes.get_mut(&cls_ns).unwrap().add_parent_name(name.clone());
                        let parent_mro = self.core.classes.get(&name).map(|p| p.mro.clone());
                        if let Some(parent_mro) = parent_mro {
                            let current_mro = self.core.classes.get(&cls_ns).unwrap().mro.clone();
                            if parent_mro == current_mro {
                                continue;
                            }
                            self.core.classes.get_mut(&cls_ns).unwrap().add_parent_mro(&parent_mro);
                        }
                    }
                }
            }
        }

        self.core.classes.get_mut(&cls_ns).unwrap().compute_mro();

        self.name_stack.push(cls_name);
        self.core.scopes.reset_scope_counters(&self.current_ns());
        self.visit_body(&c.body);
        self.name_stack.pop();
    }

    /// Copies every non-`__init__` attribute a class scope defines onto
    /// each of its MRO ancestors, so a call through a subclass reference
    /// that actually resolves to an inherited method still sees the
    /// override. Writes land on the *parent*'s namespace, matching the
    /// original solver.
    fn update_parent_classes(&mut self, cls_ns: &str) {
        let Some(mro) = self.core.classes.get(cls_ns).map(|c| c.mro.clone()) else { return };
        let Some(current_defs): Option<Vec<(Namespace, Namespace)>> = self
            .core
            .scopes
            .get_scope(cls_ns)
            .map(|s| s.defs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        else {
            return;
        };

        for parent in &mro {
            if self.core.defs.get(parent).is_none() {
                continue;
            }
            if self.core.scopes.get_scope(parent).is_none() {
                continue;
            }

            for (key, child_ns) in &current_defs {
                if key.as_ref() == "__init__" {
                    continue;
                }
                let names = self.core.find_cls_fun_ns(parent, key).unwrap_or_default();
                let new_ns = join2(parent, key);
                if !self.core.defs.contains(&new_ns) {
                    let _ = self.core.defs.create(new_ns.clone(), DefType::Name);
                }
                let new_def = self.core.defs.get_mut(&new_ns).unwrap();
                new_def.name_pointer.add_set(names);
                new_def.name_pointer.add(child_ns.clone());
            }
        }
    }

    fn visit_for(&mut self, f: &ast::StmtFor) {
        if let AstExpr::Name(ast::ExprName { id, .. }) = f.target.as_ref() {
            let current_ns = self.current_ns();
            let target_ns = join2(&current_ns, id.as_str());
            if self.core.defs.contains(&target_ns) {
                let iter_decoded = self.core.decode_node(&current_ns, &f.iter);
                for item in iter_decoded {
                    let Decoded::Def(item_ns) = item else { continue };
                    let closure: Vec<Namespace> = self
                        .core
                        .closured
                        .as_ref()
                        .and_then(|c| c.get(&item_ns))
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .collect();
                    for name in closure {
                        let next_ns = join2(&join2(&name, "__next__"), crate::constants::RETURN_NAME);
                        let next_closure = self.core.closured.as_ref().and_then(|c| c.get(&next_ns)).cloned();
                        if let Some(next_closure) = next_closure {
                            for n in next_closure {
                                if let Some(target_def) = self.core.defs.get_mut(&target_ns) {
                                    target_def.name_pointer.add(n);
                                }
                            }
                        } else if let Some(target_def) = self.core.defs.get_mut(&target_ns) {
                            target_def.name_pointer.add(name);
                        }
                    }
                }
            }
        }
        self.visit_expr(&f.iter);
        self.visit_body(&f.body);
        self.visit_body(&f.orelse);
    }

    fn visit_return(&mut self, value: Option<&AstExpr>) {
        let Some(value) = value else { return };
        self.visit_expr(value);
        let current_ns = self.current_ns();
        let return_ns = join2(&current_ns, crate::constants::RETURN_NAME);
        let decoded = self.core.decode_node(&current_ns, value);
        self.core.handle_assign(&return_ns, &decoded);
    }

    fn visit_assign(&mut self, value: &AstExpr, targets: &[AstExpr]) {
        self.visit_expr(value);
        let current_ns = self.current_ns();
        let decoded = self.core.decode_node(&current_ns, value);
        for target in targets {
            self.do_assign(&decoded, target);
        }
    }

    fn do_assign(&mut self, decoded: &[Decoded], target: &AstExpr) {
        self.visit_expr(target);
        if let AstExpr::Tuple(ast::ExprTuple { elts, .. }) = target {
            for elt in elts.iter() {
                self.do_assign(decoded, elt);
            }
            return;
        }
        let current_ns = self.current_ns();
        let target_namespaces = match target {
            AstExpr::Name(ast::ExprName { id, .. }) => vec![join2(&current_ns, id.as_str())],
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => self
                .core
                .retrieve_parent_names(&current_ns, value)
                .into_iter()
                .map(|base| join2(&base, attr.id()))
                .collect(),
            AstExpr::Subscript(sub) => self.core.retrieve_subscript_names(&current_ns, sub).into_iter().collect(),
            _ => Vec::new(),
        };
        for target_ns in target_namespaces {
            self.core.handle_assign(&target_ns, decoded);
        }
    }

    fn visit_expr(&mut self, expr: &AstExpr) {
        match expr {
            AstExpr::Call(call) => self.visit_call(call),
            AstExpr::Lambda(l) => self.visit_lambda(l),
            AstExpr::Dict(d) => self.visit_dict(d),
            AstExpr::List(l) => self.visit_list(l),
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
                    self.visit_return(Some(v));
                }
            }
            _ => {}
        }
    }

    fn visit_call(&mut self, call: &ast::ExprCall) {
        self.visit_expr(&call.func);
        for a in call.arguments.args.iter() {
            self.visit_expr(a);
        }
        for kw in call.arguments.keywords.iter() {
            self.visit_expr(&kw.value);
        }

        let current_ns = self.current_ns();
        let names = self.core.retrieve_call_names(&current_ns, &call.func);
        if names.is_empty() {
            return;
        }

        for name in names {
            let Some(defi) = self.core.defs.get(&name).cloned() else { continue };
            let target_ns = if defi.is_class_def() {
                self.update_parent_classes(&defi.fullns);
                let init_ns = join2(&defi.fullns, crate::constants::INIT_NAME);
                if !self.core.defs.contains(&init_ns) {
                    continue;
                }
                init_ns
            } else {
                defi.fullns.clone()
            };
            self.core.iterate_call_args(&current_ns, &target_ns, call);
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
        self.name_stack.push(lambda_name);
        self.visit_expr(&l.body);
        self.name_stack.pop();
    }

    /// Unlike the preprocess pass, keys are re-decoded here with the
    /// closure available, so list indices bind to the exact element
    /// namespace the way the original's second walk does.
    fn visit_list(&mut self, l: &ast::ExprList) {
        let current_ns = self.current_ns();
        let list_name = Namespace::from(
            self.core
                .scopes
                .get_scope_mut(&current_ns)
                .map(|s| s.counters.next_list())
                .unwrap_or_default(),
        );
        let list_ns = join2(&current_ns, &list_name);
        if !self.core.defs.contains(&list_ns) {
            let _ = self.core.defs.create(list_ns.clone(), DefType::Name);
        }
        self.core.scopes.handle_assign(&current_ns, list_name.clone(), list_ns.clone());
        if self.core.scopes.get_scope(&list_ns).is_none() {
            self.core.scopes.create_scope(list_ns.clone(), Some(current_ns.clone()));
        }

        self.name_stack.push(list_name);
        for (idx, elt) in l.elts.iter().enumerate() {
            self.visit_expr(elt);
            let key_ns = join2(&list_ns, &idx.to_string());
            if !self.core.defs.contains(&key_ns) {
                let _ = self.core.defs.create(key_ns.clone(), DefType::Name);
            }
            let decoded = self.core.decode_node(&current_ns, elt);
            for d in decoded {
                match d {
                    Decoded::Def(ns) => {
                        self.core.defs.get_mut(&key_ns).unwrap().name_pointer.add(ns);
                    }
                    Decoded::Lit(lit) => {
                        self.core.defs.get_mut(&key_ns).unwrap().literal_pointer.add(lit);
                    }
                }
            }
        }
        self.name_stack.pop();
    }

    fn visit_dict(&mut self, d: &ast::ExprDict) {
        let current_ns = self.current_ns();
        let dict_name = Namespace::from(
            self.core
                .scopes
                .get_scope_mut(&current_ns)
                .map(|s| s.counters.next_dict())
                .unwrap_or_default(),
        );
        let dict_ns = join2(&current_ns, &dict_name);
        if !self.core.defs.contains(&dict_ns) {
            let _ = self.core.defs.create(dict_ns.clone(), DefType::Name);
        }
        self.core.scopes.handle_assign(&current_ns, dict_name.clone(), dict_ns.clone());
        if self.core.scopes.get_scope(&dict_ns).is_none() {
            self.core.scopes.create_scope(dict_ns.clone(), Some(current_ns.clone()));
        }

        self.name_stack.push(dict_name);
        for item in d.items.iter() {
            if let Some(key) = &item.key {
                self.visit_expr(key);
            }
            self.visit_expr(&item.value);

            let decoded_value = self.core.decode_node(&current_ns, &item.value);
            let key_names: Vec<Namespace> = match &item.key {
                Some(key) => self
                    .core
                    .decode_node(&current_ns, key)
                    .into_iter()
                    .flat_map(|k| match k {
                        Decoded::Def(ns) => self
                            .core
                            .defs
                            .get(&ns)
                            .map(|d| d.literal_pointer.values.iter().cloned().collect::<Vec<_>>())
                            .unwrap_or_default(),
                        Decoded::Lit(lit) => vec![Namespace::from(lit_as_key(lit))],
                    })
                    .collect(),
                None => Vec::new(),
            };

            for name in key_names {
                let key_ns = join2(&dict_ns, &name);
                if !self.core.defs.contains(&key_ns) {
                    let _ = self.core.defs.create(key_ns.clone(), DefType::Name);
                }
                if let Some(dict_scope) = self.core.scopes.get_scope_mut(&dict_ns) {
                    dict_scope.defs.insert(name.clone(), key_ns.clone());
                }
                for v in &decoded_value {
                    match v {
                        Decoded::Def(ns) => {
                            self.core.defs.get_mut(&key_ns).unwrap().name_pointer.add(ns.clone());
                        }
                        Decoded::Lit(lit) => {
                            self.core.defs.get_mut(&key_ns).unwrap().literal_pointer.add(*lit);
                        }
                    }
                }
            }
        }
        self.name_stack.pop();
    }
}

fn lit_as_key(lit: crate::pointer::Literal<'_>) -> String {
    match lit {
        crate::pointer::Literal::Str(s) => s.to_string(),
        crate::pointer::Literal::Int(i) => i.to_string(),
        crate::pointer::Literal::Other => crate::constants::UNKNOWN_LIT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefType as DT;

    #[test]
    fn class_def_computes_mro_through_closure() {
        let mut core = AnalysisCore::new("/pkg");
        core.scopes.create_scope(Namespace::from("m"), None);
        core.defs.create(Namespace::from("m"), DT::Mod).unwrap();
        core.defs.create(Namespace::from("m.A"), DT::Cls).unwrap();
        core.classes.create(Namespace::from("m.A"), Namespace::from("m"));
        core.recompute_closure();

        let mut post = Postprocessor::new(&mut core, Namespace::from("m"), PathBuf::from("/pkg/m.py"));
        post.visit_body(&[]);
        assert!(post.core.classes.get("m.A").is_some());
    }
}
