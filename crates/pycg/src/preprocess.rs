//! First pass: walks every reachable module, creating definitions, scopes
//! and raw class inheritance, and propagating the easy (non-fixed-point)
//! points-to facts — name assignment, returns, call-argument binding against
//! already-known callees. No closure is available yet, so anything needing
//! it (attribute/subscript resolution) is deferred to postprocessing.

use std::path::PathBuf;

use ruff_python_ast::{self as ast, Expr as AstExpr, Stmt};
use ruff_python_parser::parse_module;

use crate::{
    constants::{Namespace, join2},
    definitions::DefType,
    error::{ParseError, PycgError},
    shared::{AnalysisCore, Decoded},
};

pub struct Preprocessor<'a> {
    core: &'a mut AnalysisCore,
    name_stack: Vec<Namespace>,
    modname: Namespace,
    filename: PathBuf,
    mod_dir: PathBuf,
}

impl<'a> Preprocessor<'a> {
    pub fn new(core: &'a mut AnalysisCore, modname: Namespace, filename: PathBuf) -> Self {
        let mod_dir = filename.parent().map(PathBuf::from).unwrap_or_default();
        Self {
            core,
            name_stack: vec![modname.clone()],
            modname,
            filename,
            mod_dir,
        }
    }

    fn current_ns(&self) -> Namespace {
        Namespace::from(self.name_stack.join("."))
    }

    /// Parses and walks this module, recursively preprocessing any
    /// not-yet-analyzed internal modules it imports.
    pub fn analyze(&mut self) -> Result<(), PycgError> {
        self.core.modules_analyzed.insert(self.modname.clone());

        if self.core.imports.get_node(&self.modname).is_none() {
            self.core.imports.create_node(self.modname.clone());
            self.core.imports.set_filepath(&self.modname, self.filename.clone());
        }

        let source = std::fs::read_to_string(&self.filename).unwrap_or_default();
        let parsed = parse_module(&source).map_err(|e| {
            PycgError::from(ParseError {
                filename: self.filename.display().to_string(),
                msg: e.to_string(),
            })
        });

        let body = match parsed {
            Ok(parsed) => parsed.into_syntax().body,
            Err(_) => return Ok(()),
        };

        self.visit_module(&source, &body);
        Ok(())
    }

    fn visit_module(&mut self, source: &str, body: &[Stmt]) {
        let _guard = self.core.imports.enter_module(self.modname.clone(), self.filename.clone());

        let filename_str = self.filename.display().to_string();
        if self.core.modules.get(&self.modname).is_none() {
            self.core.modules.create(self.modname.clone(), Some(filename_str), false);
        }
        let last = source.lines().count() as u32;
        let first = if last == 0 { 0 } else { 1 };
        if let Some(module) = self.core.modules.get_mut(&self.modname) {
            module.add_method(self.modname.clone(), Some(first), Some(last));
        }

        let is_new_scope = self.core.scopes.get_scope(&self.modname).is_none();
        if is_new_scope {
            self.core.scopes.create_scope(self.modname.clone(), None);
            self.prescan_defs(&self.modname.clone(), body);
        }

        if !self.core.defs.contains(&self.modname) {
            let _ = self.core.defs.create(self.modname.clone(), DefType::Mod);
        }

        self.core.scopes.reset_scope_counters(&self.modname);
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    /// Creates definitions (and nested scopes) for every function/class in
    /// `stmts` before any body is walked, so sibling definitions can
    /// forward-reference each other regardless of source order.
    fn prescan_defs(&mut self, parent_ns: &Namespace, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::FunctionDef(f) => {
                    let short = Namespace::from(f.name.id());
                    let full_ns = self.core.defs.handle_function_def(parent_ns, &short);
                    self.core.scopes.handle_assign(parent_ns, short, full_ns.clone());
                    if self.core.scopes.get_scope(&full_ns).is_none() {
                        self.core.scopes.create_scope(full_ns.clone(), Some(parent_ns.clone()));
                    }
                    self.prescan_defs(&full_ns, &f.body);
                }
                Stmt::ClassDef(c) => {
                    let short = Namespace::from(c.name.id());
                    let full_ns = self.core.defs.handle_class_def(parent_ns, &short);
                    self.core.scopes.handle_assign(parent_ns, short, full_ns.clone());
                    if self.core.scopes.get_scope(&full_ns).is_none() {
                        self.core.scopes.create_scope(full_ns.clone(), Some(parent_ns.clone()));
                    }
                    if !self.core.classes.contains(&full_ns) {
                        self.core.classes.create(full_ns.clone(), self.modname.clone());
                        if let Some(arguments) = &c.arguments {
                            for base in arguments.args.iter() {
                                if let AstExpr::Name(ast::ExprName { id, .. }) = base {
                                    self.core.classes.add_inheritance(full_ns.clone(), Namespace::from(id.as_str()));
                                }
                            }
                        }
                    }
                    self.prescan_defs(&full_ns, &c.body);
                }
                Stmt::If(s) => {
                    self.prescan_defs(parent_ns, &s.body);
                    for clause in &s.elif_else_clauses {
                        self.prescan_defs(parent_ns, &clause.body);
                    }
                }
                Stmt::While(s) => {
                    self.prescan_defs(parent_ns, &s.body);
                    self.prescan_defs(parent_ns, &s.orelse);
                }
                Stmt::For(s) => {
                    self.prescan_defs(parent_ns, &s.body);
                    self.prescan_defs(parent_ns, &s.orelse);
                }
                Stmt::With(s) => self.prescan_defs(parent_ns, &s.body),
                Stmt::Try(s) => {
                    self.prescan_defs(parent_ns, &s.body);
                    for h in &s.handlers {
                        let ast::ExceptHandler::ExceptHandler(h) = h;
                        self.prescan_defs(parent_ns, &h.body);
                    }
                    self.prescan_defs(parent_ns, &s.orelse);
                    self.prescan_defs(parent_ns, &s.finalbody);
                }
                _ => {}
            }
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
            Stmt::Import(ast::StmtImport { names, .. }) => self.visit_import(names, "", 0),
            Stmt::ImportFrom(ast::StmtImportFrom { module, names, level, .. }) => {
                let prefix = module.as_ref().map(ruff_python_ast::Identifier::id).unwrap_or("");
                self.visit_import(names, prefix, *level);
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
        let fn_name = Namespace::from(f.name.id());
        self.handle_function_def(f, &fn_name);

        self.name_stack.push(fn_name);
        if let Some(scope_ns) = Some(self.current_ns()) {
            self.core.scopes.reset_scope_counters(&scope_ns);
        }
        self.visit_body(&f.body);
        self.name_stack.pop();
    }

    /// Creates the function definition's parameter bindings: implicit
    /// `self` on instance methods, positional/keyword-only args, defaults.
    fn handle_function_def(&mut self, f: &ast::StmtFunctionDef, fn_name: &str) {
        let parent_ns = self.current_ns();
        let current_def_is_class = self.core.defs.get(&parent_ns).is_some_and(|d| d.is_class_def());

        let fn_def_ns = self.core.defs.handle_function_def(&parent_ns, fn_name);

        let mod_name = self.modname.clone();
        if self.core.modules.get(&mod_name).is_none() {
            let filename_str = self.filename.display().to_string();
            self.core.modules.create(mod_name.clone(), Some(filename_str), false);
        }
        let last_line = last_line_of(&f.body, f.range);
        if let Some(module) = self.core.modules.get_mut(&mod_name) {
            module.add_method(fn_def_ns.clone(), Some(line_of(f.range)), Some(last_line));
        }

        let is_static = f
            .decorator_list
            .iter()
            .any(|d| matches!(&d.expression, AstExpr::Name(ast::ExprName{id, ..}) if id.as_str() == "staticmethod"));

        let params = &f.parameters;
        let mut pos_params: Vec<&ast::ParameterWithDefault> = params.posonlyargs.iter().chain(params.args.iter()).collect();

        if current_def_is_class && !is_static && !pos_params.is_empty() {
            let self_param = pos_params.remove(0);
            let arg_name = self_param.parameter.name.id.as_str();
            let arg_ns = join2(&fn_def_ns, arg_name);
            if !self.core.defs.contains(&arg_ns) {
                let _ = self.core.defs.create(arg_ns.clone(), DefType::Name);
            }
            self.core.defs.get_mut(&arg_ns).unwrap().name_pointer.add(parent_ns.clone());
            self.core.scopes.handle_assign(&fn_def_ns, Namespace::from(arg_name), arg_ns);
        }

        let name_ptr_defaults: Vec<(usize, Vec<Decoded>)> = pos_params
            .iter()
            .enumerate()
            .filter_map(|(pos, p)| p.default.as_deref().map(|d| (pos, self.core.decode_node(&parent_ns, d))))
            .collect();

        for (pos, p) in pos_params.iter().enumerate() {
            let arg_name = p.parameter.name.id.as_str();
            let arg_ns = join2(&fn_def_ns, arg_name);
            if let Some(defi) = self.core.defs.get_mut(&fn_def_ns) {
                defi.name_pointer.add_pos_arg(pos as u32, Some(Namespace::from(arg_name)), [arg_ns.clone()]);
            }
            if !self.core.defs.contains(&arg_ns) {
                let _ = self.core.defs.create(arg_ns.clone(), DefType::Name);
            }
            self.core.scopes.handle_assign(&fn_def_ns, Namespace::from(arg_name), arg_ns.clone());
            if let Some((_, decoded)) = name_ptr_defaults.iter().find(|(p2, _)| *p2 == pos) {
                self.apply_default(&arg_ns, decoded);
            }
        }

        for p in params.kwonlyargs.iter() {
            let arg_name = p.parameter.name.id.as_str();
            let arg_ns = join2(&fn_def_ns, arg_name);
            if let Some(defi) = self.core.defs.get_mut(&fn_def_ns) {
                defi.name_pointer.add_arg(Namespace::from(arg_name), [arg_ns.clone()]);
            }
            if !self.core.defs.contains(&arg_ns) {
                let _ = self.core.defs.create(arg_ns.clone(), DefType::Name);
            }
            self.core.scopes.handle_assign(&fn_def_ns, Namespace::from(arg_name), arg_ns.clone());
            if let Some(default) = &p.default {
                let decoded = self.core.decode_node(&parent_ns, default);
                self.apply_default(&arg_ns, &decoded);
            }
        }
    }

    fn apply_default(&mut self, arg_ns: &str, decoded: &[Decoded]) {
        for d in decoded {
            match d {
                Decoded::Def(ns) => {
                    if let Some(arg_def) = self.core.defs.get_mut(arg_ns) {
                        arg_def.name_pointer.add(ns.clone());
                    }
                }
                Decoded::Lit(lit) => {
                    if let Some(arg_def) = self.core.defs.get_mut(arg_ns) {
                        arg_def.literal_pointer.add(*lit);
                    }
                }
            }
        }
    }

    fn visit_class_def(&mut self, c: &ast::StmtClassDef) {
        let parent_ns = self.current_ns();
        let cls_name = Namespace::from(c.name.id());
        let cls_ns = self.core.defs.handle_class_def(&parent_ns, &cls_name);

        let mod_name = self.modname.clone();
        if self.core.modules.get(&mod_name).is_none() {
            let filename_str = self.filename.display().to_string();
            self.core.modules.create(mod_name.clone(), Some(filename_str), false);
        }
        let last_line = last_line_of(&c.body, c.range);
        if let Some(module) = self.core.modules.get_mut(&mod_name) {
            module.add_method(cls_ns.clone(), Some(line_of(c.range)), Some(last_line));
        }

        if !self.core.classes.contains(&cls_ns) {
            self.core.classes.create(cls_ns.clone(), self.modname.clone());
            if let Some(arguments) = &c.arguments {
                for base in arguments.args.iter() {
                    if let AstExpr::Name(ast::ExprName { id, .. }) = base {
                        self.core.classes.add_inheritance(cls_ns.clone(), Namespace::from(id.as_str()));
                    }
                }
            }
        }

        self.name_stack.push(cls_name);
        self.core.scopes.reset_scope_counters(&self.current_ns());
        self.visit_body(&c.body);
        self.name_stack.pop();
    }

    fn visit_for(&mut self, f: &ast::StmtFor) {
        if let AstExpr::Name(ast::ExprName { id, .. }) = f.target.as_ref() {
            let current_ns = self.current_ns();
            let target_ns = join2(&current_ns, id.as_str());
            if !self.core.defs.contains(&target_ns) {
                let _ = self.core.defs.create(target_ns.clone(), DefType::Name);
                self.core.scopes.handle_assign(&current_ns, Namespace::from(id.as_str()), target_ns);
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
        for target_ns in self.target_namespaces(&current_ns, target) {
            self.core.handle_assign(&target_ns, decoded);
        }
    }

    fn target_namespaces(&mut self, current_ns: &str, target: &AstExpr) -> Vec<Namespace> {
        match target {
            AstExpr::Name(ast::ExprName { id, .. }) => vec![join2(current_ns, id.as_str())],
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => self
                .core
                .retrieve_parent_names(current_ns, value)
                .into_iter()
                .map(|base| join2(&base, attr.id()))
                .collect(),
            AstExpr::Subscript(sub) => self.core.retrieve_subscript_names(current_ns, sub).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn visit_import(&mut self, names: &[ast::Alias], prefix: &str, level: u32) {
        for alias in names {
            let src_name = if prefix.is_empty() {
                alias.name.id().to_string()
            } else {
                format!("{prefix}.{}", alias.name.id())
            };
            let tgt_name = alias
                .asname
                .as_ref()
                .map(ruff_python_ast::Identifier::id)
                .unwrap_or_else(|| alias.name.id())
                .to_string();

            let resolved = self.core.imports.handle_import(&src_name, level);
            let Some(resolved) = resolved else {
                self.add_external_def(&src_name, &tgt_name);
                continue;
            };

            let under_package = resolved.file.starts_with(self.core.imports.package_root());
            if under_package {
                if !self.core.modules_analyzed.contains(&resolved.module_name) {
                    self.analyze_submodule(resolved.module_name.clone(), resolved.file.clone());
                }
                self.handle_scopes(&alias.name.id().to_string(), &tgt_name, &resolved.module_name);
            } else {
                self.add_external_def(&src_name, &tgt_name);
            }
        }
    }

    fn add_external_def(&mut self, name: &str, target: &str) {
        if !self.core.defs.contains(name) {
            let _ = self.core.defs.create(Namespace::from(name), DefType::Ext);
        }
        if target == "*" {
            return;
        }
        let current_ns = self.current_ns();
        let tgt_ns = join2(&current_ns, target);
        if !self.core.defs.contains(&tgt_ns) {
            let _ = self.core.defs.create(tgt_ns.clone(), DefType::Ext);
        }
        let name_ns = Namespace::from(name);
        self.core.defs.get_mut(&tgt_ns).unwrap().name_pointer.add(name_ns);
        self.core.scopes.handle_assign(&current_ns, Namespace::from(target), tgt_ns);
    }

    fn handle_scopes(&mut self, imp_name: &str, tgt_name: &str, modname: &str) {
        let current_ns = self.current_ns();
        let Some(imported_defs): Option<Vec<(Namespace, Namespace)>> = self
            .core
            .scopes
            .get_scope(modname)
            .map(|s| s.defs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        else {
            return;
        };

        if tgt_name == "*" {
            for (name, defi_ns) in imported_defs {
                self.create_import_alias(&current_ns, &name, &defi_ns);
            }
            return;
        }

        let found = imported_defs.into_iter().find(|(n, _)| n.as_ref() == imp_name);
        let defi_ns = match found {
            Some((_, ns)) => Some(ns),
            None if self.core.defs.contains(imp_name) => Some(Namespace::from(imp_name)),
            None => None,
        };
        if let Some(defi_ns) = defi_ns {
            self.create_import_alias(&current_ns, tgt_name, &defi_ns);
        }
    }

    fn create_import_alias(&mut self, current_ns: &str, name: &str, src_ns: &Namespace) {
        if self.core.scopes.get_def(current_ns, name).is_some() {
            return;
        }
        let Some(src_def) = self.core.defs.get(src_ns).cloned() else { return };
        let def_ns = join2(current_ns, name);
        if !self.core.defs.contains(&def_ns) {
            self.core.defs.assign(def_ns.clone(), &src_def);
        }
        self.core.defs.get_mut(&def_ns).unwrap().name_pointer.add(src_ns.clone());
        self.core.scopes.handle_assign(current_ns, Namespace::from(name), def_ns);
    }

    fn analyze_submodule(&mut self, modname: Namespace, file: PathBuf) {
        if self.core.modules_analyzed.contains(&modname) {
            return;
        }
        let mut sub = Preprocessor::new(self.core, modname, file);
        let _ = sub.analyze();
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

        let AstExpr::Name(ast::ExprName { id, .. }) = call.func.as_ref() else {
            return;
        };
        let current_ns = self.current_ns();
        let Some(defi_ns) = self.core.scopes.get_def(&current_ns, id.as_str()).cloned() else {
            return;
        };

        let callee_ns = if self.core.defs.get(&defi_ns).is_some_and(|d| d.is_class_def()) {
            join2(&defi_ns, crate::constants::INIT_NAME)
        } else {
            defi_ns
        };
        if !self.core.defs.contains(&callee_ns) {
            return;
        }
        self.core.iterate_call_args(&current_ns, &callee_ns, call);
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

        if self.core.scopes.get_scope(&lambda_ns).is_none() {
            self.core.scopes.create_scope(lambda_ns.clone(), Some(current_ns.clone()));
        }

        if let Some(params) = &l.parameters {
            let fn_ns = self.core.defs.handle_function_def(&current_ns, &lambda_name);
            for (pos, p) in params.posonlyargs.iter().chain(params.args.iter()).enumerate() {
                let arg_name = p.parameter.name.id.as_str();
                let arg_ns = join2(&fn_ns, arg_name);
                if let Some(defi) = self.core.defs.get_mut(&fn_ns) {
                    defi.name_pointer.add_pos_arg(pos as u32, Some(Namespace::from(arg_name)), [arg_ns.clone()]);
                }
                if !self.core.defs.contains(&arg_ns) {
                    let _ = self.core.defs.create(arg_ns.clone(), DefType::Name);
                }
                self.core.scopes.handle_assign(&fn_ns, Namespace::from(arg_name), arg_ns);
            }
        } else {
            self.core.defs.handle_function_def(&current_ns, &lambda_name);
        }

        self.core.scopes.handle_assign(&current_ns, lambda_name.clone(), join2(&current_ns, &lambda_name));

        self.name_stack.push(lambda_name);
        self.visit_expr(&l.body);
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
            self.core.scopes.create_scope(dict_ns, Some(current_ns.clone()));
        }

        self.name_stack.push(dict_name);
        for item in d.items.iter() {
            if let Some(key) = &item.key {
                self.visit_expr(key);
            }
            self.visit_expr(&item.value);
        }
        self.name_stack.pop();
    }

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
            self.core.scopes.create_scope(list_ns, Some(current_ns.clone()));
        }

        self.name_stack.push(list_name);
        for elt in l.elts.iter() {
            self.visit_expr(elt);
        }
        self.name_stack.pop();
    }
}

fn line_of(range: ruff_text_size::TextRange) -> u32 {
    u32::from(range.start())
}

fn last_line_of(body: &[Stmt], range: ruff_text_size::TextRange) -> u32 {
    body.last().map(|s| u32::from(stmt_range(s).end())).unwrap_or_else(|| u32::from(range.end()))
}

fn stmt_range(stmt: &Stmt) -> ruff_text_size::TextRange {
    ruff_python_ast::Ranged::range(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_module_creates_module_definition() {
        let mut core = AnalysisCore::new("/pkg");
        let modname = Namespace::from("m");
        let mut pre = Preprocessor::new(&mut core, modname.clone(), PathBuf::from("/pkg/m.py"));
        pre.visit_module("x = 1\n", &[]);
        assert!(core.defs.contains("m"));
        assert!(core.scopes.get_scope("m").is_some());
    }

    #[test]
    fn assignment_binds_name_into_scope() {
        let mut core = AnalysisCore::new("/pkg");
        let modname = Namespace::from("m");
        let mut pre = Preprocessor::new(&mut core, modname.clone(), PathBuf::from("/pkg/m.py"));
        pre.visit_module("", &[]);
        let value = AstExpr::NumberLiteral(ast::ExprNumberLiteral {
            value: ruff_python_ast::Number::Int(ruff_python_ast::Int::from(1u8)),
            range: ruff_text_size::TextRange::default(),
            node_index: ruff_python_ast::AtomicNodeIndex::default(),
        });
        let target = AstExpr::Name(ast::ExprName {
            id: ruff_python_ast::name::Name::new("x"),
            range: ruff_text_size::TextRange::default(),
            ctx: ruff_python_ast::ExprContext::Store,
            node_index: ruff_python_ast::AtomicNodeIndex::default(),
        });
        pre.visit_assign(&value, std::slice::from_ref(&target));
        assert!(core.defs.contains("m.x"));
    }
}
