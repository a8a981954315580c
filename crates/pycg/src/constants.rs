//! Synthetic name builders and namespace helpers shared across every pass.

use std::fmt::Write as _;

/// A fully-qualified, dot-separated identifier. Cheap to clone since the
/// same namespace is stored in many sets (points-to sets, scope tables, MRO
/// lists) across a single-threaded analysis run.
pub type Namespace = std::rc::Rc<str>;

pub const RETURN_NAME: &str = "<return>";
pub const SELF_NAME: &str = "self";
pub const INIT_NAME: &str = "__init__";
pub const ITER_NAME: &str = "__iter__";
pub const NEXT_NAME: &str = "__next__";
/// Synthetic module name external builtins (`len`, `open`, ...) are
/// attributed to, since they have no real source file of their own.
pub const BUILTIN_NAME: &str = "<builtin>";

/// Collapsed literal tags stored alongside real namespaces in a `NamePointer`'s
/// argument bindings, mirroring the original analysis's reserved strings.
pub const STRING_LIT: &str = "<STRING>";
pub const INTEGER_LIT: &str = "<UNKNOWN_INT>";
pub const UNKNOWN_LIT: &str = "<UNKNOWN>";

pub fn join_ns<'a>(parts: impl IntoIterator<Item = &'a str>) -> Namespace {
    let mut out = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(part);
    }
    Namespace::from(out)
}

pub fn join2(a: &str, b: &str) -> Namespace {
    let mut out = String::with_capacity(a.len() + b.len() + 1);
    out.push_str(a);
    out.push('.');
    out.push_str(b);
    Namespace::from(out)
}

pub fn return_ns(callable: &str) -> Namespace {
    join2(callable, RETURN_NAME)
}

/// Converts a source-file path relative to the package root into a module
/// name: strips the extension and replaces path separators with dots.
pub fn to_mod_name(rel_path: &str) -> String {
    let without_ext = rel_path.strip_suffix(".py").unwrap_or(rel_path);
    without_ext.replace(['/', '\\'], ".")
}

/// Per-scope counters for anonymous objects. Reset whenever a scope is
/// re-entered so repeated traversals over the same AST agree on synthetic
/// names.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonCounters {
    pub lambda: u32,
    pub dict: u32,
    pub list: u32,
    pub int: u32,
}

impl AnonCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn next_lambda(&mut self) -> String {
        let n = self.lambda;
        self.lambda += 1;
        format!("<lambda{n}>")
    }

    pub fn next_dict(&mut self) -> String {
        let n = self.dict;
        self.dict += 1;
        format!("<dict{n}>")
    }

    pub fn next_list(&mut self) -> String {
        let n = self.list;
        self.list += 1;
        format!("<list{n}>")
    }

    pub fn next_int(&mut self) -> String {
        let n = self.int;
        self.int += 1;
        format!("<int{n}>")
    }
}

/// Builds a `<prefix>.<idx>` style positional-argument key when no parameter
/// name is known at a call site.
pub fn positional_key(idx: usize) -> String {
    let mut s = String::new();
    let _ = write!(s, "{idx}");
    s
}
