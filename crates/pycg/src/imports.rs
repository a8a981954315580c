//! Import graph and module-file resolution.
//!
//! The original analysis resolves imports by installing a custom
//! `sys.path_hooks` loader backed by the host interpreter's import
//! machinery. There is no analogue to a pluggable module loader here, so
//! resolution is done directly against the filesystem: a relative/absolute
//! module name is turned into up to four candidate `(module, package)`
//! pairs (mirroring the original's candidate order) and the first one whose
//! `<candidate>.py` or `<candidate>/__init__.py` exists under the package
//! root wins.

use std::path::{Path, PathBuf};

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::constants::{Namespace, to_mod_name};

/// A handful of stdlib roots the analysis treats as opaque built-ins: an
/// import of these creates an edge with no further resolution, matching the
/// original's `sys.builtin_module_names` short-circuit.
const BUILTIN_MODULE_NAMES: &[&str] = &["sys", "builtins", "_thread", "_io", "_warnings", "marshal", "posix"];

#[derive(Debug, Clone, Default)]
pub struct ImportNode {
    pub filename: Option<PathBuf>,
    pub imports: AHashSet<Namespace>,
}

#[derive(Debug, Default)]
pub struct ImportResolver {
    graph: IndexMap<Namespace, ImportNode>,
    current_module: Namespace,
    current_file: PathBuf,
    package_root: PathBuf,
}

/// RAII guard restoring the resolver's "current module" context on drop,
/// including on early return or a propagated error — the scoped-activation
/// replacement for the original's path-hook install/remove pair, which this
/// analysis never needs since it reads files directly rather than asking a
/// running interpreter to execute them.
pub struct CurrentModuleGuard<'a> {
    resolver: &'a mut ImportResolver,
    saved_module: Namespace,
    saved_file: PathBuf,
}

impl Drop for CurrentModuleGuard<'_> {
    fn drop(&mut self) {
        self.resolver.current_module = std::mem::take(&mut self.saved_module);
        self.resolver.current_file = std::mem::take(&mut self.saved_file);
    }
}

impl ImportResolver {
    pub fn new(package_root: impl Into<PathBuf>) -> Self {
        Self {
            graph: IndexMap::new(),
            current_module: Namespace::from(""),
            current_file: PathBuf::new(),
            package_root: package_root.into(),
        }
    }

    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    pub fn create_node(&mut self, name: Namespace) {
        self.graph.entry(name).or_default();
    }

    pub fn get_node(&self, name: &str) -> Option<&ImportNode> {
        self.graph.get(name)
    }

    pub fn create_edge(&mut self, dest: Namespace) {
        let current = self.current_module.clone();
        if let Some(node) = self.graph.get_mut(&current) {
            node.imports.insert(dest);
        }
    }

    pub fn set_filepath(&mut self, node_name: &str, filename: PathBuf) {
        if let Some(node) = self.graph.get_mut(node_name) {
            node.filename = Some(filename);
        }
    }

    pub fn get_imports(&self, modname: &str) -> AHashSet<Namespace> {
        self.graph.get(modname).map(|n| n.imports.clone()).unwrap_or_default()
    }

    /// Scopes `current_module`/`current_file` to the duration of the
    /// returned guard; restored (even on panic-unwind) when it drops.
    pub fn enter_module(&mut self, name: Namespace, file: PathBuf) -> CurrentModuleGuard<'_> {
        let saved_module = std::mem::replace(&mut self.current_module, name);
        let saved_file = std::mem::replace(&mut self.current_file, file);
        CurrentModuleGuard {
            resolver: self,
            saved_module,
            saved_file,
        }
    }

    fn is_init_file(&self) -> bool {
        self.current_file
            .file_name()
            .and_then(|f| f.to_str())
            .is_some_and(|f| f == "__init__.py")
    }

    /// Strips `level` leading components from the current module's package
    /// path to compute the relative-import's effective package, with the
    /// off-by-one adjustment applied when the current source file is itself
    /// a package initializer at level >= 1.
    fn handle_import_level(&self, name: &str, level: u32) -> Result<(String, String), &'static str> {
        let mut package: Vec<&str> = self.current_module.split('.').collect();
        if level as usize > package.len() {
            return Err("attempting import beyond top level package");
        }

        let mod_name = format!("{}{}", ".".repeat(level as usize), name);

        if self.is_init_file() && level >= 1 {
            let mut level = level;
            if level != 1 {
                level -= 1;
                let new_len = package.len().saturating_sub(level as usize);
                package.truncate(new_len);
            }
        } else {
            let new_len = package.len().saturating_sub(level as usize);
            package.truncate(new_len);
        }

        Ok((mod_name, package.join(".")))
    }

    fn module_file(&self, module: &str) -> Option<(PathBuf, bool)> {
        if module.is_empty() {
            return None;
        }
        let rel = module.replace('.', "/");
        let as_file = self.package_root.join(format!("{rel}.py"));
        if as_file.is_file() {
            return Some((as_file, false));
        }
        let as_pkg = self.package_root.join(&rel).join("__init__.py");
        if as_pkg.is_file() {
            return Some((as_pkg, true));
        }
        None
    }

    /// Resolves `name` (imported at relative `level`, `0` for absolute) to
    /// an internal module name plus its file, or `None` if unresolved — the
    /// caller degrades to an external definition rather than treating this
    /// as fatal.
    pub fn handle_import(&mut self, name: &str, level: u32) -> Option<ResolvedImport> {
        let root = name.split('.').next().unwrap_or(name);
        if BUILTIN_MODULE_NAMES.contains(&root) {
            self.create_edge(Namespace::from(root));
            return None;
        }

        let (mod_name, package) = self.handle_import_level(name, level).ok()?;
        let mod_name = mod_name.trim_start_matches('.').to_string();
        let parent: String = {
            let mut parts: Vec<&str> = mod_name.split('.').collect();
            parts.pop();
            parts.join(".")
        };
        let parent_name: String = {
            let mut parts: Vec<&str> = name.split('.').collect();
            parts.pop();
            parts.join(".")
        };

        let join = |pkg: &str, n: &str| -> String {
            if pkg.is_empty() {
                n.to_string()
            } else if n.is_empty() {
                pkg.to_string()
            } else {
                format!("{pkg}.{n}")
            }
        };

        let candidates = [
            if mod_name.is_empty() { package.clone() } else { mod_name.clone() },
            parent.clone(),
            join(&package, name),
            join(&package, &parent_name),
        ];

        for candidate in &candidates {
            if let Some((file, is_pkg)) = self.module_file(candidate) {
                let resolved_name = to_mod_name(
                    file.strip_prefix(&self.package_root)
                        .unwrap_or(&file)
                        .to_string_lossy()
                        .trim_end_matches("/__init__.py")
                        .trim_end_matches("__init__.py"),
                );
                let _ = is_pkg;
                return Some(ResolvedImport {
                    module_name: Namespace::from(resolved_name),
                    file,
                });
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub module_name: Namespace,
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_module_short_circuits_without_file_lookup() {
        let mut resolver = ImportResolver::new("/nonexistent");
        resolver.create_node(Namespace::from("pkg.mod"));
        let _guard = resolver.enter_module(Namespace::from("pkg.mod"), PathBuf::from("pkg/mod.py"));
        assert!(resolver.handle_import("sys", 0).is_none());
    }

    #[test]
    fn guard_restores_current_module_on_drop() {
        let mut resolver = ImportResolver::new("/root");
        resolver.current_module = Namespace::from("outer");
        {
            let _guard = resolver.enter_module(Namespace::from("inner"), PathBuf::from("inner.py"));
        }
        assert_eq!(resolver.current_module.as_ref(), "outer");
    }

    #[test]
    fn level_stripping_drops_trailing_components() {
        let mut resolver = ImportResolver::new("/root");
        resolver.current_module = Namespace::from("pkg.sub.mod");
        resolver.current_file = PathBuf::from("pkg/sub/mod.py");
        let (mod_name, package) = resolver.handle_import_level("sibling", 1).unwrap();
        assert_eq!(mod_name, ".sibling");
        assert_eq!(package, "pkg.sub");
    }
}
