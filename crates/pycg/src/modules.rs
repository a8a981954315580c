//! Internal vs. external module registry, with per-callable line ranges
//! used by the call-graph emitter's node metadata.

use ahash::AHashMap;

use crate::constants::Namespace;

#[derive(Debug, Clone, Copy, Default)]
pub struct LineRange {
    pub first: Option<u32>,
    pub last: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: Namespace,
    pub filename: Option<String>,
    pub methods: AHashMap<Namespace, LineRange>,
}

impl Module {
    fn new(name: Namespace, filename: Option<String>) -> Self {
        Self {
            name,
            filename,
            methods: AHashMap::default(),
        }
    }

    /// First write wins: a method's recorded range is fixed at first
    /// declaration, matching the source's `if not methods.get(method)` guard.
    pub fn add_method(&mut self, method: Namespace, first: Option<u32>, last: Option<u32>) {
        self.methods.entry(method).or_insert(LineRange { first, last });
    }
}

#[derive(Debug, Default)]
pub struct ModuleTable {
    internal: AHashMap<Namespace, Module>,
    external: AHashMap<Namespace, Module>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: Namespace, filename: Option<String>, external: bool) -> &mut Module {
        let table = if external { &mut self.external } else { &mut self.internal };
        table.entry(name.clone()).or_insert_with(|| Module::new(name, filename))
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.internal.get(name).or_else(|| self.external.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Module> {
        if self.internal.contains_key(name) {
            self.internal.get_mut(name)
        } else {
            self.external.get_mut(name)
        }
    }

    pub fn is_internal(&self, name: &str) -> bool {
        self.internal.contains_key(name)
    }

    pub fn internal_modules(&self) -> &AHashMap<Namespace, Module> {
        &self.internal
    }

    pub fn external_modules(&self) -> &AHashMap<Namespace, Module> {
        &self.external
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_method_keeps_first_recorded_range() {
        let mut m = Module::new(Namespace::from("pkg.mod"), None);
        m.add_method(Namespace::from("pkg.mod.f"), Some(1), Some(5));
        m.add_method(Namespace::from("pkg.mod.f"), Some(10), Some(20));
        let range = m.methods[&Namespace::from("pkg.mod.f")];
        assert_eq!(range.first, Some(1));
    }

    #[test]
    fn create_external_does_not_shadow_internal_lookup() {
        let mut table = ModuleTable::new();
        table.create(Namespace::from("pkg.mod"), Some("pkg/mod.py".into()), false);
        table.create(Namespace::from("os"), None, true);
        assert!(table.is_internal("pkg.mod"));
        assert!(!table.is_internal("os"));
        assert!(table.get("os").is_some());
    }
}
