// scope.rs — Layered name bindings
//
// A scope maps names to a stack of values (inner bindings shadow outer ones)
// and may defer misses to a containing scope.

use std::collections::HashMap;

#[derive(Debug)]
pub struct Scope<'p, T> {
    table: HashMap<String, Vec<T>>,
    parent: Option<&'p Scope<'p, T>>,
}

impl<T> Default for Scope<'_, T> {
    fn default() -> Self {
        Scope {
            table: HashMap::new(),
            parent: None,
        }
    }
}

impl<'p, T> Scope<'p, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty scope that falls back to `parent` on lookup misses.
    pub fn with_parent(parent: &'p Scope<'p, T>) -> Self {
        Scope {
            table: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: T) {
        self.table.entry(name.into()).or_default().push(value);
    }

    /// Remove the innermost binding of `name` in this layer.
    pub fn pop(&mut self, name: &str) -> Option<T> {
        let stack = self.table.get_mut(name)?;
        let v = stack.pop();
        if stack.is_empty() {
            self.table.remove(name);
        }
        v
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        match self.table.get(name).and_then(|s| s.last()) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.get(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}
