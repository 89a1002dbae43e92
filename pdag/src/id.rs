// id.rs — Dense identifiers for graph entities and interned symbols
//
// Nodes, edges and stages of a FunctionDAG refer to each other by index, never
// by pointer. Indices are assigned once during construction and stay fixed for
// the lifetime of the graph.

use std::collections::HashMap;
use std::fmt;

/// Index of a node in `FunctionDAG::nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index of an edge in `FunctionDAG::edges`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

/// Dense identifier of a stage across the whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A stage addressed through its owning node: stage `index` of node `node`.
/// Index 0 is the pure definition, `k + 1` is update `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageRef {
    pub node: NodeId,
    pub index: usize,
}

impl StageRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        StageRef { node, index }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}.s{}", self.node.0, self.index)
    }
}

// ── Symbol interning ─────────────────────────────────────────────────────

/// Interned variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

/// Maps names to dense `SymId`s. Interning the same string twice yields the
/// same id.
#[derive(Debug, Default)]
pub struct SymbolTable {
    ids: HashMap<String, SymId>,
    names: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> SymId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = SymId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<SymId> {
        self.ids.get(name).copied()
    }

    pub fn resolve(&self, id: SymId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut syms = SymbolTable::new();
        let a = syms.intern("x");
        let b = syms.intern("y");
        assert_ne!(a, b);
        assert_eq!(syms.intern("x"), a);
        assert_eq!(syms.len(), 2);
        assert_eq!(syms.resolve(b), "y");
        assert_eq!(syms.get("z"), None);
    }

    #[test]
    fn stage_ref_display() {
        assert_eq!(StageRef::new(NodeId(3), 1).to_string(), "n3.s1");
        assert_eq!(EdgeId(7).to_string(), "e7");
    }
}
