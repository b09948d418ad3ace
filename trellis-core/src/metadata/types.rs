//! Type Hierarchy
//!
//! Metadata registered against a node type applies to every type derived
//! from it. The hierarchy is an explicit table from each type to its parent,
//! filled in as node types are registered with a graph.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::graph::TypeTag;

/// Table of `type -> parent type`.
#[derive(Debug)]
pub struct TypeHierarchy {
    parents: RwLock<HashMap<TypeTag, Option<TypeTag>>>,
}

impl TypeHierarchy {
    /// A table knowing only the abstract `Node` and `ComputeNode` types.
    pub fn new() -> Self {
        let mut parents = HashMap::new();
        parents.insert(TypeTag::node(), None);
        parents.insert(TypeTag::new("ComputeNode"), Some(TypeTag::node()));
        Self {
            parents: RwLock::new(parents),
        }
    }

    /// Record `tag`'s parent, replacing any earlier declaration.
    pub fn declare(&self, tag: &TypeTag, base: Option<TypeTag>) {
        let base = base.filter(|b| b != tag);
        let mut parents = self.parents.write();
        if parents.get(tag) != Some(&base) {
            parents.insert(tag.clone(), base);
        }
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.parents.read().contains_key(tag)
    }

    pub fn base_of(&self, tag: &TypeTag) -> Option<TypeTag> {
        self.parents.read().get(tag).cloned().flatten()
    }

    /// `tag` followed by its ancestors, most derived first.
    pub fn lineage(&self, tag: &TypeTag) -> Vec<TypeTag> {
        let parents = self.parents.read();
        let mut seen = HashSet::new();
        let mut lineage = Vec::new();
        let mut current = Some(tag.clone());
        while let Some(tag) = current {
            if !seen.insert(tag.clone()) {
                break;
            }
            current = parents.get(&tag).cloned().flatten();
            lineage.push(tag);
        }
        lineage
    }

    /// Whether `tag` is `base` or derives from it.
    pub fn is_a(&self, tag: &TypeTag, base: &TypeTag) -> bool {
        self.lineage(tag).iter().any(|t| t == base)
    }
}

impl Default for TypeHierarchy {
    fn default() -> Self {
        Self::new()
    }
}
