//! Hierarchical metadata tree contributed to by stages.
//!
//! Nodes are stored in a flat `Vec` indexed by `MetaId`, with
//! first_child / next_sibling links and a full-path index. Paths use `:`
//! as the separator because stage and dimension names already contain dots:
//!
//! ```text
//! filters.stats
//! +-- filters.stats:description         = "Statistics Filter"
//! +-- filters.stats:readers.faux.X
//!     +-- filters.stats:readers.faux.X:count    = "1000"
//!     +-- filters.stats:readers.faux.X:minimum  = "1.0000000000"
//! ```
//!
//! The tree only grows. There is no removal, and a value once set is never
//! replaced.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::MetaId;
use std::collections::HashMap;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = ':';

/// Decimal places used for floating-point values.
pub const DEFAULT_METADATA_PRECISION: usize = 10;

/// Conversion of a value into its stored string form.
///
/// Floats use a fixed number of decimals so that equal values always
/// render identically.
pub trait MetadataValue {
    fn to_metadata(&self) -> String;
}

impl MetadataValue for f64 {
    fn to_metadata(&self) -> String {
        format!("{:.*}", DEFAULT_METADATA_PRECISION, self)
    }
}

impl MetadataValue for f32 {
    fn to_metadata(&self) -> String {
        (*self as f64).to_metadata()
    }
}

macro_rules! impl_display_metadata {
    ($($t:ty),*) => {
        $(impl MetadataValue for $t {
            fn to_metadata(&self) -> String {
                self.to_string()
            }
        })*
    };
}

impl_display_metadata!(u8, u16, u32, u64, usize, i8, i16, i32, i64, bool, str, String);

impl<T: MetadataValue + ?Sized> MetadataValue for &T {
    fn to_metadata(&self) -> String {
        (**self).to_metadata()
    }
}

/// A single node in the metadata tree.
#[derive(Debug, Clone)]
pub struct MetadataNode {
    pub id: MetaId,
    /// Last path segment.
    pub name: String,
    /// Full path from the root, e.g. `"filters.stats:readers.faux.X:count"`.
    pub path: String,
    /// Stored value; empty for pure branch nodes.
    pub value: String,
    pub parent: MetaId,
    first_child: MetaId,
    next_sibling: MetaId,
}

/// Flat-storage metadata tree.
#[derive(Debug)]
pub struct MetadataTree {
    nodes: Vec<MetadataNode>,
    path_index: HashMap<String, MetaId>,
}

impl Default for MetadataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataTree {
    pub fn new() -> Self {
        let root = MetadataNode {
            id: MetaId::ROOT,
            name: String::new(),
            path: String::new(),
            value: String::new(),
            parent: MetaId::INVALID,
            first_child: MetaId::INVALID,
            next_sibling: MetaId::INVALID,
        };
        Self {
            nodes: vec![root],
            path_index: HashMap::new(),
        }
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> &MetadataNode {
        &self.nodes[MetaId::ROOT.index()]
    }

    /// Set the value at `path`, creating intermediate nodes as needed.
    ///
    /// Fails with `MetadataExists` if `path` already holds a value. Branch
    /// nodes created as intermediates have no value and may still be set.
    pub fn add_child(&mut self, path: &str, value: impl MetadataValue) -> PipelineResult<MetaId> {
        if let Some(existing) = self.find_child(path) {
            if !existing.value.is_empty() {
                return Err(PipelineError::MetadataExists {
                    path: path.to_string(),
                });
            }
        }
        let mut current = MetaId::ROOT;
        for segment in path.split(PATH_SEPARATOR) {
            current = self.child_or_insert(current, segment);
        }
        self.nodes[current.index()].value = value.to_metadata();
        Ok(current)
    }

    fn child_or_insert(&mut self, parent: MetaId, segment: &str) -> MetaId {
        let parent_path = &self.nodes[parent.index()].path;
        let path = if parent == MetaId::ROOT {
            segment.to_string()
        } else {
            format!("{}{}{}", parent_path, PATH_SEPARATOR, segment)
        };
        if let Some(&id) = self.path_index.get(&path) {
            return id;
        }

        let id = MetaId(self.nodes.len() as u32);
        self.nodes.push(MetadataNode {
            id,
            name: segment.to_string(),
            path: path.clone(),
            value: String::new(),
            parent,
            first_child: MetaId::INVALID,
            next_sibling: MetaId::INVALID,
        });
        self.path_index.insert(path, id);

        // Append to the end of the parent's child list to keep insertion order
        let first = self.nodes[parent.index()].first_child;
        if !first.is_valid() {
            self.nodes[parent.index()].first_child = id;
        } else {
            let mut cur = first;
            loop {
                let next = self.nodes[cur.index()].next_sibling;
                if !next.is_valid() {
                    self.nodes[cur.index()].next_sibling = id;
                    break;
                }
                cur = next;
            }
        }
        id
    }

    /// Look up a node by full path.
    pub fn find_child(&self, path: &str) -> Option<&MetadataNode> {
        self.path_index
            .get(path)
            .map(|&id| &self.nodes[id.index()])
    }

    /// Shorthand for `find_child(path).map(|n| n.value.as_str())`.
    pub fn value(&self, path: &str) -> Option<&str> {
        self.find_child(path).map(|n| n.value.as_str())
    }

    #[inline]
    pub fn get(&self, id: MetaId) -> Option<&MetadataNode> {
        if id.is_valid() {
            self.nodes.get(id.index())
        } else {
            None
        }
    }

    /// Iterate over the children of a node.
    pub fn children(&self, parent: MetaId) -> ChildIter<'_> {
        let first = self
            .get(parent)
            .map(|n| n.first_child)
            .unwrap_or(MetaId::INVALID);
        ChildIter {
            tree: self,
            current: first,
        }
    }

    /// Depth-first iteration over every node that has no children.
    pub fn leaves(&self) -> impl Iterator<Item = &MetadataNode> {
        let mut out = Vec::new();
        self.collect_leaves(MetaId::ROOT, &mut out);
        out.into_iter()
    }

    fn collect_leaves<'a>(&'a self, id: MetaId, out: &mut Vec<&'a MetadataNode>) {
        let node = &self.nodes[id.index()];
        if !node.first_child.is_valid() {
            if id != MetaId::ROOT {
                out.push(node);
            }
            return;
        }
        let mut child = node.first_child;
        while child.is_valid() {
            self.collect_leaves(child, out);
            child = self.nodes[child.index()].next_sibling;
        }
    }
}

/// Iterator over the children of a node.
pub struct ChildIter<'a> {
    tree: &'a MetadataTree,
    current: MetaId,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = &'a MetadataNode;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.current.is_valid() {
            return None;
        }
        let node = &self.tree.nodes[self.current.index()];
        self.current = node.next_sibling;
        Some(node)
    }
}
