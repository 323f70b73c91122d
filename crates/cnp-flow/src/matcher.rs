//! Prefix-match table from name patterns to listeners.
//!
//! Patterns are stored in a component-wise trie. Matching a name walks its
//! components from the root and collects every listener registered along
//! the way, so standing filters at different depths all apply.

use cnp_core::{Component, Name};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug)]
struct TrieNode<L> {
    listeners: Vec<L>,
    children: BTreeMap<Component, TrieNode<L>>,
}

impl<L> Default for TrieNode<L> {
    fn default() -> Self {
        TrieNode {
            listeners: Vec::new(),
            children: BTreeMap::new(),
        }
    }
}

impl<L: Clone + PartialEq> TrieNode<L> {
    fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.children.is_empty()
    }

    /// Remove `listener` at `path`, pruning nodes left empty. Returns whether
    /// something was removed.
    fn remove(&mut self, path: &[Component], listener: &L) -> bool {
        match path.split_first() {
            None => {
                let before = self.listeners.len();
                self.listeners.retain(|l| l != listener);
                before != self.listeners.len()
            }
            Some((head, rest)) => {
                let Some(child) = self.children.get_mut(head) else {
                    return false;
                };
                let removed = child.remove(rest, listener);
                if child.is_empty() {
                    self.children.remove(head);
                }
                removed
            }
        }
    }

    fn collect(&self, out: &mut Vec<L>) {
        out.extend(self.listeners.iter().cloned());
        for child in self.children.values() {
            child.collect(out);
        }
    }

    fn count(&self) -> usize {
        self.listeners.len() + self.children.values().map(TrieNode::count).sum::<usize>()
    }
}

/// Concurrent prefix-match table.
#[derive(Debug)]
pub struct NameMatcher<L> {
    root: RwLock<TrieNode<L>>,
}

impl<L: Clone + PartialEq> NameMatcher<L> {
    pub fn new() -> Self {
        NameMatcher {
            root: RwLock::new(TrieNode::default()),
        }
    }

    /// Register `listener` for every name that has `pattern` as a prefix.
    /// Registering the same pair twice keeps a single registration.
    pub fn register(&self, pattern: &Name, listener: L) {
        let mut root = self.root.write();
        let mut node = &mut *root;
        for component in pattern.components() {
            node = node.children.entry(component.clone()).or_default();
        }
        if !node.listeners.contains(&listener) {
            node.listeners.push(listener);
        }
    }

    /// Remove a registration. Unknown pairs are ignored.
    pub fn unregister(&self, pattern: &Name, listener: &L) -> bool {
        self.root.write().remove(pattern.components(), listener)
    }

    /// Listeners whose pattern is a prefix of `name`, shallowest pattern
    /// first and in registration order within one pattern.
    pub fn matches(&self, name: &Name) -> Vec<L> {
        let root = self.root.read();
        let mut out = root.listeners.clone();
        let mut node = &*root;
        for component in name.components() {
            match node.children.get(component) {
                Some(child) => {
                    out.extend(child.listeners.iter().cloned());
                    node = child;
                }
                None => break,
            }
        }
        out
    }

    /// Listeners registered at `prefix` or anywhere below it.
    pub fn listeners_under(&self, prefix: &Name) -> Vec<L> {
        let root = self.root.read();
        let mut node = &*root;
        for component in prefix.components() {
            match node.children.get(component) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        node.collect(&mut out);
        out
    }

    pub fn clear(&self) {
        *self.root.write() = TrieNode::default();
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.root.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.read().is_empty()
    }
}

impl<L: Clone + PartialEq> Default for NameMatcher<L> {
    fn default() -> Self {
        Self::new()
    }
}
