//! # Element Tree
//!
//! Arena-backed element tree. Nodes are addressed by [`NodeKey`]; a key is
//! only meaningful for the tree that issued it and is invalidated when its
//! node is detached.
//!
//! ```text
//! Tree
//!  ├─ slots: [Some(root), Some(a), None, Some(b), ...]
//!  └─ free:  [2]            ← reused by the next insertion
//! ```
//!
//! A detached subtree (a fresh copy, a parsed fragment, a cut node) is just
//! another `Tree` whose root is the subtree's top element.

use crate::error::{StoreError, StoreResult};
use crate::namespace::QName;
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u32);

/// Ordered attribute map
pub type Attributes = BTreeMap<QName, String>;

/// One element: name, attributes, text before the first child, and the
/// tail text that follows the element inside its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: QName,
    pub attributes: Attributes,
    pub text: Option<String>,
    pub tail: Option<String>,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl Node {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Attributes::new(),
            text: None,
            tail: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.attributes.insert(name, value.into());
        self
    }

    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute(&QName::xml_id())
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
    root: NodeKey,
    live: usize,
}

impl Tree {
    pub fn new(root: Node) -> Self {
        let mut root = root;
        root.parent = None;
        root.children.clear();
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: NodeKey(0),
            live: 1,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Number of elements in the tree
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.slots.get(key.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.slots.get_mut(key.0 as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.get(key).is_some()
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.get(key).and_then(|n| n.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.get(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Index of `key` among its parent's children
    pub fn position(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|c| *c == key)
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let pos = self.position(key)?;
        if pos == 0 {
            None
        } else {
            self.children(parent).get(pos - 1).copied()
        }
    }

    /// `key` and everything below it, in document order
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if !self.contains(key) {
            return out;
        }
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            out.push(k);
            stack.extend(self.children(k).iter().rev().copied());
        }
        out
    }

    /// True when `ancestor` is `key` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            if k == ancestor {
                return true;
            }
            cursor = self.parent(k);
        }
        false
    }

    fn alloc(&mut self, node: Node) -> NodeKey {
        self.live += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                NodeKey(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeKey((self.slots.len() - 1) as u32)
            }
        }
    }

    fn release(&mut self, key: NodeKey) -> Option<Node> {
        let node = self.slots.get_mut(key.0 as usize)?.take()?;
        self.free.push(key.0);
        self.live -= 1;
        Some(node)
    }

    /// Append a new leaf element under `parent`
    pub fn append_child(&mut self, parent: NodeKey, node: Node) -> StoreResult<NodeKey> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, node)
    }

    /// Insert a new leaf element under `parent` at `index` (clamped)
    pub fn insert_child(&mut self, parent: NodeKey, index: usize, node: Node) -> StoreResult<NodeKey> {
        if !self.contains(parent) {
            return Err(StoreError::StaleNode);
        }
        let mut node = node;
        node.parent = Some(parent);
        node.children.clear();
        let key = self.alloc(node);
        let children = &mut self[parent].children;
        let index = index.min(children.len());
        children.insert(index, key);
        Ok(key)
    }

    /// Deep copy of the subtree rooted at `key`
    pub fn extract(&self, key: NodeKey) -> StoreResult<Tree> {
        let top = self.get(key).ok_or(StoreError::StaleNode)?;
        let mut copy = Tree::new(top.clone());
        let mut pending = vec![(key, copy.root())];
        while let Some((source, target)) = pending.pop() {
            for child in self.children(source) {
                let new_key = copy.append_child(target, self[*child].clone())?;
                pending.push((*child, new_key));
            }
        }
        Ok(copy)
    }

    /// Move every node of `subtree` into this tree under `parent` at `index`
    pub fn graft(&mut self, parent: NodeKey, index: usize, subtree: Tree) -> StoreResult<NodeKey> {
        let mut subtree = subtree;
        let top = subtree.root();
        let node = subtree.release(top).ok_or(StoreError::StaleNode)?;
        let children = node.children.clone();
        let new_top = self.insert_child(parent, index, node)?;
        let mut pending: Vec<(NodeKey, NodeKey)> = children.into_iter().map(|c| (c, new_top)).collect();
        pending.reverse();
        while let Some((source, target)) = pending.pop() {
            let node = subtree.release(source).ok_or(StoreError::StaleNode)?;
            let grandchildren = node.children.clone();
            let new_key = self.append_child(target, node)?;
            pending.extend(grandchildren.into_iter().rev().map(|c| (c, new_key)));
        }
        Ok(new_top)
    }

    /// Remove the subtree rooted at `key` and return it as its own tree
    pub fn detach(&mut self, key: NodeKey) -> StoreResult<Tree> {
        if key == self.root {
            return Err(StoreError::RootElement("removed"));
        }
        let parent = self.parent(key).ok_or(StoreError::StaleNode)?;
        let detached = self.extract(key)?;
        self[parent].children.retain(|c| *c != key);
        for k in self.descendants(key) {
            self.release(k);
        }
        Ok(detached)
    }
}

impl Index<NodeKey> for Tree {
    type Output = Node;

    fn index(&self, key: NodeKey) -> &Node {
        self.get(key).expect("stale NodeKey")
    }
}

impl IndexMut<NodeKey> for Tree {
    fn index_mut(&mut self, key: NodeKey) -> &mut Node {
        self.get_mut(key).expect("stale NodeKey")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(local: &str) -> Node {
        Node::new(QName::tl(local))
    }

    fn sample() -> (Tree, NodeKey, NodeKey) {
        let mut tree = Tree::new(leaf("document"));
        let root = tree.root();
        let par = tree.append_child(root, leaf("par")).unwrap();
        tree.append_child(par, leaf("sleep")).unwrap();
        tree.append_child(par, leaf("ref")).unwrap();
        let seq = tree.append_child(root, leaf("seq")).unwrap();
        (tree, par, seq)
    }

    #[test]
    fn test_descendants_in_document_order() {
        let (tree, _, _) = sample();
        let names: Vec<_> = tree
            .descendants(tree.root())
            .into_iter()
            .map(|k| tree[k].name.local.clone())
            .collect();
        assert_eq!(names, vec!["document", "par", "sleep", "ref", "seq"]);
    }

    #[test]
    fn test_extract_and_graft() {
        let (mut tree, par, seq) = sample();
        let copy = tree.extract(par).unwrap();
        assert_eq!(copy.len(), 3);

        let grafted = tree.graft(seq, 0, copy).unwrap();
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.parent(grafted), Some(seq));
        let names: Vec<_> = tree.children(grafted).iter().map(|k| tree[*k].name.local.clone()).collect();
        assert_eq!(names, vec!["sleep", "ref"]);
    }

    #[test]
    fn test_detach_reuses_slots() {
        let (mut tree, par, seq) = sample();
        let cut = tree.detach(par).unwrap();
        assert_eq!(cut.len(), 3);
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(par));
        assert_eq!(tree.position(seq), Some(0));

        let again = tree.append_child(seq, leaf("sleep")).unwrap();
        assert!(tree.contains(again));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_detach_root_fails() {
        let (mut tree, _, _) = sample();
        let root = tree.root();
        assert_eq!(tree.detach(root).unwrap_err(), StoreError::RootElement("removed"));
    }

    #[test]
    fn test_previous_sibling() {
        let (tree, par, seq) = sample();
        assert_eq!(tree.previous_sibling(seq), Some(par));
        assert_eq!(tree.previous_sibling(par), None);
    }
}
