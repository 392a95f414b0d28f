//! # Tree Store
//!
//! Owns a document tree together with its derived indexes:
//!
//! ```text
//! TreeStore
//!  ├─ tree        arena of elements, parent links included
//!  ├─ ids         xml:id → node, exact at all times
//!  ├─ names       every tt:name ever seen, never shrinks
//!  └─ namespaces  prefix table used for paths and output
//! ```
//!
//! Indexes are built in one pass when the store is created and then kept up
//! to date by the structural primitives below. Every primitive validates
//! first and mutates second, so a failed call leaves tree and indexes as
//! they were.

use crate::error::{StoreError, StoreResult};
use crate::id_generator::{allocate_id, allocate_name, COPY_ID, DEFAULT_NAME, GENERATED_ID};
use crate::namespace::{NamespaceTable, QName};
use crate::node::{Attributes, Node, NodeKey, Tree};
use crate::parser;
use crate::path::{path_of, PathExpr};
use crate::serializer::{serialize_document, serialize_fragment};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TreeStore {
    tree: Tree,
    namespaces: NamespaceTable,
    ids: HashMap<String, NodeKey>,
    names: BTreeSet<String>,
}

impl TreeStore {
    /// Build the indexes for `tree`. Fails on duplicate identifiers.
    pub fn new(tree: Tree, namespaces: NamespaceTable) -> StoreResult<Self> {
        let mut ids = HashMap::new();
        let mut names = BTreeSet::new();
        for key in tree.descendants(tree.root()) {
            let node = &tree[key];
            if let Some(id) = node.id() {
                if ids.insert(id.to_string(), key).is_some() {
                    return Err(StoreError::DuplicateId(id.to_string()));
                }
            }
            if let Some(name) = node.attribute(&QName::tt("name")) {
                names.insert(name.to_string());
            }
        }
        debug!(elements = tree.len(), ids = ids.len(), "indexed tree");
        Ok(Self {
            tree,
            namespaces,
            ids,
            names,
        })
    }

    /// Parse `data` and index it
    pub fn parse(data: &[u8], namespaces: &NamespaceTable) -> StoreResult<Self> {
        let mut namespaces = namespaces.clone();
        let tree = parser::parse(data, &mut namespaces)?;
        Self::new(tree, namespaces)
    }

    /// Parse a detached fragment, registering any new prefixes with this store
    pub fn parse_fragment(&mut self, data: &[u8]) -> StoreResult<Tree> {
        Ok(parser::parse(data, &mut self.namespaces)?)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn root(&self) -> NodeKey {
        self.tree.root()
    }

    pub fn node(&self, key: NodeKey) -> StoreResult<&Node> {
        self.tree.get(key).ok_or(StoreError::StaleNode)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.tree.parent(key)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<NodeKey> {
        self.ids.get(id).copied()
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = (&str, NodeKey)> {
        self.ids.iter().map(|(id, key)| (id.as_str(), *key))
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn attribute(&self, key: NodeKey, name: &QName) -> Option<&str> {
        self.tree.get(key).and_then(|n| n.attribute(name))
    }

    pub fn path_of(&self, key: NodeKey) -> String {
        path_of(&self.tree, key, &self.namespaces)
    }

    pub fn compile(&self, path: &str) -> StoreResult<PathExpr> {
        Ok(PathExpr::parse(path, &self.namespaces)?)
    }

    /// Exactly one element, addressed from the document (absolute paths) or
    /// from the root element (relative paths)
    pub fn resolve(&self, path: &str) -> StoreResult<NodeKey> {
        Ok(self.compile(path)?.select_one(&self.tree, self.root())?)
    }

    /// Every match of `path` evaluated against `context`
    pub fn find_all(&self, context: NodeKey, path: &str) -> StoreResult<Vec<NodeKey>> {
        Ok(self.compile(path)?.select(&self.tree, context))
    }

    pub fn find_first(&self, context: NodeKey, path: &str) -> StoreResult<Option<NodeKey>> {
        Ok(self.find_all(context, path)?.into_iter().next())
    }

    pub fn serialize(&self) -> String {
        serialize_document(&self.tree, &self.namespaces)
    }

    pub fn serialize_node(&self, key: NodeKey) -> String {
        serialize_fragment(&self.tree, key, &self.namespaces)
    }

    /// Serialize a detached tree with this store's prefixes
    pub fn serialize_detached(&self, tree: &Tree) -> String {
        serialize_fragment(tree, tree.root(), &self.namespaces)
    }

    /// Deep copy of a subtree, detached from the store
    pub fn copy_subtree(&self, key: NodeKey) -> StoreResult<Tree> {
        self.tree.extract(key)
    }

    /// Attach `subtree` under `parent` at `index`. Rejected before any change
    /// if one of its identifiers is already in use. The attached top element
    /// starts without tail text.
    pub fn insert(&mut self, parent: NodeKey, index: usize, subtree: Tree) -> StoreResult<NodeKey> {
        if !self.tree.contains(parent) {
            return Err(StoreError::StaleNode);
        }
        let mut subtree = subtree;
        let top = subtree.root();
        subtree[top].tail = None;
        let mut incoming = HashSet::new();
        for key in subtree.descendants(subtree.root()) {
            if let Some(id) = subtree[key].id() {
                if self.ids.contains_key(id) || !incoming.insert(id.to_string()) {
                    return Err(StoreError::DuplicateId(id.to_string()));
                }
            }
        }

        let top = self.tree.graft(parent, index, subtree)?;
        for key in self.tree.descendants(top) {
            let node = &self.tree[key];
            if let Some(id) = node.id() {
                self.ids.insert(id.to_string(), key);
            }
            if let Some(name) = node.attribute(&QName::tt("name")) {
                self.names.insert(name.to_string());
            }
        }
        Ok(top)
    }

    pub fn append(&mut self, parent: NodeKey, subtree: Tree) -> StoreResult<NodeKey> {
        let index = self.tree.children(parent).len();
        self.insert(parent, index, subtree)
    }

    /// Detach the subtree at `key`. Its identifiers leave the index; its
    /// names stay in the name set.
    pub fn remove(&mut self, key: NodeKey) -> StoreResult<Tree> {
        if key == self.root() {
            return Err(StoreError::RootElement("removed"));
        }
        let doomed: Vec<String> = self
            .tree
            .descendants(key)
            .into_iter()
            .filter_map(|k| self.tree[k].id().map(str::to_string))
            .collect();
        let detached = self.tree.detach(key)?;
        for id in doomed {
            self.ids.remove(&id);
        }
        Ok(detached)
    }

    /// Replace the complete attribute map of `key`
    pub fn replace_attributes(&mut self, key: NodeKey, attributes: Attributes) -> StoreResult<()> {
        let id_name = QName::xml_id();
        let old_id = self.node(key)?.id().map(str::to_string);
        let new_id = attributes.get(&id_name).cloned();
        if let Some(id) = &new_id {
            if old_id.as_ref() != Some(id) && self.ids.contains_key(id) {
                return Err(StoreError::DuplicateId(id.clone()));
            }
        }

        if let Some(name) = attributes.get(&QName::tt("name")) {
            self.names.insert(name.clone());
        }
        self.tree[key].attributes = attributes;
        if old_id != new_id {
            if let Some(id) = old_id {
                self.ids.remove(&id);
            }
            if let Some(id) = new_id {
                self.ids.insert(id, key);
            }
        }
        Ok(())
    }

    /// Apply `edit` to a copy of the attributes of `key`, then store the result
    pub fn update_attributes(&mut self, key: NodeKey, edit: impl FnOnce(&mut Attributes)) -> StoreResult<()> {
        let mut attributes = self.node(key)?.attributes.clone();
        edit(&mut attributes);
        self.replace_attributes(key, attributes)
    }

    pub fn set_attribute(&mut self, key: NodeKey, name: QName, value: impl Into<String>) -> StoreResult<()> {
        let value = value.into();
        self.update_attributes(key, |attrs| {
            attrs.insert(name, value);
        })
    }

    pub fn set_text(&mut self, key: NodeKey, text: Option<String>, tail: Option<String>) -> StoreResult<()> {
        let node = self.tree.get_mut(key).ok_or(StoreError::StaleNode)?;
        node.text = text;
        node.tail = tail;
        Ok(())
    }

    /// Give `key` an identifier if it has none. Returns its identifier.
    pub fn ensure_id(&mut self, key: NodeKey) -> StoreResult<String> {
        if let Some(id) = self.node(key)?.id() {
            return Ok(id.to_string());
        }
        let id = self.allocate_id(GENERATED_ID);
        self.set_attribute(key, QName::xml_id(), id.clone())?;
        Ok(id)
    }

    /// Unused identifier derived from `candidate`
    pub fn allocate_id(&self, candidate: &str) -> String {
        allocate_id(candidate, |id| self.ids.contains_key(id))
    }

    /// Make a detached copy safe to attach: every identifier in it is
    /// rewritten to be unique against the store and against the rest of the
    /// copy. With `trigger_attributes` the top element also gets an
    /// identifier if it lacks one, a `tt:name` unique against the name set,
    /// and `tls:state="new"`.
    pub fn after_copy(&self, copy: &mut Tree, trigger_attributes: bool) {
        let top = copy.root();
        let mut assigned: HashSet<String> = HashSet::new();
        for key in copy.descendants(top) {
            let current = match copy[key].id() {
                Some(id) => id.to_string(),
                None if key == top && trigger_attributes => COPY_ID.to_string(),
                None => continue,
            };
            let id = allocate_id(&current, |id| self.ids.contains_key(id) || assigned.contains(id));
            assigned.insert(id.clone());
            copy[key].attributes.insert(QName::xml_id(), id);
        }

        if trigger_attributes {
            let name_key = QName::tt("name");
            let current = copy[top].attribute(&name_key).unwrap_or(DEFAULT_NAME).to_string();
            if !current.is_empty() {
                let name = allocate_name(&current, |n| self.names.contains(n));
                copy[top].attributes.insert(name_key, name);
            }
            copy[top]
                .attributes
                .insert(QName::tls("state"), "new".to_string());
        }
    }
}
