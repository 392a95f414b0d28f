//! # Edit Scope
//!
//! A scope holds the document lock from [`Document::begin_scope`] until it is
//! committed or dropped. Every structural primitive on the scope updates the
//! tree and the indexes, then tells the recorder what happened:
//!
//! ```text
//! begin_scope ──▶ insert / remove / update_attributes ... ──▶ commit
//!                        │                                      │
//!                   EditRecorder                      lock released, then
//!                                                     replica + publisher
//! ```
//!
//! Only one scope can be open per document. A second `begin_scope` on the
//! same thread is rejected; other threads wait for the lock.

use crate::document::{Document, DocumentState};
use crate::errors::{DocumentError, DocumentResult};
use crate::operations::{InsertPosition, Operation};
use crate::recorder::EditRecorder;
use parking_lot::ReentrantMutexGuard;
use std::cell::RefCell;
use timeline_tree::{Attributes, NodeKey, QName, StoreError, Tree, TreeStore};
use tracing::{debug, warn};

pub struct EditScope<'a> {
    document: &'a Document,
    guard: Option<ReentrantMutexGuard<'a, RefCell<DocumentState>>>,
    reason: String,
}

impl<'a> EditScope<'a> {
    pub(crate) fn open(document: &'a Document, reason: &str) -> DocumentResult<Self> {
        let guard = document.lock();
        let refused = {
            let mut state = guard.borrow_mut();
            match &state.recorder {
                Some(active) => {
                    let active = active.reason().to_string();
                    state.last_error = Some("Another editing operation is still in progress".to_string());
                    Some(active)
                }
                None => {
                    state.recorder = Some(EditRecorder::new(reason));
                    None
                }
            }
        };
        if let Some(active) = refused {
            warn!(document = %document.id(), reason, active = %active, "edit scope refused");
            return Err(DocumentError::ConcurrentEdit { active });
        }
        debug!(reason, "edit scope opened");
        Ok(Self {
            document,
            guard: Some(guard),
            reason: reason.to_string(),
        })
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub(crate) fn state<R>(&self, f: impl FnOnce(&mut DocumentState) -> DocumentResult<R>) -> DocumentResult<R> {
        let guard = self
            .guard
            .as_ref()
            .ok_or_else(|| DocumentError::invalid("edit scope already closed"))?;
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Run `f` against the current tree
    pub fn read<R>(&self, f: impl FnOnce(&TreeStore) -> R) -> DocumentResult<R> {
        self.state(|state| Ok(f(state.store()?)))
    }

    fn edit<R>(&self, f: impl FnOnce(&mut TreeStore, &mut EditRecorder) -> DocumentResult<R>) -> DocumentResult<R> {
        self.state(|state| {
            let DocumentState { store, recorder, .. } = state;
            let store = store.as_mut().ok_or(DocumentError::NoDocument)?;
            let recorder = recorder
                .as_mut()
                .ok_or_else(|| DocumentError::invalid("edit scope already closed"))?;
            f(store, recorder)
        })
    }

    pub fn resolve(&self, path: &str) -> DocumentResult<NodeKey> {
        self.read(|store| store.resolve(path))?.map_err(DocumentError::from)
    }

    pub fn by_id(&self, id: &str) -> DocumentResult<Option<NodeKey>> {
        self.read(|store| store.by_id(id))
    }

    /// Element with identifier `id`, or NotFound
    pub fn element(&self, id: &str) -> DocumentResult<NodeKey> {
        self.by_id(id)?.ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    pub fn parse_fragment(&self, data: &[u8]) -> DocumentResult<Tree> {
        self.state(|state| Ok(state.store_mut()?.parse_fragment(data)?))
    }

    pub fn copy_subtree(&self, key: NodeKey) -> DocumentResult<Tree> {
        self.read(|store| store.copy_subtree(key))?.map_err(DocumentError::from)
    }

    pub fn after_copy(&self, copy: &mut Tree, trigger_attributes: bool) -> DocumentResult<()> {
        self.read(|store| store.after_copy(copy, trigger_attributes))
    }

    pub fn allocate_id(&self, candidate: &str) -> DocumentResult<String> {
        self.read(|store| store.allocate_id(candidate))
    }

    pub fn insert(&self, parent: NodeKey, index: usize, subtree: Tree) -> DocumentResult<NodeKey> {
        self.edit(|store, recorder| {
            let key = store.insert(parent, index, subtree)?;
            recorder.record_insert(store, key);
            Ok(key)
        })
    }

    pub fn append(&self, parent: NodeKey, subtree: Tree) -> DocumentResult<NodeKey> {
        let index = self.read(|store| store.tree().children(parent).len())?;
        self.insert(parent, index, subtree)
    }

    /// Insert `subtree` relative to `anchor`
    pub fn place(&self, anchor: NodeKey, position: InsertPosition, subtree: Tree) -> DocumentResult<NodeKey> {
        match position {
            InsertPosition::Begin => self.insert(anchor, 0, subtree),
            InsertPosition::End => self.append(anchor, subtree),
            InsertPosition::Before | InsertPosition::After | InsertPosition::Replace => {
                let (parent, index) = self.read(|store| {
                    let parent = store.parent(anchor);
                    let index = store.tree().position(anchor).unwrap_or(0);
                    (parent, index)
                })?;
                let Some(parent) = parent else {
                    let what = match position {
                        InsertPosition::Replace => "replaced",
                        _ => "given siblings",
                    };
                    return Err(StoreError::RootElement(what).into());
                };
                match position {
                    InsertPosition::Before => self.insert(parent, index, subtree),
                    InsertPosition::After => self.insert(parent, index + 1, subtree),
                    _ => {
                        let previous = self.remove(anchor)?;
                        match self.insert(parent, index, subtree) {
                            Ok(key) => Ok(key),
                            Err(e) => {
                                self.insert(parent, index, previous)?;
                                Err(e)
                            }
                        }
                    }
                }
            }
        }
    }

    /// Detach the subtree at `key`
    pub fn remove(&self, key: NodeKey) -> DocumentResult<Tree> {
        self.edit(|store, recorder| {
            let path = store.path_of(key);
            let removed = store.remove(key)?;
            recorder.record_delete(path);
            Ok(removed)
        })
    }

    pub fn replace_attributes(&self, key: NodeKey, attributes: Attributes) -> DocumentResult<()> {
        self.edit(|store, recorder| {
            store.replace_attributes(key, attributes)?;
            recorder.record_change(store, key);
            Ok(())
        })
    }

    /// Edit a copy of the attributes of `key`; one change is recorded
    pub fn update_attributes(&self, key: NodeKey, edit: impl FnOnce(&mut Attributes)) -> DocumentResult<()> {
        self.edit(|store, recorder| {
            store.update_attributes(key, edit)?;
            recorder.record_change(store, key);
            Ok(())
        })
    }

    pub fn set_attribute(&self, key: NodeKey, name: QName, value: impl Into<String>) -> DocumentResult<()> {
        let value = value.into();
        self.update_attributes(key, |attrs| {
            attrs.insert(name, value);
        })
    }

    pub fn remove_attribute(&self, key: NodeKey, name: &QName) -> DocumentResult<()> {
        self.update_attributes(key, |attrs| {
            attrs.remove(name);
        })
    }

    /// Replace the text of `key`. The element is removed and re-inserted so
    /// a replica sees the new content; its tail text is dropped. Returns the
    /// key of the re-inserted element.
    pub fn set_text(&self, key: NodeKey, text: Option<String>) -> DocumentResult<NodeKey> {
        let (parent, index, copy) = self.read(|store| {
            let parent = store.parent(key);
            let index = store.tree().position(key).unwrap_or(0);
            (parent, index, store.copy_subtree(key))
        })?;
        let parent = parent.ok_or(StoreError::RootElement("given new text"))?;
        let mut copy = copy?;
        let top = copy.root();
        copy[top].text = text;
        self.remove(key)?;
        self.insert(parent, index, copy)
    }

    /// Give `key` an identifier if it has none; the addition is recorded
    pub fn ensure_id(&self, key: NodeKey) -> DocumentResult<String> {
        if let Some(id) = self.read(|store| store.node(key).map(|n| n.id().map(str::to_string)))?? {
            return Ok(id);
        }
        self.edit(|store, recorder| {
            let id = store.ensure_id(key)?;
            recorder.record_change(store, key);
            Ok(id)
        })
    }

    /// Close the scope and return the recorded operations. The lock is
    /// released before the operations go to the replica and the publisher.
    pub fn commit(mut self) -> Vec<Operation> {
        self.finish()
    }

    /// Close the scope without forwarding anything it recorded
    pub(crate) fn abandon(mut self) {
        if let Some(guard) = self.guard.take() {
            guard.borrow_mut().recorder = None;
            debug!(reason = %self.reason, "edit scope abandoned");
        }
    }

    fn finish(&mut self) -> Vec<Operation> {
        let Some(guard) = self.guard.take() else {
            return Vec::new();
        };
        let recorder = guard.borrow_mut().recorder.take();
        drop(guard);

        let operations = recorder.map(EditRecorder::finish).unwrap_or_default();
        debug!(reason = %self.reason, operations = operations.len(), "edit scope closed");
        self.document.dispatch(&self.reason, &operations);
        operations
    }
}

impl Drop for EditScope<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
