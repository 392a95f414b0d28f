//! XML-level editing: paste, cut, copy and move of serialized subtrees,
//! addressed by path. Every call is one edit scope.

use crate::document::Document;
use crate::errors::DocumentResult;
use crate::operations::InsertPosition;
use crate::session::EditScope;
use std::collections::BTreeMap;
use timeline_tree::{PathError, StoreError};
use tracing::info;

pub struct XmlView<'a> {
    document: &'a Document,
}

impl<'a> XmlView<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self { document }
    }

    fn edit<R>(&self, reason: &str, f: impl FnOnce(&EditScope<'_>) -> DocumentResult<R>) -> DocumentResult<R> {
        let result = self.document.begin_scope(reason).and_then(|scope| {
            let value = f(&scope)?;
            scope.commit();
            Ok(value)
        });
        self.document.report(result)
    }

    /// Insert the serialized `data` relative to `path`; returns the new
    /// element's path
    pub fn paste(&self, path: &str, position: InsertPosition, data: &str) -> DocumentResult<String> {
        info!(document = %self.document.id(), path, %position, "paste");
        self.edit("paste", |scope| {
            let anchor = scope.resolve(path)?;
            let subtree = scope.parse_fragment(data.as_bytes())?;
            let key = scope.place(anchor, position, subtree)?;
            scope.read(|store| store.path_of(key))
        })
    }

    /// Remove the element at `path` and return it serialized
    pub fn cut(&self, path: &str) -> DocumentResult<String> {
        info!(document = %self.document.id(), path, "cut");
        self.edit("cut", |scope| {
            let key = scope.resolve(path)?;
            let data = scope.read(|store| store.serialize_node(key))?;
            scope.remove(key)?;
            Ok(data)
        })
    }

    pub fn get(&self, path: &str) -> DocumentResult<String> {
        let result = self
            .document
            .with_store(|store| store.resolve(path).map(|key| store.serialize_node(key)))
            .and_then(|r| r.map_err(Into::into));
        self.document.report(result)
    }

    /// Set or (with `None`) remove attributes by prefixed name
    pub fn modify_attributes(&self, path: &str, attrs: &BTreeMap<String, Option<String>>) -> DocumentResult<String> {
        info!(document = %self.document.id(), path, attributes = attrs.len(), "modify attributes");
        self.edit("modifyAttributes", |scope| {
            let key = scope.resolve(path)?;
            let resolved = scope.read(|store| {
                attrs
                    .iter()
                    .map(|(name, value)| {
                        store
                            .namespaces()
                            .resolve(name)
                            .map(|qname| (qname, value.clone()))
                            .ok_or_else(|| PathError::UnknownPrefix {
                                path: format!("{}/@{}", path, name),
                                prefix: name.split(':').next().unwrap_or(name).to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })??;
            scope.update_attributes(key, |attributes| {
                for (name, value) in resolved {
                    match value {
                        Some(value) => attributes.insert(name, value),
                        None => attributes.remove(&name),
                    };
                }
            })?;
            scope.read(|store| store.path_of(key))
        })
    }

    /// Replace the text content of the element at `path`
    pub fn modify_data(&self, path: &str, data: Option<&str>) -> DocumentResult<String> {
        info!(document = %self.document.id(), path, "modify data");
        self.edit("modifyData", |scope| {
            let key = scope.resolve(path)?;
            let key = scope.set_text(key, data.map(str::to_string))?;
            scope.read(|store| store.path_of(key))
        })
    }

    /// Insert a copy of the element at `source` relative to `path`. The copy
    /// gets fresh identifiers.
    pub fn copy(&self, path: &str, position: InsertPosition, source: &str) -> DocumentResult<String> {
        info!(document = %self.document.id(), path, %position, source, "copy");
        self.edit("copy", |scope| {
            let anchor = scope.resolve(path)?;
            let original = scope.resolve(source)?;
            let mut copy = scope.copy_subtree(original)?;
            scope.after_copy(&mut copy, false)?;
            let key = scope.place(anchor, position, copy)?;
            scope.read(|store| store.path_of(key))
        })
    }

    /// Move the element at `source` relative to `path`
    pub fn move_node(&self, path: &str, position: InsertPosition, source: &str) -> DocumentResult<String> {
        info!(document = %self.document.id(), path, %position, source, "move");
        self.edit("move", |scope| {
            let anchor = scope.resolve(path)?;
            let original = scope.resolve(source)?;
            if scope.read(|store| store.tree().is_ancestor_or_self(original, anchor))? {
                return Err(StoreError::Cycle.into());
            }
            let subtree = scope.remove(original)?;
            let key = scope.place(anchor, position, subtree)?;
            scope.read(|store| store.path_of(key))
        })
    }
}
