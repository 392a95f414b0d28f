use crate::operations::{encode_attributes, InsertPosition, Operation};
use timeline_tree::{NodeKey, TreeStore};
use tracing::debug;

/// Collects the operations produced while one edit scope is open
#[derive(Debug)]
pub struct EditRecorder {
    reason: String,
    operations: Vec<Operation>,
}

impl EditRecorder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            operations: Vec::new(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// `key` has just been attached. Anchored on the previous sibling when
    /// there is one, otherwise on the parent.
    pub fn record_insert(&mut self, store: &TreeStore, key: NodeKey) {
        let data = store.serialize_node(key);
        let operation = match store.tree().previous_sibling(key) {
            Some(sibling) => Operation::Insert {
                path: store.path_of(sibling),
                position: InsertPosition::After,
                data,
            },
            None => {
                let parent = store.parent(key).unwrap_or(key);
                Operation::Insert {
                    path: store.path_of(parent),
                    position: InsertPosition::Begin,
                    data,
                }
            }
        };
        self.push(operation);
    }

    /// An element at `path` is about to be removed
    pub fn record_delete(&mut self, path: String) {
        self.push(Operation::Delete { path });
    }

    /// The attributes of `key` have changed
    pub fn record_change(&mut self, store: &TreeStore, key: NodeKey) {
        let attrs = store
            .node(key)
            .map(|node| encode_attributes(store.namespaces(), &node.attributes))
            .unwrap_or_default();
        self.push(Operation::AttributeChange {
            path: store.path_of(key),
            attrs,
        });
    }

    fn push(&mut self, operation: Operation) {
        debug!(reason = %self.reason, verb = operation.verb(), path = operation.path(), "recorded");
        self.operations.push(operation);
    }

    pub fn finish(self) -> Vec<Operation> {
        self.operations
    }
}
