//! # Replication Forwarder
//!
//! Where the operations of a closed edit scope go:
//!
//! ```text
//!                 ┌──▶ ForwardHandler  (replica document, non-empty scopes)
//! EditScope ──────┤
//!                 └──▶ ScopePublisher  (serve layer, every scope)
//! ```
//!
//! A replica is just another [`Document`]; replaying through its own scope
//! keeps its indexes and its own downstream consumers in step. A scope is
//! replayed whole or not at all: on the first failing operation the tree is
//! restored and the replica is marked diverged.

use crate::document::Document;
use crate::errors::DocumentResult;
use crate::events::EventListing;
use crate::operations::Operation;
use tracing::{debug, error, info};

/// Receives the operations of every non-empty committed scope
pub trait ForwardHandler: Send + Sync {
    fn apply_operations(&self, operations: &[Operation]) -> DocumentResult<()>;
}

/// Receives every committed scope, empty or not
pub trait ScopePublisher: Send + Sync {
    fn publish_scope(&self, document_id: &str, operations: &[Operation]);

    /// A fresh event listing is available
    fn publish_events(&self, _document_id: &str, _listing: &EventListing) {}
}

impl ForwardHandler for Document {
    fn apply_operations(&self, operations: &[Operation]) -> DocumentResult<()> {
        info!(document = %self.id(), operations = operations.len(), "replaying operations");
        let scope = self.begin_scope("forward")?;
        let snapshot = scope.state(|state| Ok(state.store.clone()))?;
        for (index, operation) in operations.iter().enumerate() {
            debug!(verb = operation.verb(), path = operation.path(), "replay");
            if let Err(err) = operation.apply(&scope) {
                error!(
                    document = %self.id(),
                    index,
                    verb = operation.verb(),
                    path = operation.path(),
                    error = %err,
                    "replay failed, replica diverged"
                );
                scope.state(|state| {
                    state.store = snapshot;
                    state.diverged = true;
                    Ok(())
                })?;
                scope.abandon();
                return Err(err);
            }
        }
        scope.commit();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use timeline_tree::QName;

    const DOC: &str = r#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" xml:id="root"><tl:par xml:id="a"><tl:sleep xml:id="s" /></tl:par></tl:document>"#;

    fn pair() -> (Document, Arc<Document>) {
        let primary = Document::new("primary");
        primary.load_xml(DOC.as_bytes()).unwrap();
        let replica = Arc::new(Document::new("replica"));
        replica.load_xml(DOC.as_bytes()).unwrap();
        primary.set_forward_handler(Some(replica.clone()));
        (primary, replica)
    }

    #[test]
    fn test_replica_follows_scope() {
        let (primary, replica) = pair();
        {
            let scope = primary.begin_scope("test").unwrap();
            let a = scope.element("a").unwrap();
            let fragment = scope
                .parse_fragment(br#"<tl:seq xmlns:tl="http://jackjansen.nl/timelines" xml:id="b" />"#)
                .unwrap();
            scope.append(a, fragment).unwrap();
            let s = scope.element("s").unwrap();
            scope.set_attribute(s, QName::tl("dur"), "3").unwrap();
            scope.commit();
        }
        assert_eq!(primary.to_xml().unwrap(), replica.to_xml().unwrap());
        assert_eq!(replica.attribute("s", &QName::tl("dur")).unwrap().as_deref(), Some("3"));
        assert!(replica.has_id("b"));
    }

    #[test]
    fn test_dropped_scope_is_forwarded() {
        let (primary, replica) = pair();
        {
            let scope = primary.begin_scope("test").unwrap();
            let s = scope.element("s").unwrap();
            scope.remove(s).unwrap();
        }
        assert!(!replica.has_id("s"));
    }

    #[test]
    fn test_replay_failure_leaves_primary_alone() {
        let (primary, replica) = pair();
        replica.load_xml(br#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" />"#).unwrap();
        {
            let scope = primary.begin_scope("test").unwrap();
            let s = scope.element("s").unwrap();
            scope.remove(s).unwrap();
            scope.commit();
        }
        assert!(!primary.has_id("s"));
        assert!(replica.last_error().is_none());
        assert!(replica.is_diverged());
    }

    #[test]
    fn test_partial_replay_is_rolled_back() {
        let (primary, replica) = pair();
        let downstream = Arc::new(Document::new("downstream"));
        downstream.load_xml(DOC.as_bytes()).unwrap();
        replica.set_forward_handler(Some(downstream.clone()));

        // The replica already lost "s", so the second operation cannot land
        {
            let scope = replica.begin_scope("local").unwrap();
            let s = scope.element("s").unwrap();
            scope.remove(s).unwrap();
        }
        downstream.load_xml(DOC.as_bytes()).unwrap();
        let before = replica.to_xml().unwrap();

        {
            let scope = primary.begin_scope("test").unwrap();
            let a = scope.element("a").unwrap();
            scope.set_attribute(a, QName::tl("prio"), "high").unwrap();
            let s = scope.element("s").unwrap();
            scope.set_attribute(s, QName::tl("dur"), "3").unwrap();
            scope.commit();
        }

        assert_eq!(primary.attribute("a", &QName::tl("prio")).unwrap().as_deref(), Some("high"));
        assert!(replica.is_diverged());
        assert_eq!(replica.to_xml().unwrap(), before);
        assert_eq!(replica.attribute("a", &QName::tl("prio")).unwrap(), None);
        assert_eq!(downstream.attribute("a", &QName::tl("prio")).unwrap(), None);
        assert!(downstream.has_id("s"));

        replica.load_xml(DOC.as_bytes()).unwrap();
        assert!(!replica.is_diverged());
    }
}
