use crate::error::ServeResult;
use serde::{Deserialize, Serialize};
use timeline_editor::Operation;

/// What a push listener receives for each generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBatch {
    pub generation: u64,
    pub operations: Vec<Operation>,
    /// Set for the first listener that accepts the batch; that one is asked
    /// to report element state back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub want_state_updates: Option<bool>,
}

impl GenerationBatch {
    pub fn new(generation: u64, operations: Vec<Operation>) -> Self {
        Self {
            generation,
            operations,
            want_state_updates: None,
        }
    }
}

/// An outbound endpoint for generation batches. Any error is treated as a
/// transport failure and the listener is dropped.
pub trait PushListener: Send + Sync {
    /// Identifies the listener; registering the same endpoint twice is a no-op
    fn endpoint(&self) -> &str;

    fn deliver(&self, batch: &GenerationBatch) -> ServeResult<()>;
}

/// Listener backed by a closure, for in-process consumers
pub struct CallbackListener<F> {
    endpoint: String,
    callback: F,
}

impl<F> CallbackListener<F>
where
    F: Fn(&GenerationBatch) -> ServeResult<()> + Send + Sync,
{
    pub fn new(endpoint: impl Into<String>, callback: F) -> Self {
        Self {
            endpoint: endpoint.into(),
            callback,
        }
    }
}

impl<F> PushListener for CallbackListener<F>
where
    F: Fn(&GenerationBatch) -> ServeResult<()> + Send + Sync,
{
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn deliver(&self, batch: &GenerationBatch) -> ServeResult<()> {
        (self.callback)(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_json() {
        let mut batch = GenerationBatch::new(7, vec![Operation::Delete { path: "/tl:document/tl:par[1]".into() }]);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["generation"], 7);
        assert_eq!(json["operations"][0]["verb"], "delete");
        assert!(json.get("wantStateUpdates").is_none());

        batch.want_state_updates = Some(true);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["wantStateUpdates"], true);
    }
}
