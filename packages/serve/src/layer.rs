use crate::error::ServeResult;
use crate::history::{GenerationEntry, History};
use crate::listener::{GenerationBatch, PushListener};
use crate::pump::{modifications_room, updates_room, ConnectionInfo, PushMessage, PushPump, RoomMessage, STATUS};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use timeline_editor::{Document, DocumentStatus, EventListing, Operation, ScopePublisher};
use tracing::{debug, info, warn};

/// Serve layer tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServeConfig {
    /// Generations kept for late joiners; unlimited when absent
    #[serde(default)]
    pub history_limit: Option<usize>,

    /// Capacity of the push pump channel
    #[serde(default = "default_push_capacity")]
    pub push_capacity: usize,
}

fn default_push_capacity() -> usize {
    100
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            history_limit: None,
            push_capacity: default_push_capacity(),
        }
    }
}

struct ServeState {
    history: History,
    listeners: Vec<Arc<dyn PushListener>>,
}

/// Numbers every committed scope of one document and fans the result out to
/// push listeners and the push pump.
pub struct ServeLayer {
    state: Mutex<ServeState>,
    pump: Option<Arc<PushPump>>,
    document: RwLock<Weak<Document>>,
}

impl ServeLayer {
    pub fn new(config: &ServeConfig) -> Self {
        Self {
            state: Mutex::new(ServeState {
                history: History::new(config.history_limit),
                listeners: Vec::new(),
            }),
            pump: None,
            document: RwLock::new(Weak::new()),
        }
    }

    pub fn with_pump(mut self, pump: Arc<PushPump>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Become the publisher of `document`
    pub fn attach(self: &Arc<Self>, document: &Arc<Document>) {
        *self.document.write() = Arc::downgrade(document);
        document.set_publisher(Some(self.clone()));
        info!(document = %document.id(), "serve layer attached");
    }

    fn document(&self) -> Option<Arc<Document>> {
        self.document.read().upgrade()
    }

    pub fn pump(&self) -> Option<&Arc<PushPump>> {
        self.pump.as_ref()
    }

    /// Most recent generation, 0 before the first scope
    pub fn generation(&self) -> u64 {
        self.state.lock().history.latest()
    }

    /// Every retained generation after `since`, in order
    pub fn history_since(&self, since: u64) -> Vec<GenerationEntry> {
        self.state.lock().history.since(since)
    }

    /// Returns false when the endpoint was already registered
    pub fn add_listener(&self, listener: Arc<dyn PushListener>) -> bool {
        let mut state = self.state.lock();
        if state.listeners.iter().any(|l| l.endpoint() == listener.endpoint()) {
            return false;
        }
        info!(listener = listener.endpoint(), "listener added");
        state.listeners.push(listener);
        true
    }

    pub fn remove_listener(&self, endpoint: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.endpoint() != endpoint);
        before != state.listeners.len()
    }

    pub fn listeners(&self) -> Vec<String> {
        self.state
            .lock()
            .listeners
            .iter()
            .map(|l| l.endpoint().to_string())
            .collect()
    }

    /// Where status reports for `document_id` are expected
    pub fn incoming_connection_info(&self, document_id: &str) -> ConnectionInfo {
        ConnectionInfo::new(updates_room(document_id))
    }

    /// Where generation batches for `document_id` are published
    pub fn outgoing_connection_info(&self, document_id: &str) -> ConnectionInfo {
        ConnectionInfo::new(modifications_room(document_id))
    }

    /// Assign the next generation to one committed scope and deliver it.
    /// Listeners that fail are removed once the batch has been offered to
    /// everyone.
    pub fn forward(&self, document_id: &str, operations: &[Operation]) -> u64 {
        let (generation, listeners) = {
            let mut state = self.state.lock();
            let generation = state.history.record(operations.to_vec());
            (generation, state.listeners.clone())
        };
        if operations.is_empty() {
            debug!(document = %document_id, generation, "empty generation");
        } else {
            info!(
                document = %document_id,
                generation,
                operations = operations.len(),
                listeners = listeners.len(),
                "forwarding generation"
            );
        }

        let batch = GenerationBatch::new(generation, operations.to_vec());
        if let Some(pump) = &self.pump {
            let message = PushMessage::Modifications {
                document_id: document_id.to_string(),
                batch: batch.clone(),
            };
            if let Err(e) = pump.push(message) {
                warn!(document = %document_id, generation, error = %e, "generation not pushed");
            }
        }

        let flagged = GenerationBatch {
            want_state_updates: Some(true),
            ..batch.clone()
        };
        let mut want_state_updates = true;
        let mut failed = Vec::new();
        for listener in &listeners {
            let outgoing = if want_state_updates { &flagged } else { &batch };
            match listener.deliver(outgoing) {
                Ok(()) => want_state_updates = false,
                Err(e) => {
                    warn!(listener = listener.endpoint(), generation, error = %e, "delivery failed");
                    failed.push(listener.endpoint().to_string());
                }
            }
            if operations.is_empty() && !want_state_updates {
                break;
            }
        }

        if !failed.is_empty() {
            self.state
                .lock()
                .listeners
                .retain(|l| !failed.iter().any(|endpoint| endpoint == l.endpoint()));
            for endpoint in &failed {
                info!(listener = %endpoint, "listener removed");
            }
            if let Some(document) = self.document() {
                document.set_error("Error communicating to timeline service");
            }
        }
        generation
    }

    /// Handle a message arriving on a document's backend room. Returns
    /// whether it was a status report for the attached document.
    pub fn handle_room_message(&self, message: &RoomMessage) -> ServeResult<bool> {
        let Some(document) = self.document() else {
            return Ok(false);
        };
        if message.event != STATUS || message.room != updates_room(&document.id()) {
            return Ok(false);
        }
        let status: DocumentStatus = serde_json::from_value(message.payload.clone())?;
        document.remote().apply_status(&status)?;
        Ok(true)
    }
}

impl ScopePublisher for ServeLayer {
    fn publish_scope(&self, document_id: &str, operations: &[Operation]) {
        self.forward(document_id, operations);
    }

    fn publish_events(&self, document_id: &str, listing: &EventListing) {
        let Some(pump) = &self.pump else {
            return;
        };
        let message = PushMessage::Events {
            document_id: document_id.to_string(),
            listing: listing.clone(),
        };
        if let Err(e) = pump.push(message) {
            warn!(document = %document_id, error = %e, "event listing not pushed");
        }
    }
}
