//! # Push Pump
//!
//! A background task that relays document notifications to socket rooms.
//! The document side only ever calls [`PushPump::push`], which never blocks:
//! when the bounded channel is full the message is dropped with a warning.
//!
//! ```text
//! ServeLayer ──try_send──▶ mpsc (bounded) ──▶ PumpTask ──▶ broadcast ──▶ room subscribers
//!                                                ▲
//!                              watch (stop) ─────┘
//! ```
//!
//! Rooms per document:
//!
//! - `<id>`: event listings for trigger tools
//! - `toTimelines-<id>`: generation batches for timeline services
//! - `toBackend-<id>`: status reports flowing back into the document

use crate::error::{ServeError, ServeResult};
use crate::listener::GenerationBatch;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use timeline_editor::EventListing;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const CHANNEL: &str = "/trigger";

pub const BROADCAST_UPDATES: &str = "BROADCAST_UPDATES";
pub const BROADCAST_EVENTS: &str = "BROADCAST_EVENTS";
pub const STATUS: &str = "STATUS";

pub fn frontend_room(document_id: &str) -> String {
    document_id.to_string()
}

pub fn updates_room(document_id: &str) -> String {
    format!("toBackend-{}", document_id)
}

pub fn modifications_room(document_id: &str) -> String {
    format!("toTimelines-{}", document_id)
}

/// Where a peer should connect to exchange messages for one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionInfo {
    pub channel: String,
    pub room: String,
}

impl ConnectionInfo {
    pub fn new(room: String) -> Self {
        Self {
            channel: CHANNEL.to_string(),
            room,
        }
    }
}

/// Outbound notification queued by the serve layer
#[derive(Debug, Clone)]
pub enum PushMessage {
    Modifications { document_id: String, batch: GenerationBatch },
    Events { document_id: String, listing: EventListing },
}

impl PushMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            PushMessage::Modifications { .. } => "modifications",
            PushMessage::Events { .. } => "events",
        }
    }

    fn into_room_message(self) -> ServeResult<RoomMessage> {
        Ok(match self {
            PushMessage::Modifications { document_id, batch } => RoomMessage {
                room: modifications_room(&document_id),
                event: BROADCAST_UPDATES.to_string(),
                payload: serde_json::to_value(&batch)?,
            },
            PushMessage::Events { document_id, listing } => RoomMessage {
                room: frontend_room(&document_id),
                event: BROADCAST_EVENTS.to_string(),
                payload: serde_json::to_value(&listing)?,
            },
        })
    }
}

/// A message as it appears in a socket room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomMessage {
    pub room: String,
    pub event: String,
    pub payload: Value,
}

/// Handle used by the document side
pub struct PushPump {
    sender: mpsc::Sender<PushMessage>,
    rooms: broadcast::Sender<RoomMessage>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// The receiving half; [`PumpTask::run`] is the task body
pub struct PumpTask {
    receiver: mpsc::Receiver<PushMessage>,
    rooms: broadcast::Sender<RoomMessage>,
    stop: watch::Receiver<bool>,
}

impl PushPump {
    /// Create both halves without starting the task
    pub fn channel(capacity: usize) -> (Self, PumpTask) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (rooms, _) = broadcast::channel(capacity);
        let (stop, stop_rx) = watch::channel(false);
        let pump = Self {
            sender,
            rooms: rooms.clone(),
            stop,
            task: Mutex::new(None),
        };
        let task = PumpTask {
            receiver,
            rooms,
            stop: stop_rx,
        };
        (pump, task)
    }

    /// Start the pump on the current tokio runtime
    pub fn spawn(capacity: usize) -> Self {
        let (pump, task) = Self::channel(capacity);
        let handle = tokio::spawn(task.run());
        *pump.task.lock() = Some(handle);
        pump
    }

    /// Queue a message without waiting
    pub fn push(&self, message: PushMessage) -> ServeResult<()> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                let kind = message.kind();
                warn!(kind, "push channel full, dropping message");
                Err(ServeError::ChannelFull { kind })
            }
            Err(TrySendError::Closed(_)) => Err(ServeError::Stopped),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.rooms.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Signal the task to stop and wait for it
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "push pump task failed");
            }
        }
    }
}

impl PumpTask {
    pub async fn run(self) {
        let PumpTask {
            mut receiver,
            rooms,
            mut stop,
        } = self;
        info!("push pump started");
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                message = receiver.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    relay(&rooms, message);
                }
            }
        }
        receiver.close();
        info!("push pump stopped");
    }
}

fn relay(rooms: &broadcast::Sender<RoomMessage>, message: PushMessage) {
    let kind = message.kind();
    match message.into_room_message() {
        Ok(message) => {
            debug!(kind, room = %message.room, "relaying");
            if rooms.send(message).is_err() {
                debug!(kind, "no room subscribers");
            }
        }
        Err(e) => error!(kind, error = %e, "cannot encode push message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline_editor::RemoteStatus;

    fn batch(generation: u64) -> PushMessage {
        PushMessage::Modifications {
            document_id: "doc".into(),
            batch: GenerationBatch::new(generation, Vec::new()),
        }
    }

    #[test]
    fn test_room_names() {
        assert_eq!(frontend_room("d1"), "d1");
        assert_eq!(updates_room("d1"), "toBackend-d1");
        assert_eq!(modifications_room("d1"), "toTimelines-d1");
    }

    #[test]
    fn test_full_channel_drops() {
        let (pump, _task) = PushPump::channel(1);
        pump.push(batch(1)).unwrap();
        let err = pump.push(batch(2)).unwrap_err();
        assert!(matches!(err, ServeError::ChannelFull { kind: "modifications" }));
    }

    #[test]
    fn test_closed_channel() {
        let (pump, task) = PushPump::channel(4);
        drop(task);
        assert!(!pump.is_running());
        assert!(matches!(pump.push(batch(1)), Err(ServeError::Stopped)));
    }

    #[tokio::test]
    async fn test_relays_to_rooms() {
        let pump = PushPump::spawn(8);
        let mut rooms = pump.subscribe();

        pump.push(batch(3)).unwrap();
        pump.push(PushMessage::Events {
            document_id: "doc".into(),
            listing: EventListing {
                remote: RemoteStatus::default(),
                events: Vec::new(),
            },
        })
        .unwrap();

        let first = rooms.recv().await.unwrap();
        assert_eq!(first.room, "toTimelines-doc");
        assert_eq!(first.event, BROADCAST_UPDATES);
        assert_eq!(first.payload["generation"], 3);

        let second = rooms.recv().await.unwrap();
        assert_eq!(second.room, "doc");
        assert_eq!(second.event, BROADCAST_EVENTS);
        assert_eq!(second.payload["remote"]["active"], false);

        pump.shutdown().await;
        assert!(!pump.is_running());
    }
}
