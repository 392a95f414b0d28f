//! # Timeline Serve
//!
//! Everything a document needs to talk to the outside world without the
//! outside world touching the document.
//!
//! ```text
//! Document ──ScopePublisher──▶ ServeLayer ──▶ History (generation → operations)
//!                                  │
//!                                  ├──▶ PushListener (callbacks, first success wants state)
//!                                  │
//!                                  └──▶ PushPump ──▶ socket rooms
//! ```
//!
//! Every committed scope gets the next generation number. Scopes without
//! operations still advance the counter and are kept as placeholders, so
//! [`ServeLayer::history_since`] always returns a contiguous run.

mod error;
mod history;
mod layer;
mod listener;
mod pump;

pub use error::{ServeError, ServeResult};
pub use history::{GenerationEntry, History};
pub use layer::{ServeConfig, ServeLayer};
pub use listener::{CallbackListener, GenerationBatch, PushListener};
pub use pump::{
    frontend_room, modifications_room, updates_room, ConnectionInfo, PumpTask, PushMessage, PushPump, RoomMessage,
    BROADCAST_EVENTS, BROADCAST_UPDATES, CHANNEL, STATUS,
};
