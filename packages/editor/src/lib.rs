//! # Timeline Editor
//!
//! Live editing engine for timeline/trigger documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ tree: XML → indexed TreeStore               │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document lifecycle + edit scopes    │
//! │  - Load/save documents                      │
//! │  - Trigger, enqueue and modify events       │
//! │  - Record every structural edit             │
//! │  - Replay into a replica document           │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ serve: generations, history, push listeners │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **The tree is the state**: lifecycle, clocks and names are attributes
//! 2. **One scope at a time**: a document is edited by one scope at a time
//! 3. **Structural operations**: insert, delete and attribute change only
//! 4. **Replicas replay**: a replica applies the same operations through its own scope
//!
//! ## Usage
//!
//! ```rust,ignore
//! use timeline_editor::{Document, ParameterValue};
//!
//! let doc = Document::new("match");
//! doc.load("match.xml")?;
//!
//! // Instantiate an event with a parameter
//! let id = doc.events().trigger("goal", &[ParameterValue::new("./tl:sleep/@tl:dur", "42")])?;
//!
//! // What the trigger tool shows
//! let listing = doc.events().list_events()?;
//!
//! doc.save("match.out.xml")?;
//! ```

mod authoring;
mod avt;
mod clock;
mod document;
mod errors;
mod events;
mod forwarder;
mod operations;
mod recorder;
mod remote;
mod session;
mod settings;
mod xml;

pub use authoring::{AreaInfo, AssetInfo, Authoring, ChapterInfo, DeviceInfo, ElementInfo, LayoutInfo, RegionInfo, TrackInfo};
pub use avt::{has_template, substitute, AvtContext};
pub use clock::{ClockSource, ManualClock, PausableClock, SystemClock};
pub use document::Document;
pub use errors::{DocumentError, DocumentResult};
pub use events::{EventDescription, EventListing, EventState, Events, OptionItem, ParameterDescription, ParameterValue};
pub use forwarder::{ForwardHandler, ScopePublisher};
pub use operations::{decode_attributes, encode_attributes, InsertPosition, Operation};
pub use recorder::EditRecorder;
pub use remote::{DocumentStatus, ElementState, LiveInfo, Remote, RemoteStatus};
pub use session::EditScope;
pub use settings::{read_settings, Settings, SettingsUpdate, SettingsView};
pub use xml::XmlView;

// Re-export tree types used in the public API
pub use timeline_tree::{NamespaceTable, QName};
