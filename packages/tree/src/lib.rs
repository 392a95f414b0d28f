//! # Timeline Tree
//!
//! In-memory element tree for timeline documents:
//!
//! ```text
//! bytes ──parse──▶ Tree ──TreeStore::new──▶ TreeStore ──serialize──▶ bytes
//!                                             │
//!                            ids / names / namespaces indexes
//! ```
//!
//! Elements are addressed either by identifier (`xml:id`) or by the small
//! path language in [`path`].

pub mod error;
pub mod id_generator;
pub mod namespace;
pub mod node;
pub mod parser;
pub mod path;
pub mod serializer;
pub mod store;

pub use error::{ParseError, ParseResult, PathError, PathResult, StoreError, StoreResult};
pub use namespace::{
    NamespaceTable, QName, NS_2IMMERSE, NS_2IMMERSE_COMPONENT, NS_AUTH, NS_TIMELINE, NS_TIMELINE_CHECK,
    NS_TIMELINE_INTERNAL, NS_TRIGGER, NS_XML,
};
pub use node::{Attributes, Node, NodeKey, Tree};
pub use parser::parse;
pub use path::{path_of, split_attribute_path, PathExpr};
pub use serializer::{serialize_document, serialize_fragment, Serializer, XML_DECLARATION};
pub use store::TreeStore;
