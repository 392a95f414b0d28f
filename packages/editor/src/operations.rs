//! # Operations
//!
//! The replication vocabulary. A scope records one operation per direct
//! structural edit; a replica replays them through its own primitives.
//!
//! ```json
//! {"verb": "add", "path": "/tl:document/tl:par[1]", "where": "begin", "data": "<tl:par .../>"}
//! {"verb": "delete", "path": "/tl:document/tl:par[1]/tl:par[2]"}
//! {"verb": "change", "path": "/tl:document/tl:par[1]", "attrs": {"xml:id": "main"}}
//! ```
//!
//! Paths are absolute and computed against the tree as it was when the
//! operation was recorded, so replay must happen in order.

use crate::errors::{DocumentError, DocumentResult};
use crate::session::EditScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use timeline_tree::{Attributes, NamespaceTable};

/// Where a new subtree goes relative to the addressed element
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    /// First child
    Begin,
    /// Last child
    End,
    /// Preceding sibling
    Before,
    /// Following sibling
    After,
    /// Takes the element's place
    Replace,
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InsertPosition::Begin => "begin",
            InsertPosition::End => "end",
            InsertPosition::Before => "before",
            InsertPosition::After => "after",
            InsertPosition::Replace => "replace",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for InsertPosition {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "begin" => Ok(InsertPosition::Begin),
            "end" => Ok(InsertPosition::End),
            "before" => Ok(InsertPosition::Before),
            "after" => Ok(InsertPosition::After),
            "replace" => Ok(InsertPosition::Replace),
            other => Err(DocumentError::invalid(format!("Unknown relative position {}", other))),
        }
    }
}

/// One recorded structural edit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verb")]
pub enum Operation {
    /// Insert a serialized subtree relative to the element at `path`
    #[serde(rename = "add")]
    Insert {
        path: String,
        #[serde(rename = "where")]
        position: InsertPosition,
        data: String,
    },

    /// Remove the element at `path` and everything below it
    #[serde(rename = "delete")]
    Delete { path: String },

    /// Replace the complete attribute map of the element at `path`
    #[serde(rename = "change")]
    AttributeChange {
        path: String,
        attrs: BTreeMap<String, String>,
    },
}

impl Operation {
    pub fn path(&self) -> &str {
        match self {
            Operation::Insert { path, .. } | Operation::Delete { path } | Operation::AttributeChange { path, .. } => {
                path
            }
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "add",
            Operation::Delete { .. } => "delete",
            Operation::AttributeChange { .. } => "change",
        }
    }

    /// Replay this operation inside an open edit scope
    pub fn apply(&self, scope: &EditScope<'_>) -> DocumentResult<()> {
        match self {
            Operation::Insert { path, position, data } => {
                let anchor = scope.resolve(path)?;
                let subtree = scope.parse_fragment(data.as_bytes())?;
                scope.place(anchor, *position, subtree)?;
                Ok(())
            }

            Operation::Delete { path } => {
                let key = scope.resolve(path)?;
                scope.remove(key)?;
                Ok(())
            }

            Operation::AttributeChange { path, attrs } => {
                let key = scope.resolve(path)?;
                let attributes = scope.read(|store| decode_attributes(store.namespaces(), attrs))??;
                scope.replace_attributes(key, attributes)
            }
        }
    }
}

/// Attribute map keyed by `prefix:local` names
pub fn encode_attributes(namespaces: &NamespaceTable, attributes: &Attributes) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|(name, value)| (namespaces.qualify(name), value.clone()))
        .collect()
}

/// Inverse of [`encode_attributes`]
pub fn decode_attributes(namespaces: &NamespaceTable, attrs: &BTreeMap<String, String>) -> DocumentResult<Attributes> {
    attrs
        .iter()
        .map(|(name, value)| {
            namespaces
                .resolve(name)
                .map(|qname| (qname, value.clone()))
                .ok_or_else(|| DocumentError::invalid(format!("Unknown namespace prefix in attribute {}", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline_tree::QName;

    #[test]
    fn test_operation_wire_shape() {
        let op = Operation::Insert {
            path: "/tl:document/tl:par[1]".to_string(),
            position: InsertPosition::After,
            data: "<tl:sleep />".to_string(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["verb"], "add");
        assert_eq!(json["where"], "after");

        let delete: Operation = serde_json::from_str(r#"{"verb":"delete","path":"/a/b[2]"}"#).unwrap();
        assert_eq!(delete, Operation::Delete { path: "/a/b[2]".to_string() });
        assert_eq!(delete.verb(), "delete");

        assert!(serde_json::from_str::<Operation>(r#"{"verb":"explode","path":"/a"}"#).is_err());
    }

    #[test]
    fn test_attribute_encoding() {
        let ns = NamespaceTable::standard();
        let mut attributes = Attributes::new();
        attributes.insert(QName::tt("name"), "Goal".to_string());
        attributes.insert(QName::xml_id(), "goal".to_string());
        attributes.insert(QName::unqualified("plain"), "x".to_string());

        let encoded = encode_attributes(&ns, &attributes);
        assert_eq!(encoded.get("tt:name").map(String::as_str), Some("Goal"));
        assert_eq!(encoded.get("xml:id").map(String::as_str), Some("goal"));
        assert_eq!(decode_attributes(&ns, &encoded).unwrap(), attributes);

        let mut bad = BTreeMap::new();
        bad.insert("zz:thing".to_string(), "1".to_string());
        assert!(decode_attributes(&ns, &bad).is_err());
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("replace".parse::<InsertPosition>().unwrap(), InsertPosition::Replace);
        assert_eq!(InsertPosition::Begin.to_string(), "begin");
        assert!("sideways".parse::<InsertPosition>().is_err());
    }
}
