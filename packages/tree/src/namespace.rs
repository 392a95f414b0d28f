//! # Namespaces
//!
//! Qualified names and the prefix table that maps them to and from the
//! `prefix:local` form used in path expressions and serialized output.
//!
//! The table is built once (see [`NamespaceTable::standard`]) and handed to
//! every store. Documents may declare extra prefixes; those are registered on
//! the store's own copy while parsing.

use std::collections::BTreeMap;
use std::fmt;

pub const NS_TIMELINE: &str = "http://jackjansen.nl/timelines";
pub const NS_TIMELINE_INTERNAL: &str = "http://jackjansen.nl/timelines/internal";
pub const NS_TIMELINE_CHECK: &str = "http://jackjansen.nl/timelines/check";
pub const NS_2IMMERSE: &str = "http://jackjansen.nl/2immerse";
pub const NS_2IMMERSE_COMPONENT: &str = "http://jackjansen.nl/2immerse/component";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";
pub const NS_TRIGGER: &str = "http://jackjansen.nl/2immerse/livetrigger";
pub const NS_AUTH: &str = "http://jackjansen.nl/2immerse/authoring";

/// Element or attribute name: optional namespace URI plus local part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QName {
    pub ns: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(ns: &str, local: impl Into<String>) -> Self {
        Self {
            ns: Some(ns.to_string()),
            local: local.into(),
        }
    }

    /// Name without a namespace
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self {
            ns: None,
            local: local.into(),
        }
    }

    pub fn tl(local: &str) -> Self {
        Self::new(NS_TIMELINE, local)
    }

    pub fn tls(local: &str) -> Self {
        Self::new(NS_TIMELINE_INTERNAL, local)
    }

    pub fn tt(local: &str) -> Self {
        Self::new(NS_TRIGGER, local)
    }

    pub fn tim(local: &str) -> Self {
        Self::new(NS_2IMMERSE, local)
    }

    pub fn au(local: &str) -> Self {
        Self::new(NS_AUTH, local)
    }

    pub fn xml(local: &str) -> Self {
        Self::new(NS_XML, local)
    }

    /// `xml:id`, the identity attribute
    pub fn xml_id() -> Self {
        Self::xml("id")
    }

    pub fn in_namespace(&self, uri: &str) -> bool {
        self.ns.as_deref() == Some(uri)
    }

    /// Parse Clark notation (`{uri}local`) or a bare local name.
    pub fn from_clark(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix('{') {
            if let Some((uri, local)) = rest.split_once('}') {
                return Self::new(uri, local);
            }
        }
        Self::unqualified(name)
    }
}

/// Clark notation
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Bidirectional prefix ↔ URI table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceTable {
    by_prefix: BTreeMap<String, String>,
    by_uri: BTreeMap<String, String>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The prefixes every timeline document is expected to use
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("xml", NS_XML);
        table.register("tl", NS_TIMELINE);
        table.register("tls", NS_TIMELINE_INTERNAL);
        table.register("tlcheck", NS_TIMELINE_CHECK);
        table.register("tim", NS_2IMMERSE);
        table.register("tic", NS_2IMMERSE_COMPONENT);
        table.register("tt", NS_TRIGGER);
        table.register("au", NS_AUTH);
        table
    }

    /// Bind `prefix` to `uri` unless either side is already bound.
    /// Returns the prefix that ends up bound to `uri`.
    pub fn register(&mut self, prefix: &str, uri: &str) -> String {
        if let Some(existing) = self.by_uri.get(uri) {
            return existing.clone();
        }
        let prefix = if prefix.is_empty() || self.by_prefix.contains_key(prefix) {
            self.unused_prefix()
        } else {
            prefix.to_string()
        };
        self.by_prefix.insert(prefix.clone(), uri.to_string());
        self.by_uri.insert(uri.to_string(), prefix.clone());
        prefix
    }

    fn unused_prefix(&self) -> String {
        (0..)
            .map(|n| format!("ns{}", n))
            .find(|p| !self.by_prefix.contains_key(p))
            .unwrap_or_default()
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn prefix(&self, uri: &str) -> Option<&str> {
        self.by_uri.get(uri).map(String::as_str)
    }

    /// Render as `prefix:local`; falls back to Clark notation for unknown URIs.
    pub fn qualify(&self, name: &QName) -> String {
        match &name.ns {
            None => name.local.clone(),
            Some(uri) => match self.prefix(uri) {
                Some(prefix) => format!("{}:{}", prefix, name.local),
                None => name.to_string(),
            },
        }
    }

    /// Inverse of [`qualify`](Self::qualify). `None` when the prefix is unknown.
    pub fn resolve(&self, name: &str) -> Option<QName> {
        if name.starts_with('{') {
            return Some(QName::from_clark(name));
        }
        match name.split_once(':') {
            Some((prefix, local)) => self.uri(prefix).map(|uri| QName::new(uri, local)),
            None => Some(QName::unqualified(name)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_prefix.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}
