use crate::namespace::{NamespaceTable, QName, NS_XML};
use crate::node::{NodeKey, Tree};
use quick_xml::escape::escape;
use std::collections::BTreeMap;

pub const XML_DECLARATION: &str = "<?xml version='1.0' encoding='utf-8'?>\n";

/// Serializer converts a tree (or one subtree of it) back to XML text
///
/// Output is deterministic: attributes come out in name order and every
/// namespace used anywhere in the serialized subtree is declared once on its
/// top element, sorted by prefix. A serialized subtree is therefore
/// self-contained and can be parsed on its own by a replica.
pub struct Serializer<'a> {
    namespaces: &'a NamespaceTable,
    prefixes: BTreeMap<String, String>,
}

impl<'a> Serializer<'a> {
    pub fn new(namespaces: &'a NamespaceTable) -> Self {
        Self {
            namespaces,
            prefixes: BTreeMap::new(),
        }
    }

    /// Serialize the subtree rooted at `key`, without its tail
    pub fn serialize(&mut self, tree: &Tree, key: NodeKey) -> String {
        self.collect_prefixes(tree, key);
        let mut output = String::new();
        self.write_element(tree, key, true, &mut output);
        output
    }

    /// Serialize a whole tree with the XML declaration in front
    pub fn serialize_document(&mut self, tree: &Tree) -> String {
        let mut output = String::from(XML_DECLARATION);
        output.push_str(&self.serialize(tree, tree.root()));
        output
    }

    fn collect_prefixes(&mut self, tree: &Tree, key: NodeKey) {
        self.prefixes.clear();
        let mut uris: Vec<String> = Vec::new();
        for k in tree.descendants(key) {
            let node = &tree[k];
            uris.extend(node.name.ns.iter().cloned());
            uris.extend(node.attributes.keys().filter_map(|name| name.ns.clone()));
        }
        uris.sort();
        uris.dedup();

        let mut generated = 0;
        for uri in uris {
            if uri == NS_XML {
                continue;
            }
            let prefix = match self.namespaces.prefix(&uri) {
                Some(prefix) => prefix.to_string(),
                None => loop {
                    let candidate = format!("ns{}", generated);
                    generated += 1;
                    if self.namespaces.uri(&candidate).is_none() {
                        break candidate;
                    }
                },
            };
            self.prefixes.insert(uri, prefix);
        }
    }

    fn qualified(&self, name: &QName) -> String {
        match &name.ns {
            None => name.local.clone(),
            Some(uri) if uri == NS_XML => format!("xml:{}", name.local),
            Some(uri) => match self.prefixes.get(uri) {
                Some(prefix) => format!("{}:{}", prefix, name.local),
                None => name.local.clone(),
            },
        }
    }

    fn write_element(&self, tree: &Tree, key: NodeKey, top: bool, output: &mut String) {
        let node = &tree[key];
        let tag = self.qualified(&node.name);
        output.push('<');
        output.push_str(&tag);

        if top {
            let mut declarations: Vec<(&String, &String)> =
                self.prefixes.iter().map(|(uri, prefix)| (prefix, uri)).collect();
            declarations.sort();
            for (prefix, uri) in declarations {
                output.push_str(" xmlns:");
                output.push_str(prefix);
                output.push_str("=\"");
                output.push_str(&escape(uri.as_str()));
                output.push('"');
            }
        }

        for (name, value) in &node.attributes {
            output.push(' ');
            output.push_str(&self.qualified(name));
            output.push_str("=\"");
            output.push_str(&escape(value.as_str()));
            output.push('"');
        }

        let text = node.text.as_deref().unwrap_or("");
        if text.is_empty() && node.children().is_empty() {
            output.push_str(" />");
            return;
        }
        output.push('>');
        output.push_str(&escape(text));

        for child in node.children() {
            self.write_element(tree, *child, false, output);
            if let Some(tail) = &tree[*child].tail {
                output.push_str(&escape(tail.as_str()));
            }
        }

        output.push_str("</");
        output.push_str(&tag);
        output.push('>');
    }
}

/// Serialize the subtree at `key` as a self-contained fragment
pub fn serialize_fragment(tree: &Tree, key: NodeKey, namespaces: &NamespaceTable) -> String {
    Serializer::new(namespaces).serialize(tree, key)
}

/// Serialize a whole tree as a document
pub fn serialize_document(tree: &Tree, namespaces: &NamespaceTable) -> String {
    Serializer::new(namespaces).serialize_document(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const DOC: &str = r#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" xmlns:tt="http://jackjansen.nl/2immerse/livetrigger"><tl:par tt:name="a &lt; b" xml:id="p1">x<tl:sleep tl:dur="1" />y</tl:par></tl:document>"#;

    #[test]
    fn test_serialize_document() {
        let mut ns = NamespaceTable::standard();
        let tree = parse(DOC.as_bytes(), &mut ns).unwrap();
        let output = serialize_document(&tree, &ns);
        assert_eq!(output, format!("{}{}", XML_DECLARATION, DOC));
    }

    #[test]
    fn test_fragment_declares_only_used_namespaces() {
        let mut ns = NamespaceTable::standard();
        let tree = parse(DOC.as_bytes(), &mut ns).unwrap();
        let par = tree.children(tree.root())[0];
        let sleep = tree.children(par)[0];

        let fragment = serialize_fragment(&tree, sleep, &ns);
        assert_eq!(
            fragment,
            r#"<tl:sleep xmlns:tl="http://jackjansen.nl/timelines" tl:dur="1" />"#
        );

        // the fragment parses on its own
        let mut other = NamespaceTable::new();
        let reparsed = parse(fragment.as_bytes(), &mut other).unwrap();
        assert_eq!(reparsed[reparsed.root()].attribute(&QName::tl("dur")), Some("1"));
    }
}
