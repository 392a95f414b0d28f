//! # XML Parser
//!
//! Turns serialized XML into a [`Tree`] using quick-xml's namespace-aware
//! reader. Prefix declarations found along the way are registered in the
//! caller's [`NamespaceTable`] so the same prefixes come back out on save.
//!
//! Only elements, attributes and character data are kept. Comments,
//! processing instructions and the doctype are dropped.

use crate::error::{ParseError, ParseResult};
use crate::namespace::{NamespaceTable, QName, NS_XML};
use crate::node::{Node, NodeKey, Tree};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, PrefixDeclaration, ResolveResult};
use quick_xml::NsReader;

/// Parse a complete document or a single-rooted fragment
pub fn parse(data: &[u8], namespaces: &mut NamespaceTable) -> ParseResult<Tree> {
    let mut reader = NsReader::from_reader(data);
    let mut buf = Vec::new();
    let mut tree: Option<Tree> = None;
    let mut open: Vec<NodeKey> = Vec::new();

    loop {
        let pos = reader.buffer_position() as u64;
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| ParseError::syntax(pos, e.to_string()))?;
        let element_ns = bound_uri(resolved)?;

        match event {
            Event::Start(_) | Event::Empty(_) if tree.is_some() && open.is_empty() => {
                return Err(ParseError::MultipleRoots { pos });
            }
            Event::Start(start) => {
                let node = read_element(&reader, &start, element_ns, namespaces)?;
                let key = attach(&mut tree, &open, node)?;
                open.push(key);
            }
            Event::Empty(start) => {
                let node = read_element(&reader, &start, element_ns, namespaces)?;
                attach(&mut tree, &open, node)?;
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ParseError::syntax(pos, e.to_string()))?;
                add_character_data(&mut tree, &open, &text);
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                add_character_data(&mut tree, &open, &String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !open.is_empty() {
        return Err(ParseError::UnexpectedEof {
            pos: reader.buffer_position() as u64,
        });
    }
    tree.ok_or(ParseError::Empty)
}

fn bound_uri(resolved: ResolveResult) -> ParseResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Ok(Some(String::from_utf8_lossy(uri).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Ok(Some(NS_XML.to_string())),
        ResolveResult::Unknown(prefix) => Err(ParseError::unbound_prefix(&prefix)),
    }
}

fn read_element(
    reader: &NsReader<&[u8]>,
    start: &BytesStart,
    ns: Option<String>,
    namespaces: &mut NamespaceTable,
) -> ParseResult<Node> {
    let pos = reader.buffer_position() as u64;
    let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut node = Node::new(QName { ns, local });

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::syntax(pos, e.to_string()))?;
        if let Some(binding) = attr.key.as_namespace_binding() {
            let uri = String::from_utf8_lossy(&attr.value).into_owned();
            if uri.is_empty() {
                continue;
            }
            match binding {
                PrefixDeclaration::Default => namespaces.register("", &uri),
                PrefixDeclaration::Named(prefix) => {
                    namespaces.register(&String::from_utf8_lossy(prefix), &uri)
                }
            };
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let ns = bound_uri(resolved)?;
        let local = String::from_utf8_lossy(local.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::syntax(pos, e.to_string()))?
            .into_owned();
        node.attributes.insert(QName { ns, local }, value);
    }
    Ok(node)
}

fn attach(tree: &mut Option<Tree>, open: &[NodeKey], node: Node) -> ParseResult<NodeKey> {
    if tree.is_none() {
        let new_tree = Tree::new(node);
        let root = new_tree.root();
        *tree = Some(new_tree);
        return Ok(root);
    }
    match (tree.as_mut(), open.last()) {
        (Some(t), Some(parent)) => t
            .append_child(*parent, node)
            .map_err(|e| ParseError::syntax(0, e.to_string())),
        _ => Err(ParseError::MultipleRoots { pos: 0 }),
    }
}

/// Text goes to the open element if it has no children yet, otherwise to
/// the tail of its last child. Anything outside the root is dropped.
fn add_character_data(tree: &mut Option<Tree>, open: &[NodeKey], data: &str) {
    let (Some(tree), Some(current)) = (tree.as_mut(), open.last()) else {
        return;
    };
    let target = match tree.children(*current).last().copied() {
        Some(last) => &mut tree[last].tail,
        None => &mut tree[*current].text,
    };
    match target {
        Some(existing) => existing.push_str(data),
        None => *target = Some(data.to_string()),
    }
}
