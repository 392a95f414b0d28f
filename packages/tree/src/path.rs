//! # Path Expressions
//!
//! The addressing subset used throughout the system:
//!
//! ```text
//! /tl:document/tl:par[2]          absolute, positional
//! ./tl:sleep                      relative child
//! .//tt:events/*[@tt:name]        descendant, wildcard, attribute test
//! .//x[@tt:productionId='p-1']    attribute equality
//! .//tt:events/..                 parent
//! ./tl:sleep/@tl:dur              attribute suffix (destinations only)
//! ```
//!
//! Absolute paths start from a synthetic document cursor whose only child is
//! the root element, so `/tl:document` selects the root. A positional
//! predicate `[n]` keeps an element when it is the n-th child of its parent
//! carrying the same tag, which is exactly what [`path_of`] emits.

use crate::error::{PathError, PathResult};
use crate::namespace::{NamespaceTable, QName};
use crate::node::{NodeKey, Tree};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
enum NameTest {
    Any,
    Name(QName),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    HasAttribute(QName),
    AttributeEquals(QName, String),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Current,
    Parent,
    Child(NameTest, Vec<Predicate>),
    Descendant(NameTest, Vec<Predicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Cursor {
    Document,
    Node(NodeKey),
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

impl PathExpr {
    pub fn parse(path: &str, namespaces: &NamespaceTable) -> PathResult<Self> {
        let absolute = path.starts_with('/');
        let body = if absolute { &path[1..] } else { path };
        if body.is_empty() {
            return Err(if absolute {
                PathError::DocumentPath { path: path.to_string() }
            } else {
                PathError::syntax(path, "empty path")
            });
        }

        let mut steps = Vec::new();
        let mut descendant = false;
        let segments = split_segments(path, body)?;
        let last = segments.len() - 1;
        for (i, segment) in segments.into_iter().enumerate() {
            if segment.is_empty() {
                if descendant || i == last {
                    return Err(PathError::syntax(path, "empty step"));
                }
                descendant = true;
                continue;
            }
            steps.push(parse_step(path, segment, descendant, namespaces)?);
            descendant = false;
        }

        Ok(Self {
            source: path.to_string(),
            absolute,
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// All matching elements in document order. Relative paths are
    /// evaluated against `context`, absolute ones against the document.
    pub fn select(&self, tree: &Tree, context: NodeKey) -> Vec<NodeKey> {
        let mut current = if self.absolute {
            vec![Cursor::Document]
        } else if tree.contains(context) {
            vec![Cursor::Node(context)]
        } else {
            return Vec::new();
        };

        for step in &self.steps {
            let mut next = Vec::new();
            for cursor in &current {
                match step {
                    Step::Current => next.push(*cursor),
                    Step::Parent => {
                        if let Cursor::Node(key) = cursor {
                            match tree.parent(*key) {
                                Some(parent) => next.push(Cursor::Node(parent)),
                                None if self.absolute => next.push(Cursor::Document),
                                None => {}
                            }
                        }
                    }
                    Step::Child(test, predicates) => {
                        let candidates = child_nodes(tree, *cursor);
                        next.extend(filter(tree, candidates, test, predicates));
                    }
                    Step::Descendant(test, predicates) => {
                        let candidates = descendant_nodes(tree, *cursor);
                        next.extend(filter(tree, candidates, test, predicates));
                    }
                }
            }
            current = dedup(next);
        }

        current
            .into_iter()
            .filter_map(|c| match c {
                Cursor::Node(key) => Some(key),
                Cursor::Document => None,
            })
            .collect()
    }

    /// Exactly one match, or an addressing error
    pub fn select_one(&self, tree: &Tree, context: NodeKey) -> PathResult<NodeKey> {
        let matches = self.select(tree, context);
        match matches.len() {
            1 => Ok(matches[0]),
            0 => Err(PathError::NoMatch {
                path: self.source.clone(),
            }),
            count => Err(PathError::Ambiguous {
                path: self.source.clone(),
                count,
            }),
        }
    }
}

fn child_nodes(tree: &Tree, cursor: Cursor) -> Vec<NodeKey> {
    match cursor {
        Cursor::Document => vec![tree.root()],
        Cursor::Node(key) => tree.children(key).to_vec(),
    }
}

fn descendant_nodes(tree: &Tree, cursor: Cursor) -> Vec<NodeKey> {
    match cursor {
        Cursor::Document => tree.descendants(tree.root()),
        Cursor::Node(key) => tree.descendants(key).into_iter().skip(1).collect(),
    }
}

fn filter(tree: &Tree, candidates: Vec<NodeKey>, test: &NameTest, predicates: &[Predicate]) -> Vec<Cursor> {
    candidates
        .into_iter()
        .filter(|key| match test {
            NameTest::Any => true,
            NameTest::Name(name) => tree[*key].name == *name,
        })
        .filter(|key| predicates.iter().all(|p| matches_predicate(tree, *key, p)))
        .map(Cursor::Node)
        .collect()
}

fn matches_predicate(tree: &Tree, key: NodeKey, predicate: &Predicate) -> bool {
    let node = &tree[key];
    match predicate {
        Predicate::HasAttribute(name) => node.attributes.contains_key(name),
        Predicate::AttributeEquals(name, value) => node.attribute(name) == Some(value.as_str()),
        Predicate::Position(n) => same_tag_ordinal(tree, key) == *n,
    }
}

/// 1-based position among siblings with the same tag
pub(crate) fn same_tag_ordinal(tree: &Tree, key: NodeKey) -> usize {
    let Some(parent) = tree.parent(key) else {
        return 1;
    };
    let name = &tree[key].name;
    1 + tree
        .children(parent)
        .iter()
        .take_while(|c| **c != key)
        .filter(|c| tree[**c].name == *name)
        .count()
}

fn dedup(cursors: Vec<Cursor>) -> Vec<Cursor> {
    let mut seen = HashSet::new();
    cursors.into_iter().filter(|c| seen.insert(*c)).collect()
}

/// Split on `/` outside of predicates, quotes and Clark-notation braces
fn split_segments<'p>(path: &str, body: &'p str) -> PathResult<Vec<&'p str>> {
    let mut segments = Vec::new();
    let mut brackets = 0usize;
    let mut braces = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' if brackets > 0 => quote = Some(c),
            '[' => brackets += 1,
            ']' => {
                brackets = brackets
                    .checked_sub(1)
                    .ok_or_else(|| PathError::syntax(path, "unbalanced ]"))?;
            }
            '{' => braces += 1,
            '}' => braces = braces.saturating_sub(1),
            '/' if brackets == 0 && braces == 0 => {
                segments.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || brackets > 0 || braces > 0 {
        return Err(PathError::syntax(path, "unterminated predicate or name"));
    }
    segments.push(&body[start..]);
    Ok(segments)
}

fn parse_step(path: &str, segment: &str, descendant: bool, namespaces: &NamespaceTable) -> PathResult<Step> {
    let (name, predicates) = match segment.find('[') {
        Some(i) if !segment.starts_with('{') || segment[..i].contains('}') => (&segment[..i], &segment[i..]),
        _ => (segment, ""),
    };

    match name {
        "." | ".." if !predicates.is_empty() => {
            return Err(PathError::syntax(path, "predicates on . or .. are not supported"));
        }
        "." if descendant => return Err(PathError::syntax(path, "//. is not supported")),
        "." => return Ok(Step::Current),
        ".." if descendant => return Err(PathError::syntax(path, "//.. is not supported")),
        ".." => return Ok(Step::Parent),
        "" => return Err(PathError::syntax(path, "missing element name")),
        _ => {}
    }
    if name.starts_with('@') {
        return Err(PathError::syntax(path, "attribute steps are only valid as a destination suffix"));
    }

    let test = if name == "*" {
        NameTest::Any
    } else {
        NameTest::Name(resolve_name(path, name, namespaces)?)
    };
    let predicates = parse_predicates(path, predicates, namespaces)?;

    Ok(if descendant {
        Step::Descendant(test, predicates)
    } else {
        Step::Child(test, predicates)
    })
}

fn resolve_name(path: &str, name: &str, namespaces: &NamespaceTable) -> PathResult<QName> {
    namespaces.resolve(name).ok_or_else(|| PathError::UnknownPrefix {
        path: path.to_string(),
        prefix: name.split(':').next().unwrap_or(name).to_string(),
    })
}

fn parse_predicates(path: &str, mut rest: &str, namespaces: &NamespaceTable) -> PathResult<Vec<Predicate>> {
    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let inner_and_rest = rest
            .strip_prefix('[')
            .ok_or_else(|| PathError::syntax(path, "expected ["))?;
        let close = closing_bracket(inner_and_rest).ok_or_else(|| PathError::syntax(path, "missing ]"))?;
        let inner = inner_and_rest[..close].trim();
        rest = &inner_and_rest[close + 1..];
        predicates.push(parse_predicate(path, inner, namespaces)?);
    }
    Ok(predicates)
}

fn closing_bracket(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(path: &str, inner: &str, namespaces: &NamespaceTable) -> PathResult<Predicate> {
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = inner
            .parse()
            .map_err(|_| PathError::syntax(path, "bad position"))?;
        if n == 0 {
            return Err(PathError::syntax(path, "positions start at 1"));
        }
        return Ok(Predicate::Position(n));
    }

    let Some(attr) = inner.strip_prefix('@') else {
        return Err(PathError::syntax(path, format!("unsupported predicate [{}]", inner)));
    };
    match attr.split_once('=') {
        None => Ok(Predicate::HasAttribute(resolve_name(path, attr.trim(), namespaces)?)),
        Some((name, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                .ok_or_else(|| PathError::syntax(path, "attribute value must be quoted"))?;
            Ok(Predicate::AttributeEquals(
                resolve_name(path, name.trim(), namespaces)?,
                unquoted.to_string(),
            ))
        }
    }
}

/// Absolute path of `key`: `/root/child[n]/...`, positions counted among
/// same-tag siblings. Always resolvable back to `key`.
pub fn path_of(tree: &Tree, key: NodeKey, namespaces: &NamespaceTable) -> String {
    let mut segments = Vec::new();
    let mut cursor = Some(key);
    while let Some(k) = cursor {
        let Some(node) = tree.get(k) else {
            break;
        };
        let name = namespaces.qualify(&node.name);
        match tree.parent(k) {
            Some(parent) => {
                segments.push(format!("{}[{}]", name, same_tag_ordinal(tree, k)));
                cursor = Some(parent);
            }
            None => {
                segments.push(name);
                cursor = None;
            }
        }
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

fn attribute_suffix() -> &'static Regex {
    static ATTRIBUTE_SUFFIX: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE_SUFFIX.get_or_init(|| Regex::new(r"^(.+)/@([a-zA-Z0-9_\-.:]+)$").expect("valid attribute suffix pattern"))
}

/// Split `path/@attr` into its element path and attribute name
pub fn split_attribute_path(path: &str) -> Option<(&str, &str)> {
    let captures = attribute_suffix().captures(path)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const DOC: &str = r#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" xmlns:tt="http://jackjansen.nl/2immerse/livetrigger">
  <tl:par xml:id="main">
    <tt:events>
      <tl:par xml:id="event1" tt:name="One"><tl:sleep tl:dur="1"/></tl:par>
      <tl:par xml:id="event2" tt:name="Two"/>
      <tl:seq xml:id="event3"/>
    </tt:events>
    <tt:completeEvents/>
  </tl:par>
  <tl:par xml:id="second"/>
</tl:document>"#;

    fn load() -> (Tree, NamespaceTable) {
        let mut ns = NamespaceTable::standard();
        let tree = parse(DOC.as_bytes(), &mut ns).unwrap();
        (tree, ns)
    }

    fn ids(tree: &Tree, keys: &[NodeKey]) -> Vec<String> {
        keys.iter().map(|k| tree[*k].id().unwrap_or("-").to_string()).collect()
    }

    fn select(tree: &Tree, ns: &NamespaceTable, path: &str) -> Vec<String> {
        let expr = PathExpr::parse(path, ns).unwrap();
        ids(tree, &expr.select(tree, tree.root()))
    }

    #[test]
    fn test_absolute_paths_go_through_the_document() {
        let (tree, ns) = load();
        assert_eq!(select(&tree, &ns, "/tl:document"), vec!["-"]);
        assert_eq!(select(&tree, &ns, "/tl:document/tl:par[2]"), vec!["second"]);
        assert_eq!(select(&tree, &ns, "/tl:document/tl:par"), vec!["main", "second"]);
    }

    #[test]
    fn test_relative_and_descendant_paths() {
        let (tree, ns) = load();
        assert_eq!(select(&tree, &ns, ".//tt:events/*[@tt:name]"), vec!["event1", "event2"]);
        assert_eq!(select(&tree, &ns, ".//tl:par[@tt:name='Two']"), vec!["event2"]);
        assert_eq!(select(&tree, &ns, ".//tt:events/.."), vec!["main"]);
        assert_eq!(select(&tree, &ns, "tl:par/tt:events/tl:seq"), vec!["event3"]);
        assert_eq!(select(&tree, &ns, "./tl:par[1]"), vec!["main"]);
    }

    #[test]
    fn test_position_counts_same_tag_siblings() {
        let (tree, ns) = load();
        // event3 is the first tl:seq even though it is the third child
        assert_eq!(select(&tree, &ns, ".//tt:events/tl:seq[1]"), vec!["event3"]);
        assert_eq!(select(&tree, &ns, ".//tt:events/*[2]"), vec!["event2"]);
    }

    #[test]
    fn test_path_round_trip_for_every_node() {
        let (tree, ns) = load();
        for key in tree.descendants(tree.root()) {
            let path = path_of(&tree, key, &ns);
            let expr = PathExpr::parse(&path, &ns).unwrap();
            assert_eq!(expr.select_one(&tree, tree.root()).unwrap(), key, "{}", path);
        }
    }

    #[test]
    fn test_addressing_errors() {
        let (tree, ns) = load();
        let many = PathExpr::parse(".//tl:par", &ns).unwrap();
        assert!(matches!(many.select_one(&tree, tree.root()), Err(PathError::Ambiguous { count: 4, .. })));

        let none = PathExpr::parse(".//tl:ref", &ns).unwrap();
        assert!(matches!(none.select_one(&tree, tree.root()), Err(PathError::NoMatch { .. })));

        assert!(matches!(PathExpr::parse("/", &ns), Err(PathError::DocumentPath { .. })));
        assert!(matches!(PathExpr::parse("./zz:x", &ns), Err(PathError::UnknownPrefix { .. })));
        assert!(matches!(PathExpr::parse("./x[", &ns), Err(PathError::Syntax { .. })));
        assert!(matches!(PathExpr::parse("./x/", &ns), Err(PathError::Syntax { .. })));
    }

    #[test]
    fn test_split_attribute_path() {
        assert_eq!(split_attribute_path("./tl:sleep/@tl:dur"), Some(("./tl:sleep", "tl:dur")));
        assert_eq!(split_attribute_path(".//x[@a='b']/@tt:value"), Some((".//x[@a='b']", "tt:value")));
        assert_eq!(split_attribute_path("/tl:document/tl:par[1]"), None);
    }
}
