//! Integration tests for the tree store

use timeline_tree::{NamespaceTable, PathExpr, QName, StoreError, TreeStore};

const SHOW: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<tl:document xmlns:tl="http://jackjansen.nl/timelines" xmlns:tt="http://jackjansen.nl/2immerse/livetrigger" xmlns:tim="http://jackjansen.nl/2immerse">
  <tl:par xml:id="main">
    <tt:events>
      <tl:par xml:id="goal" tt:name="Goal">
        <tt:parameters>
          <tt:parameter tt:name="Team" tt:parameter="./tl:ref/@team" />
        </tt:parameters>
        <tl:ref xml:id="goal-ref" team="" />
      </tl:par>
    </tt:events>
    <tt:completeEvents />
  </tl:par>
</tl:document>"#;

fn store() -> TreeStore {
    TreeStore::parse(SHOW.as_bytes(), &NamespaceTable::standard()).unwrap()
}

#[test]
fn test_save_and_reload_is_stable() {
    let first = store();
    let saved = first.serialize();
    let second = TreeStore::parse(saved.as_bytes(), &NamespaceTable::standard()).unwrap();
    assert_eq!(second.serialize(), saved);
    assert_eq!(second.len(), first.len());
}

#[test]
fn test_every_path_resolves_after_edits() {
    let mut store = store();
    let complete = store.resolve(".//tt:completeEvents").unwrap();
    let goal = store.by_id("goal").unwrap();
    for _ in 0..3 {
        let mut copy = store.copy_subtree(goal).unwrap();
        store.after_copy(&mut copy, true);
        store.append(complete, copy).unwrap();
    }

    let root = store.root();
    for key in store.tree().descendants(root) {
        let path = store.path_of(key);
        assert_eq!(store.resolve(&path).unwrap(), key, "{}", path);
    }
}

#[test]
fn test_copies_get_fresh_identifiers_throughout() {
    let mut store = store();
    let complete = store.resolve(".//tt:completeEvents").unwrap();
    let goal = store.by_id("goal").unwrap();

    let mut copy = store.copy_subtree(goal).unwrap();
    store.after_copy(&mut copy, true);
    let first = store.append(complete, copy).unwrap();

    let mut copy = store.copy_subtree(first).unwrap();
    store.after_copy(&mut copy, true);
    let second = store.append(complete, copy).unwrap();

    assert_eq!(store.node(first).unwrap().id(), Some("goal-1"));
    assert_eq!(store.node(second).unwrap().id(), Some("goal-2"));
    assert!(store.has_id("goal-ref-1"));
    assert!(store.has_id("goal-ref-2"));
    assert_eq!(store.attribute(second, &QName::tt("name")), Some("Goal (2)"));
    assert_eq!(store.attribute(second, &QName::tls("state")), Some("new"));

    let refs = store.find_all(store.root(), ".//tl:ref").unwrap();
    assert_eq!(refs.len(), 3);
}

#[test]
fn test_fragments_use_the_store_prefixes() {
    let mut store = store();
    let fragment = store
        .parse_fragment(br#"<x:item xmlns:x="urn:extra" xml:id="extra" />"#)
        .unwrap();
    let main = store.by_id("main").unwrap();
    store.append(main, fragment).unwrap();

    assert!(store.resolve(".//x:item").is_ok());
    assert!(store.serialize().contains(r#"xmlns:x="urn:extra""#));

    let expr = PathExpr::parse(".//x:item", store.namespaces()).unwrap();
    assert_eq!(expr.select(store.tree(), store.root()).len(), 1);
}

#[test]
fn test_failed_edits_leave_indexes_alone() {
    let mut store = store();
    let goal = store.by_id("goal").unwrap();
    let err = store.set_attribute(goal, QName::xml_id(), "main").unwrap_err();
    assert_eq!(err, StoreError::DuplicateId("main".into()));
    assert_eq!(store.by_id("goal"), Some(goal));
    assert_eq!(store.by_id("main").map(|k| k != goal), Some(true));
}
