//! Integration tests for editor crate

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use timeline_editor::{
    Document, DocumentError, DocumentStatus, EventListing, EventState, InsertPosition, ManualClock, Operation,
    ParameterValue, QName, ScopePublisher,
};

const MATCH: &str = include_str!("fixtures/match.xml");

fn document() -> Document {
    let doc = Document::new("match");
    doc.load_xml(MATCH.as_bytes()).unwrap();
    doc
}

/// Primary with a replica attached
fn replicated() -> (Document, Arc<Document>) {
    let primary = document();
    let replica = Arc::new(document());
    primary.set_forward_handler(Some(replica.clone()));
    (primary, replica)
}

fn serialized(doc: &Document) -> String {
    doc.with_store(|store| store.serialize()).unwrap()
}

fn status(json: &str) -> DocumentStatus {
    serde_json::from_str(json).unwrap()
}

#[derive(Default)]
struct RecordingPublisher {
    scopes: Mutex<Vec<Vec<Operation>>>,
    listings: Mutex<Vec<EventListing>>,
}

impl ScopePublisher for RecordingPublisher {
    fn publish_scope(&self, _document_id: &str, operations: &[Operation]) {
        self.scopes.lock().push(operations.to_vec());
    }

    fn publish_events(&self, _document_id: &str, listing: &EventListing) {
        self.listings.lock().push(listing.clone());
    }
}

#[test]
fn test_load_reads_settings_and_lists_templates() {
    let doc = document();
    let settings = doc.settings().get();
    assert!(settings.start_paused);
    assert_eq!(settings.player_mode, "tv");
    assert!(settings.description.starts_with("match, "));

    let listing = doc.events().list_events().unwrap();
    assert_eq!(listing.events.len(), 2);
    let goal = &listing.events[0];
    assert_eq!(goal.id.as_deref(), Some("event1"));
    assert_eq!(goal.state, EventState::Abstract);
    assert!(goal.trigger);
    assert_eq!(goal.verb.as_deref(), Some("Show"));
    assert!(goal.parameters[0].required);
    assert_eq!(goal.parameters[0].value.as_deref(), Some("5"));

    let lower_third = &listing.events[1];
    assert_eq!(
        lower_third.parameters[0].parameter,
        "/tl:document/tl:par[1]/tt:events[1]/tl:par[2]/tt:parameters[1]/tt:parameter[1]"
    );
    assert!(!listing.remote.active);
    assert_eq!(listing.remote.status.as_deref(), Some("Preview player is not running"));
}

#[test]
fn test_trigger_adds_copy_with_fresh_ids() {
    let doc = document();
    let before = doc.element_count();

    let first = doc.events().trigger("event1", &[]).unwrap();
    let second = doc.events().trigger("event1", &[]).unwrap();
    let third = doc.events().trigger("event1", &[]).unwrap();

    assert_eq!(doc.element_count(), before + 3 * 5);
    assert_eq!((first.as_str(), second.as_str(), third.as_str()), ("event1-1", "event1-2", "event1-3"));
    assert_eq!(doc.attribute(&second, &QName::tt("name")).unwrap().as_deref(), Some("Goal (2)"));
    assert_eq!(doc.attribute(&first, &QName::tls("state")).unwrap().as_deref(), Some("new"));
    assert_eq!(doc.attribute(&first, &QName::tt("wantstatus")).unwrap().as_deref(), Some("true"));
    assert!(doc.has_id("event1-sleep-3"));

    // instances sit next to tt:events
    assert_eq!(doc.element_path(&first).unwrap(), "/tl:document/tl:par[1]/tl:par[1]");

    let listing = doc.events().list_events().unwrap();
    let active: Vec<_> = listing.events.iter().filter(|e| e.state == EventState::Active).collect();
    assert_eq!(active.len(), 3);
    assert!(active.iter().all(|e| e.modify && !e.trigger));
}

#[test]
fn test_trigger_sets_parameter_destination() {
    let doc = document();
    let id = doc
        .events()
        .trigger("event1", &[ParameterValue::new("./tl:sleep/@tl:dur", "42")])
        .unwrap();
    assert_eq!(id, "event1-1");
    assert_eq!(
        doc.attribute("event1-sleep-1", &QName::tl("dur")).unwrap().as_deref(),
        Some("42")
    );
    // the template keeps its value
    assert_eq!(doc.attribute("event1-sleep", &QName::tl("dur")).unwrap().as_deref(), Some("1"));
}

#[test]
fn test_trigger_with_destination_children() {
    let doc = document();
    let declaration = doc.element_path("event2-text").unwrap();
    let id = doc
        .events()
        .trigger("event2", &[ParameterValue::new(declaration, "Hello")])
        .unwrap();
    let xml = doc.xml().get(&doc.element_path(&id).unwrap()).unwrap();
    assert!(xml.contains(r#"<tl:ref tt:text="Hello" />"#), "{}", xml);
    assert!(xml.contains(r#"<tl:sleep tl:dur="0" />"#), "{}", xml);
}

#[test]
fn test_trigger_errors() {
    let doc = document();
    let err = doc.events().trigger("nope", &[]).unwrap_err();
    assert!(matches!(err, DocumentError::NotFound(_)));
    assert_eq!(doc.last_error().as_deref(), Some("No such xml:id: nope"));

    let before = serialized(&doc);
    let err = doc
        .events()
        .trigger("event1", &[ParameterValue::new("./tl:missing/@tl:dur", "1")])
        .unwrap_err();
    assert!(matches!(err, DocumentError::Addressing(_)));
    assert_eq!(serialized(&doc), before);

    doc.events().trigger("event1", &[]).unwrap();
    assert!(doc.last_error().is_none());
}

#[test]
fn test_modify_running_instance() {
    let (primary, replica) = replicated();
    let id = primary.events().trigger("event2", &[]).unwrap();
    primary
        .events()
        .modify(&id, &[ParameterValue::new("./tl:ref/@tt:text", "Changed")])
        .unwrap();

    let path = primary.element_path(&id).unwrap();
    let xml = primary.xml().get(&path).unwrap();
    assert!(xml.contains(r#"tt:text="Changed""#));
    assert_eq!(serialized(&primary), serialized(&replica));
}

#[test]
fn test_enqueue_then_finished_hides_entry() {
    let (primary, replica) = replicated();
    let ready = primary.events().enqueue("event1", &[]).unwrap();
    assert_eq!(
        primary.element_path(&ready).unwrap(),
        "/tl:document/tl:par[1]/tt:completeEvents[1]/tl:par[1]"
    );
    assert_eq!(primary.attribute(&ready, &QName::tt("productionId")).unwrap(), Some(ready.clone()));
    assert_eq!(
        primary.attribute(&ready, &QName::tt("productionParent")).unwrap().as_deref(),
        Some("event1")
    );

    let listing = primary.events().list_events().unwrap();
    let entry = listing.events.iter().find(|e| e.state == EventState::Ready).unwrap();
    assert_eq!(entry.production_id.as_deref(), Some(ready.as_str()));

    let instance = primary.events().trigger(&ready, &[]).unwrap();
    primary
        .remote()
        .apply_status(&status(&format!(
            r#"{{"elementStates": {{"{}": {{"state": "finished"}}}}}}"#,
            instance
        )))
        .unwrap();

    assert_eq!(primary.attribute(&ready, &QName::tt("name")).unwrap(), None);
    assert!(primary.attribute(&ready, &QName::tt("oldName")).unwrap().is_some());
    let listing = primary.events().list_events().unwrap();
    assert_eq!(listing.events.len(), 2);
    assert!(listing.events.iter().all(|e| e.state == EventState::Abstract));
    assert_eq!(serialized(&primary), serialized(&replica));
}

#[test]
fn test_dequeue() {
    let doc = document();
    let ready = doc.events().enqueue("event1", &[]).unwrap();
    doc.events().dequeue(&ready).unwrap();
    doc.events().dequeue("does-not-exist").unwrap();
    assert_eq!(doc.attribute(&ready, &QName::tt("oldName")).unwrap().as_deref(), Some("Goal (1)"));
    let listing = doc.events().list_events().unwrap();
    assert!(listing.events.iter().all(|e| e.state != EventState::Ready));
}

#[test]
fn test_clock_counts_only_running_time() {
    let source = Arc::new(ManualClock::new());
    let doc = Document::new("clock").with_clock(source.clone());
    doc.load_xml(MATCH.as_bytes()).unwrap();

    doc.remote()
        .apply_status(&status(r#"{"elementStates": {"main": {"state": "started", "progress": 1, "clockRunning": true}}}"#))
        .unwrap();
    assert!(doc.clock_running());
    source.advance(5.0);

    doc.remote()
        .apply_status(&status(r#"{"elementStates": {"main": {"state": "started", "progress": 6}}}"#))
        .unwrap();
    assert!(!doc.clock_running());
    source.advance(100.0);

    doc.remote()
        .apply_status(&status(r#"{"elementStates": {"main": {"state": "started", "progress": 6, "clockRunning": "true"}}}"#))
        .unwrap();
    source.advance(3.0);
    assert_eq!(doc.clock_now(), 8.0);
    assert!(doc.remote().companion_active());
}

#[test]
fn test_status_for_unknown_element_is_skipped() {
    let doc = document();
    doc.remote()
        .apply_status(&status(r#"{"clockEpoch": 1000, "elementStates": {"ghost": {"state": "started"}}}"#))
        .unwrap();
    assert!(doc.last_error().is_none());
    let info = doc.remote().live_info(Some("ctx-1"), false).unwrap();
    assert_eq!(info.clock_epoch, Some(1000.0));
    assert!(doc.remote().status().unwrap().active);
}

#[test]
fn test_live_info_viewer_offset() {
    let source = Arc::new(ManualClock::new());
    let doc = Document::new("live").with_clock(source.clone());
    doc.load_xml(MATCH.as_bytes()).unwrap();
    doc.settings().update(serde_json::from_str(r#"{"viewerExtraOffset": 2}"#).unwrap());
    doc.remote()
        .apply_status(&status(r#"{"clockEpoch": 50, "elementStates": {"main": {"state": "started", "progress": 10, "clockRunning": true}}}"#))
        .unwrap();

    let viewer = doc.remote().live_info(Some("viewer-1"), true).unwrap();
    assert_eq!(viewer.current_time, Some(8.0));
    assert_eq!(viewer.clock_epoch, Some(48.0));
    assert!(!doc.remote().status().unwrap().active);

    let preview = doc.remote().live_info(Some("preview-1"), false).unwrap();
    assert_eq!(preview.current_time, Some(10.0));
    let remote = doc.remote().status().unwrap();
    assert!(remote.active);
    assert_eq!(remote.playing, Some(true));
    assert_eq!(remote.position, Some(10.0));
    assert_eq!(doc.remote().context_ids(), vec!["viewer-1", "preview-1"]);
}

#[test]
fn test_nested_scope_is_rejected() {
    let doc = document();
    {
        let _scope = doc.begin_scope("outer").unwrap();
        let err = doc.events().trigger("event1", &[]).unwrap_err();
        assert!(matches!(err, DocumentError::ConcurrentEdit { .. }));
        assert_eq!(
            doc.last_error().as_deref(),
            Some("Another editing operation is still in progress")
        );
    }
    doc.events().trigger("event1", &[]).unwrap();
}

#[test]
fn test_replica_stays_identical() {
    let (primary, replica) = replicated();
    let in_step = |step: &str| {
        assert_eq!(serialized(&primary), serialized(&replica), "replica diverged after {}", step);
        assert_eq!(primary.element_count(), replica.element_count(), "element count after {}", step);
    };

    let triggered = primary.events().trigger("event1", &[ParameterValue::new("./tl:sleep/@tl:dur", "7")]).unwrap();
    in_step("trigger");
    let ready = primary.events().enqueue("event2", &[]).unwrap();
    in_step("enqueue");
    primary.events().dequeue(&ready).unwrap();
    in_step("dequeue");

    let lower_third = primary.events().trigger("event2", &[]).unwrap();
    in_step("second trigger");
    primary
        .events()
        .modify(&lower_third, &[ParameterValue::new("./tl:ref/@tt:text", "Updated")])
        .unwrap();
    in_step("modify");

    primary
        .remote()
        .apply_status(&status(&format!(
            r#"{{"elementStates": {{"{}": {{"state": "started", "progress": 2}}}}}}"#,
            triggered
        )))
        .unwrap();
    in_step("status");
    primary
        .xml()
        .paste("/tl:document/tl:par", InsertPosition::Before, r#"<tl:seq xmlns:tl="http://jackjansen.nl/timelines" />"#)
        .unwrap();
    in_step("paste");
    primary.xml().modify_data("/tl:document/tl:seq", Some("text")).unwrap();
    in_step("modify data");
    primary
        .xml()
        .move_node("/tl:document/tl:seq", InsertPosition::End, &primary.element_path(&triggered).unwrap())
        .unwrap();
    in_step("move");
    let mut attrs = BTreeMap::new();
    attrs.insert("tt:flag".to_string(), Some("on".to_string()));
    primary.xml().modify_attributes("/tl:document/tl:seq", &attrs).unwrap();
    in_step("modify attributes");
}

#[test]
fn test_publisher_sees_every_scope() {
    let doc = document();
    let publisher = Arc::new(RecordingPublisher::default());
    doc.set_publisher(Some(publisher.clone()));

    doc.events().trigger("event1", &[]).unwrap();
    doc.events().dequeue("does-not-exist").unwrap();

    let scopes = publisher.scopes.lock();
    assert_eq!(scopes.len(), 2);
    assert_eq!(scopes[0].len(), 1);
    assert!(matches!(scopes[0][0], Operation::Insert { position: InsertPosition::After, .. }));
    assert!(scopes[1].is_empty());
    assert_eq!(publisher.listings.lock().len(), 2);
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("match.xml");
    std::fs::write(&source, MATCH).unwrap();

    let doc = Document::new("saved");
    doc.load(source.to_str().unwrap()).unwrap();
    assert!(doc.base().unwrap().starts_with("file://"));
    let listing = doc.events().list_events().unwrap();
    assert!(listing.events[0].preview_url.as_deref().unwrap().ends_with("/images/goal.png"));

    doc.events().trigger("event1", &[]).unwrap();
    let target = dir.path().join("out.xml");
    doc.save(target.to_str().unwrap()).unwrap();

    let saved = std::fs::read_to_string(&target).unwrap();
    assert!(saved.starts_with("<?xml"));
    assert!(!saved.contains("tim:base"));
    assert!(!saved.contains("tls:state"));

    let reloaded = Document::new("reloaded");
    reloaded.load(target.to_str().unwrap()).unwrap();
    assert_eq!(reloaded.element_count(), doc.element_count());
    assert!(reloaded.has_id("event1-1"));
}

#[test]
fn test_failed_load_keeps_document() {
    let doc = document();
    let before = doc.element_count();
    assert!(matches!(doc.load_xml(b"<tl:document"), Err(DocumentError::Format(_))));
    assert_eq!(doc.element_count(), before);
    assert_eq!(doc.last_error().as_deref(), Some("XML parse error in document"));
}
