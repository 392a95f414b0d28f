//! Integration tests for the serve crate

use std::sync::Arc;
use timeline_editor::{Document, ForwardHandler, InsertPosition, ParameterValue, QName};
use timeline_serve::{
    CallbackListener, GenerationBatch, PushPump, RoomMessage, ServeConfig, ServeError, ServeLayer, BROADCAST_EVENTS,
    BROADCAST_UPDATES, STATUS,
};

const MATCH: &str = include_str!("../../editor/tests/fixtures/match.xml");

fn document() -> Arc<Document> {
    let doc = Arc::new(Document::new("match"));
    doc.load_xml(MATCH.as_bytes()).unwrap();
    doc
}

fn served(config: &ServeConfig) -> (Arc<Document>, Arc<ServeLayer>) {
    let doc = document();
    let layer = Arc::new(ServeLayer::new(config));
    layer.attach(&doc);
    (doc, layer)
}

fn serialized(doc: &Document) -> String {
    doc.with_store(|store| store.serialize()).unwrap()
}

#[test]
fn test_every_scope_gets_a_generation() {
    let (doc, layer) = served(&ServeConfig::default());
    assert_eq!(layer.generation(), 0);

    doc.events().trigger("event1", &[]).unwrap();
    let after_trigger = layer.generation();
    assert!(after_trigger >= 1);

    // A failing edit still closes its scope
    assert!(doc.xml().cut("/tl:document/tl:nothing").is_err());
    doc.events()
        .trigger("event2", &[ParameterValue::new("/tl:document/tl:par[1]/tt:events[1]/tl:par[2]/tt:parameters[1]/tt:parameter[1]", "Hi")])
        .unwrap();

    let entries = layer.history_since(after_trigger);
    assert!(!entries.is_empty());
    for (offset, entry) in entries.iter().enumerate() {
        assert_eq!(entry.generation, after_trigger + 1 + offset as u64);
    }
    assert_eq!(entries.last().map(|e| e.generation), Some(layer.generation()));
}

#[test]
fn test_late_joiner_catches_up_from_history() {
    let (doc, layer) = served(&ServeConfig::default());
    doc.events().trigger("event1", &[]).unwrap();
    doc.events().trigger("event1", &[]).unwrap();
    doc.xml()
        .paste(
            "/tl:document/tl:par",
            InsertPosition::End,
            r#"<tl:sleep xmlns:tl="http://jackjansen.nl/timelines" xml:id="late" tl:dur="2" />"#,
        )
        .unwrap();

    let joiner = document();
    for entry in layer.history_since(0) {
        if !entry.is_placeholder() {
            joiner.apply_operations(&entry.operations).unwrap();
        }
    }
    assert_eq!(serialized(&joiner), serialized(&doc));
    assert!(joiner.has_id("late"));
}

#[test]
fn test_failing_listener_is_dropped_and_reported() {
    let (doc, layer) = served(&ServeConfig::default());
    layer.add_listener(Arc::new(CallbackListener::new("http://timeline.invalid/cb", |_: &GenerationBatch| {
        Err(ServeError::delivery("http://timeline.invalid/cb", "connection refused"))
    })));

    doc.xml().modify_data("/tl:document/tl:par/tt:completeEvents", Some("x")).unwrap();
    assert!(layer.listeners().is_empty());
    assert_eq!(doc.last_error().as_deref(), Some("Error communicating to timeline service"));

    // the local edit stays committed
    assert!(doc.xml().get("/tl:document/tl:par/tt:completeEvents").unwrap().contains(">x<"));
}

#[test]
fn test_status_room_message_updates_document() {
    let (doc, layer) = served(&ServeConfig::default());
    let id = doc.events().trigger("event1", &[]).unwrap();
    let before = layer.generation();

    let mut states = serde_json::Map::new();
    states.insert(id.clone(), serde_json::json!({ "state": "started", "progress": 0.5 }));
    let message = RoomMessage {
        room: "toBackend-match".into(),
        event: STATUS.into(),
        payload: serde_json::json!({ "elementStates": states }),
    };
    assert!(layer.handle_room_message(&message).unwrap());
    assert_eq!(doc.attribute(&id, &QName::tls("state")).unwrap().as_deref(), Some("started"));
    assert!(layer.generation() > before);

    let elsewhere = RoomMessage {
        room: "toBackend-other".into(),
        ..message
    };
    assert!(!layer.handle_room_message(&elsewhere).unwrap());
}

#[test]
fn test_history_limit() {
    let (doc, layer) = served(&ServeConfig {
        history_limit: Some(3),
        ..ServeConfig::default()
    });
    for _ in 0..4 {
        doc.events().trigger("event1", &[]).unwrap();
    }
    let entries = layer.history_since(0);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].generation, layer.generation());
    assert_eq!(layer.outgoing_connection_info("match").room, "toTimelines-match");
    assert_eq!(layer.incoming_connection_info("match").channel, "/trigger");
}

#[tokio::test]
async fn test_pump_broadcasts_generations_and_listings() {
    let doc = document();
    let pump = Arc::new(PushPump::spawn(16));
    let mut rooms = pump.subscribe();
    let layer = Arc::new(ServeLayer::new(&ServeConfig::default()).with_pump(pump.clone()));
    layer.attach(&doc);

    let id = doc.events().trigger("event1", &[]).unwrap();

    let mut update = None;
    let mut listing = None;
    while update.is_none() || listing.is_none() {
        let message = rooms.recv().await.unwrap();
        match message.event.as_str() {
            BROADCAST_UPDATES => update = Some(message),
            BROADCAST_EVENTS => listing = Some(message),
            other => panic!("unexpected event {}", other),
        }
    }

    let update = update.unwrap();
    assert_eq!(update.room, "toTimelines-match");
    assert!(update.payload["operations"].as_array().is_some_and(|ops| !ops.is_empty()));

    let listing = listing.unwrap();
    assert_eq!(listing.room, "match");
    let events = listing.payload["events"].as_array().unwrap();
    assert!(events.iter().any(|e| e["id"] == id.as_str()));

    pump.shutdown().await;
    assert!(!pump.is_running());
}
