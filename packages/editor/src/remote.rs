//! # Remote Status Feed
//!
//! The preview player reports element progress; the document stores it as
//! lifecycle attributes so that listings, AVT clocks and the replica all see
//! the same state.
//!
//! ```text
//! preview player ──DocumentStatus──▶ apply_status ──▶ tls:state / tls:epoch / tls:clockRunning
//!                                          │
//!                                          └──▶ document clock start / stop
//! ```

use crate::document::Document;
use crate::errors::DocumentResult;
use crate::events::Events;
use crate::session::EditScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use timeline_tree::{NodeKey, QName, TreeStore};
use tracing::{debug, info, warn};

/// One element's state as reported by the preview player. Keys are also
/// accepted in Clark notation of the internal namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementState {
    #[serde(default, alias = "{http://jackjansen.nl/timelines/internal}state")]
    pub state: Option<String>,
    #[serde(default, alias = "{http://jackjansen.nl/timelines/internal}progress")]
    pub progress: Option<Value>,
    #[serde(
        default,
        rename = "clockRunning",
        alias = "{http://jackjansen.nl/timelines/internal}clockRunning"
    )]
    pub clock_running: Option<Value>,
}

impl ElementState {
    fn state(&self) -> Option<&str> {
        self.state.as_deref().filter(|s| *s != "idle")
    }

    fn progress(&self) -> Option<f64> {
        let progress = match self.progress.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        (progress != 0.0).then_some(progress)
    }

    fn clock_running(&self) -> Option<String> {
        match self.clock_running.as_ref()? {
            Value::Bool(true) => Some("true".to_string()),
            Value::String(s) if !s.is_empty() && s != "false" => Some(s.clone()),
            Value::Number(n) if n.as_f64().unwrap_or(0.0) != 0.0 => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A status report from the preview player
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    #[serde(default)]
    pub clock_epoch: Option<f64>,
    #[serde(default)]
    pub element_states: BTreeMap<String, ElementState>,
}

/// Preview player summary shown with every event listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Clock information handed to a (preview or viewer) player
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_epoch: Option<f64>,
}

fn running(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "false")
}

fn almost_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a.filter(|v| *v != 0.0), b.filter(|v| *v != 0.0)) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() < 0.01,
        _ => false,
    }
}

/// The element whose clock stands for the whole document
fn status_element(store: &TreeStore) -> Option<NodeKey> {
    let root = store.root();
    match store.find_first(root, ".//tt:events/..") {
        Ok(Some(key)) => Some(key),
        _ => store.tree().children(root).first().copied(),
    }
}

/// Seconds on the status element's clock, and whether it is running
fn clock_state(store: &TreeStore, now: f64) -> (f64, bool) {
    let Some(key) = status_element(store) else {
        return (0.0, false);
    };
    let position = store
        .attribute(key, &QName::tls("epoch"))
        .and_then(|epoch| epoch.trim().parse::<f64>().ok())
        .map(|epoch| now - epoch)
        .unwrap_or(0.0);
    (position, running(store.attribute(key, &QName::tls("clockRunning"))))
}

/// Remote-control view of a document
pub struct Remote<'a> {
    document: &'a Document,
}

impl<'a> Remote<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn status(&self) -> DocumentResult<RemoteStatus> {
        self.document.read(|state| {
            let store = state.store()?;
            let (position, playing) = clock_state(store, state.clock.now());
            let active = state.context_id.is_some();
            let mut status = RemoteStatus {
                active,
                ..RemoteStatus::default()
            };
            if active {
                status.playing = Some(playing);
            } else {
                status.status = Some("Preview player is not running".to_string());
            }
            if position != 0.0 {
                status.position = Some(position);
            }
            if let Some(error) = &state.last_error {
                status.status = Some(error.clone());
            }
            Ok(status)
        })
    }

    /// Register a player context and tell it where the document clock is
    pub fn live_info(&self, context_id: Option<&str>, viewer: bool) -> DocumentResult<LiveInfo> {
        let info = self.document.write(|state| -> DocumentResult<LiveInfo> {
            if let Some(context_id) = context_id {
                if !viewer && state.context_id.is_none() {
                    info!(document = %state.id, context_id, "preview context registered");
                    state.context_id = Some(context_id.to_string());
                }
                if !state.context_ids.iter().any(|c| c == context_id) {
                    state.context_ids.push(context_id.to_string());
                }
            }
            let store = state.store()?;
            let (position, _) = clock_state(store, state.clock.now());
            let offset = state.settings.viewer_extra_offset.unwrap_or(0.0);

            let mut info = LiveInfo::default();
            if position != 0.0 {
                info.current_time = Some(if viewer { position - offset } else { position });
            }
            if let Some(epoch) = state.preview_clock_epoch {
                info.clock_epoch = Some(epoch - offset);
            }
            Ok(info)
        })?;
        self.document.publish_events();
        Ok(info)
    }

    /// Every context that asked for live info, preview first
    pub fn context_ids(&self) -> Vec<String> {
        self.document.read(|state| state.context_ids.clone())
    }

    pub fn companion_active(&self) -> bool {
        self.document.read(|state| state.companion_active)
    }

    /// Store the preview player's report. Runs as one edit scope so the
    /// replica sees the lifecycle attributes.
    pub fn apply_status(&self, status: &DocumentStatus) -> DocumentResult<()> {
        info!(
            document = %self.document.id(),
            elements = status.element_states.len(),
            clock_epoch = ?status.clock_epoch,
            "status update"
        );
        let result = (|| -> DocumentResult<()> {
            let scope = self.document.begin_scope("status")?;
            scope.state(|state| {
                if let Some(epoch) = status.clock_epoch.filter(|e| *e != 0.0) {
                    state.preview_clock_epoch = Some(epoch);
                }
                state.companion_active = true;
                Ok(())
            })?;

            for (id, element_state) in &status.element_states {
                let Some(key) = scope.by_id(id)? else {
                    warn!(id = %id, "status for unknown element");
                    continue;
                };
                if !apply_element_state(&scope, key, element_state)? {
                    continue;
                }
                debug!(id = %id, "element state changed");
                let finished = scope.read(|store| {
                    let transient = store
                        .attribute(key, &QName::tt("productionIdTransient"))
                        .is_some_and(|v| !v.is_empty());
                    let finished = store.attribute(key, &QName::tls("state")) == Some("finished");
                    let production_id = store.attribute(key, &QName::tt("productionId")).map(str::to_string);
                    production_id.filter(|_| transient && finished)
                })?;
                if let Some(production_id) = finished.filter(|p| !p.is_empty()) {
                    Events::production_id_finished(&scope, &production_id)?;
                }
            }
            scope.commit();
            Ok(())
        })();
        self.document.report(result)?;
        self.document.publish_events();
        Ok(())
    }
}

/// Returns whether anything changed
fn apply_element_state(scope: &EditScope<'_>, key: NodeKey, reported: &ElementState) -> DocumentResult<bool> {
    let now = scope.state(|state| Ok(state.clock.now()))?;
    let new_state = reported.state().map(str::to_string);
    let new_epoch = reported.progress().map(|progress| now - progress);
    let new_running = reported.clock_running();

    let unchanged = scope.read(|store| {
        let old_state = store.attribute(key, &QName::tls("state"));
        let old_epoch = store
            .attribute(key, &QName::tls("epoch"))
            .and_then(|e| e.trim().parse::<f64>().ok());
        let old_running = store
            .attribute(key, &QName::tls("clockRunning"))
            .filter(|v| running(Some(v)));
        old_state == new_state.as_deref() && almost_equal(old_epoch, new_epoch) && old_running == new_running.as_deref()
    })?;
    if unchanged {
        return Ok(false);
    }

    let (state_key, epoch_key, running_key) = (QName::tls("state"), QName::tls("epoch"), QName::tls("clockRunning"));
    let start_clock = new_running.is_some();
    let stop_clock = !start_clock && new_epoch.is_some();
    scope.update_attributes(key, |attributes| {
        match new_state {
            Some(state) => attributes.insert(state_key, state),
            None => attributes.remove(&state_key),
        };
        match new_epoch {
            Some(epoch) => attributes.insert(epoch_key, format!("{}", epoch)),
            None => attributes.remove(&epoch_key),
        };
        match new_running {
            Some(value) => attributes.insert(running_key, value),
            None => attributes.remove(&running_key),
        };
    })?;
    scope.state(|state| {
        if start_clock {
            state.clock.start();
        } else if stop_clock {
            state.clock.stop();
        }
        Ok(())
    })?;
    Ok(true)
}
