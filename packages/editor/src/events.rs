//! # Trigger Engine
//!
//! Events are templates declared in the document. Triggering copies a
//! template next to the `tt:events` container, enqueueing copies it into
//! `tt:completeEvents`; the preview player then reports its progress through
//! the status feed.
//!
//! ```text
//!  abstract ──trigger──────────────▶ active ──status──▶ finished
//!     │                                ▲
//!     └──enqueue──▶ ready ──trigger────┘
//!                     │
//!                     └──dequeue / finished──▶ (unlisted)
//! ```
//!
//! Parameters carry the user's value to one or more destinations: either a
//! direct `path/@attr` or the `tt:destination` children of the parameter
//! declaration.

use crate::avt::{self, AvtContext};
use crate::document::Document;
use crate::errors::{DocumentError, DocumentResult};
use crate::remote::RemoteStatus;
use crate::session::EditScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use timeline_common::join_reference;
use timeline_tree::{split_attribute_path, NodeKey, PathError, QName, Tree, TreeStore};
use tracing::{debug, info, warn};

/// A value the user entered for one event parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterValue {
    /// `path/@attr` destination, or the path of a parameter declaration
    pub parameter: String,
    pub value: String,
}

impl ParameterValue {
    pub fn new(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Abstract,
    Ready,
    Active,
}

impl EventState {
    fn parameter_path(self) -> &'static str {
        match self {
            EventState::Abstract => "./tt:parameters/tt:parameter",
            EventState::Ready => "./tt:readyparameters/tt:parameter",
            EventState::Active => "./tt:modparameters/tt:parameter",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionItem {
    pub label: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterDescription {
    pub name: Option<String>,
    pub parameter: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDescription {
    pub name: Option<String>,
    pub id: Option<String>,
    pub trigger: bool,
    pub modify: bool,
    pub state: EventState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longdesc: Option<String>,
    pub production_id: Option<String>,
    pub production_group: Option<String>,
    pub parameters: Vec<ParameterDescription>,
}

/// What the trigger tool shows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventListing {
    pub remote: RemoteStatus,
    pub events: Vec<EventDescription>,
}

/// One attribute to set on behalf of a parameter
#[derive(Debug, Clone, PartialEq)]
struct Destination {
    path: String,
    attribute: QName,
    value: String,
}

fn attribute_name(store: &TreeStore, path: &str, name: &str) -> DocumentResult<QName> {
    store.namespaces().resolve(name).ok_or_else(|| {
        let prefix = name.split(':').next().unwrap_or(name).to_string();
        PathError::UnknownPrefix {
            path: format!("{}/@{}", path, name),
            prefix,
        }
        .into()
    })
}

fn split_destination(parameter: &str) -> DocumentResult<(&str, &str)> {
    split_attribute_path(parameter).ok_or_else(|| {
        DocumentError::document(format!(
            "Event tt:parameter XPath does not refer to an attribute: {}",
            parameter
        ))
    })
}

/// Where the value of `parameter` goes
fn destinations(store: &TreeStore, parameter: &ParameterValue) -> DocumentResult<Vec<Destination>> {
    if let Some((path, name)) = split_attribute_path(&parameter.parameter) {
        return Ok(vec![Destination {
            path: path.to_string(),
            attribute: attribute_name(store, path, name)?,
            value: parameter.value.clone(),
        }]);
    }

    let declaration = store.resolve(&parameter.parameter).map_err(|_| {
        DocumentError::document(format!(
            "XPath in parameter does not refer to existing element: {}",
            parameter.parameter
        ))
    })?;
    let mut result = Vec::new();
    for key in store.find_all(declaration, "./tt:destination")? {
        let target = store.attribute(key, &QName::tt("parameter")).unwrap_or_default();
        let (path, name) = split_destination(target)?;
        let value = store
            .attribute(key, &QName::tt("value"))
            .unwrap_or(parameter.value.as_str());
        result.push(Destination {
            path: path.to_string(),
            attribute: attribute_name(store, path, name)?,
            value: value.to_string(),
        });
    }
    Ok(result)
}

fn epoch(store: &TreeStore, key: Option<NodeKey>) -> Option<&str> {
    key.and_then(|k| store.attribute(k, &QName::tls("epoch")))
}

/// Trigger engine view of a document
pub struct Events<'a> {
    document: &'a Document,
}

impl<'a> Events<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Everything that can be triggered, enqueued-and-triggered or modified,
    /// with the preview player status
    pub fn list_events(&self) -> DocumentResult<EventListing> {
        let mut problems = Vec::new();
        let events = self.document.read(|state| {
            let store = state.store()?;
            let now = state.clock.now();
            let base = state.base.as_deref();
            let root = store.root();
            let mut events = Vec::new();

            for key in store.find_all(root, ".//tt:events/*[@tt:name]")? {
                events.push(describe(store, key, EventState::Abstract, now, base, &mut problems)?);
            }
            for key in store.find_all(root, ".//tt:completeEvents/*[@tt:name]")? {
                events.push(describe(store, key, EventState::Ready, now, base, &mut problems)?);
            }
            for key in store.find_all(root, ".//tl:par/*[@tt:name][@tls:state]")? {
                if store.attribute(key, &QName::tls("state")) == Some("finished") {
                    continue;
                }
                events.push(describe(store, key, EventState::Active, now, base, &mut problems)?);
            }
            Ok::<_, DocumentError>(events)
        });
        let events = self.document.report(events)?;
        if let Some(problem) = problems.pop() {
            self.document.set_error(problem);
        }
        debug!(document = %self.document.id(), events = events.len(), "listed events");
        let remote = self.document.remote().status()?;
        Ok(EventListing { remote, events })
    }

    /// Instantiate the event template `id` next to its container and return
    /// the new instance's id
    pub fn trigger(&self, id: &str, parameters: &[ParameterValue]) -> DocumentResult<String> {
        info!(document = %self.document.id(), id, parameters = parameters.len(), "trigger");
        let result = self.instantiate(id, parameters, false);
        self.finish_instantiation(result)
    }

    /// Like [`trigger`](Self::trigger), but the copy goes to the ready list
    /// (`tt:completeEvents`)
    pub fn enqueue(&self, id: &str, parameters: &[ParameterValue]) -> DocumentResult<String> {
        info!(document = %self.document.id(), id, parameters = parameters.len(), "enqueue");
        let result = self.instantiate(id, parameters, true);
        self.finish_instantiation(result)
    }

    fn finish_instantiation(&self, result: DocumentResult<String>) -> DocumentResult<String> {
        let new_id = self.document.report(result)?;
        self.document.write(|state| {
            state.companion_active = false;
            state.last_error = None;
        });
        self.document.publish_events();
        Ok(new_id)
    }

    fn instantiate(&self, id: &str, parameters: &[ParameterValue], ready_list: bool) -> DocumentResult<String> {
        let scope = self.document.begin_scope(if ready_list { "enqueue" } else { "trigger" })?;
        let template = scope.element(id)?;
        let grandparent = scope
            .read(|store| store.parent(template).and_then(|p| store.parent(p)))?
            .ok_or_else(|| DocumentError::document(format!("Event {} has no enclosing container", id)))?;

        let new_parent = if ready_list {
            scope.read(|store| {
                let container = store.compile("./tt:completeEvents")?;
                container.select_one(store.tree(), grandparent).map_err(DocumentError::from)
            })??
        } else {
            grandparent
        };

        let mut copy = scope.copy_subtree(template)?;
        let top = copy.root();
        copy[top].attributes.insert(QName::tt("wantstatus"), "true".to_string());
        scope.after_copy(&mut copy, true)?;

        if ready_list && copy[top].attribute(&QName::tt("productionId")).is_none() {
            let new_id = copy[top].id().unwrap_or_default().to_string();
            let attributes = &mut copy[top].attributes;
            attributes.insert(QName::tt("productionId"), new_id);
            attributes.insert(QName::tt("productionIdTransient"), "true".to_string());
            attributes.insert(QName::tt("productionParent"), id.to_string());
        }

        let now = self.document.clock_now();
        for parameter in parameters {
            scope.read(|store| apply_to_copy(store, &mut copy, parameter, new_parent, now))??;
        }

        let key = scope.append(new_parent, copy)?;
        let new_id = scope
            .read(|store| store.node(key).map(|node| node.id().map(str::to_string)))??
            .unwrap_or_default();
        scope.commit();
        info!(document = %self.document.id(), template = id, instance = %new_id, "instantiated event");
        Ok(new_id)
    }

    /// Hide a ready-list entry by renaming its `tt:name` to `tt:oldName`
    pub fn dequeue(&self, id: &str) -> DocumentResult<()> {
        info!(document = %self.document.id(), id, "dequeue");
        let result = (|| -> DocumentResult<()> {
            let scope = self.document.begin_scope("dequeue")?;
            let Some(key) = scope.by_id(id)? else {
                return Ok(());
            };
            strip_name(&scope, key)?;
            scope.commit();
            Ok(())
        })();
        self.document.report(result)?;
        self.document.publish_events();
        Ok(())
    }

    /// Apply parameter values to a running instance in place
    pub fn modify(&self, id: &str, parameters: &[ParameterValue]) -> DocumentResult<()> {
        info!(document = %self.document.id(), id, parameters = parameters.len(), "modify");
        let result = (|| -> DocumentResult<()> {
            let scope = self.document.begin_scope("modify")?;
            let element = scope.element(id)?;
            let now = self.document.clock_now();

            let mut changes: BTreeMap<NodeKey, Vec<(QName, String)>> = BTreeMap::new();
            for parameter in parameters {
                scope.read(|store| collect_in_place(store, element, parameter, now, &mut changes))??;
            }

            let mut touched: Vec<(usize, NodeKey)> = scope.read(|store| {
                let order = store.tree().descendants(store.root());
                changes
                    .keys()
                    .map(|key| (order.iter().position(|k| k == key).unwrap_or(usize::MAX), *key))
                    .collect()
            })?;
            touched.sort();
            for (_, key) in touched {
                if let Some(values) = changes.remove(&key) {
                    scope.update_attributes(key, |attributes| attributes.extend(values))?;
                }
            }
            scope.commit();
            Ok(())
        })();
        self.document.report(result)?;
        self.document.write(|state| {
            state.companion_active = false;
            state.last_error = None;
        });
        Ok(())
    }

    /// The first ready-list entry with this productionId disappears from the
    /// listing
    pub(crate) fn production_id_finished(scope: &EditScope<'_>, production_id: &str) -> DocumentResult<()> {
        let quote = if production_id.contains('\'') { '"' } else { '\'' };
        let path = format!(
            ".//tt:completeEvents/*[@tt:name][@tt:productionId={q}{}{q}]",
            production_id,
            q = quote
        );
        let found = scope.read(|store| store.find_first(store.root(), &path))??;
        info!(production_id, found = found.is_some(), "production finished");
        if let Some(key) = found {
            strip_name(scope, key)?;
        }
        Ok(())
    }
}

fn strip_name(scope: &EditScope<'_>, key: NodeKey) -> DocumentResult<()> {
    let name_key = QName::tt("name");
    if scope.read(|store| store.attribute(key, &name_key).is_none())? {
        return Ok(());
    }
    scope.update_attributes(key, |attributes| {
        if let Some(name) = attributes.remove(&name_key) {
            if !name.is_empty() {
                attributes.insert(QName::tt("oldName"), name);
            }
        }
    })
}

/// Fill one parameter into a detached copy. Destination paths are relative
/// to the copy's top element; the first match receives the value.
fn apply_to_copy(
    store: &TreeStore,
    copy: &mut Tree,
    parameter: &ParameterValue,
    new_parent: NodeKey,
    now: f64,
) -> DocumentResult<()> {
    for destination in destinations(store, parameter)? {
        let top = copy.root();
        let context = AvtContext {
            store,
            now,
            context_epoch: copy[top].attribute(&QName::tls("epoch")),
            parent_epoch: epoch(store, Some(new_parent)),
            user_value: &parameter.value,
        };
        let value = avt::substitute(&destination.value, &context);
        let target = store
            .compile(&destination.path)?
            .select(copy, top)
            .first()
            .copied()
            .ok_or_else(|| {
                DocumentError::from(PathError::NoMatch {
                    path: destination.path.clone(),
                })
            })?;
        debug!(path = %destination.path, attribute = %destination.attribute, value = %value, "parameter");
        copy[target].attributes.insert(destination.attribute, value);
    }
    Ok(())
}

fn collect_in_place(
    store: &TreeStore,
    element: NodeKey,
    parameter: &ParameterValue,
    now: f64,
    changes: &mut BTreeMap<NodeKey, Vec<(QName, String)>>,
) -> DocumentResult<()> {
    for destination in destinations(store, parameter)? {
        let context = AvtContext {
            store,
            now,
            context_epoch: epoch(store, Some(element)),
            parent_epoch: epoch(store, store.parent(element)),
            user_value: &parameter.value,
        };
        let value = avt::substitute(&destination.value, &context);
        let target = store.find_first(element, &destination.path)?.ok_or_else(|| {
            DocumentError::from(PathError::NoMatch {
                path: destination.path.clone(),
            })
        })?;
        changes.entry(target).or_default().push((destination.attribute, value));
    }
    Ok(())
}

fn options(store: &TreeStore, list: NodeKey) -> DocumentResult<Vec<OptionItem>> {
    let items = store.find_all(list, "./au:item")?;
    Ok(items
        .into_iter()
        .map(|item| {
            let value = store.attribute(item, &QName::au("value")).map(str::to_string);
            let label = store
                .attribute(item, &QName::au("label"))
                .map(str::to_string)
                .or_else(|| value.clone());
            OptionItem { label, value }
        })
        .collect())
}

fn describe_parameter(
    store: &TreeStore,
    key: NodeKey,
    now: f64,
    problems: &mut Vec<String>,
) -> DocumentResult<ParameterDescription> {
    let attr = |local: &str| store.attribute(key, &QName::tt(local)).map(str::to_string);

    let parameter = match attr("parameter") {
        Some(parameter) => {
            split_destination(&parameter)?;
            parameter
        }
        None => store.path_of(key),
    };
    let kind = attr("type");
    let value = attr("value").map(|value| {
        let templated = matches!(kind.as_deref(), None | Some("string")) && value.contains('{');
        if !templated {
            return value;
        }
        let context = AvtContext {
            store,
            now,
            context_epoch: epoch(store, Some(key)),
            parent_epoch: epoch(store, store.parent(key)),
            user_value: "",
        };
        avt::substitute(&value, &context)
    });
    let required = attr("required").map(|r| !r.is_empty() && r != "false").unwrap_or(false);

    let options = match attr("optionListId") {
        Some(list_id) => {
            let list = store.by_id(&list_id).ok_or_else(|| {
                DocumentError::document(format!("tt:parameter optionListId does not exist: {}", list_id))
            })?;
            options(store, list)?
        }
        None => options(store, key)?,
    };
    if kind.as_deref() == Some("selection") && options.is_empty() {
        let message = "tt:parameter with type=selection but no options to select";
        warn!(parameter = %parameter, "{}", message);
        problems.push(message.to_string());
    }

    Ok(ParameterDescription {
        name: attr("name"),
        parameter,
        kind,
        value,
        required,
        options,
    })
}

fn describe(
    store: &TreeStore,
    key: NodeKey,
    state: EventState,
    now: f64,
    base: Option<&str>,
    problems: &mut Vec<String>,
) -> DocumentResult<EventDescription> {
    let attr = |local: &str| store.attribute(key, &QName::tt(local)).map(str::to_string);
    let trigger = state != EventState::Active;

    let mut parameters = Vec::new();
    for parameter in store.find_all(key, state.parameter_path())? {
        parameters.push(describe_parameter(store, parameter, now, problems)?);
    }

    let id = store.node(key)?.id().map(str::to_string);
    let production_id = attr("productionId").or_else(|| id.clone());
    let production_group = attr("productionGroup").or_else(|| production_id.clone());
    let preview_url = attr("previewUrl")
        .filter(|url| !url.is_empty())
        .map(|url| join_reference(base, &url));

    Ok(EventDescription {
        name: attr("name"),
        id,
        trigger,
        modify: !trigger,
        state,
        verb: if trigger { attr("verb") } else { attr("modVerb") },
        preview_url,
        longdesc: attr("longdesc"),
        production_id,
        production_group,
        parameters,
    })
}
