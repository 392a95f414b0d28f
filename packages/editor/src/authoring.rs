//! # Authoring View
//!
//! Chapter/track/element structure used by the program authoring tool:
//!
//! ```text
//! tl:par  au:type=chapter
//!  ├─ tl:seq au:type=track au:region=R
//!  │   └─ tl:seq au:type=element au:asset=A
//!  │       ├─ tl:sleep tl:dur=<begin>
//!  │       └─ tl:par
//!  │           ├─ tl:sleep tl:dur=<duration>
//!  │           └─ (copy of the asset's content)
//!  └─ tl:seq au:type=subchapters
//!      └─ tl:par au:type=chapter ...
//! ```
//!
//! Assets live in `au:assets`, the screen layout in `au:layoutPreview`.

use crate::document::Document;
use crate::errors::{DocumentError, DocumentResult};
use crate::session::EditScope;
use serde::{Deserialize, Serialize};
use timeline_tree::id_generator::GENERATED_ID;
use timeline_tree::{Node, NodeKey, PathError, QName, Tree, TreeStore};
use tracing::info;

const LONG_DURATION: &str = "999999";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementInfo {
    pub id: Option<String>,
    pub asset: Option<String>,
    pub begin: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    pub id: Option<String>,
    pub region: Option<String>,
    pub elements: Vec<ElementInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tracks: Vec<TrackInfo>,
    pub chapters: Vec<ChapterInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub preview_url: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaInfo {
    pub region: Option<String>,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub orientation: Option<String>,
    pub name: Option<String>,
    pub areas: Vec<AreaInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutInfo {
    pub devices: Vec<DeviceInfo>,
    pub regions: Vec<RegionInfo>,
}

fn au(store: &TreeStore, key: NodeKey, local: &str) -> Option<String> {
    store.attribute(key, &QName::au(local)).map(str::to_string)
}

fn id_of(store: &TreeStore, key: NodeKey) -> Option<String> {
    store.node(key).ok().and_then(|node| node.id().map(str::to_string))
}

fn number(store: &TreeStore, key: NodeKey, local: &str) -> f64 {
    au(store, key, local)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// `tl:dur` of the first sleep at `path` below `element`
fn sleep_duration(store: &TreeStore, element: NodeKey, path: &str) -> DocumentResult<f64> {
    let sleep = store.find_first(element, path)?.ok_or_else(|| {
        DocumentError::document(format!("Element {} has no {}", store.path_of(element), path))
    })?;
    let dur = store.attribute(sleep, &QName::tl("dur")).unwrap_or("0");
    dur.trim()
        .trim_end_matches('s')
        .parse::<f64>()
        .map_err(|_| DocumentError::document(format!("Malformed tl:dur {} on {}", dur, store.path_of(sleep))))
}

fn element_info(store: &TreeStore, key: NodeKey) -> DocumentResult<ElementInfo> {
    Ok(ElementInfo {
        id: id_of(store, key),
        asset: au(store, key, "asset"),
        begin: sleep_duration(store, key, "./tl:sleep")?,
        duration: sleep_duration(store, key, "./tl:par/tl:sleep")?,
    })
}

fn track_info(store: &TreeStore, key: NodeKey) -> DocumentResult<TrackInfo> {
    let mut elements = Vec::new();
    for element in store.find_all(key, "./tl:seq[@au:type='element']")? {
        elements.push(element_info(store, element)?);
    }
    Ok(TrackInfo {
        id: id_of(store, key),
        region: au(store, key, "region"),
        elements,
    })
}

fn chapter_info(store: &TreeStore, key: NodeKey) -> DocumentResult<ChapterInfo> {
    let mut tracks = Vec::new();
    for track in store.find_all(key, "./tl:seq[@au:type='track']")? {
        tracks.push(track_info(store, track)?);
    }
    let mut chapters = Vec::new();
    for chapter in store.find_all(key, "./tl:seq[@au:type='subchapters']/*[@au:type='chapter']")? {
        chapters.push(chapter_info(store, chapter)?);
    }
    Ok(ChapterInfo {
        id: id_of(store, key),
        name: au(store, key, "name"),
        tracks,
        chapters,
    })
}

fn new_chapter(id: String) -> Tree {
    Tree::new(
        Node::new(QName::tl("par"))
            .with_attribute(QName::xml_id(), id)
            .with_attribute(QName::au("type"), "chapter"),
    )
}

pub struct Authoring<'a> {
    document: &'a Document,
}

impl<'a> Authoring<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self { document }
    }

    fn query<R>(&self, f: impl FnOnce(&TreeStore) -> DocumentResult<R>) -> DocumentResult<R> {
        let result = self.document.with_store(f).and_then(|r| r);
        self.document.report(result)
    }

    fn edit<R>(&self, reason: &str, f: impl FnOnce(&EditScope<'_>) -> DocumentResult<R>) -> DocumentResult<R> {
        let result = self.document.begin_scope(reason).and_then(|scope| {
            let value = f(&scope)?;
            scope.commit();
            Ok(value)
        });
        self.document.report(result)
    }

    /// The chapter tree, starting at the first chapter in the document
    pub fn chapters(&self) -> DocumentResult<Option<ChapterInfo>> {
        self.query(|store| {
            store
                .find_first(store.root(), ".//tl:par[@au:type='chapter']")?
                .map(|key| chapter_info(store, key))
                .transpose()
        })
    }

    pub fn chapter(&self, id: &str) -> DocumentResult<ChapterInfo> {
        self.query(|store| {
            let key = store.by_id(id).ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
            chapter_info(store, key)
        })
    }

    pub fn assets(&self) -> DocumentResult<Vec<AssetInfo>> {
        self.query(|store| {
            Ok(store
                .find_all(store.root(), ".//au:assets/au:asset")?
                .into_iter()
                .map(|key| AssetInfo {
                    id: id_of(store, key),
                    name: au(store, key, "name"),
                    description: au(store, key, "description"),
                    preview_url: au(store, key, "previewUrl"),
                    duration: au(store, key, "duration"),
                })
                .collect())
        })
    }

    pub fn layout(&self) -> DocumentResult<Option<LayoutInfo>> {
        self.query(|store| {
            let Some(preview) = store.find_first(store.root(), ".//au:layoutPreview")? else {
                return Ok(None);
            };
            let mut layout = LayoutInfo::default();
            for device in store.find_all(preview, "./au:device")? {
                let areas = store
                    .find_all(device, "./au:area")?
                    .into_iter()
                    .map(|area| AreaInfo {
                        region: au(store, area, "region"),
                        x: number(store, area, "x"),
                        y: number(store, area, "y"),
                        w: number(store, area, "w"),
                        h: number(store, area, "h"),
                    })
                    .collect();
                layout.devices.push(DeviceInfo {
                    kind: au(store, device, "type"),
                    orientation: au(store, device, "orientation"),
                    name: au(store, device, "name"),
                    areas,
                });
            }
            for region in store.find_all(preview, "./au:region")? {
                layout.regions.push(RegionInfo {
                    id: id_of(store, region),
                    name: au(store, region, "name"),
                    color: au(store, region, "color"),
                });
            }
            Ok(Some(layout))
        })
    }

    fn add_sibling_chapter(&self, id: &str, after: bool) -> DocumentResult<String> {
        info!(document = %self.document.id(), id, after, "add chapter");
        self.edit("addChapter", |scope| {
            let chapter = scope.element(id)?;
            let (parent, index) = scope.read(|store| (store.parent(chapter), store.tree().position(chapter)))?;
            let parent = parent.ok_or_else(|| DocumentError::document(format!("Chapter {} has no parent", id)))?;
            let index = index.unwrap_or(0) + usize::from(after);
            let new_id = scope.allocate_id(GENERATED_ID)?;
            scope.insert(parent, index, new_chapter(new_id.clone()))?;
            Ok(new_id)
        })
    }

    pub fn add_chapter_before(&self, id: &str) -> DocumentResult<String> {
        self.add_sibling_chapter(id, false)
    }

    pub fn add_chapter_after(&self, id: &str) -> DocumentResult<String> {
        self.add_sibling_chapter(id, true)
    }

    /// Append a new chapter to the subchapters of `id`
    pub fn add_sub_chapter(&self, id: &str) -> DocumentResult<String> {
        info!(document = %self.document.id(), id, "add sub chapter");
        self.edit("addSubChapter", |scope| {
            let chapter = scope.element(id)?;
            let existing = scope.read(|store| store.find_first(chapter, "./tl:seq[@au:type='subchapters']"))??;
            let container = match existing {
                Some(key) => key,
                None => {
                    let container_id = scope.allocate_id(GENERATED_ID)?;
                    let container = Tree::new(
                        Node::new(QName::tl("seq"))
                            .with_attribute(QName::xml_id(), container_id)
                            .with_attribute(QName::au("type"), "subchapters"),
                    );
                    scope.append(chapter, container)?
                }
            };
            let new_id = scope.allocate_id(GENERATED_ID)?;
            scope.append(container, new_chapter(new_id.clone()))?;
            Ok(new_id)
        })
    }

    pub fn rename_chapter(&self, id: &str, name: &str) -> DocumentResult<()> {
        info!(document = %self.document.id(), id, name, "rename chapter");
        self.edit("renameChapter", |scope| {
            let chapter = scope.element(id)?;
            scope.set_attribute(chapter, QName::au("name"), name)
        })
    }

    pub fn delete_chapter(&self, id: &str) -> DocumentResult<()> {
        info!(document = %self.document.id(), id, "delete chapter");
        self.edit("deleteChapter", |scope| {
            let chapter = scope.element(id)?;
            scope.remove(chapter)?;
            Ok(())
        })
    }

    /// Add an empty track for `region` to chapter `id`; returns the track id
    pub fn add_track(&self, id: &str, region: &str) -> DocumentResult<String> {
        info!(document = %self.document.id(), id, region, "add track");
        self.edit("addTrack", |scope| {
            let chapter = scope.element(id)?;
            let new_id = scope.allocate_id(GENERATED_ID)?;
            let track = Tree::new(
                Node::new(QName::tl("seq"))
                    .with_attribute(QName::xml_id(), new_id.clone())
                    .with_attribute(QName::au("region"), region)
                    .with_attribute(QName::au("type"), "track"),
            );
            scope.append(chapter, track)?;
            Ok(new_id)
        })
    }

    pub fn delete_track(&self, id: &str) -> DocumentResult<()> {
        self.delete_optional("deleteTrack", id)
    }

    pub fn delete_element(&self, id: &str) -> DocumentResult<()> {
        self.delete_optional("deleteElement", id)
    }

    fn delete_optional(&self, reason: &str, id: &str) -> DocumentResult<()> {
        info!(document = %self.document.id(), id, reason, "delete");
        self.edit(reason, |scope| {
            if let Some(key) = scope.by_id(id)? {
                scope.remove(key)?;
            }
            Ok(())
        })
    }

    /// Place asset `asset_id` on track `track_id`, at `position` among the
    /// track's children or at the end. Returns the new element's id.
    pub fn add_element(&self, track_id: &str, asset_id: &str, position: Option<usize>) -> DocumentResult<String> {
        info!(document = %self.document.id(), track = track_id, asset = asset_id, ?position, "add element");
        self.edit("addElement", |scope| {
            let track = scope.element(track_id)?;
            let asset = scope.element(asset_id)?;
            let content = scope.read(|store| store.tree().children(asset).to_vec())?;
            let content = match content.as_slice() {
                [only] => *only,
                other => {
                    return Err(DocumentError::document(format!(
                        "Asset {} must have exactly one child, has {}",
                        asset_id,
                        other.len()
                    )))
                }
            };
            let mut content = scope.copy_subtree(content)?;
            scope.after_copy(&mut content, false)?;

            let new_id = scope.allocate_id(GENERATED_ID)?;
            let mut element = Tree::new(
                Node::new(QName::tl("seq"))
                    .with_attribute(QName::xml_id(), new_id.clone())
                    .with_attribute(QName::au("type"), "element")
                    .with_attribute(QName::au("subtype"), "withStartAndDuration")
                    .with_attribute(QName::au("asset"), asset_id),
            );
            let top = element.root();
            element.append_child(top, Node::new(QName::tl("sleep")).with_attribute(QName::tl("dur"), "0"))?;
            let body = element.append_child(top, Node::new(QName::tl("par")))?;
            element.append_child(
                body,
                Node::new(QName::tl("sleep")).with_attribute(QName::tl("dur"), LONG_DURATION),
            )?;
            element.graft(body, 1, content)?;

            let index = match position {
                Some(index) => index,
                None => scope.read(|store| store.tree().children(track).len())?,
            };
            scope.insert(track, index, element)?;
            Ok(new_id)
        })
    }

    pub fn set_element_begin(&self, id: &str, begin: f64) -> DocumentResult<()> {
        self.set_sleep(id, "./tl:sleep", begin)
    }

    pub fn set_element_duration(&self, id: &str, duration: f64) -> DocumentResult<()> {
        self.set_sleep(id, "./tl:par/tl:sleep", duration)
    }

    fn set_sleep(&self, id: &str, path: &str, seconds: f64) -> DocumentResult<()> {
        info!(document = %self.document.id(), id, path, seconds, "set element timing");
        self.edit("setElementTiming", |scope| {
            let element = scope.element(id)?;
            let sleep = scope.read(|store| store.find_first(element, path))??.ok_or_else(|| {
                DocumentError::from(PathError::NoMatch {
                    path: path.to_string(),
                })
            })?;
            scope.set_attribute(sleep, QName::tl("dur"), format!("{}", seconds))
        })
    }
}
