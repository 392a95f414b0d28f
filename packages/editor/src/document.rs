//! # Document Handle
//!
//! A live timeline document: the indexed tree plus everything that goes with
//! it while it is being served (clock, settings, error message, preview
//! contexts).
//!
//! ## Lifecycle
//!
//! ```text
//! load ──▶ edit scopes ──▶ save
//!   │          │
//!   │          └─▶ replica (ForwardHandler) + publisher (ScopePublisher)
//!   └─ wantstatus / ids on status elements, settings from au:settings
//! ```
//!
//! All state sits behind one reentrant lock. Reads and short writes take it
//! through [`Document::read`] and [`Document::write`]; structural edits go
//! through an [`EditScope`].

use crate::authoring::Authoring;
use crate::clock::{ClockSource, PausableClock, SystemClock};
use crate::errors::{DocumentError, DocumentResult};
use crate::events::Events;
use crate::forwarder::{ForwardHandler, ScopePublisher};
use crate::operations::Operation;
use crate::recorder::EditRecorder;
use crate::remote::Remote;
use crate::session::EditScope;
use crate::settings::{read_settings, Settings, SettingsView};
use crate::xml::XmlView;
use chrono::Utc;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::cell::RefCell;
use std::sync::Arc;
use timeline_common::{local_path, ResourceLoader, UrlLoader};
use timeline_tree::{
    serialize_document, NamespaceTable, NodeKey, QName, StoreResult, Tree, TreeStore, NS_TIMELINE_INTERNAL,
};
use tracing::{debug, error, info};

/// Everything guarded by the document lock
pub(crate) struct DocumentState {
    pub(crate) id: String,
    pub(crate) namespaces: NamespaceTable,
    pub(crate) store: Option<TreeStore>,
    pub(crate) url: Option<String>,
    pub(crate) base: Option<String>,
    pub(crate) base_added: bool,
    pub(crate) recorder: Option<EditRecorder>,
    pub(crate) clock: PausableClock,
    pub(crate) default_settings: Settings,
    pub(crate) settings: Settings,
    pub(crate) last_error: Option<String>,
    pub(crate) diverged: bool,
    pub(crate) companion_active: bool,
    pub(crate) preview_clock_epoch: Option<f64>,
    pub(crate) context_id: Option<String>,
    pub(crate) context_ids: Vec<String>,
    pub(crate) opened: String,
}

impl DocumentState {
    pub(crate) fn store(&self) -> DocumentResult<&TreeStore> {
        self.store.as_ref().ok_or(DocumentError::NoDocument)
    }

    pub(crate) fn store_mut(&mut self) -> DocumentResult<&mut TreeStore> {
        self.store.as_mut().ok_or(DocumentError::NoDocument)
    }

    fn describe(&self) -> String {
        match &self.url {
            Some(url) => format!("{}, {}, {}", self.id, self.opened, url),
            None => format!("{}, {}", self.id, self.opened),
        }
    }
}

pub struct Document {
    state: ReentrantMutex<RefCell<DocumentState>>,
    forward_handler: RwLock<Option<Arc<dyn ForwardHandler>>>,
    publisher: RwLock<Option<Arc<dyn ScopePublisher>>>,
    loader: Arc<dyn ResourceLoader>,
}

impl Document {
    /// Empty document with the standard prefixes and the system clock
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        info!(document = %id, "created document");
        let opened = Utc::now().format("%d-%b-%y %H:%M UTC").to_string();
        let state = DocumentState {
            id,
            namespaces: NamespaceTable::standard(),
            store: None,
            url: None,
            base: None,
            base_added: false,
            recorder: None,
            clock: PausableClock::new(Arc::new(SystemClock)),
            default_settings: Settings::default(),
            settings: Settings::default(),
            last_error: None,
            diverged: false,
            companion_active: false,
            preview_clock_epoch: None,
            context_id: None,
            context_ids: Vec::new(),
            opened,
        };
        Self {
            state: ReentrantMutex::new(RefCell::new(state)),
            forward_handler: RwLock::new(None),
            publisher: RwLock::new(None),
            loader: Arc::new(UrlLoader::new()),
        }
    }

    pub fn with_clock(mut self, source: Arc<dyn ClockSource>) -> Self {
        self.state.get_mut().get_mut().clock = PausableClock::new(source);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_namespaces(mut self, namespaces: NamespaceTable) -> Self {
        self.state.get_mut().get_mut().namespaces = namespaces;
        self
    }

    /// Settings every load starts from, before `au:settings` is applied
    pub fn with_settings(mut self, settings: Settings) -> Self {
        let state = self.state.get_mut().get_mut();
        state.default_settings = settings.clone();
        state.settings = settings;
        self
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<DocumentState>> {
        self.state.lock()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&DocumentState) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut DocumentState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Run `f` against the loaded tree
    pub fn with_store<R>(&self, f: impl FnOnce(&TreeStore) -> R) -> DocumentResult<R> {
        self.read(|state| state.store().map(f))
    }

    pub fn id(&self) -> String {
        self.read(|state| state.id.clone())
    }

    pub fn url(&self) -> Option<String> {
        self.read(|state| state.url.clone())
    }

    pub fn base(&self) -> Option<String> {
        self.read(|state| state.base.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.read(|state| state.store.is_some())
    }

    pub fn description(&self) -> String {
        self.read(|state| state.settings.description.clone())
    }

    pub fn last_error(&self) -> Option<String> {
        self.read(|state| state.last_error.clone())
    }

    /// A replayed scope failed; the tree no longer mirrors its primary
    /// and should be reloaded
    pub fn is_diverged(&self) -> bool {
        self.read(|state| state.diverged)
    }

    /// Shown with the next event listing until a request succeeds
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.write(|state| state.last_error = Some(message));
    }

    pub(crate) fn clear_error(&self) {
        self.write(|state| state.last_error = None);
    }

    /// Record a failure as the user-visible error message and pass it on
    pub(crate) fn report<T>(&self, result: DocumentResult<T>) -> DocumentResult<T> {
        if let Err(e) = &result {
            let message = match e {
                DocumentError::ConcurrentEdit { .. } => return result,
                DocumentError::Format(_) => "XML parse error in document".to_string(),
                other => other.to_string(),
            };
            error!(document = %self.id(), error = %e, "request failed");
            self.set_error(message);
        }
        result
    }

    pub fn clock_now(&self) -> f64 {
        self.read(|state| state.clock.now())
    }

    pub fn clock_running(&self) -> bool {
        self.read(|state| state.clock.is_running())
    }

    /// Number of elements in the tree
    pub fn element_count(&self) -> usize {
        self.read(|state| state.store.as_ref().map(TreeStore::len).unwrap_or(0))
    }

    pub fn element_path(&self, id: &str) -> DocumentResult<String> {
        self.with_store(|store| {
            store
                .by_id(id)
                .map(|key| store.path_of(key))
                .ok_or_else(|| DocumentError::NotFound(id.to_string()))
        })?
    }

    pub fn attribute(&self, id: &str, name: &QName) -> DocumentResult<Option<String>> {
        self.with_store(|store| {
            let key = store.by_id(id).ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
            Ok(store.attribute(key, name).map(str::to_string))
        })?
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.with_store(|store| store.has_id(id)).unwrap_or(false)
    }

    /// Load from serialized bytes. On failure the previous tree stays.
    pub fn load_xml(&self, data: &[u8]) -> DocumentResult<()> {
        info!(document = %self.id(), bytes = data.len(), "load xml");
        let result = self.install(data, None);
        self.report(result)
    }

    /// Load from a path or `file:` URL. A missing `tim:base` is set to the URL.
    pub fn load(&self, reference: &str) -> DocumentResult<()> {
        info!(document = %self.id(), reference, "load");
        let result = timeline_common::document_url(reference)
            .map_err(DocumentError::from)
            .and_then(|url| {
                let data = self.loader.fetch(reference)?;
                self.install(&data, Some(url.to_string()))
            });
        self.report(result)
    }

    fn install(&self, data: &[u8], url: Option<String>) -> DocumentResult<()> {
        let namespaces = self.read(|state| state.namespaces.clone());
        let mut store = TreeStore::parse(data, &namespaces)?;
        prepare_loaded(&mut store)?;

        let root = store.root();
        let base_name = QName::tim("base");
        let (base, base_added) = match (store.attribute(root, &base_name), &url) {
            (Some(base), _) => (Some(base.to_string()), false),
            (None, Some(url)) => {
                store.set_attribute(root, base_name, url.clone())?;
                debug!(base = %url, "added tim:base");
                (Some(url.clone()), true)
            }
            (None, None) => (None, false),
        };
        let declared = read_settings(&store);

        self.write(|state| {
            state.store = Some(store);
            state.url = url;
            state.base = base;
            state.base_added = base_added;
            let mut settings = state.default_settings.clone();
            settings.description = state.describe();
            settings.apply(declared);
            state.settings = settings;
            state.last_error = None;
            state.diverged = false;
        });
        info!(document = %self.id(), elements = self.element_count(), "document loaded");
        Ok(())
    }

    /// Serialized form for saving: bookkeeping attributes stripped and
    /// insignificant whitespace removed
    pub fn to_xml(&self) -> DocumentResult<String> {
        self.read(|state| {
            let store = state.store()?;
            let tree = prepare_for_save(store, state.base_added)?;
            Ok(serialize_document(&tree, store.namespaces()))
        })
    }

    /// Write [`to_xml`](Self::to_xml) to a path or `file:` URL
    pub fn save(&self, reference: &str) -> DocumentResult<()> {
        info!(document = %self.id(), reference, "save");
        let result = self.to_xml().and_then(|xml| {
            let path = local_path(reference)?;
            std::fs::write(path, xml)?;
            Ok(())
        });
        if result.is_ok() {
            self.clear_error();
        }
        self.report(result)
    }

    /// Open an edit scope. Fails with ConcurrentEdit while another scope is
    /// open on this thread.
    pub fn begin_scope(&self, reason: &str) -> DocumentResult<EditScope<'_>> {
        EditScope::open(self, reason)
    }

    /// Register the replica that replays every committed scope
    pub fn set_forward_handler(&self, handler: Option<Arc<dyn ForwardHandler>>) {
        *self.forward_handler.write() = handler;
    }

    /// Register the serve layer that numbers and publishes every scope
    pub fn set_publisher(&self, publisher: Option<Arc<dyn ScopePublisher>>) {
        *self.publisher.write() = publisher;
    }

    /// Called by a closing scope after the lock has been released
    pub(crate) fn dispatch(&self, reason: &str, operations: &[Operation]) {
        let id = self.id();
        if !operations.is_empty() {
            let handler = self.forward_handler.read().clone();
            if let Some(handler) = handler {
                debug!(document = %id, reason, operations = operations.len(), "forwarding to replica");
                if let Err(e) = handler.apply_operations(operations) {
                    error!(document = %id, reason, error = %e, "replica rejected operations");
                }
            }
        }
        let publisher = self.publisher.read().clone();
        if let Some(publisher) = publisher {
            publisher.publish_scope(&id, operations);
        }
    }

    /// Push the current event listing to the publisher, if there is one
    pub(crate) fn publish_events(&self) {
        let publisher = self.publisher.read().clone();
        let Some(publisher) = publisher else {
            return;
        };
        match self.events().list_events() {
            Ok(listing) => publisher.publish_events(&self.id(), &listing),
            Err(e) => error!(document = %self.id(), error = %e, "cannot build event listing"),
        }
    }

    pub fn events(&self) -> Events<'_> {
        Events::new(self)
    }

    pub fn xml(&self) -> XmlView<'_> {
        XmlView::new(self)
    }

    pub fn remote(&self) -> Remote<'_> {
        Remote::new(self)
    }

    pub fn authoring(&self) -> Authoring<'_> {
        Authoring::new(self)
    }

    pub fn settings(&self) -> SettingsView<'_> {
        SettingsView::new(self)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id())
            .field("elements", &self.element_count())
            .finish()
    }
}

/// Mark the elements the preview player reports status for, and make sure
/// they (and the root) can be addressed by id
fn prepare_loaded(store: &mut TreeStore) -> StoreResult<()> {
    let root = store.root();
    let mut status_elements: Vec<NodeKey> = store.tree().children(root).first().copied().into_iter().collect();
    for key in store.find_all(root, ".//tt:events/..")? {
        if !status_elements.contains(&key) {
            status_elements.push(key);
        }
    }
    for key in status_elements {
        store.set_attribute(key, QName::tt("wantstatus"), "true")?;
        store.ensure_id(key)?;
    }
    store.ensure_id(root)?;
    Ok(())
}

fn trimmed(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn prepare_for_save(store: &TreeStore, base_added: bool) -> StoreResult<Tree> {
    let mut tree = store.copy_subtree(store.root())?;
    let root = tree.root();
    if base_added {
        tree[root].attributes.remove(&QName::tim("base"));
    }
    let real_duration = QName::tt("_realDur");
    for key in tree.descendants(root) {
        let node = &mut tree[key];
        if let Some(duration) = node.attributes.remove(&real_duration) {
            if !duration.is_empty() {
                node.attributes.insert(QName::tl("dur"), duration);
            }
        }
        node.attributes.retain(|name, _| !name.in_namespace(NS_TIMELINE_INTERNAL));
        node.text = trimmed(node.text.take());
        node.tail = trimmed(node.tail.take());
    }
    Ok(tree)
}
