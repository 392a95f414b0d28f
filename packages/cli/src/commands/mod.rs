pub mod check;
pub mod events;
pub mod normalize;
pub mod trigger;

pub use check::{check, CheckArgs};
pub use events::{events, EventsArgs};
pub use normalize::{normalize, NormalizeArgs};
pub use trigger::{enqueue, trigger, TriggerArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use timeline_editor::Document;
use tracing::debug;

pub(crate) fn resolve_path(cwd: &str, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        PathBuf::from(cwd).join(file)
    }
}

/// Load a document file with the configured default settings
pub(crate) fn open_document(path: &Path, config: &Config) -> Result<Document> {
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    debug!(path = %path.display(), id, "opening document");
    let doc = Document::new(id).with_settings(config.document_settings());
    doc.load(&path.display().to_string())
        .with_context(|| format!("Cannot load {}", path.display()))?;
    Ok(doc)
}
