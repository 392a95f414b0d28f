use crate::document::Document;
use serde::{Deserialize, Serialize};
use timeline_tree::TreeStore;
use tracing::{debug, warn};

/// Per-document player options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub start_paused: bool,
    pub player_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_extra_offset: Option<f64>,
    pub preview_from_webcam: bool,
    pub enable_controls: bool,
    pub description: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_paused: false,
            player_mode: "standalone".to_string(),
            viewer_extra_offset: None,
            preview_from_webcam: false,
            enable_controls: false,
            description: String::new(),
        }
    }
}

/// Partial settings change; absent fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub start_paused: Option<bool>,
    pub player_mode: Option<String>,
    pub viewer_extra_offset: Option<f64>,
    pub preview_from_webcam: Option<bool>,
    pub enable_controls: Option<bool>,
    pub description: Option<String>,
}

impl Settings {
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.start_paused {
            self.start_paused = v;
        }
        if let Some(v) = update.player_mode {
            self.player_mode = v;
        }
        if let Some(v) = update.viewer_extra_offset {
            self.viewer_extra_offset = Some(v);
        }
        if let Some(v) = update.preview_from_webcam {
            self.preview_from_webcam = v;
        }
        if let Some(v) = update.enable_controls {
            self.enable_controls = v;
        }
        if let Some(v) = update.description {
            self.description = v;
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Settings declared on the first `au:settings` element, matched by local
/// attribute name
pub fn read_settings(store: &TreeStore) -> SettingsUpdate {
    let mut update = SettingsUpdate::default();
    let Ok(Some(key)) = store.find_first(store.root(), ".//au:settings") else {
        return update;
    };
    let Ok(node) = store.node(key) else {
        return update;
    };
    for (name, value) in &node.attributes {
        match name.local.as_str() {
            "startPaused" => update.start_paused = Some(flag(value)),
            "playerMode" => update.player_mode = Some(value.clone()),
            "viewerExtraOffset" if value.trim().is_empty() => {}
            "viewerExtraOffset" => match value.trim().parse::<f64>() {
                Ok(offset) => update.viewer_extra_offset = Some(offset),
                Err(_) => warn!(value = %value, "ignoring non-numeric viewerExtraOffset"),
            },
            "previewFromWebcam" => update.preview_from_webcam = Some(flag(value)),
            "enableControls" => update.enable_controls = Some(flag(value)),
            "description" => update.description = Some(value.clone()),
            other => debug!(attribute = other, "unknown setting"),
        }
    }
    update
}

/// Settings view of a document
pub struct SettingsView<'a> {
    document: &'a Document,
}

impl<'a> SettingsView<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn get(&self) -> Settings {
        self.document.read(|state| state.settings.clone())
    }

    pub fn update(&self, update: SettingsUpdate) -> Settings {
        debug!(document = %self.document.id(), ?update, "settings update");
        self.document.write(|state| {
            state.settings.apply(update);
            state.settings.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline_tree::NamespaceTable;

    #[test]
    fn test_read_settings_by_local_name() {
        let store = TreeStore::parse(
            br#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" xmlns:au="http://jackjansen.nl/2immerse/authoring">
  <au:settings startPaused="true" au:playerMode="tv" viewerExtraOffset="1.5" enableControls="no" />
</tl:document>"#,
            &NamespaceTable::standard(),
        )
        .unwrap();
        let update = read_settings(&store);
        assert_eq!(update.start_paused, Some(true));
        assert_eq!(update.player_mode.as_deref(), Some("tv"));
        assert_eq!(update.viewer_extra_offset, Some(1.5));
        assert_eq!(update.enable_controls, Some(false));
        assert_eq!(update.preview_from_webcam, None);
    }

    #[test]
    fn test_partial_update() {
        let mut settings = Settings::default();
        let update: SettingsUpdate = serde_json::from_str(r#"{"playerMode":"mobile","viewerExtraOffset":2}"#).unwrap();
        settings.apply(update);
        assert_eq!(settings.player_mode, "mobile");
        assert_eq!(settings.viewer_extra_offset, Some(2.0));
        assert!(!settings.start_paused);

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["startPaused"], false);
        assert_eq!(json["playerMode"], "mobile");
    }
}
