use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use timeline_editor::{Settings, SettingsUpdate};
use timeline_serve::ServeConfig;

pub const DEFAULT_CONFIG_NAME: &str = "timeline.config.json";

/// Timeline configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Document settings applied before a document's own `au:settings`
    #[serde(default)]
    pub settings: SettingsUpdate,

    /// Generation history and push channel tuning
    #[serde(default)]
    pub serve: ServeConfig,

    /// tracing filter used when RUST_LOG is not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn document_settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.apply(self.settings.clone());
        settings
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("warn")
    }
}
