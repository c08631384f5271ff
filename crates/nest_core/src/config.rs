use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::{ContextOptions, CutoffMissPolicy};
use crate::layout::LayoutConfig;
use crate::paths::{self, CONFIG_TOML_FILE};

/// Top-level settings. Every field has a default, so partial files are fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub store: StoreSettings,
    pub titles: TitleSettings,
    pub context: ContextOptions,
    pub layout: LayoutConfig,
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreSettings {
    pub default_title: String,
    /// Reject branches whose branch point is not a message of the parent.
    pub validate_branch_point: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            default_title: "New Conversation".to_string(),
            validate_branch_point: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TitleSettings {
    pub branch_prefix: String,
    pub branch_label_chars: usize,
    /// Length of the title derived from a conversation's first user message.
    pub auto_title_chars: usize,
    pub ellipsis: String,
}

impl Default for TitleSettings {
    fn default() -> Self {
        Self {
            branch_prefix: "Sub: ".to_string(),
            branch_label_chars: 20,
            auto_title_chars: 40,
            ellipsis: "...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatSettings {
    pub model: Option<String>,
    /// `{text}` is replaced with the selected passage.
    pub branch_prompt_template: String,
    /// Written over the assistant placeholder when the model call fails.
    pub error_message: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: Some("openai/gpt-oss-120b".to_string()),
            branch_prompt_template: "More information on \"{text}\"".to_string(),
            error_message:
                "Sorry, I encountered an error while generating a response. Please try again."
                    .to_string(),
        }
    }
}

impl ChatSettings {
    pub fn branch_prompt(&self, selected_text: &str) -> String {
        self.branch_prompt_template.replace("{text}", selected_text)
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Config {
    /// Load from `~/.nodenest/config.json`, else `./nodenest.toml`, then apply
    /// environment overrides. Unreadable files are logged and skipped.
    pub fn load() -> Self {
        let mut config = Config::default();

        let json_path = paths::config_json_path();
        let toml_path = Path::new(CONFIG_TOML_FILE);
        for path in [json_path.as_path(), toml_path] {
            if !path.exists() {
                continue;
            }
            match paths::load_config_file::<Config>(path) {
                Ok(file_config) => {
                    tracing::debug!(path = %path.display(), "Config: loaded file");
                    config = file_config;
                    break;
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Config: skipping file"),
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load an explicit file, then apply environment overrides.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let mut config: Config = paths::load_config_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(height) = var("NEST_LEVEL_HEIGHT").and_then(|v| v.parse().ok()) {
            self.layout.level_height = height;
        }
        if let Some(width) = var("NEST_NODE_WIDTH").and_then(|v| v.parse().ok()) {
            self.layout.node_width = width;
        }
        if let Some(strict) = var("NEST_STRICT_CUTOFF") {
            self.context.cutoff_miss = if parse_bool_env(&strict) {
                CutoffMissPolicy::Fail
            } else {
                CutoffMissPolicy::IncludeAll
            };
        }
        if let Some(model) = var("NEST_MODEL") {
            self.chat.model = Some(model);
        }
        if let Some(message) = var("NEST_ERROR_MESSAGE") {
            self.chat.error_message = message;
        }
    }
}
