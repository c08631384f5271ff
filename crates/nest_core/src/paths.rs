use std::path::{Path, PathBuf};

use anyhow::Context;

/// Node Nest configuration directory (~/.nodenest)
pub fn nest_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".nodenest")
}

/// ~/.nodenest/config.json
pub fn config_json_path() -> PathBuf {
    nest_dir().join("config.json")
}

/// Project-local TOML config, resolved against the working directory.
pub const CONFIG_TOML_FILE: &str = "nodenest.toml";

/// Load a JSON or TOML file, picking the format from the extension.
pub fn load_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}
