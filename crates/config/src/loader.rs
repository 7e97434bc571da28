use std::path::{Path, PathBuf};

use {serde_json::Value, tracing::debug};

use crate::{
    env_subst::resolve_config,
    error::{Error, Result},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["mcp.toml", "mcp.yaml", "mcp.yml", "mcp.json"];

/// Parse a config file into a raw tree (placeholders untouched).
pub fn load_config_value(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_value(&raw, path)
}

/// Parse a config file and resolve every `${ENV_VAR}` placeholder in it.
pub fn load_resolved_config(path: &Path) -> Result<Value> {
    let tree = load_config_value(path)?;
    debug!(path = %path.display(), "resolving config placeholders");
    resolve_config(&tree)
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./mcp.{toml,yaml,yml,json}`
/// 2. `~/.config/relay/mcp.{toml,yaml,yml,json}`
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = find_config_file_in(Path::new(".")) {
        return Some(path);
    }
    config_dir().and_then(|dir| find_config_file_in(&dir))
}

fn find_config_file_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/relay/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "relay").map(|d| d.config_dir().to_path_buf())
}

fn parse_config_value(raw: &str, path: &Path) -> Result<Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(v).map_err(|e| parse_err(e.to_string()))
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(v).map_err(|e| parse_err(e.to_string()))
        },
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
