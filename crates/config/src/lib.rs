//! Server configuration: file loading, `${ENV_VAR}` resolution, and the typed
//! per-transport schema.
//!
//! Config files: `mcp.toml`, `mcp.yaml`, `mcp.yml`, or `mcp.json`.
//! Searched in `./` then `~/.config/relay/`.
//!
//! Placeholders are resolved on the parsed tree, not on the raw text, so a
//! missing variable can drop an optional header instead of failing the load.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    env_subst::{OPTIONAL_SECTIONS, Substitution, resolve_config, substitute_env},
    error::{Error, Result},
    loader::{config_dir, find_config_file, load_config_value, load_resolved_config},
    schema::{HttpServerConfig, StdioServerConfig},
};
