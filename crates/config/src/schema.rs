//! Typed per-transport server settings, deserialized from a resolved tree.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for a server launched as a local child process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides layered on top of the parent environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, alias = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StdioServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Split a whole command line such as `npx pkg "/some dir"` into command
    /// and arguments. Double quotes group words and are stripped.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut words = split_command_line(line).into_iter();
        let command = words
            .next()
            .ok_or_else(|| Error::message("empty command line"))?;
        Ok(Self {
            command,
            args: words.collect(),
            ..Default::default()
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Settings for a remote server reached over HTTP POST.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    pub url: String,
    /// Static headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, alias = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl HttpServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn split_command_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_word = true;
            },
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            },
            c => {
                current.push(c);
                in_word = true;
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn command_line_respects_quotes() {
        let cfg =
            StdioServerConfig::from_command_line(r#"npx  @scope/server "/tmp/my dir" --flag"#)
                .unwrap();
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args, vec!["@scope/server", "/tmp/my dir", "--flag"]);
        assert!(cfg.env.is_empty());
    }

    #[test]
    fn command_line_keeps_empty_quoted_argument() {
        let cfg = StdioServerConfig::from_command_line(r#"server """#).unwrap();
        assert_eq!(cfg.args, vec![String::new()]);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        assert!(StdioServerConfig::from_command_line("   ").is_err());
    }

    #[test]
    fn stdio_config_ignores_unknown_keys() {
        let cfg: StdioServerConfig = serde_json::from_value(json!({
            "transport": "stdio",
            "command": "npx",
            "args": ["@modelcontextprotocol/server-filesystem@0.6.2", "/tmp"],
            "version": "0.6.2",
            "versionLockedAt": "2026-01-20",
            "timeoutMs": 1500
        }))
        .unwrap();
        assert_eq!(cfg.args.len(), 2);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn http_config_defaults() {
        let cfg: HttpServerConfig =
            serde_json::from_value(json!({ "url": "http://localhost:3000/mcp" })).unwrap();
        assert!(cfg.headers.is_empty());
        assert_eq!(cfg.request_timeout(), None);
    }
}
