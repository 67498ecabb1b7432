//! Extension manifests
//!
//! ACP agents are registered through a two-level layout: `extensions.json`
//! lists the installed extensions, and each extension directory carries a
//! `manifest.json` with its launch configuration. Both are deserialized into
//! typed records here; validation happens at parse time through serde
//! rather than key-by-key checks.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

fn default_true() -> bool {
    true
}

/// Top-level `extensions.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionsIndex {
    #[serde(default)]
    pub extensions: Vec<ExtensionEntry>,
}

/// One entry of `extensions.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extension directory, relative to the extensions root
    #[serde(default)]
    pub path: String,
    /// Extension kind; only `"acp"` is understood by the core
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Launch configuration inside a `manifest.json` `agent` object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentLaunch {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub shellspec: Option<String>,
    #[serde(rename = "eagerSessionInit", default)]
    pub eager_session_init: bool,
}

/// Per-extension `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub agent: AgentLaunch,
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

/// Resolved static configuration for one kind of ACP agent
#[derive(Debug, Clone)]
pub struct AcpExtension {
    pub id: String,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub capabilities: serde_json::Value,
    /// Shellspec reference, defaulted from the extension id when absent
    pub shellspec: String,
    /// Extension directory relative to the extensions root
    pub path: String,
    pub eager_session_init: bool,
}

impl AcpExtension {
    /// Build the resolved extension from its manifest and index entry.
    pub fn from_manifest(manifest: ExtensionManifest, ext_path: &str) -> Result<Self> {
        if manifest.id.is_empty() {
            return Err(CoreError::InvalidManifest("id must not be empty".into()));
        }
        let shellspec = manifest.agent.shellspec.clone().unwrap_or_else(|| {
            format!("shellspec/{}.yaml", manifest.id.replace('-', "_"))
        });
        Ok(Self {
            id: manifest.id,
            name: manifest.name,
            command: manifest.agent.command,
            args: manifest.agent.args,
            env: manifest.agent.env,
            capabilities: manifest.capabilities,
            shellspec,
            path: ext_path.to_string(),
            eager_session_init: manifest.agent.eager_session_init,
        })
    }

    /// The argv used to launch the agent process.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.args.len());
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Parse `extensions.json` from disk.
pub fn load_extensions_index(path: &Path) -> Result<ExtensionsIndex> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Parse one extension `manifest.json` from disk.
pub fn load_extension_manifest(path: &Path) -> Result<ExtensionManifest> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_defaults() {
        let entry: ExtensionEntry =
            serde_json::from_str(r#"{"id": "gemini", "type": "acp"}"#).unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.kind, "acp");
        assert_eq!(entry.path, "");
    }

    #[test]
    fn manifest_parses_agent_block() {
        let manifest: ExtensionManifest = serde_json::from_str(
            r#"{
                "id": "gemini-cli",
                "name": "Gemini CLI",
                "agent": {
                    "command": "gemini",
                    "args": ["--experimental-acp"],
                    "env": {"NO_COLOR": "1"},
                    "eagerSessionInit": true
                },
                "capabilities": {"fs": true}
            }"#,
        )
        .unwrap();
        let ext = AcpExtension::from_manifest(manifest, "gemini").unwrap();
        assert_eq!(ext.argv(), vec!["gemini", "--experimental-acp"]);
        assert!(ext.eager_session_init);
        assert_eq!(ext.shellspec, "shellspec/gemini_cli.yaml");
        assert_eq!(ext.env.get("NO_COLOR").map(String::as_str), Some("1"));
    }

    #[test]
    fn shellspec_override_wins() {
        let manifest: ExtensionManifest = serde_json::from_str(
            r#"{"id": "x", "name": "X", "agent": {"shellspec": "custom/x.yaml"}}"#,
        )
        .unwrap();
        let ext = AcpExtension::from_manifest(manifest, "").unwrap();
        assert_eq!(ext.shellspec, "custom/x.yaml");
    }

    #[test]
    fn empty_id_rejected() {
        let manifest: ExtensionManifest =
            serde_json::from_str(r#"{"id": "", "name": "X"}"#).unwrap();
        assert!(AcpExtension::from_manifest(manifest, "").is_err());
    }
}
