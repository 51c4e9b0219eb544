//! MCP server descriptors bundled with plugins
//!
//! A plugin may ship `.mcp.json` at its root, either as a flat
//! `{ "server": { ... } }` map or wrapped as `{ "mcpServers": { ... } }`.
//! Only object-valued server entries are kept; the server configs
//! themselves are passed through untouched.

use serde_json::{Map, Value};
use tokio::fs;

use crate::plugin::types::{McpServerRecord, PluginInfo};

pub const MCP_DESCRIPTOR_FILE: &str = ".mcp.json";

const MCP_SERVERS_KEY: &str = "mcpServers";

/// Collect validated server maps from every plugin that has a descriptor
pub async fn extract_mcp_servers(plugins: &[PluginInfo]) -> Vec<McpServerRecord> {
    let mut records = Vec::new();

    for plugin in plugins {
        if let Some(servers) = read_descriptor(plugin).await {
            records.push(McpServerRecord {
                source: plugin.source.clone(),
                servers,
            });
        }
    }

    records
}

async fn read_descriptor(plugin: &PluginInfo) -> Option<Map<String, Value>> {
    let path = plugin.path.join(MCP_DESCRIPTOR_FILE);
    let content = fs::read_to_string(&path).await.ok()?;

    let doc: Value = match serde_json::from_str(&content) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!(plugin = %plugin.source, "ignoring malformed {}: {}", MCP_DESCRIPTOR_FILE, e);
            return None;
        }
    };

    let servers = validate_servers(&doc);
    (!servers.is_empty()).then_some(servers)
}

/// Pick the server map out of a descriptor and drop non-object entries
pub fn validate_servers(doc: &Value) -> Map<String, Value> {
    let candidates = match doc.get(MCP_SERVERS_KEY) {
        Some(Value::Object(wrapped)) => wrapped,
        _ => match doc {
            Value::Object(flat) => flat,
            _ => return Map::new(),
        },
    };

    candidates
        .iter()
        .filter(|(_, config)| config.is_object())
        .map(|(name, config)| (name.clone(), config.clone()))
        .collect()
}
