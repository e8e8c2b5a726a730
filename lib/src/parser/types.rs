//! Parsed configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::language::Language;

/// Where a declared schema's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// Fetched over HTTP.
    Url(String),
    /// Loaded from a file, resolved relative to the declaring config.
    File(String),
    /// Embedded directly in the config document.
    Inline(Value),
}

/// One user-visible request for a named schema.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub namespace: String,
    pub id: String,
    pub source: SchemaSource,
    /// Identifier of the external converter, e.g. `@xschema/zod`.
    pub adapter: String,
    /// Absolute path of the declaring config document.
    pub origin_path: PathBuf,
}

impl Declaration {
    /// The globally unique key, e.g. `users:User`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

/// Raw shape of a config document. Unknown keys (including `$schema`,
/// which the caller has already resolved) are ignored for forward
/// compatibility.
#[derive(Debug, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub schemas: Vec<RawSchemaEntry>,
}

/// Raw shape of one schema entry inside a config document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchemaEntry {
    pub id: String,
    #[serde(rename = "sourceType")]
    pub source_type: String,
    pub source: Value,
    pub adapter: String,
}

/// One parsed xschema config document.
#[derive(Debug)]
pub struct ConfigDocument {
    pub path: PathBuf,
    /// Explicit `namespace` override or the filename stem.
    pub namespace: String,
    pub language: &'static Language,
    pub entries: Vec<RawSchemaEntry>,
}

/// The result of discovering and merging all config documents.
#[derive(Debug)]
pub struct ParseResult {
    /// The resolved target language; `None` when no documents were found.
    pub language: Option<&'static Language>,
    pub configs: Vec<ConfigDocument>,
    /// Flattened declarations, in document-discovery order.
    pub declarations: Vec<Declaration>,
}

impl ParseResult {
    /// Groups declarations by namespace.
    pub fn declarations_by_namespace(&self) -> BTreeMap<&str, Vec<&Declaration>> {
        let mut map: BTreeMap<&str, Vec<&Declaration>> = BTreeMap::new();
        for decl in &self.declarations {
            map.entry(decl.namespace.as_str()).or_default().push(decl);
        }
        map
    }

    /// Groups declarations by adapter identifier.
    pub fn declarations_by_adapter(&self) -> BTreeMap<&str, Vec<&Declaration>> {
        let mut map: BTreeMap<&str, Vec<&Declaration>> = BTreeMap::new();
        for decl in &self.declarations {
            map.entry(decl.adapter.as_str()).or_default().push(decl);
        }
        map
    }
}
