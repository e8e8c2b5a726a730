//! Config-document discovery and merging.
//!
//! Walks the project tree for `.json`/`.jsonc` files whose `$schema` points
//! into the xschema registry, parses them, and merges their schema entries
//! into a flat declaration list under two invariants: `(namespace, id)` is
//! globally unique, and all documents belong to one target language unless
//! the caller filtered explicitly.

mod jsonc;
mod types;

pub use types::{ConfigDocument, Declaration, ParseResult, RawSchemaEntry, SchemaSource};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::language::{self, Language};

use types::RawConfig;

/// File-filtering options for discovery. Patterns are matched against the
/// candidate's full path; an unset pattern imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Only consider config files whose path matches.
    pub include: Option<Regex>,
    /// Skip config files whose path matches.
    pub exclude: Option<Regex>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// The same `(namespace, id)` was declared by two documents.
    #[error("duplicate schema id \"{namespace}:{id}\" declared in {} and {}", first.display(), second.display())]
    DuplicateId {
        namespace: String,
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Config documents of more than one language, with no `--lang` filter.
    #[error("config documents target multiple languages ({languages}); pass a language filter to pick one")]
    AmbiguousLanguage { languages: String },

    /// A `$schema` under the xschema prefix that the registry doesn't know.
    #[error("unknown xschema config URL {url} in {}", path.display())]
    UnknownSchemaUrl { url: String, path: PathBuf },

    /// A config document that doesn't match the expected shape.
    #[error("malformed config {}: {detail}", path.display())]
    MalformedConfig { path: PathBuf, detail: String },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse cancelled")]
    Cancelled,
}

/// Discovers and merges all config documents under `root`.
///
/// `filter` restricts the run to one language; documents of other languages
/// are then skipped instead of tripping [`ParseError::AmbiguousLanguage`].
/// `options` narrows discovery by path regex. Cancellation is observed
/// between files.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn parse(
    root: &Path,
    filter: Option<&'static Language>,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<ParseResult, ParseError> {
    let mut configs: Vec<ConfigDocument> = Vec::new();

    for path in discover_candidates(root, options) {
        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }
        if let Some(config) = parse_document(&path)? {
            match filter {
                Some(lang) if !std::ptr::eq(config.language, lang) => {
                    debug!(path = %path.display(), language = config.language.name, "skipped by language filter");
                }
                _ => configs.push(config),
            }
        }
    }

    let resolved = resolve_language(&configs, filter)?;
    let declarations = merge_declarations(&configs)?;

    debug!(
        configs = configs.len(),
        declarations = declarations.len(),
        "parse complete"
    );

    Ok(ParseResult {
        language: resolved,
        configs,
        declarations,
    })
}

/// Candidate config files under `root`, sorted by path so merge order (and
/// therefore duplicate attribution) is deterministic.
fn discover_candidates(root: &Path, options: &Options) -> Vec<PathBuf> {
    let skip_dirs = language::all_skip_dirs();

    let mut walker = WalkBuilder::new(root);
    walker.filter_entry(move |entry| {
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        if !is_dir {
            return true;
        }
        entry
            .file_name()
            .to_str()
            .map_or(true, |name| !skip_dirs.contains(&name))
    });

    let mut paths: Vec<PathBuf> = walker
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("jsonc")
            )
        })
        .filter(|path| {
            let text = path.to_string_lossy();
            options.include.as_ref().map_or(true, |re| re.is_match(&text))
                && options.exclude.as_ref().map_or(true, |re| !re.is_match(&text))
        })
        .collect();

    paths.sort();
    paths
}

/// Parses one candidate file. Returns `Ok(None)` for documents that are not
/// xschema configs at all (no `$schema`, foreign `$schema`, or content that
/// isn't a JSON object).
fn parse_document(path: &Path) -> Result<Option<ConfigDocument>, ParseError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let normalized = jsonc::strip_comments(&raw);
    let Ok(value) = serde_json::from_str::<Value>(&normalized) else {
        // Arbitrary non-JSON .json files in the tree are none of our
        // business unless they claimed to be xschema configs, which an
        // unparseable document cannot do.
        return Ok(None);
    };

    let Some(schema_url) = value.get("$schema").and_then(Value::as_str) else {
        return Ok(None);
    };
    if !language::is_xschema_url(schema_url) {
        return Ok(None);
    }

    let Some(lang) = language::by_schema_url(schema_url) else {
        return Err(ParseError::UnknownSchemaUrl {
            url: schema_url.to_string(),
            path: path.to_path_buf(),
        });
    };

    let config: RawConfig =
        serde_json::from_value(value).map_err(|e| ParseError::MalformedConfig {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let namespace = match config.namespace {
        Some(ns) if !ns.is_empty() => ns,
        _ => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string(),
    };

    debug!(path = %path.display(), language = lang.name, %namespace, entries = config.schemas.len(), "parsed config");

    Ok(Some(ConfigDocument {
        path: path.to_path_buf(),
        namespace,
        language: lang,
        entries: config.schemas,
    }))
}

fn resolve_language(
    configs: &[ConfigDocument],
    filter: Option<&'static Language>,
) -> Result<Option<&'static Language>, ParseError> {
    if let Some(lang) = filter {
        return Ok(Some(lang));
    }

    let mut names: Vec<&str> = configs.iter().map(|c| c.language.name).collect();
    names.sort();
    names.dedup();

    match names.len() {
        0 => Ok(None),
        1 => Ok(Some(configs[0].language)),
        _ => Err(ParseError::AmbiguousLanguage {
            languages: names.join(", "),
        }),
    }
}

fn merge_declarations(configs: &[ConfigDocument]) -> Result<Vec<Declaration>, ParseError> {
    let mut declarations: Vec<Declaration> = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for config in configs {
        for entry in &config.entries {
            let decl = build_declaration(config, entry)?;
            let key = decl.key();
            if let Some(first) = seen.get(&key) {
                return Err(ParseError::DuplicateId {
                    namespace: decl.namespace,
                    id: decl.id,
                    first: first.clone(),
                    second: config.path.clone(),
                });
            }
            seen.insert(key, config.path.clone());
            declarations.push(decl);
        }
    }

    Ok(declarations)
}

fn build_declaration(
    config: &ConfigDocument,
    entry: &RawSchemaEntry,
) -> Result<Declaration, ParseError> {
    let malformed = |detail: String| ParseError::MalformedConfig {
        path: config.path.clone(),
        detail,
    };

    let source = match entry.source_type.as_str() {
        "url" => match entry.source.as_str() {
            Some(url) => SchemaSource::Url(url.to_string()),
            None => {
                return Err(malformed(format!(
                    "schema \"{}\": sourceType \"url\" requires a string source",
                    entry.id
                )))
            }
        },
        "file" => match entry.source.as_str() {
            Some(path) => SchemaSource::File(path.to_string()),
            None => {
                return Err(malformed(format!(
                    "schema \"{}\": sourceType \"file\" requires a string source",
                    entry.id
                )))
            }
        },
        "json" => {
            if !entry.source.is_object() {
                return Err(malformed(format!(
                    "schema \"{}\": sourceType \"json\" requires an object source",
                    entry.id
                )));
            }
            SchemaSource::Inline(entry.source.clone())
        }
        other => {
            return Err(malformed(format!(
                "schema \"{}\": unknown sourceType \"{other}\"",
                entry.id
            )))
        }
    };

    if entry.adapter.is_empty() {
        warn!(id = %entry.id, config = %config.path.display(), "schema entry has an empty adapter");
    }

    Ok(Declaration {
        namespace: config.namespace.clone(),
        id: entry.id.clone(),
        source,
        adapter: entry.adapter.clone(),
        origin_path: config.path.clone(),
    })
}
