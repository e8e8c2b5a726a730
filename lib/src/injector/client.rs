//! Client-file rewiring.
//!
//! After generation the user's client source must import `schemas` from the
//! generated module and pass it to the client factory. Both edits are
//! text-level and idempotent: the factory call is located by regex, its
//! first-argument object literal by brace matching, and an existing
//! `schemas` key (shorthand, `schemas:` pair, or quoted `"schemas":` pair)
//! suppresses re-injection.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::language::Language;

use super::InjectError;

static SCHEMAS_KEY: Lazy<Regex> = Lazy::new(|| {
    // Matches the three recognized key forms at the top level of the
    // (masked) object literal: shorthand `schemas`, `schemas:`, and the
    // quoted variants.
    Regex::new(r#"[{,]\s*(?:"schemas"|'schemas'|schemas)\s*[:,}]"#).unwrap()
});

/// What the client edit actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEdit {
    pub changed: bool,
    pub injected_key: bool,
    pub injected_import: bool,
}

/// Rewires the user's client file for the generated module in `out_dir`.
///
/// Missing (or ambiguous) factory calls are a warning, not an error: the
/// user may add the call after a first generation run. Applying the edit
/// twice leaves the file byte-identical.
#[instrument(skip(language), fields(client = %client_file.display(), language = language.name))]
pub fn inject_client(
    client_file: &Path,
    language: &'static Language,
    out_dir: &Path,
) -> Result<ClientEdit, InjectError> {
    let original = std::fs::read_to_string(client_file).map_err(|source| InjectError::Io {
        path: client_file.to_path_buf(),
        source,
    })?;

    let mut modified = original.clone();
    let mut injected_key = false;

    match locate_config_object(&modified, language.client_factory) {
        ConfigObject::Found { start, end } => {
            let object = &modified[start..=end];
            if has_schemas_key(object) {
                debug!("schemas key already present");
            } else {
                let rewritten = insert_schemas_key(object);
                modified = format!("{}{}{}", &modified[..start], rewritten, &modified[end + 1..]);
                injected_key = true;
            }
        }
        ConfigObject::NotFound => {
            warn!(
                factory = language.client_factory,
                "no client-factory call found; skipping schemas key injection"
            );
        }
        ConfigObject::Ambiguous(count) => {
            warn!(
                factory = language.client_factory,
                count, "multiple client-factory calls found; skipping schemas key injection"
            );
        }
    }

    let (with_import, injected_import) = inject_import(&modified, language, out_dir);
    let modified = with_import;

    let changed = modified != original;
    if changed {
        super::write_atomic(client_file, modified.as_bytes())?;
        debug!("client file updated");
    }

    Ok(ClientEdit {
        changed,
        injected_key,
        injected_import,
    })
}

enum ConfigObject {
    /// Byte range of the object literal, inclusive of both braces.
    Found { start: usize, end: usize },
    NotFound,
    Ambiguous(usize),
}

fn locate_config_object(content: &str, factory: &str) -> ConfigObject {
    let pattern = format!(r"\b{}\s*\(", regex::escape(factory));
    let factory_re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return ConfigObject::NotFound,
    };

    let calls: Vec<_> = factory_re.find_iter(content).collect();
    match calls.len() {
        0 => ConfigObject::NotFound,
        1 => {
            let after_paren = calls[0].end();
            let rest = &content[after_paren..];
            let offset = rest.len() - rest.trim_start().len();
            let start = after_paren + offset;
            if !content[start..].starts_with('{') {
                // First argument is not an object literal; nothing we can
                // safely edit.
                return ConfigObject::NotFound;
            }
            match find_matching_brace(content, start) {
                Some(end) => ConfigObject::Found { start, end },
                None => ConfigObject::NotFound,
            }
        }
        n => ConfigObject::Ambiguous(n),
    }
}

/// Finds the closing brace matching the opening brace at `open`, skipping
/// braces inside string literals.
fn find_matching_brace(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Whether the object literal already carries a `schemas` key at its top
/// level, in any of the three recognized forms.
fn has_schemas_key(object: &str) -> bool {
    SCHEMAS_KEY.is_match(&mask_non_top_level(object))
}

/// Blanks everything nested deeper than the object's own braces and any
/// top-level *value* strings, so key detection can't be fooled by nested
/// objects or by string values mentioning `schemas`. Quoted strings in key
/// position (followed by `:`) are kept verbatim.
fn mask_non_top_level(object: &str) -> String {
    let bytes = object.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                let quote = bytes[i];
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let end = i.min(bytes.len().saturating_sub(1));
                i = (end + 1).min(bytes.len());

                let next_meaningful = bytes[i..].iter().find(|b| !b.is_ascii_whitespace());
                let is_key = next_meaningful == Some(&b':');
                if depth == 1 && is_key {
                    out.extend_from_slice(&bytes[start..i]);
                } else {
                    out.extend(std::iter::repeat(b' ').take(i - start));
                }
            }
            b'{' | b'[' => {
                depth += 1;
                out.push(if depth == 1 { bytes[i] } else { b' ' });
                i += 1;
            }
            b'}' | b']' => {
                out.push(if depth == 1 { bytes[i] } else { b' ' });
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b => {
                out.push(if depth == 1 { b } else { b' ' });
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Inserts `schemas` as the first key, preserving the rest of the literal
/// byte-for-byte.
fn insert_schemas_key(object: &str) -> String {
    let inner = &object[1..object.len() - 1];
    if inner.trim().is_empty() {
        return "{ schemas }".to_string();
    }
    format!("{{ schemas,{inner}}}")
}

/// Appends the schemas import unless an equivalent reference exists.
/// Returns the (possibly unchanged) content and whether it inserted.
fn inject_import(content: &str, language: &Language, out_dir: &Path) -> (String, bool) {
    let out_base = out_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(".xschema");
    let stem = Path::new(language.output_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("xschema");

    let canonical = (language.import_path)(&format!("{out_base}/{stem}"));
    let bare = canonical.trim_start_matches("./").trim_start_matches('.');
    if content.contains(&canonical) || content.contains(bare) {
        debug!(path = %canonical, "schemas import already present");
        return (content.to_string(), false);
    }

    let import_line = (language.build_import)(&canonical);
    let import_re = match Regex::new(language.import_pattern) {
        Ok(re) => re,
        Err(_) => return (content.to_string(), false),
    };

    let updated = match import_re.find_iter(content).last() {
        Some(last) => {
            let insert_at = last.end();
            format!(
                "{}\n{}{}",
                &content[..insert_at],
                import_line,
                &content[insert_at..]
            )
        }
        None => format!("{import_line}\n{content}"),
    };
    (updated, true)
}
