//! Import-statement merging for generated modules.
//!
//! Adapters emit one import list per schema; the generated module needs a
//! single canonical block. Merging is by source module: specifiers from the
//! same source are combined, sorted and deduplicated, default and
//! side-effect imports are preserved, and the final statement list is
//! sorted by source so output is stable across runs.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static TS_NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s*\{([^}]+)\}\s*from\s*['"]([^'"]+)['"]"#).unwrap());
static TS_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s+(\w+)\s+from\s*['"]([^'"]+)['"]"#).unwrap());
static TS_SIDE_EFFECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s*['"]([^'"]+)['"]"#).unwrap());

static PY_FROM: Lazy<Regex> = Lazy::new(|| Regex::new(r"from\s+(\S+)\s+import\s+(.+)").unwrap());
static PY_DIRECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^import\s+(\S+)").unwrap());

/// Merges TypeScript import statements.
///
/// `import { z } from "zod"` twice plus `import { ZodError } from "zod"`
/// becomes a single `import { ZodError, z } from "zod"`.
pub fn merge_ts_imports(imports: &[String]) -> String {
    let mut named: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut defaults: BTreeMap<String, String> = BTreeMap::new();
    let mut side_effects: Vec<String> = Vec::new();

    for import in imports {
        let import = import.trim();
        if import.is_empty() {
            continue;
        }

        if let Some(caps) = TS_NAMED.captures(import) {
            let source = caps[2].to_string();
            let entry = named.entry(source).or_default();
            for name in caps[1].split(',') {
                let name = name.trim();
                if !name.is_empty() {
                    entry.push(name.to_string());
                }
            }
            continue;
        }

        if let Some(caps) = TS_DEFAULT.captures(import) {
            defaults.insert(caps[2].to_string(), caps[1].to_string());
            continue;
        }

        if let Some(caps) = TS_SIDE_EFFECT.captures(import) {
            side_effects.push(caps[1].to_string());
        }
    }

    let mut statements: Vec<String> = Vec::new();

    side_effects.sort();
    side_effects.dedup();
    for source in &side_effects {
        statements.push(format!("import \"{source}\""));
    }

    let mut sources: Vec<&String> = named.keys().collect();
    for source in defaults.keys() {
        if !named.contains_key(source) {
            sources.push(source);
        }
    }
    sources.sort();

    for source in sources {
        let mut parts: Vec<String> = Vec::new();
        if let Some(default) = defaults.get(source) {
            parts.push(default.clone());
        }
        if let Some(names) = named.get(source) {
            let mut names = names.clone();
            names.sort();
            names.dedup();
            if !names.is_empty() {
                parts.push(format!("{{ {} }}", names.join(", ")));
            }
        }
        if !parts.is_empty() {
            statements.push(format!("import {} from \"{source}\"", parts.join(", ")));
        }
    }

    statements.join("\n")
}

/// Merges Python import statements.
///
/// `from pydantic import BaseModel` plus `from pydantic import Field`
/// becomes `from pydantic import BaseModel, Field`; `import json` lines are
/// deduplicated and emitted first.
pub fn merge_py_imports(imports: &[String]) -> String {
    let mut from_imports: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut direct: Vec<String> = Vec::new();

    for import in imports {
        let import = import.trim();
        if import.is_empty() {
            continue;
        }

        if let Some(caps) = PY_FROM.captures(import) {
            let entry = from_imports.entry(caps[1].to_string()).or_default();
            for name in caps[2].split(',') {
                let name = name.trim();
                if !name.is_empty() {
                    entry.push(name.to_string());
                }
            }
            continue;
        }

        if let Some(caps) = PY_DIRECT.captures(import) {
            direct.push(caps[1].to_string());
        }
    }

    let mut statements: Vec<String> = Vec::new();

    direct.sort();
    direct.dedup();
    for module in &direct {
        statements.push(format!("import {module}"));
    }

    for (module, names) in &from_imports {
        let mut names = names.clone();
        names.sort();
        names.dedup();
        statements.push(format!("from {module} import {}", names.join(", ")));
    }

    statements.join("\n")
}
