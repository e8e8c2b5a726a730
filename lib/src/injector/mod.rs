//! Generated-module assembly and client-file rewiring.
//!
//! Assembly merges adapter imports, builds the per-schema entry table,
//! runs the language's header/footer builders and renders the template to
//! `<out_dir>/<language.output_file>` with an atomic write. The client-file
//! edit lives in [`client`].

mod client;

pub use client::{inject_client, ClientEdit};

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, instrument};

use crate::generator::GenerationOutput;
use crate::language::{Language, SchemaEntry};
use crate::template::{self, TemplateError};

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("template rendering failed for {language}")]
    Template {
        language: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Assembles the generated module and writes it into `out_dir`.
///
/// Returns the path of the written file. Output is byte-deterministic for
/// a given input.
#[instrument(skip(outputs), fields(language = language.name, outputs = outputs.len()))]
pub fn inject(
    language: &'static Language,
    outputs: &[GenerationOutput],
    out_dir: &Path,
) -> Result<PathBuf, InjectError> {
    let rendered = render_module(language, outputs)?;

    std::fs::create_dir_all(out_dir).map_err(|source| InjectError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let out_path = out_dir.join(language.output_file);
    write_atomic(&out_path, rendered.as_bytes())?;

    info!(path = %out_path.display(), bytes = rendered.len(), "wrote generated module");
    Ok(out_path)
}

/// Renders the module text without touching the filesystem. Split out so
/// determinism is testable in isolation.
pub fn render_module(
    language: &'static Language,
    outputs: &[GenerationOutput],
) -> Result<String, InjectError> {
    let all_imports: Vec<String> = outputs
        .iter()
        .flat_map(|output| output.imports.iter().cloned())
        .collect();
    let imports = (language.merge_imports)(&all_imports);

    let entries = build_entries(language, outputs);
    let header = language.build_header.map(|f| f(&entries)).unwrap_or_default();
    let footer = language.build_footer.map(|f| f(&entries)).unwrap_or_default();

    let context = template_context(&entries, &imports, &header, &footer);
    template::render(language.template, &context).map_err(|source| InjectError::Template {
        language: language.name,
        source,
    })
}

/// Builds the entry rows in generator order, deriving variable names via
/// the language callback.
pub fn build_entries(language: &Language, outputs: &[GenerationOutput]) -> Vec<SchemaEntry> {
    outputs
        .iter()
        .map(|output| SchemaEntry {
            namespace: output.namespace.clone(),
            id: output.id.clone(),
            variable_name: (language.variable_name)(&output.namespace, &output.id),
            code: output.code.clone(),
            type_expression: output.type_expression.clone(),
        })
        .collect()
}

fn template_context(entries: &[SchemaEntry], imports: &str, header: &str, footer: &str) -> Value {
    json!({
        "imports": imports,
        "header": header,
        "footer": footer,
        "schemas": entries
            .iter()
            .map(|entry| {
                json!({
                    "namespace": entry.namespace,
                    "id": entry.id,
                    "key": entry.key(),
                    "var_name": entry.variable_name,
                    "code": entry.code,
                    "type": entry.type_expression,
                })
            })
            .collect::<Vec<Value>>(),
    })
}

/// Write-to-temp-then-rename so concurrent readers never see a partial
/// file.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), InjectError> {
    let write_err = |source: std::io::Error| InjectError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent).map_err(write_err)?;
    std::fs::write(temp.path(), content).map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
