//! Pipeline orchestration.
//!
//! Sequences parse, retrieve, generate and inject, threading one
//! cancellation token through every stage and reporting progress as
//! structured events. Stage errors are wrapped with a stage tag and abort
//! the run; partial writes are confined to the output directory and the
//! client file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::generator::{self, GenerateError};
use crate::injector::{self, InjectError};
use crate::language::{self, Language};
use crate::parser::{self, ParseError, SchemaSource};
use crate::retriever::{self, RetrieveError};

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Project root searched for config documents.
    pub project: PathBuf,
    /// Directory receiving the generated module.
    pub out_dir: PathBuf,
    /// Optional language filter (required when configs mix languages).
    pub language: Option<&'static Language>,
    /// Client source file to rewire after generation, if any.
    pub client_file: Option<PathBuf>,
    /// Only run adapters whose identifier contains this substring.
    pub adapter_filter: Option<String>,
    /// Include/exclude regexes narrowing config discovery.
    pub parse: parser::Options,
    pub retrieve: retriever::Options,
    /// Stop after retrieval and report the generation plan.
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            out_dir: PathBuf::from(".xschema"),
            language: None,
            client_file: None,
            adapter_filter: None,
            parse: parser::Options::default(),
            retrieve: retriever::Options::default(),
            dry_run: false,
        }
    }
}

/// Progress notifications, rendered by the CLI as spinners.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ParseStarted,
    ParseFinished { configs: usize, declarations: usize },
    RetrieveStarted { count: usize },
    RetrieveFinished,
    AdapterStarted { adapter: String, schemas: usize },
    AdapterFinished { adapter: String, outputs: usize },
    GeneratedFileWritten { path: PathBuf },
    ClientPatched { path: PathBuf, changed: bool },
    /// One line of the dry-run plan.
    PlanEntry { adapter: String, key: String, source: String },
}

/// What a completed run did.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub declarations: usize,
    pub outputs: usize,
    pub generated_file: Option<PathBuf>,
    pub client_changed: bool,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("retrieve: {0}")]
    Retrieve(#[from] RetrieveError),
    #[error("generate: {0}")]
    Generate(#[from] GenerateError),
    #[error("inject: {0}")]
    Inject(#[from] InjectError),
}

/// Runs the full pipeline.
pub async fn run(
    options: &PipelineOptions,
    cancel: &CancellationToken,
    mut progress: impl FnMut(ProgressEvent),
) -> Result<PipelineSummary, PipelineError> {
    let mut summary = PipelineSummary::default();

    // 1. Parse
    progress(ProgressEvent::ParseStarted);
    let parsed = parser::parse(&options.project, options.language, &options.parse, cancel)?;
    progress(ProgressEvent::ParseFinished {
        configs: parsed.configs.len(),
        declarations: parsed.declarations.len(),
    });
    summary.declarations = parsed.declarations.len();

    let Some(lang) = parsed.language else {
        return finish_empty_project(options, &mut summary, &mut progress);
    };

    if parsed.declarations.is_empty() {
        warn!("config documents declare no schemas");
        if !options.dry_run {
            summary.generated_file = Some(injector::inject(lang, &[], &options.out_dir)?);
        }
        return Ok(summary);
    }

    // 2. Retrieve
    progress(ProgressEvent::RetrieveStarted {
        count: parsed.declarations.len(),
    });
    let retrieved = retriever::retrieve(&parsed.declarations, &options.retrieve, cancel).await?;
    progress(ProgressEvent::RetrieveFinished);

    let retrieved = match &options.adapter_filter {
        Some(needle) => {
            let kept = generator::filter_by_adapter(retrieved, needle);
            if kept.is_empty() {
                warn!(filter = %needle, "no schemas match the adapter filter");
            }
            kept
        }
        None => retrieved,
    };

    if options.dry_run {
        emit_plan(&parsed.declarations, &retrieved, &mut progress);
        return Ok(summary);
    }

    // 3. Generate, one subprocess per adapter group.
    let runner = (lang.detect_runner)(&options.project);
    let mut outputs = Vec::with_capacity(retrieved.len());
    for (adapter, group) in generator::group_by_adapter(&retrieved) {
        progress(ProgressEvent::AdapterStarted {
            adapter: adapter.clone(),
            schemas: group.len(),
        });
        let batch = generator::generate_batch(&runner, &adapter, &group, cancel).await?;
        progress(ProgressEvent::AdapterFinished {
            adapter,
            outputs: batch.len(),
        });
        outputs.extend(batch);
    }
    summary.outputs = outputs.len();

    // 4. Inject
    let generated = injector::inject(lang, &outputs, &options.out_dir)?;
    progress(ProgressEvent::GeneratedFileWritten {
        path: generated.clone(),
    });
    summary.generated_file = Some(generated);

    if let Some(client) = &options.client_file {
        let edit = injector::inject_client(client, lang, &options.out_dir)?;
        summary.client_changed = edit.changed;
        progress(ProgressEvent::ClientPatched {
            path: client.clone(),
            changed: edit.changed,
        });
    }

    info!(
        declarations = summary.declarations,
        outputs = summary.outputs,
        "pipeline complete"
    );
    Ok(summary)
}

/// No config documents at all: write an empty stub for whatever language
/// the project looks like, so user imports resolve before any schemas are
/// declared.
fn finish_empty_project(
    options: &PipelineOptions,
    summary: &mut PipelineSummary,
    progress: &mut impl FnMut(ProgressEvent),
) -> Result<PipelineSummary, PipelineError> {
    warn!("no xschema config documents found");

    let Some(lang) = options.language.or_else(|| detect_project_language(&options.project)) else {
        return Ok(std::mem::take(summary));
    };
    if options.dry_run {
        return Ok(std::mem::take(summary));
    }

    let path = injector::inject(lang, &[], &options.out_dir)?;
    progress(ProgressEvent::GeneratedFileWritten { path: path.clone() });
    summary.generated_file = Some(path);
    Ok(std::mem::take(summary))
}

/// Guesses the project's language from well-known manifest files.
fn detect_project_language(project: &Path) -> Option<&'static Language> {
    const TS_MARKERS: &[&str] = &[
        "package.json",
        "tsconfig.json",
        "bun.lockb",
        "package-lock.json",
    ];
    const PY_MARKERS: &[&str] = &["pyproject.toml", "setup.py", "requirements.txt", "Pipfile"];

    if TS_MARKERS.iter().any(|m| project.join(m).is_file()) {
        return language::by_name("typescript");
    }
    if PY_MARKERS.iter().any(|m| project.join(m).is_file()) {
        return language::by_name("python");
    }
    None
}

fn emit_plan(
    declarations: &[parser::Declaration],
    retrieved: &[retriever::RetrievedSchema],
    progress: &mut impl FnMut(ProgressEvent),
) {
    for (adapter, group) in generator::group_by_adapter(retrieved) {
        for schema in group {
            let source = declarations
                .iter()
                .find(|d| d.key() == schema.key())
                .map(|d| match &d.source {
                    SchemaSource::Url(url) => format!("url {url}"),
                    SchemaSource::File(path) => format!("file {path}"),
                    SchemaSource::Inline(_) => "inline".to_string(),
                })
                .unwrap_or_default();
            progress(ProgressEvent::PlanEntry {
                adapter: adapter.clone(),
                key: schema.key(),
                source,
            });
        }
    }
}
