//! Concurrent schema retrieval.
//!
//! Each declaration resolves to its raw JSON bytes: URLs are fetched with
//! retry and backoff, file paths are read relative to their declaring
//! config, inline payloads pass through verbatim. Work runs on a bounded
//! pool, deduplicated through an in-memory cache, and fails fast: the first
//! terminal error cancels everything still in flight. Results are returned
//! in input order.

mod cache;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::parser::{Declaration, SchemaSource};

use cache::SchemaCache;

const USER_AGENT: &str = concat!("xschema/", env!("CARGO_PKG_VERSION"));
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Retrieval options. Defaults match the CLI defaults.
#[derive(Debug, Clone)]
pub struct Options {
    /// Bound on concurrently running fetches.
    pub concurrency: usize,
    /// Per-attempt HTTP timeout.
    pub http_timeout: Duration,
    /// Total attempts per URL (1 = no retry).
    pub retries: u32,
    /// Disables the dedup cache; every declaration fetches independently.
    pub no_cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            concurrency: 10,
            http_timeout: Duration::from_secs(30),
            retries: 3,
            no_cache: false,
        }
    }
}

/// One declaration's schema bytes after resolution. The bytes are validated
/// JSON, verbatim from the source.
#[derive(Debug, Clone)]
pub struct RetrievedSchema {
    pub namespace: String,
    pub id: String,
    pub adapter: String,
    pub schema: Vec<u8>,
}

impl RetrievedSchema {
    pub fn key(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    /// All attempts against a URL failed with retryable causes.
    #[error("GET {url} failed after {attempts} attempt(s): {reason}")]
    HttpFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// A terminal (non-retryable) HTTP status.
    #[error("GET {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// A file-sourced schema that does not exist.
    #[error("schema file not found: {} (declared in {})", path.display(), origin.display())]
    FileMissing { path: PathBuf, origin: PathBuf },

    /// Source bytes that are not syntactically valid JSON.
    #[error("invalid JSON from {origin}: {detail}")]
    InvalidJson { origin: String, detail: String },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("retrieval cancelled")]
    Cancelled,

    #[error("retrieval worker panicked")]
    WorkerPanic,
}

/// Resolves every declaration to its schema bytes.
///
/// The result is positional: `result[i]` corresponds to `declarations[i]`.
/// Observable fetch ordering over the wire is unspecified.
#[instrument(skip_all, fields(count = declarations.len()))]
pub async fn retrieve(
    declarations: &[Declaration],
    options: &Options,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievedSchema>, RetrieveError> {
    if declarations.is_empty() {
        return Ok(Vec::new());
    }

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(options.http_timeout)
        .build()
        .map_err(|e| RetrieveError::HttpFailed {
            url: String::new(),
            attempts: 0,
            reason: format!("failed to build HTTP client: {e}"),
        })?;

    let cache = Arc::new(SchemaCache::new());
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let batch_cancel = cancel.child_token();

    let mut workers: JoinSet<Result<(usize, Arc<Vec<u8>>), RetrieveError>> = JoinSet::new();

    for (index, decl) in declarations.iter().enumerate() {
        let decl = decl.clone();
        let client = client.clone();
        let cache = Arc::clone(&cache);
        let semaphore = Arc::clone(&semaphore);
        let cancel = batch_cancel.clone();
        let options = options.clone();

        workers.spawn(async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => return Err(RetrieveError::Cancelled),
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|_| RetrieveError::Cancelled)?
                }
            };

            if options.no_cache {
                let bytes = Arc::new(fetch_one(&client, &decl, &options, &cancel).await?);
                return Ok((index, bytes));
            }

            // Single-flight per key: one coincident declaration fetches,
            // the rest wait and take the cache hit.
            let key = cache_key(&decl);
            let fetch_lock = cache.fetch_lock(&key).await;
            let _fetching = fetch_lock.lock().await;

            if let Some(bytes) = cache.get(&key).await {
                debug!(%key, "cache hit");
                return Ok((index, bytes));
            }

            let bytes = Arc::new(fetch_one(&client, &decl, &options, &cancel).await?);
            cache.insert(key, Arc::clone(&bytes)).await;
            Ok((index, bytes))
        });
    }

    let mut slots: Vec<Option<Arc<Vec<u8>>>> = vec![None; declarations.len()];
    let mut first_error: Option<RetrieveError> = None;

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok((index, bytes))) => slots[index] = Some(bytes),
            Ok(Err(error)) => {
                if first_error.is_none() {
                    // Fail fast: stop everything still in flight, then keep
                    // draining so no task outlives this call.
                    batch_cancel.cancel();
                    first_error = Some(error);
                }
            }
            Err(_) => {
                if first_error.is_none() {
                    batch_cancel.cancel();
                    first_error = Some(RetrieveError::WorkerPanic);
                }
            }
        }
    }

    if let Some(error) = first_error {
        // A worker that lost the race to the cancellation still reports
        // `Cancelled`; surface the root cause instead when we have one.
        return Err(error);
    }
    if cancel.is_cancelled() {
        return Err(RetrieveError::Cancelled);
    }

    Ok(declarations
        .iter()
        .zip(slots)
        .map(|(decl, bytes)| RetrievedSchema {
            namespace: decl.namespace.clone(),
            id: decl.id.clone(),
            adapter: decl.adapter.clone(),
            schema: bytes
                .map(|b| b.as_ref().clone())
                .unwrap_or_default(),
        })
        .collect())
}

fn cache_key(decl: &Declaration) -> String {
    match &decl.source {
        SchemaSource::Url(url) => format!("url:{url}"),
        SchemaSource::File(path) => format!("file:{}", resolve_file(decl, path).display()),
        SchemaSource::Inline(_) => format!("inline:{}", decl.key()),
    }
}

/// Resolves a file source against the declaring config's directory.
fn resolve_file(decl: &Declaration, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        return candidate;
    }
    decl.origin_path
        .parent()
        .map(|dir| dir.join(&candidate))
        .unwrap_or(candidate)
}

async fn fetch_one(
    client: &reqwest::Client,
    decl: &Declaration,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, RetrieveError> {
    match &decl.source {
        SchemaSource::Url(url) => fetch_url(client, url, options, cancel).await,
        SchemaSource::File(path) => load_file(decl, path),
        SchemaSource::Inline(value) => {
            // Verbatim passthrough; the value already parsed once.
            Ok(serde_json::to_vec(value).expect("inline JSON value reserializes"))
        }
    }
}

async fn fetch_url(
    client: &reqwest::Client,
    url: &str,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, RetrieveError> {
    let max_attempts = options.retries.max(1);
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(RetrieveError::Cancelled);
        }

        let reason = match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let body = response.bytes().await.map_err(|e| {
                        RetrieveError::HttpFailed {
                            url: url.to_string(),
                            attempts: attempt,
                            reason: e.to_string(),
                        }
                    })?;
                    return validate_json(body.to_vec(), url);
                }
                if retryable_status(status.as_u16()) {
                    format!("HTTP {}", status.as_u16())
                } else {
                    return Err(RetrieveError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
            }
            // Timeouts and transport errors are retryable.
            Err(error) => error.to_string(),
        };

        if attempt >= max_attempts {
            return Err(RetrieveError::HttpFailed {
                url: url.to_string(),
                attempts: attempt,
                reason,
            });
        }

        warn!(url, attempt, next_delay = ?delay, %reason, "retrying fetch");
        tokio::select! {
            _ = cancel.cancelled() => return Err(RetrieveError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        delay *= 2;
    }
}

fn retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

fn load_file(decl: &Declaration, path: &str) -> Result<Vec<u8>, RetrieveError> {
    let resolved = resolve_file(decl, path);
    let bytes = std::fs::read(&resolved).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            RetrieveError::FileMissing {
                path: resolved.clone(),
                origin: decl.origin_path.clone(),
            }
        } else {
            RetrieveError::Io {
                path: resolved.clone(),
                source,
            }
        }
    })?;
    validate_json(bytes, &resolved.display().to_string())
}

fn validate_json(bytes: Vec<u8>, origin: &str) -> Result<Vec<u8>, RetrieveError> {
    match serde_json::from_slice::<serde::de::IgnoredAny>(&bytes) {
        Ok(_) => Ok(bytes),
        Err(e) => Err(RetrieveError::InvalidJson {
            origin: origin.to_string(),
            detail: e.to_string(),
        }),
    }
}
