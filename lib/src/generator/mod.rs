//! Adapter fan-out.
//!
//! Retrieved schemas are grouped by adapter identifier and each group is
//! handed to one adapter subprocess: the runner command gets the adapter
//! identifier as its final argument, reads a JSON batch from stdin and
//! writes a JSON batch of equal length to stdout. The generator treats the
//! returned code fragments as opaque; it only enforces the protocol shape.

use std::collections::BTreeMap;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::language::{Language, Runner};
use crate::retriever::RetrievedSchema;

/// Upper bound on the stderr excerpt carried in error messages.
const MAX_STDERR_PREFIX: usize = 2048;

/// One adapter result: opaque code and type expressions plus the imports
/// they need.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub namespace: String,
    pub id: String,
    pub imports: Vec<String>,
    /// Validator expression as source text. May be empty (type-only).
    pub code: String,
    /// Compile-time type expression. May be empty (code-only).
    pub type_expression: String,
}

impl GenerationOutput {
    pub fn key(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

#[derive(Serialize)]
struct WireInput<'a> {
    namespace: &'a str,
    id: &'a str,
    schema: &'a RawValue,
}

#[derive(Deserialize)]
struct WireOutput {
    namespace: String,
    id: String,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    schema: String,
    #[serde(rename = "type", default)]
    type_expression: String,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The runner binary chosen for this language is not on `PATH`.
    #[error("adapter runner \"{command}\" not found; install it or adjust your project's package manager setup")]
    RunnerMissing { command: String },

    /// The adapter subprocess exited non-zero.
    #[error("adapter {adapter} exited with {status}: {stderr}")]
    AdapterExitNonZero {
        adapter: String,
        status: i32,
        stderr: String,
    },

    /// The adapter's stdout did not match the batch protocol.
    #[error("adapter {adapter} protocol violation: {detail}")]
    AdapterProtocolError { adapter: String, detail: String },

    #[error("failed to run adapter {adapter}")]
    Io {
        adapter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generation cancelled")]
    Cancelled,
}

/// Groups schemas by adapter, preserving input order inside each group.
/// The `BTreeMap` iteration order is the required lexicographic adapter
/// order.
pub fn group_by_adapter(
    schemas: &[RetrievedSchema],
) -> BTreeMap<String, Vec<&RetrievedSchema>> {
    let mut groups: BTreeMap<String, Vec<&RetrievedSchema>> = BTreeMap::new();
    for schema in schemas {
        groups.entry(schema.adapter.clone()).or_default().push(schema);
    }
    groups
}

/// Keeps only schemas whose adapter identifier contains `needle`.
pub fn filter_by_adapter(schemas: Vec<RetrievedSchema>, needle: &str) -> Vec<RetrievedSchema> {
    schemas
        .into_iter()
        .filter(|s| s.adapter.contains(needle))
        .collect()
}

/// Runs every adapter group and concatenates the outputs in
/// `(adapter_lexorder, input_order)`.
#[instrument(skip_all, fields(language = language.name, schemas = schemas.len()))]
pub async fn generate_all(
    schemas: &[RetrievedSchema],
    language: &'static Language,
    project_root: &std::path::Path,
    cancel: &CancellationToken,
) -> Result<Vec<GenerationOutput>, GenerateError> {
    if schemas.is_empty() {
        return Ok(Vec::new());
    }

    let runner = (language.detect_runner)(project_root);
    let mut outputs = Vec::with_capacity(schemas.len());
    for (adapter, group) in group_by_adapter(schemas) {
        outputs.extend(generate_batch(&runner, &adapter, &group, cancel).await?);
    }
    Ok(outputs)
}

/// Invokes one adapter subprocess for one batch of schemas.
///
/// Output items are re-ordered to match the batch's input order, so the
/// caller never observes adapter-side reordering.
#[instrument(skip(runner, batch, cancel), fields(schemas = batch.len()))]
pub async fn generate_batch(
    runner: &Runner,
    adapter: &str,
    batch: &[&RetrievedSchema],
    cancel: &CancellationToken,
) -> Result<Vec<GenerationOutput>, GenerateError> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    if cancel.is_cancelled() {
        return Err(GenerateError::Cancelled);
    }
    if !runner.available() {
        return Err(GenerateError::RunnerMissing {
            command: runner.command.clone(),
        });
    }

    let payload = marshal_batch(adapter, batch)?;

    info!(
        adapter,
        runner = %runner.command,
        schemas = batch.len(),
        "running adapter"
    );

    let io_err = |source: std::io::Error| GenerateError::Io {
        adapter: adapter.to_string(),
        source,
    };

    let mut child = tokio::process::Command::new(&runner.command)
        .args(&runner.args)
        .arg(adapter)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(io_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&payload).await.map_err(io_err)?;
        // Dropping closes the pipe so the adapter sees EOF.
    }

    // Pump stdout/stderr off the child while waiting, so a chatty adapter
    // can't deadlock on a full pipe.
    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        io_err(std::io::Error::other("child stdout unavailable"))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        io_err(std::io::Error::other("child stderr unavailable"))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = tokio::select! {
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let status = match waited {
        Some(status) => status.map_err(io_err)?,
        None => {
            warn!(adapter, "cancelling adapter subprocess");
            let _ = child.kill().await;
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(GenerateError::Cancelled);
        }
    };

    let stdout = stdout_task
        .await
        .map_err(|e| io_err(std::io::Error::other(e)))?
        .map_err(io_err)?;
    let stderr = stderr_task
        .await
        .map_err(|e| io_err(std::io::Error::other(e)))?
        .map_err(io_err)?;

    if !status.success() {
        return Err(GenerateError::AdapterExitNonZero {
            adapter: adapter.to_string(),
            status: status.code().unwrap_or(-1),
            stderr: stderr_prefix(&stderr),
        });
    }

    unmarshal_batch(adapter, batch, &stdout)
}

fn marshal_batch(adapter: &str, batch: &[&RetrievedSchema]) -> Result<Vec<u8>, GenerateError> {
    let mut inputs = Vec::with_capacity(batch.len());
    for schema in batch {
        let raw = std::str::from_utf8(&schema.schema)
            .ok()
            .and_then(|s| RawValue::from_string(s.to_string()).ok())
            .ok_or_else(|| GenerateError::AdapterProtocolError {
                adapter: adapter.to_string(),
                detail: format!("schema {} is not valid JSON", schema.key()),
            })?;
        inputs.push((schema, raw));
    }

    let wire: Vec<WireInput<'_>> = inputs
        .iter()
        .map(|(schema, raw)| WireInput {
            namespace: &schema.namespace,
            id: &schema.id,
            schema: &**raw,
        })
        .collect();

    serde_json::to_vec(&wire).map_err(|e| GenerateError::AdapterProtocolError {
        adapter: adapter.to_string(),
        detail: format!("failed to marshal batch: {e}"),
    })
}

/// Parses and validates the adapter's stdout: same length as the input,
/// and a one-to-one key correspondence.
fn unmarshal_batch(
    adapter: &str,
    batch: &[&RetrievedSchema],
    stdout: &[u8],
) -> Result<Vec<GenerationOutput>, GenerateError> {
    let protocol = |detail: String| GenerateError::AdapterProtocolError {
        adapter: adapter.to_string(),
        detail,
    };

    let outputs: Vec<WireOutput> = serde_json::from_slice(stdout)
        .map_err(|e| protocol(format!("stdout is not a valid output array: {e}")))?;

    if outputs.len() != batch.len() {
        return Err(protocol(format!(
            "expected {} outputs, got {}",
            batch.len(),
            outputs.len()
        )));
    }

    let mut by_key: BTreeMap<String, WireOutput> = BTreeMap::new();
    for output in outputs {
        let key = format!("{}:{}", output.namespace, output.id);
        if by_key.insert(key.clone(), output).is_some() {
            return Err(protocol(format!("duplicate output for {key}")));
        }
    }

    let mut ordered = Vec::with_capacity(batch.len());
    for schema in batch {
        let output = by_key
            .remove(&schema.key())
            .ok_or_else(|| protocol(format!("no output for {}", schema.key())))?;
        ordered.push(GenerationOutput {
            namespace: output.namespace,
            id: output.id,
            imports: output.imports,
            code: output.schema,
            type_expression: output.type_expression,
        });
    }

    debug!(adapter, outputs = ordered.len(), "adapter batch complete");
    Ok(ordered)
}

fn stderr_prefix(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= MAX_STDERR_PREFIX {
        trimmed.to_string()
    } else {
        let mut cut = MAX_STDERR_PREFIX;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn schema(namespace: &str, id: &str, json: &str) -> RetrievedSchema {
        RetrievedSchema {
            namespace: namespace.to_string(),
            id: id.to_string(),
            adapter: "@xschema/zod".to_string(),
            schema: json.as_bytes().to_vec(),
        }
    }

    /// Writes an executable shell script and returns a Runner invoking it.
    fn script_runner(dir: &TempDir, body: &str) -> Runner {
        let path = dir.path().join("adapter.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Runner {
            command: path.to_str().unwrap().to_string(),
            args: vec![],
        }
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn grouping_is_lexicographic_and_order_preserving() {
        let mut a = schema("ns", "One", "{}");
        a.adapter = "zod".to_string();
        let mut b = schema("ns", "Two", "{}");
        b.adapter = "@xschema/other".to_string();
        let mut c = schema("ns", "Three", "{}");
        c.adapter = "zod".to_string();

        let schemas = vec![a, b, c];
        let groups = group_by_adapter(&schemas);
        let adapters: Vec<&String> = groups.keys().collect();
        assert_eq!(adapters, vec!["@xschema/other", "zod"]);
        let zod_ids: Vec<&str> = groups["zod"].iter().map(|s| s.id.as_str()).collect();
        assert_eq!(zod_ids, vec!["One", "Three"]);
    }

    #[test]
    fn adapter_filter_matches_substrings() {
        let mut a = schema("ns", "A", "{}");
        a.adapter = "@xschema/zod".to_string();
        let mut b = schema("ns", "B", "{}");
        b.adapter = "@xschema/pydantic".to_string();

        let kept = filter_by_adapter(vec![a, b], "zod");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "A");
    }

    #[tokio::test]
    async fn batch_round_trips_through_adapter() {
        let dir = TempDir::new().unwrap();
        // Consumes stdin, emits a fixed well-formed batch for two schemas.
        let runner = script_runner(
            &dir,
            r#"cat > /dev/null
echo '[{"namespace":"users","id":"User","imports":["import { z } from \"zod\""],"schema":"z.string()","type":"z.infer<typeof users_User>"},{"namespace":"users","id":"Post","imports":[],"schema":"z.number()","type":""}]'"#,
        );

        let schemas = vec![
            schema("users", "User", r#"{"type": "string"}"#),
            schema("users", "Post", r#"{"type": "number"}"#),
        ];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();

        let outputs = generate_batch(&runner, "@xschema/zod", &refs, &token())
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].key(), "users:User");
        assert_eq!(outputs[0].code, "z.string()");
        assert_eq!(outputs[0].type_expression, "z.infer<typeof users_User>");
        assert_eq!(outputs[1].key(), "users:Post");
        assert_eq!(outputs[1].code, "z.number()");
    }

    #[tokio::test]
    async fn adapter_receives_the_marshalled_batch_on_stdin() {
        let dir = TempDir::new().unwrap();
        let echo_file = dir.path().join("received.json");
        // Copies stdin aside, then answers the protocol.
        let runner = script_runner(
            &dir,
            &format!(
                r#"cat > {}
echo '[{{"namespace":"ns","id":"A","imports":[],"schema":"x","type":""}}]'"#,
                echo_file.display()
            ),
        );

        let schemas = vec![schema("ns", "A", r#"{"type":"boolean"}"#)];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        generate_batch(&runner, "@xschema/zod", &refs, &token())
            .await
            .unwrap();

        let received: serde_json::Value =
            serde_json::from_slice(&fs::read(&echo_file).unwrap()).unwrap();
        assert_eq!(received[0]["namespace"], "ns");
        assert_eq!(received[0]["id"], "A");
        assert_eq!(received[0]["schema"]["type"], "boolean");
    }

    #[tokio::test]
    async fn outputs_are_reordered_to_input_order() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            r#"cat > /dev/null
echo '[{"namespace":"ns","id":"B","imports":[],"schema":"b","type":""},{"namespace":"ns","id":"A","imports":[],"schema":"a","type":""}]'"#,
        );

        let schemas = vec![schema("ns", "A", "{}"), schema("ns", "B", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let outputs = generate_batch(&runner, "zod", &refs, &token())
            .await
            .unwrap();
        assert_eq!(outputs[0].id, "A");
        assert_eq!(outputs[1].id, "B");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            r#"cat > /dev/null
echo 'bad schema' >&2
exit 1"#,
        );

        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let err = generate_batch(&runner, "@xschema/zod", &refs, &token())
            .await
            .unwrap_err();

        match &err {
            GenerateError::AdapterExitNonZero { adapter, status, stderr } => {
                assert_eq!(adapter, "@xschema/zod");
                assert_eq!(*status, 1);
                assert!(stderr.contains("bad schema"));
            }
            other => panic!("expected AdapterExitNonZero, got {other:?}"),
        }
        assert!(err.to_string().contains("bad schema"));
        assert!(err.to_string().contains("@xschema/zod"));
    }

    #[tokio::test]
    async fn count_mismatch_is_a_protocol_error() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            r#"cat > /dev/null
echo '[]'"#,
        );

        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let err = generate_batch(&runner, "zod", &refs, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::AdapterProtocolError { .. }));
    }

    #[tokio::test]
    async fn wrong_keys_are_a_protocol_error() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            r#"cat > /dev/null
echo '[{"namespace":"ns","id":"Other","imports":[],"schema":"x","type":""}]'"#,
        );

        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let err = generate_batch(&runner, "zod", &refs, &token())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no output for ns:A"));
    }

    #[tokio::test]
    async fn garbage_stdout_is_a_protocol_error() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            r#"cat > /dev/null
echo 'not json'"#,
        );

        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let err = generate_batch(&runner, "zod", &refs, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::AdapterProtocolError { .. }));
    }

    #[tokio::test]
    async fn missing_runner_is_reported() {
        let runner = Runner {
            command: PathBuf::from("/definitely/not/here")
                .to_str()
                .unwrap()
                .to_string(),
            args: vec![],
        };
        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let err = generate_batch(&runner, "zod", &refs, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::RunnerMissing { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_spawn_short_circuits() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(&dir, "echo '[]'");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();
        let err = generate_batch(&runner, "zod", &refs, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_kills_a_hung_adapter() {
        let dir = TempDir::new().unwrap();
        // Never reads stdin to completion, never exits on its own.
        let runner = script_runner(&dir, "sleep 60");

        let schemas = vec![schema("ns", "A", "{}")];
        let refs: Vec<&RetrievedSchema> = schemas.iter().collect();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = generate_batch(&runner, "zod", &refs, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn stderr_prefix_is_bounded() {
        let long = "x".repeat(MAX_STDERR_PREFIX * 2);
        let prefix = stderr_prefix(long.as_bytes());
        assert!(prefix.len() <= MAX_STDERR_PREFIX + 3);
        assert!(prefix.ends_with("..."));
    }
}
