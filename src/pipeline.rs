//! Client for the external TechniqueRAG analysis pipeline.
//!
//! The pipeline is an opaque collaborator process (in production a Python
//! script embedding the input with CTI-BERT and matching it against MITRE
//! ATT&CK techniques). It receives the text as a single positional argument
//! and must print one JSON document to stdout and exit zero. Everything else
//! is treated as total failure of the request.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::PipelineConfig;
use crate::error::{Result, TechniqueRagError};

/// Parsed pipeline stdout: the validated `techniques` array plus every other
/// top-level field, passed through to the response untouched.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub techniques: Vec<Value>,
    pub extra: Map<String, Value>,
}

impl PipelineOutput {
    /// Validate the pipeline contract: a JSON object with a `techniques` array.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut object = match value {
            Value::Object(map) => map,
            other => {
                return Err(TechniqueRagError::ResponseFormat {
                    message: format!("pipeline output is not a JSON object: {}", other),
                });
            }
        };
        let techniques = match object.remove("techniques") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(TechniqueRagError::ResponseFormat {
                    message: format!("'techniques' is not an array: {}", other),
                });
            }
            None => {
                return Err(TechniqueRagError::ResponseFormat {
                    message: "pipeline output missing 'techniques' array".into(),
                });
            }
        };
        Ok(Self {
            techniques,
            extra: object,
        })
    }
}

/// Spawns one pipeline process per analysis request.
#[derive(Debug, Clone)]
pub struct PipelineClient {
    interpreter: String,
    script: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl PipelineClient {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Run the pipeline over `text` and parse its stdout.
    ///
    /// The child is killed when the deadline expires, when stdout exceeds the
    /// capture bound, or when the request future is dropped (`kill_on_drop`).
    pub async fn analyze(&self, text: &str) -> Result<PipelineOutput> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script)
            .arg(text)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| TechniqueRagError::Analysis {
            message: format!(
                "failed to launch pipeline '{} {}': {}",
                self.interpreter,
                self.script.display(),
                e
            ),
        })?;

        let mut stdout_pipe = child.stdout.take().ok_or_else(|| TechniqueRagError::Internal {
            message: "pipeline stdout was not captured".into(),
        })?;
        let mut stderr_pipe = child.stderr.take().ok_or_else(|| TechniqueRagError::Internal {
            message: "pipeline stderr was not captured".into(),
        })?;

        // Read one byte past the bound so overflow is distinguishable from an
        // exact fit. Stderr gets the same bound to keep capture memory fixed;
        // it is drained on its own task so a blocked child cannot stall the
        // stdout read (and vice versa).
        let limit = self.max_output_bytes as u64 + 1;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = (&mut stderr_pipe).take(limit).read_to_end(&mut buf).await;
            buf
        });
        let capture = async {
            let mut stdout_buf = Vec::new();
            (&mut stdout_pipe)
                .take(limit)
                .read_to_end(&mut stdout_buf)
                .await?;

            if stdout_buf.len() > self.max_output_bytes {
                // Kill first so the child's pipes close and stderr drains.
                let _ = child.start_kill();
                let _ = child.wait().await;
                let stderr_buf = stderr_task.await.unwrap_or_default();
                return Ok::<_, std::io::Error>((None, stdout_buf, stderr_buf));
            }

            let status = child.wait().await?;
            let stderr_buf = stderr_task.await.unwrap_or_default();
            Ok((Some(status), stdout_buf, stderr_buf))
        };

        let captured = tokio::time::timeout(self.timeout, capture).await;
        let (status, stdout_buf, stderr_buf) = match captured {
            Ok(Ok(triple)) => triple,
            Ok(Err(e)) => {
                return Err(TechniqueRagError::Analysis {
                    message: format!("pipeline I/O error: {}", e),
                });
            }
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                tracing::error!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "pipeline timed out, child killed"
                );
                return Err(TechniqueRagError::Analysis {
                    message: format!("pipeline timed out after {}ms", self.timeout.as_millis()),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_buf);
        let stderr = String::from_utf8_lossy(&stderr_buf);

        let status = match status {
            Some(status) => status,
            None => {
                tracing::error!(
                    max_output_bytes = self.max_output_bytes,
                    "pipeline exceeded stdout capture bound, child killed"
                );
                return Err(TechniqueRagError::Analysis {
                    message: format!(
                        "pipeline stdout exceeded {} bytes",
                        self.max_output_bytes
                    ),
                });
            }
        };

        if !status.success() {
            tracing::error!(
                code = ?status.code(),
                stderr = %truncate_snippet(stderr.trim(), 500),
                "pipeline exited with failure"
            );
            return Err(TechniqueRagError::Analysis {
                message: format!(
                    "pipeline exit {}: {}",
                    status,
                    truncate_snippet(stderr.trim(), 500)
                ),
            });
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %truncate_snippet(stderr.trim(), 500), "pipeline stderr");
        }

        let value: Value = serde_json::from_str(stdout.trim()).map_err(|e| {
            tracing::error!(
                stdout = %truncate_snippet(stdout.trim(), 500),
                "pipeline produced non-JSON stdout"
            );
            TechniqueRagError::ResponseFormat {
                message: format!("pipeline stdout is not JSON: {}", e),
            }
        })?;

        PipelineOutput::from_value(value).inspect_err(|e| {
            tracing::error!(error = %e, "pipeline output failed schema validation");
        })
    }
}

fn truncate_snippet(input: &str, max: usize) -> String {
    if input.len() <= max {
        return input.to_string();
    }
    // Walk back to a char boundary; pipeline diagnostics can be multibyte.
    let mut cut = max;
    while !input.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &input[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_requires_object() {
        let err = PipelineOutput::from_value(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, TechniqueRagError::ResponseFormat { .. }));
    }

    #[test]
    fn output_requires_techniques_array() {
        let err = PipelineOutput::from_value(json!({"status": "ok"})).unwrap_err();
        assert!(matches!(err, TechniqueRagError::ResponseFormat { .. }));

        let err = PipelineOutput::from_value(json!({"techniques": "T1566"})).unwrap_err();
        assert!(matches!(err, TechniqueRagError::ResponseFormat { .. }));
    }

    #[test]
    fn output_passes_extra_fields_through() {
        let output = PipelineOutput::from_value(json!({
            "status": "ok",
            "techniques": [{"id": "T1566"}],
        }))
        .unwrap();
        assert_eq!(output.techniques, vec![json!({"id": "T1566"})]);
        assert_eq!(output.extra.get("status"), Some(&json!("ok")));
    }

    #[test]
    fn truncate_snippet_bounds_long_input() {
        let long = "x".repeat(600);
        let snippet = truncate_snippet(&long, 500);
        assert_eq!(snippet.len(), 503);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn truncate_snippet_respects_char_boundaries() {
        // 'x' + 300 two-byte chars = 601 bytes; byte 500 falls inside a char
        let mut long = String::from("x");
        for _ in 0..300 {
            long.push('é');
        }
        let snippet = truncate_snippet(&long, 500);
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() <= 503);
        assert!(snippet.trim_end_matches("...").chars().all(|c| c == 'x' || c == 'é'));
    }
}
