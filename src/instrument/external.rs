//! Instrumenter backed by an external command.
//!
//! The command is run through `sh -c` in the project directory. It receives
//! the targets as JSON on stdin and must print the instrumented files as JSON
//! on stdout:
//!
//! ```json
//! {"files": [{"path": "...", "relativePath": "...", "source": "..."}]}
//! ```
//!
//! ```json
//! {"files": [{"path": "...", "source": "...", "sites": {"0xabc": {"line": 3}}}]}
//! ```

use super::{InstrumentedFile, Instrumentation, Instrumenter};
use crate::errors::InstrumentError;
use crate::select::SourceFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile<'a> {
    path: String,
    relative_path: String,
    source: &'a str,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    files: Vec<RequestFile<'a>>,
}

#[derive(Debug, Deserialize)]
struct ResponseFile {
    path: String,
    source: String,
    #[serde(default)]
    sites: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Response {
    files: Vec<ResponseFile>,
}

/// Runs a user-supplied instrumentation command.
#[derive(Debug, Clone)]
pub struct ExternalInstrumenter {
    command: String,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ExternalInstrumenter {
    pub fn new(command: impl Into<String>, working_dir: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    fn request_path(file: &SourceFile) -> String {
        file.path().to_string_lossy().into_owned()
    }

    fn assemble(
        targets: &[SourceFile],
        response: Response,
    ) -> Result<Instrumentation, InstrumentError> {
        let mut by_path: HashMap<String, ResponseFile> = response
            .files
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect();

        let files = targets
            .iter()
            .map(|target| {
                let returned = by_path
                    .remove(&Self::request_path(target))
                    .ok_or_else(|| InstrumentError::MissingFile {
                        path: target.path(),
                    })?;
                Ok(InstrumentedFile {
                    file: target.clone(),
                    instrumented: returned.source,
                    sites: returned.sites,
                })
            })
            .collect::<Result<Vec<_>, InstrumentError>>()?;

        if !by_path.is_empty() {
            tracing::warn!(
                extra = by_path.len(),
                "Instrumenter returned files that were not requested; ignoring them"
            );
        }

        Ok(Instrumentation::from_files(files))
    }
}

#[async_trait]
impl Instrumenter for ExternalInstrumenter {
    async fn instrument(&self, targets: &[SourceFile]) -> Result<Instrumentation, InstrumentError> {
        if targets.is_empty() {
            return Ok(Instrumentation::default());
        }

        let request = Request {
            files: targets
                .iter()
                .map(|f| RequestFile {
                    path: Self::request_path(f),
                    relative_path: f.relative_path().to_string_lossy().into_owned(),
                    source: f.source(),
                })
                .collect(),
        };
        let request_json =
            serde_json::to_vec(&request).map_err(InstrumentError::InvalidResponse)?;

        tracing::debug!(
            command = %self.command,
            files = targets.len(),
            "Running instrumenter"
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InstrumentError::SpawnFailed {
                command: self.command.clone(),
                source,
            })?;

        // Feed stdin concurrently with output collection so a large request
        // cannot deadlock against a full stdout pipe.
        let stdin = child.stdin.take();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&request_json).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                writer.abort();
                return Err(InstrumentError::TimedOut {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        match writer.await {
            Ok(Ok(())) => {}
            // The command may exit without reading all of stdin; its exit
            // status decides the outcome.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(InstrumentError::Io(e)),
            Err(join) => return Err(InstrumentError::Io(std::io::Error::other(join))),
        }

        if !output.status.success() {
            return Err(InstrumentError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let response: Response =
            serde_json::from_slice(&output.stdout).map_err(InstrumentError::InvalidResponse)?;
        Self::assemble(targets, response)
    }
}
