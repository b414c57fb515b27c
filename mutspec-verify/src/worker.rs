use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::error::VerifyError;

/// Program text plus verifier arguments, as sent to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
    pub arguments: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub response: String,
    /// Path the worker verified the program under; diagnostics are reported against it.
    #[serde(default)]
    pub file_name: String,
}

/// One verifier endpoint. Implementations return the verifier's raw output;
/// interpreting it is left to the classifier.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(&self, request: &VerifyRequest) -> Result<WorkerReply, VerifyError>;
}

/// Runs a local verifier binary on a private copy of each program.
#[derive(Clone, Debug)]
pub struct ProcessWorker {
    name: String,
    binary: PathBuf,
    file_name: String,
}

impl ProcessWorker {
    pub fn new(binary: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        let binary = binary.into();
        Self {
            name: binary.display().to_string(),
            binary,
            file_name: file_name.into(),
        }
    }

    fn io(&self, source: std::io::Error) -> VerifyError {
        VerifyError::Io {
            worker: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<WorkerReply, VerifyError> {
        let dir = TempDir::new().map_err(|e| self.io(e))?;
        let path = dir.path().join(&self.file_name);
        tokio::fs::write(&path, &request.code)
            .await
            .map_err(|e| self.io(e))?;

        let output = Command::new(&self.binary)
            .args(&request.arguments)
            .arg(&path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.io(e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(worker = %self.name, stderr = %stderr.trim_end(), "verifier stderr");
        }
        Ok(WorkerReply {
            response: String::from_utf8_lossy(&output.stdout).into_owned(),
            file_name: path.display().to_string(),
        })
    }
}

/// Remote verifier reached over HTTP: `POST <url>/verify` with a JSON
/// [`VerifyRequest`], answered by a JSON [`WorkerReply`].
#[derive(Clone, Debug)]
pub struct HttpWorker {
    url: String,
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VerifyError> {
        let url = normalize_url(&url.into());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Http {
                worker: url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { url, client })
    }

    fn http(&self, message: impl Into<String>) -> VerifyError {
        VerifyError::Http {
            worker: self.url.clone(),
            message: message.into(),
        }
    }
}

/// Accepts bare `host:port` entries as given on the command line.
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn name(&self) -> &str {
        &self.url
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<WorkerReply, VerifyError> {
        let resp = self
            .client
            .post(format!("{}/verify", self.url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.http(format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.http(format!("status {status}: {}", body.trim())));
        }
        resp.json::<WorkerReply>()
            .await
            .map_err(|e| self.http(format!("invalid reply: {e}")))
    }
}
