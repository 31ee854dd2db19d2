//! Remote compiler/execution service backend
//!
//! One HTTP call per execution carrying the language id, pinned toolchain
//! version, source text and stdin. Transport failures map to
//! `ConnectionError`; otherwise the remote exit code decides the status and
//! remote stdout/stderr pass through trimmed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ExecStatus, ExecutionBackend, ExecutionResult};
use crate::languages::LanguageSpec;

const DEFAULT_ENDPOINT: &str = "https://emkc.org/api/v2/piston/execute";

#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<RemoteFile<'a>>,
    stdin: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoteFile<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    compile: Option<RemoteStage>,
    run: Option<RemoteStage>,
}

#[derive(Debug, Deserialize)]
struct RemoteStage {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteBackend {
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var("EXECUTE_API_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl ExecutionBackend for RemoteBackend {
    async fn execute(&self, language: &LanguageSpec, program: &str, stdin: &str) -> ExecutionResult {
        let Some(version) = language.toolchain_version.as_deref() else {
            return ExecutionResult::connection_error(format!(
                "No toolchain version configured for {}",
                language.id
            ));
        };

        let request = RemoteRequest {
            language: language.remote_id.as_deref().unwrap_or(&language.id),
            version,
            files: vec![RemoteFile { content: program }],
            stdin,
        };

        debug!(
            "Submitting {} ({}) to execution service at {}",
            request.language, version, self.endpoint
        );

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                return ExecutionResult::connection_error(format!(
                    "Connection to execution service failed: {}",
                    e
                ));
            }
        };

        let payload: RemoteResponse = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                return ExecutionResult::connection_error(format!(
                    "Execution service returned an unreadable response: {}",
                    e
                ));
            }
        };

        if let Some(compile) = &payload.compile {
            if compile.code != Some(0) {
                return ExecutionResult {
                    stdout: compile.stdout.trim().to_string(),
                    stderr: compile.stderr.trim().to_string(),
                    status: ExecStatus::CompileError,
                };
            }
        }

        match payload.run {
            Some(run) => {
                let status = if run.code == Some(0) {
                    ExecStatus::Accepted
                } else {
                    ExecStatus::RuntimeError
                };
                ExecutionResult {
                    stdout: run.stdout.trim().to_string(),
                    stderr: run.stderr.trim().to_string(),
                    status,
                }
            }
            None => ExecutionResult::connection_error("Execution service returned no run stage"),
        }
    }
}
