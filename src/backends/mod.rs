//! Execution backends
//!
//! Three polymorphic strategies behind one contract:
//! - `EmbeddedRuntime`: in-process Python interpreter (shared, serialized)
//! - `ScriptBackend`: local script engine, fresh scope per call
//! - `RemoteBackend`: remote compiler/execution service
//!
//! Backends never propagate an error past their boundary: internal failures
//! are caught and mapped into the `ExecutionResult` envelope.

pub mod embedded;
pub mod remote;
pub mod script;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::languages::LanguageSpec;

/// Execution status of a single backend run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Accepted,
    RuntimeError,
    TimeLimitExceeded,
    CompileError,
    ConnectionError,
    UnsupportedLanguage,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecStatus::Accepted => "accepted",
            ExecStatus::RuntimeError => "runtime_error",
            ExecStatus::TimeLimitExceeded => "time_limit_exceeded",
            ExecStatus::CompileError => "compile_error",
            ExecStatus::ConnectionError => "connection_error",
            ExecStatus::UnsupportedLanguage => "unsupported_language",
        };
        write!(f, "{}", s)
    }
}

/// Result envelope returned by every backend. Produced fresh per execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecStatus,
}

impl ExecutionResult {
    pub fn accepted(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status: ExecStatus::Accepted,
        }
    }

    pub fn runtime_error(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status: ExecStatus::RuntimeError,
        }
    }

    pub fn connection_error(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status: ExecStatus::ConnectionError,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            stdout: String::new(),
            stderr: "Unsupported Language".into(),
            status: ExecStatus::UnsupportedLanguage,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: "Execution Timed Out".into(),
            status: ExecStatus::TimeLimitExceeded,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ExecStatus::Accepted
    }
}

/// Common execution contract. `program` is the harness-synthesized text (or
/// the raw user source for pass-through languages).
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, language: &LanguageSpec, program: &str, stdin: &str) -> ExecutionResult;
}

// Re-exports
pub use embedded::EmbeddedRuntime;
pub use remote::RemoteBackend;
pub use script::ScriptBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ExecStatus::Accepted.to_string(), "accepted");
        assert_eq!(ExecStatus::TimeLimitExceeded.to_string(), "time_limit_exceeded");
        assert_eq!(ExecStatus::UnsupportedLanguage.to_string(), "unsupported_language");
    }

    #[test]
    fn test_unsupported_envelope_has_empty_stdout() {
        let result = ExecutionResult::unsupported();
        assert_eq!(result.status, ExecStatus::UnsupportedLanguage);
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_timed_out_envelope() {
        let result = ExecutionResult::timed_out();
        assert_eq!(result.status, ExecStatus::TimeLimitExceeded);
        assert_eq!(result.stderr, "Execution Timed Out");
        assert!(result.stdout.is_empty());
    }
}
