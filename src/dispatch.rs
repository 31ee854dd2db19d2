//! Execution dispatcher
//!
//! Routes a submission to the backend registered for its language, applies
//! harness synthesis, and races the backend call against a fixed deadline.
//!
//! The deadline observes, it does not cancel: when it fires first, the
//! backend task is left running detached and its eventual result is
//! discarded. `DeadlineOutcome` makes that distinction explicit.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backends::{
    EmbeddedRuntime, ExecutionBackend, ExecutionResult, RemoteBackend, ScriptBackend,
};
use crate::config::get_config;
use crate::harness::{self, CallMeta};
use crate::languages::{self, BackendKind};

/// Outcome of waiting on a backend call with a deadline
#[derive(Debug)]
pub enum DeadlineOutcome {
    Completed(ExecutionResult),
    DeadlineExceeded,
}

/// Wait for `task` up to `deadline`. The task is spawned so that it survives
/// the deadline; a late result is dropped with the join handle.
pub async fn observe_deadline<F>(task: F, deadline: Duration) -> DeadlineOutcome
where
    F: Future<Output = ExecutionResult> + Send + 'static,
{
    let mut handle = tokio::spawn(task);

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => DeadlineOutcome::Completed(result),
            Err(join_error) => DeadlineOutcome::Completed(ExecutionResult::runtime_error(
                format!("Execution task failed: {}", join_error),
            )),
        },
        _ = sleep(deadline) => DeadlineOutcome::DeadlineExceeded,
    }
}

/// Selects a backend per language and bounds each call with the session's
/// per-case deadline. Owns the lazily constructed embedded interpreter.
pub struct Dispatcher {
    embedded: OnceLock<Arc<EmbeddedRuntime>>,
    script: Arc<ScriptBackend>,
    remote: Arc<RemoteBackend>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(deadline: Duration) -> Self {
        Self {
            embedded: OnceLock::new(),
            script: Arc::new(ScriptBackend::new()),
            remote: Arc::new(RemoteBackend::from_env()),
            deadline,
        }
    }

    pub fn from_config() -> Self {
        Self::new(Duration::from_millis(get_config().case_deadline_ms))
    }

    fn backend_for(&self, kind: BackendKind) -> Arc<dyn ExecutionBackend> {
        match kind {
            BackendKind::Embedded => self
                .embedded
                .get_or_init(|| Arc::new(EmbeddedRuntime::spawn()))
                .clone() as Arc<dyn ExecutionBackend>,
            BackendKind::Script => self.script.clone() as Arc<dyn ExecutionBackend>,
            BackendKind::Remote => self.remote.clone() as Arc<dyn ExecutionBackend>,
        }
    }

    /// Execute a submission and return a result envelope. Backend failures
    /// never surface as errors here; `Err` is reserved for internal faults
    /// (the orchestrator converts those into failed case results).
    pub async fn dispatch(
        &self,
        language: &str,
        source: &str,
        stdin: &str,
        meta: &CallMeta,
    ) -> Result<ExecutionResult> {
        let Some(spec) = languages::get_language_spec(language) else {
            debug!("Rejecting unsupported language: {}", language);
            return Ok(ExecutionResult::unsupported());
        };

        debug!("Dispatching {} submission", spec.display_name);
        let program = harness::synthesize(spec.harness, source, stdin, meta)?;
        let backend = self.backend_for(spec.backend);
        let stdin = stdin.to_string();
        let task = async move { backend.execute(&spec, &program, &stdin).await };

        match observe_deadline(task, self.deadline).await {
            DeadlineOutcome::Completed(result) => Ok(result),
            DeadlineOutcome::DeadlineExceeded => {
                warn!(
                    "Execution exceeded the {}ms deadline; abandoning the call",
                    self.deadline.as_millis()
                );
                Ok(ExecutionResult::timed_out())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ExecStatus;

    #[tokio::test]
    async fn test_unsupported_language_yields_empty_stdout() {
        languages::init_languages().unwrap();
        let dispatcher = Dispatcher::new(Duration::from_secs(5));

        let result = dispatcher
            .dispatch("cobol", "DISPLAY 'HI'", "", &CallMeta::default())
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::UnsupportedLanguage);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_wins_over_stalled_backend() {
        let stalled = async {
            sleep(Duration::from_secs(30)).await;
            ExecutionResult::accepted("late", "")
        };

        let outcome = observe_deadline(stalled, Duration::from_millis(20)).await;
        assert!(matches!(outcome, DeadlineOutcome::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_fast_backend_completes_before_deadline() {
        let quick = async { ExecutionResult::accepted("done", "") };

        match observe_deadline(quick, Duration::from_secs(5)).await {
            DeadlineOutcome::Completed(result) => assert_eq!(result.stdout, "done"),
            DeadlineOutcome::DeadlineExceeded => panic!("deadline should not fire"),
        }
    }

    #[tokio::test]
    async fn test_timed_out_dispatch_returns_synthetic_envelope() {
        languages::init_languages().unwrap();
        let dispatcher = Dispatcher::new(Duration::from_millis(50));

        // The sleep keeps the interpreter busy well past the deadline; the
        // abandoned run finishes on its own thread after the test.
        let result = dispatcher
            .dispatch(
                "python",
                "import time\ntime.sleep(2)\n",
                "",
                &CallMeta {
                    function_name: "solution".into(),
                    args: vec![],
                },
            )
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::TimeLimitExceeded);
        assert_eq!(result.stderr, "Execution Timed Out");
        assert!(result.stdout.is_empty());
    }
}
