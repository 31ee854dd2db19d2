//! Embedded Python interpreter backend
//!
//! A single process-wide interpreter, lazily constructed and confined to one
//! dedicated thread. All executions are funneled through a channel, so runs
//! are serialized and can never interleave stdio redirection on the shared
//! instance. The interpreter keeps one persistent scope across runs; stdout
//! and stderr are redirected to fresh in-memory buffers before every run and
//! read back afterwards.
//!
//! A run abandoned by the dispatcher's deadline keeps executing here until it
//! finishes; its reply is discarded because the receiving half is gone.

use async_trait::async_trait;
use rustpython_vm::builtins::PyBaseExceptionRef;
use rustpython_vm::scope::Scope;
use rustpython_vm::{compiler::Mode, Interpreter, Settings, VirtualMachine};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use super::{ExecutionBackend, ExecutionResult};
use crate::languages::LanguageSpec;

/// Redirect the interpreter's stdio into fresh in-memory buffers so
/// consecutive runs do not leak output into each other.
const REDIRECT_STDIO: &str = "import sys\nimport io\nsys.stdout = io.StringIO()\nsys.stderr = io.StringIO()\n";

/// Modules the harness relies on; imported once so an incomplete interpreter
/// build fails at initialization, not mid-session.
const BOOTSTRAP: &str = "import encodings\nimport sys\nimport io\nimport json\n";

struct RuntimeRequest {
    program: String,
    reply: oneshot::Sender<ExecutionResult>,
}

/// Handle to the interpreter thread. Cheap to clone; all clones feed the same
/// serialized execution queue.
#[derive(Clone)]
pub struct EmbeddedRuntime {
    tx: mpsc::Sender<RuntimeRequest>,
}

impl EmbeddedRuntime {
    /// Spawn the interpreter thread. The interpreter itself is constructed on
    /// that thread; a failed construction turns every subsequent request into
    /// a `ConnectionError` result.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RuntimeRequest>(16);

        let spawned = std::thread::Builder::new()
            .name("embedded-python".into())
            .spawn(move || runtime_thread(rx));

        if let Err(e) = spawned {
            // The receiver is dropped with the failed thread; requests will
            // observe a closed channel.
            error!("Failed to spawn embedded interpreter thread: {}", e);
        }

        Self { tx }
    }

    /// Run a synthesized program on the shared interpreter.
    pub async fn execute_program(&self, program: String) -> ExecutionResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = RuntimeRequest {
            program,
            reply: reply_tx,
        };

        if self.tx.send(request).await.is_err() {
            return ExecutionResult::connection_error("Embedded interpreter is unavailable");
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => ExecutionResult::connection_error("Embedded interpreter dropped the request"),
        }
    }
}

#[async_trait]
impl ExecutionBackend for EmbeddedRuntime {
    async fn execute(&self, _language: &LanguageSpec, program: &str, _stdin: &str) -> ExecutionResult {
        self.execute_program(program.to_string()).await
    }
}

fn runtime_thread(mut rx: mpsc::Receiver<RuntimeRequest>) {
    let interpreter = Interpreter::with_init(Settings::default(), |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
    });

    interpreter.enter(|vm| {
        let scope = vm.new_scope_with_builtins();

        if let Err(exc) = run_exec(vm, &scope, BOOTSTRAP) {
            let detail = exception_text(vm, &exc);
            error!("Embedded interpreter failed to initialize: {}", detail);
            while let Some(request) = rx.blocking_recv() {
                let _ = request.reply.send(ExecutionResult::connection_error(format!(
                    "Interpreter initialization failed: {}",
                    detail
                )));
            }
            return;
        }

        info!("Embedded Python interpreter ready");

        while let Some(request) = rx.blocking_recv() {
            let result = run_program(vm, &scope, &request.program);
            // The caller may have stopped waiting (deadline); discard then.
            let _ = request.reply.send(result);
        }
    });
}

fn run_program(vm: &VirtualMachine, scope: &Scope, program: &str) -> ExecutionResult {
    if let Err(exc) = run_exec(vm, scope, REDIRECT_STDIO) {
        return ExecutionResult::runtime_error(exception_text(vm, &exc));
    }

    if let Err(exc) = run_exec(vm, scope, program) {
        return ExecutionResult::runtime_error(exception_text(vm, &exc));
    }

    let stdout = match eval_string(vm, scope, "sys.stdout.getvalue()") {
        Ok(text) => text,
        Err(exc) => return ExecutionResult::runtime_error(exception_text(vm, &exc)),
    };
    let stderr = match eval_string(vm, scope, "sys.stderr.getvalue()") {
        Ok(text) => text,
        Err(exc) => return ExecutionResult::runtime_error(exception_text(vm, &exc)),
    };

    ExecutionResult::accepted(stdout.trim(), stderr)
}

fn run_exec(vm: &VirtualMachine, scope: &Scope, source: &str) -> Result<(), PyBaseExceptionRef> {
    let code = vm
        .compile(source, Mode::Exec, "<exam>".to_owned())
        .map_err(|err| vm.new_syntax_error(&err, Some(source)))?;
    vm.run_code_obj(code, scope.clone())?;
    Ok(())
}

fn eval_string(vm: &VirtualMachine, scope: &Scope, expr: &str) -> Result<String, PyBaseExceptionRef> {
    let code = vm
        .compile(expr, Mode::Eval, "<exam>".to_owned())
        .map_err(|err| vm.new_syntax_error(&err, Some(expr)))?;
    let value = vm.run_code_obj(code, scope.clone())?;
    Ok(value.str(vm)?.to_string())
}

fn exception_text(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    let mut rendered = String::new();
    if vm.write_exception(&mut rendered, exc).is_err() {
        rendered = "unrenderable interpreter exception".to_owned();
    }
    rendered.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{self, CallMeta};
    use crate::languages::HarnessKind;
    use serde_json::json;

    fn two_sum_meta() -> CallMeta {
        CallMeta {
            function_name: "two_sum".into(),
            args: vec![json!([2, 7, 11, 15]), json!(9)],
        }
    }

    #[tokio::test]
    async fn test_correct_submission_prints_result_line() {
        let runtime = EmbeddedRuntime::spawn();
        let source = r#"
def two_sum(nums, target):
    for i in range(len(nums)):
        for j in range(i + 1, len(nums)):
            if nums[i] + nums[j] == target:
                return [i, j]
    return []
"#;
        let program =
            harness::synthesize(HarnessKind::FunctionCall, source, "", &two_sum_meta()).unwrap();

        let result = runtime.execute_program(program).await;
        assert!(result.is_accepted(), "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "0 1");
    }

    #[tokio::test]
    async fn test_missing_function_surfaces_as_diagnostic_output() {
        let runtime = EmbeddedRuntime::spawn();
        let source = "def unrelated():\n    return 1\n";
        let program =
            harness::synthesize(HarnessKind::FunctionCall, source, "", &two_sum_meta()).unwrap();

        let result = runtime.execute_program(program).await;
        assert!(result.is_accepted());
        assert!(result.stdout.contains("Function 'two_sum' not found"));

        let check = crate::verifier::check_case(&result.stdout, "0 1");
        assert!(!check.passed);
        assert!(check.actual.contains("not found"));
    }

    #[tokio::test]
    async fn test_syntax_error_maps_to_runtime_error() {
        let runtime = EmbeddedRuntime::spawn();
        let result = runtime.execute_program("def broken(:\n".to_string()).await;
        assert_eq!(result.status, super::super::ExecStatus::RuntimeError);
        assert!(!result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_runs_do_not_leak_output() {
        let runtime = EmbeddedRuntime::spawn();

        let first = runtime.execute_program("print('first')".to_string()).await;
        assert_eq!(first.stdout, "first");

        let second = runtime.execute_program("print('second')".to_string()).await;
        assert_eq!(second.stdout, "second");
    }
}
